pub mod client;
pub mod handlers;
pub mod metrics;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;

pub use server::{start, ServerConfig, ServerError, ServerHandle};
pub use session::{SessionError, SessionHandle};
