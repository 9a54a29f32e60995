pub mod errors;
pub mod events;
pub mod ids;
pub mod intent;
pub mod options;
pub mod scripture;
pub mod state;
