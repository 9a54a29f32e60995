pub mod banis;
pub mod database;
pub mod error;
pub mod lines;
pub mod row_helpers;
pub mod schema;
pub mod scripture;

pub use database::Database;
pub use error::StoreError;
pub use scripture::SqliteScripture;
