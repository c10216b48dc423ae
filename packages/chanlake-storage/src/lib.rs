pub mod db;
pub mod lock;
pub mod models;
pub mod queries;
pub mod schema;

mod error;

pub use error::{Error, is_connection_error};

pub type Result<T, E = Error> = std::result::Result<T, E>;
