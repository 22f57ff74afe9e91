pub mod config;
pub mod error;
pub mod types;

pub use config::StoreSqlConfig;
pub use error::{Result, StoreSqlError};
pub use types::*;
