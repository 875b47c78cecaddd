pub mod commands;
pub mod error;
pub mod events;
pub mod history;
pub mod models;
pub mod waste;

pub use error::ScanError;
