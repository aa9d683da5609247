pub mod error;
pub mod exporter;
pub mod provider;
pub mod server;
pub mod settings;
pub mod types;

pub use error::{Error, Result};
