pub mod codec;
pub mod config;
pub mod error;
pub mod history;
pub mod http;
pub mod logger;
pub mod parser;
pub mod proxy;
pub mod utils;

// Re-export commonly used types
pub use error::{ProxyError, Result};
