pub mod types;
pub mod wire;

// Re-export commonly used types
pub use types::{ParseError, ParseResult, ParsedRequest};
pub use wire::WireParser;
