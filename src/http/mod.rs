pub mod client;
pub mod response;
pub mod types;

// Re-export commonly used types for convenient access
pub use client::ForwardingClient;
pub use response::ParsedResponse;
