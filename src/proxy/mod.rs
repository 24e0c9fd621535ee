pub mod handler;
pub mod server;

pub use handler::{ConnectionHandler, Exchange};
pub use server::ProxyServer;
