pub mod client;
pub mod protocol;
pub mod transport;

pub use client::{McpClient, PROTOCOL_VERSION};
pub use protocol::ServerCapabilities;
pub use transport::ChildTransport;
