pub mod manager;

pub use manager::{ServerManager, StatusSnapshot};
