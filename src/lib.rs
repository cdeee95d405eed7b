// Modules
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use error::{RelayError, Result};
pub use server::{create_router, AppState};
