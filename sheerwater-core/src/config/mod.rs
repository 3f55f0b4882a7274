pub mod app;
pub mod error;
pub mod loader;
pub mod server;

pub use crate::constants::CONFIG_PATH;

pub use app::{AppConfig, ConnectionConfig, ModelConfig};
pub use error::ConfigError;
pub use loader::{ensure_env_loaded, load_config};
pub use server::{ServerConfig, TransportKind};
