pub mod config;
pub mod config_commands;

pub use config::{AppConfig, ConfigOverrides, StoreKind, PROTOCOL_VERSION};
