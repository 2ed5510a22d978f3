//! CLI handlers for config subcommands.

mod io;
mod show;

use crate::common::config::{config_path, AppConfig};
use anyhow::{Context, Result};

fn defaults_toml() -> Result<String> {
    toml::to_string_pretty(&AppConfig::default()).context("Failed to serialize default config")
}

/// Print resolved config file path.
pub fn run_config_path() -> Result<()> {
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    show::path_config_with_writer(&config_path(), &mut output)
}

/// Print the config file with secrets masked, or guidance when missing.
pub fn run_config_show() -> Result<()> {
    let path = config_path();
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    let stderr = std::io::stderr();
    let mut err_output = stderr.lock();
    show::show_config_with_io(&path, &mut output, &mut err_output)
}

/// Write a default config file. Refuses to overwrite unless `force` is set.
pub fn run_config_init(force: bool) -> Result<bool> {
    io::init_config(&config_path(), &defaults_toml()?, force)
}
