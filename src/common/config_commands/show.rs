use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use toml::{Table, Value};

/// Keys whose values never reach the terminal.
const SECRET_KEYS: &[&str] = &["password", "passphrase"];
const MASK: &str = "********";

pub(super) fn path_config_with_writer(path: &Path, output: &mut dyn Write) -> Result<()> {
    writeln!(output, "{}", path.display())?;
    Ok(())
}

/// Print the config file with secrets masked, or point at `config init`
/// when there is no file.
pub(super) fn show_config_with_io(
    path: &Path,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    if !path.exists() {
        writeln!(stderr, "No config file found at {}", path.display())?;
        writeln!(
            stderr,
            "Run `batchdrop config init` to write one, or set BATCHDROP_* variables."
        )?;
        return Ok(());
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let mut table: Table = text
        .parse()
        .with_context(|| format!("Config file {} is not valid TOML", path.display()))?;
    mask_secrets(&mut table);
    let rendered = toml::to_string_pretty(&table).context("Failed to render config")?;
    stdout.write_all(rendered.as_bytes())?;
    Ok(())
}

fn mask_secrets(table: &mut Table) {
    for (key, value) in table.iter_mut() {
        match value {
            Value::Table(inner) => mask_secrets(inner),
            Value::String(s) if SECRET_KEYS.contains(&key.as_str()) && !s.is_empty() => {
                *s = MASK.to_string();
            }
            _ => {}
        }
    }
}
