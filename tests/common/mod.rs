#![allow(dead_code)]

pub mod config_test_utils;
pub mod fakes;

use batchdrop::common::config::Credentials;
use batchdrop::common::PROTOCOL_VERSION;
use batchdrop::session::{FileNamer, SessionBuilder, SessionConfig};
use batchdrop::transfer::{PollPolicy, TransferSettings};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub const PASSPHRASE: &str = "merchant passphrase";
pub const RECIPIENT: &str = "processor@example.com";

pub fn setup_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

pub fn session_config(request_dir: &Path) -> SessionConfig {
    SessionConfig {
        request_dir: request_dir.to_path_buf(),
        credentials: Credentials {
            user: "merchant".to_string(),
            password: "s3cret".to_string(),
        },
        merchant_id: "101".to_string(),
        report_group: "Default Report Group".to_string(),
        version: PROTOCOL_VERSION.to_string(),
    }
}

pub fn builder(request_dir: &Path) -> SessionBuilder {
    SessionBuilder::with_namer(session_config(request_dir), FileNamer::seeded(7))
}

pub fn transfer_settings(response_dir: &Path, encrypt: bool) -> TransferSettings {
    TransferSettings {
        encrypt,
        recipient_key_id: RECIPIENT.to_string(),
        passphrase: PASSPHRASE.to_string(),
        response_dir: response_dir.to_path_buf(),
        delete_after_retrieve: true,
        poll: PollPolicy {
            timeout: Duration::from_secs(120),
            interval: Duration::from_secs(30),
        },
    }
}

/// Write a request document with `body` and return its path.
pub fn write_document(dir: &Path, name: &str, body: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("create document dir");
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write document");
    path
}

/// Play the processor: drop `body` where the result for `remote_name` is expected.
pub fn publish_result(store_root: &Path, remote_name: &str, body: &[u8]) -> PathBuf {
    let path = store_root
        .join("outbound")
        .join(format!("{remote_name}.asc"));
    std::fs::create_dir_all(path.parent().expect("outbound dir")).expect("create outbound");
    std::fs::write(&path, body).expect("write result");
    path
}

pub const RESPONSE_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cnpResponse version="12.33" xmlns="http://www.vantivcnp.com/schema" response="0" message="Valid Format" cnpSessionId="4242">
<batchResponse id="1" cnpBatchId="9" merchantId="101"/>
</cnpResponse>
"#;
