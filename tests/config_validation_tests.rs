mod common;

use batchdrop::common::config::{load_config, load_layers, ConfigOverrides};
use common::config_test_utils::with_config_env;

const CREDENTIALS: &str = r#"
[credentials]
user = "merchant"
password = "secret"

[store]
kind = "local"
"#;

fn with_extra<T>(extra: &str, f: impl FnOnce() -> T) -> T {
    with_config_env(&format!("{CREDENTIALS}\n{extra}"), f)
}

#[test]
fn rejects_missing_credentials() {
    with_config_env("", || {
        let err =
            load_config(&ConfigOverrides::default()).expect_err("expected validation failure");
        assert!(err.to_string().contains("credentials.user"));
    });
}

#[test]
fn unvalidated_layers_load_without_credentials() {
    with_config_env("", || {
        let config = load_layers(&ConfigOverrides::default()).expect("layers should load");
        assert!(config.credentials.user.is_empty());
    });
}

#[test]
fn rejects_zero_poll_interval() {
    with_extra(
        r#"
        [poll]
        interval_secs = 0
        "#,
        || {
            let err =
                load_config(&ConfigOverrides::default()).expect_err("expected validation failure");
            assert!(err.to_string().contains("interval_secs"));
        },
    );
}

#[test]
fn rejects_interval_longer_than_timeout() {
    with_extra(
        r#"
        [poll]
        timeout_secs = 60
        interval_secs = 120
        "#,
        || {
            let err =
                load_config(&ConfigOverrides::default()).expect_err("expected validation failure");
            assert!(err.to_string().contains("poll.interval_secs must be <= poll.timeout_secs"));
        },
    );
}

#[test]
fn rejects_over_max_timeout() {
    with_extra(
        r#"
        [poll]
        timeout_secs = 90000
        "#,
        || {
            let err =
                load_config(&ConfigOverrides::default()).expect_err("expected validation failure");
            assert!(err.to_string().contains("timeout_secs"));
        },
    );
}

#[test]
fn encryption_override_requires_recipient() {
    with_config_env(CREDENTIALS, || {
        let overrides = ConfigOverrides {
            encrypt: Some(true),
            ..Default::default()
        };
        let err = load_config(&overrides).expect_err("expected validation failure");
        assert!(err.to_string().contains("recipient_key_id"));
    });
}

#[test]
fn sftp_store_requires_username() {
    with_config_env(
        r#"
        [credentials]
        user = "merchant"
        password = "secret"

        [sftp]
        host = "sftp.example.com"
        "#,
        || {
            let err =
                load_config(&ConfigOverrides::default()).expect_err("expected validation failure");
            assert!(err.to_string().contains("sftp.username"));
        },
    );
}

#[test]
fn rejects_unknown_store_kind() {
    with_extra("", || {
        std::env::set_var("BATCHDROP_STORE__KIND", "ftp");
        assert!(load_config(&ConfigOverrides::default()).is_err());
    });
}
