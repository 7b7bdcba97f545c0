// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Courier configuration system.

use courier_config::diagnostic::ConfigError;
use courier_config::{
    AdapterKind, load_and_validate_str, load_config_from_path, load_config_from_str,
};
use courier_core::{Channel, Priority};

#[test]
fn full_config_deserializes() {
    let toml = r#"
[engine]
name = "courier-dakar"
log_level = "debug"

[storage]
database_path = "/tmp/courier.db"
wal_mode = false

[worker]
workers = 2
batch_size = 10
lease_seconds = 60
attempt_timeout_ms = 2000
catalog_ttl_seconds = 20
max_jitter_ms = 0

[routing]
default_channels = ["sms", "email"]
urgent_priority = "high"

[callback]
secret = "0123456789abcdef0123"
max_skew_seconds = 120

[prometheus]
enabled = true

[[providers]]
id = "orange-sms"
kind = "webhook"
url = "https://sms.example.com/send"

[[providers]]
id = "dry-run"
kind = "log"
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.engine.name, "courier-dakar");
    assert_eq!(config.storage.database_path, "/tmp/courier.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.worker.workers, 2);
    assert_eq!(config.worker.max_jitter_ms, 0);
    assert_eq!(
        config.routing.default_channels,
        vec![Channel::Sms, Channel::Email]
    );
    assert_eq!(config.routing.urgent_priority, Priority::High);
    assert_eq!(config.callback.max_skew_seconds, 120);
    assert!(config.prometheus.enabled);
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers[0].kind, AdapterKind::Webhook);
    assert_eq!(config.providers[1].kind, AdapterKind::Log);
}

#[test]
fn empty_config_uses_defaults() {
    let config = load_and_validate_str("").expect("defaults validate");
    assert_eq!(config.engine.name, "courier");
    assert_eq!(config.worker.catalog_ttl_seconds, 30);
    assert!(config.providers.is_empty());
    assert!(config.callback.secret.is_none());
}

#[test]
fn misspelled_worker_key_suggests_correction() {
    let toml = r#"
[worker]
bach_size = 4
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            span,
            ..
        } => {
            assert_eq!(key, "bach_size");
            assert_eq!(suggestion.as_deref(), Some("batch_size"));
            assert!(span.is_some());
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[telemetry]\nenabled = true\n").unwrap_err();
    assert!(matches!(&errors[0], ConfigError::UnknownKey { key, .. } if key == "telemetry"));
}

#[test]
fn unknown_channel_name_is_invalid_value() {
    let errors =
        load_and_validate_str("[routing]\ndefault_channels = [\"fax\"]\n").unwrap_err();
    assert!(
        matches!(&errors[0], ConfigError::InvalidValue { detail, .. } if detail.contains("fax")),
        "{errors:?}"
    );
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[worker]\nworkers = \"many\"\n").unwrap_err();
    assert!(
        matches!(&errors[0], ConfigError::InvalidType { .. }),
        "{errors:?}"
    );
}

#[test]
fn semantic_errors_are_collected() {
    let toml = r#"
[worker]
catalog_ttl_seconds = 120
max_jitter_ms = 9000
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}

#[test]
fn adapter_without_kind_is_rejected() {
    let toml = r#"
[[providers]]
id = "x"
"#;
    let err = load_config_from_str(toml).unwrap_err();
    assert!(err.to_string().contains("kind"));
}

#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "courier.toml",
            r#"
[worker]
lease_seconds = 90
"#,
        )?;
        jail.set_env("COURIER_WORKER_LEASE_SECONDS", "45");
        jail.set_env("COURIER_STORAGE_DATABASE_PATH", "/var/lib/courier/c.db");

        let config = load_config_from_path(std::path::Path::new("courier.toml"))?;
        assert_eq!(config.worker.lease_seconds, 45);
        assert_eq!(config.storage.database_path, "/var/lib/courier/c.db");
        Ok(())
    });
}

#[test]
fn uppercase_env_keys_reach_every_section() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("courier.toml", "")?;
        jail.set_env("COURIER_CALLBACK_MAX_SKEW_SECONDS", "30");
        jail.set_env("COURIER_PROMETHEUS_ENABLED", "false");
        jail.set_env("COURIER_ENGINE_LOG_LEVEL", "trace");

        let config = load_config_from_path(std::path::Path::new("courier.toml"))?;
        assert_eq!(config.callback.max_skew_seconds, 30);
        assert!(!config.prometheus.enabled);
        assert_eq!(config.engine.log_level, "trace");
        Ok(())
    });
}
