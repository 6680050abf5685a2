use std::time::Duration;

use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::constants::DEFAULT_CONFIG_PREFIX;
use crate::constants::DEFAULT_REGISTRY_PREFIX;

fn cleanup_all_micro_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("MICRO__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_settings_should_use_hardcoded_values() {
    let settings = Settings::default();

    assert_eq!(settings.store.endpoints, vec!["127.0.0.1:2379".to_string()]);
    assert_eq!(settings.store.dial_timeout(), Duration::from_secs(3));
    assert_eq!(settings.registry.prefix, DEFAULT_REGISTRY_PREFIX);
    assert_eq!(settings.registry.timeout(), Duration::from_secs(5));
    assert_eq!(settings.source.prefix, DEFAULT_CONFIG_PREFIX);
    assert_eq!(settings.source.name, "kv");
    assert_eq!(settings.watch.channel_buffer, 64);
    assert!(settings.validate().is_ok());
}

#[test]
#[serial]
fn load_should_merge_environment_overrides() {
    cleanup_all_micro_env_vars();
    with_vars(
        vec![
            ("MICRO__REGISTRY__TIMEOUT_MS", Some("750")),
            ("MICRO__STORE__ENDPOINTS", Some("10.0.0.1,10.0.0.2:2380")),
            ("MICRO__WATCH__RECONNECT__MAX_DELAY_MS", Some("900")),
        ],
        || {
            let settings = Settings::load(None).unwrap();

            assert_eq!(settings.registry.timeout_ms, 750);
            assert_eq!(
                settings.store.endpoints,
                vec!["10.0.0.1".to_string(), "10.0.0.2:2380".to_string()]
            );
            assert_eq!(settings.watch.reconnect.max_delay_ms, 900);
            assert_eq!(settings.watch.reconnect.base_delay_ms, 100);
        },
    );
}

#[test]
#[serial]
fn load_should_merge_file_settings() {
    cleanup_all_micro_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("micro.toml");
    std::fs::write(
        &config_path,
        r#"
        [source]
        prefix = "/app/config/"
        strip_prefix = "/app/config"

        [registry]
        ttl_secs = 15
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let settings = Settings::load(config_path.to_str()).unwrap();

        assert_eq!(settings.source.prefix, "/app/config/");
        assert_eq!(settings.source.strip_prefix.as_deref(), Some("/app/config"));
        assert_eq!(settings.registry.ttl(), Duration::from_secs(15));
        assert_eq!(settings.registry.prefix, DEFAULT_REGISTRY_PREFIX);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_micro_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");
    std::fs::write(
        &config_path,
        r#"
        [watch]
        channel_buffer = 8
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("MICRO__WATCH__CHANNEL_BUFFER", Some("32")),
        ],
        || {
            let settings = Settings::load(None).unwrap();
            assert_eq!(settings.watch.channel_buffer, 32);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_keep_unrelated_values() {
    cleanup_all_micro_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("runtime.toml");
    std::fs::write(
        &config_path,
        r#"
        [store]
        username = "root"
        password = "secret"
        "#,
    )
    .unwrap();

    let mut base = Settings::default();
    base.registry.ttl_secs = 30;

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let settings = base.with_override_config(config_path.to_str().unwrap()).unwrap();
        assert_eq!(settings.store.username.as_deref(), Some("root"));
        assert_eq!(settings.registry.ttl_secs, 30);
    });
}

#[test]
#[serial]
fn missing_config_file_should_fail() {
    cleanup_all_micro_env_vars();
    let result = Settings::load(Some("/definitely/not/here.toml"));
    assert!(matches!(result, Err(crate::Error::Config(_))));
}

#[test]
fn validation_should_reject_broken_sections() {
    let mut settings = Settings::default();
    settings.registry.prefix = "micro/registry".to_string();
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.store.username = Some("root".to_string());
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.watch.channel_buffer = 0;
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.watch.reconnect = BackoffPolicy {
        base_delay_ms: 500,
        max_delay_ms: 100,
    };
    assert!(settings.validate().is_err());
}

#[test]
fn backoff_delay_doubles_until_capped() {
    let policy = BackoffPolicy {
        base_delay_ms: 100,
        max_delay_ms: 1000,
    };

    assert_eq!(policy.delay(0), Duration::from_millis(100));
    assert_eq!(policy.delay(1), Duration::from_millis(200));
    assert_eq!(policy.delay(3), Duration::from_millis(800));
    assert_eq!(policy.delay(4), Duration::from_millis(1000));
    assert_eq!(policy.delay(60), Duration::from_millis(1000));
}
