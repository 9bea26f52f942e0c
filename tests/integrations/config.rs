use clap::Parser;
use notify_gateway::cli::Cli;
use notify_gateway::config::{Config, ConfigError};
use notify_gateway::core::{Channel, Severity};
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A helper function to run a test with a temporary config file.
fn with_config_file<F>(toml_content: &str, test_fn: F)
where
    F: FnOnce(PathBuf),
{
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();
    let path = file.path().to_path_buf();
    test_fn(path);
}

fn load_with_file(path: &PathBuf) -> anyhow::Result<Config> {
    let cli =
        Cli::try_parse_from(["notify-gateway", "--config", path.to_str().unwrap()]).unwrap();
    Config::load(&cli)
}

// Every test that calls `Config::load` reads process environment variables,
// so they are serialized against the env-mutating tests below.

#[test]
#[serial]
fn defaults_apply_without_a_config_file() {
    let config = Config::load(&Cli::default()).unwrap();

    assert_eq!(config.log_level, "info");
    assert_eq!(config.listen_address, "0.0.0.0:8080".parse().unwrap());
    assert_eq!(config.routing.default_source, "notify-gateway");
    assert_eq!(config.routing.timezone, "UTC");
    assert_eq!(
        config.routing.enabled_channels,
        vec![Channel::Tg, Channel::Wecom, Channel::Serverchan]
    );
    assert_eq!(config.dispatch.retry_schedule_ms, vec![1000, 2000, 4000]);
    assert_eq!(config.deduplication.window_ms, 45_000);
    assert_eq!(config.deduplication.max_entries, 10_000);
    assert!(config.channels.telegram.is_none());
    assert!(config.channels.webhooks.is_empty());
    assert!(!config.metrics.enabled);
}

#[test]
#[serial]
fn file_values_override_defaults() {
    let toml_content = r#"
        log_level = "debug"
        listen_address = "127.0.0.1:9999"

        [auth]
        ingest_token = "ingest-secret"
        webhook_token = "webhook-secret"

        [routing]
        default_source = "edge"
        timezone = "Asia/Shanghai"
        enabled_channels = ["tg"]

        [routing.route_by_severity]
        critical = ["tg"]

        [routing.channel_tags]
        tg = ["oncall"]

        [routing.source_routes.payments]
        critical = ["ops"]

        [dispatch]
        retry_schedule_ms = [10, 20]

        [deduplication]
        window_ms = 5000
        max_entries = 100

        [channels.telegram]
        bot_token = "123:abc"
        chat_id = "-100200300"

        [channels.wecom]
        webhook_url = "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=k"

        [[channels.webhooks]]
        url = "https://ops.example.com/hook"
        tags = ["ops"]

        [metrics]
        enabled = true
        listen_address = "127.0.0.1:0"
    "#;

    with_config_file(toml_content, |path| {
        let config = load_with_file(&path).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.listen_address, "127.0.0.1:9999".parse().unwrap());
        assert_eq!(config.auth.ingest_token, "ingest-secret");
        assert_eq!(config.auth.webhook_token, "webhook-secret");
        assert_eq!(config.routing.default_source, "edge");
        assert_eq!(config.routing.timezone, "Asia/Shanghai");
        assert_eq!(config.routing.enabled_channels, vec![Channel::Tg]);
        assert_eq!(
            config.routing.route_by_severity[&Severity::Critical],
            vec![Channel::Tg]
        );
        assert_eq!(config.routing.channel_tags[&Channel::Tg], vec!["oncall"]);
        assert_eq!(
            config.routing.source_routes["payments"][&Severity::Critical],
            vec!["ops"]
        );
        assert_eq!(config.dispatch.retry_schedule_ms, vec![10, 20]);
        assert_eq!(config.deduplication.window_ms, 5000);
        assert_eq!(config.deduplication.max_entries, 100);

        let telegram = config.channels.telegram.as_ref().unwrap();
        assert_eq!(telegram.bot_token, "123:abc");
        assert_eq!(telegram.chat_id, "-100200300");
        let wecom = config.channels.wecom.as_ref().unwrap();
        assert!(wecom.webhook_url.ends_with("key=k"));
        assert_eq!(config.channels.webhooks.len(), 1);
        assert_eq!(config.channels.webhooks[0].url, "https://ops.example.com/hook");
        assert_eq!(config.channels.webhooks[0].tags, vec!["ops"]);

        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.listen_address, "127.0.0.1:0".parse().unwrap());
    });
}

#[test]
#[serial]
fn environment_variables_override_the_file() {
    let toml_content = r#"
        [deduplication]
        window_ms = 5000
    "#;

    with_config_file(toml_content, |path| {
        std::env::set_var("NOTIFY_DEDUPLICATION__WINDOW_MS", "60000");
        let result = load_with_file(&path);
        std::env::remove_var("NOTIFY_DEDUPLICATION__WINDOW_MS");

        assert_eq!(result.unwrap().deduplication.window_ms, 60_000);
    });
}

#[test]
#[serial]
fn cli_flags_override_environment_and_file() {
    let toml_content = r#"
        [deduplication]
        window_ms = 5000

        [routing]
        timezone = "UTC"
    "#;

    with_config_file(toml_content, |path| {
        std::env::set_var("NOTIFY_DEDUPLICATION__WINDOW_MS", "60000");
        let cli = Cli::try_parse_from([
            "notify-gateway",
            "--config",
            path.to_str().unwrap(),
            "--dedupe-window-ms",
            "70000",
            "--timezone",
            "Asia/Tokyo",
        ])
        .unwrap();
        let result = Config::load(&cli);
        std::env::remove_var("NOTIFY_DEDUPLICATION__WINDOW_MS");

        let config = result.unwrap();
        assert_eq!(config.deduplication.window_ms, 70_000);
        assert_eq!(config.routing.timezone, "Asia/Tokyo");
    });
}

#[test]
#[serial]
fn invalid_value_types_are_reported_with_their_key() {
    let toml_content = r#"
        [deduplication]
        window_ms = "soon"
    "#;

    with_config_file(toml_content, |path| {
        let error_string = load_with_file(&path).unwrap_err().to_string();
        assert!(error_string.contains("invalid type: found string \"soon\""));
        assert!(error_string.contains("deduplication.window_ms"));
    });
}

#[test]
fn missing_explicit_config_file_is_an_error() {
    let non_existent_path = PathBuf::from("/path/to/non/existent/gateway.toml");
    let cli =
        Cli::try_parse_from(["notify-gateway", "--config", non_existent_path.to_str().unwrap()])
            .unwrap();
    let error_string = Config::load(&cli).unwrap_err().to_string();
    assert!(error_string.contains("Config file not found at specified path"));
}

#[test]
fn validation_requires_both_tokens() {
    let mut config = Config::default();
    assert_eq!(
        config.validate(),
        Err(ConfigError::MissingToken("auth.ingest_token"))
    );

    config.auth.ingest_token = "ingest-secret".to_string();
    assert_eq!(
        config.validate(),
        Err(ConfigError::MissingToken("auth.webhook_token"))
    );

    config.auth.webhook_token = "webhook-secret".to_string();
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn whitespace_tokens_do_not_pass_validation() {
    let mut config = Config::default();
    config.auth.ingest_token = "   ".to_string();
    config.auth.webhook_token = "webhook-secret".to_string();
    assert_eq!(
        config.validate(),
        Err(ConfigError::MissingToken("auth.ingest_token"))
    );
}
