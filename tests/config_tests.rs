// Config parsing and validation tests

use pulsewatch::config::AppConfig;

fn base_config() -> String {
    r#"
        [server]
        port = 8080
        host = "0.0.0.0"

        [database]
        path = "data/history.db"
    "#
    .to_string()
}

#[test]
fn parses_minimal_config_with_retention_defaults() {
    let config = AppConfig::load_from_str(&base_config()).unwrap();
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.database.path, "data/history.db");
    assert_eq!(config.retention.tick_interval_secs, 86_400);
    assert!(config.retention.schedule.is_none());
    assert_eq!(config.retention.defaults.raw_retention_days, 7);
    assert_eq!(config.retention.defaults.hourly_retention_days, 30);
    assert_eq!(config.retention.defaults.daily_retention_days, 365);
}

#[test]
fn parses_retention_overrides() {
    let s = format!(
        "{}\n{}",
        base_config(),
        r#"
        [retention]
        schedule = "0 0 4 * * *"
        tick_interval_secs = 3600

        [retention.defaults]
        raw_retention_days = 3
        hourly_retention_days = 14
        daily_retention_days = 90
        "#
    );
    let config = AppConfig::load_from_str(&s).unwrap();
    assert_eq!(config.retention.schedule.as_deref(), Some("0 0 4 * * *"));
    assert_eq!(config.retention.tick_interval_secs, 3600);
    assert_eq!(config.retention.defaults.raw_retention_days, 3);
    assert_eq!(config.retention.defaults.hourly_retention_days, 14);
    assert_eq!(config.retention.defaults.daily_retention_days, 90);
}

#[test]
fn rejects_empty_database_path() {
    let s = r#"
        [server]
        port = 8080
        host = "0.0.0.0"

        [database]
        path = ""
    "#;
    assert!(AppConfig::load_from_str(s).is_err());
}

#[test]
fn rejects_inverted_retention_windows() {
    let s = format!(
        "{}\n{}",
        base_config(),
        r#"
        [retention.defaults]
        raw_retention_days = 30
        hourly_retention_days = 7
        daily_retention_days = 365
        "#
    );
    assert!(AppConfig::load_from_str(&s).is_err());
}

#[test]
fn rejects_zero_tick_interval() {
    let s = format!(
        "{}\n{}",
        base_config(),
        r#"
        [retention]
        tick_interval_secs = 0
        "#
    );
    assert!(AppConfig::load_from_str(&s).is_err());
}
