use std::time::Duration;
use storage_gateway_rs::config::Config;
use storage_gateway_rs::TransferConfig;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.worker_count > 0);
    assert_eq!(config.max_queue_size, 10000);
    assert_eq!(config.log_level, "info");
    assert_eq!(config.transfer(), TransferConfig::default());
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.worker_count = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.verify_attempts = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_custom_config() {
    let config = Config::new(8);
    assert_eq!(config.worker_count, 8);
}

#[test]
fn test_transfer_defaults() {
    let transfer = TransferConfig::default();
    assert_eq!(transfer.verify_attempts, 3);
    assert_eq!(transfer.verify_interval, Duration::from_secs(1));
}
