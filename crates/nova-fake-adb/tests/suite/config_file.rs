use nova_fake_adb::{ConfigError, FakeAdbConfig, FakeAdbServer};

use super::client::AdbClient;

#[tokio::test]
async fn server_starts_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fake-adb.toml");
    std::fs::write(
        &path,
        r#"
        [server]
        listen = "127.0.0.1:0"

        [install]
        bad_session_id = "bad"

        [[devices]]
        serial = "emulator-5554"
        properties = { "ro.product.cpu.abi" = "arm64-v8a" }

        [logging]
        level = "debug"
        stderr = false
        "#,
    )
    .unwrap();

    let config = FakeAdbConfig::load_from_path(&path).unwrap();
    assert!(!config.logging.stderr);
    let server = FakeAdbServer::spawn(config).await.unwrap();

    assert_eq!(
        AdbClient::query(server.addr(), "host:devices").await,
        "emulator-5554\tdevice\n"
    );
    assert_eq!(
        AdbClient::exec(server.addr(), "emulator-5554", "getprop ro.product.cpu.abi", b"").await,
        "arm64-v8a\n"
    );
    assert_eq!(
        AdbClient::exec(server.addr(), "emulator-5554", "pm install-commit bad", b"").await,
        "Failure [INSTALL_FAILED_INTERNAL_ERROR: session bad was rejected]\n"
    );
}

#[test]
fn missing_config_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = FakeAdbConfig::load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"), "{err}");
}

#[tokio::test]
async fn duplicate_serials_prevent_startup() {
    let config: FakeAdbConfig = toml::from_str(
        r#"
        [[devices]]
        serial = "a"
        [[devices]]
        serial = "a"
        "#,
    )
    .unwrap();
    let err = FakeAdbServer::spawn(config).await.err().unwrap();
    assert!(err.to_string().contains("duplicate device serial 'a'"), "{err}");
}
