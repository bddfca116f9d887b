use std::net::SocketAddr;

use nova_fake_adb::config::InstallConfig;
use nova_fake_adb::{DeviceConfig, FakeAdbConfig, FakeAdbServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::client::AdbClient;

const SERIAL: &str = "emulator-5554";

async fn server(bad_session_id: Option<&str>) -> FakeAdbServer {
    let mut config = FakeAdbConfig::default().with_device(
        DeviceConfig::new(SERIAL)
            .with_package("com.android.shell", vec!["/system/priv-app/Shell/Shell.apk".into()]),
    );
    config.install = InstallConfig {
        bad_session_id: bad_session_id.map(str::to_string),
        first_session_id: 42,
    };
    FakeAdbServer::spawn(config).await.unwrap()
}

async fn exec(addr: SocketAddr, command: &str, stdin: &[u8]) -> String {
    AdbClient::exec(addr, SERIAL, command, stdin).await
}

#[tokio::test]
async fn incremental_install_over_exec() {
    let server = server(None).await;
    let addr = server.addr();

    assert_eq!(
        exec(addr, "cmd package install-create -r -t -p com.example.app", b"").await,
        "Success: created install session [42]\n"
    );
    assert_eq!(
        exec(addr, "cmd package install-write -S 11 42 base.apk -", b"hello world").await,
        "Success: streamed 11 bytes\n"
    );
    assert_eq!(
        exec(
            addr,
            "pm install-write -S 4096 42 split_config.arm64.apk /data/local/tmp/a.apk",
            b"",
        )
        .await,
        "Success\n"
    );

    let session = server.device(SERIAL).unwrap().session(42).unwrap();
    assert_eq!(
        session.writes,
        vec![
            ("base.apk".to_string(), 11),
            ("split_config.arm64.apk".to_string(), 4096),
        ]
    );

    assert_eq!(exec(addr, "pm install-commit 42", b"").await, "Success\n");
    assert_eq!(
        exec(addr, "/system/bin/pm path com.example.app", b"").await,
        "package:/data/app/com.example.app/base.apk\n"
    );
}

#[tokio::test]
async fn bad_session_sentinel_fails_deterministically() {
    let server = server(Some("-1")).await;
    let addr = server.addr();

    assert_eq!(
        exec(addr, "cmd package install-write -S 3 -1 base.apk -", b"abc").await,
        "Failure [INSTALL_FAILED_INTERNAL_ERROR: session -1 was rejected]\n"
    );
    assert_eq!(
        exec(addr, "cmd package install-commit -1", b"").await,
        "Failure [INSTALL_FAILED_INTERNAL_ERROR: session -1 was rejected]\n"
    );
    let unknown = exec(addr, "cmd package install-commit 7", b"").await;
    assert!(
        unknown.starts_with("Failure [INSTALL_FAILED_INVALID_SESSION"),
        "{unknown}"
    );
}

#[tokio::test]
async fn abb_exec_package_path_and_unknown_subcommand() {
    let server = server(None).await;

    let mut client = AdbClient::device(server.addr(), SERIAL).await;
    client.send("abb_exec:package\0path\0com.android.shell").await;
    client.status().await.unwrap();
    assert_eq!(
        client.read_to_string().await,
        "package:/system/priv-app/Shell/Shell.apk\n"
    );

    let mut client = AdbClient::device(server.addr(), SERIAL).await;
    client.send("abb_exec:package\0uninstall-everything").await;
    assert!(client.status().await.is_err());
}

#[tokio::test]
async fn sessions_are_numbered_server_wide() {
    let mut config = FakeAdbConfig::default()
        .with_device(DeviceConfig::new("a"))
        .with_device(DeviceConfig::new("b"));
    config.install.first_session_id = 5;
    let server = FakeAdbServer::spawn(config).await.unwrap();
    let addr = server.addr();

    assert_eq!(
        AdbClient::exec(addr, "a", "pm install-create", b"").await,
        "Success: created install session [5]\n"
    );
    assert_eq!(
        AdbClient::exec(addr, "b", "pm install-create", b"").await,
        "Success: created install session [6]\n"
    );
    assert!(server.device("a").unwrap().has_session(5));
    assert!(!server.device("b").unwrap().has_session(5));
}

/// Uploads `payload` as a streamed split to `session` while reading the
/// reply, so the upload must be consumed for both halves to finish.
async fn upload_split(addr: SocketAddr, session: &str, payload: &[u8]) -> String {
    let mut client = AdbClient::device(addr, SERIAL).await;
    client
        .send(&format!(
            "exec:cmd package install-write -S {} {session} base.apk -",
            payload.len()
        ))
        .await;
    client.status().await.unwrap();

    let (mut reader, mut writer) = client.stream.split();
    let (written, reply) = tokio::join!(writer.write_all(payload), async {
        let mut reply = String::new();
        reader.read_to_string(&mut reply).await.map(|_| reply)
    });
    written.unwrap();
    reply.unwrap()
}

#[tokio::test]
async fn rejected_streamed_upload_is_read_in_full() {
    let server = server(Some("-1")).await;
    let payload = vec![0x5a; 2 * 1024 * 1024];

    assert_eq!(
        upload_split(server.addr(), "-1", &payload).await,
        "Failure [INSTALL_FAILED_INTERNAL_ERROR: session -1 was rejected]\n"
    );
    let unknown = upload_split(server.addr(), "99", &payload).await;
    assert!(
        unknown.starts_with("Failure [INSTALL_FAILED_INVALID_SESSION"),
        "{unknown}"
    );
}
