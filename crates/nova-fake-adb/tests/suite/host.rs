use nova_fake_adb::{DeviceConfig, FakeAdbConfig, FakeAdbServer};

use super::client::AdbClient;

async fn server(serials: &[&str]) -> FakeAdbServer {
    let config = serials
        .iter()
        .fold(FakeAdbConfig::default(), |config, serial| {
            config.with_device(DeviceConfig::new(*serial))
        });
    FakeAdbServer::spawn(config).await.unwrap()
}

#[tokio::test]
async fn version_and_device_listing() {
    let server = server(&["emulator-5554", "emulator-5556"]).await;

    assert_eq!(AdbClient::query(server.addr(), "host:version").await, "0029");
    assert_eq!(
        AdbClient::query(server.addr(), "host:devices").await,
        "emulator-5554\tdevice\nemulator-5556\tdevice\n"
    );
    assert_eq!(
        AdbClient::query(server.addr(), "host:devices-l").await,
        "emulator-5554\tdevice transport_id:1\nemulator-5556\tdevice transport_id:2\n"
    );
}

#[tokio::test]
async fn unknown_serial_and_unknown_requests_fail() {
    let server = server(&["emulator-5554"]).await;

    let mut client = AdbClient::connect(server.addr()).await;
    client.send("host:transport:missing").await;
    assert_eq!(
        client.status().await,
        Err("device 'missing' not found".to_string())
    );
    assert_eq!(client.read_to_string().await, "");

    let mut client = AdbClient::connect(server.addr()).await;
    client.send("host:frobnicate").await;
    assert_eq!(
        client.status().await,
        Err("unknown host service 'host:frobnicate'".to_string())
    );
}

#[tokio::test]
async fn sync_acknowledges_first_request_then_drains() {
    let server = server(&["emulator-5554"]).await;

    let mut client = AdbClient::device(server.addr(), "emulator-5554").await;
    client.send("sync:").await;
    client.status().await.unwrap();

    client.write(b"STAT\x04\0\0\0").await;
    let mut ack = [0u8; 8];
    tokio::io::AsyncReadExt::read_exact(&mut client.stream, &mut ack)
        .await
        .unwrap();
    assert_eq!(&ack, b"OKAY\0\0\0\0");

    client.write(b"/sdcardSEND\x10\0\0\0ignored payload!").await;
    client.finish_input().await;
    assert_eq!(client.read_to_string().await, "");
}

#[tokio::test]
async fn exec_reports_properties_and_unknown_programs() {
    let config = FakeAdbConfig::default().with_device(
        DeviceConfig::new("emulator-5554")
            .with_property("ro.build.version.sdk", "34")
            .with_property("ro.product.model", "sdk_gphone64"),
    );
    let server = FakeAdbServer::spawn(config).await.unwrap();
    let addr = server.addr();

    assert_eq!(
        AdbClient::exec(addr, "emulator-5554", "getprop ro.build.version.sdk", b"").await,
        "34\n"
    );
    assert_eq!(
        AdbClient::exec(addr, "emulator-5554", "getprop", b"").await,
        "[ro.build.version.sdk]: [34]\n[ro.product.model]: [sdk_gphone64]\n"
    );
    assert_eq!(
        AdbClient::exec(addr, "emulator-5554", "monkey -p x", b"").await,
        "/system/bin/sh: monkey: inaccessible or not found\n"
    );
}

#[tokio::test]
async fn dropping_the_server_stops_accepting() {
    let server = server(&["emulator-5554"]).await;
    let addr = server.addr();
    drop(server);

    // The accept loop observes cancellation asynchronously.
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_err() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("listener still accepting after drop");
}
