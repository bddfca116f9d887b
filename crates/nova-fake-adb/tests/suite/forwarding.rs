use std::net::SocketAddr;

use nova_fake_adb::{DeviceConfig, FakeAdbConfig, FakeAdbServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::client::AdbClient;

const SERIAL: &str = "emulator-5554";

async fn server() -> FakeAdbServer {
    let config = FakeAdbConfig::default().with_device(DeviceConfig::new(SERIAL));
    FakeAdbServer::spawn(config).await.unwrap()
}

/// Runs a `reverse:` forward command and returns the second status frame
/// (and, on success, whatever followed it).
async fn reverse(addr: SocketAddr, command: &str) -> Result<String, String> {
    let mut client = AdbClient::device(addr, SERIAL).await;
    client.send(&format!("reverse:{command}")).await;
    client.status().await.unwrap();
    client.status().await?;
    Ok(client.read_to_string().await)
}

async fn reverse_list(addr: SocketAddr) -> String {
    let mut client = AdbClient::device(addr, SERIAL).await;
    client.send("reverse:list-forward").await;
    client.status().await.unwrap();
    client.body().await
}

/// Accepts connections forever and echoes what each one sends.
async fn echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    port
}

#[tokio::test]
async fn reverse_table_rebind_kill_and_list() {
    let server = server().await;
    let addr = server.addr();

    let port = reverse(addr, "forward:tcp:0;tcp:9000").await.unwrap();
    let port = port.get(4..).unwrap().to_string();
    assert!(port.parse::<u16>().unwrap() > 0);
    assert_eq!(reverse_list(addr).await, format!("UsbFfs tcp:{port} tcp:9000\n"));

    assert_eq!(
        reverse(addr, &format!("forward:norebind:tcp:{port};tcp:9001")).await,
        Err(format!("cannot rebind existing socket 'tcp:{port}'"))
    );
    assert_eq!(reverse_list(addr).await, format!("UsbFfs tcp:{port} tcp:9000\n"));

    // Without norebind the existing listener is retargeted.
    assert_eq!(
        reverse(addr, &format!("forward:tcp:{port};tcp:9002")).await,
        Ok(String::new())
    );
    assert_eq!(reverse_list(addr).await, format!("UsbFfs tcp:{port} tcp:9002\n"));

    assert_eq!(reverse(addr, "killforward-all").await, Ok(String::new()));
    assert_eq!(reverse_list(addr).await, "");

    assert_eq!(
        reverse(addr, &format!("killforward:tcp:{port}")).await,
        Err(format!("listener 'tcp:{port}' not found"))
    );
}

#[tokio::test]
async fn malformed_reverse_request_fails_before_ack() {
    let server = server().await;

    let mut client = AdbClient::device(server.addr(), SERIAL).await;
    client.send("reverse:forward:tcp:1").await;
    let err = client.status().await.unwrap_err();
    assert!(err.contains("tcp:1"), "{err}");
    assert!(server.device(SERIAL).unwrap().reverse_forwards().is_empty());
}

#[tokio::test]
async fn host_forward_bridges_connections() {
    let server = server().await;
    let echo_port = echo_server().await;

    let mut client = AdbClient::connect(server.addr()).await;
    client
        .send(&format!("host-serial:{SERIAL}:forward:tcp:0;tcp:{echo_port}"))
        .await;
    client.status().await.unwrap();
    client.status().await.unwrap();
    let local_port: u16 = client.body().await.parse().unwrap();

    let mut forwarded = TcpStream::connect(("127.0.0.1", local_port)).await.unwrap();
    forwarded.write_all(b"ping").await.unwrap();
    let mut reply = [0u8; 4];
    forwarded.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"ping");

    assert_eq!(
        AdbClient::query(server.addr(), "host:list-forward").await,
        format!("{SERIAL} tcp:{local_port} tcp:{echo_port}\n")
    );

    let mut client = AdbClient::connect(server.addr()).await;
    client
        .send(&format!("host:killforward:tcp:{local_port}"))
        .await;
    client.status().await.unwrap();
    client.status().await.unwrap();
    assert!(server.device(SERIAL).unwrap().forwards().is_empty());
}
