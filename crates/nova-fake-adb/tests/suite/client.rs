use std::net::SocketAddr;

use nova_fake_adb::wire;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Minimal smart-socket client for driving a `FakeAdbServer`.
pub struct AdbClient {
    pub stream: TcpStream,
}

impl AdbClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self { stream }
    }

    /// Connects and switches to `serial`.
    pub async fn device(addr: SocketAddr, serial: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&format!("host:transport:{serial}")).await;
        client.status().await.unwrap();
        client
    }

    pub async fn send(&mut self, request: &str) {
        let frame = wire::encode_request(request).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    pub async fn status(&mut self) -> Result<(), String> {
        wire::read_status(&mut self.stream).await.unwrap()
    }

    pub async fn body(&mut self) -> String {
        let body = wire::read_length_prefixed(&mut self.stream).await.unwrap();
        String::from_utf8(body).unwrap()
    }

    /// One host request answered with `OKAY` and a length-prefixed body.
    pub async fn query(addr: SocketAddr, request: &str) -> String {
        let mut client = Self::connect(addr).await;
        client.send(request).await;
        client.status().await.unwrap();
        client.body().await
    }

    pub async fn write(&mut self, data: &[u8]) {
        self.stream.write_all(data).await.unwrap();
    }

    pub async fn finish_input(&mut self) {
        self.stream.shutdown().await.unwrap();
    }

    pub async fn read_to_string(&mut self) -> String {
        let mut out = String::new();
        self.stream.read_to_string(&mut out).await.unwrap();
        out
    }

    /// Runs `exec:<command>` on `serial` and returns everything it printed.
    pub async fn exec(addr: SocketAddr, serial: &str, command: &str, stdin: &[u8]) -> String {
        let mut client = Self::device(addr, serial).await;
        client.send(&format!("exec:{command}")).await;
        client.status().await.unwrap();
        client.write(stdin).await;
        client.read_to_string().await
    }
}
