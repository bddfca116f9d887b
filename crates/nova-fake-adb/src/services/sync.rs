use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{DeviceService, ServiceContext};
use crate::error::Result;
use crate::wire::{self, AdbStream};

/// Reply sent for the first sync request: `OKAY` with a zero length.
const SYNC_ACK: &[u8; 8] = b"OKAY\0\0\0\0";

/// Accepts a sync session without implementing file transfer: acknowledges the
/// first request and discards everything else until the peer closes.
pub struct SyncService;

#[async_trait]
impl DeviceService for SyncService {
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn handle(
        &self,
        ctx: &ServiceContext,
        _args: &str,
        stream: &mut dyn AdbStream,
    ) -> Result<()> {
        wire::write_okay(stream).await?;

        let mut request = [0u8; 8];
        match stream.read_exact(&mut request).await {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err.into()),
        }
        stream.write_all(SYNC_ACK).await?;
        stream.flush().await?;

        let drained = tokio::io::copy(stream, &mut tokio::io::sink()).await?;
        tracing::debug!(
            target: "nova.fake_adb",
            serial = ctx.device.serial(),
            request = %String::from_utf8_lossy(&request[..4]),
            drained,
            "sync session closed"
        );
        Ok(())
    }
}
