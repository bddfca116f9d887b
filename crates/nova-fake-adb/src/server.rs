use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::FakeAdbConfig;
use crate::device::Device;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;

/// Pause after a failed `accept` so a persistent error (e.g. `EMFILE`) does
/// not spin the accept loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// A fake ADB server listening on a TCP port.
///
/// Every accepted connection is served on its own task. Dropping the server
/// stops the accept loop and cancels in-flight connections; forwards created
/// through it live until their [`Device`] is dropped.
pub struct FakeAdbServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    dispatcher: Arc<Dispatcher>,
}

impl FakeAdbServer {
    pub async fn spawn(config: FakeAdbConfig) -> Result<Self, ServerError> {
        let dispatcher = Dispatcher::new(&config)?;
        Self::spawn_with_dispatcher(config.server.listen, dispatcher).await
    }

    pub async fn spawn_with_dispatcher(
        listen: SocketAddr,
        dispatcher: Dispatcher,
    ) -> Result<Self, ServerError> {
        let bind_err = |source: std::io::Error| ServerError::Bind {
            addr: listen,
            source,
        };
        let listener = TcpListener::bind(listen).await.map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;
        let shutdown = CancellationToken::new();
        let dispatcher = Arc::new(dispatcher);

        tracing::info!(
            target: "nova.fake_adb",
            %addr,
            devices = dispatcher.devices().len(),
            "fake adb server listening"
        );

        let task_shutdown = shutdown.clone();
        let task_dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            run(listener, task_dispatcher, task_shutdown).await;
        });

        Ok(Self {
            addr,
            shutdown,
            dispatcher,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn device(&self, serial: &str) -> Option<Arc<Device>> {
        self.dispatcher.device(serial).cloned()
    }

    /// Stops accepting connections and cancels the ones being served.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once [`FakeAdbServer::shutdown`] was called or the server
    /// was dropped.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await;
    }
}

impl Drop for FakeAdbServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(listener: TcpListener, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) {
    loop {
        let (socket, peer) = tokio::select! {
            _ = shutdown.cancelled() => return,
            accept = listener.accept() => match accept {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(target: "nova.fake_adb", error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };
        tracing::debug!(target: "nova.fake_adb", %peer, "accepted connection");

        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = dispatcher.serve(socket) => {}
            }
            tracing::trace!(target: "nova.fake_adb", %peer, "connection closed");
        });
    }
}
