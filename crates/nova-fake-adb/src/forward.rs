use std::io;
use std::net::Ipv4Addr;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ServiceError};
use crate::socket_spec::SocketSpec;
use crate::wire::AdbStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardEntry {
    pub source: SocketSpec,
    pub destination: SocketSpec,
}

/// A bound listener bridging every accepted connection to `destination`.
///
/// Dropping the forwarder stops accepting; connections that are already
/// bridged keep running until either side closes.
struct Forwarder {
    source: SocketSpec,
    destination: watch::Sender<SocketSpec>,
    shutdown: CancellationToken,
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.shutdown.cancel();
        #[cfg(unix)]
        if let Some(path) = self.source.filesystem_path() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// The forward (or reverse) mappings of one device.
///
/// All mutations and listings go through one lock so `list` always sees a
/// consistent snapshot.
#[derive(Default)]
pub struct ForwardTable {
    forwarders: Mutex<Vec<Forwarder>>,
}

impl ForwardTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `source` and bridges it to `destination`.
    ///
    /// Returns the source as actually bound, which differs from the request
    /// for `tcp:0`. An existing source is retargeted, unless `no_rebind` is
    /// set, in which case the request is rejected.
    pub fn create(
        &self,
        source: &SocketSpec,
        destination: &SocketSpec,
        no_rebind: bool,
    ) -> Result<SocketSpec> {
        let mut forwarders = self.forwarders.lock();

        if let Some(existing) = forwarders.iter().find(|f| f.source == *source) {
            if no_rebind {
                return Err(ServiceError::rejected(format!(
                    "cannot rebind existing socket '{source}'"
                )));
            }
            existing.destination.send_replace(destination.clone());
            tracing::debug!(
                target: "nova.fake_adb",
                %source,
                %destination,
                "retargeted forward"
            );
            return Ok(source.clone());
        }

        let (listener, bound) = Listener::bind(source)?;
        let (destination_tx, destination_rx) = watch::channel(destination.clone());
        let shutdown = CancellationToken::new();
        tokio::spawn(run_listener(listener, destination_rx, shutdown.clone()));

        tracing::debug!(
            target: "nova.fake_adb",
            source = %bound,
            %destination,
            "created forward"
        );
        forwarders.push(Forwarder {
            source: bound.clone(),
            destination: destination_tx,
            shutdown,
        });
        Ok(bound)
    }

    pub fn remove(&self, source: &SocketSpec) -> Result<()> {
        let removed = {
            let mut forwarders = self.forwarders.lock();
            let index = forwarders
                .iter()
                .position(|f| f.source == *source)
                .ok_or_else(|| ServiceError::rejected(format!("listener '{source}' not found")))?;
            forwarders.remove(index)
        };
        drop(removed);
        tracing::debug!(target: "nova.fake_adb", %source, "removed forward");
        Ok(())
    }

    /// Removes every mapping and returns how many there were.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.forwarders.lock());
        removed.len()
    }

    pub fn list(&self) -> Vec<ForwardEntry> {
        self.forwarders
            .lock()
            .iter()
            .map(|f| ForwardEntry {
                source: f.source.clone(),
                destination: f.destination.borrow().clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.forwarders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

impl Listener {
    fn bind(spec: &SocketSpec) -> Result<(Self, SocketSpec)> {
        let bind_error =
            |err: io::Error| ServiceError::rejected(format!("cannot bind listener: {err}"));

        match spec {
            SocketSpec::Tcp(port) => {
                let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, *port))
                    .map_err(bind_error)?;
                listener.set_nonblocking(true).map_err(bind_error)?;
                let port = listener.local_addr().map_err(bind_error)?.port();
                let listener = TcpListener::from_std(listener).map_err(bind_error)?;
                Ok((Listener::Tcp(listener), SocketSpec::Tcp(port)))
            }
            #[cfg(unix)]
            SocketSpec::LocalFilesystem(path) | SocketSpec::Local(path) => {
                let listener =
                    std::os::unix::net::UnixListener::bind(path).map_err(bind_error)?;
                listener.set_nonblocking(true).map_err(bind_error)?;
                let listener = tokio::net::UnixListener::from_std(listener).map_err(bind_error)?;
                Ok((Listener::Unix(listener), spec.clone()))
            }
            other => Err(ServiceError::rejected(format!(
                "cannot bind listener: unsupported socket spec '{other}'"
            ))),
        }
    }

    async fn accept(&self) -> io::Result<Box<dyn AdbStream>> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
        }
    }
}

async fn connect(spec: &SocketSpec) -> io::Result<Box<dyn AdbStream>> {
    match spec {
        SocketSpec::Tcp(port) => Ok(Box::new(
            TcpStream::connect((Ipv4Addr::LOCALHOST, *port)).await?,
        )),
        #[cfg(unix)]
        SocketSpec::LocalFilesystem(path) | SocketSpec::Local(path) => {
            Ok(Box::new(tokio::net::UnixStream::connect(path).await?))
        }
        other => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot connect to '{other}'"),
        )),
    }
}

async fn run_listener(
    listener: Listener,
    destination: watch::Receiver<SocketSpec>,
    shutdown: CancellationToken,
) {
    loop {
        let inbound = tokio::select! {
            _ = shutdown.cancelled() => return,
            accept = listener.accept() => match accept {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::debug!(target: "nova.fake_adb", error = %err, "forward listener failed");
                    return;
                }
            },
        };

        let target = destination.borrow().clone();
        tokio::spawn(bridge(inbound, target));
    }
}

async fn bridge(mut inbound: Box<dyn AdbStream>, target: SocketSpec) {
    let mut outbound = match connect(&target).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::debug!(
                target: "nova.fake_adb",
                destination = %target,
                error = %err,
                "forward destination unreachable"
            );
            return;
        }
    };

    if let Err(err) = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await {
        tracing::trace!(target: "nova.fake_adb", error = %err, "forwarded connection ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn echo_server() -> u16 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut rd, mut wr) = stream.split();
                    let _ = tokio::io::copy(&mut rd, &mut wr).await;
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn ephemeral_port_is_resolved_and_bridged() {
        let echo = echo_server().await;
        let table = ForwardTable::new();

        let bound = table
            .create(&SocketSpec::Tcp(0), &SocketSpec::Tcp(echo), false)
            .unwrap();
        let SocketSpec::Tcp(port) = bound else {
            panic!("expected a tcp spec");
        };
        assert_ne!(port, 0);

        let mut client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"ping");
    }

    #[tokio::test]
    async fn norebind_rejects_existing_source_and_rebind_retargets() {
        let table = ForwardTable::new();
        let source = table
            .create(&SocketSpec::Tcp(0), &SocketSpec::Tcp(1), false)
            .unwrap();

        let err = table
            .create(&source, &SocketSpec::Tcp(2), true)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)));
        assert_eq!(table.list()[0].destination, SocketSpec::Tcp(1));

        table.create(&source, &SocketSpec::Tcp(3), false).unwrap();
        assert_eq!(
            table.list(),
            vec![ForwardEntry {
                source,
                destination: SocketSpec::Tcp(3)
            }]
        );
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let table = ForwardTable::new();
        let a = table
            .create(&SocketSpec::Tcp(0), &SocketSpec::Tcp(1), false)
            .unwrap();
        table
            .create(&SocketSpec::Tcp(0), &SocketSpec::Tcp(2), false)
            .unwrap();
        assert_eq!(table.len(), 2);

        table.remove(&a).unwrap();
        assert!(matches!(table.remove(&a), Err(ServiceError::Rejected(_))));
        assert_eq!(table.clear(), 1);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn unsupported_sources_are_rejected() {
        let table = ForwardTable::new();
        let err = table
            .create(
                &SocketSpec::LocalAbstract("app".into()),
                &SocketSpec::Tcp(1),
                false,
            )
            .unwrap_err();
        assert!(err.to_string().starts_with("cannot bind listener"));
    }
}
