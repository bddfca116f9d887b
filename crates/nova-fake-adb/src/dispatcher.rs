//! Per-connection request handling.
//!
//! A connection starts in the host namespace: it may query the server
//! (`host:version`, `host:devices`), manage host-side forwards, or select a
//! device with `host:transport:<serial>`. The request after a successful
//! transport switch is a device service, looked up in the [`ServiceRegistry`]
//! and run to completion; the connection then closes.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::{ConfigError, FakeAdbConfig};
use crate::device::Device;
use crate::error::{Result, ServiceError};
use crate::services::{split_service, InstallSettings, ServiceContext, ServiceRegistry};
use crate::wire::{self, AdbStream};

/// Protocol version reported by `host:version`.
pub const ADB_SERVER_VERSION: u32 = 41;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selector<'a> {
    Serial(&'a str),
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostRequest<'a> {
    Version,
    Devices { long: bool },
    /// `host:transport*`; `tport` replies also carry the transport id.
    Transport { selector: Selector<'a>, tport: bool },
    /// `host:list-forward`, across every device.
    ListForwards,
    /// A forward command scoped to one device.
    Forward {
        selector: Selector<'a>,
        command: &'a str,
    },
}

impl<'a> HostRequest<'a> {
    fn parse(request: &'a str) -> Result<Self> {
        if let Some(rest) = request.strip_prefix("host-serial:") {
            return parse_serial_forward(rest)
                .ok_or_else(|| unknown_host_service(request));
        }
        let Some(service) = request.strip_prefix("host:") else {
            return Err(unknown_host_service(request));
        };

        let parsed = match service {
            "version" => HostRequest::Version,
            "devices" => HostRequest::Devices { long: false },
            "devices-l" => HostRequest::Devices { long: true },
            "transport-any" => HostRequest::Transport {
                selector: Selector::Any,
                tport: false,
            },
            "tport:any" => HostRequest::Transport {
                selector: Selector::Any,
                tport: true,
            },
            "list-forward" => HostRequest::ListForwards,
            _ => {
                if let Some(serial) = service.strip_prefix("transport:") {
                    HostRequest::Transport {
                        selector: Selector::Serial(non_empty_serial(serial)?),
                        tport: false,
                    }
                } else if let Some(serial) = service.strip_prefix("tport:serial:") {
                    HostRequest::Transport {
                        selector: Selector::Serial(non_empty_serial(serial)?),
                        tport: true,
                    }
                } else if split_service(service).0 == "forward" {
                    HostRequest::Forward {
                        selector: Selector::Any,
                        command: service,
                    }
                } else {
                    return Err(unknown_host_service(request));
                }
            }
        };
        Ok(parsed)
    }
}

/// Splits `<serial>:<forward command>`. Serials may contain `:` (for
/// example `127.0.0.1:5555`), so the split is at the first `:` whose suffix
/// is a forward command.
fn parse_serial_forward(rest: &str) -> Option<HostRequest<'_>> {
    rest.match_indices(':').find_map(|(index, _)| {
        let (serial, command) = (&rest[..index], &rest[index + 1..]);
        (!serial.is_empty() && split_service(command).0 == "forward").then_some(
            HostRequest::Forward {
                selector: Selector::Serial(serial),
                command,
            },
        )
    })
}

fn non_empty_serial(serial: &str) -> Result<&str> {
    if serial.is_empty() {
        return Err(ServiceError::malformed("empty device serial"));
    }
    Ok(serial)
}

fn unknown_host_service(request: &str) -> ServiceError {
    ServiceError::rejected(format!("unknown host service '{request}'"))
}

/// Routes requests to host handlers and device services.
pub struct Dispatcher {
    devices: Vec<Arc<Device>>,
    install: Arc<InstallSettings>,
    registry: ServiceRegistry,
}

impl Dispatcher {
    /// Builds the device set described by `config`. Transport ids are
    /// assigned from 1 in configuration order.
    pub fn new(config: &FakeAdbConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let devices = config
            .devices
            .iter()
            .zip(1u64..)
            .map(|(device, transport_id)| Arc::new(Device::new(device, transport_id)))
            .collect();
        Ok(Self {
            devices,
            install: Arc::new(InstallSettings::new(&config.install)),
            registry: ServiceRegistry::with_defaults(),
        })
    }

    /// Replaces the device service table.
    pub fn with_registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    pub fn device(&self, serial: &str) -> Option<&Arc<Device>> {
        self.devices.iter().find(|device| device.serial() == serial)
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Serves one connection until the peer closes it or a device service
    /// completes.
    ///
    /// Rejected and malformed requests are answered with `FAIL` and end the
    /// connection; I/O errors drop it silently.
    pub async fn serve<S>(&self, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let err = match self.serve_requests(&mut stream).await {
            Ok(()) => return,
            Err(err) => err,
        };
        match err.fail_message() {
            Some(message) => {
                tracing::debug!(target: "nova.fake_adb", %message, "request failed");
                if let Err(err) = wire::write_fail(&mut stream, &message).await {
                    tracing::debug!(target: "nova.fake_adb", error = %err, "failed to report failure");
                }
            }
            None => {
                tracing::debug!(target: "nova.fake_adb", error = %err, "connection dropped");
            }
        }
    }

    async fn serve_requests(&self, stream: &mut dyn AdbStream) -> Result<()> {
        while let Some(request) = wire::read_request(stream).await? {
            tracing::trace!(target: "nova.fake_adb", %request, "host request");
            match HostRequest::parse(&request)? {
                HostRequest::Version => {
                    let version = format!("{ADB_SERVER_VERSION:04x}");
                    wire::write_okay(stream).await?;
                    wire::write_length_prefixed(stream, version.as_bytes()).await?;
                }
                HostRequest::Devices { long } => {
                    let body: String = self
                        .devices
                        .iter()
                        .map(|device| {
                            if long {
                                format!(
                                    "{}\tdevice transport_id:{}\n",
                                    device.serial(),
                                    device.transport_id()
                                )
                            } else {
                                format!("{}\tdevice\n", device.serial())
                            }
                        })
                        .collect();
                    wire::write_okay(stream).await?;
                    wire::write_length_prefixed(stream, body.as_bytes()).await?;
                }
                HostRequest::ListForwards => {
                    let body: String = self
                        .devices
                        .iter()
                        .flat_map(|device| {
                            device.forwards().list().into_iter().map(move |entry| {
                                format!(
                                    "{} {} {}\n",
                                    device.serial(),
                                    entry.source,
                                    entry.destination
                                )
                            })
                        })
                        .collect();
                    wire::write_okay(stream).await?;
                    wire::write_length_prefixed(stream, body.as_bytes()).await?;
                }
                HostRequest::Forward { selector, command } => {
                    let device = self.select(selector)?;
                    return self.run_service(device, command, stream).await;
                }
                HostRequest::Transport { selector, tport } => {
                    let device = self.select(selector)?;
                    wire::write_okay(stream).await?;
                    if tport {
                        stream
                            .write_all(&device.transport_id().to_le_bytes())
                            .await?;
                        stream.flush().await?;
                    }
                    tracing::debug!(
                        target: "nova.fake_adb",
                        serial = device.serial(),
                        "switched transport"
                    );

                    let Some(request) = wire::read_request(stream).await? else {
                        return Ok(());
                    };
                    return self.run_service(device, &request, stream).await;
                }
            }
        }
        Ok(())
    }

    fn select(&self, selector: Selector<'_>) -> Result<Arc<Device>> {
        match selector {
            Selector::Serial(serial) => self
                .device(serial)
                .cloned()
                .ok_or_else(|| ServiceError::rejected(format!("device '{serial}' not found"))),
            Selector::Any => match self.devices.as_slice() {
                [device] => Ok(Arc::clone(device)),
                [] => Err(ServiceError::rejected("no devices/emulators found")),
                _ => Err(ServiceError::rejected("more than one device/emulator")),
            },
        }
    }

    async fn run_service(
        &self,
        device: Arc<Device>,
        request: &str,
        stream: &mut dyn AdbStream,
    ) -> Result<()> {
        let (name, args) = split_service(request);
        let service = self
            .registry
            .get(name)
            .ok_or_else(|| ServiceError::rejected(format!("unknown device service '{request}'")))?;

        tracing::debug!(
            target: "nova.fake_adb",
            serial = device.serial(),
            service = service.name(),
            "dispatching device service"
        );
        let ctx = ServiceContext {
            device,
            install: Arc::clone(&self.install),
        };
        service.handle(&ctx, args, stream).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("devices", &self.devices)
            .field("services", &self.registry.names())
            .finish_non_exhaustive()
    }
}
