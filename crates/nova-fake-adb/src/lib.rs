//! An in-process fake of the ADB server and device daemon.
//!
//! [`FakeAdbServer`] speaks the ADB smart-socket protocol on a TCP port so
//! that real ADB clients (or tests driving the wire directly) can exercise
//! transport selection, port forwarding, package installs and the `sync`
//! handshake against configured [`Device`]s without an emulator.

pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod forward;
pub mod server;
pub mod services;
pub mod socket_spec;
pub mod wire;

pub use config::{init_tracing, ConfigError, DeviceConfig, FakeAdbConfig};
pub use device::{Device, InstallFailure, InstallSession};
pub use dispatcher::Dispatcher;
pub use error::{ServerError, ServiceError};
pub use forward::{ForwardEntry, ForwardTable};
pub use server::FakeAdbServer;
pub use services::{DeviceService, ServiceContext, ServiceRegistry};
pub use socket_spec::SocketSpec;
