//! Device services, keyed by the name before the first `:` of a service
//! request (`sync:`, `exec:pm path x`, `reverse:list-forward`, ...).

mod abb;
mod exec;
mod forward;
mod package;
mod stdio;
mod sync;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::InstallConfig;
use crate::device::Device;
use crate::error::Result;
use crate::wire::AdbStream;

pub use abb::AbbService;
pub use exec::ExecService;
pub use forward::{ForwardCommand, ForwardService, ReverseService};
pub use sync::SyncService;

/// Install-session settings shared by every connection of one server.
#[derive(Debug)]
pub struct InstallSettings {
    bad_session_id: Option<String>,
    next_session_id: AtomicU32,
}

impl InstallSettings {
    pub fn new(config: &InstallConfig) -> Self {
        Self {
            bad_session_id: config.bad_session_id.clone(),
            next_session_id: AtomicU32::new(config.first_session_id),
        }
    }

    pub fn allocate_session_id(&self) -> u32 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_bad_session(&self, session: &str) -> bool {
        self.bad_session_id.as_deref() == Some(session)
    }
}

/// What a service invocation runs against.
#[derive(Clone)]
pub struct ServiceContext {
    pub device: Arc<Device>,
    pub install: Arc<InstallSettings>,
}

/// One device service.
///
/// Implementations either fail before writing anything (the caller then
/// answers with `FAIL`) or write their own `OKAY` and reply body. `Io` errors
/// end the connection.
#[async_trait]
pub trait DeviceService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: &ServiceContext,
        args: &str,
        stream: &mut dyn AdbStream,
    ) -> Result<()>;
}

/// The static service table, built once per server.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<&'static str, Arc<dyn DeviceService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `sync`, `exec`, `abb`, `abb_exec`, `reverse` and `forward`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SyncService));
        registry.register(Arc::new(ExecService));
        registry.register(Arc::new(AbbService::shell_v2()));
        registry.register(Arc::new(AbbService::raw()));
        registry.register(Arc::new(ReverseService));
        registry.register(Arc::new(ForwardService));
        registry
    }

    /// Registers `service`, returning the one it replaces.
    pub fn register(&mut self, service: Arc<dyn DeviceService>) -> Option<Arc<dyn DeviceService>> {
        self.services.insert(service.name(), service)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn DeviceService>> {
        self.services.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.services.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Splits a service request into the registry key and its arguments.
///
/// `forward:`, `killforward:`, `killforward-all` and `list-forward` all route
/// to the `forward` service with the whole request as arguments. Anything
/// else splits on the first `:`; a request without one has empty arguments.
pub fn split_service(request: &str) -> (&str, &str) {
    if ForwardCommand::is_forward_command(request) {
        return ("forward", request);
    }
    request.split_once(':').unwrap_or((request, ""))
}
