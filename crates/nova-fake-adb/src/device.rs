use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;

use crate::config::DeviceConfig;
use crate::forward::ForwardTable;

/// A `Failure [REASON: detail]` outcome of a package-manager command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallFailure {
    pub reason: &'static str,
    pub detail: String,
}

impl InstallFailure {
    pub fn new(reason: &'static str, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    fn missing_session(id: u32) -> Self {
        Self::new(
            "INSTALL_FAILED_INVALID_SESSION",
            format!("session {id} does not exist"),
        )
    }
}

impl fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failure [{}: {}]", self.reason, self.detail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSession {
    pub package: Option<String>,
    /// `(split name, bytes received)` for every `install-write`.
    pub writes: Vec<(String, u64)>,
}

/// A simulated device: its properties, installed packages, install sessions
/// and both forward tables.
pub struct Device {
    serial: String,
    transport_id: u64,
    properties: BTreeMap<String, String>,
    packages: Mutex<BTreeMap<String, Vec<String>>>,
    sessions: Mutex<BTreeMap<u32, InstallSession>>,
    forwards: ForwardTable,
    reverse_forwards: ForwardTable,
}

impl Device {
    pub fn new(config: &DeviceConfig, transport_id: u64) -> Self {
        Self {
            serial: config.serial.clone(),
            transport_id,
            properties: config.properties.clone(),
            packages: Mutex::new(config.packages.clone()),
            sessions: Mutex::new(BTreeMap::new()),
            forwards: ForwardTable::new(),
            reverse_forwards: ForwardTable::new(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn transport_id(&self) -> u64 {
        self.transport_id
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn package_paths(&self, package: &str) -> Vec<String> {
        self.packages
            .lock()
            .get(package)
            .cloned()
            .unwrap_or_default()
    }

    pub fn installed_packages(&self) -> Vec<String> {
        self.packages.lock().keys().cloned().collect()
    }

    /// Host-side `forward` mappings (`adb forward`).
    pub fn forwards(&self) -> &ForwardTable {
        &self.forwards
    }

    /// Device-side `reverse:forward` mappings (`adb reverse`).
    pub fn reverse_forwards(&self) -> &ForwardTable {
        &self.reverse_forwards
    }

    pub fn open_session(&self, id: u32, package: Option<String>) {
        self.sessions.lock().insert(
            id,
            InstallSession {
                package,
                writes: Vec::new(),
            },
        );
    }

    pub fn session(&self, id: u32) -> Option<InstallSession> {
        self.sessions.lock().get(&id).cloned()
    }

    pub fn has_session(&self, id: u32) -> bool {
        self.sessions.lock().contains_key(&id)
    }

    pub fn record_write(&self, id: u32, name: &str, bytes: u64) -> Result<(), InstallFailure> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| InstallFailure::missing_session(id))?;
        session.writes.push((name.to_string(), bytes));
        Ok(())
    }

    /// Closes the session and, when it names a package, registers its APK.
    pub fn commit_session(&self, id: u32) -> Result<InstallSession, InstallFailure> {
        let session = {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get(&id)
                .ok_or_else(|| InstallFailure::missing_session(id))?;
            if session.writes.is_empty() {
                return Err(InstallFailure::new(
                    "INSTALL_FAILED_INVALID_APK",
                    format!("session {id} has no APKs"),
                ));
            }
            sessions.remove(&id).unwrap_or_default()
        };

        if let Some(package) = &session.package {
            self.register_package(package);
        }
        Ok(session)
    }

    pub fn abandon_session(&self, id: u32) -> Result<(), InstallFailure> {
        self.sessions
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| InstallFailure::missing_session(id))
    }

    pub fn register_package(&self, package: &str) {
        let path = format!("/data/app/{package}/base.apk");
        let mut packages = self.packages.lock();
        let paths = packages.entry(package.to_string()).or_default();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("serial", &self.serial)
            .field("transport_id", &self.transport_id)
            .field("forwards", &self.forwards.len())
            .field("reverse_forwards", &self.reverse_forwards.len())
            .finish_non_exhaustive()
    }
}
