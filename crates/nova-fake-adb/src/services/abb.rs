use async_trait::async_trait;

use super::package::PackageCommand;
use super::stdio::{Framing, ServiceIo};
use super::{DeviceService, ServiceContext};
use crate::error::{Result, ServiceError};
use crate::wire::{self, AdbStream};

/// The Android binder bridge: `abb:<service>\0<arg>\0...`.
///
/// `abb` frames its streams with the shell v2 protocol and reports an exit
/// status; `abb_exec` uses the raw socket like `exec`.
pub struct AbbService {
    framing: Framing,
}

impl AbbService {
    pub fn shell_v2() -> Self {
        Self {
            framing: Framing::ShellV2,
        }
    }

    pub fn raw() -> Self {
        Self {
            framing: Framing::Raw,
        }
    }
}

#[async_trait]
impl DeviceService for AbbService {
    fn name(&self) -> &'static str {
        match self.framing {
            Framing::ShellV2 => "abb",
            Framing::Raw => "abb_exec",
        }
    }

    async fn handle(
        &self,
        ctx: &ServiceContext,
        args: &str,
        stream: &mut dyn AdbStream,
    ) -> Result<()> {
        let mut parts = args.split('\0');
        let service = parts.next().unwrap_or_default();
        if service.is_empty() {
            return Err(ServiceError::malformed(format!(
                "{}: missing service name",
                self.name()
            )));
        }
        let service_args: Vec<&str> = parts.filter(|arg| !arg.is_empty()).collect();

        let command = match service {
            "package" => Some(PackageCommand::parse(&service_args)?),
            _ => None,
        };
        wire::write_okay(stream).await?;

        tracing::debug!(
            target: "nova.fake_adb",
            serial = ctx.device.serial(),
            abb = self.name(),
            service,
            args = %service_args.join(" "),
            "binder call"
        );

        let mut io = ServiceIo::new(stream, self.framing);
        let code = match command {
            Some(command) => command.run(ctx, &mut io).await?,
            None => {
                io.stderr(format!("Error: unknown service '{service}'\n").as_bytes())
                    .await?;
                1
            }
        };
        io.exit(code).await?;
        Ok(())
    }
}
