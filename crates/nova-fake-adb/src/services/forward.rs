use async_trait::async_trait;

use super::{DeviceService, ServiceContext};
use crate::error::{Result, ServiceError};
use crate::forward::ForwardTable;
use crate::socket_spec::{parse_pair, SocketSpec};
use crate::wire::{self, AdbStream};

/// Transport name printed in front of every `reverse:list-forward` line.
const REVERSE_LIST_TRANSPORT: &str = "UsbFfs";

/// A forward-table request, shared by `reverse:` and host forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardCommand {
    /// `forward:[norebind:]<source>;<destination>`
    Create {
        no_rebind: bool,
        source: SocketSpec,
        destination: SocketSpec,
    },
    /// `killforward:<source>`
    Remove(SocketSpec),
    /// `killforward-all`
    RemoveAll,
    /// `list-forward`
    List,
}

impl ForwardCommand {
    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "killforward-all" => return Ok(ForwardCommand::RemoveAll),
            "list-forward" => return Ok(ForwardCommand::List),
            _ => {}
        }
        if let Some(source) = text.strip_prefix("killforward:") {
            return Ok(ForwardCommand::Remove(source.parse()?));
        }
        if let Some(rest) = text.strip_prefix("forward:") {
            let (no_rebind, pair) = match rest.strip_prefix("norebind:") {
                Some(pair) => (true, pair),
                None => (false, rest),
            };
            let (source, destination) = parse_pair(pair)?;
            return Ok(ForwardCommand::Create {
                no_rebind,
                source,
                destination,
            });
        }
        Err(ServiceError::malformed(format!(
            "unknown forward command '{text}'"
        )))
    }

    /// Whether `text` names one of the forward commands, without validating
    /// its arguments.
    pub fn is_forward_command(text: &str) -> bool {
        text == "killforward-all"
            || text == "list-forward"
            || text.starts_with("killforward:")
            || text.starts_with("forward:")
    }

    /// Applies the command to `table` and writes the reply.
    ///
    /// Mutations answer with two status frames (the request was accepted, then
    /// its outcome); `tcp:0` sources follow the second `OKAY` with the bound
    /// port. `list-forward` answers `OKAY` plus one length-prefixed body with a
    /// `<list_prefix> <source> <destination>` line per mapping.
    pub async fn execute(
        self,
        table: &ForwardTable,
        list_prefix: &str,
        stream: &mut dyn AdbStream,
    ) -> Result<()> {
        match self {
            ForwardCommand::Create {
                no_rebind,
                source,
                destination,
            } => {
                wire::write_okay(stream).await?;
                match table.create(&source, &destination, no_rebind) {
                    Ok(bound) => {
                        wire::write_okay(stream).await?;
                        if let (SocketSpec::Tcp(0), SocketSpec::Tcp(port)) = (&source, &bound) {
                            wire::write_length_prefixed(stream, port.to_string().as_bytes())
                                .await?;
                        }
                    }
                    Err(err) => wire::write_fail(stream, &err.to_string()).await?,
                }
            }
            ForwardCommand::Remove(source) => {
                wire::write_okay(stream).await?;
                match table.remove(&source) {
                    Ok(()) => wire::write_okay(stream).await?,
                    Err(err) => wire::write_fail(stream, &err.to_string()).await?,
                }
            }
            ForwardCommand::RemoveAll => {
                let removed = table.clear();
                tracing::debug!(target: "nova.fake_adb", removed, "removed all forwards");
                wire::write_okay(stream).await?;
                wire::write_okay(stream).await?;
            }
            ForwardCommand::List => {
                let body: String = table
                    .list()
                    .iter()
                    .map(|entry| {
                        format!("{list_prefix} {} {}\n", entry.source, entry.destination)
                    })
                    .collect();
                wire::write_okay(stream).await?;
                wire::write_length_prefixed(stream, body.as_bytes()).await?;
            }
        }
        Ok(())
    }
}

/// `reverse:<forward command>`: device-side listeners bridged back to the host.
pub struct ReverseService;

#[async_trait]
impl DeviceService for ReverseService {
    fn name(&self) -> &'static str {
        "reverse"
    }

    async fn handle(
        &self,
        ctx: &ServiceContext,
        args: &str,
        stream: &mut dyn AdbStream,
    ) -> Result<()> {
        let command = ForwardCommand::parse(args)?;
        tracing::debug!(
            target: "nova.fake_adb",
            serial = ctx.device.serial(),
            ?command,
            "reverse"
        );
        command
            .execute(ctx.device.reverse_forwards(), REVERSE_LIST_TRANSPORT, stream)
            .await
    }
}

/// Host-side forwarding for one device (`host-serial:<serial>:forward:...`).
/// `args` is the whole forward command, including its name.
pub struct ForwardService;

#[async_trait]
impl DeviceService for ForwardService {
    fn name(&self) -> &'static str {
        "forward"
    }

    async fn handle(
        &self,
        ctx: &ServiceContext,
        args: &str,
        stream: &mut dyn AdbStream,
    ) -> Result<()> {
        let command = ForwardCommand::parse(args)?;
        tracing::debug!(
            target: "nova.fake_adb",
            serial = ctx.device.serial(),
            ?command,
            "forward"
        );
        command
            .execute(ctx.device.forwards(), ctx.device.serial(), stream)
            .await
    }
}
