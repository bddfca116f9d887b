use async_trait::async_trait;

use super::package::PackageCommand;
use super::stdio::{Framing, ServiceIo};
use super::{DeviceService, ServiceContext};
use crate::error::{Result, ServiceError};
use crate::wire::{self, AdbStream};

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExecCommand {
    Package(PackageCommand),
    Getprop(Option<String>),
    Cat,
    Echo(String),
    NotFound { program: String, message: String },
}

impl ExecCommand {
    fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&first) = tokens.first() else {
            return Err(ServiceError::malformed("empty exec command"));
        };
        let program = first.strip_prefix("/system/bin/").unwrap_or(first);

        let command = match program {
            "pm" => ExecCommand::Package(PackageCommand::parse(&tokens[1..])?),
            "cmd" => match tokens.get(1) {
                Some(&"package") => ExecCommand::Package(PackageCommand::parse(&tokens[2..])?),
                Some(service) => ExecCommand::NotFound {
                    program: program.to_string(),
                    message: format!("cmd: Can't find service: {service}\n"),
                },
                None => return Err(ServiceError::malformed("cmd: missing service name")),
            },
            "getprop" => ExecCommand::Getprop(tokens.get(1).map(|name| name.to_string())),
            "cat" => ExecCommand::Cat,
            "echo" => ExecCommand::Echo(tokens[1..].join(" ")),
            other => ExecCommand::NotFound {
                program: other.to_string(),
                message: format!("/system/bin/sh: {other}: inaccessible or not found\n"),
            },
        };
        Ok(command)
    }
}

/// `exec:<command line>`: raw stdin/stdout, no exit status.
pub struct ExecService;

#[async_trait]
impl DeviceService for ExecService {
    fn name(&self) -> &'static str {
        "exec"
    }

    async fn handle(
        &self,
        ctx: &ServiceContext,
        args: &str,
        stream: &mut dyn AdbStream,
    ) -> Result<()> {
        let command = ExecCommand::parse(args)?;
        wire::write_okay(stream).await?;

        tracing::debug!(
            target: "nova.fake_adb",
            serial = ctx.device.serial(),
            command = args,
            "exec"
        );

        let mut io = ServiceIo::new(stream, Framing::Raw);
        match command {
            ExecCommand::Package(command) => {
                command.run(ctx, &mut io).await?;
            }
            ExecCommand::Getprop(Some(name)) => {
                let value = ctx.device.property(&name).unwrap_or_default();
                io.stdout(format!("{value}\n").as_bytes()).await?;
            }
            ExecCommand::Getprop(None) => {
                let listing: String = ctx
                    .device
                    .properties()
                    .iter()
                    .map(|(key, value)| format!("[{key}]: [{value}]\n"))
                    .collect();
                io.stdout(listing.as_bytes()).await?;
            }
            ExecCommand::Cat => {
                io.copy_stdin_to_stdout().await?;
            }
            ExecCommand::Echo(text) => {
                io.stdout(format!("{text}\n").as_bytes()).await?;
            }
            ExecCommand::NotFound { program, message } => {
                tracing::debug!(target: "nova.fake_adb", %program, "unknown exec program");
                io.stderr(message.as_bytes()).await?;
            }
        }
        Ok(())
    }
}
