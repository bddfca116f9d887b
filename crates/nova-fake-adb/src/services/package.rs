//! The package-manager commands reachable through `exec:pm ...`,
//! `exec:cmd package ...` and the `package` broker service of `abb`/`abb_exec`.

use std::io;

use super::stdio::ServiceIo;
use super::ServiceContext;
use crate::device::InstallFailure;
use crate::error::{Result, ServiceError};

/// Options that consume the following argument and are otherwise ignored.
const VALUE_OPTIONS: &[&str] = &[
    "--user",
    "-i",
    "--install-location",
    "--abi",
    "--install-reason",
    "--originating-uri",
    "--referrer",
    "--force-uuid",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteSource {
    /// No path, or `-`: the APK bytes follow on stdin.
    Stdin,
    /// A file already on the device; nothing is read from the connection.
    RemotePath(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PackageCommand {
    InstallCreate {
        package: Option<String>,
    },
    InstallWrite {
        size: Option<u64>,
        session: String,
        name: String,
        source: WriteSource,
    },
    InstallCommit {
        session: String,
    },
    InstallAbandon {
        session: String,
    },
    Install {
        size: Option<u64>,
        package: Option<String>,
        source: WriteSource,
    },
    Path {
        package: String,
    },
}

#[derive(Default)]
struct Options {
    size: Option<u64>,
    package: Option<String>,
    positionals: Vec<String>,
}

fn parse_options<S: AsRef<str>>(args: &[S]) -> Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter().map(|arg| arg.as_ref());
    while let Some(arg) = iter.next() {
        match arg {
            "-S" => {
                let value = iter
                    .next()
                    .ok_or_else(|| ServiceError::malformed("-S requires a size"))?;
                let size = value
                    .parse()
                    .map_err(|_| ServiceError::malformed(format!("invalid size '{value}'")))?;
                options.size = Some(size);
            }
            "-p" => {
                let value = iter
                    .next()
                    .ok_or_else(|| ServiceError::malformed("-p requires a package name"))?;
                options.package = Some(value.to_string());
            }
            option if VALUE_OPTIONS.contains(&option) => {
                iter.next()
                    .ok_or_else(|| ServiceError::malformed(format!("{option} requires a value")))?;
            }
            // Negative numbers are values (`install-write -1 ...`), not flags.
            flag if flag.len() > 1 && flag.starts_with('-') && flag.parse::<i64>().is_err() => {}
            positional => options.positionals.push(positional.to_string()),
        }
    }
    Ok(options)
}

fn write_source(path: Option<&String>) -> WriteSource {
    match path.map(String::as_str) {
        None | Some("-") => WriteSource::Stdin,
        Some(path) => WriteSource::RemotePath(path.to_string()),
    }
}

fn required(positionals: &[String], index: usize, what: &str, command: &str) -> Result<String> {
    positionals
        .get(index)
        .cloned()
        .ok_or_else(|| ServiceError::malformed(format!("{command}: missing {what}")))
}

impl PackageCommand {
    /// Parses the arguments following `pm`/`cmd package`/`package`.
    pub(crate) fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let Some((command, rest)) = args.split_first() else {
            return Err(ServiceError::malformed("missing package command"));
        };
        let command = command.as_ref();
        let options = parse_options(rest)?;
        let positionals = &options.positionals;

        let parsed = match command {
            "install-create" => PackageCommand::InstallCreate {
                package: options.package,
            },
            "install-write" => PackageCommand::InstallWrite {
                size: options.size,
                session: required(positionals, 0, "session id", command)?,
                name: required(positionals, 1, "split name", command)?,
                source: write_source(positionals.get(2)),
            },
            "install-commit" => PackageCommand::InstallCommit {
                session: required(positionals, 0, "session id", command)?,
            },
            "install-abandon" => PackageCommand::InstallAbandon {
                session: required(positionals, 0, "session id", command)?,
            },
            "install" => PackageCommand::Install {
                size: options.size,
                source: write_source(positionals.first()),
                package: options.package,
            },
            "path" => PackageCommand::Path {
                package: required(positionals, 0, "package name", command)?,
            },
            other => {
                return Err(ServiceError::malformed(format!(
                    "unsupported package command '{other}'"
                )))
            }
        };
        Ok(parsed)
    }

    /// Runs the command and returns its exit status.
    pub(crate) async fn run(self, ctx: &ServiceContext, io: &mut ServiceIo<'_>) -> io::Result<u8> {
        match self {
            PackageCommand::InstallCreate { package } => {
                let id = ctx.install.allocate_session_id();
                ctx.device.open_session(id, package);
                tracing::debug!(
                    target: "nova.fake_adb",
                    serial = ctx.device.serial(),
                    session = id,
                    "created install session"
                );
                succeed(io, &format!("Success: created install session [{id}]\n")).await
            }
            PackageCommand::InstallWrite {
                size,
                session,
                name,
                source,
            } => {
                // The client uploads a streamed split regardless of the
                // outcome, so it is consumed before the session is checked.
                let streamed = match source {
                    WriteSource::Stdin => Some(io.drain_stdin(size).await?),
                    WriteSource::RemotePath(_) => None,
                };
                let id = match resolve_session(ctx, &session) {
                    Ok(id) => id,
                    Err(failure) => return fail(io, failure).await,
                };
                let (bytes, message) = match streamed {
                    Some(bytes) => (bytes, format!("Success: streamed {bytes} bytes\n")),
                    None => (size.unwrap_or(0), "Success\n".to_string()),
                };
                if let Err(failure) = ctx.device.record_write(id, &name, bytes) {
                    return fail(io, failure).await;
                }
                succeed(io, &message).await
            }
            PackageCommand::InstallCommit { session } => {
                let committed = resolve_session(ctx, &session)
                    .and_then(|id| ctx.device.commit_session(id));
                match committed {
                    Ok(committed) => {
                        tracing::info!(
                            target: "nova.fake_adb",
                            serial = ctx.device.serial(),
                            %session,
                            package = committed.package.as_deref().unwrap_or(""),
                            splits = committed.writes.len(),
                            "committed install session"
                        );
                        succeed(io, "Success\n").await
                    }
                    Err(failure) => fail(io, failure).await,
                }
            }
            PackageCommand::InstallAbandon { session } => {
                match resolve_session(ctx, &session)
                    .and_then(|id| ctx.device.abandon_session(id))
                {
                    Ok(()) => succeed(io, "Success\n").await,
                    Err(failure) => fail(io, failure).await,
                }
            }
            PackageCommand::Install {
                size,
                package,
                source,
            } => {
                if let WriteSource::Stdin = source {
                    io.drain_stdin(size).await?;
                }
                if let Some(package) = &package {
                    ctx.device.register_package(package);
                }
                succeed(io, "Success\n").await
            }
            PackageCommand::Path { package } => {
                let paths = ctx.device.package_paths(&package);
                if paths.is_empty() {
                    return Ok(1);
                }
                let listing: String = paths
                    .iter()
                    .map(|path| format!("package:{path}\n"))
                    .collect();
                succeed(io, &listing).await
            }
        }
    }
}

/// Maps a session argument to a live session id. The configured bad session
/// id always fails, whether or not such a session exists.
fn resolve_session(ctx: &ServiceContext, session: &str) -> Result<u32, InstallFailure> {
    if ctx.install.is_bad_session(session) {
        return Err(InstallFailure::new(
            "INSTALL_FAILED_INTERNAL_ERROR",
            format!("session {session} was rejected"),
        ));
    }
    session
        .parse::<u32>()
        .ok()
        .filter(|id| ctx.device.has_session(*id))
        .ok_or_else(|| {
            InstallFailure::new(
                "INSTALL_FAILED_INVALID_SESSION",
                format!("session {session} does not exist"),
            )
        })
}

async fn succeed(io: &mut ServiceIo<'_>, message: &str) -> io::Result<u8> {
    io.stdout(message.as_bytes()).await?;
    Ok(0)
}

async fn fail(io: &mut ServiceIo<'_>, failure: InstallFailure) -> io::Result<u8> {
    io.stdout(format!("{failure}\n").as_bytes()).await?;
    Ok(1)
}
