use std::fmt;
use std::str::FromStr;

use crate::error::ServiceError;

/// A `transport:arg` endpoint as used by forward and reverse requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SocketSpec {
    Tcp(u16),
    LocalAbstract(String),
    LocalReserved(String),
    LocalFilesystem(String),
    /// `local:<path>`, an alias of `localfilesystem:`.
    Local(String),
    Jdwp(u32),
    Dev(String),
}

impl SocketSpec {
    pub fn transport(&self) -> &'static str {
        match self {
            SocketSpec::Tcp(_) => "tcp",
            SocketSpec::LocalAbstract(_) => "localabstract",
            SocketSpec::LocalReserved(_) => "localreserved",
            SocketSpec::LocalFilesystem(_) => "localfilesystem",
            SocketSpec::Local(_) => "local",
            SocketSpec::Jdwp(_) => "jdwp",
            SocketSpec::Dev(_) => "dev",
        }
    }

    /// Filesystem path for specs that name a Unix socket on this host.
    pub fn filesystem_path(&self) -> Option<&str> {
        match self {
            SocketSpec::LocalFilesystem(path) | SocketSpec::Local(path) => Some(path),
            _ => None,
        }
    }
}

impl FromStr for SocketSpec {
    type Err = ServiceError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || ServiceError::malformed(format!("invalid socket spec '{text}'"));

        let (transport, arg) = text.split_once(':').ok_or_else(invalid)?;
        if arg.is_empty() {
            return Err(invalid());
        }
        let spec = match transport {
            "tcp" => SocketSpec::Tcp(arg.parse().map_err(|_| invalid())?),
            "localabstract" => SocketSpec::LocalAbstract(arg.to_string()),
            "localreserved" => SocketSpec::LocalReserved(arg.to_string()),
            "localfilesystem" => SocketSpec::LocalFilesystem(arg.to_string()),
            "local" => SocketSpec::Local(arg.to_string()),
            "jdwp" => SocketSpec::Jdwp(arg.parse().map_err(|_| invalid())?),
            "dev" => SocketSpec::Dev(arg.to_string()),
            _ => return Err(invalid()),
        };
        Ok(spec)
    }
}

impl fmt::Display for SocketSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketSpec::Tcp(port) => write!(f, "tcp:{port}"),
            SocketSpec::Jdwp(pid) => write!(f, "jdwp:{pid}"),
            SocketSpec::LocalAbstract(arg)
            | SocketSpec::LocalReserved(arg)
            | SocketSpec::LocalFilesystem(arg)
            | SocketSpec::Local(arg)
            | SocketSpec::Dev(arg) => write!(f, "{}:{arg}", self.transport()),
        }
    }
}

/// Parses `<from>;<to>`.
pub fn parse_pair(text: &str) -> Result<(SocketSpec, SocketSpec), ServiceError> {
    let (from, to) = text
        .split_once(';')
        .ok_or_else(|| ServiceError::malformed(format!("expected '<from>;<to>', got '{text}'")))?;
    Ok((from.parse()?, to.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specs_display_as_wire_text() {
        for text in [
            "tcp:8080",
            "localabstract:chrome_devtools_remote",
            "localreserved:x",
            "localfilesystem:/tmp/sock",
            "local:/tmp/sock",
            "jdwp:1234",
            "dev:/dev/ttyS0",
        ] {
            let spec: SocketSpec = text.parse().unwrap();
            assert_eq!(spec.to_string(), text);
        }
    }

    #[test]
    fn malformed_specs_are_rejected() {
        for text in ["tcp", "tcp:", "tcp:http", "tcp:70000", "jdwp:abc", "udp:53", ""] {
            assert!(
                matches!(text.parse::<SocketSpec>(), Err(ServiceError::Malformed(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn pair_needs_a_semicolon() {
        let (from, to) = parse_pair("tcp:0;localabstract:app").unwrap();
        assert_eq!(from, SocketSpec::Tcp(0));
        assert_eq!(to, SocketSpec::LocalAbstract("app".into()));
        assert!(parse_pair("tcp:1 tcp:2").is_err());
    }
}
