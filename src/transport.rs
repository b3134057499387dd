//! Locating and connecting to a message bus.

use std::env;
use std::path::PathBuf;

use tokio::net::UnixStream;

use crate::error::{Error, ErrorKind, Result};

const ENV_SESSION_BUS: &str = "DBUS_SESSION_BUS_ADDRESS";
const ENV_SYSTEM_BUS: &str = "DBUS_SYSTEM_BUS_ADDRESS";
const DEFAULT_SYSTEM_BUS: &str = "unix:path=/var/run/dbus/system_bus_socket";

/// The address of a bus.
///
/// # Examples
///
/// ```
/// use dbus_wire::Address;
///
/// let address = Address::parse("unix:path=/run/user/1000/bus,guid=cd02745969b360c9249650e261c699f9")?;
/// assert_eq!(address, Address::Path("/run/user/1000/bus".into()));
///
/// let address = Address::parse("unix:abstract=/tmp/dbus-E7vYk0Jm")?;
/// assert_eq!(address, Address::Abstract(b"/tmp/dbus-E7vYk0Jm".to_vec()));
/// # Ok::<_, dbus_wire::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Address {
    /// A unix domain socket in the filesystem.
    Path(PathBuf),
    /// A unix domain socket in the abstract namespace, only supported on
    /// linux.
    Abstract(Vec<u8>),
}

impl Address {
    /// Parse a bus address.
    ///
    /// An address may list several alternatives separated by `;`, the first
    /// one using a supported transport is picked.
    pub fn parse(address: &str) -> Result<Self> {
        for entry in address.split(';').filter(|e| !e.is_empty()) {
            let Some(("unix", params)) = entry.split_once(':') else {
                continue;
            };

            for param in params.split(',') {
                let Some((key, value)) = param.split_once('=') else {
                    return Err(invalid(address));
                };

                let Some(value) = unescape(value) else {
                    return Err(invalid(address));
                };

                match key {
                    "path" => match String::from_utf8(value) {
                        Ok(path) => return Ok(Address::Path(PathBuf::from(path))),
                        Err(..) => return Err(invalid(address)),
                    },
                    "abstract" => return Ok(Address::Abstract(value)),
                    _ => {}
                }
            }
        }

        Err(invalid(address))
    }

    /// The address of the session bus.
    ///
    /// This uses the `DBUS_SESSION_BUS_ADDRESS` environment variable to
    /// determine its address.
    pub fn session_bus() -> Result<Self> {
        Self::from_env(ENV_SESSION_BUS, None)
    }

    /// The address of the system bus.
    ///
    /// This uses the `DBUS_SYSTEM_BUS_ADDRESS` environment variable to
    /// determine its address or fallback to the well-known address
    /// `unix:path=/var/run/dbus/system_bus_socket`.
    pub fn system_bus() -> Result<Self> {
        Self::from_env(ENV_SYSTEM_BUS, Some(DEFAULT_SYSTEM_BUS))
    }

    fn from_env(env: &str, default: Option<&str>) -> Result<Self> {
        match env::var(env) {
            Ok(address) => Self::parse(&address),
            Err(..) => match default {
                Some(default) => Self::parse(default),
                None => Err(Error::new(ErrorKind::MissingBus)),
            },
        }
    }

    /// Connect a stream to this address.
    pub(crate) async fn connect(&self) -> Result<UnixStream> {
        log::debug!("Connecting to {self:?}");

        match self {
            Address::Path(path) => Ok(UnixStream::connect(path).await?),
            #[cfg(target_os = "linux")]
            Address::Abstract(name) => {
                use std::os::linux::net::SocketAddrExt;
                use std::os::unix::net::{SocketAddr, UnixStream as StdUnixStream};

                let address = SocketAddr::from_abstract_name(name)?;

                // Tokio can't connect to abstract addresses, so the connect
                // blocks on a worker thread instead.
                let stream = tokio::task::spawn_blocking(move || {
                    let stream = StdUnixStream::connect_addr(&address)?;
                    stream.set_nonblocking(true)?;
                    Ok::<_, std::io::Error>(stream)
                })
                .await
                .map_err(std::io::Error::from)??;

                Ok(UnixStream::from_std(stream)?)
            }
            #[cfg(not(target_os = "linux"))]
            Address::Abstract(..) => Err(Error::new(ErrorKind::InvalidAddress(
                "unix:abstract is only supported on linux".into(),
            ))),
        }
    }
}

fn invalid(address: &str) -> Error {
    Error::new(ErrorKind::InvalidAddress(address.into()))
}

/// Decode `%XX` escapes in an address value.
fn unescape(value: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(value.len());
    let mut bytes = value.bytes();

    while let Some(b) = bytes.next() {
        if b != b'%' {
            out.push(b);
            continue;
        }

        let hi = char::from(bytes.next()?).to_digit(16)?;
        let lo = char::from(bytes.next()?).to_digit(16)?;
        out.push((hi << 4 | lo) as u8);
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::error::{Category, ErrorKind};

    use super::Address;

    #[test]
    fn parse_addresses() -> anyhow::Result<()> {
        assert_eq!(
            Address::parse("unix:path=/var/run/dbus/system_bus_socket")?,
            Address::Path(PathBuf::from("/var/run/dbus/system_bus_socket"))
        );

        assert_eq!(
            Address::parse("unix:guid=cd02745969b360c9249650e261c699f9,path=/tmp/a%20b")?,
            Address::Path(PathBuf::from("/tmp/a b"))
        );

        assert_eq!(
            Address::parse("tcp:host=localhost,port=1234;unix:abstract=/tmp/dbus-x")?,
            Address::Abstract(b"/tmp/dbus-x".to_vec())
        );

        Ok(())
    }

    #[test]
    fn parse_invalid_addresses() {
        for address in ["", "tcp:host=localhost", "unix:path", "unix:path=%zz", "unix:guid=00"] {
            let error = Address::parse(address).unwrap_err();
            assert!(matches!(error.kind(), ErrorKind::InvalidAddress(..)), "{address}");
            assert_eq!(error.category(), Category::Connection);
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn connect_abstract() -> anyhow::Result<()> {
        use std::os::linux::net::SocketAddrExt;
        use std::os::unix::net::{SocketAddr, UnixListener};

        let name = format!("dbus-wire-{}", std::process::id()).into_bytes();
        let listener = UnixListener::bind_addr(&SocketAddr::from_abstract_name(&name)?)?;

        let _stream = Address::Abstract(name).connect().await?;
        let (_accepted, _) = listener.accept()?;
        Ok(())
    }
}
