//! Types related to SASL authentication which D-Bus performs.
//!
//! The handshake is line-oriented: every command is a space-separated line
//! terminated by `\r\n`, and binary payloads are hex encoded.

#[cfg(test)]
mod tests;

use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, ErrorKind, Result};

/// The maximum length of a single line sent by the server, including the
/// line terminator.
pub const MAX_LINE_LENGTH: usize = 16 * 1024;

const HEX: [u8; 16] = *b"0123456789abcdef";

/// A GUID sent over SASL.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid([u8; 16]);

impl Guid {
    /// Construct a GUID from raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The raw bytes of the GUID.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(&self.0))
    }
}

impl fmt::Debug for Guid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guid").field(&to_hex(&self.0)).finish()
    }
}

/// A command sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClientCommand {
    /// Start authenticating with the given mechanism.
    Auth {
        /// The name of the mechanism, like `EXTERNAL`.
        mechanism: String,
        /// Initial response, sent hex encoded.
        initial_response: Vec<u8>,
    },
    /// Abandon the current authentication exchange.
    Cancel,
    /// Leave the handshake and switch to the binary protocol.
    Begin,
    /// Mechanism specific data.
    Data(Vec<u8>),
    /// The client couldn't make sense of the last server command.
    Error(String),
    /// Ask the server whether unix file descriptors can be passed.
    NegotiateUnixFd,
}

impl ClientCommand {
    /// EXTERNAL authentication for the given user id.
    ///
    /// The initial response is the decimal representation of the id.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_wire::sasl::ClientCommand;
    ///
    /// let command = ClientCommand::external(1000);
    /// assert_eq!(command.to_string(), "AUTH EXTERNAL 31303030");
    /// ```
    pub fn external(uid: u32) -> Self {
        Self::Auth {
            mechanism: String::from("EXTERNAL"),
            initial_response: uid.to_string().into_bytes(),
        }
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCommand::Auth {
                mechanism,
                initial_response,
            } => write!(f, "AUTH {mechanism} {}", to_hex(initial_response)),
            ClientCommand::Cancel => f.write_str("CANCEL"),
            ClientCommand::Begin => f.write_str("BEGIN"),
            ClientCommand::Data(data) => write!(f, "DATA {}", to_hex(data)),
            ClientCommand::Error(explanation) => write!(f, "ERROR {explanation}"),
            ClientCommand::NegotiateUnixFd => f.write_str("NEGOTIATE_UNIX_FD"),
        }
    }
}

/// A command sent from the server to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServerCommand {
    /// Authentication failed, the server lists the mechanisms it supports.
    Rejected(Vec<String>),
    /// Authentication succeeded.
    Ok(Guid),
    /// Mechanism specific data.
    Data(Vec<u8>),
    /// The server couldn't make sense of the last client command.
    Error(String),
    /// Unix file descriptors can be passed.
    AgreeUnixFd,
}

impl ServerCommand {
    /// Decode a single line, without its terminator.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_wire::sasl::ServerCommand;
    ///
    /// let command = ServerCommand::decode("REJECTED EXTERNAL ANONYMOUS")?;
    /// assert_eq!(command, ServerCommand::Rejected(vec!["EXTERNAL".into(), "ANONYMOUS".into()]));
    /// # Ok::<_, dbus_wire::Error>(())
    /// ```
    pub fn decode(line: &str) -> Result<Self> {
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, Some(rest)),
            None => (line, None),
        };

        let command = match (command, rest) {
            ("REJECTED", rest) => ServerCommand::Rejected(
                rest.unwrap_or_default()
                    .split(' ')
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            ("OK", Some(guid)) => {
                let bytes = from_hex(guid)?;

                let Ok(guid) = <[u8; 16]>::try_from(bytes) else {
                    return Err(Error::new(ErrorKind::InvalidGuid));
                };

                ServerCommand::Ok(Guid(guid))
            }
            ("DATA", rest) => ServerCommand::Data(from_hex(rest.unwrap_or_default())?),
            ("ERROR", rest) => ServerCommand::Error(rest.unwrap_or_default().to_owned()),
            ("AGREE_UNIX_FD", None) => ServerCommand::AgreeUnixFd,
            ("OK" | "AGREE_UNIX_FD", _) => return Err(Error::new(ErrorKind::InvalidSasl)),
            (command, _) => {
                return Err(Error::new(ErrorKind::UnknownSaslCommand(command.into())));
            }
        };

        Ok(command)
    }
}

impl fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerCommand::Rejected(mechanisms) => {
                f.write_str("REJECTED")?;

                for mechanism in mechanisms {
                    write!(f, " {mechanism}")?;
                }

                Ok(())
            }
            ServerCommand::Ok(guid) => write!(f, "OK {guid}"),
            ServerCommand::Data(data) => write!(f, "DATA {}", to_hex(data)),
            ServerCommand::Error(explanation) => write!(f, "ERROR {explanation}"),
            ServerCommand::AgreeUnixFd => f.write_str("AGREE_UNIX_FD"),
        }
    }
}

/// Encode bytes as lowercase hex, two digits per byte.
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);

    for &b in bytes {
        out.push(char::from(HEX[usize::from(b >> 4)]));
        out.push(char::from(HEX[usize::from(b & 0xf)]));
    }

    out
}

/// Decode hex, accepting either case.
pub(crate) fn from_hex(hex: &str) -> Result<Vec<u8>> {
    fn digit(b: u8) -> Result<u8> {
        match b {
            b'0'..=b'9' => Ok(b - b'0'),
            b'a'..=b'f' => Ok(b - b'a' + 10),
            b'A'..=b'F' => Ok(b - b'A' + 10),
            _ => Err(Error::new(ErrorKind::InvalidHex)),
        }
    }

    let bytes = hex.as_bytes();

    if bytes.len() % 2 != 0 {
        return Err(Error::new(ErrorKind::InvalidHex));
    }

    bytes
        .chunks_exact(2)
        .map(|pair| Ok(digit(pair[0])? << 4 | digit(pair[1])?))
        .collect()
}

/// Send a single command.
pub async fn send<W>(writer: &mut W, command: &ClientCommand) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = format!("{command}\r\n");
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Receive a single command.
///
/// At most [`MAX_LINE_LENGTH`] bytes are buffered while looking for the end of
/// the line. Bytes following the line stay in `reader`.
pub async fn recv<R>(reader: &mut R) -> Result<ServerCommand>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader).await?;
    ServerCommand::decode(&line)
}

async fn read_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        let available = reader.fill_buf().await?;

        if available.is_empty() {
            return Err(Error::new(ErrorKind::UnexpectedEof));
        }

        let (done, used) = match available.iter().position(|&b| b == b'\n') {
            Some(n) => (true, n + 1),
            None => (false, available.len()),
        };

        if line.len() + used > MAX_LINE_LENGTH {
            return Err(Error::new(ErrorKind::LineTooLong));
        }

        line.extend_from_slice(&available[..used]);
        reader.consume(used);

        if done {
            break;
        }
    }

    let Some(line) = line.strip_suffix(b"\r\n") else {
        return Err(Error::new(ErrorKind::InvalidSasl));
    };

    Ok(std::str::from_utf8(line)?.to_owned())
}

/// The effective user id of the current process.
#[cfg(all(unix, feature = "libc"))]
pub(crate) fn process_uid() -> Option<u32> {
    // SAFETY: getuid has no preconditions and cannot fail.
    Some(unsafe { libc::getuid() })
}

#[cfg(not(all(unix, feature = "libc")))]
pub(crate) fn process_uid() -> Option<u32> {
    None
}

/// Perform the client side of the handshake using EXTERNAL authentication.
///
/// This writes the leading nul byte, authenticates as `uid`, negotiates unix
/// file descriptor passing and finally sends `BEGIN`. Returns the GUID of the
/// server.
///
/// `reader` should be the same buffered reader which is used for the binary
/// protocol afterwards, since the server may start sending messages right
/// after the handshake.
///
/// # Errors
///
/// Errors if the server rejects the authentication or answers with anything
/// other than the expected command.
pub async fn authenticate<R, W>(reader: &mut R, writer: &mut W, uid: u32) -> Result<Guid>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[0]).await?;

    let auth = ClientCommand::external(uid);
    log::trace!("SASL: {auth}");
    send(writer, &auth).await?;

    let guid = match recv(reader).await? {
        ServerCommand::Ok(guid) => guid,
        ServerCommand::Rejected(mechanisms) => {
            return Err(Error::new(ErrorKind::Rejected(mechanisms)));
        }
        other => return Err(unexpected("OK", &other)),
    };

    log::debug!("Authenticated as {uid} with server {guid}");

    send(writer, &ClientCommand::NegotiateUnixFd).await?;

    match recv(reader).await? {
        ServerCommand::AgreeUnixFd => {}
        other => return Err(unexpected("AGREE_UNIX_FD", &other)),
    }

    send(writer, &ClientCommand::Begin).await?;
    log::trace!("SASL: BEGIN");
    Ok(guid)
}

fn unexpected(expected: &'static str, actual: &ServerCommand) -> Error {
    Error::new(ErrorKind::UnexpectedSaslResponse {
        expected,
        actual: actual.to_string().into(),
    })
}
