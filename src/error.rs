use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;

use crate::protocol::{HeaderField, MessageType};
use crate::SignatureError;

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The broad category an [`Error`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Category {
    /// Malformed data: bad signatures, unknown codes, invalid UTF-8 or length
    /// mismatches. Fatal to the operation in progress.
    Format,
    /// Transport failure or unexpected end of stream.
    Stream,
    /// Unexpected reply during SASL authentication.
    Auth,
    /// A violation of the binary protocol such as an unsupported version or
    /// unknown flag bits.
    Protocol,
    /// The connection is no longer usable, or a request could not complete
    /// on it.
    Connection,
    /// The remote end answered a request with an error reply.
    Response,
}

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    /// The category of the error.
    pub fn category(&self) -> Category {
        match &self.kind {
            ErrorKind::Io(..) | ErrorKind::UnexpectedEof => Category::Stream,
            ErrorKind::Signature(..)
            | ErrorKind::Utf8Error(..)
            | ErrorKind::NotNullTerminated
            | ErrorKind::NonZeroPadding
            | ErrorKind::ValueTypeMismatch { .. }
            | ErrorKind::StringTooLong(..)
            | ErrorKind::InvalidObjectPath(..)
            | ErrorKind::VariantTooDeep
            | ErrorKind::ArrayTooLong(..)
            | ErrorKind::ArrayLengthMismatch { .. }
            | ErrorKind::ArrayOverrun(..)
            | ErrorKind::InvalidEndianness(..)
            | ErrorKind::UnknownHeaderField(..)
            | ErrorKind::DuplicateHeader(..)
            | ErrorKind::HeaderTypeMismatch(..)
            | ErrorKind::MissingHeader(..)
            | ErrorKind::BodySignatureMismatch
            | ErrorKind::BodyLengthMismatch { .. }
            | ErrorKind::InvalidHex
            | ErrorKind::InvalidGuid => Category::Format,
            ErrorKind::InvalidSasl
            | ErrorKind::UnknownSaslCommand(..)
            | ErrorKind::LineTooLong
            | ErrorKind::Rejected(..)
            | ErrorKind::UnexpectedSaslResponse { .. }
            | ErrorKind::MissingUid => Category::Auth,
            ErrorKind::InvalidMessageType(..)
            | ErrorKind::InvalidProtocolVersion(..)
            | ErrorKind::InvalidFlags(..)
            | ErrorKind::ZeroSerial
            | ErrorKind::BodyTooLong(..)
            | ErrorKind::BodyOverrun(..) => Category::Protocol,
            ErrorKind::MissingBus
            | ErrorKind::InvalidAddress(..)
            | ErrorKind::ConnectionClosed(..)
            | ErrorKind::Timeout
            | ErrorKind::SerialExhausted
            | ErrorKind::UnexpectedReply(..) => Category::Connection,
            ErrorKind::ResponseError(..) => Category::Response,
        }
    }

    /// If this is an error reply, the name and message of the error.
    pub fn response_error(&self) -> Option<(&str, &str)> {
        match &self.kind {
            ErrorKind::ResponseError(name, message) => Some((name, message)),
            _ => None,
        }
    }

    /// Test if the stream ended before a value was complete.
    #[inline]
    pub(crate) fn is_unexpected_eof(&self) -> bool {
        matches!(self.kind, ErrorKind::UnexpectedEof)
    }

    #[cfg(test)]
    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => Self::new(ErrorKind::UnexpectedEof),
            _ => Self::new(ErrorKind::Io(error)),
        }
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8Error(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(error) => error.fmt(f),
            ErrorKind::Signature(error) => error.fmt(f),
            ErrorKind::Utf8Error(error) => error.fmt(f),
            ErrorKind::UnexpectedEof => write!(f, "Unexpected end of stream"),
            ErrorKind::NotNullTerminated => write!(f, "String is not null terminated"),
            ErrorKind::NonZeroPadding => write!(f, "Alignment padding contains non-zero bytes"),
            ErrorKind::ValueTypeMismatch { expected } => {
                write!(f, "Value does not match type `{expected}`")
            }
            ErrorKind::StringTooLong(length) => {
                write!(f, "String of length {length} is too long")
            }
            ErrorKind::InvalidObjectPath(path) => write!(f, "Invalid object path `{path}`"),
            ErrorKind::VariantTooDeep => {
                write!(f, "Variants nested deeper than 64 levels")
            }
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "Array of length {length} is too long (max is 67108864)")
            }
            ErrorKind::ArrayLengthMismatch { declared, actual } => {
                write!(
                    f,
                    "Array declared {declared} bytes but elements consumed {actual}"
                )
            }
            ErrorKind::ArrayOverrun(length) => {
                write!(f, "Array element runs past the declared length {length}")
            }
            ErrorKind::InvalidEndianness(byte) => {
                write!(f, "Invalid endianness marker {byte:#04x}")
            }
            ErrorKind::UnknownHeaderField(code) => write!(f, "Unknown header field {code}"),
            ErrorKind::DuplicateHeader(field) => write!(f, "Duplicate header field {field:?}"),
            ErrorKind::HeaderTypeMismatch(field) => {
                write!(f, "Header field {field:?} has the wrong type")
            }
            ErrorKind::MissingHeader(field) => write!(f, "Missing required {field:?} header"),
            ErrorKind::BodySignatureMismatch => {
                write!(f, "Body does not match the SIGNATURE header")
            }
            ErrorKind::BodyLengthMismatch { declared, actual } => {
                write!(f, "Body declared {declared} bytes but {actual} were decoded")
            }
            ErrorKind::InvalidHex => write!(f, "Invalid hex encoding"),
            ErrorKind::InvalidGuid => write!(f, "Server GUID must be 16 bytes"),
            ErrorKind::InvalidSasl => write!(f, "Invalid SASL message"),
            ErrorKind::UnknownSaslCommand(command) => {
                write!(f, "Unknown SASL command `{command}`")
            }
            ErrorKind::LineTooLong => write!(f, "SASL line exceeds the maximum length"),
            ErrorKind::Rejected(mechanisms) => {
                write!(f, "Authentication rejected, server supports: {mechanisms:?}")
            }
            ErrorKind::UnexpectedSaslResponse { expected, actual } => {
                write!(f, "Expected SASL `{expected}` but got `{actual}`")
            }
            ErrorKind::MissingUid => write!(f, "No user id to authenticate as"),
            ErrorKind::InvalidMessageType(ty) => write!(f, "Invalid message type {ty:?}"),
            ErrorKind::InvalidProtocolVersion(version) => {
                write!(f, "Unsupported protocol version {version}")
            }
            ErrorKind::InvalidFlags(bits) => write!(f, "Unknown flag bits {bits:#010b}"),
            ErrorKind::ZeroSerial => write!(f, "Zero in header serial"),
            ErrorKind::BodyTooLong(length) => {
                write!(f, "Body of length {length} is too long (max is 134217728)")
            }
            ErrorKind::BodyOverrun(length) => {
                write!(f, "Body runs past the declared length {length}")
            }
            ErrorKind::MissingBus => write!(f, "Missing session bus"),
            ErrorKind::InvalidAddress(address) => {
                write!(f, "Invalid d-bus address `{address}`")
            }
            ErrorKind::ConnectionClosed(reason) => write!(f, "Connection closed: {reason}"),
            ErrorKind::Timeout => write!(f, "Request timed out"),
            ErrorKind::SerialExhausted => write!(f, "Serial numbers exhausted"),
            ErrorKind::UnexpectedReply(ty) => {
                write!(f, "Unexpected reply of type {ty:?}")
            }
            ErrorKind::ResponseError(error_name, message) => {
                write!(f, "Response error: {error_name}: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::Utf8Error(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    Utf8Error(Utf8Error),
    UnexpectedEof,
    NotNullTerminated,
    NonZeroPadding,
    ValueTypeMismatch { expected: Box<str> },
    StringTooLong(u32),
    InvalidObjectPath(Box<str>),
    VariantTooDeep,
    ArrayTooLong(u32),
    ArrayLengthMismatch { declared: u32, actual: usize },
    ArrayOverrun(u32),
    InvalidEndianness(u8),
    UnknownHeaderField(u8),
    DuplicateHeader(HeaderField),
    HeaderTypeMismatch(HeaderField),
    MissingHeader(HeaderField),
    BodySignatureMismatch,
    BodyLengthMismatch { declared: u32, actual: usize },
    InvalidHex,
    InvalidGuid,
    InvalidSasl,
    UnknownSaslCommand(Box<str>),
    LineTooLong,
    Rejected(Vec<String>),
    UnexpectedSaslResponse { expected: &'static str, actual: Box<str> },
    MissingUid,
    InvalidMessageType(MessageType),
    InvalidProtocolVersion(u8),
    InvalidFlags(u8),
    ZeroSerial,
    BodyTooLong(u32),
    BodyOverrun(u32),
    MissingBus,
    InvalidAddress(Box<str>),
    ConnectionClosed(Arc<str>),
    Timeout,
    SerialExhausted,
    UnexpectedReply(MessageType),
    ResponseError(Box<str>, Box<str>),
}
