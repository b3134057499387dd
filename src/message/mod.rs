//! The D-Bus message envelope.
//!
//! A message is a fixed preamble, an array of header fields, padding up to an
//! 8-byte boundary and finally the body.


use std::num::NonZeroU32;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::error::{Error, ErrorKind, Result};
use crate::marshal::{MarshallContext, UnmarshallContext};
use crate::protocol::{
    Endianness, Flags, HeaderField, MessageType, MAX_BODY_LENGTH, PROTOCOL_VERSION,
};
use crate::signature::parse_signatures;
use crate::{Type, Value, Variant};

/// The type of the header field array, `a(yv)`.
fn headers_type() -> Type {
    Type::Array(Box::new(Type::Struct(vec![Type::Byte, Type::Variant])))
}

/// A D-Bus message.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroU32;
///
/// use dbus_wire::{Message, MessageType, Variant};
///
/// let serial = NonZeroU32::MIN;
///
/// let m = Message::method_call("/org/freedesktop/DBus", "RequestName", serial)
///     .with_interface("org.freedesktop.DBus")
///     .with_body(vec![Variant::from("se.tedro.Example"), Variant::from(0u32)]);
///
/// assert_eq!(m.message_type(), MessageType::METHOD_CALL);
/// assert_eq!(m.signature(), Some("su"));
/// assert_eq!(m.member(), Some("RequestName"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    endianness: Endianness,
    message_type: MessageType,
    flags: Flags,
    serial: NonZeroU32,
    headers: Vec<(HeaderField, Variant)>,
    body: Vec<Variant>,
}

impl Message {
    /// Construct an empty message of the given type in native endian.
    ///
    /// Required header fields have to be added before the message can be
    /// marshalled.
    pub fn new(message_type: MessageType, serial: NonZeroU32) -> Self {
        Self {
            endianness: Endianness::NATIVE,
            message_type,
            flags: Flags::EMPTY,
            serial,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Construct a method call.
    pub fn method_call(path: &str, member: &str, serial: NonZeroU32) -> Self {
        Self::new(MessageType::METHOD_CALL, serial)
            .with_path(path)
            .with_member(member)
    }

    /// Construct a method return replying to `reply_serial`.
    pub fn method_return(reply_serial: NonZeroU32, serial: NonZeroU32) -> Self {
        Self::new(MessageType::METHOD_RETURN, serial).with_reply_serial(reply_serial)
    }

    /// Construct an error replying to `reply_serial`.
    pub fn error(error_name: &str, reply_serial: NonZeroU32, serial: NonZeroU32) -> Self {
        Self::new(MessageType::ERROR, serial)
            .with_error_name(error_name)
            .with_reply_serial(reply_serial)
    }

    /// Construct a signal.
    pub fn signal(path: &str, interface: &str, member: &str, serial: NonZeroU32) -> Self {
        Self::new(MessageType::SIGNAL, serial)
            .with_path(path)
            .with_interface(interface)
            .with_member(member)
    }

    /// Modify the endianness the message is marshalled in.
    pub fn with_endianness(self, endianness: Endianness) -> Self {
        Self { endianness, ..self }
    }

    /// Modify the flags of the message.
    pub fn with_flags(self, flags: Flags) -> Self {
        Self { flags, ..self }
    }

    /// Modify the serial of the message.
    pub fn with_serial(self, serial: NonZeroU32) -> Self {
        Self { serial, ..self }
    }

    /// Set a header field.
    ///
    /// A field which is already present keeps its position among the headers
    /// and has its value replaced.
    pub fn with_header(mut self, field: HeaderField, value: Variant) -> Self {
        match self.headers.iter_mut().find(|(f, _)| *f == field) {
            Some((_, existing)) => *existing = value,
            None => self.headers.push((field, value)),
        }

        self
    }

    /// Modify the object path of the message.
    pub fn with_path(self, path: &str) -> Self {
        self.with_header(HeaderField::PATH, Variant::object_path(path))
    }

    /// Modify the interface of the message.
    pub fn with_interface(self, interface: &str) -> Self {
        self.with_header(HeaderField::INTERFACE, Variant::from(interface))
    }

    /// Modify the member of the message.
    pub fn with_member(self, member: &str) -> Self {
        self.with_header(HeaderField::MEMBER, Variant::from(member))
    }

    /// Modify the error name of the message.
    pub fn with_error_name(self, error_name: &str) -> Self {
        self.with_header(HeaderField::ERROR_NAME, Variant::from(error_name))
    }

    /// Modify the serial this message is a reply to.
    pub fn with_reply_serial(self, reply_serial: NonZeroU32) -> Self {
        self.with_header(HeaderField::REPLY_SERIAL, Variant::from(reply_serial.get()))
    }

    /// Modify the destination of the message.
    pub fn with_destination(self, destination: &str) -> Self {
        self.with_header(HeaderField::DESTINATION, Variant::from(destination))
    }

    /// Modify the sender of the message.
    pub fn with_sender(self, sender: &str) -> Self {
        self.with_header(HeaderField::SENDER, Variant::from(sender))
    }

    /// Replace the body of the message.
    ///
    /// The SIGNATURE header is updated to match, or removed if the body is
    /// empty.
    pub fn with_body(mut self, body: Vec<Variant>) -> Self {
        if body.is_empty() {
            self.headers.retain(|(f, _)| *f != HeaderField::SIGNATURE);
            self.body = body;
            return self;
        }

        let signature = body_signature(&body);
        self.body = body;
        self.with_header(HeaderField::SIGNATURE, Variant::signature(signature))
    }

    /// The endianness of the message.
    #[inline]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// The type of the message.
    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The flags of the message.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// The serial of the message.
    #[inline]
    pub fn serial(&self) -> NonZeroU32 {
        self.serial
    }

    /// Iterate over header fields in the order they appear on the wire.
    pub fn headers(&self) -> impl Iterator<Item = (HeaderField, &Variant)> + '_ {
        self.headers.iter().map(|(f, v)| (*f, v))
    }

    /// Get the value of a header field.
    pub fn header(&self, field: HeaderField) -> Option<&Variant> {
        self.headers
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }

    fn header_str(&self, field: HeaderField) -> Option<&str> {
        self.header(field)?.value().as_str()
    }

    /// The object path of the message.
    pub fn path(&self) -> Option<&str> {
        self.header_str(HeaderField::PATH)
    }

    /// The interface of the message.
    pub fn interface(&self) -> Option<&str> {
        self.header_str(HeaderField::INTERFACE)
    }

    /// The member of the message.
    pub fn member(&self) -> Option<&str> {
        self.header_str(HeaderField::MEMBER)
    }

    /// The error name of the message.
    pub fn error_name(&self) -> Option<&str> {
        self.header_str(HeaderField::ERROR_NAME)
    }

    /// The destination of the message.
    pub fn destination(&self) -> Option<&str> {
        self.header_str(HeaderField::DESTINATION)
    }

    /// The sender of the message.
    pub fn sender(&self) -> Option<&str> {
        self.header_str(HeaderField::SENDER)
    }

    /// The signature of the body, if any.
    pub fn signature(&self) -> Option<&str> {
        self.header_str(HeaderField::SIGNATURE)
    }

    /// The serial this message is a reply to.
    pub fn reply_serial(&self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.header(HeaderField::REPLY_SERIAL)?.value().as_u32()?)
    }

    /// The body of the message.
    #[inline]
    pub fn body(&self) -> &[Variant] {
        &self.body
    }

    /// Take the body of the message.
    #[inline]
    pub fn into_body(self) -> Vec<Variant> {
        self.body
    }

    /// Marshal the message into `writer`.
    ///
    /// # Errors
    ///
    /// Errors if a header has the wrong type, a header required by the
    /// message type is missing, the body doesn't match the SIGNATURE header or
    /// the writer fails.
    pub async fn marshal<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.validate_headers()?;

        let signature = self.signature().unwrap_or_default();

        if body_signature(&self.body) != signature {
            return Err(Error::new(ErrorKind::BodySignatureMismatch));
        }

        parse_signatures(signature)?;

        let mut sink = tokio::io::sink();
        let mut measure = MarshallContext::measure(&mut sink, self.endianness, 0);

        for variant in &self.body {
            variant.ty().marshal(&mut measure, variant.value()).await?;
        }

        let body_length = match u32::try_from(measure.pos()) {
            Ok(length) if length <= MAX_BODY_LENGTH => length,
            _ => {
                return Err(Error::new(ErrorKind::BodyTooLong(
                    u32::try_from(measure.pos()).unwrap_or(u32::MAX),
                )))
            }
        };

        let headers = Value::Array(
            self.headers
                .iter()
                .map(|(field, value)| {
                    Value::Struct(vec![Value::Byte(field.0), Value::from(value.clone())])
                })
                .collect(),
        );

        let mut ctx = MarshallContext::new(writer, self.endianness);

        ctx.write_fixed(self.endianness.0).await?;
        ctx.write_fixed(self.message_type.0).await?;
        ctx.write_fixed(self.flags.0).await?;
        ctx.write_fixed(PROTOCOL_VERSION).await?;
        ctx.write_fixed(body_length).await?;
        ctx.write_fixed(self.serial.get()).await?;
        headers_type().marshal(&mut ctx, &headers).await?;
        ctx.align_write(8).await?;

        for variant in &self.body {
            variant.ty().marshal(&mut ctx, variant.value()).await?;
        }

        ctx.flush().await?;
        Ok(())
    }

    /// Unmarshal a single message from `reader`.
    ///
    /// Exactly the bytes of one message are consumed on success.
    ///
    /// # Errors
    ///
    /// Errors if the stream ends before the message is complete or the
    /// message is malformed in any way.
    pub async fn unmarshal<R>(reader: &mut R) -> Result<Message>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut ctx = UnmarshallContext::new(reader, Endianness::NATIVE);

        let endianness = Endianness(ctx.read_fixed::<u8>().await?);

        if !endianness.is_known() {
            return Err(Error::new(ErrorKind::InvalidEndianness(endianness.0)));
        }

        ctx.set_endianness(endianness);

        let message_type = MessageType(ctx.read_fixed::<u8>().await?);

        if !message_type.is_known() {
            return Err(Error::new(ErrorKind::InvalidMessageType(message_type)));
        }

        let bits = ctx.read_fixed::<u8>().await?;

        let Some(flags) = Flags::from_bits(bits) else {
            return Err(Error::new(ErrorKind::InvalidFlags(bits)));
        };

        let version = ctx.read_fixed::<u8>().await?;

        if version != PROTOCOL_VERSION {
            return Err(Error::new(ErrorKind::InvalidProtocolVersion(version)));
        }

        let body_length = ctx.read_fixed::<u32>().await?;

        if body_length > MAX_BODY_LENGTH {
            return Err(Error::new(ErrorKind::BodyTooLong(body_length)));
        }

        let Some(serial) = NonZeroU32::new(ctx.read_fixed::<u32>().await?) else {
            return Err(Error::new(ErrorKind::ZeroSerial));
        };

        let headers = read_headers(&mut ctx).await?;

        let mut message = Message {
            endianness,
            message_type,
            flags,
            serial,
            headers,
            body: Vec::new(),
        };

        message.validate_headers()?;
        ctx.align_read(8).await?;

        let types = match message.signature() {
            Some(signature) => parse_signatures(signature)?,
            None => Vec::new(),
        };

        message.body = read_body(&mut ctx, &types, body_length).await?;
        Ok(message)
    }

    /// Check header value types and that the headers required by the message
    /// type are present.
    fn validate_headers(&self) -> Result<()> {
        for (n, (field, value)) in self.headers.iter().enumerate() {
            if Some(value.ty().code()) != field.expected_type() {
                return Err(Error::new(ErrorKind::HeaderTypeMismatch(*field)));
            }

            if self.headers[..n].iter().any(|(f, _)| f == field) {
                return Err(Error::new(ErrorKind::DuplicateHeader(*field)));
            }
        }

        let required: &[HeaderField] = match self.message_type {
            MessageType::METHOD_CALL => &[HeaderField::PATH, HeaderField::MEMBER],
            MessageType::METHOD_RETURN => &[HeaderField::REPLY_SERIAL],
            MessageType::ERROR => &[HeaderField::ERROR_NAME, HeaderField::REPLY_SERIAL],
            MessageType::SIGNAL => &[
                HeaderField::PATH,
                HeaderField::INTERFACE,
                HeaderField::MEMBER,
            ],
            other => return Err(Error::new(ErrorKind::InvalidMessageType(other))),
        };

        for &field in required {
            if self.header(field).is_none() {
                return Err(Error::new(ErrorKind::MissingHeader(field)));
            }
        }

        Ok(())
    }
}

/// The concatenated signature of every body argument.
fn body_signature(body: &[Variant]) -> String {
    let mut signature = String::new();

    for variant in body {
        variant.ty().write_signature(&mut signature);
    }

    signature
}

/// Read the header field array, rejecting unknown and duplicate field codes.
async fn read_headers(ctx: &mut UnmarshallContext<'_>) -> Result<Vec<(HeaderField, Variant)>> {
    let ty = headers_type();

    let Value::Array(entries) = ty.unmarshal(ctx).await? else {
        return Err(Error::new(ErrorKind::ValueTypeMismatch {
            expected: ty.signature().into(),
        }));
    };

    let mut headers = Vec::with_capacity(entries.len());

    for entry in entries {
        let (field, value) = match entry {
            Value::Struct(fields) => match <[Value; 2]>::try_from(fields) {
                Ok([Value::Byte(code), Value::Variant(value)]) => (HeaderField(code), *value),
                _ => {
                    return Err(Error::new(ErrorKind::ValueTypeMismatch {
                        expected: ty.signature().into(),
                    }))
                }
            },
            _ => {
                return Err(Error::new(ErrorKind::ValueTypeMismatch {
                    expected: ty.signature().into(),
                }))
            }
        };

        if !field.is_known() {
            return Err(Error::new(ErrorKind::UnknownHeaderField(field.0)));
        }

        if headers.iter().any(|(f, _)| *f == field) {
            return Err(Error::new(ErrorKind::DuplicateHeader(field)));
        }

        headers.push((field, value));
    }

    Ok(headers)
}

/// Read the body from a sub-stream limited to the declared body length.
async fn read_body(
    ctx: &mut UnmarshallContext<'_>,
    types: &[Type],
    body_length: u32,
) -> Result<Vec<Variant>> {
    let start = ctx.pos;
    let mut limited = (&mut *ctx.reader).take(u64::from(body_length));

    let mut sub = UnmarshallContext {
        reader: &mut limited,
        pos: start,
        endianness: ctx.endianness,
        depth: 0,
    };

    let mut body = Vec::with_capacity(types.len());
    let mut error = None;

    for ty in types {
        match ty.unmarshal(&mut sub).await {
            Ok(value) => body.push(Variant::new(ty.clone(), value)),
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    let pos = sub.pos;

    if let Some(error) = error {
        if error.is_unexpected_eof() && limited.limit() == 0 {
            return Err(Error::new(ErrorKind::BodyOverrun(body_length)));
        }

        return Err(error);
    }

    if pos - start != body_length as usize {
        return Err(Error::new(ErrorKind::BodyLengthMismatch {
            declared: body_length,
            actual: pos - start,
        }));
    }

    ctx.pos = pos;
    Ok(body)
}
