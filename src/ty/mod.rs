//! The D-Bus type system.
//!
//! A [`Type`] drives both marshalling and unmarshalling of a [`Value`]. All
//! positions are taken from the context, so nested containers align correctly
//! relative to the start of the whole operation.

pub use self::value::Value;
mod value;

#[cfg(test)]
mod tests;

use std::fmt;

use futures::future::{BoxFuture, FutureExt};
use tokio::io::AsyncReadExt;

use crate::error::{Error, ErrorKind, Result};
use crate::marshal::{padding_to, MarshallContext, UnmarshallContext};
use crate::protocol::{Type as Code, MAX_ARRAY_LENGTH};
use crate::signature::parse_signature;
use crate::{SignatureError, Variant};

/// The maximum number of variants nested inside of each other.
const MAX_VARIANT_DEPTH: usize = 64;

/// A D-Bus type.
///
/// # Examples
///
/// ```
/// use dbus_wire::Type;
///
/// let ty = Type::Array(Box::new(Type::Struct(vec![Type::Byte, Type::Variant])));
/// assert_eq!(ty.signature(), "a(yv)");
/// assert_eq!(ty.alignment(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// 8-bit unsigned integer, `y`.
    Byte,
    /// Boolean encoded as a 32-bit integer, `b`.
    Boolean,
    /// 16-bit signed integer, `n`.
    Int16,
    /// 16-bit unsigned integer, `q`.
    UInt16,
    /// 32-bit signed integer, `i`.
    Int32,
    /// 32-bit unsigned integer, `u`.
    UInt32,
    /// 64-bit signed integer, `x`.
    Int64,
    /// 64-bit unsigned integer, `t`.
    UInt64,
    /// IEEE 754 double, `d`.
    Double,
    /// UTF-8 string, `s`.
    String,
    /// Object path, `o`.
    ObjectPath,
    /// Type signature, `g`.
    Signature,
    /// Array of the given element type, `a`.
    Array(Box<Type>),
    /// Struct with the given fields, `(...)`.
    Struct(Vec<Type>),
    /// Self-describing value, `v`.
    Variant,
    /// Dictionary entry with a basic key type, `{..}`.
    DictEntry(Box<Type>, Box<Type>),
    /// Index of a unix file descriptor, `h`.
    UnixFd,
}

impl Type {
    /// Parse a signature containing exactly one complete type.
    #[inline]
    pub fn parse(signature: &str) -> Result<Type, SignatureError> {
        parse_signature(signature)
    }

    /// The leading type code of this type.
    pub fn code(&self) -> u8 {
        let code = match self {
            Type::Byte => Code::BYTE,
            Type::Boolean => Code::BOOLEAN,
            Type::Int16 => Code::INT16,
            Type::UInt16 => Code::UINT16,
            Type::Int32 => Code::INT32,
            Type::UInt32 => Code::UINT32,
            Type::Int64 => Code::INT64,
            Type::UInt64 => Code::UINT64,
            Type::Double => Code::DOUBLE,
            Type::String => Code::STRING,
            Type::ObjectPath => Code::OBJECT_PATH,
            Type::Signature => Code::SIGNATURE,
            Type::Array(..) => Code::ARRAY,
            Type::Struct(..) => Code::OPEN_PAREN,
            Type::Variant => Code::VARIANT,
            Type::DictEntry(..) => Code::OPEN_BRACE,
            Type::UnixFd => Code::UNIX_FD,
        };

        code.0
    }

    /// Test if this is a basic (non-container) type, which are the only types
    /// allowed as dictionary keys.
    pub fn is_basic(&self) -> bool {
        !matches!(
            self,
            Type::Array(..) | Type::Struct(..) | Type::Variant | Type::DictEntry(..)
        )
    }

    /// The alignment in bytes of values of this type.
    pub fn alignment(&self) -> usize {
        match self {
            Type::Byte | Type::Signature | Type::Variant => 1,
            Type::Int16 | Type::UInt16 => 2,
            Type::Boolean
            | Type::Int32
            | Type::UInt32
            | Type::String
            | Type::ObjectPath
            | Type::Array(..)
            | Type::UnixFd => 4,
            Type::Int64 | Type::UInt64 | Type::Double | Type::Struct(..) | Type::DictEntry(..) => 8,
        }
    }

    /// Render the signature of this type.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    pub(crate) fn write_signature(&self, out: &mut String) {
        match self {
            Type::Array(element) => {
                out.push('a');
                element.write_signature(out);
            }
            Type::Struct(fields) => {
                out.push('(');

                for field in fields {
                    field.write_signature(out);
                }

                out.push(')');
            }
            Type::DictEntry(key, value) => {
                out.push('{');
                key.write_signature(out);
                value.write_signature(out);
                out.push('}');
            }
            ty => out.push(char::from(ty.code())),
        }
    }

    /// Marshal `value` as this type.
    ///
    /// # Errors
    ///
    /// Errors if the shape of `value` doesn't match this type or the
    /// underlying writer fails.
    pub fn marshal<'a>(
        &'a self,
        ctx: &'a mut MarshallContext<'_>,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            match (self, value) {
                (Type::Byte, Value::Byte(v)) => ctx.write_fixed(*v).await,
                (Type::Boolean, Value::Boolean(v)) => ctx.write_fixed(u32::from(*v)).await,
                (Type::Int16, Value::Int16(v)) => ctx.write_fixed(*v).await,
                (Type::UInt16, Value::UInt16(v)) => ctx.write_fixed(*v).await,
                (Type::Int32, Value::Int32(v)) => ctx.write_fixed(*v).await,
                (Type::UInt32, Value::UInt32(v)) => ctx.write_fixed(*v).await,
                (Type::Int64, Value::Int64(v)) => ctx.write_fixed(*v).await,
                (Type::UInt64, Value::UInt64(v)) => ctx.write_fixed(*v).await,
                (Type::Double, Value::Double(v)) => ctx.write_fixed(*v).await,
                (Type::String, Value::String(v)) => ctx.write_str(v).await,
                (Type::ObjectPath, Value::ObjectPath(v)) => ctx.write_object_path(v).await,
                (Type::Signature, Value::Signature(v)) => ctx.write_signature(v).await,
                (Type::UnixFd, Value::UnixFd(v)) => ctx.write_fixed(*v).await,
                (Type::Array(element), Value::Array(values)) => {
                    marshal_array(element, ctx, values).await
                }
                (Type::Struct(fields), Value::Struct(values)) if fields.len() == values.len() => {
                    ctx.align_write(8).await?;

                    for (field, value) in fields.iter().zip(values) {
                        field.marshal(ctx, value).await?;
                    }

                    Ok(())
                }
                (Type::Variant, Value::Variant(variant)) => {
                    let signature = variant.ty().signature();
                    parse_signature(&signature)?;
                    ctx.write_signature(&signature).await?;
                    variant.ty().marshal(ctx, variant.value()).await
                }
                (Type::DictEntry(key_type, value_type), Value::DictEntry(key, value)) => {
                    ctx.align_write(8).await?;
                    key_type.marshal(ctx, key).await?;
                    value_type.marshal(ctx, value).await
                }
                _ => Err(Error::new(ErrorKind::ValueTypeMismatch {
                    expected: self.signature().into(),
                })),
            }
        }
        .boxed()
    }

    /// Unmarshal a value of this type.
    ///
    /// # Errors
    ///
    /// Errors if the stream ends early or doesn't contain a valid instance of
    /// this type.
    pub fn unmarshal<'a>(
        &'a self,
        ctx: &'a mut UnmarshallContext<'_>,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            let value = match self {
                Type::Byte => Value::Byte(ctx.read_fixed().await?),
                Type::Boolean => Value::Boolean(ctx.read_fixed::<u32>().await? != 0),
                Type::Int16 => Value::Int16(ctx.read_fixed().await?),
                Type::UInt16 => Value::UInt16(ctx.read_fixed().await?),
                Type::Int32 => Value::Int32(ctx.read_fixed().await?),
                Type::UInt32 => Value::UInt32(ctx.read_fixed().await?),
                Type::Int64 => Value::Int64(ctx.read_fixed().await?),
                Type::UInt64 => Value::UInt64(ctx.read_fixed().await?),
                Type::Double => Value::Double(ctx.read_fixed().await?),
                Type::String => Value::String(ctx.read_str().await?),
                Type::ObjectPath => Value::ObjectPath(ctx.read_object_path().await?),
                Type::Signature => Value::Signature(ctx.read_signature().await?),
                Type::UnixFd => Value::UnixFd(ctx.read_fixed().await?),
                Type::Array(element) => Value::Array(unmarshal_array(element, ctx).await?),
                Type::Struct(fields) => {
                    ctx.align_read(8).await?;

                    let mut values = Vec::with_capacity(fields.len());

                    for field in fields {
                        values.push(field.unmarshal(ctx).await?);
                    }

                    Value::Struct(values)
                }
                Type::Variant => {
                    let signature = ctx.read_signature().await?;
                    let ty = parse_signature(&signature)?;

                    if ctx.depth >= MAX_VARIANT_DEPTH {
                        return Err(Error::new(ErrorKind::VariantTooDeep));
                    }

                    ctx.depth += 1;
                    let value = ty.unmarshal(ctx).await;
                    ctx.depth -= 1;
                    Value::Variant(Box::new(Variant::new(ty, value?)))
                }
                Type::DictEntry(key_type, value_type) => {
                    ctx.align_read(8).await?;
                    let key = key_type.unmarshal(ctx).await?;
                    let value = value_type.unmarshal(ctx).await?;
                    Value::DictEntry(Box::new(key), Box::new(value))
                }
            };

            Ok(value)
        }
        .boxed()
    }
}

impl fmt::Display for Type {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Marshal an array.
///
/// The length prefix covers the element payload only, so the elements are
/// first measured by marshalling them into a sink from the position where the
/// payload will actually start. A context which is itself measuring writes the
/// elements once behind a placeholder length.
async fn marshal_array(
    element: &Type,
    ctx: &mut MarshallContext<'_>,
    values: &[Value],
) -> Result<()> {
    ctx.align_write(4).await?;

    let alignment = element.alignment();

    if ctx.measuring {
        ctx.write_fixed(0u32).await?;
        ctx.align_write(alignment).await?;
        let start = ctx.pos;

        for value in values {
            element.marshal(ctx, value).await?;
        }

        array_length(ctx.pos - start)?;
        return Ok(());
    }

    let after_length = ctx.pos + 4;
    let start = after_length + padding_to(after_length, alignment);

    let mut sink = tokio::io::sink();
    let mut measure = MarshallContext::measure(&mut sink, ctx.endianness, start);

    for value in values {
        element.marshal(&mut measure, value).await?;
    }

    let length = array_length(measure.pos - start)?;

    ctx.write_fixed(length).await?;
    ctx.align_write(alignment).await?;

    for value in values {
        element.marshal(ctx, value).await?;
    }

    Ok(())
}

/// Check the measured payload length of an array.
fn array_length(measured: usize) -> Result<u32> {
    match u32::try_from(measured) {
        Ok(length) if length <= MAX_ARRAY_LENGTH => Ok(length),
        _ => Err(Error::new(ErrorKind::ArrayTooLong(
            u32::try_from(measured).unwrap_or(u32::MAX),
        ))),
    }
}

/// Unmarshal an array.
///
/// Elements are read from a sub-stream limited to the declared length, which
/// must be consumed exactly.
async fn unmarshal_array(element: &Type, ctx: &mut UnmarshallContext<'_>) -> Result<Vec<Value>> {
    let length = ctx.read_fixed::<u32>().await?;

    if length > MAX_ARRAY_LENGTH {
        return Err(Error::new(ErrorKind::ArrayTooLong(length)));
    }

    ctx.align_read(element.alignment()).await?;

    let start = ctx.pos;
    let end = start + length as usize;

    let mut limited = (&mut *ctx.reader).take(u64::from(length));

    let mut sub = UnmarshallContext {
        reader: &mut limited,
        pos: start,
        endianness: ctx.endianness,
        depth: ctx.depth,
    };

    let mut values = Vec::new();
    let mut error = None;

    while sub.pos < end {
        match element.unmarshal(&mut sub).await {
            Ok(value) => values.push(value),
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    let pos = sub.pos;

    if let Some(error) = error {
        if error.is_unexpected_eof() && limited.limit() == 0 {
            return Err(Error::new(ErrorKind::ArrayOverrun(length)));
        }

        return Err(error);
    }

    if pos != end {
        return Err(Error::new(ErrorKind::ArrayLengthMismatch {
            declared: length,
            actual: pos - start,
        }));
    }

    ctx.pos = pos;
    Ok(values)
}
