//! Parsing of signature strings into [`Type`] trees.

pub use self::signature_error::SignatureError;
mod signature_error;


use crate::protocol::Type as Code;
use crate::Type;

/// The maximum length of a signature.
pub(crate) const MAX_SIGNATURE: usize = 256;

/// The maximum nesting depth of arrays, and separately of structs.
pub(crate) const MAX_DEPTH: usize = 32;

/// Parse a signature containing exactly one complete type.
///
/// # Examples
///
/// ```
/// use dbus_wire::{parse_signature, Type};
///
/// let ty = parse_signature("a{sv}")?;
/// assert_eq!(ty, Type::Array(Box::new(Type::DictEntry(Box::new(Type::String), Box::new(Type::Variant)))));
/// assert_eq!(ty.signature(), "a{sv}");
/// # Ok::<_, dbus_wire::SignatureError>(())
/// ```
pub fn parse_signature(signature: &str) -> Result<Type, SignatureError> {
    let mut types = parse_signatures(signature)?;

    if types.len() != 1 {
        return Err(SignatureError::NotSingleCompleteType);
    }

    Ok(types.swap_remove(0))
}

/// Parse a signature containing any number of complete types, such as the
/// signature of a message body.
///
/// # Examples
///
/// ```
/// use dbus_wire::{parse_signatures, Type};
///
/// assert_eq!(parse_signatures("")?, Vec::<Type>::new());
/// assert_eq!(parse_signatures("su")?, vec![Type::String, Type::UInt32]);
/// # Ok::<_, dbus_wire::SignatureError>(())
/// ```
pub fn parse_signatures(signature: &str) -> Result<Vec<Type>, SignatureError> {
    let bytes = signature.as_bytes();

    if bytes.len() >= MAX_SIGNATURE {
        return Err(SignatureError::SignatureTooLong);
    }

    let mut parser = Parser {
        bytes,
        pos: 0,
        arrays: 0,
        structs: 0,
    };

    let mut types = Vec::new();

    while parser.peek().is_some() {
        types.push(parser.complete(false)?);
    }

    Ok(types)
}

/// Recursive descent over signature bytes.
struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    arrays: usize,
    structs: usize,
}

impl Parser<'_> {
    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consume exactly one complete type.
    fn complete(&mut self, in_array: bool) -> Result<Type, SignatureError> {
        let Some(code) = self.peek() else {
            return Err(SignatureError::MissingArrayElementType);
        };

        self.pos += 1;

        let ty = match Code(code) {
            Code::BYTE => Type::Byte,
            Code::BOOLEAN => Type::Boolean,
            Code::INT16 => Type::Int16,
            Code::UINT16 => Type::UInt16,
            Code::INT32 => Type::Int32,
            Code::UINT32 => Type::UInt32,
            Code::INT64 => Type::Int64,
            Code::UINT64 => Type::UInt64,
            Code::DOUBLE => Type::Double,
            Code::STRING => Type::String,
            Code::OBJECT_PATH => Type::ObjectPath,
            Code::SIGNATURE => Type::Signature,
            Code::VARIANT => Type::Variant,
            Code::UNIX_FD => Type::UnixFd,
            Code::ARRAY => {
                self.arrays += 1;

                if self.arrays > MAX_DEPTH {
                    return Err(SignatureError::ExceededMaximumArrayRecursion);
                }

                if matches!(self.peek(), None | Some(b')' | b'}')) {
                    return Err(SignatureError::MissingArrayElementType);
                }

                let element = self.complete(true)?;
                self.arrays -= 1;
                Type::Array(Box::new(element))
            }
            Code::OPEN_PAREN => {
                self.enter_struct()?;

                let mut fields = Vec::new();

                loop {
                    match self.peek() {
                        None => return Err(SignatureError::StructStartedButNotEnded),
                        Some(b')') => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => fields.push(self.complete(false)?),
                    }
                }

                if fields.is_empty() {
                    return Err(SignatureError::StructHasNoFields);
                }

                self.structs -= 1;
                Type::Struct(fields)
            }
            Code::OPEN_BRACE => {
                if !in_array {
                    return Err(SignatureError::DictEntryNotInsideArray);
                }

                self.enter_struct()?;

                let key = match self.peek() {
                    None => return Err(SignatureError::DictStartedButNotEnded),
                    Some(b'}') => return Err(SignatureError::DictEntryHasNoFields),
                    Some(_) => self.complete(false)?,
                };

                if !key.is_basic() {
                    return Err(SignatureError::DictKeyMustBeBasicType);
                }

                let value = match self.peek() {
                    None => return Err(SignatureError::DictStartedButNotEnded),
                    Some(b'}') => return Err(SignatureError::DictEntryHasOnlyOneField),
                    Some(_) => self.complete(false)?,
                };

                match self.peek() {
                    None => return Err(SignatureError::DictStartedButNotEnded),
                    Some(b'}') => self.pos += 1,
                    Some(_) => return Err(SignatureError::DictEntryHasTooManyFields),
                }

                self.structs -= 1;
                Type::DictEntry(Box::new(key), Box::new(value))
            }
            Code::CLOSE_PAREN => return Err(SignatureError::StructEndedButNotStarted),
            Code::CLOSE_BRACE => return Err(SignatureError::DictEndedButNotStarted),
            _ => return Err(SignatureError::UnknownTypeCode(code)),
        };

        Ok(ty)
    }

    fn enter_struct(&mut self) -> Result<(), SignatureError> {
        self.structs += 1;

        if self.structs > MAX_DEPTH {
            return Err(SignatureError::ExceededMaximumStructRecursion);
        }

        Ok(())
    }
}
