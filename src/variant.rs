use crate::{Type, Value};

/// A self-describing value: a [`Type`] together with a [`Value`] of that type.
///
/// # Examples
///
/// ```
/// use dbus_wire::{Type, Variant};
///
/// let v = Variant::from("Hello");
/// assert_eq!(v.ty(), &Type::String);
///
/// let v = Variant::object_path("/org/freedesktop/DBus");
/// assert_eq!(v.ty(), &Type::ObjectPath);
/// assert_eq!(v.value().as_str(), Some("/org/freedesktop/DBus"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    ty: Type,
    value: Value,
}

impl Variant {
    /// Construct a new variant.
    ///
    /// The shape of `value` is checked against `ty` when it is marshalled.
    #[inline]
    pub fn new(ty: Type, value: Value) -> Self {
        Self { ty, value }
    }

    /// Construct an object path variant.
    pub fn object_path(path: impl Into<String>) -> Self {
        Self::new(Type::ObjectPath, Value::ObjectPath(path.into()))
    }

    /// Construct a signature variant.
    pub fn signature(signature: impl Into<String>) -> Self {
        Self::new(Type::Signature, Value::Signature(signature.into()))
    }

    /// The type of the variant.
    #[inline]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The value of the variant.
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Deconstruct into type and value.
    #[inline]
    pub fn into_parts(self) -> (Type, Value) {
        (self.ty, self.value)
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self::new(Type::$variant, Value::$variant(value))
                }
            }
        )*
    }
}

impl_from! {
    u8 => Byte,
    bool => Boolean,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f64 => Double,
    String => String,
}

impl From<&str> for Variant {
    #[inline]
    fn from(value: &str) -> Self {
        Self::new(Type::String, Value::String(value.to_owned()))
    }
}
