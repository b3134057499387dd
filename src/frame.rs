use crate::protocol::Endianness;

/// A fixed-width value in the protocol.
///
/// Fixed values are aligned to their own width, and byte swapped on the wire
/// if the endianness of the message differs from the native one.
pub(crate) trait Frame: Copy {
    /// The width in bytes of the value, which is also its alignment.
    const SIZE: usize;

    /// Native byte representation.
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default;

    /// Adjust the endianness of the frame.
    fn adjust(&mut self, endianness: Endianness);

    /// Convert into native bytes.
    fn to_bytes(self) -> Self::Bytes;

    /// Convert from native bytes.
    fn from_bytes(bytes: Self::Bytes) -> Self;
}

impl Frame for u8 {
    const SIZE: usize = 1;

    type Bytes = [u8; 1];

    #[inline]
    fn adjust(&mut self, _: Endianness) {}

    #[inline]
    fn to_bytes(self) -> Self::Bytes {
        [self]
    }

    #[inline]
    fn from_bytes(bytes: Self::Bytes) -> Self {
        bytes[0]
    }
}

macro_rules! impl_number {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Frame for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                type Bytes = [u8; std::mem::size_of::<$ty>()];

                #[inline]
                fn adjust(&mut self, endianness: Endianness) {
                    if endianness != Endianness::NATIVE {
                        *self = <$ty>::swap_bytes(*self);
                    }
                }

                #[inline]
                fn to_bytes(self) -> Self::Bytes {
                    <$ty>::to_ne_bytes(self)
                }

                #[inline]
                fn from_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_ne_bytes(bytes)
                }
            }
        )*
    }
}

impl_number!(u16, u32, u64);
impl_number!(i16, i32, i64);

impl Frame for f64 {
    const SIZE: usize = 8;

    type Bytes = [u8; 8];

    #[inline]
    fn adjust(&mut self, endianness: Endianness) {
        if endianness != Endianness::NATIVE {
            *self = f64::from_bits(self.to_bits().swap_bytes());
        }
    }

    #[inline]
    fn to_bytes(self) -> Self::Bytes {
        self.to_ne_bytes()
    }

    #[inline]
    fn from_bytes(bytes: Self::Bytes) -> Self {
        f64::from_ne_bytes(bytes)
    }
}
