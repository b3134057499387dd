//! Cursors which marshal and unmarshal values over asynchronous streams.
//!
//! A context tracks the number of bytes transferred since the start of the
//! operation, which is what every alignment computation is relative to.

#[cfg(test)]
mod tests;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, ErrorKind, Result};
use crate::frame::Frame;
use crate::object_path;
use crate::protocol::{Endianness, MAX_BODY_LENGTH};
use crate::SignatureError;

/// Zeroed bytes used for padding.
const PADDING: [u8; 8] = [0; 8];

/// Calculate the number of padding bytes needed to bring `pos` up to a
/// multiple of `alignment`.
#[inline]
pub(crate) const fn padding_to(pos: usize, alignment: usize) -> usize {
    (alignment - pos % alignment) % alignment
}

/// A marshalling cursor over an asynchronous writer.
pub struct MarshallContext<'a> {
    pub(crate) writer: &'a mut (dyn AsyncWrite + Unpin + Send + 'a),
    pub(crate) pos: usize,
    pub(crate) endianness: Endianness,
    /// Only the number of bytes written matters, not their content.
    pub(crate) measuring: bool,
}

impl<'a> MarshallContext<'a> {
    /// Construct a new context writing to `writer` starting at position 0.
    pub fn new(
        writer: &'a mut (dyn AsyncWrite + Unpin + Send + 'a),
        endianness: Endianness,
    ) -> Self {
        Self {
            writer,
            pos: 0,
            endianness,
            measuring: false,
        }
    }

    /// Construct a context which pretends that `pos` bytes have already been
    /// written and whose output is only measured, used to size containers at
    /// their real alignment.
    pub(crate) fn measure(
        writer: &'a mut (dyn AsyncWrite + Unpin + Send + 'a),
        endianness: Endianness,
        pos: usize,
    ) -> Self {
        Self {
            writer,
            pos,
            endianness,
            measuring: true,
        }
    }

    /// Number of bytes written since the start of the operation.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The endianness values are written in.
    #[inline]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Write zeroed padding up to the next multiple of `alignment`.
    pub async fn align_write(&mut self, alignment: usize) -> Result<()> {
        let pad = padding_to(self.pos, alignment);

        if pad > 0 {
            self.writer.write_all(&PADDING[..pad]).await?;
            self.pos += pad;
        }

        Ok(())
    }

    /// Write all of `buf`, optionally aligning first.
    pub async fn write_all(&mut self, buf: &[u8], alignment: Option<usize>) -> Result<()> {
        if let Some(alignment) = alignment {
            self.align_write(alignment).await?;
        }

        self.writer.write_all(buf).await?;
        self.pos += buf.len();
        Ok(())
    }

    /// Write a fixed-width value aligned to its own width.
    pub(crate) async fn write_fixed<T>(&mut self, mut value: T) -> Result<()>
    where
        T: Frame,
    {
        value.adjust(self.endianness);
        let bytes = value.to_bytes();
        self.write_all(bytes.as_ref(), Some(T::SIZE)).await
    }

    /// Write a string or object path: `u32` length, bytes and a nul
    /// terminator.
    pub async fn write_str(&mut self, string: &str) -> Result<()> {
        let Ok(len) = u32::try_from(string.len()) else {
            return Err(Error::new(ErrorKind::StringTooLong(u32::MAX)));
        };

        self.write_fixed(len).await?;
        self.write_all(string.as_bytes(), None).await?;
        self.write_all(&PADDING[..1], None).await
    }

    /// Write an object path.
    ///
    /// # Errors
    ///
    /// Errors if `path` is not a valid object path.
    pub async fn write_object_path(&mut self, path: &str) -> Result<()> {
        if !object_path::validate(path.as_bytes()) {
            return Err(Error::new(ErrorKind::InvalidObjectPath(path.into())));
        }

        self.write_str(path).await
    }

    /// Write a signature: `u8` length, bytes and a nul terminator.
    pub async fn write_signature(&mut self, signature: &str) -> Result<()> {
        let Ok(len) = u8::try_from(signature.len()) else {
            return Err(Error::from(SignatureError::SignatureTooLong));
        };

        self.write_fixed(len).await?;
        self.write_all(signature.as_bytes(), None).await?;
        self.write_all(&PADDING[..1], None).await
    }

    /// Flush the underlying writer.
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// An unmarshalling cursor over an asynchronous reader.
pub struct UnmarshallContext<'a> {
    pub(crate) reader: &'a mut (dyn AsyncRead + Unpin + Send + 'a),
    pub(crate) pos: usize,
    pub(crate) endianness: Endianness,
    /// Number of variants currently being decoded.
    pub(crate) depth: usize,
}

impl<'a> UnmarshallContext<'a> {
    /// Construct a new context reading from `reader` starting at position 0.
    pub fn new(
        reader: &'a mut (dyn AsyncRead + Unpin + Send + 'a),
        endianness: Endianness,
    ) -> Self {
        Self {
            reader,
            pos: 0,
            endianness,
            depth: 0,
        }
    }

    /// Number of bytes read since the start of the operation.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The endianness values are read in.
    #[inline]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Change the endianness, used once the message preamble has been read.
    #[inline]
    pub(crate) fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    /// Skip padding up to the next multiple of `alignment`.
    ///
    /// Padding must be zeroed.
    pub async fn align_read(&mut self, alignment: usize) -> Result<()> {
        let pad = padding_to(self.pos, alignment);

        if pad > 0 {
            let mut buf = [0; 8];
            self.reader.read_exact(&mut buf[..pad]).await?;
            self.pos += pad;

            if buf[..pad].iter().any(|&b| b != 0) {
                return Err(Error::new(ErrorKind::NonZeroPadding));
            }
        }

        Ok(())
    }

    /// Fill all of `buf`, optionally aligning first.
    ///
    /// Short reads from the underlying reader are retried until the buffer is
    /// full, end of stream is an error.
    pub async fn read_exact(&mut self, buf: &mut [u8], alignment: Option<usize>) -> Result<()> {
        if let Some(alignment) = alignment {
            self.align_read(alignment).await?;
        }

        self.reader.read_exact(buf).await?;
        self.pos += buf.len();
        Ok(())
    }

    /// Read a fixed-width value aligned to its own width.
    pub(crate) async fn read_fixed<T>(&mut self) -> Result<T>
    where
        T: Frame,
    {
        let mut bytes = T::Bytes::default();
        self.read_exact(bytes.as_mut(), Some(T::SIZE)).await?;
        let mut value = T::from_bytes(bytes);
        value.adjust(self.endianness);
        Ok(value)
    }

    /// Read a string or object path.
    pub async fn read_str(&mut self) -> Result<String> {
        let len = self.read_fixed::<u32>().await?;

        if len > MAX_BODY_LENGTH {
            return Err(Error::new(ErrorKind::StringTooLong(len)));
        }

        self.read_text(len as usize).await
    }

    /// Read an object path.
    pub async fn read_object_path(&mut self) -> Result<String> {
        let path = self.read_str().await?;

        if !object_path::validate(path.as_bytes()) {
            return Err(Error::new(ErrorKind::InvalidObjectPath(path.into())));
        }

        Ok(path)
    }

    /// Read a signature.
    pub async fn read_signature(&mut self) -> Result<String> {
        let len = self.read_fixed::<u8>().await?;
        self.read_text(usize::from(len)).await
    }

    /// Read `len` bytes of UTF-8 followed by a nul terminator.
    async fn read_text(&mut self, len: usize) -> Result<String> {
        let mut buf = vec![0; len + 1];
        self.read_exact(&mut buf, None).await?;

        if buf.pop() != Some(0) {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        }

        String::from_utf8(buf).map_err(|error| Error::from(error.utf8_error()))
    }
}
