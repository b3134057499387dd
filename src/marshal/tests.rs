use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::Result;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::ErrorKind;
use crate::Endianness;

use super::{padding_to, MarshallContext, UnmarshallContext};

/// A reader which only ever hands out a single byte per read.
struct Trickle<'a>(&'a [u8]);

impl AsyncRead for Trickle<'_> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some((&first, rest)) = self.0.split_first() {
            if buf.remaining() > 0 {
                buf.put_slice(&[first]);
                self.0 = rest;
            }
        }

        Poll::Ready(Ok(()))
    }
}

#[test]
fn padding() {
    assert_eq!(padding_to(0, 8), 0);
    assert_eq!(padding_to(1, 8), 7);
    assert_eq!(padding_to(5, 4), 3);
    assert_eq!(padding_to(12, 4), 0);
    assert_eq!(padding_to(13, 1), 0);
}

#[tokio::test]
async fn align_write_pads_with_zeros() -> Result<()> {
    let mut buf = Vec::new();
    let mut ctx = MarshallContext::new(&mut buf, Endianness::LITTLE);

    ctx.write_fixed(0xffu8).await?;
    ctx.write_fixed(0x0102u16).await?;
    ctx.write_fixed(0x03040506u32).await?;
    ctx.write_fixed(7u64).await?;
    assert_eq!(ctx.pos(), 16);

    assert_eq!(
        buf,
        [0xff, 0, 0x02, 0x01, 0x06, 0x05, 0x04, 0x03, 7, 0, 0, 0, 0, 0, 0, 0]
    );
    Ok(())
}

#[tokio::test]
async fn short_reads() -> Result<()> {
    let bytes = [
        0x01, 0, 0, 0, 0x12, 0x34, 0x56, 0x78, 5, 0, 0, 0, b'h', b'e', b'l', b'l', b'o', 0,
    ];

    let mut reader = Trickle(&bytes);
    let mut ctx = UnmarshallContext::new(&mut reader, Endianness::BIG);

    assert_eq!(ctx.read_fixed::<u8>().await?, 1);
    assert_eq!(ctx.read_fixed::<u32>().await?, 0x12345678);
    assert_eq!(ctx.read_fixed::<u32>().await?, 0x05000000);
    assert_eq!(ctx.pos(), 12);

    let mut rest = [0; 6];
    ctx.read_exact(&mut rest, None).await?;
    assert_eq!(&rest, b"hello\0");
    assert_eq!(ctx.pos(), bytes.len());
    Ok(())
}

#[tokio::test]
async fn unexpected_eof() -> Result<()> {
    let mut reader = Trickle(&[1, 2, 3]);
    let mut ctx = UnmarshallContext::new(&mut reader, Endianness::LITTLE);

    let error = ctx.read_fixed::<u32>().await.unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::UnexpectedEof), "{error:?}");
    Ok(())
}

#[tokio::test]
async fn nonzero_padding() -> Result<()> {
    let mut reader: &[u8] = &[1, 9, 0, 0, 1, 0, 0, 0];
    let mut ctx = UnmarshallContext::new(&mut reader, Endianness::LITTLE);

    ctx.read_fixed::<u8>().await?;
    let error = ctx.read_fixed::<u32>().await.unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::NonZeroPadding), "{error:?}");
    Ok(())
}

#[tokio::test]
async fn swaps_foreign_endianness() -> Result<()> {
    for (endianness, expected) in [
        (Endianness::LITTLE, [0x34, 0x12]),
        (Endianness::BIG, [0x12, 0x34]),
    ] {
        let mut buf = Vec::new();
        let mut ctx = MarshallContext::new(&mut buf, endianness);
        ctx.write_fixed(0x1234i16).await?;
        assert_eq!(buf, expected);

        let mut reader = &buf[..];
        let mut ctx = UnmarshallContext::new(&mut reader, endianness);
        assert_eq!(ctx.read_fixed::<i16>().await?, 0x1234);
    }

    Ok(())
}

#[tokio::test]
async fn oversized_signature() -> Result<()> {
    let mut buf = Vec::new();
    let mut ctx = MarshallContext::new(&mut buf, Endianness::LITTLE);
    let error = ctx.write_signature(&"i".repeat(300)).await.unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::Signature(..)), "{error:?}");
    Ok(())
}
