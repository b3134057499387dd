use std::time::Duration;

use anyhow::Result;

use crate::error::{Category, ErrorKind};
use crate::marshal::{MarshallContext, UnmarshallContext};
use crate::{Endianness, Type, Value, Variant};

const ENDIANNESS: [Endianness; 2] = [Endianness::BIG, Endianness::LITTLE];

async fn encode(ty: &Type, value: &Value, endianness: Endianness) -> crate::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ctx = MarshallContext::new(&mut buf, endianness);
    ty.marshal(&mut ctx, value).await?;
    Ok(buf)
}

async fn decode(ty: &Type, bytes: &[u8], endianness: Endianness) -> crate::Result<(Value, usize)> {
    let mut reader = bytes;
    let mut ctx = UnmarshallContext::new(&mut reader, endianness);
    let value = ty.unmarshal(&mut ctx).await?;
    Ok((value, ctx.pos()))
}

async fn roundtrip(ty: &Type, values: Vec<Value>) -> Result<()> {
    for endianness in ENDIANNESS {
        for value in &values {
            let bytes = encode(ty, value, endianness).await?;
            let (decoded, consumed) = decode(ty, &bytes, endianness).await?;
            assert_eq!(&decoded, value, "{ty} in {endianness:?}");
            assert_eq!(consumed, bytes.len());
        }
    }

    Ok(())
}

#[tokio::test]
async fn primitives() -> Result<()> {
    roundtrip(&Type::Byte, [0u8, 1, 192, 255].map(Value::from).into()).await?;
    roundtrip(&Type::Boolean, [true, false].map(Value::from).into()).await?;
    roundtrip(
        &Type::Int16,
        [0i16, 1, 32, 512, -512, 0x7FFF].map(Value::from).into(),
    )
    .await?;
    roundtrip(&Type::UInt16, [0u16, 1, 32, 512, 0x7FFF].map(Value::from).into()).await?;
    roundtrip(
        &Type::Int32,
        [0i32, 1, 32, 512, -512, 0x7FFF_FFFF].map(Value::from).into(),
    )
    .await?;
    roundtrip(
        &Type::UInt32,
        [0u32, 1, 32, 512, 0xFFFF_FFFF].map(Value::from).into(),
    )
    .await?;
    roundtrip(
        &Type::Int64,
        [0i64, 1, 32, 512, -512, 0x7FFF_FFFF_FFFF_FFFF]
            .map(Value::from)
            .into(),
    )
    .await?;
    roundtrip(
        &Type::UInt64,
        [0u64, 1, 32, 512, 0x7FFF_FFFF_FFFF_FFFF].map(Value::from).into(),
    )
    .await?;
    roundtrip(&Type::Double, [0.1f64, 0.3].map(Value::from).into()).await?;
    roundtrip(&Type::String, vec![Value::from(""), Value::from("Hello, World!")]).await?;
    roundtrip(&Type::ObjectPath, vec![Value::ObjectPath("/obj/path".into())]).await?;
    roundtrip(&Type::Signature, vec![Value::Signature("i".into())]).await?;
    roundtrip(&Type::UnixFd, vec![Value::UnixFd(3)]).await?;
    Ok(())
}

#[tokio::test]
async fn fixed_byte_order() -> Result<()> {
    let value = Value::UInt32(0x12345678);

    assert_eq!(
        encode(&Type::UInt32, &value, Endianness::LITTLE).await?,
        [0x78, 0x56, 0x34, 0x12]
    );

    assert_eq!(
        encode(&Type::UInt32, &value, Endianness::BIG).await?,
        [0x12, 0x34, 0x56, 0x78]
    );

    assert_eq!(
        encode(&Type::Boolean, &Value::Boolean(true), Endianness::BIG).await?,
        [0, 0, 0, 1]
    );

    Ok(())
}

#[tokio::test]
async fn text_encoding() -> Result<()> {
    assert_eq!(
        encode(&Type::String, &Value::from("foo"), Endianness::LITTLE).await?,
        [3, 0, 0, 0, b'f', b'o', b'o', 0]
    );

    assert_eq!(
        encode(&Type::Signature, &Value::Signature("a{sv}".into()), Endianness::LITTLE).await?,
        [5, b'a', b'{', b's', b'v', b'}', 0]
    );

    Ok(())
}

#[tokio::test]
async fn struct_alignment() -> Result<()> {
    let ty = Type::Struct(vec![Type::Byte, Type::UInt32]);
    let value = Value::Struct(vec![Value::Byte(7), Value::UInt32(0xdeadbeef)]);

    let bytes = encode(&ty, &value, Endianness::LITTLE).await?;
    assert_eq!(bytes, [7, 0, 0, 0, 0xef, 0xbe, 0xad, 0xde]);

    // A leading byte pushes the struct itself to the next 8-byte boundary.
    let ty = Type::Struct(vec![Type::Byte, ty]);
    let value = Value::Struct(vec![Value::Byte(1), value]);

    let bytes = encode(&ty, &value, Endianness::LITTLE).await?;
    assert_eq!(bytes.len(), 16);
    assert_eq!(&bytes[8..], [7, 0, 0, 0, 0xef, 0xbe, 0xad, 0xde]);

    roundtrip(&ty, vec![value]).await?;
    Ok(())
}

#[tokio::test]
async fn deeply_nested_arrays() -> Result<()> {
    let mut ty = Type::Byte;
    let mut value = Value::Byte(7);

    for _ in 0..32 {
        ty = Type::Array(Box::new(ty));
        value = Value::Array(vec![value]);
    }

    assert_eq!(Type::parse(&ty.signature())?, ty);

    let encoding = encode(&ty, &value, Endianness::LITTLE);
    let bytes = tokio::time::timeout(Duration::from_secs(5), encoding).await??;

    // One length prefix per level and the byte itself.
    assert_eq!(bytes.len(), 32 * 4 + 1);
    assert_eq!(bytes[..4], 125u32.to_le_bytes());
    assert_eq!(bytes[124..128], 1u32.to_le_bytes());

    let (decoded, consumed) = decode(&ty, &bytes, Endianness::LITTLE).await?;
    assert_eq!(decoded, value);
    assert_eq!(consumed, bytes.len());
    Ok(())
}

#[tokio::test]
async fn array_length_excludes_padding() -> Result<()> {
    let ty = Type::Array(Box::new(Type::UInt64));
    let value = Value::Array(vec![Value::UInt64(1), Value::UInt64(2)]);

    let bytes = encode(&ty, &value, Endianness::LITTLE).await?;
    assert_eq!(bytes.len(), 24);
    assert_eq!(&bytes[..8], [16, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(bytes[8], 1);
    assert_eq!(bytes[16], 2);

    let empty = encode(&ty, &Value::Array(Vec::new()), Endianness::LITTLE).await?;
    assert_eq!(empty, [0; 8]);

    roundtrip(&ty, vec![value, Value::Array(Vec::new())]).await?;
    Ok(())
}

#[tokio::test]
async fn array_overrun() -> Result<()> {
    let ty = Type::Array(Box::new(Type::UInt32));

    // Declares three bytes, but a single element needs four.
    let bytes = [3, 0, 0, 0, 1, 0, 0, 0];
    let error = decode(&ty, &bytes, Endianness::LITTLE).await.unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::ArrayOverrun(3)), "{error:?}");
    assert_eq!(error.category(), Category::Format);
    Ok(())
}

#[tokio::test]
async fn array_prefix_matches_consumed() -> Result<()> {
    let ty = Type::Array(Box::new(Type::String));
    let value = Value::Array(vec![Value::from("a"), Value::from("bcd")]);

    let mut bytes = encode(&ty, &value, Endianness::BIG).await?;
    let declared = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    assert_eq!(declared, bytes.len() - 4);

    // Trailing data after the array is left alone.
    bytes.extend_from_slice(&[0xff; 4]);
    let (decoded, consumed) = decode(&ty, &bytes, Endianness::BIG).await?;
    assert_eq!(decoded, value);
    assert_eq!(consumed, declared + 4);
    Ok(())
}

#[tokio::test]
async fn nested_containers() -> Result<()> {
    let ty = Type::parse("aas")?;
    let value = Value::Array(vec![
        Value::Array(vec![Value::from("A"), Value::from("B"), Value::from("C")]),
        Value::Array(vec![Value::from("D"), Value::from("E")]),
    ]);
    roundtrip(&ty, vec![value]).await?;

    let ty = Type::parse("(ya(qs)t)")?;
    let value = Value::Struct(vec![
        Value::Byte(1),
        Value::Array(vec![
            Value::Struct(vec![Value::UInt16(2), Value::from("x")]),
            Value::Struct(vec![Value::UInt16(3), Value::from("yz")]),
        ]),
        Value::UInt64(u64::MAX),
    ]);
    roundtrip(&ty, vec![value]).await?;
    Ok(())
}

#[tokio::test]
async fn dict_entries() -> Result<()> {
    let ty = Type::parse("a{sv}")?;

    let value = Value::Array(vec![
        Value::DictEntry(
            Box::new(Value::from("answer")),
            Box::new(Value::from(Variant::from(42u32))),
        ),
        Value::DictEntry(
            Box::new(Value::from("name")),
            Box::new(Value::from(Variant::from("dbus"))),
        ),
    ]);

    let bytes = encode(&ty, &value, Endianness::LITTLE).await?;
    // Length prefix, then padding up to the first 8-aligned entry.
    assert_eq!(&bytes[4..8], [0, 0, 0, 0]);
    assert_eq!(&bytes[8..12], [6, 0, 0, 0]);

    roundtrip(&ty, vec![value]).await?;
    Ok(())
}

#[tokio::test]
async fn variant_encoding() -> Result<()> {
    let value = Value::from(Variant::from(42u32));
    let bytes = encode(&Type::Variant, &value, Endianness::LITTLE).await?;
    assert_eq!(bytes, [1, b'u', 0, 0, 42, 0, 0, 0]);

    let nested = Value::from(Variant::new(Type::Variant, value));
    roundtrip(&Type::Variant, vec![nested]).await?;
    Ok(())
}

#[tokio::test]
async fn value_type_mismatch() -> Result<()> {
    let error = encode(&Type::UInt32, &Value::from("nope"), Endianness::LITTLE)
        .await
        .unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::ValueTypeMismatch { .. }));

    let ty = Type::Struct(vec![Type::Byte, Type::Byte]);
    let error = encode(&ty, &Value::Struct(vec![Value::Byte(1)]), Endianness::LITTLE)
        .await
        .unwrap_err();
    assert_eq!(error.category(), Category::Format);
    Ok(())
}

#[tokio::test]
async fn invalid_text() -> Result<()> {
    let error = decode(&Type::String, &[2, 0, 0, 0, 0xff, 0xfe, 0], Endianness::LITTLE)
        .await
        .unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::Utf8Error(..)), "{error:?}");

    let error = decode(&Type::String, &[2, 0, 0, 0, b'a', b'b', b'c'], Endianness::LITTLE)
        .await
        .unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::NotNullTerminated), "{error:?}");

    let error = decode(&Type::String, &[8, 0, 0, 0, b'a'], Endianness::LITTLE)
        .await
        .unwrap_err();
    assert_eq!(error.category(), Category::Stream);

    let error = decode(&Type::Variant, &[1, b'w', 0], Endianness::LITTLE)
        .await
        .unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::Signature(..)), "{error:?}");
    Ok(())
}

#[tokio::test]
async fn boolean_decodes_nonzero() -> Result<()> {
    let (value, _) = decode(&Type::Boolean, &[2, 0, 0, 0], Endianness::LITTLE).await?;
    assert_eq!(value, Value::Boolean(true));
    Ok(())
}
