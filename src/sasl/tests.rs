use anyhow::Result;
use bstr::BStr;
use tokio::io::{AsyncReadExt, BufReader};

use crate::error::{Category, ErrorKind};

use super::{
    authenticate, from_hex, recv, send, to_hex, ClientCommand, Guid, ServerCommand, MAX_LINE_LENGTH,
};

fn hex_bytes(spaced: &str) -> Vec<u8> {
    spaced
        .split(' ')
        .map(|b| u8::from_str_radix(b, 16).unwrap())
        .collect()
}

async fn sent(command: ClientCommand) -> Result<Vec<u8>> {
    let mut out = Vec::<u8>::new();
    send(&mut out, &command).await?;
    Ok(out)
}

#[test]
fn external_from_uid() {
    let initial_response = |uid| match ClientCommand::external(uid) {
        ClientCommand::Auth {
            initial_response, ..
        } => to_hex(&initial_response),
        _ => unreachable!(),
    };

    assert_eq!(initial_response(1000), "31303030");
    assert_eq!(initial_response(u32::MAX), "34323934393637323935");
    assert_eq!(initial_response(0), "30");
}

#[test]
fn hex() -> Result<()> {
    assert_eq!(to_hex(&[0x00, 0x0f, 0xa0, 0xff]), "000fa0ff");
    assert_eq!(from_hex("000fA0ff")?, [0x00, 0x0f, 0xa0, 0xff]);
    assert!(from_hex("abc").is_err());
    assert!(from_hex("zz").is_err());
    Ok(())
}

#[tokio::test]
async fn auth_external() -> Result<()> {
    let expected =
        hex_bytes("41 55 54 48 20 45 58 54 45 52 4e 41 4c 20 33 31 33 30 33 30 33 30 0d 0a");
    assert_eq!(sent(ClientCommand::external(1000)).await?, expected);
    Ok(())
}

#[tokio::test]
async fn negotiate_unix_fd() -> Result<()> {
    let expected = hex_bytes("4e 45 47 4f 54 49 41 54 45 5f 55 4e 49 58 5f 46 44 0d 0a");
    assert_eq!(sent(ClientCommand::NegotiateUnixFd).await?, expected);
    Ok(())
}

#[tokio::test]
async fn begin() -> Result<()> {
    assert_eq!(sent(ClientCommand::Begin).await?, hex_bytes("42 45 47 49 4e 0d 0a"));
    Ok(())
}

#[tokio::test]
async fn other_client_commands() -> Result<()> {
    assert_eq!(BStr::new(&sent(ClientCommand::Cancel).await?), "CANCEL\r\n");
    assert_eq!(
        BStr::new(&sent(ClientCommand::Data(b"hi".to_vec())).await?),
        "DATA 6869\r\n"
    );
    assert_eq!(
        BStr::new(&sent(ClientCommand::Error(String::from("no idea"))).await?),
        "ERROR no idea\r\n"
    );
    Ok(())
}

#[tokio::test]
async fn ok() -> Result<()> {
    let bytes = hex_bytes(
        "4f 4b 20 63 64 30 32 37 34 35 39 36 39 62 33 36 30 63 39 32 34 39 36 35 30 65 32 36 31 63 36 39 39 66 39 0d 0a",
    );

    let ServerCommand::Ok(guid) = recv(&mut &bytes[..]).await? else {
        panic!("expected OK");
    };

    assert_eq!(guid.to_string(), "cd02745969b360c9249650e261c699f9");
    assert_eq!(guid.as_bytes()[0], 0xcd);
    Ok(())
}

#[tokio::test]
async fn agree_unix_fd() -> Result<()> {
    let bytes = hex_bytes("41 47 52 45 45 5f 55 4e 49 58 5f 46 44 0d 0a");
    assert_eq!(recv(&mut &bytes[..]).await?, ServerCommand::AgreeUnixFd);
    Ok(())
}

#[test]
fn decode_server_commands() -> Result<()> {
    assert_eq!(
        ServerCommand::decode("REJECTED EXTERNAL DBUS_COOKIE_SHA1")?,
        ServerCommand::Rejected(vec!["EXTERNAL".into(), "DBUS_COOKIE_SHA1".into()])
    );
    assert_eq!(ServerCommand::decode("REJECTED")?, ServerCommand::Rejected(Vec::new()));
    assert_eq!(
        ServerCommand::decode("DATA 6869")?,
        ServerCommand::Data(b"hi".to_vec())
    );
    assert_eq!(
        ServerCommand::decode("ERROR bad things happened")?,
        ServerCommand::Error("bad things happened".into())
    );

    let error = ServerCommand::decode("HELLO there").unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::UnknownSaslCommand(..)), "{error:?}");
    assert_eq!(error.category(), Category::Auth);

    let error = ServerCommand::decode("OK cd02").unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::InvalidGuid), "{error:?}");

    let error = ServerCommand::decode("OK").unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::InvalidSasl), "{error:?}");
    Ok(())
}

#[tokio::test]
async fn line_reader_is_bounded() -> Result<()> {
    let mut long = vec![b'E'; MAX_LINE_LENGTH + 8];
    long.extend_from_slice(b"\r\n");

    let mut reader = BufReader::with_capacity(64, &long[..]);
    let error = recv(&mut reader).await.unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::LineTooLong), "{error:?}");

    let error = recv(&mut &b"AGREE_UNIX_FD"[..]).await.unwrap_err();
    assert_eq!(error.category(), Category::Stream);

    let error = recv(&mut &b"AGREE_UNIX_FD\n"[..]).await.unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::InvalidSasl), "{error:?}");
    Ok(())
}

#[tokio::test]
async fn handshake() -> Result<()> {
    let server = b"OK cd02745969b360c9249650e261c699f9\r\nAGREE_UNIX_FD\r\nl\x01binary";

    // A tiny buffer forces lines to be assembled over several reads.
    let mut reader = BufReader::with_capacity(4, &server[..]);
    let mut writer = Vec::<u8>::new();

    let guid = authenticate(&mut reader, &mut writer, 1000).await?;

    assert_eq!(guid, Guid::new(from_hex("cd02745969b360c9249650e261c699f9")?.try_into().unwrap()));
    assert_eq!(
        BStr::new(&writer),
        "\0AUTH EXTERNAL 31303030\r\nNEGOTIATE_UNIX_FD\r\nBEGIN\r\n"
    );

    // Whatever follows the handshake is left for the binary protocol.
    let mut rest = Vec::<u8>::new();
    reader.read_to_end(&mut rest).await?;
    assert_eq!(BStr::new(&rest), "l\x01binary");
    Ok(())
}

#[tokio::test]
async fn handshake_rejected() -> Result<()> {
    let mut reader = &b"REJECTED DBUS_COOKIE_SHA1\r\n"[..];
    let error = authenticate(&mut reader, &mut Vec::<u8>::new(), 1000).await.unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::Rejected(..)), "{error:?}");
    assert_eq!(error.category(), Category::Auth);

    let mut reader = &b"OK cd02745969b360c9249650e261c699f9\r\nERROR not supported\r\n"[..];
    let error = authenticate(&mut reader, &mut Vec::<u8>::new(), 1000).await.unwrap_err();

    assert!(
        matches!(
            error.kind(),
            ErrorKind::UnexpectedSaslResponse {
                expected: "AGREE_UNIX_FD",
                ..
            }
        ),
        "{error:?}"
    );
    Ok(())
}
