//! An asynchronous D-Bus client for Tokio.
//!
//! This covers the whole client side of the wire protocol:
//!
//! * A signature driven [`Type`] system which marshals and unmarshals
//!   [`Value`]s with D-Bus alignment rules through a [`MarshallContext`] or
//!   [`UnmarshallContext`].
//! * [`Message`] framing, including header fields and body validation.
//! * The [`sasl`] handshake using `EXTERNAL` authentication.
//! * A [`Client`] which matches replies to concurrent requests from a
//!   background receive loop.
//!
//! # Examples
//!
//! ```no_run
//! use dbus_wire::{Client, Variant};
//!
//! # #[tokio::main] async fn main() -> dbus_wire::Result<()> {
//! let c = Client::session_bus().await?;
//! println!("Connected as {}", c.name());
//!
//! let reply = c
//!     .request(
//!         "/org/freedesktop/DBus",
//!         "org.freedesktop.DBus",
//!         "org.freedesktop.DBus",
//!         "ListNames",
//!         Vec::new(),
//!     )
//!     .await?;
//!
//! if let Some(names) = reply.body().first().and_then(|v| v.value().as_array()) {
//!     for name in names {
//!         println!("{}", name.as_str().unwrap_or_default());
//!     }
//! }
//! # Ok(()) }
//! ```

#[doc(inline)]
pub use self::error::{Category, Error, Result};
mod error;

#[doc(inline)]
pub use self::protocol::{Endianness, Flags, HeaderField, MessageType};
pub mod protocol;

mod frame;

mod object_path;

#[doc(inline)]
pub use self::signature::{parse_signature, parse_signatures, SignatureError};
mod signature;

#[doc(inline)]
pub use self::marshal::{MarshallContext, UnmarshallContext};
mod marshal;

#[doc(inline)]
pub use self::ty::{Type, Value};
mod ty;

#[doc(inline)]
pub use self::variant::Variant;
mod variant;

#[doc(inline)]
pub use self::message::Message;
mod message;

pub mod sasl;

#[doc(inline)]
pub use self::transport::Address;
mod transport;

pub use self::client::Client;
mod client;

pub use self::client_builder::ClientBuilder;
mod client_builder;

pub mod org_freedesktop_dbus;
