use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use crate::error::{Error, ErrorKind, Result};
use crate::sasl;
use crate::{Address, Client};

/// The default time to wait for a reply, the same as the reference D-Bus
/// implementation.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

/// The default number of unsolicited messages kept around until they are
/// received through [`Client::next_message`].
const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
enum BusKind {
    Session,
    System,
    Address(Address),
}

/// Builder of a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    bus: BusKind,
    uid: Option<u32>,
    timeout: Option<Duration>,
    queue_capacity: usize,
}

impl ClientBuilder {
    /// Construct a new client builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_wire::ClientBuilder;
    ///
    /// let c = ClientBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self {
            bus: BusKind::Session,
            uid: None,
            timeout: Some(DEFAULT_TIMEOUT),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Construct a client connecting to the session bus (default).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dbus_wire::ClientBuilder;
    ///
    /// # #[tokio::main] async fn main() -> dbus_wire::Result<()> {
    /// let c = ClientBuilder::new().session_bus().connect().await?;
    /// # Ok(()) }
    /// ```
    pub fn session_bus(&mut self) -> &mut Self {
        self.bus = BusKind::Session;
        self
    }

    /// Construct a client connecting to the system bus.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dbus_wire::ClientBuilder;
    ///
    /// # #[tokio::main] async fn main() -> dbus_wire::Result<()> {
    /// let c = ClientBuilder::new().system_bus().connect().await?;
    /// # Ok(()) }
    /// ```
    pub fn system_bus(&mut self) -> &mut Self {
        self.bus = BusKind::System;
        self
    }

    /// Construct a client connecting to an explicit address.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dbus_wire::{Address, ClientBuilder};
    ///
    /// # #[tokio::main] async fn main() -> dbus_wire::Result<()> {
    /// let address = Address::parse("unix:path=/run/user/1000/bus")?;
    /// let c = ClientBuilder::new().address(address).connect().await?;
    /// # Ok(()) }
    /// ```
    pub fn address(&mut self, address: Address) -> &mut Self {
        self.bus = BusKind::Address(address);
        self
    }

    /// Authenticate as the given user id instead of the effective user id of
    /// the current process.
    ///
    /// This is required if the `libc` feature is disabled.
    pub fn uid(&mut self, uid: u32) -> &mut Self {
        self.uid = Some(uid);
        self
    }

    /// How long to wait for a reply to a request. `None` waits forever.
    ///
    /// Defaults to 25 seconds.
    pub fn timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// The number of unsolicited messages, like signals, which are queued up
    /// before further ones are dropped.
    ///
    /// Defaults to 64.
    pub fn queue_capacity(&mut self, capacity: usize) -> &mut Self {
        self.queue_capacity = capacity;
        self
    }

    /// Construct and connect a [`Client`] with the current configuration.
    pub async fn connect(&self) -> Result<Client> {
        let address = match &self.bus {
            BusKind::Session => Address::session_bus()?,
            BusKind::System => Address::system_bus()?,
            BusKind::Address(address) => address.clone(),
        };

        let stream = address.connect().await?;
        self.connect_stream(stream).await
    }

    /// Construct a [`Client`] over an already established stream.
    ///
    /// This performs authentication and the `Hello` exchange with the bus.
    pub async fn connect_stream<S>(&self, stream: S) -> Result<Client>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let Some(uid) = self.uid.or_else(sasl::process_uid) else {
            return Err(Error::new(ErrorKind::MissingUid));
        };

        let (reader, mut writer) = tokio::io::split(stream);

        // Bytes buffered past the last SASL line belong to the first message.
        let mut reader = BufReader::new(reader);
        let guid = sasl::authenticate(&mut reader, &mut writer, uid).await?;

        Client::start(
            reader,
            Box::new(writer),
            guid,
            self.timeout,
            self.queue_capacity,
        )
        .await
    }
}

impl Default for ClientBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
