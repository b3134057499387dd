//! An asynchronous client correlating method calls with their replies.


use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, ErrorKind, Result};
use crate::org_freedesktop_dbus;
use crate::protocol::MessageType;
use crate::sasl::Guid;
use crate::{ClientBuilder, Message, Variant};

type Writer = Box<dyn AsyncWrite + Unpin + Send>;
type Waiter = oneshot::Sender<Result<Message>>;

/// Requests waiting for a reply.
#[derive(Default)]
struct Pending {
    waiters: HashMap<u32, Waiter>,
    /// Set once the connection is no longer usable.
    closed: Option<Arc<str>>,
}

/// State shared between the client and its receive loop.
#[derive(Default)]
struct Shared {
    pending: Mutex<Pending>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for a reply to `serial`.
    fn register(&self, serial: NonZeroU32, waiter: Waiter) -> Result<()> {
        let mut pending = self.pending();

        if let Some(reason) = &pending.closed {
            return Err(Error::new(ErrorKind::ConnectionClosed(reason.clone())));
        }

        pending.waiters.insert(serial.get(), waiter);
        Ok(())
    }

    /// Take the waiter for `serial`, if one is registered.
    fn take(&self, serial: NonZeroU32) -> Option<Waiter> {
        self.pending().waiters.remove(&serial.get())
    }

    fn closed_error(&self) -> Error {
        let reason = self
            .pending()
            .closed
            .clone()
            .unwrap_or_else(|| Arc::from("receive loop ended"));

        Error::new(ErrorKind::ConnectionClosed(reason))
    }

    /// Mark the connection as closed and fail every pending request.
    fn close(&self, reason: Arc<str>) {
        let waiters = {
            let mut pending = self.pending();

            if pending.closed.is_none() {
                pending.closed = Some(reason.clone());
            }

            std::mem::take(&mut pending.waiters)
        };

        for (_, waiter) in waiters {
            let _ = waiter.send(Err(Error::new(ErrorKind::ConnectionClosed(reason.clone()))));
        }
    }
}

/// Removes the waiter for a request which didn't complete, such as when it
/// timed out or its future was dropped.
struct WaiterGuard<'a> {
    shared: &'a Shared,
    serial: NonZeroU32,
}

impl Drop for WaiterGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.shared.take(self.serial);
    }
}

/// An asynchronous D-Bus client.
///
/// All methods take `&self`, so a client wrapped in an [`Arc`] can issue any
/// number of concurrent requests. Replies are matched to requests by a
/// background task which is the sole reader of the connection.
pub struct Client {
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<Writer>,
    /// The next serial to allocate, zero once exhausted.
    serial: AtomicU32,
    receiver: JoinHandle<()>,
    unsolicited: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    timeout: Option<Duration>,
    guid: Guid,
    name: Box<str>,
}

impl Client {
    /// Shorthand for connecting the client to the session bus using the
    /// default configuration.
    #[inline]
    pub async fn session_bus() -> Result<Self> {
        ClientBuilder::new().session_bus().connect().await
    }

    /// Shorthand for connecting the client to the system bus using the
    /// default configuration.
    #[inline]
    pub async fn system_bus() -> Result<Self> {
        ClientBuilder::new().system_bus().connect().await
    }

    /// Start the receive loop on an authenticated connection and say `Hello`
    /// to the bus.
    pub(crate) async fn start<R>(
        reader: R,
        writer: Writer,
        guid: Guid,
        timeout: Option<Duration>,
        queue_capacity: usize,
    ) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let receiver = tokio::spawn(receive_loop(reader, shared.clone(), tx));

        let mut client = Self {
            shared,
            writer: tokio::sync::Mutex::new(writer),
            serial: AtomicU32::new(1),
            receiver,
            unsolicited: tokio::sync::Mutex::new(rx),
            timeout,
            guid,
            name: Box::from(""),
        };

        let reply = client
            .request(
                org_freedesktop_dbus::PATH,
                org_freedesktop_dbus::DESTINATION,
                org_freedesktop_dbus::INTERFACE,
                "Hello",
                Vec::new(),
            )
            .await?;

        let name = match reply.body() {
            [name, ..] => name.value().as_str(),
            [] => None,
        };

        let Some(name) = name else {
            return Err(Error::new(ErrorKind::ValueTypeMismatch {
                expected: "s".into(),
            }));
        };

        client.name = name.into();
        log::debug!("Connected as {}", client.name);
        Ok(client)
    }

    /// The unique name assigned by the bus in reply to `Hello`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The GUID of the server, as reported during authentication.
    #[inline]
    pub fn server_guid(&self) -> &Guid {
        &self.guid
    }

    /// Call `member` on the object at `path` owned by `destination` and wait
    /// for the reply.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dbus_wire::{Client, Variant};
    ///
    /// # #[tokio::main] async fn main() -> dbus_wire::Result<()> {
    /// let c = Client::session_bus().await?;
    ///
    /// let reply = c
    ///     .request(
    ///         "/org/freedesktop/DBus",
    ///         "org.freedesktop.DBus",
    ///         "org.freedesktop.DBus",
    ///         "GetNameOwner",
    ///         vec![Variant::from("org.freedesktop.DBus")],
    ///     )
    ///     .await?;
    ///
    /// dbg!(reply.body());
    /// # Ok(()) }
    /// ```
    ///
    /// # Errors
    ///
    /// Errors with a [`Category::Response`] error if the remote end replies
    /// with an error, and with a [`Category::Connection`] error if the request
    /// times out or the connection is lost.
    ///
    /// [`Category::Response`]: crate::Category::Response
    /// [`Category::Connection`]: crate::Category::Connection
    pub async fn request(
        &self,
        path: &str,
        destination: &str,
        interface: &str,
        member: &str,
        args: Vec<Variant>,
    ) -> Result<Message> {
        let message = Message::new(MessageType::METHOD_CALL, NonZeroU32::MIN)
            .with_path(path)
            .with_destination(destination)
            .with_interface(interface)
            .with_member(member)
            .with_body(args);

        self.call(message).await
    }

    /// Send a prepared method call and wait for the reply.
    ///
    /// The serial of `message` is replaced with a freshly allocated one.
    pub async fn call(&self, message: Message) -> Result<Message> {
        let serial = self.next_serial()?;
        let message = message.with_serial(serial);

        let (tx, rx) = oneshot::channel();
        self.shared.register(serial, tx)?;

        let guard = WaiterGuard {
            shared: &self.shared,
            serial,
        };

        self.write(&message).await?;

        let reply = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(reply) => reply,
                Err(..) => {
                    log::debug!("Request {serial} timed out after {timeout:?}");
                    return Err(Error::new(ErrorKind::Timeout));
                }
            },
            None => rx.await,
        };

        drop(guard);

        let reply = match reply {
            Ok(reply) => reply?,
            Err(..) => return Err(self.shared.closed_error()),
        };

        match reply.message_type() {
            MessageType::METHOD_RETURN => Ok(reply),
            MessageType::ERROR => {
                let name = reply.error_name().unwrap_or_default();

                let message = match reply.body() {
                    [first, ..] => first.value().as_str().unwrap_or_default(),
                    [] => "",
                };

                Err(Error::new(ErrorKind::ResponseError(name.into(), message.into())))
            }
            other => Err(Error::new(ErrorKind::UnexpectedReply(other))),
        }
    }

    /// Send a message which doesn't expect a reply, such as a signal.
    ///
    /// The serial of `message` is replaced with a freshly allocated one, which
    /// is returned.
    pub async fn send(&self, message: Message) -> Result<NonZeroU32> {
        let serial = self.next_serial()?;
        self.write(&message.with_serial(serial)).await?;
        Ok(serial)
    }

    /// Receive the next message which wasn't a reply to a request made by
    /// this client, such as signals or method calls.
    ///
    /// Returns `None` once the connection is closed and every queued message
    /// has been received.
    pub async fn next_message(&self) -> Option<Message> {
        self.unsolicited.lock().await.recv().await
    }

    /// Stop the receive loop and shut down the connection.
    ///
    /// Pending requests fail with a connection error.
    pub async fn close(self) -> Result<()> {
        self.receiver.abort();
        self.shared.close(Arc::from("client closed"));
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }

    /// Allocate the next serial.
    fn next_serial(&self) -> Result<NonZeroU32> {
        let serial = self
            .serial
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |serial| {
                (serial != 0).then(|| serial.wrapping_add(1))
            });

        match serial.ok().and_then(NonZeroU32::new) {
            Some(serial) => Ok(serial),
            None => Err(Error::new(ErrorKind::SerialExhausted)),
        }
    }

    /// Marshal a message and write it to the connection.
    ///
    /// The message is fully marshalled before the writer is locked so that
    /// concurrent writes never interleave.
    async fn write(&self, message: &Message) -> Result<()> {
        let mut buf = Vec::new();
        message.marshal(&mut buf).await?;

        log::trace!(
            "Send {:?} serial={} member={:?}",
            message.message_type(),
            message.serial(),
            message.member()
        );

        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// The receive loop, which is the sole reader of the connection.
async fn receive_loop<R>(mut reader: R, shared: Arc<Shared>, unsolicited: mpsc::Sender<Message>)
where
    R: AsyncRead + Unpin + Send,
{
    let error = loop {
        let message = match Message::unmarshal(&mut reader).await {
            Ok(message) => message,
            Err(error) => break error,
        };

        log::trace!(
            "Recv {:?} serial={} reply_serial={:?}",
            message.message_type(),
            message.serial(),
            message.reply_serial()
        );

        let is_reply = matches!(
            message.message_type(),
            MessageType::METHOD_RETURN | MessageType::ERROR
        );

        let waiter = match message.reply_serial() {
            Some(reply_serial) if is_reply => shared.take(reply_serial),
            _ => None,
        };

        if let Some(waiter) = waiter {
            let _ = waiter.send(Ok(message));
            continue;
        }

        log::debug!(
            "Unsolicited {:?} from {:?}: {:?}.{:?}",
            message.message_type(),
            message.sender(),
            message.interface(),
            message.member()
        );

        match unsolicited.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                log::warn!(
                    "Dropping message with serial {}: unsolicited queue is full",
                    message.serial()
                );
            }
            Err(TrySendError::Closed(..)) => {}
        }
    };

    log::debug!("Receive loop terminated: {error}");
    shared.close(Arc::from(error.to_string()));
}
