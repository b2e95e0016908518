//! Publish/subscribe connection.
//!
//! A [`Subscriber`] owns one connection in subscribe mode and keeps it alive: when the connection
//! drops it waits a random delay, reconnects and replays every channel and pattern it was
//! subscribed to. Pushed messages are handed to the listener on a dedicated task, so a slow or
//! panicking listener never stalls the socket.
//!
//! ```text
//! Disconnected -> Connecting -> Subscribing -> Active
//!       ^              |             |            |
//!       +--------------+-------------+------------+   (any I/O failure)
//! ```

use std::any::Any;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use strum_macros::Display;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, timeout, Instant};
use tokio_util::codec::Framed;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::codec::RespCodec;
use crate::config::SubscriberConfig;
use crate::error::{Error, Result};
use crate::reply::Reply;
use crate::request::Request;

/// Receives every pushed message, on the dispatch task.
pub type Listener = dyn Fn(Message) + Send + Sync + 'static;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SubscriberState {
    Disconnected,
    Connecting,
    Subscribing,
    Active,
}

/// A message published to a channel we are subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The pattern that matched, for messages delivered through `PSUBSCRIBE`.
    pub pattern: Option<String>,
    pub channel: String,
    pub payload: Bytes,
}

impl Message {
    /// Extracts a message from a `message` or `pmessage` push. Anything else yields `None`.
    pub fn from_push(reply: Reply) -> Option<Message> {
        let items = match reply {
            Reply::MultiBulk(Some(items)) => items,
            _ => return None,
        };

        match items.as_slice() {
            [kind, channel, payload] if kind.as_bytes() == Some(&b"message"[..]) => Some(Message {
                pattern: None,
                channel: text(channel)?,
                payload: payload_of(payload)?,
            }),
            [kind, pattern, channel, payload] if kind.as_bytes() == Some(&b"pmessage"[..]) => {
                Some(Message {
                    pattern: Some(text(pattern)?),
                    channel: text(channel)?,
                    payload: payload_of(payload)?,
                })
            }
            _ => None,
        }
    }
}

fn text(reply: &Reply) -> Option<String> {
    reply
        .as_bytes()
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

fn payload_of(reply: &Reply) -> Option<Bytes> {
    match reply {
        Reply::Bulk(Some(data)) => Some(data.clone()),
        Reply::Status(text) => Some(Bytes::copy_from_slice(text.as_bytes())),
        _ => None,
    }
}

/// Handle to a running subscriber. Clones share the same connection; dropping the last one stops
/// it, as does [`Subscriber::close`].
#[derive(Clone)]
pub struct Subscriber {
    inner: Arc<Inner>,
    _stop: Arc<DropGuard>,
}

struct Inner {
    config: SubscriberConfig,
    subscriptions: Mutex<Subscriptions>,
    state: watch::Sender<SubscriberState>,
    shutdown: CancellationToken,
}

#[derive(Debug, Default)]
struct Subscriptions {
    channels: BTreeSet<String>,
    patterns: BTreeSet<String>,
    // Installed while a connection is subscribing or active. Requests queued here are written
    // after the replay.
    outbound: Option<mpsc::UnboundedSender<Request>>,
}

impl Subscriber {
    /// Starts the connect loop and the dispatch task. Must be called within a tokio runtime.
    pub fn new<F>(config: SubscriberConfig, listener: F) -> Subscriber
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(SubscriberState::Disconnected);
        let shutdown = CancellationToken::new();
        let inner = Arc::new(Inner {
            config,
            subscriptions: Mutex::new(Subscriptions::default()),
            state,
            shutdown: shutdown.clone(),
        });

        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(messages_rx, Arc::new(listener)));
        tokio::spawn(run(inner.clone(), messages_tx));

        Subscriber {
            inner,
            _stop: Arc::new(shutdown.drop_guard()),
        }
    }

    pub fn state(&self) -> SubscriberState {
        *self.inner.state.borrow()
    }

    /// Resolves once the subscriber reaches `state`.
    pub async fn wait_for(&self, state: SubscriberState) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives as long as `self.inner`.
        let _ = rx.wait_for(|current| *current == state).await;
    }

    pub fn channels(&self) -> Vec<String> {
        self.inner.lock().channels.iter().cloned().collect()
    }

    pub fn patterns(&self) -> Vec<String> {
        self.inner.lock().patterns.iter().cloned().collect()
    }

    /// Ref: <https://redis.io/docs/latest/commands/subscribe>
    pub fn subscribe<I, S>(&self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.update(Kind::Channel, true, names(channels)?);
        Ok(())
    }

    /// Ref: <https://redis.io/docs/latest/commands/unsubscribe>
    pub fn unsubscribe<I, S>(&self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.update(Kind::Channel, false, names(channels)?);
        Ok(())
    }

    /// Ref: <https://redis.io/docs/latest/commands/psubscribe>
    pub fn psubscribe<I, S>(&self, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.update(Kind::Pattern, true, names(patterns)?);
        Ok(())
    }

    /// Ref: <https://redis.io/docs/latest/commands/punsubscribe>
    pub fn punsubscribe<I, S>(&self, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.update(Kind::Pattern, false, names(patterns)?);
        Ok(())
    }

    /// Stops reconnecting and closes the current connection, if any.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }
}

fn names<I, S>(names: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
        return Err(Error::argument("at least one channel or pattern is required"));
    }
    Ok(names)
}

#[derive(Clone, Copy)]
enum Kind {
    Channel,
    Pattern,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Subscriptions> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SubscriberState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "subscriber state changed");
        }
    }

    /// Records the change, then forwards it to the live connection if there is one.
    fn update(&self, kind: Kind, add: bool, names: Vec<String>) {
        let mut subs = self.lock();

        let set = match kind {
            Kind::Channel => &mut subs.channels,
            Kind::Pattern => &mut subs.patterns,
        };
        for name in &names {
            if add {
                set.insert(name.clone());
            } else {
                set.remove(name);
            }
        }

        let command = match (kind, add) {
            (Kind::Channel, true) => "SUBSCRIBE",
            (Kind::Channel, false) => "UNSUBSCRIBE",
            (Kind::Pattern, true) => "PSUBSCRIBE",
            (Kind::Pattern, false) => "PUNSUBSCRIBE",
        };
        if let Some(outbound) = &subs.outbound {
            // A closed queue means the connection is going away; the next one replays the sets.
            let _ = outbound.send(Request::new(command).args(&names));
        }
    }

    /// Snapshots the subscription sets and installs the queue for later changes in one step.
    fn attach(&self, outbound: mpsc::UnboundedSender<Request>) -> (Vec<String>, Vec<String>) {
        let mut subs = self.lock();
        subs.outbound = Some(outbound);
        (
            subs.channels.iter().cloned().collect(),
            subs.patterns.iter().cloned().collect(),
        )
    }

    fn detach(&self) {
        self.lock().outbound = None;
    }

    fn reconnect_delay(&self) -> Duration {
        let (min, max) = (self.config.reconnect_min, self.config.reconnect_max);
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

async fn run(inner: Arc<Inner>, messages: mpsc::UnboundedSender<Message>) {
    loop {
        inner.set_state(SubscriberState::Connecting);

        let connected = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            connected = connect(&inner.config) => connected,
        };

        match connected {
            Ok((framed, peer)) => {
                let result = serve(&inner, framed, peer, &messages).await;
                inner.detach();
                match result {
                    Ok(()) => break,
                    Err(err) => warn!(%err, %peer, "subscriber connection lost"),
                }
            }
            Err(err) => warn!(%err, addr = %inner.config.addr, "subscriber failed to connect"),
        }

        inner.set_state(SubscriberState::Disconnected);

        let delay = inner.reconnect_delay();
        info!(?delay, "reconnecting subscriber");
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = time::sleep(delay) => {}
        }
    }

    inner.set_state(SubscriberState::Disconnected);
    info!("subscriber stopped");
}

async fn connect(config: &SubscriberConfig) -> Result<(Framed<TcpStream, RespCodec>, SocketAddr)> {
    let stream = match timeout(config.connect_timeout, TcpStream::connect(&config.addr)).await {
        Ok(stream) => stream?,
        Err(_) => return Err(Error::Timeout("connecting")),
    };
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    Ok((
        Framed::new(stream, RespCodec::new(config.max_frame_size)),
        peer,
    ))
}

/// Drives one connection until it fails (`Err`) or the subscriber is closed (`Ok`).
#[instrument(
    name = "subscriber",
    skip(inner, framed, messages),
    fields(connection_id = %Uuid::new_v4())
)]
async fn serve(
    inner: &Inner,
    mut framed: Framed<TcpStream, RespCodec>,
    peer: SocketAddr,
    messages: &mpsc::UnboundedSender<Message>,
) -> Result<()> {
    inner.set_state(SubscriberState::Subscribing);

    let (outbound_tx, mut outbound) = mpsc::unbounded_channel();
    let (channels, patterns) = inner.attach(outbound_tx);

    if !channels.is_empty() {
        framed.send(Request::new("SUBSCRIBE").args(&channels)).await?;
    }
    if !patterns.is_empty() {
        framed
            .send(Request::new("PSUBSCRIBE").args(&patterns))
            .await?;
    }
    info!(
        channels = channels.len(),
        patterns = patterns.len(),
        "subscriptions replayed"
    );

    inner.set_state(SubscriberState::Active);

    let period = inner.config.keepalive;
    let mut keepalive = time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => return Ok(()),
            Some(request) = outbound.recv() => {
                debug!(?request, "sending subscription change");
                framed.send(request).await?;
            }
            _ = keepalive.tick() => {
                framed.send(Request::new("PING")).await?;
            }
            reply = framed.next() => match reply {
                Some(reply) => route(reply?, messages),
                None => return Err(Error::ConnectionLost),
            },
        }
    }
}

fn route(reply: Reply, messages: &mpsc::UnboundedSender<Message>) {
    if let Reply::Error(message) = &reply {
        warn!(%message, "server error on subscriber connection");
        return;
    }
    match Message::from_push(reply) {
        Some(message) => {
            // The dispatch task only stops after this loop does.
            let _ = messages.send(message);
        }
        // Subscription confirmations and PING replies.
        None => debug!("discarding non-message push"),
    }
}

async fn dispatch(mut messages: mpsc::UnboundedReceiver<Message>, listener: Arc<Listener>) {
    while let Some(message) = messages.recv().await {
        let channel = message.channel.clone();
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| (*listener)(message))) {
            error!(%channel, panic = panic_message(&*panic), "listener panicked");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
