use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use strum_macros::Display;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::codec::RespCodec;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::mapper::Mapper;
use crate::pending::{PendingRegistry, PendingRequest};
use crate::reply::Reply;
use crate::request::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// A pipelined command connection.
///
/// Any number of callers may execute commands concurrently. Requests are written in submission
/// order and a single reader task hands each decoded reply to the oldest outstanding request.
/// A fatal condition (peer closed, I/O error, malformed reply, timeout) tears the connection down
/// and fails every outstanding request with [`Error::ConnectionLost`]. A closed connection is
/// never reopened; build a new one instead.
#[derive(Debug)]
pub struct Connection {
    shared: Arc<Shared>,
    writer: Mutex<Writer>,
    send_timeout: Duration,
    next_seq_id: AtomicU64,
}

/// State the reader task and the callers both touch.
#[derive(Debug)]
struct Shared {
    id: Uuid,
    peer: SocketAddr,
    pending: PendingRegistry,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

#[derive(Debug)]
struct Writer {
    stream: OwnedWriteHalf,
    // Encoded requests not yet accepted by the socket. Bytes left behind by a caller that gave up
    // mid-write go out ahead of the next request, so the stream never desyncs.
    buffer: BytesMut,
}

impl Connection {
    pub async fn connect(config: &ClientConfig) -> Result<Connection> {
        let (state, _) = watch::channel(ConnectionState::Connecting);

        let stream = match timeout(config.connect_timeout, TcpStream::connect(&config.addr)).await
        {
            Ok(stream) => stream?,
            Err(_) => return Err(Error::Timeout("connecting")),
        };
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            peer,
            pending: PendingRegistry::new(),
            state,
            shutdown: CancellationToken::new(),
        });

        // Open before the reader starts, or an early teardown could be overwritten.
        shared.state.send_replace(ConnectionState::Open);
        info!(connection_id = %shared.id, %peer, "connection open");

        let replies = FramedRead::new(read_half, RespCodec::new(config.max_frame_size));
        tokio::spawn(read_replies(shared.clone(), replies, config.receive_timeout));

        Ok(Connection {
            shared,
            writer: Mutex::new(Writer {
                stream: write_half,
                buffer: BytesMut::with_capacity(4096),
            }),
            send_timeout: config.send_timeout,
            next_seq_id: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Number of requests written whose reply has not been decoded yet.
    pub fn pending(&self) -> usize {
        self.shared.pending.len()
    }

    /// Resolves once the connection has been torn down, whatever the cause.
    pub async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        // The sender lives in `self.shared`, so the channel cannot close under us.
        let _ = state.wait_for(|state| *state == ConnectionState::Closed).await;
    }

    /// Sends `request` and projects its reply through `mapper`.
    ///
    /// An error reply resolves to [`Error::Server`] for this caller only; the connection stays
    /// usable.
    pub async fn execute<M: Mapper>(&self, request: Request, mapper: M) -> Result<M::Output> {
        match self.send(request).await? {
            Reply::Error(message) => Err(Error::Server(message)),
            reply => mapper.map(reply),
        }
    }

    /// Sends `request` and returns its undecoded reply, error replies included.
    pub async fn send(&self, request: Request) -> Result<Reply> {
        let reply = {
            let mut writer = self.writer.lock().await;

            // Registering under the writer lock keeps registry order equal to wire order. Time
            // spent waiting for the lock does not count toward the receive timeout.
            let seq_id = self.next_seq_id.fetch_add(1, Ordering::Relaxed);
            let (pending, reply) = PendingRequest::new(seq_id);
            self.shared.pending.enqueue(pending)?;
            request.encode(&mut writer.buffer);
            debug!(connection_id = %self.shared.id, seq_id, ?request, "sending request");

            let sent = match timeout(self.send_timeout, writer.flush()).await {
                Ok(sent) => sent,
                Err(_) => Err(Error::Timeout("sending a request")),
            };
            if let Err(err) = sent {
                drop(writer);
                warn!(connection_id = %self.shared.id, seq_id, %err, "failed to send request");
                self.shared.teardown("send failed");
                return Err(err);
            }
            reply
        };

        match reply.await {
            Ok(result) => result,
            // The reader dropped the request without completing it.
            Err(_) => Err(Error::ConnectionLost),
        }
    }

    /// Tears the connection down. Outstanding requests fail with [`Error::ConnectionLost`].
    pub fn close(&self) {
        self.shared.teardown("closed by caller");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.teardown("dropped");
    }
}

impl Writer {
    async fn flush(&mut self) -> Result<()> {
        while self.buffer.has_remaining() {
            let n = self.stream.write_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(Error::ConnectionLost);
            }
        }
        self.stream.flush().await?;
        Ok(())
    }
}

impl Shared {
    /// Runs once per connection no matter how many parties observe the failure.
    fn teardown(&self, reason: &'static str) {
        let first = self.state.send_if_modified(|state| match state {
            ConnectionState::Closing | ConnectionState::Closed => false,
            _ => {
                *state = ConnectionState::Closing;
                true
            }
        });
        if !first {
            return;
        }

        info!(connection_id = %self.id, reason, "closing connection");
        self.shutdown.cancel();

        let outstanding = self.pending.drain_all();
        if !outstanding.is_empty() {
            warn!(
                connection_id = %self.id,
                count = outstanding.len(),
                "failing outstanding requests"
            );
        }
        for pending in outstanding {
            pending.complete(Err(Error::ConnectionLost));
        }

        self.state.send_replace(ConnectionState::Closed);
    }
}

#[instrument(
    name = "connection",
    skip(shared, replies, receive_timeout),
    fields(connection_id = %shared.id, peer = %shared.peer)
)]
async fn read_replies(
    shared: Arc<Shared>,
    mut replies: FramedRead<OwnedReadHalf, RespCodec>,
    receive_timeout: Duration,
) {
    let reason = loop {
        let next = tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            next = timeout(receive_timeout, replies.next()) => next,
        };

        let reply = match next {
            Ok(Some(Ok(reply))) => reply,
            Ok(Some(Err(err))) => {
                error!(%err, "failed to read reply");
                break "read failed";
            }
            Ok(None) => break "closed by peer",
            // Idle connections wait as long as they like. Only a request that has itself been
            // outstanding for the whole window counts as a timeout.
            Err(_) => match shared.pending.oldest_elapsed() {
                Some(elapsed) if elapsed >= receive_timeout => {
                    warn!(?elapsed, "no reply within the receive timeout");
                    break "receive timeout";
                }
                _ => continue,
            },
        };

        match shared.pending.dequeue_one() {
            Some(pending) => {
                debug!(
                    seq_id = pending.seq_id(),
                    elapsed = ?pending.elapsed(),
                    "received {}",
                    reply.kind()
                );
                pending.complete(Ok(reply));
            }
            None => {
                error!(?reply, "received a reply nobody asked for");
                break "unsolicited reply";
            }
        }
    };

    shared.teardown(reason);
}
