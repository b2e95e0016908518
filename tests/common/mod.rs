#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use glob_match::glob_match;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{sleep, timeout, Instant};

use redis_driver::reply::{self, Reply};
use redis_driver::{ClientConfig, Request, SubscriberConfig};

/// What the stub does with a request it received.
pub enum Action {
    Reply(Vec<u8>),
    Ignore,
    Close,
}

/// Command server answering every request through a handler.
pub struct CommandStub {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Vec<String>>>>,
    accepted: Arc<AtomicUsize>,
}

impl CommandStub {
    pub async fn start<F>(handler: F) -> CommandStub
    where
        F: Fn(&[String]) -> Action + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(vec![]));
        let accepted = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        {
            let received = received.clone();
            let accepted = accepted.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(answer(socket, handler.clone(), received.clone()));
                }
            });
        }

        CommandStub {
            addr,
            received,
            accepted,
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.addr.to_string())
    }

    pub fn received(&self) -> Vec<Vec<String>> {
        self.received.lock().unwrap().clone()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

async fn answer<F>(mut socket: TcpStream, handler: Arc<F>, received: Arc<Mutex<Vec<Vec<String>>>>)
where
    F: Fn(&[String]) -> Action + Send + Sync + 'static,
{
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        match socket.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        while let Ok(Some((request, consumed))) = reply::decode(&buf) {
            buf.advance(consumed);
            let parts = parts(request);
            received.lock().unwrap().push(parts.clone());

            match (*handler)(&parts) {
                Action::Reply(bytes) => {
                    if socket.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                Action::Ignore => {}
                Action::Close => return,
            }
        }
    }
}

fn parts(request: Reply) -> Vec<String> {
    match request {
        Reply::MultiBulk(Some(items)) => items
            .iter()
            .map(|item| String::from_utf8_lossy(item.as_bytes().unwrap_or_default()).into_owned())
            .collect(),
        other => panic!("not a request: {:?}", other),
    }
}

/// A listener whose accepted socket writes whatever is pushed through the returned channel and
/// discards whatever it reads.
pub async fn raw_server() -> (UnboundedSender<Vec<u8>>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            let (mut read_half, mut write_half) = socket.into_split();
            tokio::spawn(async move {
                let mut sink = vec![0; 1024];
                while let Ok(n) = read_half.read(&mut sink).await {
                    if n == 0 {
                        break;
                    }
                }
            });
            while let Some(data) = rx.recv().await {
                // Write the received channel data to the socket.
                if write_half.write_all(&data).await.is_err() {
                    break;
                }
            }
        }
    });

    (tx, addr)
}

/// A listener that accepts one connection and never reads from it.
pub async fn silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            sleep(Duration::from_secs(30)).await;
            drop(socket);
        }
    });

    addr
}

/// Publish/subscribe server tracking the subscriptions of every session it accepted.
pub struct PubSubStub {
    pub addr: SocketAddr,
    state: Arc<Mutex<PubSubState>>,
}

#[derive(Default)]
struct PubSubState {
    sessions: Vec<Session>,
    // (session id, request parts)
    commands: Vec<(usize, Vec<String>)>,
    accepted: usize,
}

struct Session {
    id: usize,
    channels: HashSet<String>,
    patterns: HashSet<String>,
    // `None` closes the session.
    tx: UnboundedSender<Option<Vec<u8>>>,
}

impl PubSubStub {
    pub async fn start() -> PubSubStub {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(PubSubState::default()));

        {
            let state = state.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let id = {
                        let mut state = state.lock().unwrap();
                        let id = state.accepted;
                        state.accepted += 1;
                        state.sessions.push(Session {
                            id,
                            channels: HashSet::new(),
                            patterns: HashSet::new(),
                            tx,
                        });
                        id
                    };
                    tokio::spawn(session(socket, id, rx, state.clone()));
                }
            });
        }

        PubSubStub { addr, state }
    }

    pub fn config(&self) -> SubscriberConfig {
        let mut config = SubscriberConfig::new(self.addr.to_string());
        config.reconnect_min = Duration::from_millis(20);
        config.reconnect_max = Duration::from_millis(60);
        config
    }

    /// Delivers `payload` to every live session subscribed to `channel` directly or by pattern.
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        let state = self.state.lock().unwrap();
        let mut delivered = 0;
        for session in &state.sessions {
            if session.channels.contains(channel) {
                let frame = Request::new("message").arg(channel).arg(payload);
                let _ = session.tx.send(Some(frame.to_bytes().to_vec()));
                delivered += 1;
            }
            for pattern in &session.patterns {
                if glob_match(pattern, channel) {
                    let frame = Request::new("pmessage")
                        .arg(pattern.as_str())
                        .arg(channel)
                        .arg(payload);
                    let _ = session.tx.send(Some(frame.to_bytes().to_vec()));
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Closes every live session from the server side.
    pub fn kill_all(&self) {
        let mut state = self.state.lock().unwrap();
        for session in state.sessions.drain(..) {
            let _ = session.tx.send(None);
        }
    }

    pub fn accepted(&self) -> usize {
        self.state.lock().unwrap().accepted
    }

    /// Requests received on session `id`, in arrival order.
    pub fn commands(&self, id: usize) -> Vec<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|(session, _)| *session == id)
            .map(|(_, parts)| parts.clone())
            .collect()
    }

    pub fn is_subscribed(&self, id: usize, channel: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .sessions
            .iter()
            .any(|s| s.id == id && (s.channels.contains(channel) || s.patterns.contains(channel)))
    }
}

async fn session(
    mut socket: TcpStream,
    id: usize,
    mut rx: mpsc::UnboundedReceiver<Option<Vec<u8>>>,
    state: Arc<Mutex<PubSubState>>,
) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        tokio::select! {
            out = rx.recv() => match out {
                Some(Some(bytes)) => {
                    if socket.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                // Dropping the socket closes the session.
                _ => return,
            },
            read = socket.read_buf(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                while let Ok(Some((request, consumed))) = reply::decode(&buf) {
                    buf.advance(consumed);
                    let parts = parts(request);
                    let response = apply(&state, id, &parts);
                    if socket.write_all(&response).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn apply(state: &Mutex<PubSubState>, id: usize, parts: &[String]) -> Vec<u8> {
    let mut state = state.lock().unwrap();
    state.commands.push((id, parts.to_vec()));

    let command = parts[0].to_ascii_lowercase();
    let session = match state.sessions.iter_mut().find(|s| s.id == id) {
        Some(session) => session,
        None => return vec![],
    };

    let mut response = vec![];
    for name in &parts[1..] {
        match command.as_str() {
            "subscribe" => {
                session.channels.insert(name.clone());
            }
            "unsubscribe" => {
                session.channels.remove(name);
            }
            "psubscribe" => {
                session.patterns.insert(name.clone());
            }
            "punsubscribe" => {
                session.patterns.remove(name);
            }
            _ => continue,
        }
        let count = session.channels.len() + session.patterns.len();
        response.extend_from_slice(
            format!(
                "*3\r\n${}\r\n{}\r\n${}\r\n{}\r\n:{}\r\n",
                command.len(),
                command,
                name.len(),
                name,
                count
            )
            .as_bytes(),
        );
    }
    if command == "ping" {
        response.extend_from_slice(b"+PONG\r\n");
    }
    response
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn eventually<F: FnMut() -> bool>(what: &str, mut condition: F) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Fails the test when `future` takes longer than two seconds.
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    timeout(Duration::from_secs(2), future)
        .await
        .expect("timed out")
}
