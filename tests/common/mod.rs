//! In-process RESP server for integration tests.
//!
//! Speaks just enough of the protocol to exercise the client: string and
//! hash commands, pub/sub with glob patterns, and a shutdown switch that
//! severs every open socket at once.

use bytes::BytesMut;
use filum::{Codec, Reply, RespCodec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

#[derive(Default)]
struct State {
    store: Mutex<HashMap<String, String>>,
    hashes: Mutex<HashMap<String, Vec<(String, String)>>>,
}

/// Handle to a running test server.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self::serve(listener, addr)
    }

    fn serve(listener: TcpListener, addr: SocketAddr) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        let (bus, _) = broadcast::channel(64);
        let state = Arc::new(State::default());

        let accept_shutdown = shutdown.clone();
        let accept_bus = bus.clone();
        tokio::spawn(async move {
            let mut stop = accept_shutdown.subscribe();
            loop {
                tokio::select! {
                    res = listener.accept() => {
                        let Ok((stream, _)) = res else { break };
                        tokio::spawn(handle_client(
                            stream,
                            Arc::clone(&state),
                            accept_bus.clone(),
                            accept_shutdown.subscribe(),
                        ));
                    }
                    _ = stop.recv() => break,
                }
            }
        });

        Self { addr, shutdown }
    }

    /// Sever every open connection and stop accepting new ones.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}

async fn handle_client(
    stream: TcpStream,
    state: Arc<State>,
    bus: broadcast::Sender<(String, String)>,
    mut stop: broadcast::Receiver<()>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut bus_rx = bus.subscribe();
    let mut codec = RespCodec::new();
    let mut input: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    let mut channels: Vec<String> = Vec::new();
    let mut patterns: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            res = read_half.read(&mut buf) => {
                let n = match res {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                input.extend_from_slice(&buf[..n]);
                while let Some((consumed, request)) = codec.parse(&input).expect("bad request") {
                    input.drain(..consumed);
                    let reply = respond(
                        &request,
                        &state,
                        &bus,
                        &mut channels,
                        &mut patterns,
                    );
                    if let Some(reply) = reply {
                        if write_reply(&mut write_half, &reply).await.is_err() {
                            return;
                        }
                    }
                }
            }
            msg = bus_rx.recv() => {
                let Ok((channel, payload)) = msg else { continue };
                if channels.contains(&channel) {
                    let push = Reply::Array(vec![
                        Reply::bulk("message"),
                        Reply::bulk(channel.clone()),
                        Reply::bulk(payload.clone()),
                    ]);
                    if write_reply(&mut write_half, &push).await.is_err() {
                        return;
                    }
                }
                for pattern in &patterns {
                    if glob_match(pattern.as_bytes(), channel.as_bytes()) {
                        let push = Reply::Array(vec![
                            Reply::bulk("pmessage"),
                            Reply::bulk(pattern.clone()),
                            Reply::bulk(channel.clone()),
                            Reply::bulk(payload.clone()),
                        ]);
                        if write_reply(&mut write_half, &push).await.is_err() {
                            return;
                        }
                    }
                }
            }
            _ = stop.recv() => return,
        }
    }
}

async fn write_reply(write_half: &mut OwnedWriteHalf, reply: &Reply) -> std::io::Result<()> {
    let mut out = BytesMut::new();
    reply.serialize(&mut out);
    write_half.write_all(&out).await
}

fn respond(
    request: &Reply,
    state: &State,
    bus: &broadcast::Sender<(String, String)>,
    channels: &mut Vec<String>,
    patterns: &mut Vec<String>,
) -> Option<Reply> {
    let Some(args) = decode_args(request) else {
        return Some(Reply::error("ERR malformed request"));
    };
    let Some((command, rest)) = args.split_first() else {
        return Some(Reply::error("ERR empty request"));
    };

    Some(match command.to_ascii_uppercase().as_str() {
        "SET" => {
            state
                .store
                .lock()
                .insert(rest[0].clone(), rest[1].clone());
            Reply::simple("OK")
        }
        "GET" => match state.store.lock().get(&rest[0]) {
            Some(value) => Reply::bulk(value.clone()),
            None => Reply::Null,
        },
        "INCR" => {
            let mut store = state.store.lock();
            let slot = store.entry(rest[0].clone()).or_insert_with(|| "0".into());
            let next = slot.parse::<i64>().unwrap() + 1;
            *slot = next.to_string();
            Reply::Integer(next)
        }
        "HSET" => {
            state
                .hashes
                .lock()
                .entry(rest[0].clone())
                .or_default()
                .push((rest[1].clone(), rest[2].clone()));
            Reply::Integer(1)
        }
        "HGETALL" => {
            let hashes = state.hashes.lock();
            let pairs = hashes.get(&rest[0]).cloned().unwrap_or_default();
            let mut items = Vec::with_capacity(pairs.len() * 2);
            for (field, value) in pairs {
                items.push(Reply::bulk(field));
                items.push(Reply::bulk(value));
            }
            Reply::Array(items)
        }
        "PUBLISH" => {
            let delivered = bus.send((rest[0].clone(), rest[1].clone())).unwrap_or(0);
            Reply::Integer(delivered as i64)
        }
        "SUBSCRIBE" => {
            channels.push(rest[0].clone());
            confirmation("subscribe", &rest[0], channels.len() + patterns.len())
        }
        "PSUBSCRIBE" => {
            patterns.push(rest[0].clone());
            confirmation("psubscribe", &rest[0], channels.len() + patterns.len())
        }
        "UNSUBSCRIBE" => {
            channels.retain(|c| c != &rest[0]);
            confirmation("unsubscribe", &rest[0], channels.len() + patterns.len())
        }
        "PUNSUBSCRIBE" => {
            patterns.retain(|p| p != &rest[0]);
            confirmation("punsubscribe", &rest[0], channels.len() + patterns.len())
        }
        // Swallows the request without replying, for pending-drain tests.
        "BLACKHOLE" => return None,
        other => Reply::error(format!("ERR unknown command '{other}'")),
    })
}

fn confirmation(kind: &str, key: &str, count: usize) -> Reply {
    Reply::Array(vec![
        Reply::bulk(kind.to_string()),
        Reply::bulk(key.to_string()),
        Reply::Integer(count as i64),
    ])
}

fn decode_args(request: &Reply) -> Option<Vec<String>> {
    let items = request.as_array()?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Minimal glob: `*` matches any run, `?` matches one byte.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }

    p == pattern.len()
}
