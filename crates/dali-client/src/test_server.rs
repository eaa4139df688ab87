//! A scripted `DataLink` server for tests.
//!
//! Accepts connections one after another on an ephemeral localhost port,
//! decodes each command, records it and lets the test's script decide what
//! to send back.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use dali_types::{Packet, PacketId, PacketTime};
use dali_wire::{Capabilities, Command, Direction, Frame, MAX_PAYLOAD_SIZE, Reply};

/// What the server does after receiving a command.
pub enum Action {
    /// Send these replies in order (possibly none).
    Reply(Vec<Reply>),
    /// Send these replies after a pause.
    Delayed(Duration, Vec<Reply>),
    /// Write raw bytes, bypassing the frame encoder.
    Raw(Vec<u8>),
    /// Encode these replies and write them a few bytes at a time, pausing
    /// between pieces.
    Trickle {
        replies: Vec<Reply>,
        chunk: usize,
        pause: Duration,
    },
    /// Close the connection.
    Close,
}

impl Action {
    pub fn one(reply: Reply) -> Self {
        Action::Reply(vec![reply])
    }

    pub fn none() -> Self {
        Action::Reply(Vec::new())
    }
}

/// A command as seen by the server.
#[derive(Debug, Clone)]
pub struct Received {
    pub at: Instant,
    /// Index of the connection it arrived on, starting at 0.
    pub connection: usize,
    pub command: Command,
}

type Script = Box<dyn FnMut(usize, &Command) -> Action + Send>;

pub struct TestServer {
    address: String,
    received: Arc<Mutex<Vec<Received>>>,
}

impl TestServer {
    /// Starts a server driven by `script`, called with the connection index
    /// and each decoded command.
    pub fn start(script: impl FnMut(usize, &Command) -> Action + Send + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
        let address = listener.local_addr().expect("Failed to get local addr").to_string();
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&received);
        let mut script: Script = Box::new(script);
        thread::spawn(move || {
            for (connection, stream) in listener.incoming().enumerate() {
                let Ok(stream) = stream else { break };
                serve(stream, connection, &mut script, &log);
            }
        });

        Self { address, received }
    }

    /// A server that completes the handshake with `capabilities` and answers
    /// everything else through `script`.
    pub fn with_handshake(
        capabilities: &'static str,
        mut script: impl FnMut(usize, &Command) -> Action + Send + 'static,
    ) -> Self {
        Self::start(move |connection, command| match command {
            Command::Identify { .. } => Action::one(id_reply(capabilities)),
            other => script(connection, other),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().expect("lock poisoned").clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.received().into_iter().map(|r| r.command).collect()
    }

    pub fn command_count(&self) -> usize {
        self.received.lock().expect("lock poisoned").len()
    }

    /// Waits until at least `count` commands have arrived.
    pub fn wait_for_commands(&self, count: usize, timeout: Duration) -> Vec<Command> {
        let deadline = Instant::now() + timeout;
        while self.command_count() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        self.commands()
    }
}

fn serve(
    mut stream: TcpStream,
    connection: usize,
    script: &mut Script,
    log: &Mutex<Vec<Received>>,
) {
    let mut buf = BytesMut::new();
    let mut read_chunk = [0u8; 4096];

    loop {
        let frame = match Frame::decode(&mut buf, Direction::ToServer, MAX_PAYLOAD_SIZE) {
            Ok(Some(frame)) => frame,
            Ok(None) => match stream.read(&mut read_chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    buf.extend_from_slice(&read_chunk[..n]);
                    continue;
                }
            },
            Err(_) => return,
        };
        let Ok(command) = Command::from_frame(&frame) else {
            return;
        };

        log.lock().expect("lock poisoned").push(Received {
            at: Instant::now(),
            connection,
            command: command.clone(),
        });

        let bytes = match script(connection, &command) {
            Action::Reply(replies) => encode(replies),
            Action::Delayed(pause, replies) => {
                thread::sleep(pause);
                encode(replies)
            }
            Action::Raw(bytes) => bytes,
            Action::Trickle {
                replies,
                chunk,
                pause,
            } => {
                for piece in encode(replies).chunks(chunk.max(1)) {
                    if stream.write_all(piece).is_err() {
                        return;
                    }
                    thread::sleep(pause);
                }
                Vec::new()
            }
            Action::Close => return,
        };
        if !bytes.is_empty() && stream.write_all(&bytes).is_err() {
            return;
        }
    }
}

fn encode(replies: Vec<Reply>) -> Vec<u8> {
    let mut out = BytesMut::new();
    for reply in replies {
        reply.to_frame().expect("reply must encode").encode(&mut out);
    }
    out.to_vec()
}

/// Handshake reply from a server announcing `capabilities`.
pub fn id_reply(capabilities: &str) -> Reply {
    Reply::Id {
        server: "DataLink 2020.075".to_string(),
        capabilities: Capabilities::parse(capabilities),
    }
}

pub fn ok(value: i64) -> Reply {
    Reply::Ok {
        value,
        message: String::new(),
    }
}

pub fn error(message: &str) -> Reply {
    Reply::Error {
        value: 0,
        message: message.to_string(),
    }
}

/// A packet whose time is derived from its ID.
pub fn packet(stream_id: &str, id: i64) -> Packet {
    Packet {
        stream_id: stream_id.to_string(),
        id: PacketId::new(id),
        time: PacketTime::from_micros(1_600_000_000_000_000 + id),
        data_start: PacketTime::from_micros(1_599_999_999_000_000),
        data_end: PacketTime::from_micros(1_600_000_000_000_000),
        payload: Bytes::from(format!("payload {id}")),
    }
}
