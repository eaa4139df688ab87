//! The client session: one connection, its negotiated capabilities, its
//! read cursor and its stream mode.
//!
//! Query operations ([`Session::read`], [`Session::set_match`], ...) are
//! implemented in `packet_io` and `selector`, streaming in `collector`.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use dali_types::Cursor;
use dali_wire::{Command, Reply};

use crate::channel::{Channel, Io, Wait};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::negotiate::{SessionInfo, negotiate};
use crate::sink::{Level, LogSink, TracingSink};

/// Whether the session is answering queries or streaming packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Query mode: selector and packet I/O calls are allowed.
    Idle,
    /// The server pushes packets; only collector calls are allowed.
    Streaming,
    /// Terminated. Collectors return [`Collected::Ended`](crate::Collected::Ended).
    Ended,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamMode::Idle => "idle",
            StreamMode::Streaming => "streaming",
            StreamMode::Ended => "ended",
        })
    }
}

/// Requests termination of a session's collector from another thread.
///
/// Cloning yields a handle to the same flag. The collector checks the flag
/// before every receive, so a blocked collector returns within one I/O
/// timeout of [`TerminateHandle::terminate`].
#[derive(Debug, Clone, Default)]
pub struct TerminateHandle(Arc<AtomicBool>);

impl TerminateHandle {
    pub fn terminate(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A `DataLink` client session.
///
/// A session owns at most one connection. It is driven from one thread at a
/// time; use one session per thread for concurrent connections. The only
/// state meant to be touched from elsewhere is the [`TerminateHandle`].
///
/// # Example
///
/// ```no_run
/// use dali_client::{Collected, Config, Session};
///
/// let config = Config::new("localhost:16000").with_client_id("example:me:1:x86_64");
/// let mut session = Session::open(config)?;
///
/// session.set_match("^IU_ANMO_.*")?;
/// while let Collected::Packet(packet) = session.collect()? {
///     println!("{} {} {}", packet.stream_id, packet.id, packet.time);
/// }
/// # Ok::<(), dali_client::ClientError>(())
/// ```
pub struct Session {
    pub(crate) config: Config,
    pub(crate) channel: Option<Channel>,
    pub(crate) info: SessionInfo,
    pub(crate) cursor: Cursor,
    pub(crate) mode: StreamMode,
    /// Time of the last received frame or sent keepalive.
    pub(crate) keepalive_time: Instant,
    /// A keepalive was sent and its acknowledgement has not arrived.
    pub(crate) keepalive_pending: bool,
    /// Replies still owed for requests that timed out; discarded on arrival.
    pub(crate) stale_replies: usize,
    terminate: TerminateHandle,
    sink: Arc<dyn LogSink>,
}

impl Session {
    /// Creates a disconnected session.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            channel: None,
            info: SessionInfo::default(),
            cursor: Cursor::default(),
            mode: StreamMode::Idle,
            keepalive_time: Instant::now(),
            keepalive_pending: false,
            stale_replies: 0,
            terminate: TerminateHandle::default(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Creates a session and connects it.
    pub fn open(config: Config) -> ClientResult<Self> {
        let mut session = Self::new(config);
        session.connect()?;
        Ok(session)
    }

    /// Replaces the logging sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Connects to the configured server and negotiates.
    ///
    /// Any previous connection is closed first. Negotiated values from an
    /// earlier connection are discarded, not carried over.
    pub fn connect(&mut self) -> ClientResult<&SessionInfo> {
        self.disconnect();

        let address = self.config.socket_address();
        self.log(Level::Debug, format_args!("connecting to {address}"));

        let mut channel = Channel::connect(
            &address,
            self.config.io_timeout(),
            self.config.max_frame_payload,
        )
        .inspect_err(|e| self.log(Level::Error, format_args!("{e}")))?;

        let info = negotiate(&mut channel, &self.config.client_id)
            .inspect_err(|e| self.log(Level::Error, format_args!("handshake with {address} failed: {e}")))?;

        self.log(
            Level::Info,
            format_args!(
                "connected to {address} ({}), protocol {}, max packet size {}, write {}",
                info.server_id,
                info.protocol_version,
                info.max_packet_size,
                if info.write_permission { "permitted" } else { "denied" }
            ),
        );

        self.channel = Some(channel);
        self.info = info;
        self.mode = StreamMode::Idle;
        self.keepalive_time = Instant::now();
        self.keepalive_pending = false;
        self.stale_replies = 0;
        Ok(&self.info)
    }

    /// Closes the connection, if any. The cursor is kept.
    pub fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.log(Level::Info, format_args!("disconnected from {}", channel.peer()));
        }
        self.info = SessionInfo::default();
        self.stale_replies = 0;
        if self.mode == StreamMode::Streaming {
            self.mode = StreamMode::Idle;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Negotiated server capabilities (all defaults while disconnected).
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// The last packet received.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Overrides the cursor, e.g. after loading a state file.
    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// A handle that can stop the collector from another thread.
    pub fn terminate_handle(&self) -> TerminateHandle {
        self.terminate.clone()
    }

    /// Sets the terminate flag.
    pub fn terminate(&self) {
        self.terminate.terminate();
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminate.is_terminated()
    }

    pub(crate) fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        self.sink.log(level, &message.to_string());
    }

    // ------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------

    /// Query operations need query mode and a connection, checked in that
    /// order so a mode error never depends on connection state.
    pub(crate) fn require_query_mode(&self, operation: &'static str) -> ClientResult<()> {
        if self.mode != StreamMode::Idle {
            self.log(
                Level::Error,
                format_args!("{operation} is not allowed while {}", self.mode),
            );
            return Err(ClientError::Mode {
                operation,
                mode: self.mode,
            });
        }
        if self.channel.is_none() {
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Sends a command; fatal transport errors disconnect the session.
    pub(crate) fn send(&mut self, command: &Command) -> ClientResult<Io<()>> {
        let channel = self.channel.as_mut().ok_or(ClientError::NotConnected)?;
        self.sink.log(Level::Debug, &format!("sending {}", command.name()));

        let result = channel.send(command);
        self.check_transport(result)
    }

    /// Receives a reply; fatal transport errors disconnect the session.
    pub(crate) fn receive(&mut self, wait: Wait) -> ClientResult<Io<Reply>> {
        let channel = self.channel.as_mut().ok_or(ClientError::NotConnected)?;

        let result = channel.receive(wait);
        self.check_transport(result)
    }

    fn check_transport<T>(&mut self, result: ClientResult<T>) -> ClientResult<T> {
        if let Err(e) = &result
            && e.is_connection_error()
        {
            self.log(Level::Error, format_args!("{e}"));
            self.disconnect();
        }
        result
    }

    /// Waits for and discards the replies still owed to timed-out requests.
    ///
    /// Used before leaving query mode, where a late reply would otherwise
    /// be taken for streamed data. A reply that does not arrive within the
    /// I/O timeout leaves the stream out of step, so the session is
    /// disconnected.
    pub(crate) fn settle_stale_replies(&mut self) -> ClientResult<()> {
        while self.stale_replies > 0 {
            match self.receive(Wait::Timeout)? {
                Io::Ready(reply) => {
                    self.stale_replies -= 1;
                    self.log(
                        Level::Debug,
                        format_args!("dropping late {} reply", reply.name()),
                    );
                }
                Io::TimedOut => {
                    let owed = self.stale_replies;
                    self.log(
                        Level::Error,
                        format_args!("{owed} late replies never arrived, dropping connection"),
                    );
                    self.disconnect();
                    return Err(ClientError::ConnectionLost(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("{owed} replies to timed-out requests never arrived"),
                    )));
                }
            }
        }
        Ok(())
    }

    /// Sends a command and waits for its reply.
    ///
    /// Replies still owed for earlier timed-out requests are dropped first,
    /// so a late reply is never mistaken for the answer to this request.
    pub(crate) fn request(&mut self, command: &Command) -> ClientResult<Reply> {
        if let Io::TimedOut = self.send(command)? {
            return Err(ClientError::Timeout);
        }

        loop {
            match self.receive(Wait::Timeout)? {
                Io::Ready(reply) if self.stale_replies > 0 => {
                    self.stale_replies -= 1;
                    self.log(
                        Level::Debug,
                        format_args!("dropping late {} reply", reply.name()),
                    );
                }
                Io::Ready(reply) => return Ok(reply),
                Io::TimedOut => {
                    self.stale_replies += 1;
                    self.log(
                        Level::Warn,
                        format_args!("timed out waiting for reply to {}", command.name()),
                    );
                    return Err(ClientError::Timeout);
                }
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.config.address)
            .field("client_id", &self.config.client_id)
            .field("connected", &self.channel.is_some())
            .field("mode", &self.mode)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}
