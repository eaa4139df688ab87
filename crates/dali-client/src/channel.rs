//! Network channel: the connected socket and timed frame I/O.
//!
//! Every send and receive is bounded by the configured I/O timeout and a
//! timeout is reported as [`Io::TimedOut`], never as an error, so callers can
//! tell "nothing arrived yet" apart from a broken connection.
//!
//! # Timeouts
//!
//! Timeouts use the socket's own per-call timeouts (`SO_RCVTIMEO` /
//! `SO_SNDTIMEO` through [`TcpStream::set_read_timeout`]). These are
//! available on every platform the standard library supports, so no alarm
//! signal or other process-wide timer state is involved: any number of
//! sessions may run on separate threads. Nothing above this module knows
//! how the bound is enforced.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use dali_wire::{Command, Direction, Frame, Reply};

use crate::error::{ClientError, ClientResult, ConnectFailure};

/// Size of a single socket read.
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Outcome of a bounded I/O call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Io<T> {
    /// The operation completed.
    Ready(T),
    /// The bound expired first.
    TimedOut,
}

/// How long a receive may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Up to the configured I/O timeout.
    Timeout,
    /// A single attempt that never blocks.
    Poll,
}

/// A connected socket plus the bytes received but not yet decoded.
pub struct Channel {
    stream: TcpStream,
    peer: String,
    read_buf: BytesMut,
    max_payload: usize,
    /// Bound on a whole send or receive call, `None` for no bound.
    timeout: Option<Duration>,
}

impl Channel {
    /// Connects to `address`, bounding the connect itself by `timeout`.
    pub fn connect(
        address: &str,
        timeout: Option<Duration>,
        max_payload: usize,
    ) -> ClientResult<Self> {
        let connect_error = |source: io::Error| ClientError::Connect {
            address: address.to_string(),
            kind: ConnectFailure::from_io(&source),
            source,
        };

        let stream = match timeout {
            Some(timeout) => {
                let mut last_error = None;
                let mut connected = None;
                for addr in address.to_socket_addrs().map_err(connect_error)? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(e) => last_error = Some(e),
                    }
                }
                connected.ok_or_else(|| {
                    connect_error(last_error.unwrap_or_else(|| {
                        io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")
                    }))
                })?
            }
            None => TcpStream::connect(address).map_err(connect_error)?,
        };

        stream.set_read_timeout(timeout).map_err(connect_error)?;
        stream.set_write_timeout(timeout).map_err(connect_error)?;
        stream.set_nodelay(true).map_err(connect_error)?;

        Ok(Self {
            stream,
            peer: address.to_string(),
            read_buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            max_payload,
            timeout,
        })
    }

    /// Address this channel was connected to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Sends one command.
    ///
    /// A timeout before any byte left is reported as [`Io::TimedOut`]. A
    /// timeout part way through a frame leaves the stream unusable and is
    /// reported as [`ClientError::ConnectionLost`].
    pub fn send(&mut self, command: &Command) -> ClientResult<Io<()>> {
        let frame = command.to_frame()?;
        let bytes = frame.encode_to_bytes();

        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(ClientError::ConnectionLost(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write to socket",
                    )));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if is_timeout(&e) && written == 0 => return Ok(Io::TimedOut),
                Err(e) => return Err(ClientError::ConnectionLost(e)),
            }
        }

        self.stream.flush().map_err(ClientError::ConnectionLost)?;
        Ok(Io::Ready(()))
    }

    /// Receives one reply.
    ///
    /// With [`Wait::Timeout`] the bound covers the whole call, however many
    /// reads a frame takes. Bytes of an incomplete frame are kept for the
    /// next call, so a timeout never loses data.
    pub fn receive(&mut self, wait: Wait) -> ClientResult<Io<Reply>> {
        let deadline = match wait {
            Wait::Timeout => self.timeout.map(|timeout| Instant::now() + timeout),
            Wait::Poll => None,
        };

        loop {
            // Try to decode a frame from the buffer
            let frame = Frame::decode(&mut self.read_buf, Direction::ToClient, self.max_payload)
                .map_err(ClientError::Framing)?;
            if let Some(frame) = frame {
                return Ok(Io::Ready(Reply::from_frame(&frame)?));
            }

            // Need more data - read from socket, within what is left of the bound
            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(Io::TimedOut);
                    }
                    Some(remaining)
                }
                None => None,
            };
            if let Io::TimedOut = self.fill(wait, remaining)? {
                return Ok(Io::TimedOut);
            }
        }
    }

    /// Reads whatever the socket has into the buffer, waiting at most
    /// `remaining` when given.
    fn fill(&mut self, wait: Wait, remaining: Option<Duration>) -> ClientResult<Io<()>> {
        let mut temp_buf = [0u8; READ_CHUNK_SIZE];

        if remaining.is_some() {
            self.stream
                .set_read_timeout(remaining)
                .map_err(ClientError::ConnectionLost)?;
        }
        if wait == Wait::Poll {
            self.stream
                .set_nonblocking(true)
                .map_err(ClientError::ConnectionLost)?;
        }
        let result = loop {
            match self.stream.read(&mut temp_buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                other => break other,
            }
        };
        if wait == Wait::Poll {
            self.stream
                .set_nonblocking(false)
                .map_err(ClientError::ConnectionLost)?;
        }
        if remaining.is_some() {
            self.stream
                .set_read_timeout(self.timeout)
                .map_err(ClientError::ConnectionLost)?;
        }

        match result {
            Ok(0) => Err(ClientError::ConnectionLost(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed connection",
            ))),
            Ok(n) => {
                self.read_buf.extend_from_slice(&temp_buf[..n]);
                Ok(Io::Ready(()))
            }
            Err(e) if is_timeout(&e) => Ok(Io::TimedOut),
            Err(e) => Err(ClientError::ConnectionLost(e)),
        }
    }
}

/// Socket timeouts surface as `WouldBlock` on Unix and `TimedOut` on Windows.
fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("peer", &self.peer)
            .field("buffered", &self.read_buf.len())
            .finish_non_exhaustive()
    }
}
