//! Streaming collection.
//!
//! The first collector call in query mode sends `STREAM`; from then on the
//! server pushes packets and only collector calls (and [`Session::stop_stream`])
//! are valid. While the stream is quiet the collector sends a keepalive once
//! the configured interval has passed since the last frame received.

use std::time::Instant;

use dali_types::Packet;
use dali_wire::{Command, Reply};

use crate::channel::{Io, Wait};
use crate::error::{ClientError, ClientResult};
use crate::session::{Session, StreamMode};
use crate::sink::Level;

/// Outcome of one collector call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collected {
    /// A data packet; the cursor now points at it.
    Packet(Packet),
    /// Nothing arrived in time. Only returned by [`Session::collect_nb`].
    Idle,
    /// The session was terminated. No further I/O will be done.
    Ended,
}

/// What a single receive attempt produced, before the caller decides
/// whether to wait again.
enum Step {
    Packet(Packet),
    Quiet,
}

impl Session {
    /// Returns the next streamed packet, waiting as long as it takes.
    ///
    /// Each wait is bounded by the I/O timeout; between waits the terminate
    /// flag is checked and a keepalive is sent when due. Returns
    /// [`Collected::Ended`] once the session is terminated and never
    /// returns [`Collected::Idle`].
    pub fn collect(&mut self) -> ClientResult<Collected> {
        loop {
            if self.enter_stream()? == StreamMode::Ended {
                return Ok(Collected::Ended);
            }
            match self.collect_step(Wait::Timeout)? {
                Step::Packet(packet) => return Ok(Collected::Packet(packet)),
                Step::Quiet => {}
            }
        }
    }

    /// Returns a streamed packet if one is already available.
    ///
    /// Never waits for data: a quiet connection yields [`Collected::Idle`].
    /// The first call may wait up to one I/O timeout for replies still owed
    /// to requests that timed out before streaming started.
    pub fn collect_nb(&mut self) -> ClientResult<Collected> {
        if self.enter_stream()? == StreamMode::Ended {
            return Ok(Collected::Ended);
        }
        match self.collect_step(Wait::Poll)? {
            Step::Packet(packet) => Ok(Collected::Packet(packet)),
            Step::Quiet => Ok(Collected::Idle),
        }
    }

    /// Leaves streaming mode.
    ///
    /// Sends `ENDSTREAM` and reads until the server acknowledges it. Packets
    /// that were already in flight are returned (and advance the cursor)
    /// rather than lost. A terminated session stays terminated.
    pub fn stop_stream(&mut self) -> ClientResult<Vec<Packet>> {
        match self.mode {
            StreamMode::Streaming => {}
            StreamMode::Ended => return Ok(Vec::new()),
            StreamMode::Idle => {
                return Err(ClientError::Mode {
                    operation: "stop_stream",
                    mode: self.mode,
                });
            }
        }

        if let Io::TimedOut = self.send(&Command::StreamStop)? {
            return Err(ClientError::Timeout);
        }

        let mut drained = Vec::new();
        loop {
            let reply = match self.receive(Wait::Timeout)? {
                Io::Ready(reply) => reply,
                Io::TimedOut => {
                    self.log(Level::Warn, format_args!("no ENDSTREAM acknowledgement"));
                    return Err(ClientError::Timeout);
                }
            };
            self.keepalive_time = Instant::now();

            match reply {
                Reply::EndStream => break,
                Reply::Packet(packet) => {
                    self.cursor = packet.cursor();
                    drained.push(packet);
                }
                Reply::Id { .. } => self.keepalive_pending = false,
                other => self.log(
                    Level::Debug,
                    format_args!("ignoring {} while stopping stream", other.name()),
                ),
            }
        }

        self.mode = StreamMode::Idle;
        self.stale_replies = 0;
        self.log(
            Level::Debug,
            format_args!("stream stopped, {} packets drained", drained.len()),
        );
        Ok(drained)
    }

    /// Applies the terminate flag and starts streaming if needed. Returns
    /// the resulting mode.
    fn enter_stream(&mut self) -> ClientResult<StreamMode> {
        if self.mode != StreamMode::Ended && self.is_terminated() {
            self.log(Level::Debug, format_args!("collector terminated"));
            self.mode = StreamMode::Ended;
        }

        if self.mode == StreamMode::Idle {
            if self.channel.is_none() {
                return Err(ClientError::NotConnected);
            }
            self.settle_stale_replies()?;
            if let Io::TimedOut = self.send(&Command::StreamStart)? {
                return Err(ClientError::Timeout);
            }
            self.mode = StreamMode::Streaming;
            self.keepalive_time = Instant::now();
            self.keepalive_pending = false;
            self.log(Level::Debug, format_args!("streaming started"));
        }

        Ok(self.mode)
    }

    fn collect_step(&mut self, wait: Wait) -> ClientResult<Step> {
        match self.receive(wait)? {
            Io::Ready(reply) => {
                self.keepalive_time = Instant::now();
                self.handle_streamed(reply)
            }
            Io::TimedOut => {
                self.maybe_keepalive()?;
                Ok(Step::Quiet)
            }
        }
    }

    fn handle_streamed(&mut self, reply: Reply) -> ClientResult<Step> {
        match reply {
            Reply::Packet(packet) => {
                self.cursor = packet.cursor();
                Ok(Step::Packet(packet))
            }
            Reply::Id { .. } => {
                if self.keepalive_pending {
                    self.keepalive_pending = false;
                    self.log(Level::Debug, format_args!("keepalive acknowledged"));
                } else {
                    self.log(Level::Warn, format_args!("unsolicited ID reply while streaming"));
                }
                Ok(Step::Quiet)
            }
            Reply::EndStream => {
                self.mode = StreamMode::Idle;
                self.stale_replies = 0;
                self.log(Level::Warn, format_args!("server ended the stream"));
                Err(ClientError::StreamClosed)
            }
            Reply::Error { message, .. } => {
                self.log(Level::Error, format_args!("server error while streaming: {message}"));
                Err(ClientError::Server(message))
            }
            other => {
                self.log(
                    Level::Warn,
                    format_args!("ignoring {} reply while streaming", other.name()),
                );
                Ok(Step::Quiet)
            }
        }
    }

    /// Sends a keepalive if the interval has passed since the last frame and
    /// none is in flight.
    fn maybe_keepalive(&mut self) -> ClientResult<()> {
        let Some(interval) = self.config.keepalive() else {
            return Ok(());
        };
        if self.keepalive_pending || self.keepalive_time.elapsed() < interval {
            return Ok(());
        }

        let command = Command::Identify {
            client_id: self.config.client_id.clone(),
        };
        if let Io::Ready(()) = self.send(&command)? {
            self.keepalive_time = Instant::now();
            self.keepalive_pending = true;
            self.log(Level::Debug, format_args!("keepalive sent"));
        }
        Ok(())
    }
}
