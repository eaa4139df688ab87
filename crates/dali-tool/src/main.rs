//! `DataLink` command-line client.
//!
//! Queries server information, reads and writes single packets, and collects
//! a live packet stream with optional cursor persistence.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use dali_client::{ClientError, Collected, Config, Session, StateError, generate_client_id};
use dali_types::{InfoKind, Packet, PacketId, PacketTime, WritePacket};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// `DataLink` command-line client.
#[derive(Parser)]
#[command(name = "dali-tool")]
#[command(about = "DataLink client: info, read, write and collect", long_about = None)]
struct Cli {
    /// Server address, `host:port`. Either part may be omitted.
    #[arg(short, long, default_value = "localhost:16000")]
    server: String,

    /// Client identification sent to the server.
    #[arg(long)]
    client_id: Option<String>,

    /// Keepalive interval in seconds while collecting (0 disables).
    #[arg(short, long, default_value = "600")]
    keepalive: u64,

    /// Network I/O timeout in seconds (0 waits forever).
    #[arg(short, long, default_value = "60")]
    timeout: u64,

    /// More logging (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print server information (XML).
    Info {
        /// STATUS, STREAMS or CONNECTIONS.
        #[arg(default_value = "status")]
        kind: InfoKind,

        /// Server-side pattern narrowing the result.
        #[arg(short, long = "match")]
        pattern: Option<String>,
    },

    /// Read one packet by ID.
    Read {
        packet_id: i64,

        /// Require the packet to belong to this stream.
        #[arg(long)]
        stream: Option<String>,

        /// Write the payload to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Submit one packet.
    Write {
        /// Stream ID, e.g. `XX_TEST__LOG/TEXT`.
        stream_id: String,

        /// Data start time (microseconds or ISO 8601). Defaults to now.
        #[arg(long)]
        start: Option<PacketTime>,

        /// Data end time. Defaults to the start time.
        #[arg(long)]
        end: Option<PacketTime>,

        /// Read the payload from this file.
        #[arg(short, long, conflicts_with = "data")]
        file: Option<PathBuf>,

        /// Payload given inline.
        #[arg(short, long)]
        data: Option<String>,

        /// Wait for the server to confirm and print the assigned packet ID.
        #[arg(short, long)]
        ack: bool,
    },

    /// Collect packets from the live stream.
    Collect {
        /// Streams to include (regular expression).
        #[arg(short, long = "match")]
        pattern: Option<String>,

        /// Streams to exclude (regular expression).
        #[arg(short, long)]
        reject: Option<String>,

        /// State file: resume from it and keep it updated.
        #[arg(long)]
        state: Option<PathBuf>,

        /// Save the state file every N packets.
        #[arg(long, default_value = "100")]
        save_every: u64,

        /// Stop after this many packets.
        #[arg(short, long)]
        count: Option<u64>,

        /// Stop after this many seconds.
        #[arg(long)]
        duration: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::new(&cli.server)
        .with_client_id(
            cli.client_id
                .clone()
                .unwrap_or_else(|| generate_client_id("dali-tool")),
        )
        .with_keepalive(Duration::from_secs(cli.keepalive))
        .with_io_timeout(Duration::from_secs(cli.timeout));

    let mut session = Session::open(config)
        .with_context(|| format!("Failed to connect to {}", cli.server))?;

    match cli.command {
        Commands::Info { kind, pattern } => {
            let xml = match pattern {
                Some(pattern) => session.get_info_matching(kind, &pattern)?,
                None => session.get_info(kind)?,
            };
            println!("{xml}");
        }

        Commands::Read {
            packet_id,
            stream,
            output,
        } => {
            let packet = session.read(stream.as_deref(), PacketId::new(packet_id))?;
            print_packet(&packet);
            if let Some(output) = output {
                fs::write(&output, &packet.payload)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
            }
        }

        Commands::Write {
            stream_id,
            start,
            end,
            file,
            data,
            ack,
        } => {
            let payload = match (file, data) {
                (Some(path), _) => Bytes::from(
                    fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                (None, Some(data)) => Bytes::from(data),
                (None, None) => bail!("Nothing to write: give --file or --data"),
            };
            let start = start.unwrap_or_else(PacketTime::now);
            let packet = WritePacket::new(stream_id, start, end.unwrap_or(start), payload);

            match session.write(&packet, ack)? {
                Some(id) => println!("Written as packet {id}"),
                None => println!("Written"),
            }
        }

        Commands::Collect {
            pattern,
            reject,
            state,
            save_every,
            count,
            duration,
        } => {
            if let Some(pattern) = pattern {
                let streams = session.set_match(&pattern)?;
                info!(streams, "match pattern set");
            }
            if let Some(reject) = reject {
                let streams = session.set_reject(&reject)?;
                info!(streams, "reject pattern set");
            }
            if let Some(state) = &state {
                resume(&mut session, state)?;
            }
            if let Some(seconds) = duration {
                let stop = session.terminate_handle();
                thread::spawn(move || {
                    thread::sleep(Duration::from_secs(seconds));
                    stop.terminate();
                });
            }

            let collected = collect(&mut session, state.as_deref(), save_every, count);

            // Keep whatever was collected, even on error
            if let Some(state) = &state
                && session.cursor().is_set()
            {
                session.save_state(state)?;
            }
            let received = collected?;
            info!(received, "collection finished");
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Restores the cursor from `state`; a missing file starts from the server's
/// default position.
fn resume(session: &mut Session, state: &Path) -> Result<()> {
    match session.recover_state(state) {
        Ok(cursor) => {
            info!(%cursor, "resuming from state file");
            Ok(())
        }
        Err(ClientError::State(StateError::Missing(_))) => {
            info!(path = %state.display(), "no state file, starting at the live position");
            Ok(())
        }
        Err(ClientError::NotFound(reason)) => {
            warn!(%reason, "saved position no longer on server, starting at the live position");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to resume from {}", state.display())),
    }
}

/// Prints packets until the session ends or `limit` is reached. Returns the
/// number of packets received.
fn collect(
    session: &mut Session,
    state: Option<&Path>,
    save_every: u64,
    limit: Option<u64>,
) -> Result<u64> {
    let mut received = 0u64;

    while let Collected::Packet(packet) = session.collect()? {
        print_packet(&packet);
        received += 1;

        if let Some(state) = state
            && save_every > 0
            && received % save_every == 0
        {
            session.save_state(state)?;
        }
        if limit.is_some_and(|limit| received >= limit) {
            session.terminate();
        }
    }

    Ok(received)
}

fn print_packet(packet: &Packet) {
    println!(
        "{} id {} time {} data {} - {} ({} bytes)",
        packet.stream_id,
        packet.id,
        packet.time,
        packet.data_start,
        packet.data_end,
        packet.size()
    );
}
