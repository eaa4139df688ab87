//! Cursor persistence.
//!
//! A state file holds one record, `<packet_id> <packet_time>\n`, with the
//! time in microseconds since the Unix epoch. Saves go through a temporary
//! file in the same directory that is synced and then renamed over the
//! target, so a reader sees either the old record or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use dali_types::Cursor;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::error::ClientResult;
use crate::session::{Session, StreamMode};
use crate::sink::Level;

pub type StateResult<T> = Result<T, StateError>;

/// Failure to save or load a state file.
#[derive(Debug, Error)]
pub enum StateError {
    /// No state file yet. Callers usually fall back to default positioning.
    #[error("state file {0} does not exist")]
    Missing(PathBuf),

    #[error("state file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StateError {
    fn io(path: &Path, source: io::Error) -> Self {
        StateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        StateError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Atomically replaces the state file at `path` with `cursor`.
pub fn save_state(path: impl AsRef<Path>, cursor: &Cursor) -> StateResult<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(|e| StateError::io(path, e))?;
    writeln!(file, "{cursor}").map_err(|e| StateError::io(path, e))?;
    file.as_file()
        .sync_all()
        .map_err(|e| StateError::io(path, e))?;
    file.persist(path).map_err(|e| StateError::io(path, e.error))?;

    Ok(())
}

/// Loads the cursor stored at `path`.
///
/// A file that is empty, lacks its trailing newline, or holds anything but
/// a single record is [`StateError::Corrupt`].
pub fn load_state(path: impl AsRef<Path>) -> StateResult<Cursor> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StateError::Missing(path.to_path_buf()));
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            return Err(StateError::corrupt(path, "not valid UTF-8"));
        }
        Err(e) => return Err(StateError::io(path, e)),
    };

    let Some(record) = contents.strip_suffix('\n') else {
        return Err(StateError::corrupt(path, "missing record terminator"));
    };
    let record = record.strip_suffix('\r').unwrap_or(record);
    if record.contains('\n') {
        return Err(StateError::corrupt(path, "more than one record"));
    }

    record
        .parse::<Cursor>()
        .map_err(|e| StateError::corrupt(path, e.to_string()))
}

impl Session {
    /// Saves the current cursor to `path`.
    pub fn save_state(&self, path: impl AsRef<Path>) -> ClientResult<()> {
        let path = path.as_ref();
        save_state(path, &self.cursor)?;
        self.log(
            Level::Debug,
            format_args!("saved cursor {} to {}", self.cursor, path.display()),
        );
        Ok(())
    }

    /// Loads the cursor from `path` and makes it the session cursor.
    ///
    /// When connected in query mode and the loaded cursor names a packet,
    /// the server is also positioned there so streaming resumes after it.
    /// A missing file is returned as [`StateError::Missing`] inside
    /// [`ClientError::State`](crate::ClientError::State) and leaves the
    /// session untouched.
    pub fn recover_state(&mut self, path: impl AsRef<Path>) -> ClientResult<Cursor> {
        let path = path.as_ref();
        let cursor = load_state(path)?;
        self.cursor = cursor;
        self.log(
            Level::Info,
            format_args!("recovered cursor {cursor} from {}", path.display()),
        );

        if cursor.is_set() && self.is_connected() && self.mode == StreamMode::Idle {
            self.position(cursor.packet_id, cursor.packet_time)?;
        }
        Ok(cursor)
    }
}

#[cfg(test)]
mod state_tests {
    use super::*;
    use dali_types::{PacketId, PacketTime};
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.state");
        let cursor = Cursor::new(PacketId::new(42), PacketTime::from_micros(1_600_000_000_123_456));

        save_state(&path, &cursor).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "42 1600000000123456\n");
        assert_eq!(load_state(&path).unwrap(), cursor);
    }

    #[test]
    fn test_save_overwrites_previous_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.state");

        save_state(&path, &Cursor::new(PacketId::new(1), PacketTime::from_micros(10))).unwrap();
        save_state(&path, &Cursor::new(PacketId::new(2), PacketTime::from_micros(20))).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "2 20\n");
        // Only the target remains, no temporary files.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.state");

        let err = load_state(&path).unwrap_err();
        assert!(matches!(err, StateError::Missing(p) if p == path));
    }

    #[test]
    fn test_load_corrupt_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.state");

        for contents in [
            "",
            "\n",
            "42 1600000000\n\n",
            "42\n",
            "42 100",
            "forty-two 100\n",
            "42 2020-01-01T00:00:00Z\n",
            "42 100 7\n",
            "1 2\n3 4\n",
        ] {
            fs::write(&path, contents).unwrap();
            let err = load_state(&path).unwrap_err();
            assert!(
                matches!(err, StateError::Corrupt { .. }),
                "{contents:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_load_binary_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.state");
        fs::write(&path, [0xff, 0xfe, 0x00, b'\n']).unwrap();

        assert!(matches!(load_state(&path), Err(StateError::Corrupt { .. })));
    }

    #[test]
    fn test_load_accepts_crlf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.state");
        fs::write(&path, "7 -5\r\n").unwrap();

        let cursor = load_state(&path).unwrap();
        assert_eq!(cursor.packet_id, PacketId::new(7));
        assert_eq!(cursor.packet_time, PacketTime::from_micros(-5));
    }

    #[test]
    fn test_save_into_missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no/such/dir/cursor.state");

        let err = save_state(&path, &Cursor::default()).unwrap_err();
        assert!(matches!(err, StateError::Io { .. }));
    }

    proptest! {
        #[test]
        fn prop_save_load_roundtrip(id in any::<i64>(), time in any::<i64>()) {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("cursor.state");
            let cursor = Cursor::new(PacketId::new(id), PacketTime::from_micros(time));

            save_state(&path, &cursor).unwrap();
            prop_assert_eq!(load_state(&path).unwrap(), cursor);
        }
    }
}
