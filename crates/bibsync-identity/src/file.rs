//! Durable identity log backed by a single append-only file.
//!
//! On-disk format, one frame per change log entry:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized ChangeLogEntry)]
//! ```
//!
//! Opening the file replays every frame to rebuild mappings. A frame whose
//! checksum does not match is skipped. A frame whose declared length runs
//! past the end of the file ends the replay. Everything from that frame on
//! is copied to a `<path>.corrupt` sidecar before the file is truncated
//! back to the last whole frame, so the next append starts on a clean
//! boundary and no unread bytes are lost.

use std::fs::{self, File, OpenOptions};
use std::ffi::OsString;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use bibsync_types::{MonotonicClock, RecordKey};

use crate::error::{IdentityError, Result};
use crate::state::LogState;
use crate::traits::IdentityLog;
use crate::types::{ChangeLogEntry, IdentityMapping};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

/// Flush strategy for appends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append.
    EveryWrite,
    /// Flush to the OS page cache only.
    #[default]
    OsDefault,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    pub sync_mode: SyncMode,
}

struct LogWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// An [`IdentityLog`] persisted to a CRC-framed file.
///
/// The materialized state lives in memory behind a `RwLock`; the file is
/// only read on [`FileIdentityLog::open`]. Appends take the writer mutex,
/// write and flush the frame, then fold the entry into the state, so a
/// reader never sees an entry that is not on disk.
pub struct FileIdentityLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    state: RwLock<LogState>,
    clock: Arc<MonotonicClock>,
    config: FileLogConfig,
}

impl FileIdentityLog {
    /// Open (or create) the log at `path` and replay it.
    pub fn open(path: &Path, config: FileLogConfig) -> Result<Self> {
        Self::open_with_clock(path, config, None)
    }

    /// Open with a shared clock. When `clock` is `None` a fresh clock is
    /// created that starts after the newest replayed timestamp.
    pub fn open_with_clock(
        path: &Path,
        config: FileLogConfig,
        clock: Option<Arc<MonotonicClock>>,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (entries, valid_len) = replay(path)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            let sidecar = quarantine_tail(path, valid_len)?;
            warn!(
                path = %path.display(),
                sidecar = %sidecar.display(),
                valid_len,
                file_len,
                "unreadable tail in identity log; moved to sidecar"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let clock = clock.unwrap_or_else(|| {
            let newest = entries.iter().map(|e| e.timestamp).max();
            Arc::new(match newest {
                Some(ts) => MonotonicClock::starting_after(ts),
                None => MonotonicClock::new(),
            })
        });

        let mut state = LogState::default();
        for entry in entries {
            state.apply(entry);
        }
        info!(
            path = %path.display(),
            entries = state.entries.len(),
            mappings = state.mapping_count(),
            "identity log opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                offset: valid_len,
            }),
            state: RwLock::new(state),
            clock,
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The clock stamping new entries.
    pub fn clock(&self) -> &Arc<MonotonicClock> {
        &self.clock
    }

    /// Bytes of whole frames written so far.
    pub fn offset(&self) -> Result<u64> {
        let w = self.writer.lock().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(w.offset)
    }

    pub fn mapping_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(state.mapping_count())
    }

    fn append(&self, entry: ChangeLogEntry) -> Result<ChangeLogEntry> {
        let payload =
            bincode::serialize(&entry).map_err(|e| IdentityError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| IdentityError::Serialization("entry exceeds frame size".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut w = self.writer.lock().map_err(|_| IdentityError::LockPoisoned)?;
        w.writer.write_all(&length.to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        w.writer.write_all(&payload)?;
        w.writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_all()?;
        }
        let entry_offset = w.offset;
        w.offset += HEADER_SIZE + u64::from(length);

        // Fold into state while still holding the writer so file order and
        // state order agree.
        let mut state = self.state.write().map_err(|_| IdentityError::LockPoisoned)?;
        state.apply(entry.clone());
        drop(state);
        drop(w);

        debug!(offset = entry_offset, subject = %entry.subject, event = %entry.event, "identity log append");
        Ok(entry)
    }
}

impl std::fmt::Debug for FileIdentityLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIdentityLog")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IdentityLog for FileIdentityLog {
    fn rename(&self, old: &RecordKey, new: &RecordKey) -> Result<ChangeLogEntry> {
        if old == new {
            return Err(IdentityError::SelfRename(old.clone()));
        }
        self.append(ChangeLogEntry::renamed(old.clone(), new, self.clock.now()))
    }

    fn record_deletion(&self, key: &RecordKey, last_view: Option<String>) -> Result<ChangeLogEntry> {
        self.append(ChangeLogEntry::deleted(key.clone(), last_view, self.clock.now()))
    }

    fn mapping(&self, key: &RecordKey) -> Result<Option<IdentityMapping>> {
        let state = self.state.read().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(state.mapping(key).cloned())
    }

    fn entry_at(&self, key: &RecordKey, index: usize) -> Result<Option<ChangeLogEntry>> {
        let state = self.state.read().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(state.entry_at(key, index).cloned())
    }

    fn len(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(state.entries.len())
    }
}

/// Sidecar receiving bytes cut from the log at `path`.
pub fn corrupt_tail_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".corrupt");
    PathBuf::from(name)
}

/// Append everything in `path` from `from` onward to the sidecar and sync
/// it. Earlier quarantined bytes in the sidecar are kept.
fn quarantine_tail(path: &Path, from: u64) -> Result<PathBuf> {
    let mut tail = Vec::new();
    let mut src = File::open(path)?;
    src.seek(SeekFrom::Start(from))?;
    src.read_to_end(&mut tail)?;

    let sidecar = corrupt_tail_path(path);
    let mut out = OpenOptions::new().create(true).append(true).open(&sidecar)?;
    out.write_all(&tail)?;
    out.sync_all()?;
    Ok(sidecar)
}

/// Read every whole frame from `path`.
///
/// Returns the decoded entries and the byte length covered by whole frames.
/// Frames with a bad checksum or undecodable payload are skipped but still
/// counted as whole.
fn replay(path: &Path) -> Result<(Vec<ChangeLogEntry>, u64)> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let mut entries = Vec::new();
    let mut offset = 0usize;
    let header = HEADER_SIZE as usize;

    while offset + header <= bytes.len() {
        let length = u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        let expected_crc = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]);

        let end = offset + header + length;
        if length == 0 || end > bytes.len() {
            warn!(offset, length, "incomplete identity log frame; stopping replay");
            break;
        }

        let payload = &bytes[offset + header..end];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping frame");
        } else {
            match bincode::deserialize::<ChangeLogEntry>(payload) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(offset, error = %e, "undecodable identity log frame; skipping"),
            }
        }
        offset = end;
    }

    debug!(recovered = entries.len(), "identity log replay complete");
    Ok((entries, offset as u64))
}
