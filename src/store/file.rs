//! File-backed channel store.
//!
//! Layout of a store directory:
//!
//! ```text
//! store.lock    exclusive lock held while the store is open
//! records.log   header, then one frame per write
//! ```
//!
//! Each frame is `len: u32 LE | rmp-serde entry | crc32: u32 LE`. The log is
//! replayed into memory on open; later frames upsert earlier ones. A frame cut
//! short by a crash is truncated away, a frame with a bad checksum is an error.
//! A write that fails part way is cut back off before the error is reported.

use super::memory::Records;
use super::{ChannelStore, SaveCompletion, StoreEntry};
use crate::error::{Result, SyncError};
use crate::types::{Channel, ChannelId, ChatUser, Membership, UserId};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the record log.
const LOG_MAGIC: &[u8; 4] = b"LCS\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

const HEADER_LEN: u64 = 5;

/// Sanity bound on a single encoded entry.
const MAX_ENTRY_SIZE: usize = 16 * 1024 * 1024;

/// File store configuration.
#[derive(Clone, Debug)]
pub struct FileStoreConfig {
    /// Store directory.
    pub path: PathBuf,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// fsync after every write before acknowledging it.
    pub sync_writes: bool,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./channels"),
            create_if_missing: true,
            sync_writes: true,
        }
    }
}

/// Channel store persisted as an append-only log.
pub struct FileChannelStore {
    config: FileStoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    writer: Mutex<File>,

    records: RwLock<Records>,
}

enum Frame {
    Entry(StoreEntry, u64),
    End,
    Torn,
}

impl FileChannelStore {
    /// Open an existing store or create a new one.
    pub fn open(config: FileStoreConfig) -> Result<Self> {
        if !config.path.exists() {
            if !config.create_if_missing {
                return Err(SyncError::NotInitialized);
            }
            fs::create_dir_all(&config.path)?;
        }

        let lock_file = Self::acquire_lock(&config.path)?;
        let log_path = config.path.join("records.log");

        let mut records = Records::default();
        if log_path.exists() {
            let valid_len = Self::replay(&log_path, &mut records)?;
            let file = OpenOptions::new().write(true).open(&log_path)?;
            if file.metadata()?.len() > valid_len {
                tracing::warn!(
                    path = %log_path.display(),
                    valid_len,
                    "truncating torn frame at end of record log"
                );
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&log_path)?;
            file.write_all(LOG_MAGIC)?;
            file.write_all(&[LOG_VERSION])?;
            file.sync_all()?;
        }

        let writer = OpenOptions::new().append(true).open(&log_path)?;
        tracing::debug!(
            path = %config.path.display(),
            channels = records.channels.len(),
            "opened channel store"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            writer: Mutex::new(writer),
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn channel(&self, id: &ChannelId) -> Option<Channel> {
        self.records.read().channels.get(id).cloned()
    }

    pub fn user(&self, id: &UserId) -> Option<ChatUser> {
        self.records.read().users.get(id).cloned()
    }

    /// Channels the user holds a membership in, ordered by id.
    pub fn memberships(&self, user: &UserId) -> Vec<ChannelId> {
        self.records.read().memberships_of(user)
    }

    pub fn channel_count(&self) -> usize {
        self.records.read().channels.len()
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path.join("store.lock"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| SyncError::Locked)?;
        Ok(lock_file)
    }

    /// Replay the log into `records`. Returns the length of the valid prefix.
    fn replay(log_path: &Path, records: &mut Records) -> Result<u64> {
        let mut reader = BufReader::new(File::open(log_path)?);

        let mut header = [0u8; HEADER_LEN as usize];
        reader.read_exact(&mut header)?;
        if &header[..4] != LOG_MAGIC {
            return Err(SyncError::InvalidFormat("Invalid record log magic".into()));
        }
        if header[4] != LOG_VERSION {
            return Err(SyncError::InvalidFormat(format!(
                "Unsupported record log version: {}",
                header[4]
            )));
        }

        let mut valid_len = HEADER_LEN;
        loop {
            match Self::read_frame(&mut reader)? {
                Frame::Entry(entry, frame_len) => {
                    records.apply(entry);
                    valid_len += frame_len;
                }
                Frame::End | Frame::Torn => break,
            }
        }
        Ok(valid_len)
    }

    fn append(&self, entry: StoreEntry) -> Result<()> {
        let frame = encode_frame(&rmp_serde::to_vec(&entry)?)?;

        let mut writer = self.writer.lock();
        append_frame(&mut *writer, &frame, self.config.sync_writes)?;

        // Apply while still holding the writer so memory follows log order.
        self.records.write().apply(entry);
        Ok(())
    }

    fn read_frame(reader: &mut impl Read) -> Result<Frame> {
        let mut len_bytes = [0u8; 4];
        match read_full(reader, &mut len_bytes)? {
            0 => return Ok(Frame::End),
            4 => {}
            _ => return Ok(Frame::Torn),
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_ENTRY_SIZE {
            return Err(SyncError::Corruption("record log entry too large".into()));
        }

        let mut encoded = vec![0u8; len];
        if read_full(reader, &mut encoded)? < len {
            return Ok(Frame::Torn);
        }

        let mut checksum_bytes = [0u8; 4];
        if read_full(reader, &mut checksum_bytes)? < 4 {
            return Ok(Frame::Torn);
        }

        let expected = u32::from_le_bytes(checksum_bytes);
        let got = crc32fast::hash(&encoded);
        if expected != got {
            return Err(SyncError::ChecksumMismatch { expected, got });
        }

        let entry = rmp_serde::from_slice(&encoded)?;
        Ok(Frame::Entry(entry, 8 + len as u64))
    }

    fn complete(&self, entry: StoreEntry, on_complete: SaveCompletion) {
        let result = self.append(entry);
        if let Err(ref e) = result {
            tracing::warn!(path = %self.config.path.display(), error = %e, "channel store write failed");
        }
        on_complete(result);
    }
}

/// Append target for frames. Lets a failed append be rolled back.
trait LogFile: Write {
    fn end_offset(&self) -> io::Result<u64>;

    fn truncate_to(&mut self, len: u64) -> io::Result<()>;

    fn sync(&self) -> io::Result<()>;
}

impl LogFile for File {
    fn end_offset(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Frame an encoded entry. Entries the reader would refuse are refused here.
fn encode_frame(encoded: &[u8]) -> Result<Vec<u8>> {
    if encoded.len() > MAX_ENTRY_SIZE {
        return Err(SyncError::Store(format!(
            "record of {} bytes exceeds the {} byte limit",
            encoded.len(),
            MAX_ENTRY_SIZE
        )));
    }
    let mut frame = Vec::with_capacity(encoded.len() + 8);
    frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
    frame.extend_from_slice(encoded);
    frame.extend_from_slice(&crc32fast::hash(encoded).to_le_bytes());
    Ok(frame)
}

/// Append a whole frame or nothing.
fn append_frame(log: &mut impl LogFile, frame: &[u8], sync: bool) -> Result<()> {
    let start = log.end_offset()?;
    let mut written = log.write_all(frame);
    if written.is_ok() && sync {
        written = log.sync();
    }
    if let Err(e) = written {
        if let Err(rollback) = log.truncate_to(start) {
            tracing::error!(start, error = %rollback, "could not roll back partial frame");
        }
        return Err(e.into());
    }
    Ok(())
}

/// Read until `buf` is full or EOF. Returns the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

impl ChannelStore for FileChannelStore {
    fn save(&self, membership: Membership, on_complete: SaveCompletion) {
        self.complete(StoreEntry::Membership(membership), on_complete);
    }

    fn save_user(&self, user: ChatUser, on_complete: SaveCompletion) {
        self.complete(StoreEntry::User(user), on_complete);
    }
}
