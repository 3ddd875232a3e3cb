use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::SyncMode;
use crate::error::{BrokerError, BrokerResult};
use crate::message::BrokerMessage;

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Partition a key maps to. Stable across processes and restarts.
pub fn partition_for(key: &[u8], partitions: u32) -> u32 {
    crc32fast::hash(key) % partitions.max(1)
}

struct Segment {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Bytes of the file already decoded into `messages`.
    scanned: u64,
}

struct LogInner {
    messages: Vec<BrokerMessage>,
    next_offset: u64,
    segment: Option<Segment>,
}

/// Append-only log of one topic partition.
///
/// Every message is kept in memory for reads; when file-backed, each append
/// is framed as:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized BrokerMessage)]
/// ```
/// Another process may append to the same file; [`PartitionLog::refresh`]
/// picks up frames written since the last scan.
pub struct PartitionLog {
    inner: Mutex<LogInner>,
    sync_mode: SyncMode,
}

impl PartitionLog {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(LogInner {
                messages: Vec::new(),
                next_offset: 0,
                segment: None,
            }),
            sync_mode: SyncMode::OsDefault,
        }
    }

    /// Open (or create) a segment file and recover its messages.
    ///
    /// Frames failing the CRC check are skipped. An incomplete frame at the
    /// end of the file (a torn write) is truncated away so new appends start
    /// on a frame boundary.
    pub fn open(path: &Path, sync_mode: SyncMode) -> BrokerResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        let scan = scan_frames(&bytes);

        if scan.consumed < bytes.len() as u64 {
            warn!(
                path = %path.display(),
                valid = scan.consumed,
                file_len = bytes.len(),
                "torn tail in partition log; truncating"
            );
            file.set_len(scan.consumed)?;
        }

        let next_offset = scan.messages.last().map(|m| m.offset + 1).unwrap_or(0);
        debug!(path = %path.display(), recovered = scan.messages.len(), next_offset, "partition log opened");

        Ok(Self {
            inner: Mutex::new(LogInner {
                messages: scan.messages,
                next_offset,
                segment: Some(Segment {
                    path: path.to_path_buf(),
                    writer: BufWriter::new(file),
                    scanned: scan.consumed,
                }),
            }),
            sync_mode,
        })
    }

    /// Append a message and return its offset.
    pub fn append(&self, key: &[u8], value: &[u8]) -> BrokerResult<u64> {
        let mut inner = self.inner.lock().expect("partition lock poisoned");
        refresh_locked(&mut inner)?;

        let message = BrokerMessage {
            offset: inner.next_offset,
            key: key.to_vec(),
            value: value.to_vec(),
            timestamp_ms: Utc::now().timestamp_millis(),
        };

        if let Some(segment) = inner.segment.as_mut() {
            let payload = bincode::serialize(&message)
                .map_err(|e| BrokerError::Serialization(e.to_string()))?;
            let length = payload.len() as u32;
            let crc = crc32fast::hash(&payload);

            segment.writer.write_all(&length.to_le_bytes())?;
            segment.writer.write_all(&crc.to_le_bytes())?;
            segment.writer.write_all(&payload)?;
            segment.writer.flush()?;
            if matches!(self.sync_mode, SyncMode::EveryWrite) {
                segment.writer.get_ref().sync_all()?;
            }
            segment.scanned += HEADER_SIZE as u64 + payload.len() as u64;
        }

        let offset = message.offset;
        inner.next_offset = offset + 1;
        inner.messages.push(message);
        Ok(offset)
    }

    /// Up to `max` messages starting at `from` (inclusive), in offset order.
    pub fn read(&self, from: u64, max: usize) -> BrokerResult<Vec<BrokerMessage>> {
        let mut inner = self.inner.lock().expect("partition lock poisoned");
        refresh_locked(&mut inner)?;
        let start = inner.messages.partition_point(|m| m.offset < from);
        Ok(inner.messages[start..]
            .iter()
            .take(max)
            .cloned()
            .collect())
    }

    /// Decode frames another process appended since the last scan.
    pub fn refresh(&self) -> BrokerResult<()> {
        let mut inner = self.inner.lock().expect("partition lock poisoned");
        refresh_locked(&mut inner)
    }

    /// Offset the next append will receive.
    pub fn end_offset(&self) -> u64 {
        self.inner.lock().expect("partition lock poisoned").next_offset
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("partition lock poisoned").messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn refresh_locked(inner: &mut LogInner) -> BrokerResult<()> {
    let Some(segment) = inner.segment.as_mut() else {
        return Ok(());
    };
    let mut file = File::open(&segment.path)?;
    let file_len = file.metadata()?.len();
    if file_len <= segment.scanned {
        return Ok(());
    }

    file.seek(SeekFrom::Start(segment.scanned))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;

    // A partial frame here may still be in flight from the other writer;
    // leave it for the next refresh.
    let scan = scan_frames(&tail);
    segment.scanned += scan.consumed;
    for message in scan.messages {
        if message.offset < inner.next_offset {
            continue;
        }
        inner.next_offset = message.offset + 1;
        inner.messages.push(message);
    }
    Ok(())
}

struct Scan {
    messages: Vec<BrokerMessage>,
    /// Length of the prefix made of complete frames.
    consumed: u64,
}

/// Decode complete frames from the front of `bytes`.
fn scan_frames(bytes: &[u8]) -> Scan {
    let mut messages = Vec::new();
    let mut pos = 0usize;

    while pos + HEADER_SIZE <= bytes.len() {
        let length = u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]]) as usize;
        let expected_crc = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]]);

        if length == 0 || pos + HEADER_SIZE + length > bytes.len() {
            break;
        }

        let payload = &bytes[pos + HEADER_SIZE..pos + HEADER_SIZE + length];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(
                position = pos,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping frame"
            );
        } else {
            match bincode::deserialize::<BrokerMessage>(payload) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(position = pos, error = %e, "undecodable frame; skipping"),
            }
        }
        pos += HEADER_SIZE + length;
    }

    Scan {
        messages,
        consumed: pos as u64,
    }
}
