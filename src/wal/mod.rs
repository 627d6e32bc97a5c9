//! C2: the append-only, single-writer Write-Ahead Log.
//!
//! Wire format: 8-byte magic, 2-byte format version, 2-byte
//! flags, 4-byte reserved, then records:
//! `u32 frame_len | u64 seq | u64 timestamp_ns | u8 type | u16 node_id_len |
//! node_id bytes | u32 payload_len | UArr payload | u32 checksum`.
//! `checksum` is a CRC-32 (crc32fast) over every preceding byte of the
//! record (including `frame_len`).

use crate::config::{FsyncPolicy, WalConfig};
use crate::errors::FxdError;
use crate::utils::num::usize_to_u64;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const MAGIC: [u8; 8] = *b"FXDWAL01";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    NodeCreate = 1,
    NodePatch = 2,
    LinkAdd = 3,
    LinkRemove = 4,
    Signal = 5,
    Checkpoint = 6,
}

impl RecordType {
    const fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::NodeCreate),
            2 => Some(Self::NodePatch),
            3 => Some(Self::LinkAdd),
            4 => Some(Self::LinkRemove),
            5 => Some(Self::Signal),
            6 => Some(Self::Checkpoint),
            _ => None,
        }
    }
}

/// One decoded WAL record.
#[derive(Debug, Clone)]
pub struct WalRecord {
    pub seq: u64,
    pub timestamp_ns: u128,
    pub rtype: RecordType,
    pub node_id: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WalStats {
    pub count: u64,
    pub oldest_seq: Option<u64>,
    pub newest_seq: Option<u64>,
    pub bytes: u64,
}

/// A single-writer, crash-safe, append-only framed log.
pub struct Wal {
    path: PathBuf,
    file: File,
    next_seq: u64,
    stats: WalStats,
    config: WalConfig,
    last_sync: Instant,
}

fn now_ns() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0)
}

fn crc(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

impl Wal {
    /// Open or create the WAL at `path` with the default fsync policy
    /// (`Always`). See [`Wal::open_with_config`] to configure it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the header cannot
    /// be written/verified.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FxdError> {
        Self::open_with_config(path, WalConfig::default())
    }

    /// Open or create the WAL at `path`. Recovers the highest valid
    /// sequence by scanning forward from the header, truncating any
    /// trailing partial or corrupt record so no record is ever partially
    /// surfaced.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the header cannot
    /// be written/verified.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: WalConfig) -> Result<Self, FxdError> {
        let path = path.as_ref().to_path_buf();
        let is_new = !path.exists();
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;

        if is_new {
            let mut header = [0u8; HEADER_LEN];
            header[0..8].copy_from_slice(&MAGIC);
            header[8..10].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
            file.write_all(&header)?;
            file.sync_data()?;
        } else {
            let mut header = [0u8; HEADER_LEN];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            if header[0..8] != MAGIC {
                return Err(FxdError::InvalidFormat("WAL InvalidMagic".into()));
            }
        }

        let mut wal =
            Self { path, file, next_seq: 0, stats: WalStats::default(), config, last_sync: Instant::now() };
        wal.recover()?;
        Ok(wal)
    }

    fn recover(&mut self) -> Result<(), FxdError> {
        self.file.seek(SeekFrom::Start(usize_to_u64(HEADER_LEN)))?;
        let mut good_end = usize_to_u64(HEADER_LEN);
        let mut stats = WalStats::default();
        let mut max_seq = 0u64;

        loop {
            let record_start = self.file.stream_position()?;
            match read_one(&mut self.file) {
                Ok(Some((rec, record_len))) => {
                    stats.count += 1;
                    stats.oldest_seq.get_or_insert(rec.seq);
                    stats.newest_seq = Some(rec.seq);
                    max_seq = max_seq.max(rec.seq);
                    good_end = record_start + usize_to_u64(record_len);
                }
                Ok(None) => break,
                Err(_) => {
                    log::warn!("fxd wal: dropping corrupt/partial record at offset {record_start}, truncating");
                    break;
                }
            }
        }

        self.file.set_len(good_end)?;
        self.file.seek(SeekFrom::End(0))?;
        stats.bytes = good_end;
        self.stats = stats;
        self.next_seq = max_seq.wrapping_add(1);
        if stats.count == 0 {
            self.next_seq = 0;
        }
        Ok(())
    }

    /// Append a new record, returning its assigned sequence number.
    ///
    /// # Errors
    /// Returns an error if the write or the subsequent commit fails. The
    /// WAL does not reject further writes automatically; callers that hit
    /// an error should reopen the WAL before retrying.
    pub fn append(&mut self, rtype: RecordType, node_id: &str, payload: &[u8]) -> Result<u64, FxdError> {
        let seq = self.next_seq;
        let frame = build_frame(seq, now_ns(), rtype, node_id, payload);
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&frame)?;
        self.maybe_sync()?;
        self.next_seq += 1;
        self.stats.count += 1;
        self.stats.oldest_seq.get_or_insert(seq);
        self.stats.newest_seq = Some(seq);
        self.stats.bytes += usize_to_u64(frame.len());
        Ok(seq)
    }

    /// Read all records with `seq >= from_seq`, in order. End-of-file is
    /// not an error; reading past the tail simply stops.
    ///
    /// # Errors
    /// Returns an error only on I/O failure while seeking/reading; corrupt
    /// trailing records were already dropped at `open` time.
    pub fn read_from(&mut self, from_seq: u64) -> Result<Vec<WalRecord>, FxdError> {
        self.file.seek(SeekFrom::Start(usize_to_u64(HEADER_LEN)))?;
        let mut out = Vec::new();
        loop {
            match read_one(&mut self.file) {
                Ok(Some((rec, _))) => {
                    if rec.seq >= from_seq {
                        out.push(rec);
                    }
                }
                Ok(None) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Flush to disk according to the configured [`FsyncPolicy`]:
    /// `Always` syncs every append, `Never` never syncs, `Interval`
    /// syncs only once `fsync_interval_ms` has elapsed since the last
    /// sync.
    fn maybe_sync(&mut self) -> Result<(), FxdError> {
        let should_sync = match self.config.fsync_policy {
            FsyncPolicy::Always => true,
            FsyncPolicy::Never => false,
            FsyncPolicy::Interval => {
                self.last_sync.elapsed() >= Duration::from_millis(self.config.fsync_interval_ms)
            }
        };
        if should_sync {
            self.file.sync_data()?;
            self.last_sync = Instant::now();
        }
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> WalStats {
        self.stats
    }

    /// Rewrite the log keeping only records with `seq > up_to_seq`,
    /// atomically swapping in the new file.
    ///
    /// # Errors
    /// Returns an error if reading the existing log or writing/renaming
    /// the compacted file fails.
    pub fn compact(&mut self, up_to_seq: u64) -> Result<(), FxdError> {
        let kept = self.read_from(up_to_seq + 1)?;
        let tmp_path = self.path.with_extension("wal.compacting");
        {
            let mut tmp = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
            let mut header = [0u8; HEADER_LEN];
            header[0..8].copy_from_slice(&MAGIC);
            header[8..10].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
            tmp.write_all(&header)?;
            for rec in &kept {
                let frame = build_frame(rec.seq, rec.timestamp_ns, rec.rtype, &rec.node_id, &rec.payload);
                tmp.write_all(&frame)?;
            }
            tmp.sync_data()?;
        }
        atomic_replace(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.last_sync = Instant::now();
        self.recover()?;
        Ok(())
    }
}

fn atomic_replace(src: &Path, dst: &Path) -> Result<(), FxdError> {
    #[cfg(windows)]
    {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::winbase::{MoveFileExW, MOVEFILE_REPLACE_EXISTING};
        let src_w: Vec<u16> = OsStr::new(src).encode_wide().chain(Some(0)).collect();
        let dst_w: Vec<u16> = OsStr::new(dst).encode_wide().chain(Some(0)).collect();
        let ok = unsafe { MoveFileExW(src_w.as_ptr(), dst_w.as_ptr(), MOVEFILE_REPLACE_EXISTING) };
        if ok == 0 {
            return Err(FxdError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }
    #[cfg(not(windows))]
    {
        std::fs::rename(src, dst)?;
        Ok(())
    }
}

fn build_frame(seq: u64, ts: u128, rtype: RecordType, node_id: &str, payload: &[u8]) -> Vec<u8> {
    let node_id_bytes = node_id.as_bytes();
    let mut body = Vec::new();
    body.extend_from_slice(&seq.to_le_bytes());
    body.extend_from_slice(&(usize_to_u64(ts as usize)).to_le_bytes());
    body.push(rtype as u8);
    body.extend_from_slice(&(node_id_bytes.len() as u16).to_le_bytes());
    body.extend_from_slice(node_id_bytes);
    body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    body.extend_from_slice(payload);

    let frame_len = usize_to_u64(body.len()) as u32;
    let mut with_len = Vec::with_capacity(4 + body.len());
    with_len.extend_from_slice(&frame_len.to_le_bytes());
    with_len.extend_from_slice(&body);

    let checksum = crc(&with_len);
    let mut out = with_len;
    out.extend_from_slice(&checksum.to_le_bytes());
    out
}

/// Read exactly one record from the current file position, returning the
/// record and the total bytes it occupied on disk. `Ok(None)` at a clean
/// end of stream; `Err` on a corrupt/partial record.
fn read_one(file: &mut File) -> Result<Option<(WalRecord, usize)>, FxdError> {
    let mut len_buf = [0u8; 4];
    match file.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(FxdError::Io(e)),
    }
    let frame_len = u32::from_le_bytes(len_buf) as usize;

    let mut body = vec![0u8; frame_len];
    if file.read_exact(&mut body).is_err() {
        return Err(FxdError::InvalidFormat("WAL Truncated record body".into()));
    }
    let mut checksum_buf = [0u8; 4];
    if file.read_exact(&mut checksum_buf).is_err() {
        return Err(FxdError::InvalidFormat("WAL Truncated checksum".into()));
    }
    let stored_checksum = u32::from_le_bytes(checksum_buf);

    let mut with_len = Vec::with_capacity(4 + body.len());
    with_len.extend_from_slice(&len_buf);
    with_len.extend_from_slice(&body);
    if crc(&with_len) != stored_checksum {
        return Err(FxdError::ChecksumMismatch("WAL record checksum mismatch".into()));
    }

    let mut off = 0usize;
    let seq = u64::from_le_bytes(body[off..off + 8].try_into().unwrap());
    off += 8;
    let ts_low = u64::from_le_bytes(body[off..off + 8].try_into().unwrap());
    off += 8;
    let rtype = RecordType::from_u8(body[off])
        .ok_or_else(|| FxdError::InvalidFormat("unknown WAL record type".into()))?;
    off += 1;
    let node_id_len = u16::from_le_bytes(body[off..off + 2].try_into().unwrap()) as usize;
    off += 2;
    let node_id = String::from_utf8(body[off..off + node_id_len].to_vec())
        .map_err(|e| FxdError::InvalidFormat(format!("non-utf8 node id: {e}")))?;
    off += node_id_len;
    let payload_len = u32::from_le_bytes(body[off..off + 4].try_into().unwrap()) as usize;
    off += 4;
    let payload = body[off..off + payload_len].to_vec();

    let total_len = 4 + body.len() + 4;
    Ok(Some((
        WalRecord { seq, timestamp_ns: u128::from(ts_low), rtype, node_id, payload },
        total_len,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_from_start() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal.bin")).unwrap();
        let seq0 = wal.append(RecordType::NodeCreate, "n1", b"hello").unwrap();
        let records = wal.read_from(seq0).unwrap();
        assert_eq!(records[0].node_id, "n1");
        assert_eq!(records[0].payload, b"hello");
    }

    #[test]
    fn never_fsync_policy_still_persists_records() {
        let dir = tempdir().unwrap();
        let config = WalConfig { fsync_policy: FsyncPolicy::Never, fsync_interval_ms: 1_000 };
        let path = dir.path().join("wal.bin");
        {
            let mut wal = Wal::open_with_config(&path, config).unwrap();
            wal.append(RecordType::NodeCreate, "n1", b"hello").unwrap();
        }
        let mut wal = Wal::open(&path).unwrap();
        let records = wal.read_from(0).unwrap();
        assert_eq!(records[0].node_id, "n1");
    }

    #[test]
    fn interval_policy_skips_sync_within_window() {
        let dir = tempdir().unwrap();
        let config = WalConfig { fsync_policy: FsyncPolicy::Interval, fsync_interval_ms: 60_000 };
        let mut wal = Wal::open_with_config(dir.path().join("wal.bin"), config).unwrap();
        wal.append(RecordType::NodeCreate, "a", b"1").unwrap();
        let synced_at = wal.last_sync;
        wal.append(RecordType::NodeCreate, "b", b"2").unwrap();
        assert_eq!(wal.last_sync, synced_at);
    }

    #[test]
    fn crash_recovery_drops_trailing_partial_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.bin");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(RecordType::NodeCreate, "a", b"1").unwrap();
            wal.append(RecordType::NodeCreate, "b", b"2").unwrap();
            wal.append(RecordType::NodeCreate, "c", b"3").unwrap();
        }
        // Drop the final byte to corrupt the last record's checksum.
        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() - 1]).unwrap();

        let mut wal = Wal::open(&path).unwrap();
        assert_eq!(wal.stats().count, 2);
        let recs = wal.read_from(0).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].node_id, "a");
        assert_eq!(recs[1].node_id, "b");
    }

    #[test]
    fn compact_keeps_only_newer_records() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal.bin")).unwrap();
        for i in 0..5 {
            wal.append(RecordType::NodeCreate, &format!("n{i}"), b"x").unwrap();
        }
        wal.compact(2).unwrap();
        let recs = wal.read_from(0).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].node_id, "n3");
        assert_eq!(recs[1].node_id, "n4");
    }

    #[test]
    fn stats_reflect_appended_records() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal.bin")).unwrap();
        wal.append(RecordType::NodeCreate, "a", b"x").unwrap();
        wal.append(RecordType::NodePatch, "a", b"y").unwrap();
        let stats = wal.stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.oldest_seq, Some(0));
        assert_eq!(stats.newest_seq, Some(1));
    }
}
