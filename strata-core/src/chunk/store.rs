//! A chunk is one file holding a contiguous run of equal-sized records keyed
//! by strictly increasing timestamps.
//!
//! On-disk layout, little-endian throughout:
//!
//! | offset | size         | field                              |
//! |-------:|-------------:|------------------------------------|
//! | 0      | 4            | `block_size` (u32)                 |
//! | 4      | 8            | first record timestamp (`min_ts`)  |
//! | 12     | `block_size` | first record payload               |
//! | ...    |              | timestamp(8) ‖ payload repeated    |
//!
//! A normal chunk is page-padded and stores the record count (u32) in its
//! final 4 bytes; a direct chunk's length is exactly `4 + entries * span`.
//! Gzip chunks share the direct layout inside a gzip frame.

use crate::chunk::access::Access;
use crate::chunk::gzio::GzipAccess;
use crate::error::{Result, StrataError};
use crate::util::bytes::{read_u32, read_u64, u32_le, u64_le};
use parking_lot::RwLock;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Bytes before the first record's timestamp.
pub const HEADER_SIZE: u64 = 4;
/// Trailing entry-count field of a normal chunk.
pub const FOOTER_SIZE: u64 = 4;
/// Timestamp prefix of every record.
pub const TIMESTAMP_SIZE: u64 = 8;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChunkKind {
    Normal,
    Direct,
    DirectGzip,
}

impl ChunkKind {
    pub fn is_direct(self) -> bool {
        !matches!(self, ChunkKind::Normal)
    }

    pub fn is_gzip(self) -> bool {
        matches!(self, ChunkKind::DirectGzip)
    }

    /// File name for a chunk named `min_ts` of this kind.
    pub fn file_name(self, min_ts: u64) -> String {
        match self {
            ChunkKind::Normal => format!("{min_ts}"),
            ChunkKind::Direct => format!("{min_ts}.direct"),
            ChunkKind::DirectGzip => format!("{min_ts}.gz"),
        }
    }

    /// Parse `<min_ts>[.direct][.gz]`. Both `.gz` and `.direct.gz` read as
    /// gzip (gzip implies direct).
    pub fn parse_file_name(name: &str) -> Option<(u64, ChunkKind)> {
        let (stem, kind) = if let Some(s) = name.strip_suffix(".direct.gz") {
            (s, ChunkKind::DirectGzip)
        } else if let Some(s) = name.strip_suffix(".gz") {
            (s, ChunkKind::DirectGzip)
        } else if let Some(s) = name.strip_suffix(".direct") {
            (s, ChunkKind::Direct)
        } else {
            (name, ChunkKind::Normal)
        };
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok().map(|min_ts| (min_ts, kind))
    }
}

enum Body {
    Plain(RwLock<Access>),
    Gzip(GzipAccess),
}

pub struct Chunk {
    path: PathBuf,
    kind: ChunkKind,
    block_size: u32,
    page_size: u64,
    min_ts: u64,
    max_ts: AtomicU64,
    entries: AtomicU32,
    closed: AtomicBool,
    body: Body,
}

impl Chunk {
    /// On-disk span of one record including its timestamp prefix.
    fn span(&self) -> u64 {
        TIMESTAMP_SIZE + self.block_size as u64
    }

    fn timestamp_offset(&self, index: u32) -> u64 {
        HEADER_SIZE + index as u64 * self.span()
    }

    fn payload_offset(&self, index: u32) -> u64 {
        self.timestamp_offset(index) + TIMESTAMP_SIZE
    }

    /// Create a new chunk whose first record is `(timestamp, data)`. The
    /// payload length fixes the chunk's `block_size`.
    pub fn create(
        path: &Path,
        timestamp: u64,
        data: &[u8],
        page_size: u64,
        kind: ChunkKind,
        gzip_level: u32,
        descriptor_based: bool,
    ) -> Result<Self> {
        if data.is_empty() {
            return Err(StrataError::InvalidArgument(
                "chunk payload must not be empty".into(),
            ));
        }
        if path.exists() {
            return Err(StrataError::AlreadyExists(path.display().to_string()));
        }
        let block_size = data.len() as u32;
        let span = TIMESTAMP_SIZE + block_size as u64;

        let mut contents = Vec::with_capacity((HEADER_SIZE + span) as usize);
        contents.extend_from_slice(&block_size.to_le_bytes());
        contents.extend_from_slice(&timestamp.to_le_bytes());
        contents.extend_from_slice(data);

        let body = match kind {
            ChunkKind::DirectGzip => {
                Body::Gzip(GzipAccess::create(path, gzip_level, &contents)?)
            }
            ChunkKind::Direct | ChunkKind::Normal => {
                if kind == ChunkKind::Normal {
                    // Pad to the page boundary, then one spare zero page, and
                    // store the entry count in the trailing 4 bytes.
                    let padded = (contents.len() as u64).div_ceil(page_size) * page_size;
                    let total = padded + page_size;
                    contents.resize(total as usize, 0);
                    let footer = total - FOOTER_SIZE;
                    contents[footer as usize..].copy_from_slice(&1u32.to_le_bytes());
                }
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create_new(true)
                    .open(path)?;
                std::io::Write::write_all(&mut &file, &contents)?;
                let access = Access::open(file, descriptor_based)
                    .map_err(|e| map_open_error(path, e))?;
                Body::Plain(RwLock::new(access))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            block_size,
            page_size,
            min_ts: timestamp,
            max_ts: AtomicU64::new(timestamp),
            entries: AtomicU32::new(1),
            closed: AtomicBool::new(false),
            body,
        })
    }

    /// Open an existing chunk file named `name` (its `min_ts`).
    pub fn open(
        path: &Path,
        name: u64,
        kind: ChunkKind,
        page_size: u64,
        expected_block_size: Option<u32>,
        descriptor_based: bool,
        gzip_level: u32,
    ) -> Result<Self> {
        let corrupt = |msg: String| StrataError::Corruption(format!("{}: {msg}", path.display()));

        if kind == ChunkKind::DirectGzip {
            let (gz, contents) = GzipAccess::open(path, gzip_level)?;
            let (block_size, min_ts, entries) =
                parse_direct_layout(&contents, expected_block_size)
                    .map_err(|msg| corrupt(msg))?;
            if min_ts != name {
                return Err(corrupt(format!(
                    "first timestamp {min_ts} does not match chunk name {name}"
                )));
            }
            let span = TIMESTAMP_SIZE + block_size as u64;
            let last = HEADER_SIZE + (entries as u64 - 1) * span;
            let max_ts = u64_le(&contents[last as usize..last as usize + 8]);
            return Ok(Self {
                path: path.to_path_buf(),
                kind,
                block_size,
                page_size,
                min_ts,
                max_ts: AtomicU64::new(max_ts),
                entries: AtomicU32::new(entries),
                closed: AtomicBool::new(false),
                body: Body::Gzip(gz),
            });
        }

        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();

        let mut header = [0u8; 12];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)
            .map_err(|_| corrupt("file too short for header".into()))?;
        let mut offset = 0;
        let block_size = read_u32(&header, &mut offset);
        let min_ts = read_u64(&header, &mut offset);
        if block_size == 0 {
            return Err(corrupt("zero block size".into()));
        }
        if let Some(expected) = expected_block_size {
            if block_size != expected {
                return Err(corrupt(format!(
                    "block size {block_size} does not match series block size {expected}"
                )));
            }
        }
        if min_ts != name {
            return Err(corrupt(format!(
                "first timestamp {min_ts} does not match chunk name {name}"
            )));
        }
        let span = TIMESTAMP_SIZE + block_size as u64;

        let entries = match kind {
            ChunkKind::Normal => {
                if len < page_size || !len.is_multiple_of(page_size) {
                    return Err(corrupt(format!(
                        "length {len} is not a positive multiple of page size {page_size}"
                    )));
                }
                let mut footer = [0u8; 4];
                file.seek(SeekFrom::Start(len - FOOTER_SIZE))?;
                file.read_exact(&mut footer)?;
                let entries = u32_le(&footer);
                if entries == 0 || HEADER_SIZE + entries as u64 * span + FOOTER_SIZE > len {
                    return Err(corrupt(format!("entry count {entries} out of bounds")));
                }
                entries
            }
            ChunkKind::Direct => {
                if len <= HEADER_SIZE || !(len - HEADER_SIZE).is_multiple_of(span) {
                    return Err(corrupt(format!("length {len} is not header + whole records")));
                }
                ((len - HEADER_SIZE) / span) as u32
            }
            ChunkKind::DirectGzip => unreachable!(),
        };

        let access = Access::open(file, descriptor_based).map_err(|e| map_open_error(path, e))?;
        let last = HEADER_SIZE + (entries as u64 - 1) * span;
        let mut ts_buf = [0u8; 8];
        access.read_exact_at(last, &mut ts_buf)?;

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            block_size,
            page_size,
            min_ts,
            max_ts: AtomicU64::new(u64_le(&ts_buf)),
            entries: AtomicU32::new(entries),
            closed: AtomicBool::new(false),
            body: Body::Plain(RwLock::new(access)),
        })
    }

    pub fn name(&self) -> u64 {
        self.min_ts
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn min_ts(&self) -> u64 {
        self.min_ts
    }

    pub fn max_ts(&self) -> u64 {
        self.max_ts.load(Ordering::Acquire)
    }

    pub fn entries(&self) -> u32 {
        self.entries.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// On-disk size of the chunk file.
    pub fn file_size(&self) -> Result<u64> {
        match &self.body {
            Body::Plain(access) => Ok(access.read().len()),
            Body::Gzip(gz) => Ok(gz.compressed_len()?),
        }
    }

    pub fn is_mmap_backed(&self) -> bool {
        match &self.body {
            Body::Plain(access) => access.read().is_mapped(),
            Body::Gzip(_) => false,
        }
    }

    fn check_index(&self, index: u32) -> Result<()> {
        let entries = self.entries();
        if index >= entries {
            return Err(StrataError::InvalidArgument(format!(
                "record index {index} out of range (entries = {entries})"
            )));
        }
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match &self.body {
            Body::Plain(access) => access.read().read_exact_at(offset, buf)?,
            Body::Gzip(gz) => gz.read_exact_at(offset, buf)?,
        }
        Ok(())
    }

    pub fn timestamp_at(&self, index: u32) -> Result<u64> {
        self.check_index(index)?;
        let mut buf = [0u8; 8];
        self.read_at(self.timestamp_offset(index), &mut buf)?;
        Ok(u64_le(&buf))
    }

    pub fn value_at(&self, index: u32) -> Result<Vec<u8>> {
        self.check_index(index)?;
        let mut buf = vec![0u8; self.block_size as usize];
        self.read_at(self.payload_offset(index), &mut buf)?;
        Ok(buf)
    }

    pub fn piece_at(&self, index: u32) -> Result<(u64, Vec<u8>)> {
        self.check_index(index)?;
        let mut buf = vec![0u8; self.span() as usize];
        self.read_at(self.timestamp_offset(index), &mut buf)?;
        let timestamp = u64_le(&buf[0..8]);
        buf.drain(0..8);
        Ok((timestamp, buf))
    }

    /// Payload bytes `[start, stop)` of record `index`, clamped to the block.
    pub fn slice_at(&self, index: u32, start: u32, stop: u32) -> Result<Vec<u8>> {
        self.check_index(index)?;
        let stop = stop.min(self.block_size);
        let start = start.min(stop);
        let mut buf = vec![0u8; (stop - start) as usize];
        if !buf.is_empty() {
            self.read_at(self.payload_offset(index) + start as u64, &mut buf)?;
        }
        Ok(buf)
    }

    pub fn byte_of_piece(&self, index: u32, position: u32) -> Result<u8> {
        self.check_index(index)?;
        if position >= self.block_size {
            return Err(StrataError::InvalidArgument(format!(
                "byte position {position} out of range (block size = {})",
                self.block_size
            )));
        }
        let mut buf = [0u8; 1];
        self.read_at(self.payload_offset(index) + position as u64, &mut buf)?;
        Ok(buf[0])
    }

    /// Smallest index whose timestamp is `>= timestamp`; `entries` if none.
    pub fn find_left(&self, timestamp: u64) -> Result<u32> {
        let mut lo = 0u32;
        let mut hi = self.entries();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.timestamp_at(mid)? < timestamp {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Smallest index whose timestamp is `> timestamp`; `entries` if none.
    pub fn find_right(&self, timestamp: u64) -> Result<u32> {
        let mut lo = 0u32;
        let mut hi = self.entries();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.timestamp_at(mid)? <= timestamp {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Append one record. The caller (the owning series) serializes writers;
    /// concurrent readers are safe.
    pub fn append(&self, timestamp: u64, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(StrataError::InvalidState(format!(
                "chunk {} is closed",
                self.min_ts
            )));
        }
        if data.len() != self.block_size as usize {
            return Err(StrataError::InvalidArgument(format!(
                "payload length {} does not match block size {}",
                data.len(),
                self.block_size
            )));
        }
        if timestamp <= self.max_ts() {
            return Err(StrataError::InvalidArgument(format!(
                "timestamp {timestamp} not greater than {}",
                self.max_ts()
            )));
        }

        let span = self.span();
        let count = self.entries.load(Ordering::Acquire);
        let pointer = HEADER_SIZE + count as u64 * span;

        let mut record = Vec::with_capacity(span as usize);
        record.extend_from_slice(&timestamp.to_le_bytes());
        record.extend_from_slice(data);

        match &self.body {
            Body::Plain(lock) => {
                let mut access = lock.write();
                match self.kind {
                    ChunkKind::Normal => {
                        if pointer + span + FOOTER_SIZE > access.len() {
                            let new_len = access.len() + self.page_size;
                            access.resize(new_len)?;
                            access
                                .write_all_at(new_len - FOOTER_SIZE, &count.to_le_bytes())?;
                        }
                        access.write_all_at(pointer, &record)?;
                        self.entries.store(count + 1, Ordering::Release);
                        let footer = access.len() - FOOTER_SIZE;
                        access.write_all_at(footer, &(count + 1).to_le_bytes())?;
                    }
                    ChunkKind::Direct => {
                        access.resize(pointer + span)?;
                        access.write_all_at(pointer, &record)?;
                        self.entries.store(count + 1, Ordering::Release);
                    }
                    ChunkKind::DirectGzip => unreachable!(),
                }
            }
            Body::Gzip(gz) => {
                gz.append(&record)?;
                self.entries.store(count + 1, Ordering::Release);
            }
        }
        self.max_ts.store(timestamp, Ordering::Release);
        Ok(())
    }

    pub fn switch_to_descriptor_based_access(&self) -> Result<()> {
        match &self.body {
            Body::Plain(lock) => {
                lock.write().switch_to_descriptor();
                Ok(())
            }
            Body::Gzip(_) => Ok(()),
        }
    }

    pub fn switch_to_mmap_based_access(&self) -> Result<()> {
        match &self.body {
            Body::Plain(lock) => {
                lock.write()
                    .switch_to_mmap()
                    .map_err(|e| map_open_error(&self.path, e))
            }
            Body::Gzip(_) => Err(StrataError::InvalidArgument(
                "gzip chunks cannot be memory-mapped".into(),
            )),
        }
    }

    pub fn flush(&self) -> Result<()> {
        match &self.body {
            Body::Plain(lock) => lock.read().flush()?,
            Body::Gzip(gz) => gz.flush()?,
        }
        Ok(())
    }

    /// Flush and mark closed. Reference-count bookkeeping lives in the
    /// owning series' cache; by the time this runs no readers remain.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match &self.body {
            Body::Plain(lock) => lock.read().flush()?,
            Body::Gzip(gz) => gz.finish()?,
        }
        Ok(())
    }

    /// Close and unlink the chunk file.
    pub fn delete(&self) -> Result<()> {
        self.close()?;
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

fn map_open_error(path: &Path, e: std::io::Error) -> StrataError {
    StrataError::Corruption(format!("cannot map {}: {e}", path.display()))
}

/// Parse the direct layout out of a decoded byte buffer:
/// `(block_size, min_ts, entries)`.
fn parse_direct_layout(
    contents: &[u8],
    expected_block_size: Option<u32>,
) -> std::result::Result<(u32, u64, u32), String> {
    if contents.len() < 12 {
        return Err("file too short for header".into());
    }
    let mut offset = 0;
    let block_size = read_u32(contents, &mut offset);
    let min_ts = read_u64(contents, &mut offset);
    if block_size == 0 {
        return Err("zero block size".into());
    }
    if let Some(expected) = expected_block_size {
        if block_size != expected {
            return Err(format!(
                "block size {block_size} does not match series block size {expected}"
            ));
        }
    }
    let span = TIMESTAMP_SIZE + block_size as u64;
    let len = contents.len() as u64;
    if len <= HEADER_SIZE || !(len - HEADER_SIZE).is_multiple_of(span) {
        return Err(format!("length {len} is not header + whole records"));
    }
    Ok((block_size, min_ts, ((len - HEADER_SIZE) / span) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: u64 = 4096;

    #[test]
    fn parse_file_names() {
        assert_eq!(
            ChunkKind::parse_file_name("100"),
            Some((100, ChunkKind::Normal))
        );
        assert_eq!(
            ChunkKind::parse_file_name("100.direct"),
            Some((100, ChunkKind::Direct))
        );
        assert_eq!(
            ChunkKind::parse_file_name("100.gz"),
            Some((100, ChunkKind::DirectGzip))
        );
        assert_eq!(
            ChunkKind::parse_file_name("100.direct.gz"),
            Some((100, ChunkKind::DirectGzip))
        );
        assert_eq!(ChunkKind::parse_file_name("metadata"), None);
        assert_eq!(ChunkKind::parse_file_name(".direct"), None);
        assert_eq!(ChunkKind::parse_file_name("12x"), None);
    }

    #[test]
    fn normal_create_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("100");
        let chunk =
            Chunk::create(&path, 100, &[1, 2, 3, 4], PAGE, ChunkKind::Normal, 0, false).unwrap();
        assert_eq!(chunk.entries(), 1);
        assert_eq!(chunk.min_ts(), 100);
        assert_eq!(chunk.max_ts(), 100);

        let raw = std::fs::read(&path).unwrap();
        // One content page plus one spare page.
        assert_eq!(raw.len() as u64, 2 * PAGE);
        assert_eq!(u32_le(&raw[0..4]), 4);
        assert_eq!(u64_le(&raw[4..12]), 100);
        assert_eq!(&raw[12..16], &[1, 2, 3, 4]);
        assert_eq!(u32_le(&raw[raw.len() - 4..]), 1);
    }

    #[test]
    fn normal_append_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1");
        let chunk =
            Chunk::create(&path, 1, &[0xAA; 4], PAGE, ChunkKind::Normal, 0, false).unwrap();
        for ts in 2..=5u64 {
            chunk.append(ts, &[ts as u8; 4]).unwrap();
        }
        assert_eq!(chunk.entries(), 5);
        assert_eq!(chunk.max_ts(), 5);
        drop(chunk);

        let chunk = Chunk::open(&path, 1, ChunkKind::Normal, PAGE, Some(4), false, 0).unwrap();
        assert_eq!(chunk.entries(), 5);
        assert_eq!(chunk.piece_at(3).unwrap(), (4, vec![4u8; 4]));
        assert_eq!(chunk.value_at(0).unwrap(), vec![0xAA; 4]);
    }

    #[test]
    fn normal_append_extends_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1");
        // Tiny page so extension kicks in quickly.
        let chunk = Chunk::create(&path, 1, &[9u8; 4], 64, ChunkKind::Normal, 0, false).unwrap();
        for ts in 2..=40u64 {
            chunk.append(ts, &[ts as u8; 4]).unwrap();
        }
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len % 64, 0);
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(u32_le(&raw[raw.len() - 4..]), 40);
        assert_eq!(chunk.timestamp_at(39).unwrap(), 40);
    }

    #[test]
    fn direct_append_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("10.direct");
        let chunk =
            Chunk::create(&path, 10, &[1, 2], PAGE, ChunkKind::Direct, 0, false).unwrap();
        chunk.append(20, &[3, 4]).unwrap();
        chunk.append(30, &[5, 6]).unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            HEADER_SIZE + 3 * (TIMESTAMP_SIZE + 2)
        );
        drop(chunk);

        let chunk = Chunk::open(&path, 10, ChunkKind::Direct, PAGE, Some(2), false, 0).unwrap();
        assert_eq!(chunk.entries(), 3);
        assert_eq!(chunk.piece_at(2).unwrap(), (30, vec![5, 6]));
    }

    #[test]
    fn gzip_append_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("5.gz");
        let chunk =
            Chunk::create(&path, 5, &[7u8; 8], PAGE, ChunkKind::DirectGzip, 6, false).unwrap();
        chunk.append(6, &[8u8; 8]).unwrap();
        // Read-after-write forces an encoder flush.
        assert_eq!(chunk.piece_at(1).unwrap(), (6, vec![8u8; 8]));
        chunk.close().unwrap();
        drop(chunk);

        let chunk = Chunk::open(&path, 5, ChunkKind::DirectGzip, PAGE, Some(8), false, 6).unwrap();
        assert_eq!(chunk.entries(), 2);
        assert_eq!(chunk.max_ts(), 6);
        chunk.append(9, &[9u8; 8]).unwrap();
        assert_eq!(chunk.piece_at(2).unwrap(), (9, vec![9u8; 8]));
        assert!(chunk.switch_to_mmap_based_access().is_err());
    }

    #[test]
    fn bisection_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("100");
        let chunk =
            Chunk::create(&path, 100, &[0u8; 4], PAGE, ChunkKind::Normal, 0, false).unwrap();
        chunk.append(200, &[0u8; 4]).unwrap();
        chunk.append(300, &[0u8; 4]).unwrap();

        assert_eq!(chunk.find_left(50).unwrap(), 0);
        assert_eq!(chunk.find_left(200).unwrap(), 1);
        assert_eq!(chunk.find_left(201).unwrap(), 2);
        assert_eq!(chunk.find_left(301).unwrap(), chunk.entries());

        assert_eq!(chunk.find_right(50).unwrap(), 0);
        assert_eq!(chunk.find_right(200).unwrap(), 2);
        assert_eq!(chunk.find_right(300).unwrap(), chunk.entries());
    }

    #[test]
    fn slice_and_byte_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1");
        let chunk = Chunk::create(
            &path,
            1,
            &[10, 11, 12, 13, 14, 15],
            PAGE,
            ChunkKind::Normal,
            0,
            false,
        )
        .unwrap();
        assert_eq!(chunk.slice_at(0, 1, 4).unwrap(), vec![11, 12, 13]);
        assert_eq!(chunk.slice_at(0, 4, 100).unwrap(), vec![14, 15]);
        assert_eq!(chunk.slice_at(0, 5, 2).unwrap(), Vec::<u8>::new());
        assert_eq!(chunk.byte_of_piece(0, 5).unwrap(), 15);
        assert!(chunk.byte_of_piece(0, 6).is_err());
        assert!(chunk.timestamp_at(1).is_err());
    }

    #[test]
    fn truncated_footer_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1");
        let chunk = Chunk::create(&path, 1, &[0u8; 4], PAGE, ChunkKind::Normal, 0, false).unwrap();
        drop(chunk);

        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 4).unwrap();
        drop(file);

        assert!(matches!(
            Chunk::open(&path, 1, ChunkKind::Normal, PAGE, Some(4), false, 0),
            Err(StrataError::Corruption(_))
        ));
    }

    #[test]
    fn descriptor_based_access_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("7");
        let chunk = Chunk::create(&path, 7, &[1u8; 4], PAGE, ChunkKind::Normal, 0, true).unwrap();
        assert!(!chunk.is_mmap_backed());
        chunk.append(8, &[2u8; 4]).unwrap();
        assert_eq!(chunk.piece_at(1).unwrap(), (8, vec![2u8; 4]));
        chunk.switch_to_mmap_based_access().unwrap();
        assert_eq!(chunk.piece_at(0).unwrap(), (7, vec![1u8; 4]));
    }
}
