//! Fixed-length series: an ordered collection of chunks in one directory,
//! with a reference-counted open-chunk cache.

use crate::chunk::store::{Chunk, ChunkKind};
use crate::error::{Result, StrataError};
use crate::meta::codec::{self, MetaCodec};
use crate::meta::schema::SeriesMeta;
use crate::series::cache::{ChunkCache, ChunkGuard};
use crate::series::iter::RangeIter;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: u64 = 4096;

#[derive(Clone, Debug)]
pub struct CreateOptions {
    pub block_size: u32,
    pub max_entries_per_chunk: u32,
    pub page_size: u64,
    /// 0 disables gzip; 1-9 store chunks as gzip-framed direct files.
    pub gzip_level: u32,
    pub metadata: Option<Map<String, Value>>,
    // Set by the varlen layer on its root sub-series.
    pub(crate) size_field: Option<u8>,
    pub(crate) length_profile: Option<Vec<u32>>,
}

impl CreateOptions {
    pub fn new(block_size: u32, max_entries_per_chunk: u32) -> Self {
        Self {
            block_size,
            max_entries_per_chunk,
            page_size: DEFAULT_PAGE_SIZE,
            gzip_level: 0,
            metadata: None,
            size_field: None,
            length_profile: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OpenOptions {
    /// Skip mmap entirely and use seek+read/write file access.
    pub descriptor_based: bool,
}

struct SeriesState {
    /// `(min_ts, kind)` sorted ascending by `min_ts`.
    chunks: Vec<(u64, ChunkKind)>,
    /// Baseline reference on the newest chunk, kept while the series is open.
    last: Option<ChunkGuard>,
    last_entry_ts: u64,
    last_entry_synced: u64,
    metadata: Option<Map<String, Value>>,
}

pub struct Series {
    name: String,
    path: PathBuf,
    block_size: u32,
    max_entries_per_chunk: u32,
    page_size: u64,
    gzip_level: u32,
    codec: MetaCodec,
    descriptor_based: bool,
    size_field: Option<u8>,
    length_profile: Option<Vec<u32>>,
    closed: AtomicBool,
    state: Mutex<SeriesState>,
    cache: Arc<ChunkCache>,
}

fn series_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Index of the chunk that may contain `timestamp`: the last chunk whose
/// `min_ts` is `<= timestamp` (the first chunk when `timestamp` precedes
/// them all).
fn index_of_chunk_for(chunks: &[(u64, ChunkKind)], timestamp: u64) -> usize {
    chunks
        .partition_point(|&(min_ts, _)| min_ts <= timestamp)
        .saturating_sub(1)
}

impl Series {
    pub fn create(path: &Path, options: &CreateOptions) -> Result<Self> {
        if options.block_size == 0 {
            return Err(StrataError::InvalidArgument("block size must be > 0".into()));
        }
        if options.max_entries_per_chunk == 0 {
            return Err(StrataError::InvalidArgument(
                "max entries per chunk must be > 0".into(),
            ));
        }
        if options.page_size == 0 {
            return Err(StrataError::InvalidArgument("page size must be > 0".into()));
        }
        if options.gzip_level > 9 {
            return Err(StrataError::InvalidArgument(format!(
                "gzip level {} out of range 0-9",
                options.gzip_level
            )));
        }
        if let Err(e) = fs::create_dir(path) {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                return Err(StrataError::AlreadyExists(path.display().to_string()));
            }
            return Err(e.into());
        }

        let series = Self {
            name: series_name(path),
            path: path.to_path_buf(),
            block_size: options.block_size,
            max_entries_per_chunk: options.max_entries_per_chunk,
            page_size: options.page_size,
            gzip_level: options.gzip_level,
            codec: MetaCodec::preferred(),
            descriptor_based: false,
            size_field: options.size_field,
            length_profile: options.length_profile.clone(),
            closed: AtomicBool::new(false),
            state: Mutex::new(SeriesState {
                chunks: Vec::new(),
                last: None,
                last_entry_ts: 0,
                last_entry_synced: 0,
                metadata: options.metadata.clone(),
            }),
            cache: ChunkCache::new(),
        };
        let state = series.state.lock();
        series.write_meta_locked(&state)?;
        drop(state);
        Ok(series)
    }

    pub fn open(path: &Path, options: OpenOptions) -> Result<Self> {
        if !path.is_dir() {
            return Err(StrataError::DoesNotExist(path.display().to_string()));
        }
        let codec = codec::detect(path)?.ok_or_else(|| {
            StrataError::Corruption(format!("{}: missing metadata document", path.display()))
        })?;
        let meta: SeriesMeta = codec::read(path, codec)?;
        if meta.block_size == 0 || meta.max_entries_per_chunk == 0 || meta.page_size == 0 {
            return Err(StrataError::Corruption(format!(
                "{}: inconsistent metadata",
                path.display()
            )));
        }

        let mut chunks: Vec<(u64, ChunkKind)> = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name == codec::TEXT_FILE || file_name == codec::BINARY_FILE {
                continue;
            }
            match ChunkKind::parse_file_name(&file_name) {
                Some(parsed) => chunks.push(parsed),
                None => {
                    return Err(StrataError::Corruption(format!(
                        "{}: unexpected file name {file_name}",
                        path.display()
                    )));
                }
            }
        }
        chunks.sort_by_key(|&(min_ts, _)| min_ts);
        for pair in chunks.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(StrataError::Corruption(format!(
                    "{}: duplicate chunk name {}",
                    path.display(),
                    pair[0].0
                )));
            }
        }

        let series = Self {
            name: series_name(path),
            path: path.to_path_buf(),
            block_size: meta.block_size,
            max_entries_per_chunk: meta.max_entries_per_chunk,
            page_size: meta.page_size,
            gzip_level: meta.gzip_level.unwrap_or(0),
            codec,
            descriptor_based: options.descriptor_based,
            size_field: meta.size_field,
            length_profile: meta.length_profile,
            closed: AtomicBool::new(false),
            state: Mutex::new(SeriesState {
                chunks,
                last: None,
                last_entry_ts: 0,
                last_entry_synced: meta.last_entry_synced,
                metadata: meta.metadata,
            }),
            cache: ChunkCache::new(),
        };

        let mut state = series.state.lock();
        if let Some(&(name, kind)) = state.chunks.last() {
            let guard = series.open_chunk_guard(name, kind)?;
            state.last_entry_ts = guard.max_ts();
            state.last = Some(guard);
        }
        drop(state);
        Ok(series)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StrataError::InvalidState(format!(
                "series {} is closed",
                self.name
            )));
        }
        Ok(())
    }

    /// Cached handle for a chunk, opening it on demand; the returned guard
    /// holds one counted reference.
    fn open_chunk_guard(&self, name: u64, kind: ChunkKind) -> Result<ChunkGuard> {
        if let Some(guard) = self.cache.acquire(name) {
            return Ok(guard);
        }
        let file = self.path.join(kind.file_name(name));
        let chunk = Chunk::open(
            &file,
            name,
            kind,
            self.page_size,
            Some(self.block_size),
            self.descriptor_based,
            self.gzip_level,
        )?;
        self.cache.insert(Arc::new(chunk));
        self.cache.acquire(name).ok_or_else(|| {
            StrataError::InvalidState(format!("chunk {name} vanished from the open table"))
        })
    }

    pub fn append(&self, timestamp: u64, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if data.len() != self.block_size as usize {
            return Err(StrataError::InvalidArgument(format!(
                "payload length {} does not match block size {}",
                data.len(),
                self.block_size
            )));
        }
        let mut state = self.state.lock();
        if state.last_entry_ts > 0 && timestamp <= state.last_entry_ts {
            return Err(StrataError::InvalidArgument(format!(
                "timestamp {timestamp} not greater than last entry {}",
                state.last_entry_ts
            )));
        }

        let rollover = match state.last.as_ref() {
            None => true,
            Some(last) => last.entries() >= self.max_entries_per_chunk,
        };
        if rollover {
            let kind = if self.gzip_level > 0 {
                ChunkKind::DirectGzip
            } else {
                ChunkKind::Normal
            };
            let file = self.path.join(kind.file_name(timestamp));
            let chunk = Chunk::create(
                &file,
                timestamp,
                data,
                self.page_size,
                kind,
                self.gzip_level,
                self.descriptor_based,
            )?;
            self.cache.insert(Arc::new(chunk));
            let guard = self.cache.acquire(timestamp).ok_or_else(|| {
                StrataError::InvalidState(format!(
                    "chunk {timestamp} vanished from the open table"
                ))
            })?;
            state.chunks.push((timestamp, kind));
            // Replacing the baseline guard releases the previous last chunk.
            state.last = Some(guard);
        } else if let Some(last) = state.last.as_ref() {
            last.append(timestamp, data)?;
        }
        state.last_entry_ts = timestamp;
        Ok(())
    }

    /// Append `data` right-padded with zeros to the block size.
    pub fn append_padded(&self, timestamp: u64, data: &[u8]) -> Result<()> {
        if data.len() > self.block_size as usize {
            return Err(StrataError::InvalidArgument(format!(
                "payload length {} exceeds block size {}",
                data.len(),
                self.block_size
            )));
        }
        if data.len() == self.block_size as usize {
            return self.append(timestamp, data);
        }
        let mut padded = Vec::with_capacity(self.block_size as usize);
        padded.extend_from_slice(data);
        padded.resize(self.block_size as usize, 0);
        self.append(timestamp, &padded)
    }

    /// Iterate records with `start <= timestamp <= stop`, in order.
    pub fn iterate_range(&self, start: u64, stop: u64) -> Result<RangeIter> {
        self.ensure_open()?;
        if start > stop {
            return Err(StrataError::InvalidArgument(format!(
                "range start {start} after stop {stop}"
            )));
        }
        let state = self.state.lock();
        if state.chunks.is_empty() {
            return Ok(RangeIter::empty());
        }
        let start = start.max(state.chunks[0].0);
        let stop = stop.min(state.last_entry_ts);
        if start > stop {
            return Ok(RangeIter::empty());
        }
        let lo = index_of_chunk_for(&state.chunks, start);
        let hi = index_of_chunk_for(&state.chunks, stop);
        let mut queue = VecDeque::with_capacity(hi - lo + 1);
        for &(name, kind) in &state.chunks[lo..=hi] {
            queue.push_back(self.open_chunk_guard(name, kind)?);
        }
        Ok(RangeIter::new(start, stop, queue))
    }

    /// The most recent record.
    pub fn get_current_value(&self) -> Result<(u64, Vec<u8>)> {
        self.ensure_open()?;
        let last_ts = {
            let state = self.state.lock();
            match state.last.as_ref() {
                None => {
                    return Err(StrataError::InvalidArgument(format!(
                        "series {} has no data",
                        self.name
                    )));
                }
                Some(last) => last.max_ts(),
            }
        };
        let mut iter = self.iterate_range(last_ts, last_ts)?;
        match iter.next_entry()? {
            Some(piece) => Ok(piece),
            None => Err(StrataError::InvalidArgument(format!(
                "series {} has no data",
                self.name
            ))),
        }
    }

    /// Evict unreferenced open chunks (the last chunk always survives).
    /// Returns how many were dropped.
    pub fn close_chunks(&self) -> usize {
        let state = self.state.lock();
        let keep = state.last.as_ref().map(|guard| guard.name());
        self.cache.evict_unreferenced(keep)
    }

    /// Delete whole chunks older than `threshold`. Stops early at the first
    /// chunk that still has readers; those records survive until eviction.
    pub fn trim(&self, threshold: u64) -> Result<usize> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let mut removed = 0;
        while state.chunks.len() >= 2 && state.chunks[1].0 < threshold {
            let (name, kind) = state.chunks[0];
            if self.cache.ref_count(name) > 0 {
                debug!(chunk = name, "trim stopped at a referenced chunk");
                break;
            }
            match self.cache.remove(name) {
                Some(chunk) => chunk.delete()?,
                None => fs::remove_file(self.path.join(kind.file_name(name)))?,
            }
            state.chunks.remove(0);
            removed += 1;
        }
        Ok(removed)
    }

    /// Persist metadata and flush the newest chunk.
    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        let state = self.state.lock();
        self.write_meta_locked(&state)?;
        if let Some(last) = state.last.as_ref() {
            last.flush()?;
        }
        Ok(())
    }

    pub fn mark_synced_up_to(&self, timestamp: u64) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        state.last_entry_synced = timestamp;
        self.write_meta_locked(&state)
    }

    /// Close the series. Without `force`, outstanding reader references make
    /// this fail with `StillOpen`. Idempotent.
    pub fn close(&self, force: bool) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut state = self.state.lock();
        let baseline = u32::from(state.last.is_some());
        let outstanding = self.cache.total_refs().saturating_sub(baseline);
        if outstanding > 0 && !force {
            return Err(StrataError::StillOpen(format!(
                "series {} has {outstanding} outstanding reader references",
                self.name
            )));
        }
        self.write_meta_locked(&state)?;
        state.last = None;
        for chunk in self.cache.drain() {
            chunk.close()?;
        }
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    /// Close (forcing) and remove the series directory.
    pub fn delete(&self) -> Result<()> {
        self.close(true)?;
        fs::remove_dir_all(&self.path)?;
        Ok(())
    }

    fn write_meta_locked(&self, state: &SeriesState) -> Result<()> {
        let doc = SeriesMeta {
            block_size: self.block_size,
            max_entries_per_chunk: self.max_entries_per_chunk,
            last_entry_synced: state.last_entry_synced,
            page_size: self.page_size,
            metadata: state.metadata.clone(),
            gzip_level: (self.gzip_level > 0).then_some(self.gzip_level),
            size_field: self.size_field,
            length_profile: self.length_profile.clone(),
        };
        codec::write(&self.path, self.codec, &doc)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn max_entries_per_chunk(&self) -> u32 {
        self.max_entries_per_chunk
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn gzip_level(&self) -> u32 {
        self.gzip_level
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn last_entry_ts(&self) -> u64 {
        self.state.lock().last_entry_ts
    }

    pub fn last_entry_synced(&self) -> u64 {
        self.state.lock().last_entry_synced
    }

    pub fn metadata(&self) -> Option<Map<String, Value>> {
        self.state.lock().metadata.clone()
    }

    pub fn set_metadata(&self, metadata: Option<Map<String, Value>>) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        state.metadata = metadata;
        self.write_meta_locked(&state)
    }

    /// Snapshot of the chunk table as `(min_ts, kind)`.
    pub fn chunk_list(&self) -> Vec<(u64, ChunkKind)> {
        self.state.lock().chunks.clone()
    }

    pub fn open_chunk_count(&self) -> usize {
        self.cache.open_count()
    }

    /// Total on-disk bytes of mmap-backed open chunks.
    pub fn open_chunks_mmap_size(&self) -> u64 {
        self.cache.mmap_size()
    }

    pub(crate) fn size_field(&self) -> Option<u8> {
        self.size_field
    }

    pub(crate) fn length_profile(&self) -> Option<&[u32]> {
        self.length_profile.as_deref()
    }
}
