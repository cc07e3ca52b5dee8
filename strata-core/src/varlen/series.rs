//! Variable-length series: records up to ~2³²−1 bytes stored across a root
//! sub-series plus numbered overflow sub-series, sliced per a length profile.
//!
//! The root record carries a `size_field`-byte length prefix followed by the
//! first `profile[0]` payload bytes; sub-series `k` holds the next
//! `profile[k]` bytes (the last profile element repeats). Every slice of one
//! logical record shares the record's timestamp.

use crate::error::{Result, StrataError};
use crate::series::fixed::{CreateOptions, DEFAULT_PAGE_SIZE, OpenOptions, Series};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::iter::VarlenIter;

pub const ROOT_DIR: &str = "root";

/// Largest encodable record length for a size field of 1, 2, 3 or 4 bytes.
pub fn max_length_for(size_field: u8) -> u64 {
    (1u64 << (8 * size_field as u32)) - 1
}

/// Little-endian length prefix, truncated to `size_field` bytes. The caller
/// has already rejected lengths that do not fit.
pub(crate) fn encode_size(length: u64, size_field: u8) -> Vec<u8> {
    (length as u32).to_le_bytes()[..size_field as usize].to_vec()
}

pub(crate) fn decode_size(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

#[derive(Clone, Debug)]
pub struct VarlenCreateOptions {
    pub size_field: u8,
    pub length_profile: Vec<u32>,
    pub max_entries_per_chunk: u32,
    pub page_size: u64,
    pub gzip_level: u32,
}

impl VarlenCreateOptions {
    pub fn new(size_field: u8, length_profile: Vec<u32>, max_entries_per_chunk: u32) -> Self {
        Self {
            size_field,
            length_profile,
            max_entries_per_chunk,
            page_size: DEFAULT_PAGE_SIZE,
            gzip_level: 0,
        }
    }
}

pub struct VarlenSeries {
    name: String,
    path: PathBuf,
    size_field: u8,
    profile: Vec<u32>,
    root: Series,
    /// Overflow sub-series; index 0 is the directory named `1`.
    subs: Mutex<Vec<Series>>,
    /// Live iterators over this series.
    references: AtomicU32,
    closed: AtomicBool,
    /// Serializes multi-sub-series appends.
    write_lock: Mutex<()>,
}

fn validate_shape(size_field: u8, profile: &[u32]) -> Result<()> {
    if !(1..=4).contains(&size_field) {
        return Err(StrataError::InvalidArgument(format!(
            "size field {size_field} not in 1..=4"
        )));
    }
    if profile.is_empty() || profile.iter().any(|&p| p == 0) {
        return Err(StrataError::InvalidArgument(
            "length profile must be a non-empty array of positive integers".into(),
        ));
    }
    Ok(())
}

impl VarlenSeries {
    pub fn create(path: &Path, options: &VarlenCreateOptions) -> Result<Self> {
        validate_shape(options.size_field, &options.length_profile)?;
        if let Err(e) = fs::create_dir(path) {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                return Err(StrataError::AlreadyExists(path.display().to_string()));
            }
            return Err(e.into());
        }

        let mut root_options = CreateOptions::new(
            options.size_field as u32 + options.length_profile[0],
            options.max_entries_per_chunk,
        );
        root_options.page_size = options.page_size;
        root_options.gzip_level = options.gzip_level;
        root_options.size_field = Some(options.size_field);
        root_options.length_profile = Some(options.length_profile.clone());
        let root = Series::create(&path.join(ROOT_DIR), &root_options)?;

        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.to_path_buf(),
            size_field: options.size_field,
            profile: options.length_profile.clone(),
            root,
            subs: Mutex::new(Vec::new()),
            references: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        })
    }

    pub fn open(path: &Path, options: OpenOptions) -> Result<Self> {
        if !path.is_dir() {
            return Err(StrataError::DoesNotExist(path.display().to_string()));
        }
        let root = Series::open(&path.join(ROOT_DIR), options)?;
        let (size_field, profile) = match (root.size_field(), root.length_profile()) {
            (Some(size_field), Some(profile)) => (size_field, profile.to_vec()),
            _ => {
                return Err(StrataError::Corruption(format!(
                    "{}: root metadata is missing size_field/length_profile",
                    path.display()
                )));
            }
        };
        validate_shape(size_field, &profile)
            .map_err(|_| StrataError::Corruption(format!("{}: bad root metadata", path.display())))?;

        let mut numbers: Vec<u32> = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name == ROOT_DIR {
                continue;
            }
            match file_name.parse::<u32>() {
                Ok(n) if n >= 1 => numbers.push(n),
                _ => {
                    return Err(StrataError::Corruption(format!(
                        "{}: unexpected entry {file_name}",
                        path.display()
                    )));
                }
            }
        }
        numbers.sort_unstable();
        for (i, &n) in numbers.iter().enumerate() {
            if n != i as u32 + 1 {
                return Err(StrataError::Corruption(format!(
                    "{}: sub-series are not contiguous (missing {})",
                    path.display(),
                    i + 1
                )));
            }
        }

        let mut subs = Vec::with_capacity(numbers.len());
        for &n in &numbers {
            let sub = Series::open(&path.join(n.to_string()), options)?;
            let expected = profile_at(&profile, n as usize);
            if sub.block_size() != expected {
                return Err(StrataError::Corruption(format!(
                    "{}: sub-series {n} has block size {}, profile says {expected}",
                    path.display(),
                    sub.block_size()
                )));
            }
            subs.push(sub);
        }

        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.to_path_buf(),
            size_field,
            profile,
            root,
            subs: Mutex::new(subs),
            references: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StrataError::InvalidState(format!(
                "varlen series {} is closed",
                self.name
            )));
        }
        Ok(())
    }

    pub fn max_length(&self) -> u64 {
        max_length_for(self.size_field)
    }

    /// Payload capacity of the root plus the existing sub-series.
    fn capacity(&self, sub_count: usize) -> u64 {
        let mut total = profile_at(&self.profile, 0) as u64;
        for k in 1..=sub_count {
            total += profile_at(&self.profile, k) as u64;
        }
        total
    }

    /// Create sub-series until `length` bytes fit.
    fn ensure_capacity(&self, length: u64) -> Result<()> {
        let mut subs = self.subs.lock();
        while self.capacity(subs.len()) < length {
            let index = subs.len() + 1;
            let mut options = CreateOptions::new(
                profile_at(&self.profile, index),
                self.root.max_entries_per_chunk(),
            );
            options.page_size = self.root.page_size();
            options.gzip_level = self.root.gzip_level();
            let sub = Series::create(&self.path.join(index.to_string()), &options)?;
            subs.push(sub);
        }
        Ok(())
    }

    pub fn append(&self, timestamp: u64, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if data.is_empty() {
            return Err(StrataError::InvalidArgument(
                "varlen record must not be empty".into(),
            ));
        }
        if data.len() as u64 > self.max_length() {
            return Err(StrataError::InvalidArgument(format!(
                "record length {} exceeds maximum {} for size field {}",
                data.len(),
                self.max_length(),
                self.size_field
            )));
        }
        let _writer = self.write_lock.lock();
        self.ensure_capacity(data.len() as u64)?;

        let head_capacity = profile_at(&self.profile, 0) as usize;
        let head_len = data.len().min(head_capacity);
        let mut head = Vec::with_capacity(self.size_field as usize + head_len);
        head.extend_from_slice(&encode_size(data.len() as u64, self.size_field));
        head.extend_from_slice(&data[..head_len]);
        self.root.append_padded(timestamp, &head)?;

        let subs = self.subs.lock();
        let mut offset = head_capacity;
        let mut index = 1usize;
        while offset < data.len() {
            let take = (profile_at(&self.profile, index) as usize).min(data.len() - offset);
            subs[index - 1].append_padded(timestamp, &data[offset..offset + take])?;
            offset += take;
            index += 1;
        }
        Ok(())
    }

    /// Iterate logical records with `start <= timestamp <= stop`.
    pub fn iterate_range(&self, start: u64, stop: u64) -> Result<VarlenIter<'_>> {
        self.ensure_open()?;
        if start > stop {
            return Err(StrataError::InvalidArgument(format!(
                "range start {start} after stop {stop}"
            )));
        }
        let root_iter = self.root.iterate_range(start, stop)?;
        let subs = self.subs.lock();
        let mut sub_iters = Vec::with_capacity(subs.len());
        for sub in subs.iter() {
            sub_iters.push(sub.iterate_range(start, stop)?);
        }
        drop(subs);
        self.references.fetch_add(1, Ordering::AcqRel);
        Ok(VarlenIter::new(self, root_iter, sub_iters))
    }

    /// The record stored exactly at `timestamp`, if any.
    pub fn get(&self, timestamp: u64) -> Result<Option<super::entry::VarlenEntry>> {
        let mut iter = self.iterate_range(timestamp, timestamp)?;
        iter.next_item()
    }

    /// Close the series. Refuses with `StillOpen` while iterators are live,
    /// unless forced.
    pub fn close(&self, force: bool) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let live = self.references.load(Ordering::Acquire);
        if live > 0 && !force {
            return Err(StrataError::StillOpen(format!(
                "varlen series {} has {live} live iterators",
                self.name
            )));
        }
        self.root.close(force)?;
        for sub in self.subs.lock().iter() {
            sub.close(force)?;
        }
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    pub fn delete(&self) -> Result<()> {
        self.close(true)?;
        fs::remove_dir_all(&self.path)?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        self.root.sync()?;
        for sub in self.subs.lock().iter() {
            sub.sync()?;
        }
        Ok(())
    }

    /// Evict unreferenced open chunks across all sub-series.
    pub fn close_chunks(&self) -> usize {
        let mut dropped = self.root.close_chunks();
        for sub in self.subs.lock().iter() {
            dropped += sub.close_chunks();
        }
        dropped
    }

    pub fn open_chunks_mmap_size(&self) -> u64 {
        let mut total = self.root.open_chunks_mmap_size();
        for sub in self.subs.lock().iter() {
            total += sub.open_chunks_mmap_size();
        }
        total
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_field(&self) -> u8 {
        self.size_field
    }

    pub fn length_profile(&self) -> &[u32] {
        &self.profile
    }

    pub fn last_entry_ts(&self) -> u64 {
        self.root.last_entry_ts()
    }

    pub fn sub_series_count(&self) -> usize {
        self.subs.lock().len()
    }

    pub(crate) fn profile_vec(&self) -> Vec<u32> {
        self.profile.clone()
    }

    pub(crate) fn release_iterator(&self) {
        self.references.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Profile entry for slot `index`; the last element repeats.
pub(crate) fn profile_at(profile: &[u32], index: usize) -> u32 {
    profile[index.min(profile.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_field_limits() {
        assert_eq!(max_length_for(1), 0xFF);
        assert_eq!(max_length_for(2), 0xFFFF);
        assert_eq!(max_length_for(3), 0xFF_FFFF);
        assert_eq!(max_length_for(4), 0xFFFF_FFFF);
    }

    #[test]
    fn size_encoding_round_trip() {
        for size_field in 1u8..=4 {
            for length in [0u64, 1, 0x7F, 0xFF, 0x1234, 0xFF_FFFF] {
                if length > max_length_for(size_field) {
                    continue;
                }
                let encoded = encode_size(length, size_field);
                assert_eq!(encoded.len(), size_field as usize);
                assert_eq!(decode_size(&encoded), length);
            }
        }
    }

    #[test]
    fn three_byte_packing_is_little_endian() {
        assert_eq!(encode_size(0x01_0203, 3), vec![0x03, 0x02, 0x01]);
    }

    #[test]
    fn profile_last_element_repeats() {
        let profile = [4u32, 8, 16];
        assert_eq!(profile_at(&profile, 0), 4);
        assert_eq!(profile_at(&profile, 2), 16);
        assert_eq!(profile_at(&profile, 7), 16);
    }
}
