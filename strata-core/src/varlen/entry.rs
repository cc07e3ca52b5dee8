//! Lazy view over one variable-length record.
//!
//! An entry holds `(chunk, index)` positions for every sub-series slice of
//! the record, each pinning its chunk through a counted guard, and reads
//! payload bytes on demand: the length prefix first, then only the segments
//! a given operation needs.

use crate::error::{Result, StrataError};
use crate::series::cache::ChunkGuard;
use crate::varlen::series::{decode_size, profile_at};
use std::cmp::Ordering;

pub struct VarlenEntry {
    timestamp: u64,
    size_field: u8,
    profile: Vec<u32>,
    /// Root slice first, then overflow sub-series in order.
    slices: Vec<(ChunkGuard, u32)>,
}

impl VarlenEntry {
    pub(crate) fn new(
        timestamp: u64,
        size_field: u8,
        profile: Vec<u32>,
        slices: Vec<(ChunkGuard, u32)>,
    ) -> Self {
        Self {
            timestamp,
            size_field,
            profile,
            slices,
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Decode the record length from the root slice's size prefix.
    pub fn len(&self) -> Result<u64> {
        let (chunk, index) = &self.slices[0];
        let prefix = chunk.slice_at(*index, 0, self.size_field as u32)?;
        Ok(decode_size(&prefix))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Payload bytes `[start, stop)`, touching only the segments involved.
    fn read_range(&self, start: u64, stop: u64) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity((stop - start) as usize);
        let mut segment_start = 0u64;
        for (segment, (chunk, index)) in self.slices.iter().enumerate() {
            let capacity = profile_at(&self.profile, segment) as u64;
            let segment_stop = segment_start + capacity;
            if segment_stop > start && segment_start < stop {
                let local_start = start.saturating_sub(segment_start) as u32;
                let local_stop = (stop.min(segment_stop) - segment_start) as u32;
                let data_offset = if segment == 0 {
                    self.size_field as u32
                } else {
                    0
                };
                out.extend_from_slice(&chunk.slice_at(
                    *index,
                    data_offset + local_start,
                    data_offset + local_stop,
                )?);
            }
            segment_start = segment_stop;
            if segment_start >= stop {
                break;
            }
        }
        if (out.len() as u64) != stop - start {
            return Err(StrataError::Corruption(format!(
                "varlen record at {} is shorter than its declared length",
                self.timestamp
            )));
        }
        Ok(out)
    }

    /// The whole payload.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let length = self.len()?;
        self.read_range(0, length)
    }

    pub fn slice(&self, start: u64, stop: u64) -> Result<Vec<u8>> {
        let length = self.len()?;
        if start > stop || stop > length {
            return Err(StrataError::InvalidArgument(format!(
                "slice [{start}, {stop}) out of range for record of length {length}"
            )));
        }
        self.read_range(start, stop)
    }

    pub fn byte_at(&self, position: u64) -> Result<u8> {
        let length = self.len()?;
        if position >= length {
            return Err(StrataError::InvalidArgument(format!(
                "byte position {position} out of range for record of length {length}"
            )));
        }
        Ok(self.read_range(position, position + 1)?[0])
    }

    /// Reads only `prefix.len()` bytes.
    pub fn starts_with(&self, prefix: &[u8]) -> Result<bool> {
        let length = self.len()?;
        if (prefix.len() as u64) > length {
            return Ok(false);
        }
        Ok(self.read_range(0, prefix.len() as u64)? == prefix)
    }

    /// Reads only `suffix.len()` bytes.
    pub fn ends_with(&self, suffix: &[u8]) -> Result<bool> {
        let length = self.len()?;
        if (suffix.len() as u64) > length {
            return Ok(false);
        }
        Ok(self.read_range(length - suffix.len() as u64, length)? == suffix)
    }

    pub fn eq_bytes(&self, other: &[u8]) -> Result<bool> {
        if self.len()? != other.len() as u64 {
            return Ok(false);
        }
        Ok(self.to_vec()? == other)
    }

    pub fn cmp_bytes(&self, other: &[u8]) -> Result<Ordering> {
        Ok(self.to_vec()?.as_slice().cmp(other))
    }
}
