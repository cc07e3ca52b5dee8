//! Range iteration across chunk boundaries.
//!
//! The iterator owns a queue of referenced chunks. Entering a chunk sets the
//! cursor window: the first chunk bisects the lower bound, the last chunk
//! bisects the upper bound, middle chunks yield every record.

use crate::error::Result;
use crate::series::cache::ChunkGuard;
use std::collections::VecDeque;
use tracing::debug;

pub struct RangeIter {
    start: u64,
    stop: u64,
    queue: VecDeque<ChunkGuard>,
    current: Option<ChunkGuard>,
    pos: u32,
    limit: u32,
    is_first: bool,
}

impl RangeIter {
    pub(crate) fn new(start: u64, stop: u64, queue: VecDeque<ChunkGuard>) -> Self {
        Self {
            start,
            stop,
            queue,
            current: None,
            pos: 0,
            limit: 0,
            is_first: true,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(0, 0, VecDeque::new())
    }

    /// Move to the next queued chunk; false when the queue is exhausted.
    fn enter_next_chunk(&mut self) -> Result<bool> {
        self.current = None;
        let Some(next) = self.queue.pop_front() else {
            return Ok(false);
        };
        let is_last = self.queue.is_empty();
        self.pos = if self.is_first {
            next.find_left(self.start)?
        } else {
            0
        };
        self.limit = if is_last {
            next.find_right(self.stop)?
        } else {
            next.entries()
        };
        self.is_first = false;
        self.current = Some(next);
        Ok(true)
    }

    pub fn next_entry(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        loop {
            if self.current.is_none() || self.pos >= self.limit {
                if !self.enter_next_chunk()? {
                    return Ok(None);
                }
                continue;
            }
            let Some(chunk) = self.current.as_ref() else {
                return Ok(None);
            };
            let piece = chunk.piece_at(self.pos)?;
            self.pos += 1;
            return Ok(Some(piece));
        }
    }

    /// Like [`next_entry`](Self::next_entry) but yields the position instead
    /// of the payload: `(timestamp, index_within_chunk, chunk)`. Used by the
    /// varlen joiner, which reads payload slices lazily.
    pub(crate) fn next_pos(&mut self) -> Result<Option<(u64, u32, ChunkGuard)>> {
        loop {
            if self.current.is_none() || self.pos >= self.limit {
                if !self.enter_next_chunk()? {
                    return Ok(None);
                }
                continue;
            }
            let Some(chunk) = self.current.as_ref() else {
                return Ok(None);
            };
            let timestamp = chunk.timestamp_at(self.pos)?;
            let position = (timestamp, self.pos, chunk.clone());
            self.pos += 1;
            return Ok(Some(position));
        }
    }

    /// Release all remaining chunk references.
    pub fn close(self) {}
}

impl Iterator for RangeIter {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl Drop for RangeIter {
    fn drop(&mut self) {
        let pending = self.queue.len() + usize::from(self.current.is_some());
        if pending > 0 {
            debug!(pending, "range iterator released with chunks still queued");
        }
    }
}
