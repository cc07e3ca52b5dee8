//! Append/read access for gzip-framed direct chunks.
//!
//! Appends feed a live encoder; a read that follows an unflushed write
//! sync-flushes the encoder, then re-opens a decoder at offset 0 and skips
//! forward. Re-reading from the start on every access is a known cost of the
//! format. Re-opening an existing chunk appends a fresh gzip member, so a
//! chunk file is a concatenation of members and readers always use the
//! multi-member decoder.

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

struct GzState {
    encoder: Option<GzEncoder<File>>,
    needs_flush_before_read: bool,
}

pub struct GzipAccess {
    path: PathBuf,
    level: u32,
    state: Mutex<GzState>,
}

impl GzipAccess {
    /// Create a fresh gzip chunk holding `initial` as its logical contents.
    pub fn create(path: &Path, level: u32, initial: &[u8]) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let mut encoder = GzEncoder::new(file, Compression::new(level));
        encoder.write_all(initial)?;
        Ok(Self {
            path: path.to_path_buf(),
            level,
            state: Mutex::new(GzState {
                encoder: Some(encoder),
                needs_flush_before_read: true,
            }),
        })
    }

    /// Open an existing gzip chunk and return its full logical contents for
    /// the caller to parse. The encoder is started lazily on first append.
    pub fn open(path: &Path, level: u32) -> io::Result<(Self, Vec<u8>)> {
        let mut decoder = MultiGzDecoder::new(File::open(path)?);
        let mut contents = Vec::new();
        decoder.read_to_end(&mut contents)?;
        Ok((
            Self {
                path: path.to_path_buf(),
                level,
                state: Mutex::new(GzState {
                    encoder: None,
                    needs_flush_before_read: false,
                }),
            },
            contents,
        ))
    }

    pub fn append(&self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.encoder.is_none() {
            // New member appended after whatever the file already holds.
            let file = OpenOptions::new().append(true).open(&self.path)?;
            state.encoder = Some(GzEncoder::new(file, Compression::new(self.level)));
        }
        match state.encoder.as_mut() {
            Some(encoder) => encoder.write_all(data)?,
            None => unreachable!(),
        }
        state.needs_flush_before_read = true;
        Ok(())
    }

    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.needs_flush_before_read {
            if let Some(encoder) = state.encoder.as_mut() {
                encoder.flush()?;
            }
            state.needs_flush_before_read = false;
        }
        drop(state);

        let mut decoder = MultiGzDecoder::new(File::open(&self.path)?);
        let skipped = io::copy(&mut std::io::Read::by_ref(&mut decoder).take(offset), &mut io::sink())?;
        if skipped != offset {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        decoder.read_exact(buf)
    }

    /// Finish the current gzip member. Subsequent appends start a new one.
    pub fn finish(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        if let Some(encoder) = state.encoder.take() {
            encoder.finish()?;
        }
        state.needs_flush_before_read = false;
        Ok(())
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        if let Some(encoder) = state.encoder.as_mut() {
            encoder.flush()?;
        }
        state.needs_flush_before_read = false;
        Ok(())
    }

    pub fn compressed_len(&self) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

impl Drop for GzipAccess {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(encoder) = state.encoder.take() {
            let _ = encoder.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_without_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.gz");
        let access = GzipAccess::create(&path, 6, b"hello ").unwrap();
        access.append(b"world").unwrap();

        let mut buf = [0u8; 11];
        access.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello world");

        let mut tail = [0u8; 5];
        access.read_exact_at(6, &mut tail).unwrap();
        assert_eq!(&tail, b"world");
    }

    #[test]
    fn reopen_appends_new_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.gz");
        {
            let access = GzipAccess::create(&path, 6, b"first").unwrap();
            access.finish().unwrap();
        }
        let (access, contents) = GzipAccess::open(&path, 6).unwrap();
        assert_eq!(contents, b"first");

        access.append(b"second").unwrap();
        let mut buf = [0u8; 11];
        access.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"firstsecond");
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.gz");
        let access = GzipAccess::create(&path, 6, b"abc").unwrap();
        let mut buf = [0u8; 4];
        assert!(access.read_exact_at(0, &mut buf).is_err());
        assert!(access.read_exact_at(7, &mut [0u8; 1]).is_err());
    }
}
