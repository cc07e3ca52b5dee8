//! Byte-range access to a chunk file: memory-mapped where possible, with
//! transparent degradation to descriptor-based seek+read/write.

use memmap2::MmapMut;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::debug;

// Raw errno values for mapping failures we recover from by falling back to
// descriptor access: ENOMEM, EAGAIN, ENODEV, ENFILE, EMFILE.
const RECOVERABLE_ERRNOS: [i32; 5] = [12, 11, 19, 23, 24];

fn is_recoverable_map_error(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::OutOfMemory | io::ErrorKind::Unsupported
    ) {
        return true;
    }
    matches!(e.raw_os_error(), Some(code) if RECOVERABLE_ERRNOS.contains(&code))
}

enum Mode {
    Mapped(MmapMut),
    /// The lock serializes seek+read/seek+write pairs on the shared
    /// descriptor; the mapped variant needs no lock for reads.
    Descriptor(Mutex<()>),
}

pub struct Access {
    file: File,
    len: u64,
    mode: Mode,
}

impl Access {
    /// Open access over `file`. Unless `descriptor_based` is requested, try
    /// to map it read/write; a recoverable mapping failure silently falls
    /// back to descriptor access, anything else is fatal.
    pub fn open(file: File, descriptor_based: bool) -> io::Result<Self> {
        let len = file.metadata()?.len();
        if descriptor_based {
            return Ok(Self {
                file,
                len,
                mode: Mode::Descriptor(Mutex::new(())),
            });
        }
        // SAFETY: the series layer is the only writer and appends are
        // monotonic; the file is never truncated while mapped.
        match unsafe { MmapMut::map_mut(&file) } {
            Ok(map) => Ok(Self {
                file,
                len,
                mode: Mode::Mapped(map),
            }),
            Err(e) if is_recoverable_map_error(&e) => {
                debug!(error = %e, "mmap unavailable, using descriptor access");
                Ok(Self {
                    file,
                    len,
                    mode: Mode::Descriptor(Mutex::new(())),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.mode, Mode::Mapped(_))
    }

    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let end = offset + buf.len() as u64;
        if end > self.len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        match &self.mode {
            Mode::Mapped(map) => {
                buf.copy_from_slice(&map[offset as usize..end as usize]);
                Ok(())
            }
            Mode::Descriptor(lock) => {
                let _held = lock.lock();
                let mut f = &self.file;
                f.seek(SeekFrom::Start(offset))?;
                f.read_exact(buf)
            }
        }
    }

    pub fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let end = offset + buf.len() as u64;
        if end > self.len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        match &mut self.mode {
            Mode::Mapped(map) => {
                map[offset as usize..end as usize].copy_from_slice(buf);
                Ok(())
            }
            Mode::Descriptor(lock) => {
                let _held = lock.lock();
                let mut f = &self.file;
                f.seek(SeekFrom::Start(offset))?;
                f.write_all(buf)
            }
        }
    }

    /// Grow the file to `new_len`. In mapped mode the mapping is rebuilt; if
    /// rebuilding hits a recoverable error the access object stays in
    /// descriptor mode and the write path carries on.
    pub fn resize(&mut self, new_len: u64) -> io::Result<()> {
        let was_mapped = self.is_mapped();
        if was_mapped {
            // Unmap before changing the file length.
            self.mode = Mode::Descriptor(Mutex::new(()));
        }
        self.file.set_len(new_len)?;
        self.len = new_len;
        if was_mapped {
            self.switch_to_mmap()?;
        }
        Ok(())
    }

    pub fn switch_to_descriptor(&mut self) {
        if self.is_mapped() {
            self.mode = Mode::Descriptor(Mutex::new(()));
        }
    }

    /// No-op when a recoverable mapping error recurs; fatal otherwise.
    pub fn switch_to_mmap(&mut self) -> io::Result<()> {
        if self.is_mapped() {
            return Ok(());
        }
        // SAFETY: see `open`.
        match unsafe { MmapMut::map_mut(&self.file) } {
            Ok(map) => {
                self.mode = Mode::Mapped(map);
                Ok(())
            }
            Err(e) if is_recoverable_map_error(&e) => {
                debug!(error = %e, "remap failed, staying on descriptor access");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        match &self.mode {
            Mode::Mapped(map) => map.flush(),
            Mode::Descriptor(_) => self.file.sync_data(),
        }
    }
}
