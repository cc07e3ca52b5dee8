//! A database is a directory of named series: fixed-length series directly
//! under the root, variable-length series under `varlen/`.

use crate::error::{Result, StrataError};
use crate::meta::codec::{self, MetaCodec};
use crate::meta::schema::DatabaseMeta;
use crate::series::fixed::{CreateOptions, OpenOptions, Series};
use crate::varlen::series::{VarlenCreateOptions, VarlenSeries};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const VARLEN_DIR: &str = "varlen";

/// Names a series can never take: the varlen directory and the two metadata
/// documents.
pub const RESERVED_NAMES: [&str; 3] = [VARLEN_DIR, codec::TEXT_FILE, codec::BINARY_FILE];

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || RESERVED_NAMES.contains(&name)
    {
        return Err(StrataError::InvalidArgument(format!(
            "invalid series name {name:?}"
        )));
    }
    Ok(())
}

pub struct Database {
    path: PathBuf,
    codec: MetaCodec,
    metadata: Mutex<Option<Map<String, Value>>>,
    series: Mutex<HashMap<String, Arc<Series>>>,
    varlen: Mutex<HashMap<String, Arc<VarlenSeries>>>,
}

impl Database {
    /// Create a fresh database directory.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(StrataError::AlreadyExists(path.display().to_string()));
        }
        fs::create_dir_all(path)?;
        fs::create_dir(path.join(VARLEN_DIR))?;
        Ok(Self {
            path: path.to_path_buf(),
            codec: MetaCodec::preferred(),
            metadata: Mutex::new(None),
            series: Mutex::new(HashMap::new()),
            varlen: Mutex::new(HashMap::new()),
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(StrataError::DoesNotExist(path.display().to_string()));
        }
        let (codec, metadata) = match codec::detect(path)? {
            Some(codec) => {
                let doc: DatabaseMeta = codec::read(path, codec)?;
                (codec, doc.metadata)
            }
            None => (MetaCodec::preferred(), None),
        };
        Ok(Self {
            path: path.to_path_buf(),
            codec,
            metadata: Mutex::new(metadata),
            series: Mutex::new(HashMap::new()),
            varlen: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn varlen_root(&self) -> PathBuf {
        self.path.join(VARLEN_DIR)
    }

    pub fn create_series(&self, name: &str, options: &CreateOptions) -> Result<Arc<Series>> {
        validate_name(name)?;
        let mut open = self.series.lock();
        if open.contains_key(name) {
            return Err(StrataError::AlreadyExists(name.to_string()));
        }
        let series = Arc::new(Series::create(&self.path.join(name), options)?);
        open.insert(name.to_string(), Arc::clone(&series));
        Ok(series)
    }

    /// Open a series by name, reusing the cached handle if one exists.
    pub fn open_series(&self, name: &str, options: OpenOptions) -> Result<Arc<Series>> {
        validate_name(name)?;
        let mut open = self.series.lock();
        if let Some(series) = open.get(name) {
            if !series.is_closed() {
                return Ok(Arc::clone(series));
            }
        }
        let series = Arc::new(Series::open(&self.path.join(name), options)?);
        open.insert(name.to_string(), Arc::clone(&series));
        Ok(series)
    }

    pub fn create_varlen_series(
        &self,
        name: &str,
        options: &VarlenCreateOptions,
    ) -> Result<Arc<VarlenSeries>> {
        validate_name(name)?;
        let mut open = self.varlen.lock();
        if open.contains_key(name) {
            return Err(StrataError::AlreadyExists(name.to_string()));
        }
        let series = Arc::new(VarlenSeries::create(&self.varlen_root().join(name), options)?);
        open.insert(name.to_string(), Arc::clone(&series));
        Ok(series)
    }

    pub fn open_varlen_series(
        &self,
        name: &str,
        options: OpenOptions,
    ) -> Result<Arc<VarlenSeries>> {
        validate_name(name)?;
        let mut open = self.varlen.lock();
        if let Some(series) = open.get(name) {
            if !series.is_closed() {
                return Ok(Arc::clone(series));
            }
        }
        let series = Arc::new(VarlenSeries::open(&self.varlen_root().join(name), options)?);
        open.insert(name.to_string(), Arc::clone(&series));
        Ok(series)
    }

    fn list_dirs(path: &Path, skip_reserved: bool) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !path.is_dir() {
            return Ok(names);
        }
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if skip_reserved && RESERVED_NAMES.contains(&name.as_str()) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    pub fn series_names(&self) -> Result<Vec<String>> {
        Self::list_dirs(&self.path, true)
    }

    pub fn varlen_names(&self) -> Result<Vec<String>> {
        Self::list_dirs(&self.varlen_root(), false)
    }

    pub fn delete_series(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let handle = self.series.lock().remove(name);
        match handle {
            Some(series) => series.delete(),
            None => {
                let dir = self.path.join(name);
                if !dir.is_dir() {
                    return Err(StrataError::DoesNotExist(name.to_string()));
                }
                fs::remove_dir_all(dir)?;
                Ok(())
            }
        }
    }

    pub fn delete_varlen_series(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let handle = self.varlen.lock().remove(name);
        match handle {
            Some(series) => series.delete(),
            None => {
                let dir = self.varlen_root().join(name);
                if !dir.is_dir() {
                    return Err(StrataError::DoesNotExist(name.to_string()));
                }
                fs::remove_dir_all(dir)?;
                Ok(())
            }
        }
    }

    pub fn metadata(&self) -> Option<Map<String, Value>> {
        self.metadata.lock().clone()
    }

    pub fn set_metadata(&self, metadata: Option<Map<String, Value>>) -> Result<()> {
        let mut held = self.metadata.lock();
        *held = metadata;
        codec::write(
            &self.path,
            self.codec,
            &DatabaseMeta {
                metadata: held.clone(),
            },
        )
    }

    /// Persist metadata on every open series.
    pub fn sync(&self) -> Result<()> {
        for series in self.series.lock().values() {
            if !series.is_closed() {
                series.sync()?;
            }
        }
        for series in self.varlen.lock().values() {
            if !series.is_closed() {
                series.sync()?;
            }
        }
        Ok(())
    }

    /// Low-memory hook: evict every unreferenced cached chunk across all
    /// open series. Returns how many chunks were dropped.
    pub fn release_cached_chunks(&self) -> usize {
        let mut dropped = 0;
        for series in self.series.lock().values() {
            if !series.is_closed() {
                dropped += series.close_chunks();
            }
        }
        for series in self.varlen.lock().values() {
            dropped += series.close_chunks();
        }
        if dropped > 0 {
            debug!(dropped, "released cached chunks under memory pressure");
        }
        dropped
    }

    /// Total on-disk bytes of mmap-backed open chunks across all series.
    pub fn open_chunks_mmap_size(&self) -> u64 {
        let mut total = 0;
        for series in self.series.lock().values() {
            total += series.open_chunks_mmap_size();
        }
        for series in self.varlen.lock().values() {
            total += series.open_chunks_mmap_size();
        }
        total
    }

    /// Close every open series handle.
    pub fn close(&self, force: bool) -> Result<()> {
        let mut series = self.series.lock();
        for handle in series.values() {
            handle.close(force)?;
        }
        series.clear();
        let mut varlen = self.varlen.lock();
        for handle in varlen.values() {
            handle.close(force)?;
        }
        varlen.clear();
        Ok(())
    }
}
