//! Two interchangeable on-disk codecs for metadata documents: a textual JSON
//! file named `metadata` and a compact CBOR file named `metadata.cbor`.
//!
//! Open reads whichever is present; writes go to the file that already
//! exists; fresh directories get the compact form.

use crate::error::{Result, StrataError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub const TEXT_FILE: &str = "metadata";
pub const BINARY_FILE: &str = "metadata.cbor";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MetaCodec {
    Json,
    Cbor,
}

impl MetaCodec {
    pub fn file_name(self) -> &'static str {
        match self {
            MetaCodec::Json => TEXT_FILE,
            MetaCodec::Cbor => BINARY_FILE,
        }
    }

    /// Codec used for documents that do not exist yet.
    pub fn preferred() -> Self {
        MetaCodec::Cbor
    }
}

/// Detect which codec a directory uses. `None` means no document present.
pub fn detect(dir: &Path) -> Result<Option<MetaCodec>> {
    let text = dir.join(TEXT_FILE).is_file();
    let binary = dir.join(BINARY_FILE).is_file();
    match (text, binary) {
        (true, true) => Err(StrataError::Environment(format!(
            "both {} and {} present in {}",
            TEXT_FILE,
            BINARY_FILE,
            dir.display()
        ))),
        (true, false) => Ok(Some(MetaCodec::Json)),
        (false, true) => Ok(Some(MetaCodec::Cbor)),
        (false, false) => Ok(None),
    }
}

pub fn read<T: DeserializeOwned>(dir: &Path, codec: MetaCodec) -> Result<T> {
    let path = dir.join(codec.file_name());
    let file = File::open(&path)?;
    match codec {
        MetaCodec::Json => serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            StrataError::Corruption(format!("unreadable metadata {}: {}", path.display(), e))
        }),
        MetaCodec::Cbor => ciborium::de::from_reader(BufReader::new(file)).map_err(|e| {
            StrataError::Corruption(format!("unreadable metadata {}: {}", path.display(), e))
        }),
    }
}

pub fn write<T: Serialize>(dir: &Path, codec: MetaCodec, doc: &T) -> Result<()> {
    let path = dir.join(codec.file_name());
    let mut out = BufWriter::new(File::create(&path)?);
    match codec {
        MetaCodec::Json => serde_json::to_writer_pretty(&mut out, doc).map_err(|e| {
            StrataError::Corruption(format!("cannot encode metadata {}: {}", path.display(), e))
        })?,
        MetaCodec::Cbor => ciborium::ser::into_writer(doc, &mut out).map_err(|e| {
            StrataError::Corruption(format!("cannot encode metadata {}: {}", path.display(), e))
        })?,
    }
    out.flush()?;
    Ok(())
}
