//! Embedded append-only time-series store for devices that buffer telemetry
//! locally before uplink. A database is a directory of series; each series
//! maps strictly increasing u64 timestamps to fixed-size records persisted in
//! page-aligned chunk files, accessed through mmap where possible. Varlen
//! series compose several fixed-length series to hold records of variable
//! length.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;

pub mod util {
    pub mod bytes;
}

pub mod meta {
    pub mod codec;
    pub mod schema;
}

pub mod chunk {
    pub mod access;
    pub mod gzio;
    pub mod store;
}

pub mod series {
    pub mod cache;
    pub mod fixed;
    pub mod iter;
}

pub mod varlen {
    pub mod entry;
    pub mod iter;
    pub mod series;
}

pub mod database;

pub use crate::error::{Result, StrataError};

pub use chunk::store::{Chunk, ChunkKind};

pub use series::fixed::{CreateOptions, DEFAULT_PAGE_SIZE, OpenOptions, Series};
pub use series::iter::RangeIter;

pub use varlen::entry::VarlenEntry;
pub use varlen::iter::VarlenIter;
pub use varlen::series::{VarlenCreateOptions, VarlenSeries};

pub use database::Database;

pub mod prelude {
    pub use crate::Result;
    pub use crate::database::Database;
    pub use crate::series::fixed::{CreateOptions, OpenOptions, Series};
    pub use crate::varlen::series::{VarlenCreateOptions, VarlenSeries};
}
