use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "stratadev CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty database directory
    Init { db: PathBuf },

    /// Create a fixed-length series
    Create {
        db: PathBuf,
        series: String,
        #[arg(long)]
        block_size: u32,
        #[arg(long)]
        max_entries: u32,
        #[arg(long, default_value_t = 4096)]
        page_size: u64,
        /// 0 disables compression; 1-9 store gzip direct chunks
        #[arg(long, default_value_t = 0)]
        gzip_level: u32,
    },

    /// Create a variable-length series
    CreateVarlen {
        db: PathBuf,
        series: String,
        /// Length-prefix width in bytes (1, 2, 3 or 4)
        #[arg(long)]
        size_field: u8,
        /// Comma-separated length profile, e.g. 16,64
        #[arg(long, value_delimiter = ',')]
        profile: Vec<u32>,
        #[arg(long)]
        max_entries: u32,
        #[arg(long, default_value_t = 4096)]
        page_size: u64,
        #[arg(long, default_value_t = 0)]
        gzip_level: u32,
    },

    /// Append one record (payload as hex)
    Append {
        db: PathBuf,
        series: String,
        timestamp: u64,
        payload_hex: String,
        /// Right-pad the payload with zeros to the block size
        #[arg(long)]
        pad: bool,
    },

    /// Print records in a timestamp range as `ts  hex`
    Scan {
        db: PathBuf,
        series: String,
        #[arg(long, default_value_t = 0)]
        start: u64,
        #[arg(long, default_value_t = u64::MAX)]
        stop: u64,
        /// Skip mmap and use descriptor-based file access
        #[arg(long)]
        descriptor_based: bool,
    },

    /// Print the most recent record
    Last { db: PathBuf, series: String },

    /// Print series metadata and its chunk table
    Info { db: PathBuf, series: String },

    /// List fixed-length and varlen series
    Ls { db: PathBuf },

    /// Delete whole chunks older than a timestamp
    Trim {
        db: PathBuf,
        series: String,
        timestamp: u64,
    },

    /// Append one record to a varlen series
    VarlenAppend {
        db: PathBuf,
        series: String,
        timestamp: u64,
        data: String,
        /// Treat `data` as hex instead of UTF-8
        #[arg(long)]
        hex: bool,
    },

    /// Print varlen records in a timestamp range
    VarlenScan {
        db: PathBuf,
        series: String,
        #[arg(long, default_value_t = 0)]
        start: u64,
        #[arg(long, default_value_t = u64::MAX)]
        stop: u64,
    },
}
