use std::path::PathBuf;

use strata_core::database::Database;
use strata_core::error::{Result, StrataError};
use strata_core::series::fixed::{CreateOptions, OpenOptions};
use strata_core::varlen::series::VarlenCreateOptions;
use strata_core::ChunkKind;

fn parse_payload(payload_hex: &str) -> Result<Vec<u8>> {
    hex::decode(payload_hex.trim())
        .map_err(|e| StrataError::InvalidArgument(format!("invalid hex payload: {e}")))
}

fn kind_label(kind: ChunkKind) -> &'static str {
    match kind {
        ChunkKind::Normal => "normal",
        ChunkKind::Direct => "direct",
        ChunkKind::DirectGzip => "gzip",
    }
}

pub fn handle_init(db: PathBuf) -> Result<()> {
    Database::create(&db)?;
    eprintln!("init: created {}", db.display());
    Ok(())
}

pub fn handle_create(
    db: PathBuf,
    series: String,
    block_size: u32,
    max_entries: u32,
    page_size: u64,
    gzip_level: u32,
) -> Result<()> {
    let db = Database::open(&db)?;
    let mut options = CreateOptions::new(block_size, max_entries);
    options.page_size = page_size;
    options.gzip_level = gzip_level;
    db.create_series(&series, &options)?;
    eprintln!("create: {series} (block_size={block_size})");
    Ok(())
}

pub fn handle_create_varlen(
    db: PathBuf,
    series: String,
    size_field: u8,
    profile: Vec<u32>,
    max_entries: u32,
    page_size: u64,
    gzip_level: u32,
) -> Result<()> {
    let db = Database::open(&db)?;
    let mut options = VarlenCreateOptions::new(size_field, profile, max_entries);
    options.page_size = page_size;
    options.gzip_level = gzip_level;
    db.create_varlen_series(&series, &options)?;
    eprintln!("create-varlen: {series} (size_field={size_field})");
    Ok(())
}

pub fn handle_append(
    db: PathBuf,
    series: String,
    timestamp: u64,
    payload_hex: String,
    pad: bool,
) -> Result<()> {
    let payload = parse_payload(&payload_hex)?;
    let db = Database::open(&db)?;
    let series = db.open_series(&series, OpenOptions::default())?;
    if pad {
        series.append_padded(timestamp, &payload)?;
    } else {
        series.append(timestamp, &payload)?;
    }
    series.sync()?;
    Ok(())
}

pub fn handle_scan(
    db: PathBuf,
    series: String,
    start: u64,
    stop: u64,
    descriptor_based: bool,
) -> Result<()> {
    let db = Database::open(&db)?;
    let series = db.open_series(&series, OpenOptions { descriptor_based })?;
    for piece in series.iterate_range(start, stop)? {
        let (timestamp, payload) = piece?;
        println!("{timestamp}  {}", hex::encode(payload));
    }
    Ok(())
}

pub fn handle_last(db: PathBuf, series: String) -> Result<()> {
    let db = Database::open(&db)?;
    let series = db.open_series(&series, OpenOptions::default())?;
    let (timestamp, payload) = series.get_current_value()?;
    println!("{timestamp}  {}", hex::encode(payload));
    Ok(())
}

pub fn handle_info(db: PathBuf, series: String) -> Result<()> {
    let db = Database::open(&db)?;
    let series = db.open_series(&series, OpenOptions::default())?;
    println!("series:          {}", series.name());
    println!("block_size:      {}", series.block_size());
    println!("max_entries:     {}", series.max_entries_per_chunk());
    println!("page_size:       {}", series.page_size());
    println!("gzip_level:      {}", series.gzip_level());
    println!("last_entry_ts:   {}", series.last_entry_ts());
    println!("last_synced:     {}", series.last_entry_synced());
    let chunks = series.chunk_list();
    println!("chunks:          {}", chunks.len());
    for (name, kind) in chunks {
        let file = series.path().join(kind.file_name(name));
        let size = std::fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
        println!("  {name:<20} {:<7} {size} bytes", kind_label(kind));
    }
    Ok(())
}

pub fn handle_ls(db: PathBuf) -> Result<()> {
    let db = Database::open(&db)?;
    for name in db.series_names()? {
        println!("{name}");
    }
    for name in db.varlen_names()? {
        println!("varlen/{name}");
    }
    Ok(())
}

pub fn handle_trim(db: PathBuf, series: String, timestamp: u64) -> Result<()> {
    let db = Database::open(&db)?;
    let series = db.open_series(&series, OpenOptions::default())?;
    let removed = series.trim(timestamp)?;
    eprintln!("trim: removed {removed} chunks");
    Ok(())
}

pub fn handle_varlen_append(
    db: PathBuf,
    series: String,
    timestamp: u64,
    data: String,
    is_hex: bool,
) -> Result<()> {
    let payload = if is_hex {
        parse_payload(&data)?
    } else {
        data.into_bytes()
    };
    let db = Database::open(&db)?;
    let series = db.open_varlen_series(&series, OpenOptions::default())?;
    series.append(timestamp, &payload)?;
    series.sync()?;
    Ok(())
}

pub fn handle_varlen_scan(db: PathBuf, series: String, start: u64, stop: u64) -> Result<()> {
    let db = Database::open(&db)?;
    let series = db.open_varlen_series(&series, OpenOptions::default())?;
    let mut iter = series.iterate_range(start, stop)?;
    while let Some(entry) = iter.next_item()? {
        println!("{}  {}", entry.timestamp(), hex::encode(entry.to_vec()?));
    }
    Ok(())
}
