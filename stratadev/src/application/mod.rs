pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use strata_core::error::Result;

pub fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init { db } => handlers::handle_init(db),
        Commands::Create {
            db,
            series,
            block_size,
            max_entries,
            page_size,
            gzip_level,
        } => handlers::handle_create(db, series, block_size, max_entries, page_size, gzip_level),
        Commands::CreateVarlen {
            db,
            series,
            size_field,
            profile,
            max_entries,
            page_size,
            gzip_level,
        } => handlers::handle_create_varlen(
            db, series, size_field, profile, max_entries, page_size, gzip_level,
        ),
        Commands::Append {
            db,
            series,
            timestamp,
            payload_hex,
            pad,
        } => handlers::handle_append(db, series, timestamp, payload_hex, pad),
        Commands::Scan {
            db,
            series,
            start,
            stop,
            descriptor_based,
        } => handlers::handle_scan(db, series, start, stop, descriptor_based),
        Commands::Last { db, series } => handlers::handle_last(db, series),
        Commands::Info { db, series } => handlers::handle_info(db, series),
        Commands::Ls { db } => handlers::handle_ls(db),
        Commands::Trim {
            db,
            series,
            timestamp,
        } => handlers::handle_trim(db, series, timestamp),
        Commands::VarlenAppend {
            db,
            series,
            timestamp,
            data,
            hex,
        } => handlers::handle_varlen_append(db, series, timestamp, data, hex),
        Commands::VarlenScan {
            db,
            series,
            start,
            stop,
        } => handlers::handle_varlen_scan(db, series, start, stop),
    }
}
