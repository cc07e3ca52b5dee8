use strata_core::database::Database;
use strata_core::error::StrataError;
use strata_core::meta::codec::{self, MetaCodec};
use strata_core::meta::schema::SeriesMeta;
use strata_core::series::fixed::{CreateOptions, OpenOptions, Series};
use strata_core::varlen::series::VarlenCreateOptions;
use serde_json::{Map, Value};

#[test]
fn create_open_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("db");

    let db = Database::create(&root).unwrap();
    assert!(root.join("varlen").is_dir());
    assert!(matches!(
        Database::create(&root),
        Err(StrataError::AlreadyExists(_))
    ));
    drop(db);

    Database::open(&root).unwrap();
    assert!(matches!(
        Database::open(&dir.path().join("missing")),
        Err(StrataError::DoesNotExist(_))
    ));
}

#[test]
fn series_multiplexing() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::create(&dir.path().join("db")).unwrap();

    let temps = db
        .create_series("temperature", &CreateOptions::new(8, 100))
        .unwrap();
    let humid = db
        .create_series("humidity", &CreateOptions::new(4, 100))
        .unwrap();
    temps.append(1, &[0u8; 8]).unwrap();
    humid.append(1, &[0u8; 4]).unwrap();

    assert!(matches!(
        db.create_series("temperature", &CreateOptions::new(8, 100)),
        Err(StrataError::AlreadyExists(_))
    ));

    // The open-handle cache returns the same series object.
    let again = db.open_series("temperature", OpenOptions::default()).unwrap();
    assert_eq!(again.last_entry_ts(), 1);

    assert_eq!(
        db.series_names().unwrap(),
        vec!["humidity".to_string(), "temperature".to_string()]
    );

    db.delete_series("humidity").unwrap();
    assert_eq!(db.series_names().unwrap(), vec!["temperature".to_string()]);
    assert!(matches!(
        db.delete_series("humidity"),
        Err(StrataError::DoesNotExist(_))
    ));
}

#[test]
fn reserved_and_bad_names_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::create(&dir.path().join("db")).unwrap();
    for name in ["varlen", "metadata", "metadata.cbor", "", "a/b", ".hidden"] {
        assert!(matches!(
            db.create_series(name, &CreateOptions::new(4, 10)),
            Err(StrataError::InvalidArgument(_))
        ));
    }
}

#[test]
fn varlen_series_under_varlen_dir() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("db");
    {
        let db = Database::create(&root).unwrap();
        let events = db
            .create_varlen_series("events", &VarlenCreateOptions::new(2, vec![16, 64], 100))
            .unwrap();
        events.append(10, b"boot").unwrap();
        events.append(20, b"uplink established, draining buffer").unwrap();
        assert_eq!(db.varlen_names().unwrap(), vec!["events".to_string()]);
        db.close(false).unwrap();
    }

    let db = Database::open(&root).unwrap();
    let events = db.open_varlen_series("events", OpenOptions::default()).unwrap();
    assert!(
        events
            .get(20)
            .unwrap()
            .unwrap()
            .eq_bytes(b"uplink established, draining buffer")
            .unwrap()
    );
    db.delete_varlen_series("events").unwrap();
    assert!(db.varlen_names().unwrap().is_empty());
}

#[test]
fn database_metadata_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("db");
    {
        let db = Database::create(&root).unwrap();
        let mut map = Map::new();
        map.insert("device".to_string(), Value::String("probe-7".to_string()));
        db.set_metadata(Some(map)).unwrap();
    }
    // Fresh documents prefer the compact codec.
    assert!(root.join("metadata.cbor").is_file());
    assert!(!root.join("metadata").is_file());

    let db = Database::open(&root).unwrap();
    let map = db.metadata().unwrap();
    assert_eq!(map.get("device"), Some(&Value::String("probe-7".into())));
}

#[test]
fn series_keeps_existing_text_codec() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s");
    std::fs::create_dir(&path).unwrap();
    let doc = SeriesMeta {
        block_size: 4,
        max_entries_per_chunk: 10,
        last_entry_synced: 0,
        page_size: 4096,
        metadata: None,
        gzip_level: None,
        size_field: None,
        length_profile: None,
    };
    codec::write(&path, MetaCodec::Json, &doc).unwrap();

    let series = Series::open(&path, OpenOptions::default()).unwrap();
    series.append(1, &[0u8; 4]).unwrap();
    series.mark_synced_up_to(1).unwrap();
    series.close(false).unwrap();

    // Writes stayed on the textual codec; no binary sibling appeared.
    assert!(path.join("metadata").is_file());
    assert!(!path.join("metadata.cbor").is_file());
    let reread: SeriesMeta = codec::read(&path, MetaCodec::Json).unwrap();
    assert_eq!(reread.last_entry_synced, 1);
}

#[test]
fn both_metadata_documents_is_environment_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s");
    std::fs::create_dir(&path).unwrap();
    let doc = SeriesMeta {
        block_size: 4,
        max_entries_per_chunk: 10,
        last_entry_synced: 0,
        page_size: 4096,
        metadata: None,
        gzip_level: None,
        size_field: None,
        length_profile: None,
    };
    codec::write(&path, MetaCodec::Json, &doc).unwrap();
    codec::write(&path, MetaCodec::Cbor, &doc).unwrap();
    assert!(matches!(
        Series::open(&path, OpenOptions::default()),
        Err(StrataError::Environment(_))
    ));
}

#[test]
fn pressure_hook_releases_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::create(&dir.path().join("db")).unwrap();
    let series = db
        .create_series("telemetry", &CreateOptions::new(4, 2))
        .unwrap();
    for ts in 1..=6u64 {
        series.append(ts, &[ts as u8; 4]).unwrap();
    }
    // Pull every chunk into the cache.
    let all: Vec<_> = series
        .iterate_range(0, u64::MAX)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(all.len(), 6);
    assert_eq!(series.open_chunk_count(), 3);
    assert!(db.open_chunks_mmap_size() > 0);

    // Two of the three cached chunks are unreferenced; the last one stays.
    assert_eq!(db.release_cached_chunks(), 2);
    assert_eq!(series.open_chunk_count(), 1);

    // Evicted chunks reopen transparently on the next scan.
    let again: Vec<_> = series
        .iterate_range(0, u64::MAX)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(again, all);
}

#[test]
fn close_fans_out() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::create(&dir.path().join("db")).unwrap();
    let series = db
        .create_series("telemetry", &CreateOptions::new(4, 10))
        .unwrap();
    series.append(1, &[0u8; 4]).unwrap();
    db.sync().unwrap();
    db.close(false).unwrap();
    assert!(series.is_closed());
}
