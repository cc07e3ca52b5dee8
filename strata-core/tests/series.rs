use strata_core::error::StrataError;
use strata_core::series::fixed::{CreateOptions, OpenOptions, Series};
use strata_core::util::bytes::u32_le;
use std::path::PathBuf;

fn series_dir(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn options(block_size: u32, max_entries: u32) -> CreateOptions {
    CreateOptions::new(block_size, max_entries)
}

#[test]
fn create_append_read() {
    let dir = tempfile::tempdir().unwrap();
    let series = Series::create(&series_dir(&dir, "s"), &options(4, 10)).unwrap();

    series.append(100, &[0x01, 0x02, 0x03, 0x04]).unwrap();
    series.append(200, &[0x05, 0x06, 0x07, 0x08]).unwrap();
    series.append(300, &[0x09, 0x0A, 0x0B, 0x0C]).unwrap();

    let all: Vec<_> = series
        .iterate_range(0, 1000)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        all,
        vec![
            (100, vec![0x01, 0x02, 0x03, 0x04]),
            (200, vec![0x05, 0x06, 0x07, 0x08]),
            (300, vec![0x09, 0x0A, 0x0B, 0x0C]),
        ]
    );

    let middle: Vec<_> = series
        .iterate_range(150, 250)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(middle, vec![(200, vec![0x05, 0x06, 0x07, 0x08])]);

    assert_eq!(
        series.get_current_value().unwrap(),
        (300, vec![0x09, 0x0A, 0x0B, 0x0C])
    );
}

#[test]
fn rollover_at_max_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = series_dir(&dir, "s");
    let series = Series::create(&path, &options(4, 10)).unwrap();

    for ts in 1..=11u64 {
        series.append(ts, &[0u8; 4]).unwrap();
    }

    let chunks = series.chunk_list();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].0, 1);
    assert_eq!(chunks[1].0, 11);
    assert_eq!(series.last_entry_ts(), 11);
    assert!(path.join("1").is_file());
    assert!(path.join("11").is_file());

    // The rolled-over chunk stays readable.
    let old: Vec<_> = series
        .iterate_range(1, 10)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(old.len(), 10);
    assert_eq!(old[9].0, 10);
}

#[test]
fn range_clamps_to_stored_data() {
    let dir = tempfile::tempdir().unwrap();
    let series = Series::create(&series_dir(&dir, "s"), &options(4, 10)).unwrap();
    for ts in 1..=11u64 {
        series.append(ts, &[0u8; 4]).unwrap();
    }

    let clamped: Vec<_> = series
        .iterate_range(5, 20)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let timestamps: Vec<u64> = clamped.iter().map(|(ts, _)| *ts).collect();
    assert_eq!(timestamps, vec![5, 6, 7, 8, 9, 10, 11]);
}

#[test]
fn iterator_references_block_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let series = Series::create(&series_dir(&dir, "s"), &options(4, 10)).unwrap();
    for ts in 1..=11u64 {
        series.append(ts, &[0u8; 4]).unwrap();
    }

    let mut iter = series.iterate_range(0, 1 << 63).unwrap();
    assert_eq!(series.open_chunk_count(), 2);

    // Chunks under iteration must survive eviction.
    assert_eq!(series.close_chunks(), 0);
    assert_eq!(series.open_chunk_count(), 2);

    // Drain a little to make sure the iterator still works afterwards.
    assert_eq!(iter.next_entry().unwrap(), Some((1, vec![0u8; 4])));
    drop(iter);

    // Now only the last chunk survives.
    assert_eq!(series.close_chunks(), 1);
    assert_eq!(series.open_chunk_count(), 1);
}

#[test]
fn truncated_footer_fails_then_restored_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = series_dir(&dir, "s");
    {
        let series = Series::create(&path, &options(4, 10)).unwrap();
        series.append(100, &[1u8; 4]).unwrap();
        series.append(200, &[2u8; 4]).unwrap();
        series.close(false).unwrap();
    }

    let chunk_path = path.join("100");
    let original = std::fs::read(&chunk_path).unwrap();
    assert_eq!(u32_le(&original[original.len() - 4..]), 2);

    std::fs::write(&chunk_path, &original[..original.len() - 4]).unwrap();
    assert!(matches!(
        Series::open(&path, OpenOptions::default()),
        Err(StrataError::Corruption(_))
    ));

    std::fs::write(&chunk_path, &original).unwrap();
    let series = Series::open(&path, OpenOptions::default()).unwrap();
    assert_eq!(series.get_current_value().unwrap(), (200, vec![2u8; 4]));
}

#[test]
fn reopen_preserves_records_across_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let path = series_dir(&dir, "s");
    {
        let series = Series::create(&path, &options(8, 5)).unwrap();
        for ts in (10..=170u64).step_by(10) {
            series.append(ts, &ts.to_le_bytes()).unwrap();
        }
        series.close(false).unwrap();
    }

    let series = Series::open(&path, OpenOptions::default()).unwrap();
    assert_eq!(series.last_entry_ts(), 170);
    let all: Vec<_> = series
        .iterate_range(0, u64::MAX)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(all.len(), 17);
    for (i, (ts, payload)) in all.iter().enumerate() {
        assert_eq!(*ts, (i as u64 + 1) * 10);
        assert_eq!(payload, &ts.to_le_bytes());
    }

    // Adjacent chunks never overlap in time.
    let chunks = series.chunk_list();
    assert!(chunks.windows(2).all(|pair| pair[0].0 < pair[1].0));
}

#[test]
fn append_contract_violations() {
    let dir = tempfile::tempdir().unwrap();
    let series = Series::create(&series_dir(&dir, "s"), &options(4, 10)).unwrap();
    series.append(100, &[0u8; 4]).unwrap();

    assert!(matches!(
        series.append(100, &[0u8; 4]),
        Err(StrataError::InvalidArgument(_))
    ));
    assert!(matches!(
        series.append(50, &[0u8; 4]),
        Err(StrataError::InvalidArgument(_))
    ));
    assert!(matches!(
        series.append(200, &[0u8; 3]),
        Err(StrataError::InvalidArgument(_))
    ));
    assert!(matches!(
        series.iterate_range(10, 5),
        Err(StrataError::InvalidArgument(_))
    ));

    series.close(false).unwrap();
    assert!(matches!(
        series.append(200, &[0u8; 4]),
        Err(StrataError::InvalidState(_))
    ));
}

#[test]
fn append_padded_fills_block() {
    let dir = tempfile::tempdir().unwrap();
    let series = Series::create(&series_dir(&dir, "s"), &options(6, 10)).unwrap();
    series.append_padded(1, b"abc").unwrap();
    series.append_padded(2, b"defghi").unwrap();
    assert!(matches!(
        series.append_padded(3, b"toolarge"),
        Err(StrataError::InvalidArgument(_))
    ));

    let all: Vec<_> = series
        .iterate_range(0, 10)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(all[0].1, b"abc\0\0\0");
    assert_eq!(all[1].1, b"defghi");
}

#[test]
fn trim_deletes_whole_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let path = series_dir(&dir, "s");
    let series = Series::create(&path, &options(4, 2)).unwrap();
    for ts in 1..=7u64 {
        series.append(ts, &[ts as u8; 4]).unwrap();
    }
    // Chunks: 1, 3, 5, 7.
    assert_eq!(series.chunk_list().len(), 4);

    assert_eq!(series.trim(6).unwrap(), 2);
    let chunks = series.chunk_list();
    assert_eq!(chunks.iter().map(|c| c.0).collect::<Vec<_>>(), vec![5, 7]);
    assert!(!path.join("1").exists());
    assert!(!path.join("3").exists());

    // Survivors still readable from their first timestamp.
    let rest: Vec<_> = series
        .iterate_range(0, 100)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rest.first().map(|(ts, _)| *ts), Some(5));

    // A referenced head chunk stops the trim.
    let iter = series.iterate_range(5, 6).unwrap();
    assert_eq!(series.trim(100).unwrap(), 0);
    drop(iter);
    assert_eq!(series.trim(100).unwrap(), 1);
    assert_eq!(series.chunk_list().len(), 1);
}

#[test]
fn close_refuses_with_live_iterator() {
    let dir = tempfile::tempdir().unwrap();
    let series = Series::create(&series_dir(&dir, "s"), &options(4, 10)).unwrap();
    series.append(1, &[0u8; 4]).unwrap();

    let iter = series.iterate_range(0, 10).unwrap();
    assert!(matches!(
        series.close(false),
        Err(StrataError::StillOpen(_))
    ));
    drop(iter);
    series.close(false).unwrap();
    // Idempotent.
    series.close(false).unwrap();
}

#[test]
fn sync_persists_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let path = series_dir(&dir, "s");
    {
        let series = Series::create(&path, &options(4, 10)).unwrap();
        series.append(10, &[0u8; 4]).unwrap();
        series.append(20, &[0u8; 4]).unwrap();
        series.mark_synced_up_to(10).unwrap();
        series.sync().unwrap();
    }
    let series = Series::open(&path, OpenOptions::default()).unwrap();
    assert_eq!(series.last_entry_synced(), 10);
    assert_eq!(series.last_entry_ts(), 20);
}

#[test]
fn gzip_series_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = series_dir(&dir, "s");
    {
        let mut create = options(16, 3);
        create.gzip_level = 6;
        let series = Series::create(&path, &create).unwrap();
        for ts in 1..=7u64 {
            series.append(ts, &[ts as u8; 16]).unwrap();
        }
        assert!(path.join("1.gz").is_file());
        assert!(path.join("4.gz").is_file());
        assert!(path.join("7.gz").is_file());
        series.close(false).unwrap();
    }

    let series = Series::open(&path, OpenOptions::default()).unwrap();
    assert_eq!(series.gzip_level(), 6);
    let all: Vec<_> = series
        .iterate_range(0, 100)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(all.len(), 7);
    assert_eq!(all[6], (7, vec![7u8; 16]));

    // Appends keep working after reopen.
    series.append(8, &[8u8; 16]).unwrap();
    assert_eq!(series.get_current_value().unwrap(), (8, vec![8u8; 16]));
}

#[test]
fn descriptor_based_open_reads_and_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = series_dir(&dir, "s");
    {
        let series = Series::create(&path, &options(4, 10)).unwrap();
        series.append(1, &[1u8; 4]).unwrap();
        series.close(false).unwrap();
    }

    let series = Series::open(
        &path,
        OpenOptions {
            descriptor_based: true,
        },
    )
    .unwrap();
    series.append(2, &[2u8; 4]).unwrap();
    assert_eq!(series.open_chunks_mmap_size(), 0);
    let all: Vec<_> = series
        .iterate_range(0, 10)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(all, vec![(1, vec![1u8; 4]), (2, vec![2u8; 4])]);
}

#[test]
fn mmap_size_reflects_open_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let series = Series::create(&series_dir(&dir, "s"), &options(4, 10)).unwrap();
    assert_eq!(series.open_chunks_mmap_size(), 0);
    series.append(1, &[0u8; 4]).unwrap();
    // One freshly created normal chunk: two pages on disk.
    assert_eq!(series.open_chunks_mmap_size(), 2 * series.page_size());
}

#[test]
fn empty_series_iterates_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = series_dir(&dir, "s");
    {
        let series = Series::create(&path, &options(4, 10)).unwrap();
        let mut iter = series.iterate_range(0, u64::MAX).unwrap();
        assert_eq!(iter.next_entry().unwrap(), None);
        assert!(matches!(
            series.get_current_value(),
            Err(StrataError::InvalidArgument(_))
        ));
    }

    // Reopening an empty directory (metadata only) is valid.
    let series = Series::open(&path, OpenOptions::default()).unwrap();
    assert_eq!(series.last_entry_ts(), 0);
    series.append(5, &[0u8; 4]).unwrap();
    assert_eq!(series.get_current_value().unwrap(), (5, vec![0u8; 4]));
}

#[test]
fn malformed_chunk_name_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = series_dir(&dir, "s");
    {
        let series = Series::create(&path, &options(4, 10)).unwrap();
        series.append(1, &[0u8; 4]).unwrap();
        series.close(false).unwrap();
    }
    std::fs::write(path.join("not-a-chunk"), b"junk").unwrap();
    assert!(matches!(
        Series::open(&path, OpenOptions::default()),
        Err(StrataError::Corruption(_))
    ));
}

#[test]
fn delete_removes_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = series_dir(&dir, "s");
    let series = Series::create(&path, &options(4, 10)).unwrap();
    series.append(1, &[0u8; 4]).unwrap();
    series.delete().unwrap();
    assert!(!path.exists());
}
