use bytes::Bytes;
use tempfile::TempDir;

use tsgrid::generator::diagonal;
use tsgrid::index_file::INDEX_FILE_TRAILER_SIZE;
use tsgrid::measurement_block::MEASUREMENT_TRAILER_SIZE;
use tsgrid::{Index, IndexConfig, IndexError, IndexFile, Tags};

fn build_file() -> Vec<u8> {
    let dir = TempDir::new().unwrap();
    let index = Index::open(IndexConfig {
        dir: dir.path().to_path_buf(),
        ..Default::default()
    })
    .unwrap();
    for t in diagonal(2, 6) {
        index.create_series_if_not_exists("cpu", &t).unwrap();
    }
    index
        .create_series_if_not_exists("mem", &Tags::from_pairs(&[("host", "a")]))
        .unwrap();
    index.compact_to(Vec::new()).unwrap().0
}

fn set_u64(buf: &mut [u8], at: usize, v: u64) {
    buf[at..at + 8].copy_from_slice(&v.to_be_bytes());
}

fn is_corruption(err: &IndexError) -> bool {
    matches!(err, IndexError::Corruption { .. })
}

#[test]
fn test_intact_file_restores() {
    let file = IndexFile::from_bytes(Bytes::from(build_file())).unwrap();
    assert_eq!(file.measurement_names().unwrap(), vec!["cpu", "mem"]);
    assert_eq!(file.series_id_set("cpu").unwrap().cardinality(), 6);
}

#[test]
fn test_file_shorter_than_trailer_is_rejected() {
    for len in 0..INDEX_FILE_TRAILER_SIZE {
        let err = IndexFile::from_bytes(Bytes::from(vec![0u8; len])).unwrap_err();
        assert!(is_corruption(&err), "len {}: {:?}", len, err);
    }
}

#[test]
fn test_unknown_file_version_is_rejected() {
    let mut buf = build_file();
    let n = buf.len();
    buf[n - 2..].copy_from_slice(&2u16.to_be_bytes());
    let err = IndexFile::from_bytes(Bytes::from(buf)).unwrap_err();
    assert!(matches!(
        err,
        IndexError::UnsupportedVersion { version: 2, .. }
    ));
}

#[test]
fn test_unknown_measurement_block_version_is_rejected() {
    let mut buf = build_file();
    let n = buf.len();
    let version_at = n - INDEX_FILE_TRAILER_SIZE - 2;
    buf[version_at..version_at + 2].copy_from_slice(&9u16.to_be_bytes());
    let err = IndexFile::from_bytes(Bytes::from(buf)).unwrap_err();
    assert!(matches!(
        err,
        IndexError::UnsupportedVersion { version: 9, .. }
    ));
}

#[test]
fn test_measurement_block_range_out_of_bounds() {
    let mut buf = build_file();
    let n = buf.len();
    // size past the end of the body
    set_u64(&mut buf, n - INDEX_FILE_TRAILER_SIZE + 8, n as u64);
    let err = IndexFile::from_bytes(Bytes::from(buf.clone())).unwrap_err();
    assert!(is_corruption(&err), "{:?}", err);

    // offset that overflows when added to the size
    set_u64(&mut buf, n - INDEX_FILE_TRAILER_SIZE, u64::MAX);
    set_u64(&mut buf, n - INDEX_FILE_TRAILER_SIZE + 8, 16);
    let err = IndexFile::from_bytes(Bytes::from(buf)).unwrap_err();
    assert!(is_corruption(&err), "{:?}", err);
}

#[test]
fn test_hash_index_capacity_mismatch() {
    let mut buf = build_file();
    let n = buf.len();
    let mb_end = n - INDEX_FILE_TRAILER_SIZE;
    let mb_start = mb_end
        - u64::from_be_bytes(buf[mb_end + 8..mb_end + 16].try_into().unwrap()) as usize;
    // trailer: data offset/size, hash offset/size, version
    let trailer_at = mb_end - MEASUREMENT_TRAILER_SIZE;
    let hash_off =
        u64::from_be_bytes(buf[trailer_at + 16..trailer_at + 24].try_into().unwrap()) as usize;
    set_u64(&mut buf, mb_start + hash_off, 3);
    let err = IndexFile::from_bytes(Bytes::from(buf)).unwrap_err();
    assert!(is_corruption(&err), "{:?}", err);
}

#[test]
fn test_truncated_files_never_panic() {
    let buf = build_file();
    for len in 0..buf.len() {
        let truncated = Bytes::copy_from_slice(&buf[..len]);
        if let Ok(file) = IndexFile::from_bytes(truncated) {
            let _ = file.measurement_names();
        }
    }
}

#[test]
fn test_corrupt_grid_reports_measurement() {
    let mut buf = build_file();
    // the grid block starts right after the pad byte; its first grid belongs to cpu.
    // an id space of zero can hold no coordinate.
    let key_count_at = 1 + 8;
    let key_count = u64::from_be_bytes(buf[key_count_at..key_count_at + 8].try_into().unwrap());
    assert_eq!(key_count, 2);
    let mut at = key_count_at + 8;
    for _ in 0..key_count {
        let len = u64::from_be_bytes(buf[at..at + 8].try_into().unwrap()) as usize;
        at += 8 + len;
    }
    // dimension count, then the first dimension's capacity
    set_u64(&mut buf, at + 8, 0);

    let file = IndexFile::from_bytes(Bytes::from(buf)).unwrap();
    let err = file.series_id_set_for_tag_key("cpu", "a").unwrap_err();
    match err {
        IndexError::Corruption { measurement, .. } => {
            assert_eq!(measurement.as_deref(), Some("cpu"))
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // other measurements still answer
    assert_eq!(file.series_id_set_for_tag_key("mem", "host").unwrap().cardinality(), 1);
}
