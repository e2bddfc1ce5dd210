//! End-to-end tests for the filesystem adapter over an in-memory store
//!
//! These drive `DriveFs` through its public operations the way the FUSE
//! operation table does, from plain threads outside the runtime.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use common::memory::MemoryStore;
use common::{EntryKind, RemoteEntry};
use drivefs_daemon::{DriveFs, DriveFsConfig, FsError, ReleaseOutcome};

struct Mounted {
    // keeps the runtime alive for the adapter's handle
    _runtime: tokio::runtime::Runtime,
    staging: TempDir,
    store: Arc<MemoryStore>,
    fs: Arc<DriveFs>,
}

fn mount(store: MemoryStore) -> Mounted {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let staging = TempDir::new().unwrap();
    let store = Arc::new(store);
    let config = DriveFsConfig {
        staging_dir: staging.path().to_path_buf(),
        ..DriveFsConfig::default()
    };
    let fs = Arc::new(DriveFs::new(
        store.clone(),
        runtime.handle().clone(),
        config,
    ));
    fs.rebuild_index().unwrap();

    Mounted {
        _runtime: runtime,
        staging,
        store,
        fs,
    }
}

fn read_all(fs: &DriveFs, path: &str, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    let n = fs.read(path, &mut buf, 0).unwrap();
    buf.truncate(n);
    buf
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

fn names(fs: &DriveFs, dir: &str) -> Vec<String> {
    fs.list_directory(dir)
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}

#[test]
fn test_scenario() {
    let store = MemoryStore::new();
    store.insert_entry(RemoteEntry::folder("1", "docs", &[]));
    store.insert(RemoteEntry::file("2", "a.txt", 5, &["1"]), b"hello".to_vec());
    let m = mount(store);

    assert_eq!(m.fs.indexed_paths(), 2);
    assert_eq!(names(&m.fs, "/docs"), vec![".", "..", "a.txt"]);

    let attrs = m.fs.get_attributes("/docs/a.txt").unwrap();
    assert_eq!(attrs.kind, EntryKind::File);
    assert_eq!(attrs.size, 5);
    assert_eq!(attrs.nlink, 1);
}

#[test]
fn test_round_trip() {
    let m = mount(MemoryStore::new());
    let content = b"the quick brown fox jumps over the lazy dog";

    let handle = m.fs.create("/notes.txt").unwrap();
    // hosts write in chunks, not always in order
    m.fs.write("/notes.txt", &content[20..], 20, handle).unwrap();
    m.fs.write("/notes.txt", &content[..20], 0, handle).unwrap();
    m.fs.flush("/notes.txt", handle);

    let outcome = m.fs.release("/notes.txt", handle);
    assert!(matches!(outcome, ReleaseOutcome::Uploaded { .. }));

    assert_eq!(read_all(&m.fs, "/notes.txt", content.len()), content);
    assert_eq!(names(&m.fs, "/"), vec![".", "..", "notes.txt"]);
    assert_eq!(m.store.upload_calls(), 1);
    assert_eq!(std::fs::read_dir(m.staging.path()).unwrap().count(), 0);
}

#[test]
fn test_round_trip_into_subfolder() {
    let store = MemoryStore::new();
    store.insert_entry(RemoteEntry::folder("f", "reports", &[]));
    let m = mount(store);

    let handle = m.fs.create("/reports/q3.csv").unwrap();
    m.fs.write("/reports/q3.csv", b"a,b\n1,2\n", 0, handle).unwrap();
    m.fs.release("/reports/q3.csv", handle);

    assert_eq!(read_all(&m.fs, "/reports/q3.csv", 64), b"a,b\n1,2\n");
    let uploaded = m.store.entries().pop().unwrap();
    assert_eq!(uploaded.parent_ids, vec!["f".to_string()]);
}

#[test]
fn test_round_trip_over_existing_file() {
    let store = MemoryStore::new();
    store.insert(RemoteEntry::file("n", "notes.txt", 3, &[]), b"old".to_vec());
    let m = mount(store);
    assert_eq!(read_all(&m.fs, "/notes.txt", 16), b"old");

    let handle = m.fs.create("/notes.txt").unwrap();
    m.fs.write("/notes.txt", b"brand new", 0, handle).unwrap();
    let outcome = m.fs.release("/notes.txt", handle);
    assert!(matches!(outcome, ReleaseOutcome::Uploaded { .. }));

    // the upload is a second remote object; the newer one owns the path
    assert_eq!(m.store.entries().len(), 2);
    assert_eq!(read_all(&m.fs, "/notes.txt", 16), b"brand new");
    assert_eq!(m.fs.get_attributes("/notes.txt").unwrap().size, 9);
    assert_eq!(names(&m.fs, "/"), vec![".", "..", "notes.txt"]);
}

#[test]
fn test_upload_failure_is_at_most_once() {
    let m = mount(MemoryStore::new());
    m.store.fail_uploads(true);

    let handle = m.fs.create("/draft.txt").unwrap();
    assert_eq!(m.fs.write("/draft.txt", b"unsaved", 0, handle).unwrap(), 7);

    let outcome = m.fs.release("/draft.txt", handle);
    assert!(matches!(outcome, ReleaseOutcome::UploadFailed(_)));

    // exactly one attempt, nothing retried on a later rebuild
    m.store.fail_uploads(false);
    m.fs.rebuild_index().unwrap();
    assert_eq!(m.store.upload_calls(), 1);
    assert!(matches!(
        m.fs.get_attributes("/draft.txt"),
        Err(FsError::NotFound(_))
    ));
    assert_eq!(std::fs::read_dir(m.staging.path()).unwrap().count(), 0);
    assert_eq!(m.fs.open_handles(), 0);
}

#[test]
fn test_failed_rebuild_keeps_previous_index() {
    let store = MemoryStore::with_page_size(1);
    store.insert_entry(RemoteEntry::folder("1", "docs", &[]));
    store.insert(RemoteEntry::file("2", "a.txt", 5, &["1"]), b"hello".to_vec());
    let m = mount(store);

    m.store.insert_entry(RemoteEntry::folder("3", "new", &[]));
    m.store.fail_pages_from(Some(2));

    let err = m.fs.rebuild_index().unwrap_err();
    assert!(matches!(err, FsError::RemoteList(_)));
    assert_eq!(err.errno(), libc::EIO);
    assert_eq!(names(&m.fs, "/"), vec![".", "..", "docs"]);
    assert_eq!(read_all(&m.fs, "/docs/a.txt", 5), b"hello");

    m.store.fail_pages_from(None);
    m.fs.rebuild_index().unwrap();
    assert_eq!(names(&m.fs, "/"), vec![".", "..", "docs", "new"]);
}

#[test]
fn test_first_parent_determinism() {
    let store = MemoryStore::new();
    store.insert_entry(RemoteEntry::folder("A", "alpha", &[]));
    store.insert_entry(RemoteEntry::folder("B", "beta", &[]));
    store.insert(
        RemoteEntry::file("x", "shared.txt", 3, &["A", "B"]),
        b"abc".to_vec(),
    );
    let m = mount(store);

    for _ in 0..2 {
        assert!(m.fs.get_attributes("/alpha/shared.txt").is_ok());
        assert!(m.fs.get_attributes("/beta/shared.txt").is_err());
        m.fs.rebuild_index().unwrap();
    }
}

#[test]
fn test_cycles_and_orphans_are_hidden() {
    let store = MemoryStore::new();
    store.insert_entry(RemoteEntry::folder("x", "loop-x", &["y"]));
    store.insert_entry(RemoteEntry::folder("y", "loop-y", &["x"]));
    store.insert(RemoteEntry::file("o", "orphan.txt", 1, &["gone"]), b"o".to_vec());
    store.insert(RemoteEntry::file("k", "kept.txt", 1, &[]), b"k".to_vec());
    let m = mount(store);

    assert_eq!(names(&m.fs, "/"), vec![".", "..", "kept.txt"]);
    assert_eq!(m.fs.indexed_paths(), 1);
}

#[test]
fn test_concurrent_reads_during_rebuilds() {
    let store = MemoryStore::with_page_size(2);
    for i in 0..8 {
        let content = format!("content of file {}", i);
        store.insert(
            RemoteEntry::file(
                format!("id{}", i),
                format!("f{}.txt", i),
                content.len() as u64,
                &[],
            ),
            content.into_bytes(),
        );
    }
    let m = mount(store);

    thread::scope(|scope| {
        for reader in 0..4 {
            let fs = &m.fs;
            scope.spawn(move || {
                for round in 0..25 {
                    let i = (reader + round) % 8;
                    let expected = format!("content of file {}", i);
                    let got = read_all(fs, &format!("/f{}.txt", i), 64);
                    assert_eq!(got, expected.as_bytes());
                }
            });
        }

        let fs = &m.fs;
        scope.spawn(move || {
            for _ in 0..10 {
                assert_eq!(fs.rebuild_index().unwrap(), 8);
            }
        });
    });

    let stats = m.fs.cache_stats();
    assert!(stats.hits + stats.misses >= 100);
}

#[test]
fn test_modified_time_and_defaults() {
    let stamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let store = MemoryStore::new();
    let mut dated = RemoteEntry::file("d", "dated.txt", 1, &[]);
    dated.modified_at = Some(stamp);
    store.insert(dated, b"d".to_vec());
    store.insert(RemoteEntry::file("u", "undated.txt", 1, &[]), b"u".to_vec());
    let m = mount(store);

    let dated = m.fs.get_attributes("/dated.txt").unwrap();
    assert_eq!(dated.modified, SystemTime::from(stamp));
    assert_eq!(dated.perm, 0o644);

    let undated = m.fs.get_attributes("/undated.txt").unwrap();
    assert_eq!(undated.modified, SystemTime::UNIX_EPOCH);
}

#[test]
fn test_quota_is_cached_between_statfs_calls() {
    let m = mount(MemoryStore::new());

    m.fs.statfs();
    m.fs.statfs();
    m.fs.statfs();

    assert_eq!(m.store.quota_calls(), 1);
}

#[test]
fn test_stale_handle_after_release() {
    let m = mount(MemoryStore::new());
    let handle = m.fs.create("/once.txt").unwrap();
    m.fs.release("/once.txt", handle);

    let err = m.fs.write("/once.txt", b"late", 0, handle).unwrap_err();
    assert!(matches!(err, FsError::BadHandle(h) if h == handle));
    assert_eq!(err.errno(), libc::EBADF);
}

#[test]
fn test_concurrent_uploads_keep_lookups_answering() {
    let store = MemoryStore::new();
    store.insert(RemoteEntry::file("a", "a.txt", 1, &[]), b"a".to_vec());
    let m = mount(store);

    // lookups keep answering while uploads and rebuilds run on other threads
    thread::scope(|scope| {
        for i in 0..4 {
            let fs = &m.fs;
            scope.spawn(move || {
                let path = format!("/upload-{}.bin", i);
                let handle = fs.create(&path).unwrap();
                fs.write(&path, &[i as u8; 1024], 0, handle).unwrap();
                fs.release(&path, handle);
            });
        }
        for _ in 0..50 {
            assert!(m.fs.get_attributes("/a.txt").is_ok());
            thread::sleep(Duration::from_millis(1));
        }
    });

    // concurrent rebuilds may install out of order; the next one sees all
    m.fs.rebuild_index().unwrap();
    for i in 0..4 {
        let attrs = m.fs.get_attributes(&format!("/upload-{}.bin", i)).unwrap();
        assert_eq!(attrs.size, 1024);
    }
}

#[test]
fn test_stalled_download_does_not_block_other_operations() {
    let store = MemoryStore::new();
    store.insert_entry(RemoteEntry::folder("1", "docs", &[]));
    store.insert(RemoteEntry::file("2", "a.txt", 5, &["1"]), b"hello".to_vec());
    let m = mount(store);
    m.store.hold_downloads();

    thread::scope(|scope| {
        let fs = &m.fs;
        let reader = scope.spawn(move || read_all(fs, "/docs/a.txt", 5));
        wait_until("the download to stall", || m.store.held_downloads() == 1);

        // no lock is held across the stalled download
        assert_eq!(m.fs.get_attributes("/docs/a.txt").unwrap().size, 5);
        assert_eq!(names(&m.fs, "/docs"), vec![".", "..", "a.txt"]);
        assert_eq!(m.fs.rebuild_index().unwrap(), 2);
        m.fs.statfs();

        m.store.release_downloads();
        assert_eq!(reader.join().unwrap(), b"hello");
    });
    assert_eq!(m.store.download_calls(), 1);

    // the rebuild finished mid-download, so that content was not cached
    assert_eq!(read_all(&m.fs, "/docs/a.txt", 5), b"hello");
    assert_eq!(m.store.download_calls(), 2);
    assert_eq!(read_all(&m.fs, "/docs/a.txt", 5), b"hello");
    assert_eq!(m.store.download_calls(), 2);
}
