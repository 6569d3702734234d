//! Universal invariants, driven entirely through the public `Archive`/`File` API.

use raa::Archive;
use tempfile::tempdir;

fn fresh_archive() -> (tempfile::TempDir, Archive) {
    let dir = tempdir().unwrap();
    let archive = Archive::create(dir.path().join("archive.raa")).unwrap();
    (dir, archive)
}

#[test]
fn round_trip_content_across_block_sizes() {
    for block_size in [1usize, 1024, 10 * 1024 * 1024] {
        let (_dir, archive) = fresh_archive();
        let payload: Vec<u8> = (0..4000u32).map(|i| (i % 256) as u8).collect();

        let mut f = archive.create_file("member").unwrap();
        f.set_block_size(block_size as i32);
        f.write(&payload).unwrap();
        f.close().unwrap();

        let mut f = archive.open_read("member").unwrap();
        assert_eq!(f.bytes(), payload.as_slice());
        assert_eq!(f.stat().size(), payload.len() as i64);
    }
}

#[test]
fn block_count_matches_ceiling_division_after_write() {
    let (_dir, archive) = fresh_archive();
    let payload = vec![0u8; 101];

    let mut f = archive.create_file("member").unwrap();
    f.set_block_size(10);
    f.write(&payload).unwrap();
    f.close().unwrap();

    let info = archive.stat("member").unwrap();
    assert_eq!(info.sys().block_count(), 11); // ceil(101/10)
}

#[test]
fn zero_length_member_has_no_data_blocks() {
    let (_dir, archive) = fresh_archive();
    archive.create_file("empty").unwrap().close().unwrap();

    let info = archive.stat("empty").unwrap();
    assert_eq!(info.size(), 0);
    assert_eq!(info.sys().block_count(), 0);
}

#[test]
fn overwrite_with_shorter_payload_leaves_no_stale_blocks() {
    let (_dir, archive) = fresh_archive();

    let mut f = archive.create_file("member").unwrap();
    f.set_block_size(10);
    f.write(&vec![0u8; 95]).unwrap(); // 10 blocks
    f.close().unwrap();
    assert_eq!(archive.stat("member").unwrap().sys().block_count(), 10);

    let mut f = archive
        .open_file("member", raa::OpenFlags::READ_WRITE | raa::OpenFlags::TRUNC, 0o644)
        .unwrap();
    f.set_block_size(10);
    f.write(&vec![1u8; 15]).unwrap(); // 2 blocks
    f.close().unwrap();

    let info = archive.stat("member").unwrap();
    assert_eq!(info.size(), 15);
    assert_eq!(info.sys().block_count(), 2);

    let mut f = archive.open_read("member").unwrap();
    assert_eq!(f.bytes(), vec![1u8; 15].as_slice());
}

#[test]
fn find_returns_ascending_order() {
    let (_dir, archive) = fresh_archive();
    for name in ["/b", "/a", "/c"] {
        archive.create_file(name).unwrap().close().unwrap();
    }
    let names = archive.find(|_| true).unwrap();
    assert_eq!(names, vec!["/a", "/b", "/c"]);
}

#[test]
fn remove_all_determinism_no_member_equals_or_nests_under_prefix() {
    let (_dir, archive) = fresh_archive();
    for name in ["/p", "/p/child", "/pother"] {
        archive.create_file(name).unwrap().close().unwrap();
    }
    archive.remove_all("/p").unwrap();

    let remaining = archive.find(|_| true).unwrap();
    assert!(!remaining.iter().any(|k| k == "/p" || k.starts_with("/p/")));
    assert!(remaining.contains(&"/pother".to_string()));
}
