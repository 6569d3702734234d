//! End-to-end scenarios exercising the public `Archive`/`File` API together,
//! rather than any one component in isolation.

use raa::{Archive, Error, OpenFlags};
use tempfile::tempdir;

fn fresh_archive() -> (tempfile::TempDir, Archive) {
    let dir = tempdir().unwrap();
    let archive = Archive::create(dir.path().join("archive.raa")).unwrap();
    (dir, archive)
}

#[test]
fn cwd_semantics_through_chdir_and_relative_resolution() {
    let (_dir, archive) = fresh_archive();
    assert_eq!(archive.getwd(), "/");

    archive.chdir("foo");
    assert_eq!(archive.getwd(), "/foo");

    archive.chdir("foo");
    assert_eq!(archive.getwd(), "/foo/foo");

    archive.chdir("..");
    assert_eq!(archive.getwd(), "/foo");

    archive.chdir("/bar");
    assert_eq!(archive.getwd(), "/bar");
}

#[test]
fn create_write_close_then_reopen_round_trips_name_and_content() {
    let (_dir, archive) = fresh_archive();

    let mut f = archive.create_file("foo").unwrap();
    f.write(b"foo").unwrap();
    f.close().unwrap();

    let mut f = archive.open_read("foo").unwrap();
    assert_eq!(f.name(), "/foo");
    let mut buf = vec![0u8; 16];
    let n = f.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"foo");
}

#[test]
fn excl_create_collides_on_second_attempt() {
    let (_dir, archive) = fresh_archive();

    archive
        .open_file("foo", OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::EXCL, 0o644)
        .unwrap()
        .close()
        .unwrap();

    let err = archive
        .open_file("foo", OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::EXCL, 0o644)
        .unwrap_err();
    assert!(matches!(err.source, Error::AlreadyExists(_)));
    assert_eq!(err.operation, "open");
}

#[test]
fn chmod_via_archive_is_visible_on_reopen() {
    let (_dir, archive) = fresh_archive();
    archive.create_file("foo").unwrap().close().unwrap();

    archive.chmod("/foo", 0o042).unwrap();

    let f = archive.open_read("foo").unwrap();
    assert_eq!(f.stat().permissions(), 0o042);
}

#[test]
fn rename_moves_content_and_old_name_stops_resolving() {
    let (_dir, archive) = fresh_archive();
    let mut f = archive.create_file("foo").unwrap();
    f.write(b"foo").unwrap();
    f.close().unwrap();

    archive.rename("/foo", "/bar").unwrap();

    let mut f = archive.open_read("bar").unwrap();
    let mut buf = vec![0u8; 16];
    let n = f.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"foo");

    assert!(archive.stat("foo").is_err());
}

#[test]
fn remove_all_prefix_boundary() {
    // remove_all("foo") must remove the member at "foo" and everything
    // nested under "foo/", but leave "foobar" untouched even though it
    // shares a string prefix with "foo".
    let (_dir, archive) = fresh_archive();
    for name in ["foo", "foobar", "foo/bar"] {
        let mut f = archive.create_file(name).unwrap();
        f.write(b"foo").unwrap();
        f.close().unwrap();
    }

    archive.remove_all("foo").unwrap();

    assert!(archive.open_read("foo").is_err());
    assert!(archive.open_read("foo/bar").is_err());

    let mut f = archive.open_read("foobar").unwrap();
    assert_eq!(f.stat().size(), 3);
}

#[test]
fn large_file_spans_multiple_blocks_through_default_block_size() {
    // 26,334,208 bytes over the 10 MiB default block size -> 3 data blocks.
    let (_dir, archive) = fresh_archive();
    let payload = vec![0xABu8; 26_334_208];

    let mut f = archive.create_file("big").unwrap();
    f.write(&payload).unwrap();
    f.close().unwrap();

    let info = archive.stat("big").unwrap();
    assert_eq!(info.size(), payload.len() as i64);
    assert_eq!(info.sys().block_count(), 3);

    let mut f = archive.open_read("big").unwrap();
    assert_eq!(f.bytes().len(), payload.len());
    assert_eq!(f.bytes(), payload.as_slice());
}
