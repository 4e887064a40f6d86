use std::path::Path;

use fieldkit_fs::{
    CommitMethod, CommitOptions, Error, SpaceGuard, SpaceProbe, file_len, replace_commit,
    required_space,
};
use tempfile::tempdir;

struct NoSpace;

impl SpaceProbe for NoSpace {
    fn available(&self, _dir: &Path) -> fieldkit_fs::Result<u64> {
        Ok(0)
    }
}

#[test]
fn test_commit_publishes_full_length() {
    let dir = tempdir().unwrap();
    let partial = dir.path().join("whisper.bin.tmp");
    let dest = dir.path().join("whisper.bin");

    std::fs::write(&partial, vec![7u8; 64 * 1024]).unwrap();

    let method = replace_commit(&partial, &dest, CommitOptions::new()).unwrap();

    assert_eq!(method, CommitMethod::Renamed);
    assert_eq!(file_len(&dest), Some(64 * 1024));
    assert_eq!(file_len(&partial), None);
}

#[test]
fn test_commit_without_partial_leaves_destination_alone() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("whisper.bin");
    std::fs::write(&dest, b"previous").unwrap();

    let result = replace_commit(dir.path().join("whisper.bin.tmp"), &dest, CommitOptions::new());

    assert!(matches!(result, Err(Error::EmptySource { .. })));
    assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
}

#[test]
fn test_space_guard_rejects_when_full() {
    let dir = tempdir().unwrap();
    let guard = SpaceGuard::new(NoSpace).margin(1);

    let err = guard
        .check(dir.path(), required_space(10, 4, 0))
        .unwrap_err();

    assert!(err.is_insufficient_space());
}
