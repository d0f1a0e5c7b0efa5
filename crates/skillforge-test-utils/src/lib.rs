//! Shared fixture builders for the workspace's test suites: an in-memory
//! metadata store and a minimal valid skill package, so every crate's
//! tests build fixtures the same way instead of hand-rolling them.

use skillforge_types::{Error, Result};
use std::io::Write;

/// The front matter + instructions body of the smallest manifest that
/// passes validation: a 4-character id and a description at the 10-char
/// minimum.
pub const MINIMAL_SKILL_MD: &[u8] =
    b"---\nname: echo\ndescription: echoes the provided input\n---\n\nEcho the input back verbatim.\n";

/// Builds a zip-encoded skill package in memory containing only
/// `MINIMAL_SKILL_MD`. Used by gateway/protocol tests that exercise the
/// upload pipeline end to end without touching disk.
pub fn minimal_skill_zip() -> Result<Vec<u8>> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer
            .start_file("SKILL.md", options)
            .map_err(|e| Error::internal(e.to_string()))?;
        writer
            .write_all(MINIMAL_SKILL_MD)
            .map_err(|e| Error::internal(e.to_string()))?;
        writer.finish().map_err(|e| Error::internal(e.to_string()))?;
    }
    Ok(buf.into_inner())
}

/// Opens a fresh on-disk sqlite database under a tempdir and returns both
/// the handle and the tempdir (whose lifetime the caller must hold onto
/// for the duration of the test, or the file disappears).
pub fn temp_sqlite_handle() -> (skillforge_storage::SqliteHandle, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create tempdir for test fixture");
    let handle = skillforge_storage::SqliteHandle::open(dir.path().join("skillforge.db"))
        .expect("failed to open sqlite handle for test fixture");
    (handle, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_skill_zip_starts_with_zip_magic() {
        let bytes = minimal_skill_zip().unwrap();
        assert_eq!(&bytes[0..4], &[0x50, 0x4b, 0x03, 0x04]);
    }

    #[test]
    fn temp_sqlite_handle_opens_without_error() {
        let (_handle, _dir) = temp_sqlite_handle();
    }
}
