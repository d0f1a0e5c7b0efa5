use flate2::read::GzDecoder;
use skillforge_types::{Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::object_store::FileTree;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

/// Sniffs the archive format from magic bytes, never the filename extension.
pub fn sniff_format(bytes: &[u8]) -> Result<ArchiveFormat> {
    if bytes.starts_with(&ZIP_MAGIC) || bytes.starts_with(&ZIP_EMPTY_MAGIC) {
        Ok(ArchiveFormat::Zip)
    } else if bytes.starts_with(&GZIP_MAGIC) {
        Ok(ArchiveFormat::TarGz)
    } else {
        Err(Error::InvalidManifest(
            "unrecognized archive format (expected zip or tar.gz magic bytes)".to_string(),
        ))
    }
}

/// Resolves `entry_path` against `root`, rejecting it if `..`-normalization
/// (or an absolute path) would escape `root`. This is the zip-slip guard,
/// applied identically whether the entry came from a `.zip` or `.tar.gz`.
fn safe_join(root: &Path, entry_path: &str) -> Result<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(entry_path).components() {
        use std::path::Component;
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidManifest(format!(
                    "archive entry escapes package root: {entry_path}"
                )));
            }
        }
    }
    if !resolved.starts_with(root) {
        return Err(Error::InvalidManifest(format!(
            "archive entry escapes package root: {entry_path}"
        )));
    }
    Ok(resolved)
}

/// Unpacks `bytes` (already sniffed as `.zip`) under `dest_root`, which must
/// already exist. Every entry path is guarded before any bytes are written.
fn unpack_zip(bytes: &[u8], dest_root: &Path) -> Result<()> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| Error::InvalidManifest(format!("invalid zip archive: {e}")))?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::InvalidManifest(format!("invalid zip entry: {e}")))?;
        let name = entry
            .enclosed_name()
            .ok_or_else(|| Error::InvalidManifest("zip entry has no safe name".to_string()))?
            .to_string_lossy()
            .replace('\\', "/");
        let dest = safe_join(dest_root, &name)?;
        if entry.is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| Error::internal(e.to_string()))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::internal(e.to_string()))?;
        }
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|e| Error::internal(e.to_string()))?;
        std::fs::write(&dest, contents).map_err(|e| Error::internal(e.to_string()))?;
    }
    Ok(())
}

/// Unpacks `bytes` (already sniffed as `.tar.gz`) under `dest_root`.
fn unpack_tar_gz(bytes: &[u8], dest_root: &Path) -> Result<()> {
    let decoder = GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive
        .entries()
        .map_err(|e| Error::InvalidManifest(format!("invalid tar.gz archive: {e}")))?
    {
        let mut entry = entry.map_err(|e| Error::InvalidManifest(format!("invalid tar entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| Error::InvalidManifest(format!("invalid tar entry path: {e}")))?
            .to_string_lossy()
            .replace('\\', "/");
        let dest = safe_join(dest_root, &path)?;
        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| Error::internal(e.to_string()))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::internal(e.to_string()))?;
        }
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|e| Error::internal(e.to_string()))?;
        std::fs::write(&dest, contents).map_err(|e| Error::internal(e.to_string()))?;
    }
    Ok(())
}

/// Unpacks an uploaded package into a fresh scratch directory under
/// `scratch_root`, returning the directory the package was extracted into.
/// Runs on a blocking thread since archive decompression is CPU-bound and
/// the reader types here are synchronous.
pub async fn unpack_into_scratch(bytes: Vec<u8>, scratch_root: PathBuf) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || {
        let format = sniff_format(&bytes)?;
        let scratch_dir = scratch_root.join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&scratch_dir).map_err(|e| Error::internal(e.to_string()))?;
        match format {
            ArchiveFormat::Zip => unpack_zip(&bytes, &scratch_dir)?,
            ArchiveFormat::TarGz => unpack_tar_gz(&bytes, &scratch_dir)?,
        }
        Ok(scratch_dir)
    })
    .await
    .map_err(|e| Error::internal(format!("blocking task join failed: {e}")))?
}

/// Walks a directory on disk into the same `FileTree` shape the
/// `ObjectStore` trait deals in, so the loader can treat a freshly
/// unpacked scratch directory and a version fetched from C1 identically.
pub async fn read_tree(root: PathBuf) -> Result<FileTree> {
    tokio::task::spawn_blocking(move || {
        let mut out = FileTree::new();
        collect_into(&root, &root, &mut out)?;
        Ok(out)
    })
    .await
    .map_err(|e| Error::internal(format!("blocking task join failed: {e}")))?
}

fn collect_into(root: &Path, dir: &Path, out: &mut FileTree) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| Error::internal(e.to_string()))? {
        let entry = entry.map_err(|e| Error::internal(e.to_string()))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| Error::internal(e.to_string()))?;
        if file_type.is_dir() {
            collect_into(root, &path, out)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .expect("walked path is under root")
                .to_string_lossy()
                .replace('\\', "/");
            let bytes = std::fs::read(&path).map_err(|e| Error::internal(e.to_string()))?;
            out.insert(relative, bytes);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_zip_magic() {
        let bytes = [0x50, 0x4b, 0x03, 0x04, 0, 0, 0, 0];
        assert_eq!(sniff_format(&bytes).unwrap(), ArchiveFormat::Zip);
    }

    #[test]
    fn sniffs_gzip_magic() {
        let bytes = [0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0];
        assert_eq!(sniff_format(&bytes).unwrap(), ArchiveFormat::TarGz);
    }

    #[test]
    fn rejects_unknown_magic() {
        assert!(sniff_format(b"not an archive").is_err());
    }

    #[test]
    fn safe_join_rejects_parent_dir_traversal() {
        let root = Path::new("/tmp/scratch-root");
        assert!(safe_join(root, "../../etc/passwd").is_err());
        assert!(safe_join(root, "nested/../../escape").is_err());
    }

    #[test]
    fn safe_join_accepts_nested_relative_paths() {
        let root = Path::new("/tmp/scratch-root");
        let resolved = safe_join(root, "references/foo.md").unwrap();
        assert_eq!(resolved, root.join("references").join("foo.md"));
    }

    #[tokio::test]
    async fn unpacks_tar_gz_into_scratch_dir() {
        let scratch_root = tempfile::tempdir().unwrap();
        let mut tar_bytes = Vec::new();
        {
            let encoder = flate2::write::GzEncoder::new(&mut tar_bytes, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"---\nname: echo\ndescription: echoes input\n---\nhi";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_cksum();
            builder.append_data(&mut header, "SKILL.md", &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }
        let extracted = unpack_into_scratch(tar_bytes, scratch_root.path().to_path_buf())
            .await
            .unwrap();
        assert!(extracted.join("SKILL.md").exists());
    }

    #[tokio::test]
    async fn read_tree_walks_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("SKILL.md"), b"front matter").unwrap();
        std::fs::create_dir_all(dir.path().join("references")).unwrap();
        std::fs::write(dir.path().join("references").join("foo.md"), b"bar").unwrap();
        let tree = read_tree(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(tree.get("SKILL.md").map(Vec::as_slice), Some(&b"front matter"[..]));
        assert_eq!(tree.get("references/foo.md").map(Vec::as_slice), Some(&b"bar"[..]));
    }
}
