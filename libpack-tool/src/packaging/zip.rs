use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipDateTime, ZipEntryBuilder};
use chrono::{DateTime, Datelike, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::File;
use tokio_util::compat::FuturesAsyncWriteCompatExt;
use tracing::{debug, warn};

use crate::error::{PackError, PackResult};
use crate::fs_utils::to_slash;

/// Compression algorithm to use when creating the ZIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    Deflate,
    Stored,
}

impl From<Compressor> for Compression {
    fn from(c: Compressor) -> Self {
        match c {
            Compressor::Deflate => Compression::Deflate,
            Compressor::Stored => Compression::Stored,
        }
    }
}

/// A file or directory found under the staging root.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Name inside the archive, `/`-separated; directories end with `/`.
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
    pub mode: Option<u32>,
}

/// Walks `root` in sorted order and lists everything that goes into the archive.
///
/// `exclude` is an absolute, canonical path that is left out even if it sits
/// under `root` (the archive being written). The walk starts from the canonical
/// form of `root`, so relative roots compare correctly against it.
pub fn collect_entries(root: &Path, exclude: Option<&Path>) -> PackResult<Vec<ArchiveEntry>> {
    let not_found = |e: io::Error| match e.kind() {
        io::ErrorKind::NotFound => PackError::StagingNotFound {
            path: root.to_path_buf(),
        },
        _ => PackError::io(root, e),
    };
    let meta = fs::metadata(root).map_err(not_found)?;
    if !meta.is_dir() {
        return Err(PackError::StagingNotFound {
            path: root.to_path_buf(),
        });
    }

    fn walk_dir(
        dir: &Path,
        rel: &Path,
        exclude: Option<&Path>,
        result: &mut Vec<ArchiveEntry>,
    ) -> PackResult<()> {
        let mut children = fs::read_dir(dir)
            .and_then(|it| it.collect::<io::Result<Vec<_>>>())
            .map_err(|e| PackError::io(dir, e))?;
        children.sort_by_key(|c| c.file_name());

        for child in children {
            let path = child.path();
            let rel_path = rel.join(child.file_name());
            if exclude.is_some_and(|ex| ex == path.as_path()) {
                warn!(path = %path.display(), "archive lies inside staging directory, not adding it to itself");
                continue;
            }
            let meta = fs::metadata(&path).map_err(|e| PackError::io(&path, e))?;
            let is_dir = meta.is_dir();
            let mut name = to_slash(&rel_path);
            if is_dir {
                name.push('/');
            }
            result.push(ArchiveEntry {
                name,
                path: path.clone(),
                is_dir,
                modified: meta.modified().ok(),
                mode: unix_mode(&meta),
            });
            if is_dir {
                walk_dir(&path, &rel_path, exclude, result)?;
            }
        }
        Ok(())
    }

    let root = fs::canonicalize(root).map_err(not_found)?;
    let mut result = Vec::new();
    walk_dir(&root, Path::new(""), exclude, &mut result)?;
    Ok(result)
}

#[cfg(unix)]
fn unix_mode(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.mode())
}

#[cfg(not(unix))]
fn unix_mode(_meta: &fs::Metadata) -> Option<u32> {
    None
}

/// 1980-01-01T00:00:00Z, the earliest time a zip entry can carry.
const ZIP_EPOCH: i64 = 315_532_800;

fn zip_date(modified: Option<SystemTime>) -> ZipDateTime {
    let floor = DateTime::from_timestamp(ZIP_EPOCH, 0).unwrap_or_default();
    let dt = modified
        .map(DateTime::<Utc>::from)
        .filter(|dt| dt.year() >= 1980)
        .unwrap_or(floor);
    ZipDateTime::from_chrono(&dt)
}

/// Writes `entries` into a new archive at `output`, replacing any existing file.
/// Returns the number of file (non-directory) entries written.
pub async fn write_zip(
    output: &Path,
    entries: &[ArchiveEntry],
    compressor: Compressor,
) -> PackResult<usize> {
    let archive_err = |e: async_zip::error::ZipError| PackError::Archive {
        path: output.to_path_buf(),
        error: e.to_string(),
    };

    let file = create_file_writer(output).await?;
    let mut writer = ZipFileWriter::with_tokio(file);
    let mut files = 0;

    for entry in entries {
        let compression = if entry.is_dir {
            Compression::Stored
        } else {
            compressor.into()
        };
        let mut builder = ZipEntryBuilder::new(entry.name.clone().into(), compression)
            .last_modification_date(zip_date(entry.modified));
        if let Some(mode) = entry.mode {
            builder = builder.unix_permissions(mode as u16);
        }

        if entry.is_dir {
            writer
                .write_entry_whole(builder, &[])
                .await
                .map_err(archive_err)?;
        } else {
            let mut input = File::open(&entry.path)
                .await
                .map_err(|e| PackError::io(&entry.path, e))?;
            let mut stream = writer
                .write_entry_stream(builder)
                .await
                .map_err(archive_err)?
                .compat_write();
            tokio::io::copy(&mut input, &mut stream)
                .await
                .map_err(|e| PackError::io(&entry.path, e))?;
            stream.into_inner().close().await.map_err(archive_err)?;
            files += 1;
        }
        debug!(name = %entry.name, "added archive entry");
    }

    writer.close().await.map_err(archive_err)?;
    Ok(files)
}

/// Creates (or truncates) the archive file, creating parent directories first.
async fn create_file_writer(path: &Path) -> PackResult<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PackError::io(parent, e))?;
    }
    File::create(path).await.map_err(|e| PackError::io(path, e))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_zip::tokio::read::fs::ZipFileReader;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Reads every entry of an archive into memory, keyed by name.
    pub(crate) async fn read_zip(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let reader = ZipFileReader::new(path).await.unwrap();
        let mut out = BTreeMap::new();
        for index in 0..reader.file().entries().len() {
            let name = reader.file().entries()[index]
                .filename()
                .as_str()
                .unwrap()
                .to_string();
            let mut data = Vec::new();
            reader
                .reader_with_entry(index)
                .await
                .unwrap()
                .read_to_end_checked(&mut data)
                .await
                .unwrap();
            out.insert(name, data);
        }
        out
    }

    #[test]
    fn entries_are_sorted_and_directories_marked() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src/b")).unwrap();
        fs::write(tmp.path().join("src/z.h"), "z").unwrap();
        fs::write(tmp.path().join("src/a.h"), "a").unwrap();
        fs::write(tmp.path().join("src/b/c.cpp"), "c").unwrap();

        let names: Vec<_> = collect_entries(tmp.path(), None)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();

        assert_eq!(names, ["src/", "src/a.h", "src/b/", "src/b/c.cpp", "src/z.h"]);
    }

    #[test]
    fn missing_root_is_staging_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = collect_entries(&tmp.path().join("absent"), None).unwrap_err();
        assert!(matches!(err, PackError::StagingNotFound { .. }));
    }

    #[test]
    fn excluded_path_is_left_out() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::write(root.join("keep.h"), "k").unwrap();
        fs::write(root.join("out.zip"), "old").unwrap();

        let entries = collect_entries(&root, Some(&root.join("out.zip"))).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "keep.h");
    }

    #[test]
    fn excluded_path_matches_non_canonical_root() {
        let tmp = TempDir::new().unwrap();
        let canonical = tmp.path().canonicalize().unwrap();
        fs::create_dir_all(canonical.join("stage/src")).unwrap();
        fs::write(canonical.join("stage/src/a.h"), "a").unwrap();
        fs::write(canonical.join("stage/Lib.zip"), "old").unwrap();
        let root = canonical.join("stage/src/../../stage");

        let entries = collect_entries(&root, Some(&canonical.join("stage/Lib.zip"))).unwrap();

        let names: Vec<_> = entries.into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["src/", "src/a.h"]);
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_output_is_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("stage");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.h"), "a").unwrap();
        let locked = tmp.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        // root ignores directory modes
        if fs::write(locked.join("canary"), "").is_ok() {
            return;
        }

        let entries = collect_entries(&root, None).unwrap();
        let err = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(write_zip(&locked.join("Lib.zip"), &entries, Compressor::Deflate))
            .unwrap_err();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(err, PackError::Permission { .. }), "{err}");
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn ancient_mtimes_are_clamped() {
        let date = zip_date(Some(SystemTime::UNIX_EPOCH));
        assert_eq!(date.year(), 1980);
    }

    #[tokio::test]
    async fn written_archive_has_every_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("stage");
        fs::create_dir_all(root.join("src/sub")).unwrap();
        fs::write(root.join("src/a.h"), b"alpha").unwrap();
        fs::write(root.join("src/sub/b.bin"), [0u8, 1, 2, 255]).unwrap();
        let output = tmp.path().join("dist/Lib.zip");

        let entries = collect_entries(&root, None).unwrap();
        let files = write_zip(&output, &entries, Compressor::Stored).await.unwrap();

        assert_eq!(files, 2);
        let contents = read_zip(&output).await;
        assert_eq!(contents["src/a.h"], b"alpha");
        assert_eq!(contents["src/sub/b.bin"], vec![0u8, 1, 2, 255]);
        assert!(contents.contains_key("src/sub/"));
    }
}
