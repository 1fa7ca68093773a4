use std::fs;
use std::path::{Path, PathBuf};
use tokio::runtime::Builder;
use tracing::info;

use crate::error::{PackError, PackResult};
use crate::packaging::zip::{Compressor, collect_entries, write_zip};

pub mod zip;

/// Zips the whole staging directory into `output`, overwriting it.
///
/// This is the entrypoint for the synchronous tool: the async zip writer
/// runs on a current-thread runtime owned by this call.
pub fn archive(staging: &Path, output: &Path, compressor: Compressor) -> PackResult<PathBuf> {
    let exclude = canonical_output(output);
    let entries = collect_entries(staging, exclude.as_deref())?;

    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PackError::io(output, e))?;
    let files = rt.block_on(write_zip(output, &entries, compressor))?;

    info!(
        archive = %output.display(),
        files,
        entries = entries.len(),
        "archive written"
    );
    Ok(output.to_path_buf())
}

/// Absolute form of the output path, used to keep an archive that lives
/// inside the staging tree from being added to itself.
fn canonical_output(output: &Path) -> Option<PathBuf> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = fs::canonicalize(parent).ok()?;
    Some(dir.join(output.file_name()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::zip::tests::read_zip;
    use tempfile::TempDir;

    fn read_archive(path: &Path) -> std::collections::BTreeMap<String, Vec<u8>> {
        Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(read_zip(path))
    }

    #[test]
    fn round_trip_reproduces_staging_tree() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("LibNbiot");
        fs::create_dir_all(staging.join("src/modems")).unwrap();
        fs::write(staging.join("src/nbiot.h"), "#pragma once\n").unwrap();
        fs::write(staging.join("src/modems/network.cpp"), vec![7u8; 4096]).unwrap();
        let output = tmp.path().join("LibNbiot.zip");

        let written = archive(&staging, &output, Compressor::Deflate).unwrap();

        assert_eq!(written, output);
        let contents = read_archive(&output);
        let files: Vec<_> = contents.keys().filter(|k| !k.ends_with('/')).collect();
        assert_eq!(files, ["src/modems/network.cpp", "src/nbiot.h"]);
        assert_eq!(contents["src/nbiot.h"], b"#pragma once\n");
        assert_eq!(contents["src/modems/network.cpp"], vec![7u8; 4096]);
    }

    #[test]
    fn empty_staging_gives_empty_archive() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("stage");
        fs::create_dir_all(&staging).unwrap();
        let output = tmp.path().join("Empty.zip");

        archive(&staging, &output, Compressor::Deflate).unwrap();

        assert!(output.is_file());
        assert!(read_archive(&output).is_empty());
    }

    #[test]
    fn archiving_twice_gives_same_contents() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("stage");
        fs::create_dir_all(staging.join("src")).unwrap();
        fs::write(staging.join("src/a.h"), "a").unwrap();
        let first = tmp.path().join("first.zip");
        let second = tmp.path().join("second.zip");

        archive(&staging, &first, Compressor::Deflate).unwrap();
        archive(&staging, &second, Compressor::Deflate).unwrap();

        assert_eq!(read_archive(&first), read_archive(&second));
    }

    #[test]
    fn existing_archive_is_overwritten() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("stage");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("a.h"), "a").unwrap();
        let output = tmp.path().join("Lib.zip");
        fs::write(&output, "not a zip at all").unwrap();

        archive(&staging, &output, Compressor::Stored).unwrap();

        assert_eq!(read_archive(&output)["a.h"], b"a");
    }

    #[test]
    fn archive_inside_staging_is_not_added_to_itself() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("stage");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("a.h"), "a").unwrap();
        let output = staging.join("Lib.zip");
        fs::write(&output, "stale").unwrap();

        archive(&staging, &output, Compressor::Deflate).unwrap();

        let names: Vec<_> = read_archive(&output).into_keys().collect();
        assert_eq!(names, ["a.h"]);
    }

    #[test]
    fn missing_staging_fails_without_writing() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("Lib.zip");

        let err = archive(&tmp.path().join("absent"), &output, Compressor::Deflate).unwrap_err();

        assert!(matches!(err, PackError::StagingNotFound { .. }));
        assert!(!output.exists());
    }
}
