use crate::error::{PackError, PackResult};
use glob::Pattern;
use std::{
    fs::{self, File},
    io,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info};

/// A source tree resolved against the working directory, with its destination
/// relative to the staging root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Totals gathered while populating the staging directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssembleReport {
    pub dirs: usize,
    pub files: usize,
    pub bytes: u64,
    pub skipped: usize,
}

/// Copies every entry, in order, into `staging`.
///
/// Files already present are overwritten, so later entries win on name
/// collisions. The first failure aborts the run and whatever was copied
/// before it stays on disk.
pub fn assemble(
    staging: &Path,
    entries: &[StagedEntry],
    skip: &[Pattern],
) -> PackResult<AssembleReport> {
    fs::create_dir_all(staging).map_err(|e| PackError::io(staging, e))?;

    let mut report = AssembleReport::default();
    for entry in entries {
        let target = staging.join(&entry.dest);
        let before = report.clone();
        copy_tree(&entry.source, &target, skip, &mut report)?;
        info!(
            source = %entry.source.display(),
            target = %target.display(),
            files = report.files - before.files,
            "copied source tree"
        );
    }
    Ok(report)
}

/// Recursively copies the contents of `source` into `target`.
pub fn copy_tree(
    source: &Path,
    target: &Path,
    skip: &[Pattern],
    report: &mut AssembleReport,
) -> PackResult<()> {
    let meta = fs::metadata(source).map_err(|e| PackError::source_io(source, e))?;
    if !meta.is_dir() {
        return Err(PackError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }
    fs::create_dir_all(target).map_err(|e| PackError::io(target, e))?;

    fn walk_dir(
        root: &Path,
        rel: &Path,
        target: &Path,
        skip: &[Pattern],
        report: &mut AssembleReport,
    ) -> PackResult<()> {
        let dir = root.join(rel);
        let mut children = fs::read_dir(&dir)
            .and_then(|it| it.collect::<io::Result<Vec<_>>>())
            .map_err(|e| PackError::io(&dir, e))?;
        children.sort_by_key(|c| c.file_name());

        for child in children {
            let rel_path = rel.join(child.file_name());
            if is_skipped(&rel_path, skip) {
                debug!(path = %rel_path.display(), "skipped by pattern");
                report.skipped += 1;
                continue;
            }

            let src = child.path();
            let dst = target.join(&rel_path);
            // fs::metadata follows symlinks, so linked trees are copied as content.
            let meta = fs::metadata(&src).map_err(|e| PackError::io(&src, e))?;
            if meta.is_dir() {
                fs::create_dir_all(&dst).map_err(|e| PackError::io(&dst, e))?;
                report.dirs += 1;
                walk_dir(root, &rel_path, target, skip, report)?;
            } else {
                report.bytes += copy_file(&src, &dst, &meta)?;
                report.files += 1;
                debug!(from = %src.display(), to = %dst.display(), "copied file");
            }
        }
        Ok(())
    }

    walk_dir(source, Path::new(""), target, skip, report)
}

/// Copies one file, replacing any existing destination, and carries over
/// its modification time and permission bits.
fn copy_file(src: &Path, dst: &Path, meta: &fs::Metadata) -> PackResult<u64> {
    let mut input = File::open(src).map_err(|e| PackError::io(src, e))?;
    let mut output = match File::create(dst) {
        Ok(f) => f,
        // A read-only copy from an earlier run can't be truncated in place.
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied && dst.is_file() => {
            fs::remove_file(dst).map_err(|e| PackError::io(dst, e))?;
            File::create(dst).map_err(|e| PackError::io(dst, e))?
        }
        Err(e) => return Err(PackError::io(dst, e)),
    };
    let bytes = io::copy(&mut input, &mut output).map_err(|e| PackError::io(dst, e))?;
    if let Ok(modified) = meta.modified() {
        output
            .set_modified(modified)
            .map_err(|e| PackError::io(dst, e))?;
    }
    drop(output);
    fs::set_permissions(dst, meta.permissions()).map_err(|e| PackError::io(dst, e))?;
    Ok(bytes)
}

fn is_skipped(rel: &Path, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let rel_str = to_slash(rel);
    let name = rel
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    patterns
        .iter()
        .any(|p| p.matches(&rel_str) || p.matches(&name))
}

/// Joins the normal components of a relative path with `/`.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
