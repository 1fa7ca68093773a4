use std::path::{Component, Path, PathBuf};

use crate::error::{PackError, PackResult};

const ARCHIVE_EXT: &str = ".zip";

/// Builds `<output_dir>/<name>.zip` for a library name.
pub fn archive_path(output_dir: &Path, name: &str) -> PackResult<PathBuf> {
    let name = name.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(PackError::InvalidName {
            name: name.to_string(),
        });
    }

    let file_name = if name.to_ascii_lowercase().ends_with(ARCHIVE_EXT) {
        name.to_string()
    } else {
        format!("{name}{ARCHIVE_EXT}")
    };
    Ok(output_dir.join(file_name))
}

/// The library name without a trailing `.zip`, used as the default staging directory.
pub fn library_stem(name: &str) -> &str {
    let name = name.trim();
    if name.len() > ARCHIVE_EXT.len() && name.to_ascii_lowercase().ends_with(ARCHIVE_EXT) {
        &name[..name.len() - ARCHIVE_EXT.len()]
    } else {
        name
    }
}

/// Compares two paths component-wise, ignoring `.` components.
pub fn same_path(a: &Path, b: &Path) -> bool {
    fn normal(p: &Path) -> Vec<Component<'_>> {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect::<Vec<_>>()
    }
    normal(a) == normal(b)
}
