use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use libpack_lib::{Config, DEFAULT_NAME, SourceEntry};
use tracing::info;

use crate::error::{PackError, PackResult};
use crate::fs_utils::{StagedEntry, assemble};
use crate::naming::{archive_path, library_stem, same_path};
use crate::packaging::{archive, zip::Compressor};

/// Everything one run needs, validated.
#[derive(Debug, Clone)]
pub struct Plan {
    pub name: String,
    pub staging: PathBuf,
    pub archive: PathBuf,
    pub entries: Vec<StagedEntry>,
    pub skip: Vec<Pattern>,
    pub compressor: Compressor,
    pub clean: bool,
    pub dry: bool,
}

impl Plan {
    /// Resolves a merged config. Unset fields fall back to the built-in defaults;
    /// the staging directory defaults to the library name without `.zip`.
    pub fn from_config(config: &Config) -> PackResult<Self> {
        let name = config.name.clone().unwrap_or_else(|| DEFAULT_NAME.to_string());
        let output_dir = PathBuf::from(config.output_dir.as_deref().unwrap_or("."));
        let archive = archive_path(&output_dir, &name)?;
        let staging = PathBuf::from(
            config
                .staging
                .clone()
                .unwrap_or_else(|| library_stem(&name).to_string()),
        );
        if same_path(&staging, &archive) {
            return Err(PackError::Config {
                path: archive,
                error: "archive path and staging directory are the same".to_string(),
            });
        }

        let entries = config
            .entries
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(resolve_entry)
            .collect::<PackResult<Vec<_>>>()?;

        let skip = config
            .skip
            .iter()
            .flatten()
            .map(|p| {
                Pattern::new(p).map_err(|e| PackError::InvalidPattern {
                    pattern: p.clone(),
                    error: e.to_string(),
                })
            })
            .collect::<PackResult<Vec<_>>>()?;

        let compressor = if config.compress.unwrap_or(true) {
            Compressor::Deflate
        } else {
            Compressor::Stored
        };

        Ok(Plan {
            name,
            staging,
            archive,
            entries,
            skip,
            compressor,
            clean: config.clean.unwrap_or(false),
            dry: config.dry.unwrap_or(false),
        })
    }
}

fn resolve_entry(entry: &SourceEntry) -> PackResult<StagedEntry> {
    let dest = Path::new(&entry.dest);
    let escapes = dest.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(PackError::InvalidEntry {
            entry: format!("{}={}", entry.source, entry.dest),
            reason: "destination must be relative to the staging directory".to_string(),
        });
    }
    if entry.source.trim().is_empty() {
        return Err(PackError::InvalidEntry {
            entry: format!("={}", entry.dest),
            reason: "source directory is empty".to_string(),
        });
    }
    Ok(StagedEntry {
        source: PathBuf::from(&entry.source),
        dest: dest.to_path_buf(),
    })
}

/// Parses a command-line entry, `SRC=DEST` or `SRC` (lands at the staging root).
pub fn parse_entry_arg(arg: &str) -> PackResult<SourceEntry> {
    let (source, dest) = match arg.split_once('=') {
        Some((source, dest)) => (source, dest),
        None => (arg, "."),
    };
    if source.is_empty() {
        return Err(PackError::InvalidEntry {
            entry: arg.to_string(),
            reason: "source directory is empty".to_string(),
        });
    }
    Ok(SourceEntry::new(source, if dest.is_empty() { "." } else { dest }))
}

/// Copies every entry into staging, then zips staging. Returns the archive path.
///
/// A failing copy aborts before the archive step, so no archive is written.
pub fn run(plan: &Plan) -> PackResult<PathBuf> {
    if plan.clean && plan.staging.exists() {
        info!(staging = %plan.staging.display(), "removing previous staging directory");
        fs::remove_dir_all(&plan.staging).map_err(|e| PackError::io(&plan.staging, e))?;
    }

    let report = assemble(&plan.staging, &plan.entries, &plan.skip)?;
    info!(
        files = report.files,
        dirs = report.dirs,
        bytes = report.bytes,
        skipped = report.skipped,
        "staging directory populated"
    );

    archive(&plan.staging, &plan.archive, plan.compressor)
}

/// Human-readable listing of what `run` would do.
pub fn describe(plan: &Plan) -> String {
    let mut out = format!("Library: {}\n", plan.name);
    for entry in &plan.entries {
        out.push_str(&format!(
            "  {} -> {}\n",
            entry.source.display(),
            plan.staging.join(&entry.dest).display()
        ));
    }
    out.push_str(&format!(
        "Archive: {} ({:?})\n",
        plan.archive.display(),
        plan.compressor
    ));
    if plan.clean {
        out.push_str(&format!(
            "Staging directory {} is removed first\n",
            plan.staging.display()
        ));
    }
    out
}
