use crate::error::{RenameError, ResolveError};
use crate::timestamp::{CaptureMoment, TimestampResolver};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "gif", "png", "cr2", "nef"];
pub const DEFAULT_DIGITS: usize = 4;
pub const DEFAULT_SIDECAR_EXTENSION: &str = "xmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameOptions {
    pub prefix: String,
    pub digits: usize,
    pub sidecars: bool,
    pub keep_case: bool,
    pub sidecar_extension: String,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            digits: DEFAULT_DIGITS,
            sidecars: true,
            keep_case: false,
            sidecar_extension: DEFAULT_SIDECAR_EXTENSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub directory: PathBuf,
    pub stem: String,
    /// Extension without the dot, as found on disk.
    pub extension: String,
}

impl CandidateFile {
    fn from_path(path: PathBuf) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_string();
        let stem = path.file_stem()?.to_string_lossy().to_string();
        let directory = path.parent()?.to_path_buf();
        Some(Self {
            path,
            directory,
            stem,
            extension,
        })
    }
}

/// Orders by capture moment, then byte size, then original path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub moment: CaptureMoment,
    pub size: u64,
    pub path: PathBuf,
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.moment
            .cmp(&other.moment)
            .then_with(|| self.size.cmp(&other.size))
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarRename {
    pub source: PathBuf,
    pub target: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    pub sequence: usize,
    pub source: PathBuf,
    pub target: PathBuf,
    pub key: SortKey,
    pub sidecar: Option<SidecarRename>,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanStats {
    pub scanned: usize,
    pub candidates: usize,
    pub skipped: usize,
    pub planned: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamePlan {
    pub directory: PathBuf,
    pub options: RenameOptions,
    pub entries: Vec<PlanEntry>,
    pub skipped: Vec<SkippedFile>,
    pub stats: PlanStats,
}

pub fn generate_plan<R>(
    directory: &Path,
    options: &RenameOptions,
    resolver: &R,
) -> Result<RenamePlan, RenameError>
where
    R: TimestampResolver + ?Sized,
{
    let mut stats = PlanStats::default();
    let listing = list_directory(directory, &mut stats)?;
    let candidates = collect_candidates(&listing);
    stats.candidates = candidates.len();

    let mut skipped = Vec::new();
    let mut keyed = Vec::<(SortKey, CandidateFile)>::with_capacity(candidates.len());
    for candidate in candidates {
        match sort_key_for(&candidate.path, resolver) {
            Ok(key) => keyed.push((key, candidate)),
            Err(err) => {
                info!("{}: {}. Skipping", candidate.path.display(), err);
                skipped.push(SkippedFile {
                    path: candidate.path,
                    reason: err.to_string(),
                });
            }
        }
    }
    stats.skipped = skipped.len();

    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    // A sidecar extension that is also an image extension would make targets collide.
    let sidecars = options.sidecars && !is_image_extension(&options.sidecar_extension);
    let mut claimed_sidecars = HashSet::<PathBuf>::new();
    let mut entries = Vec::with_capacity(keyed.len());
    for (index, (key, candidate)) in keyed.into_iter().enumerate() {
        let sequence = index + 1;
        let base = target_base(&options.prefix, sequence, options.digits);
        let target = candidate
            .directory
            .join(format!("{}.{}", base, extension_for(&candidate.extension, options)));

        let sidecar = if sidecars {
            find_sidecar(&listing, &candidate.stem, &options.sidecar_extension)
                .filter(|source| claimed_sidecars.insert(source.clone()))
                .map(|source| sidecar_rename(source, &candidate.directory, &base, options))
        } else {
            None
        };

        let changed = candidate.path != target
            || sidecar.as_ref().is_some_and(|s| s.source != s.target);
        if !changed {
            stats.unchanged += 1;
        }

        entries.push(PlanEntry {
            sequence,
            source: candidate.path,
            target,
            key,
            sidecar,
            changed,
        });
    }
    stats.planned = entries.len();

    Ok(RenamePlan {
        directory: directory.to_path_buf(),
        options: options.clone(),
        entries,
        skipped,
        stats,
    })
}

/// Zero-padded base name; numbers wider than `digits` are kept whole.
pub fn target_base(prefix: &str, sequence: usize, digits: usize) -> String {
    format!("{}{:0width$}", prefix, sequence, width = digits)
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(is_image_extension)
        .unwrap_or(false)
}

fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
}

fn list_directory(directory: &Path, stats: &mut PlanStats) -> Result<Vec<PathBuf>, RenameError> {
    if !directory.is_dir() {
        return Err(RenameError::InvalidDirectory {
            path: directory.to_path_buf(),
        });
    }

    let read_err = |source: std::io::Error| RenameError::ReadDirectory {
        path: directory.to_path_buf(),
        source,
    };

    let mut out = Vec::new();
    for entry in fs::read_dir(directory).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        stats.scanned += 1;
        let path = entry.path();
        if !path.is_file() {
            debug!("not a regular file, ignored: {}", path.display());
            continue;
        }
        out.push(path);
    }
    out.sort();
    Ok(out)
}

fn collect_candidates(listing: &[PathBuf]) -> Vec<CandidateFile> {
    listing
        .iter()
        .filter(|path| is_image(path))
        .filter_map(|path| CandidateFile::from_path(path.clone()))
        .collect()
}

fn sort_key_for<R>(path: &Path, resolver: &R) -> Result<SortKey, ResolveError>
where
    R: TimestampResolver + ?Sized,
{
    let moment = resolver.resolve(path)?;
    let size = fs::metadata(path)
        .map_err(|source| ResolveError::Unreadable { source })?
        .len();
    Ok(SortKey {
        moment,
        size,
        path: path.to_path_buf(),
    })
}

fn extension_for(extension: &str, options: &RenameOptions) -> String {
    if options.keep_case {
        extension.to_string()
    } else {
        extension.to_ascii_lowercase()
    }
}

/// Sidecar with the same stem; the lower-case spelling wins when several exist.
fn find_sidecar(listing: &[PathBuf], stem: &str, sidecar_extension: &str) -> Option<PathBuf> {
    let matches = |path: &&PathBuf| {
        path.file_stem().and_then(OsStr::to_str) == Some(stem)
            && path
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case(sidecar_extension))
                .unwrap_or(false)
    };

    let mut found: Vec<&PathBuf> = listing.iter().filter(matches).collect();
    found.sort_by_key(|path| {
        path.extension()
            .and_then(OsStr::to_str)
            .map(|ext| ext != sidecar_extension.to_ascii_lowercase())
            .unwrap_or(true)
    });
    found.first().map(|path| (*path).clone())
}

fn sidecar_rename(
    source: PathBuf,
    directory: &Path,
    base: &str,
    options: &RenameOptions,
) -> SidecarRename {
    let found_ext = source
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or(&options.sidecar_extension)
        .to_string();
    let target = directory.join(format!("{}.{}", base, extension_for(&found_ext, options)));
    SidecarRename { source, target }
}
