use crate::error::RenameError;
use crate::planner::RenamePlan;
use log::{debug, error, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub const TEMP_NAME_LEN: usize = 16;
pub const MAX_TEMP_NAME_ATTEMPTS: usize = 10;
const TEMP_NAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApplyResult {
    pub renamed: usize,
    pub unchanged: usize,
    pub staged: usize,
    pub sidecars_renamed: usize,
    pub failures: Vec<RenameFailure>,
    pub stranded: Vec<StrandedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameFailure {
    pub from: PathBuf,
    pub to: PathBuf,
    pub message: String,
}

/// A file moved out of the way that no plan entry came back for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrandedFile {
    pub original: PathBuf,
    pub temp: PathBuf,
}

/// Destination path -> temporary path it was vacated to.
#[derive(Debug, Default)]
pub struct CollisionMap {
    staged: HashMap<PathBuf, PathBuf>,
}

impl CollisionMap {
    pub fn stage(&mut self, destination: PathBuf, temp: PathBuf) {
        self.staged.insert(destination, temp);
    }

    fn get(&self, path: &Path) -> Option<&PathBuf> {
        self.staged.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.staged.contains_key(path)
    }

    pub fn remove(&mut self, path: &Path) -> Option<PathBuf> {
        self.staged.remove(path)
    }

    fn into_stranded(self) -> Vec<StrandedFile> {
        let mut out: Vec<StrandedFile> = self
            .staged
            .into_iter()
            .map(|(original, temp)| StrandedFile { original, temp })
            .collect();
        out.sort_by(|a, b| a.original.cmp(&b.original));
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Renamed,
    Unchanged,
}

/// Entry names of the plan directory, listed once and kept in step with
/// every rename the run performs.
#[derive(Debug)]
struct DirectoryNames {
    dir: PathBuf,
    names: Option<HashSet<OsString>>,
}

impl DirectoryNames {
    fn scan(dir: &Path) -> Self {
        let names = list_names(dir);
        if names.is_none() {
            debug!("could not list {}, checking names per file", dir.display());
        }
        Self {
            dir: dir.to_path_buf(),
            names,
        }
    }

    /// Exact, byte-for-byte lookup of `path`'s file name.
    fn contains(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        match &self.names {
            Some(names) if parent_dir(path) == self.dir.as_path() => names.contains(name),
            _ => match list_names(parent_dir(path)) {
                Some(names) => names.contains(name),
                None => true,
            },
        }
    }

    fn moved(&mut self, from: &Path, to: &Path) {
        let Some(names) = self.names.as_mut() else {
            return;
        };
        if parent_dir(from) == self.dir.as_path() {
            if let Some(name) = from.file_name() {
                names.remove(name);
            }
        }
        if parent_dir(to) == self.dir.as_path() {
            if let Some(name) = to.file_name() {
                names.insert(name.to_os_string());
            }
        }
    }
}

/// Runs renames one at a time, vacating occupied destinations first.
struct Stager<G> {
    collisions: CollisionMap,
    names: DirectoryNames,
    next_name: G,
    staged: usize,
}

impl<G> Stager<G>
where
    G: FnMut() -> String,
{
    fn new(dir: &Path, next_name: G) -> Self {
        Self {
            collisions: CollisionMap::default(),
            names: DirectoryNames::scan(dir),
            next_name,
            staged: 0,
        }
    }

    fn is_present(&self, path: &Path) -> bool {
        self.collisions.contains(path) || self.exists_exact(path)
    }

    /// Like `is_file`, but the name must match a directory entry byte for byte.
    fn exists_exact(&self, path: &Path) -> bool {
        path.is_file() && self.names.contains(path)
    }

    /// Whether renaming `src` onto `dst` would replace some other file.
    ///
    /// On a case-insensitive volume `dst` may resolve to a differently cased
    /// entry; that entry only counts as free when it is `src` itself.
    fn occupied_by_other(&self, src: &Path, dst: &Path) -> bool {
        if !dst.is_file() {
            return false;
        }
        if self.names.contains(dst) {
            return true;
        }
        let src_is_variant = parent_dir(src) == parent_dir(dst)
            && same_name_ignoring_case(src, dst)
            && self.names.contains(src);
        !src_is_variant
    }

    fn safe_rename(&mut self, src: &Path, dst: &Path) -> Result<Outcome, RenameError> {
        if src == dst && !self.collisions.contains(src) {
            return Ok(Outcome::Unchanged);
        }

        if src != dst && self.occupied_by_other(src, dst) {
            let dir = parent_dir(dst);
            let temp = temp_path_in(dir, &mut self.next_name)?;
            info!(
                "Temporarily renaming {} to {}",
                dst.display(),
                temp.display()
            );
            fs::rename(dst, &temp).map_err(|source| RenameError::RenameFailed {
                from: dst.to_path_buf(),
                to: temp.clone(),
                source,
            })?;
            self.names.moved(dst, &temp);
            self.collisions.stage(dst.to_path_buf(), temp);
            self.staged += 1;
        }

        let staged_source = self.collisions.get(src).cloned();
        let from = staged_source.as_deref().unwrap_or(src);
        info!("Renaming {} to {}", from.display(), dst.display());
        fs::rename(from, dst).map_err(|source| RenameError::RenameFailed {
            from: from.to_path_buf(),
            to: dst.to_path_buf(),
            source,
        })?;
        self.names.moved(from, dst);
        if staged_source.is_some() {
            self.collisions.remove(src);
        }

        Ok(Outcome::Renamed)
    }
}

pub fn apply_plan(plan: &RenamePlan) -> ApplyResult {
    apply_plan_with_names(plan, random_temp_name)
}

fn apply_plan_with_names<G>(plan: &RenamePlan, next_name: G) -> ApplyResult
where
    G: FnMut() -> String,
{
    let mut stager = Stager::new(&plan.directory, next_name);
    let mut result = ApplyResult::default();

    for entry in &plan.entries {
        match stager.safe_rename(&entry.source, &entry.target) {
            Ok(Outcome::Renamed) => result.renamed += 1,
            Ok(Outcome::Unchanged) => result.unchanged += 1,
            Err(err) => {
                record_failure(&mut result, &entry.source, &entry.target, &err);
                if let Some(sidecar) = &entry.sidecar {
                    warn!(
                        "{}: left in place because its image was not renamed",
                        sidecar.source.display()
                    );
                }
                continue;
            }
        }

        let Some(sidecar) = &entry.sidecar else {
            continue;
        };
        if !stager.is_present(&sidecar.source) {
            debug!("sidecar vanished, skipped: {}", sidecar.source.display());
            continue;
        }
        match stager.safe_rename(&sidecar.source, &sidecar.target) {
            Ok(Outcome::Renamed) => result.sidecars_renamed += 1,
            Ok(Outcome::Unchanged) => {}
            Err(err) => record_failure(&mut result, &sidecar.source, &sidecar.target, &err),
        }
    }

    result.staged = stager.staged;
    result.stranded = stager.collisions.into_stranded();
    for stranded in &result.stranded {
        warn!(
            "{} was moved aside to {} and not reclaimed",
            stranded.original.display(),
            stranded.temp.display()
        );
    }

    result
}

fn record_failure(result: &mut ApplyResult, from: &Path, to: &Path, err: &RenameError) {
    error!("{err}");
    result.failures.push(RenameFailure {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        message: err.to_string(),
    });
}

fn list_names(dir: &Path) -> Option<HashSet<OsString>> {
    let entries = fs::read_dir(dir).ok()?;
    Some(entries.flatten().map(|entry| entry.file_name()).collect())
}

fn same_name_ignoring_case(a: &Path, b: &Path) -> bool {
    match (a.file_name(), b.file_name()) {
        (Some(a), Some(b)) => {
            a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
        }
        _ => false,
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn temp_path_in<G>(dir: &Path, next_name: &mut G) -> Result<PathBuf, RenameError>
where
    G: FnMut() -> String,
{
    for _ in 0..MAX_TEMP_NAME_ATTEMPTS {
        let candidate = dir.join(next_name());
        if fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
        debug!("temporary name taken, retrying: {}", candidate.display());
    }
    Err(RenameError::TempNameExhausted {
        dir: dir.to_path_buf(),
        attempts: MAX_TEMP_NAME_ATTEMPTS,
    })
}

fn random_temp_name() -> String {
    let mut rng = rand::thread_rng();
    (0..TEMP_NAME_LEN)
        .map(|_| TEMP_NAME_CHARSET[rng.gen_range(0..TEMP_NAME_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        apply_plan, apply_plan_with_names, random_temp_name, temp_path_in, Outcome, Stager,
        MAX_TEMP_NAME_ATTEMPTS, TEMP_NAME_LEN,
    };
    use crate::error::RenameError;
    use crate::planner::tests::{photo, ContentResolver};
    use crate::planner::{generate_plan, RenameOptions};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const T1: &str = "2020:01:01 10:00:01";
    const T2: &str = "2020:01:01 10:00:02";
    const T3: &str = "2020:01:01 10:00:03";

    fn head(path: &Path) -> String {
        let body = fs::read(path).expect("read file");
        String::from_utf8_lossy(&body[..body.len().min(19)]).into_owned()
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("read dir")
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn random_names_have_fixed_length_and_charset() {
        let name = random_temp_name();
        assert_eq!(name.len(), TEMP_NAME_LEN);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn temp_path_rerolls_taken_names() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("taken"), b"x").expect("write");

        let mut names = vec!["taken", "free"].into_iter();
        let mut next = || names.next().unwrap_or("never").to_string();
        let path = temp_path_in(temp.path(), &mut next).expect("second name is free");
        assert_eq!(path, temp.path().join("free"));
    }

    #[test]
    fn temp_path_gives_up_after_bounded_attempts() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("taken"), b"x").expect("write");

        let mut calls = 0usize;
        let mut next = || {
            calls += 1;
            "taken".to_string()
        };
        let err = temp_path_in(temp.path(), &mut next).expect_err("always taken");
        assert!(matches!(
            err,
            RenameError::TempNameExhausted { attempts, .. } if attempts == MAX_TEMP_NAME_ATTEMPTS
        ));
        assert_eq!(calls, MAX_TEMP_NAME_ATTEMPTS);
    }

    #[test]
    fn exhausted_temp_names_leave_both_files_untouched() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(dir.join("taken"), b"t").expect("write");
        fs::write(dir.join("a.jpg"), b"a").expect("write a");
        fs::write(dir.join("b.jpg"), b"b").expect("write b");

        let mut stager = Stager::new(dir, || "taken".to_string());
        let err = stager
            .safe_rename(&dir.join("a.jpg"), &dir.join("b.jpg"))
            .expect_err("no temp name");
        assert!(matches!(err, RenameError::TempNameExhausted { .. }));
        assert_eq!(fs::read(dir.join("a.jpg")).expect("a"), b"a");
        assert_eq!(fs::read(dir.join("b.jpg")).expect("b"), b"b");
    }

    #[test]
    fn same_path_is_a_no_op() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("0001.jpg");
        fs::write(&path, b"x").expect("write");

        let mut stager = Stager::new(temp.path(), random_temp_name);
        let outcome = stager.safe_rename(&path, &path).expect("no-op");
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(stager.staged, 0);
        assert_eq!(file_names(temp.path()), vec!["0001.jpg"]);
    }

    #[test]
    fn exact_existence_compares_names_byte_for_byte() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("Photo.JPG"), b"x").expect("write");
        fs::create_dir(temp.path().join("dir.jpg")).expect("mkdir");

        let stager = Stager::new(temp.path(), random_temp_name);
        assert!(stager.exists_exact(&temp.path().join("Photo.JPG")));
        assert!(!stager.exists_exact(&temp.path().join("photo.jpg")));
        assert!(!stager.exists_exact(&temp.path().join("dir.jpg")));
        assert!(!stager.exists_exact(&temp.path().join("absent.jpg")));
    }

    #[test]
    fn occupied_only_when_another_file_holds_the_name() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(dir.join("a.jpg"), b"a").expect("write a");
        fs::write(dir.join("b.jpg"), b"b").expect("write b");
        fs::create_dir(dir.join("c.jpg")).expect("mkdir");

        let stager = Stager::new(dir, random_temp_name);
        assert!(stager.occupied_by_other(&dir.join("a.jpg"), &dir.join("b.jpg")));
        assert!(!stager.occupied_by_other(&dir.join("a.jpg"), &dir.join("d.jpg")));
        assert!(!stager.occupied_by_other(&dir.join("a.jpg"), &dir.join("c.jpg")));
    }

    #[test]
    fn name_snapshot_follows_each_rename() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(dir.join("a.jpg"), b"a").expect("write a");
        fs::write(dir.join("b.jpg"), b"b").expect("write b");

        let mut stager = Stager::new(dir, || "parkedparkedpark".to_string());
        stager
            .safe_rename(&dir.join("a.jpg"), &dir.join("b.jpg"))
            .expect("staged rename");

        assert!(!stager.exists_exact(&dir.join("a.jpg")));
        assert!(stager.exists_exact(&dir.join("b.jpg")));
        assert!(stager.exists_exact(&dir.join("parkedparkedpark")));
        assert!(stager.is_present(&dir.join("b.jpg")));
        assert!(stager.occupied_by_other(&dir.join("c.jpg"), &dir.join("b.jpg")));
        assert!(!stager.occupied_by_other(&dir.join("c.jpg"), &dir.join("a.jpg")));
        assert_eq!(fs::read(dir.join("b.jpg")).expect("b"), b"a");
    }

    #[test]
    fn file_created_after_listing_still_blocks_its_name() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(dir.join("a.jpg"), b"a").expect("write a");

        let mut stager = Stager::new(dir, || "parkedparkedpark".to_string());
        fs::write(dir.join("0001.jpg"), b"late").expect("write late file");
        stager
            .safe_rename(&dir.join("a.jpg"), &dir.join("0001.jpg"))
            .expect("staged rename");

        assert_eq!(stager.staged, 1);
        assert_eq!(fs::read(dir.join("0001.jpg")).expect("read"), b"a");
        assert_eq!(fs::read(dir.join("parkedparkedpark")).expect("read"), b"late");
    }

    #[test]
    fn cyclic_renames_keep_every_file() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        photo(dir, "0001.jpg", T3, 0);
        photo(dir, "0002.jpg", T1, 0);
        photo(dir, "0003.jpg", T2, 0);

        let plan = generate_plan(dir, &RenameOptions::default(), &ContentResolver).expect("plan");
        let result = apply_plan(&plan);

        assert!(result.failures.is_empty(), "{:?}", result.failures);
        assert!(result.stranded.is_empty());
        assert_eq!(result.renamed, 3);
        assert!(result.staged >= 1);
        assert_eq!(file_names(dir), vec!["0001.jpg", "0002.jpg", "0003.jpg"]);
        assert_eq!(head(&dir.join("0001.jpg")), T1);
        assert_eq!(head(&dir.join("0002.jpg")), T2);
        assert_eq!(head(&dir.join("0003.jpg")), T3);
    }

    #[test]
    fn naive_overwrite_order_is_staged() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        // c.jpg sorts first and wants img_1.jpg, which itself sorts last.
        photo(dir, "a.jpg", T2, 0);
        photo(dir, "b.jpg", T3, 0);
        photo(dir, "c.jpg", T1, 0);
        photo(dir, "img_1.jpg", T3, 5);

        let options = RenameOptions {
            prefix: "img_".to_string(),
            digits: 1,
            ..RenameOptions::default()
        };
        let plan = generate_plan(dir, &options, &ContentResolver).expect("plan");
        let result = apply_plan(&plan);

        assert!(result.failures.is_empty(), "{:?}", result.failures);
        assert_eq!(result.staged, 1);
        assert_eq!(
            file_names(dir),
            vec!["img_1.jpg", "img_2.jpg", "img_3.jpg", "img_4.jpg"]
        );
        assert_eq!(head(&dir.join("img_1.jpg")), T1);
        assert_eq!(head(&dir.join("img_2.jpg")), T2);
        assert_eq!(head(&dir.join("img_3.jpg")), T3);
        assert_eq!(fs::read(dir.join("img_4.jpg")).expect("read").len(), 24);
    }

    #[test]
    fn staged_sidecar_follows_its_image() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        photo(dir, "0001.jpg", T2, 0);
        fs::write(dir.join("0001.xmp"), b"sidecar of T2").expect("write xmp");
        photo(dir, "a.jpg", T1, 0);
        fs::write(dir.join("a.xmp"), b"sidecar of T1").expect("write xmp");

        let plan = generate_plan(dir, &RenameOptions::default(), &ContentResolver).expect("plan");
        let result = apply_plan(&plan);

        assert!(result.failures.is_empty(), "{:?}", result.failures);
        assert!(result.stranded.is_empty());
        assert_eq!(result.sidecars_renamed, 2);
        assert_eq!(
            file_names(dir),
            vec!["0001.jpg", "0001.xmp", "0002.jpg", "0002.xmp"]
        );
        assert_eq!(head(&dir.join("0001.jpg")), T1);
        assert_eq!(fs::read(dir.join("0001.xmp")).expect("xmp"), b"sidecar of T1");
        assert_eq!(head(&dir.join("0002.jpg")), T2);
        assert_eq!(fs::read(dir.join("0002.xmp")).expect("xmp"), b"sidecar of T2");
    }

    #[test]
    fn unclaimed_occupant_is_reported_as_stranded() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(dir.join("0001.jpg"), b"").expect("write occupant");
        photo(dir, "a.jpg", T1, 0);

        let plan = generate_plan(dir, &RenameOptions::default(), &ContentResolver).expect("plan");
        let result = apply_plan_with_names(&plan, || "parkedparkedpark".to_string());

        assert!(result.failures.is_empty());
        assert_eq!(result.stranded.len(), 1);
        assert_eq!(result.stranded[0].original, dir.join("0001.jpg"));
        assert_eq!(result.stranded[0].temp, dir.join("parkedparkedpark"));
        assert_eq!(head(&dir.join("0001.jpg")), T1);
        assert!(dir.join("parkedparkedpark").exists());
    }

    #[test]
    fn failed_rename_does_not_stop_the_batch() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::create_dir(dir.join("0001.jpg")).expect("blocking dir");
        photo(dir, "a.jpg", T1, 0);
        fs::write(dir.join("a.xmp"), b"sidecar").expect("write xmp");
        photo(dir, "b.jpg", T2, 0);

        let plan = generate_plan(dir, &RenameOptions::default(), &ContentResolver).expect("plan");
        let result = apply_plan(&plan);

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].from, dir.join("a.jpg"));
        assert_eq!(result.renamed, 1);
        assert_eq!(result.sidecars_renamed, 0);
        assert!(dir.join("a.jpg").exists());
        assert!(dir.join("a.xmp").exists());
        assert_eq!(head(&dir.join("0002.jpg")), T2);
    }
}
