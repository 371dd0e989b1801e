//! The contract every cache source implements, plus the shared clearing
//! machinery sources build on.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use globset::GlobSet;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::AppError;
use crate::guard::DeletionGuard;
use crate::memo::TtlCache;
use crate::model::{
    CacheCategory, CacheInfo, CacheKind, ClearResult, SelectionCriteria, age_in_days,
};
use crate::size::{Measurement, SizeEstimator};

pub mod builtin;
pub mod directory;
pub mod docker;
pub mod project;

pub use builtin::builtin_sources;
pub use directory::{CategoryLayout, DirectorySource};
pub use docker::DockerSource;
pub use project::ProjectArtifactsSource;

pub const AVAILABILITY_TTL: Duration = Duration::from_secs(5 * 60);
pub const SIZE_TTL: Duration = Duration::from_secs(30);

/// Optional operations a source declares up front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub categories: bool,
    pub clear_by_category: bool,
}

impl Capabilities {
    pub const CATEGORIZED: Capabilities =
        Capabilities { categories: true, clear_by_category: true };
}

/// Everything a clear needs besides the source itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearRequest<'a> {
    pub dry_run: bool,
    pub criteria: Option<&'a SelectionCriteria>,
    /// A snapshot taken earlier in the same batch; rescanned when absent.
    pub cache_info: Option<&'a CacheInfo>,
    pub protected: Option<&'a GlobSet>,
}

/// Trait that all cache sources must implement.
pub trait CacheSource: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> CacheKind;

    fn description(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Cheap installation check. Absence is a normal outcome, never an error.
    fn is_available(&self, ctx: &SourceContext) -> bool;

    fn cache_info(&self, ctx: &SourceContext) -> Result<CacheInfo, AppError>;

    fn categories(&self, _ctx: &SourceContext) -> Result<Vec<CacheCategory>, AppError> {
        Err(AppError::Unsupported { source_name: self.name().to_string(), operation: "categories" })
    }

    fn clear(&self, ctx: &SourceContext, request: &ClearRequest<'_>)
    -> Result<ClearResult, AppError>;

    fn clear_by_category(
        &self,
        _ctx: &SourceContext,
        _category_ids: &[String],
        _request: &ClearRequest<'_>,
    ) -> Result<ClearResult, AppError> {
        Err(AppError::Unsupported {
            source_name: self.name().to_string(),
            operation: "clearing by category",
        })
    }
}

/// Size estimator, deletion guard and the TTL memo caches, shared by every
/// source for the lifetime of the process.
#[derive(Debug)]
pub struct SourceContext {
    pub estimator: SizeEstimator,
    pub guard: DeletionGuard,
    availability: TtlCache<String, bool>,
    sizes: TtlCache<PathBuf, Measurement>,
}

impl SourceContext {
    pub fn new(estimator: SizeEstimator, guard: DeletionGuard) -> Self {
        SourceContext {
            estimator,
            guard,
            availability: TtlCache::new(AVAILABILITY_TTL),
            sizes: TtlCache::new(SIZE_TTL),
        }
    }

    pub fn system() -> Self {
        SourceContext::new(SizeEstimator::new(), DeletionGuard::system())
    }

    pub fn available_with<F>(&self, name: &str, probe: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        self.availability.get_or_insert_with(name.to_string(), probe)
    }

    pub fn measure(&self, path: &Path) -> Measurement {
        self.sizes.get_or_insert_with(path.to_path_buf(), || self.estimator.measure(path))
    }

    /// Sampling-only fast path for caches known to be huge.
    pub fn estimate(&self, path: &Path) -> Measurement {
        self.sizes.get_or_insert_with(path.to_path_buf(), || self.estimator.estimate(path))
    }

    pub fn measure_fresh(&self, path: &Path) -> Measurement {
        let measured = self.estimator.measure(path);
        self.sizes.insert(path.to_path_buf(), measured);
        measured
    }

    pub fn remove(&self, path: &Path) -> Result<(), AppError> {
        let result = self.guard.remove(path);
        self.sizes.invalidate_where(|cached| cached.starts_with(path) || path.starts_with(cached));
        result
    }
}

/// True when `path` or any of its ancestors matches a protected glob.
pub fn is_protected(path: &Path, protected: Option<&GlobSet>) -> bool {
    let Some(set) = protected else { return false };
    path.ancestors().any(|candidate| set.is_match(candidate))
}

fn contains_protected(path: &Path, set: &GlobSet) -> bool {
    WalkDir::new(path)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .any(|entry| set.is_match(entry.path()))
}

// The parts of `path` that can go without touching a protected descendant.
// `path` itself must already be known to be unprotected.
fn unprotected_parts(path: &Path, set: &GlobSet) -> Vec<PathBuf> {
    if !contains_protected(path, set) {
        return vec![path.to_path_buf()];
    }
    let Ok(entries) = fs::read_dir(path) else { return Vec::new() };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|child| !set.is_match(child))
        .flat_map(|child| unprotected_parts(&child, set))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ClearTarget {
    pub path: PathBuf,
    pub size: u64,
    pub category: Option<String>,
}

/// Resolved set of paths one clear will touch.
#[derive(Debug, Clone)]
pub struct ClearPlan {
    pub name: String,
    pub size_before: u64,
    /// Paths re-measured after a real clear to compute `size_after`.
    pub owned_paths: Vec<PathBuf>,
    pub targets: Vec<ClearTarget>,
}

impl ClearPlan {
    pub fn new(info: &CacheInfo) -> Self {
        ClearPlan {
            name: info.name.clone(),
            size_before: info.size,
            owned_paths: info.paths.clone(),
            targets: Vec::new(),
        }
    }

    /// Whole-source plan, narrowed by `criteria` when one is given.
    ///
    /// With categories, the criteria pick categories. Without them, each owned
    /// path is judged on its own size and age.
    pub fn select<F>(info: &CacheInfo, criteria: Option<&SelectionCriteria>, size_of: F) -> Self
    where
        F: Fn(&Path) -> Measurement,
    {
        let mut plan = ClearPlan::new(info);
        match criteria.filter(|criteria| !criteria.is_empty()) {
            None => {
                for path in &info.paths {
                    plan.push(path.clone(), size_of(path).bytes, None);
                }
            }
            Some(criteria) if !info.categories.is_empty() => {
                let matching = info.categories.iter().filter(|category| criteria.matches(category));
                for category in matching {
                    plan.push_category(category, &size_of);
                }
            }
            Some(criteria) => {
                let now = SystemTime::now();
                for path in &info.paths {
                    let measured = size_of(path);
                    let age = age_in_days(measured.last_modified, now);
                    if criteria.matches_path(measured.bytes, age) {
                        plan.push(path.clone(), measured.bytes, None);
                    }
                }
            }
        }
        plan
    }

    /// Plan restricted to the named categories, still subject to `criteria`.
    pub fn select_categories<F>(
        info: &CacheInfo,
        category_ids: &[String],
        criteria: Option<&SelectionCriteria>,
        size_of: F,
    ) -> Self
    where
        F: Fn(&Path) -> Measurement,
    {
        let mut plan = ClearPlan::new(info);
        for category in &info.categories {
            if !category_ids.contains(&category.id) {
                continue;
            }
            if let Some(criteria) = criteria
                && !criteria.matches(category)
            {
                continue;
            }
            plan.push_category(category, &size_of);
        }
        plan
    }

    fn push_category<F>(&mut self, category: &CacheCategory, size_of: &F)
    where
        F: Fn(&Path) -> Measurement,
    {
        for path in &category.paths {
            self.push(path.clone(), size_of(path).bytes, Some(category.id.clone()));
        }
    }

    pub fn push(&mut self, path: PathBuf, size: u64, category: Option<String>) {
        if !self.targets.iter().any(|target| target.path == path) {
            self.targets.push(ClearTarget { path, size, category });
        }
    }

    /// Drop every target covered by a protected glob. A target holding a
    /// protected descendant is replaced by its unprotected children.
    pub fn without_protected(mut self, ctx: &SourceContext, protected: Option<&GlobSet>) -> Self {
        let Some(set) = protected else { return self };
        let mut kept = Vec::new();
        for target in std::mem::take(&mut self.targets) {
            if is_protected(&target.path, protected) {
                info!(path = %target.path.display(), "skipping protected path");
                continue;
            }
            let parts = unprotected_parts(&target.path, set);
            if parts.len() == 1 && parts[0] == target.path {
                kept.push(target);
                continue;
            }
            info!(path = %target.path.display(), "splitting around protected descendants");
            for part in parts {
                let size = ctx.measure(&part).bytes;
                kept.push(ClearTarget { path: part, size, category: target.category.clone() });
            }
        }
        self.targets = kept;
        self
    }

    /// Carry out the plan. Dry runs validate every target against the guard
    /// but never remove anything.
    ///
    /// Every target is checked against the guard before anything is removed,
    /// so an unsafe target aborts the clear with the disk untouched. Any other
    /// removal failure is recorded in the result and the remaining targets
    /// still run.
    pub fn execute(self, ctx: &SourceContext, dry_run: bool) -> Result<ClearResult, AppError> {
        for target in &self.targets {
            ctx.guard.check(&target.path)?;
        }

        let mut cleared_paths = Vec::new();
        let mut cleared_categories: Vec<String> = Vec::new();
        let mut error = None;
        let mut predicted = 0u64;

        for target in &self.targets {
            if dry_run {
                predicted = predicted.saturating_add(target.size);
            } else {
                match ctx.remove(&target.path) {
                    Ok(()) => {}
                    Err(err) => {
                        warn!(source = %self.name, "{err}");
                        error.get_or_insert_with(|| err.to_string());
                        continue;
                    }
                }
            }
            cleared_paths.push(target.path.clone());
            if let Some(category) = &target.category
                && !cleared_categories.contains(category)
            {
                cleared_categories.push(category.clone());
            }
        }

        let size_after = if dry_run {
            self.size_before.saturating_sub(predicted)
        } else {
            self.owned_paths.iter().map(|path| ctx.measure_fresh(path).bytes).sum()
        };

        Ok(ClearResult {
            name: self.name,
            success: error.is_none(),
            dry_run,
            size_before: self.size_before,
            size_after,
            error,
            cleared_paths,
            cleared_categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use globset::{Glob, GlobSetBuilder};
    use std::fs;
    use tempfile::TempDir;

    fn context(root: &Path) -> SourceContext {
        SourceContext::new(
            SizeEstimator::new(),
            DeletionGuard::with_roots(vec![root.to_path_buf()]).with_retry(1, Duration::ZERO),
        )
    }

    fn info_for(paths: Vec<PathBuf>, size: u64) -> CacheInfo {
        let mut info = CacheInfo::absent("fixture", CacheKind::Other, "fixture");
        info.is_installed = true;
        info.paths = paths;
        info.size = size;
        info
    }

    #[test]
    fn protected_matches_ancestors() {
        let mut builder = GlobSetBuilder::new();
        builder.add(Glob::new("/home/me/.npm").unwrap());
        let set = builder.build().unwrap();
        assert!(is_protected(Path::new("/home/me/.npm/_logs"), Some(&set)));
        assert!(!is_protected(Path::new("/home/me/.yarn"), Some(&set)));
        assert!(!is_protected(Path::new("/home/me/.npm"), None));
    }

    #[test]
    fn dry_run_leaves_disk_untouched() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cache");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a"), vec![0u8; 64]).unwrap();

        let ctx = context(temp.path());
        let info = info_for(vec![dir.clone()], 64);
        let mut plan = ClearPlan::new(&info);
        plan.push(dir.clone(), 64, None);

        let result = plan.execute(&ctx, true).unwrap();
        assert!(result.success);
        assert!(result.dry_run);
        assert_eq!(result.cleared_paths, vec![dir.clone()]);
        assert_eq!(result.size_after, 0);
        assert!(dir.join("a").exists());
    }

    #[test]
    fn unsafe_target_aborts_even_in_dry_run() {
        let temp = TempDir::new().unwrap();
        let safe = temp.path().join("safe");
        fs::create_dir_all(&safe).unwrap();
        let ctx = context(&safe);
        let info = info_for(Vec::new(), 0);

        let mut plan = ClearPlan::new(&info);
        plan.push(temp.path().join("elsewhere"), 0, None);
        assert!(plan.clone().execute(&ctx, true).unwrap_err().is_unsafe_path());
        assert!(plan.execute(&ctx, false).unwrap_err().is_unsafe_path());
    }

    #[test]
    fn removal_invalidates_cached_sizes() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cache");
        fs::create_dir_all(dir.join("logs")).unwrap();
        fs::write(dir.join("logs/a.log"), vec![0u8; 100]).unwrap();
        fs::write(dir.join("keep.bin"), vec![0u8; 50]).unwrap();

        let ctx = context(temp.path());
        assert_eq!(ctx.measure(&dir).bytes, 150);
        ctx.remove(&dir.join("logs")).unwrap();
        assert_eq!(ctx.measure(&dir).bytes, 50);
    }
}
