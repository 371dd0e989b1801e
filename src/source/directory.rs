use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::AppError;
use crate::model::{
    CacheCategory, CacheInfo, CacheKind, ClearResult, Priority, UseCase, age_in_days,
};
use crate::size::Measurement;

use super::{CacheSource, Capabilities, ClearPlan, ClearRequest, SourceContext};

/// One named slice of a directory cache, located relative to each root.
#[derive(Debug, Clone)]
pub struct CategoryLayout {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub subpaths: &'static [&'static str],
    pub priority: Priority,
    pub use_case: UseCase,
}

impl CategoryLayout {
    pub const fn new(
        id: &'static str,
        name: &'static str,
        subpaths: &'static [&'static str],
        priority: Priority,
        use_case: UseCase,
    ) -> Self {
        CategoryLayout { id, name, description: name, subpaths, priority, use_case }
    }
}

/// A cache that lives in a fixed set of directories.
pub struct DirectorySource {
    name: String,
    kind: CacheKind,
    description: String,
    binaries: Vec<String>,
    roots: Vec<PathBuf>,
    layout: Vec<CategoryLayout>,
    estimate_only: bool,
}

impl DirectorySource {
    pub fn new(name: &str, kind: CacheKind, description: &str) -> Self {
        DirectorySource {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            binaries: Vec::new(),
            roots: Vec::new(),
            layout: Vec::new(),
            estimate_only: false,
        }
    }

    /// Executable whose presence on `PATH` marks the tool as installed.
    pub fn binary(mut self, binary: &str) -> Self {
        self.binaries.push(binary.to_string());
        self
    }

    /// Candidate cache root. Missing roots are skipped at scan time.
    pub fn root(mut self, path: PathBuf) -> Self {
        if !self.roots.contains(&path) {
            self.roots.push(path);
        }
        self
    }

    pub fn roots<I>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        paths.into_iter().fold(self, DirectorySource::root)
    }

    pub fn category(mut self, layout: CategoryLayout) -> Self {
        self.layout.push(layout);
        self
    }

    /// Size with sampling only. For caches known to be too large to walk.
    pub fn estimate_only(mut self) -> Self {
        self.estimate_only = true;
        self
    }

    fn existing_roots(&self) -> Vec<PathBuf> {
        self.roots.iter().filter(|root| root.exists()).cloned().collect()
    }

    fn measure(&self, ctx: &SourceContext, path: &Path) -> Measurement {
        if self.estimate_only { ctx.estimate(path) } else { ctx.measure(path) }
    }

    fn build_categories(&self, ctx: &SourceContext, roots: &[PathBuf]) -> Vec<CacheCategory> {
        let now = SystemTime::now();
        self.layout
            .iter()
            .filter_map(|layout| {
                let paths: Vec<PathBuf> = roots
                    .iter()
                    .flat_map(|root| layout.subpaths.iter().map(move |sub| root.join(sub)))
                    .filter(|path| path.exists())
                    .collect();
                if paths.is_empty() {
                    return None;
                }
                let mut total = Measurement::default();
                for path in &paths {
                    total.merge(self.measure(ctx, path));
                }
                Some(CacheCategory {
                    id: layout.id.to_string(),
                    name: layout.name.to_string(),
                    description: layout.description.to_string(),
                    paths,
                    size: total.bytes,
                    last_modified: total.last_modified,
                    age_days: age_in_days(total.last_modified, now),
                    priority: layout.priority,
                    use_case: layout.use_case,
                    is_project_specific: false,
                    project_path: None,
                })
            })
            .collect()
    }

    fn snapshot(
        &self,
        ctx: &SourceContext,
        request: &ClearRequest<'_>,
    ) -> Result<CacheInfo, AppError> {
        match request.cache_info {
            Some(info) => Ok(info.clone()),
            None => self.cache_info(ctx),
        }
    }
}

impl CacheSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CacheKind {
        self.kind
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn capabilities(&self) -> Capabilities {
        if self.layout.is_empty() { Capabilities::default() } else { Capabilities::CATEGORIZED }
    }

    fn is_available(&self, ctx: &SourceContext) -> bool {
        ctx.available_with(&self.name, || {
            self.binaries.iter().any(|binary| which::which(binary).is_ok())
                || self.roots.iter().any(|root| root.exists())
        })
    }

    fn cache_info(&self, ctx: &SourceContext) -> Result<CacheInfo, AppError> {
        if !self.is_available(ctx) {
            return Ok(CacheInfo::absent(&self.name, self.kind, &self.description));
        }

        let roots = self.existing_roots();
        let mut total = Measurement::default();
        for root in &roots {
            let measured = self.measure(ctx, root);
            debug!(source = %self.name, path = %root.display(), bytes = measured.bytes, "measured");
            total.merge(measured);
        }

        // Categories are measured on their own; a sampled parent must not come
        // out smaller than the slices it contains.
        let categories = self.build_categories(ctx, &roots);
        let category_total =
            categories.iter().fold(0u64, |acc, category| acc.saturating_add(category.size));
        if category_total > total.bytes {
            debug!(source = %self.name, category_total, "raising sampled size to category total");
            total.bytes = category_total;
        }

        Ok(CacheInfo {
            name: self.name.clone(),
            kind: self.kind,
            description: self.description.clone(),
            categories,
            paths: roots,
            is_installed: true,
            size: total.bytes,
            last_modified: total.last_modified,
            estimated: total.estimated,
            error: None,
        })
    }

    fn categories(&self, ctx: &SourceContext) -> Result<Vec<CacheCategory>, AppError> {
        Ok(self.build_categories(ctx, &self.existing_roots()))
    }

    fn clear(
        &self,
        ctx: &SourceContext,
        request: &ClearRequest<'_>,
    ) -> Result<ClearResult, AppError> {
        let info = self.snapshot(ctx, request)?;
        ClearPlan::select(&info, request.criteria, |path| self.measure(ctx, path))
            .without_protected(ctx, request.protected)
            .execute(ctx, request.dry_run)
    }

    fn clear_by_category(
        &self,
        ctx: &SourceContext,
        category_ids: &[String],
        request: &ClearRequest<'_>,
    ) -> Result<ClearResult, AppError> {
        let info = self.snapshot(ctx, request)?;
        ClearPlan::select_categories(&info, category_ids, request.criteria, |path| {
            self.measure(ctx, path)
        })
        .without_protected(ctx, request.protected)
        .execute(ctx, request.dry_run)
    }
}
