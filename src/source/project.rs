use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::AppError;
use crate::model::{
    CacheCategory, CacheInfo, CacheKind, ClearResult, Priority, UseCase, age_in_days,
};
use crate::size::Measurement;

use super::{CacheSource, Capabilities, ClearPlan, ClearRequest, SourceContext};

pub const PROJECT_SOURCE_NAME: &str = "project-artifacts";

const MAX_DEPTH: usize = 10;

/// Directory names produced by builds and package installs inside projects.
const ARTIFACT_TARGETS: &[(&str, Priority)] = &[
    ("node_modules", Priority::Normal),
    (".next", Priority::Low),
    (".nuxt", Priority::Low),
    (".svelte-kit", Priority::Low),
    ("target", Priority::Low),
    ("__pycache__", Priority::Low),
    (".pytest_cache", Priority::Low),
    (".ruff_cache", Priority::Low),
    (".mypy_cache", Priority::Low),
    (".venv", Priority::Normal),
    (".gradle", Priority::Low),
    ("DerivedData", Priority::Low),
];

/// Build output and dependency folders found by walking project roots.
///
/// Every match becomes its own project-specific category, keyed by its path,
/// so single projects can be cleared on their own.
pub struct ProjectArtifactsSource {
    roots: Vec<PathBuf>,
}

impl ProjectArtifactsSource {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn discover(&self) -> Vec<(PathBuf, Priority)> {
        let targets: HashMap<&str, Priority> = ARTIFACT_TARGETS.iter().copied().collect();
        let mut found = Vec::new();

        for root in &self.roots {
            if !root.exists() {
                continue;
            }

            let mut walker = WalkDir::new(root).max_depth(MAX_DEPTH).into_iter();
            while let Some(entry) = walker.next() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        debug!("Skipping {:?}: {}", err.path(), err);
                        continue;
                    }
                };

                if entry.file_type().is_dir() {
                    let name = entry.file_name().to_string_lossy();
                    if let Some(priority) = targets.get(name.as_ref()) {
                        found.push((entry.path().to_path_buf(), *priority));
                        walker.skip_current_dir();
                    }
                }
            }
        }

        found
    }

    fn build_categories(&self, ctx: &SourceContext) -> Vec<CacheCategory> {
        let now = SystemTime::now();
        self.discover()
            .into_iter()
            .map(|(path, priority)| {
                let measured = ctx.measure(&path);
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
                let project = path.parent().map(Path::to_path_buf);
                CacheCategory {
                    id: path.display().to_string(),
                    description: match &project {
                        Some(project) => format!("{name} in {}", project.display()),
                        None => name.clone(),
                    },
                    name,
                    paths: vec![path],
                    size: measured.bytes,
                    last_modified: measured.last_modified,
                    age_days: age_in_days(measured.last_modified, now),
                    priority,
                    use_case: UseCase::Development,
                    is_project_specific: true,
                    project_path: project,
                }
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

impl CacheSource for ProjectArtifactsSource {
    fn name(&self) -> &str {
        PROJECT_SOURCE_NAME
    }

    fn kind(&self) -> CacheKind {
        CacheKind::BuildTool
    }

    fn description(&self) -> &str {
        "Build output and dependency folders inside project directories"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::CATEGORIZED
    }

    fn is_available(&self, _ctx: &SourceContext) -> bool {
        self.roots.iter().any(|root| root.exists())
    }

    fn cache_info(&self, ctx: &SourceContext) -> Result<CacheInfo, AppError> {
        if !self.is_available(ctx) {
            return Ok(CacheInfo::absent(self.name(), self.kind(), self.description()));
        }

        let categories = self.build_categories(ctx);
        let mut total = Measurement::default();
        for category in &categories {
            for path in &category.paths {
                total.merge(ctx.measure(path));
            }
        }

        Ok(CacheInfo {
            name: self.name().to_string(),
            kind: self.kind(),
            description: self.description().to_string(),
            paths: categories.iter().flat_map(|category| category.paths.clone()).collect(),
            is_installed: true,
            size: total.bytes,
            last_modified: total.last_modified,
            estimated: total.estimated,
            categories,
            error: None,
        })
    }

    fn categories(&self, ctx: &SourceContext) -> Result<Vec<CacheCategory>, AppError> {
        Ok(self.build_categories(ctx))
    }

    fn clear(
        &self,
        ctx: &SourceContext,
        request: &ClearRequest<'_>,
    ) -> Result<ClearResult, AppError> {
        let info = self.snapshot(ctx, request)?;
        ClearPlan::select(&info, request.criteria, |path| ctx.measure(path))
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
            ctx.measure(path)
        })
            .without_protected(ctx, request.protected)
            .execute(ctx, request.dry_run)
    }
}
