//! Registry of cache sources and the fan-out that scans or clears them.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use globset::GlobSet;
use rayon::prelude::*;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::model::{CacheInfo, CacheKind, ClearResult, SelectionCriteria};
use crate::progress::LiveProgress;
use crate::source::{CacheSource, ClearRequest, SourceContext, builtin_sources};

/// Plain data the manager needs from configuration.
#[derive(Debug, Clone, Default)]
pub struct ManagerSettings {
    /// Sources mapped to `false` are disabled; everything else is enabled.
    pub enabled: BTreeMap<String, bool>,
    pub protected: Option<GlobSet>,
}

impl ManagerSettings {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Ok(ManagerSettings {
            enabled: config.sources.clone(),
            protected: config.compile_protected()?,
        })
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(true)
    }
}

/// Which registered sources an operation runs against.
#[derive(Debug, Clone, Default)]
pub struct SourceSelection {
    /// When non-empty, exactly these sources run, regardless of every other field.
    pub include: Vec<String>,
    pub types: Vec<CacheKind>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub selection: SourceSelection,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    pub dry_run: bool,
    pub selection: SourceSelection,
    /// Sources cleared category by category instead of as a whole.
    pub sub_caches_to_clear: BTreeMap<String, Vec<String>>,
    pub criteria: Option<SelectionCriteria>,
    pub show_progress: bool,
}

pub struct CacheManager {
    sources: Vec<Arc<dyn CacheSource>>,
    ctx: SourceContext,
    settings: ManagerSettings,
}

impl CacheManager {
    pub fn new(
        sources: Vec<Arc<dyn CacheSource>>,
        ctx: SourceContext,
        settings: ManagerSettings,
    ) -> Self {
        CacheManager { sources, ctx, settings }
    }

    /// Built-in sources, the system guard and settings taken from `config`.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let sources = builtin_sources(config.project_root_paths()?);
        let settings = ManagerSettings::from_config(config)?;
        Ok(CacheManager::new(sources, SourceContext::system(), settings))
    }

    pub fn sources(&self) -> &[Arc<dyn CacheSource>] {
        &self.sources
    }

    pub fn source(&self, name: &str) -> Option<&Arc<dyn CacheSource>> {
        self.sources.iter().find(|source| source.name() == name)
    }

    pub fn context(&self) -> &SourceContext {
        &self.ctx
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn is_available(&self, name: &str) -> Result<bool, AppError> {
        let source = self.source(name).ok_or_else(|| AppError::UnknownSource(name.to_string()))?;
        Ok(source.is_available(&self.ctx))
    }

    /// Registered sources matching `selection`, in registration order.
    pub fn resolve(&self, selection: &SourceSelection) -> Vec<Arc<dyn CacheSource>> {
        if !selection.include.is_empty() {
            for name in &selection.include {
                if self.source(name).is_none() {
                    warn!("Unknown cache source '{name}' in include list");
                }
            }
            return self
                .sources
                .iter()
                .filter(|source| selection.include.iter().any(|name| name == source.name()))
                .cloned()
                .collect();
        }

        self.sources
            .iter()
            .filter(|source| self.settings.is_enabled(source.name()))
            .filter(|source| selection.types.is_empty() || selection.types.contains(&source.kind()))
            .filter(|source| !selection.exclude.iter().any(|name| name == source.name()))
            .cloned()
            .collect()
    }

    /// Scan every selected source concurrently. One entry per source, in
    /// registration order; a failing source shows up as an entry with `error` set.
    pub fn get_all_cache_info(&self, options: &ScanOptions) -> Vec<CacheInfo> {
        let selected = self.resolve(&options.selection);
        let mut progress = options
            .show_progress
            .then(|| LiveProgress::start(selected.iter().map(|source| source.name().to_string())));

        let tracker = progress.as_ref();
        let infos: Vec<CacheInfo> = selected
            .par_iter()
            .map(|source| {
                if let Some(tracker) = tracker {
                    tracker.start_scan(source.name());
                }
                let info = self.scan_one(source.as_ref());
                if let Some(tracker) = tracker {
                    match &info.error {
                        Some(err) => tracker.fail(&info.name, err),
                        None => tracker.complete(&info.name, info.size),
                    }
                }
                info
            })
            .collect();

        if let Some(progress) = progress.as_mut() {
            progress.stop();
        }
        infos
    }

    /// Clear every selected source concurrently. Skipped sources are neither
    /// scanned nor cleared; one result per attempted source, in registration order.
    pub fn clean_all_caches(&self, options: &CleanOptions) -> Vec<ClearResult> {
        let selected = self.resolve(&options.selection);
        let mut progress = options
            .show_progress
            .then(|| LiveProgress::start(selected.iter().map(|source| source.name().to_string())));

        let tracker = progress.as_ref();
        let results: Vec<ClearResult> = selected
            .par_iter()
            .map(|source| {
                if let Some(tracker) = tracker {
                    tracker.start_scan(source.name());
                }
                let result = self.clear_one(source.as_ref(), options);
                if let Some(tracker) = tracker {
                    match &result.error {
                        Some(err) => tracker.fail(&result.name, err),
                        None => tracker.complete(&result.name, result.freed()),
                    }
                }
                result
            })
            .collect();

        if let Some(progress) = progress.as_mut() {
            progress.stop();
        }
        results
    }

    fn scan_one(&self, source: &dyn CacheSource) -> CacheInfo {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| source.cache_info(&self.ctx)));
        match outcome {
            Ok(Ok(info)) => {
                debug!(source = source.name(), bytes = info.size, "scanned");
                info
            }
            Ok(Err(err)) => {
                warn!(source = source.name(), "scan failed: {err}");
                CacheInfo::failed(
                    source.name(),
                    source.kind(),
                    source.description(),
                    err.to_string(),
                )
            }
            Err(payload) => {
                let message = panic_message(payload);
                error!(source = source.name(), "scan panicked: {message}");
                CacheInfo::failed(source.name(), source.kind(), source.description(), message)
            }
        }
    }

    fn clear_one(&self, source: &dyn CacheSource, options: &CleanOptions) -> ClearResult {
        let name = source.name();
        let info = self.scan_one(source);
        if let Some(err) = &info.error {
            return ClearResult::failed(name, options.dry_run, 0, err.clone());
        }

        let request = ClearRequest {
            dry_run: options.dry_run,
            criteria: options.criteria.as_ref(),
            cache_info: Some(&info),
            protected: self.settings.protected.as_ref(),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            match options.sub_caches_to_clear.get(name) {
                Some(ids) if source.capabilities().clear_by_category => {
                    source.clear_by_category(&self.ctx, ids, &request)
                }
                Some(_) => Err(AppError::Unsupported {
                    source_name: name.to_string(),
                    operation: "clearing by category",
                }),
                None => source.clear(&self.ctx, &request),
            }
        }));

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                if err.is_unsafe_path() {
                    error!(source = name, "aborted unsafe removal: {err}");
                } else {
                    warn!(source = name, "clear failed: {err}");
                }
                ClearResult::failed(name, options.dry_run, info.size, err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload);
                error!(source = name, "clear panicked: {message}");
                ClearResult::failed(name, options.dry_run, info.size, message)
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::DeletionGuard;
    use crate::model::{CacheCategory, ClearSummary, Priority, ScanSummary, UseCase};
    use crate::size::SizeEstimator;
    use crate::source::Capabilities;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    const MB: u64 = 1024 * 1024;

    #[derive(Clone, Copy)]
    enum Behavior {
        Sized(u64),
        Fails,
        Panics,
        Slow(u64),
    }

    struct FakeSource {
        name: &'static str,
        kind: CacheKind,
        behavior: Behavior,
        categories: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(name: &'static str, behavior: Behavior) -> Self {
            FakeSource {
                name,
                kind: CacheKind::PackageManager,
                behavior,
                categories: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_kind(mut self, kind: CacheKind) -> Self {
            self.kind = kind;
            self
        }

        fn categorized(mut self) -> Self {
            self.categories = true;
            self
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn result(&self, dry_run: bool, size: u64, categories: Vec<String>) -> ClearResult {
            ClearResult {
                name: self.name.to_string(),
                success: true,
                dry_run,
                size_before: size,
                size_after: 0,
                error: None,
                cleared_paths: Vec::new(),
                cleared_categories: categories,
            }
        }
    }

    impl CacheSource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> CacheKind {
            self.kind
        }

        fn description(&self) -> &str {
            "fake"
        }

        fn capabilities(&self) -> Capabilities {
            if self.categories { Capabilities::CATEGORIZED } else { Capabilities::default() }
        }

        fn is_available(&self, _ctx: &SourceContext) -> bool {
            true
        }

        fn cache_info(&self, _ctx: &SourceContext) -> Result<CacheInfo, AppError> {
            self.record("cache_info");
            let size = match self.behavior {
                Behavior::Sized(size) => size,
                Behavior::Slow(size) => {
                    thread::sleep(Duration::from_millis(50));
                    size
                }
                Behavior::Fails => return Err(AppError::config("broken source")),
                Behavior::Panics => panic!("source exploded"),
            };
            let mut info = CacheInfo::absent(self.name, self.kind, "fake");
            info.is_installed = true;
            info.size = size;
            if self.categories {
                info.categories.push(CacheCategory {
                    id: "logs".to_string(),
                    name: "Logs".to_string(),
                    description: String::new(),
                    paths: Vec::new(),
                    size: size / 2,
                    last_modified: None,
                    age_days: None,
                    priority: Priority::Low,
                    use_case: UseCase::Archived,
                    is_project_specific: false,
                    project_path: None,
                });
            }
            Ok(info)
        }

        fn clear(
            &self,
            _ctx: &SourceContext,
            request: &ClearRequest<'_>,
        ) -> Result<ClearResult, AppError> {
            self.record("clear");
            let size = request.cache_info.map(|info| info.size).unwrap_or_default();
            Ok(self.result(request.dry_run, size, Vec::new()))
        }

        fn clear_by_category(
            &self,
            _ctx: &SourceContext,
            category_ids: &[String],
            request: &ClearRequest<'_>,
        ) -> Result<ClearResult, AppError> {
            self.record("clear_by_category");
            let size = request.cache_info.map(|info| info.size).unwrap_or_default();
            Ok(self.result(request.dry_run, size, category_ids.to_vec()))
        }
    }

    fn context() -> SourceContext {
        SourceContext::new(SizeEstimator::new(), DeletionGuard::with_roots(Vec::new()))
    }

    fn manager(sources: Vec<Arc<dyn CacheSource>>) -> CacheManager {
        CacheManager::new(sources, context(), ManagerSettings::default())
    }

    fn names(results: &[ClearResult]) -> Vec<&str> {
        results.iter().map(|result| result.name.as_str()).collect()
    }

    #[test]
    fn one_failing_source_does_not_sink_the_batch() {
        let manager = manager(vec![
            Arc::new(FakeSource::new("a", Behavior::Sized(1))),
            Arc::new(FakeSource::new("b", Behavior::Fails)),
            Arc::new(FakeSource::new("c", Behavior::Sized(3))),
            Arc::new(FakeSource::new("d", Behavior::Panics)),
            Arc::new(FakeSource::new("e", Behavior::Sized(5))),
        ]);

        let results =
            manager.clean_all_caches(&CleanOptions { dry_run: true, ..Default::default() });
        assert_eq!(names(&results), vec!["a", "b", "c", "d", "e"]);
        let failed: Vec<&str> =
            results.iter().filter(|result| !result.success).map(|r| r.name.as_str()).collect();
        assert_eq!(failed, vec!["b", "d"]);
        assert!(results[1].error.as_deref().unwrap().contains("broken source"));
        assert!(results[3].error.as_deref().unwrap().contains("source exploded"));

        let summary = ClearSummary::from_results(&results);
        assert_eq!(summary.attempted, 5);
        assert_eq!(summary.failed, 2);
    }

    #[test]
    fn results_keep_registration_order() {
        let manager = manager(vec![
            Arc::new(FakeSource::new("slow", Behavior::Slow(1))),
            Arc::new(FakeSource::new("fast", Behavior::Sized(2))),
        ]);
        let infos = manager.get_all_cache_info(&ScanOptions::default());
        let order: Vec<&str> = infos.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(order, vec!["slow", "fast"]);
    }

    #[test]
    fn include_overrides_exclude_and_types() {
        let npm = Arc::new(FakeSource::new("npm", Behavior::Sized(1)));
        let manager = manager(vec![
            npm.clone(),
            Arc::new(FakeSource::new("yarn", Behavior::Sized(1))),
            Arc::new(FakeSource::new("docker", Behavior::Sized(1)).with_kind(CacheKind::Other)),
        ]);

        let options = CleanOptions {
            selection: SourceSelection {
                include: vec!["npm".to_string()],
                exclude: vec!["npm".to_string()],
                types: vec![CacheKind::Other],
            },
            ..Default::default()
        };
        let results = manager.clean_all_caches(&options);
        assert_eq!(names(&results), vec!["npm"]);
        assert_eq!(*npm.calls.lock().unwrap(), vec!["cache_info", "clear"]);
    }

    #[test]
    fn skipped_sources_are_never_scanned() {
        let yarn = Arc::new(FakeSource::new("yarn", Behavior::Sized(1)));
        let docker =
            Arc::new(FakeSource::new("docker", Behavior::Sized(1)).with_kind(CacheKind::Other));
        let mut settings = ManagerSettings::default();
        settings.enabled.insert("docker".to_string(), false);
        let manager = CacheManager::new(
            vec![
                Arc::new(FakeSource::new("npm", Behavior::Sized(1))),
                yarn.clone(),
                docker.clone(),
            ],
            context(),
            settings,
        );

        let options = CleanOptions {
            selection: SourceSelection { exclude: vec!["yarn".to_string()], ..Default::default() },
            ..Default::default()
        };
        let results = manager.clean_all_caches(&options);
        assert_eq!(names(&results), vec!["npm"]);
        assert!(yarn.calls.lock().unwrap().is_empty());
        assert!(docker.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn types_filter_enabled_sources() {
        let manager = manager(vec![
            Arc::new(FakeSource::new("npm", Behavior::Sized(1))),
            Arc::new(FakeSource::new("chrome", Behavior::Sized(1)).with_kind(CacheKind::Browser)),
        ]);
        let selection = SourceSelection { types: vec![CacheKind::Browser], ..Default::default() };
        let resolved = manager.resolve(&selection);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name(), "chrome");
    }

    #[test]
    fn scan_reports_sizes_and_errors() {
        let manager = manager(vec![
            Arc::new(FakeSource::new("full", Behavior::Sized(50 * MB))),
            Arc::new(FakeSource::new("empty", Behavior::Sized(0))),
            Arc::new(FakeSource::new("broken", Behavior::Fails)),
        ]);

        let infos =
            manager.get_all_cache_info(&ScanOptions { show_progress: true, ..Default::default() });
        assert_eq!(infos.len(), 3);
        let summary = ScanSummary::from_infos(&infos);
        assert_eq!(summary.total_size, 50 * MB);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.installed, 2);
    }

    #[test]
    fn sub_caches_use_category_clearing() {
        let categorized = Arc::new(FakeSource::new("cargo", Behavior::Sized(10)).categorized());
        let plain = Arc::new(FakeSource::new("yarn", Behavior::Sized(10)));
        let manager = manager(vec![categorized.clone(), plain.clone()]);

        let mut sub_caches = BTreeMap::new();
        sub_caches.insert("cargo".to_string(), vec!["logs".to_string()]);
        sub_caches.insert("yarn".to_string(), vec!["logs".to_string()]);
        let results = manager.clean_all_caches(&CleanOptions {
            sub_caches_to_clear: sub_caches,
            ..Default::default()
        });

        assert_eq!(results[0].cleared_categories, vec!["logs".to_string()]);
        assert!(categorized.calls.lock().unwrap().contains(&"clear_by_category".to_string()));
        assert!(!results[1].success);
        assert!(!plain.calls.lock().unwrap().contains(&"clear".to_string()));
    }

    #[test]
    fn unknown_source_lookup_fails() {
        let manager = manager(Vec::new());
        assert!(matches!(manager.is_available("nope"), Err(AppError::UnknownSource(_))));
    }
}
