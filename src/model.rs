use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::Serialize;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    PackageManager,
    BuildTool,
    Browser,
    Ide,
    System,
    Other,
}

impl CacheKind {
    pub fn from_name(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "package-manager" | "pm" => Some(CacheKind::PackageManager),
            "build-tool" | "build" => Some(CacheKind::BuildTool),
            "browser" => Some(CacheKind::Browser),
            "ide" => Some(CacheKind::Ide),
            "system" => Some(CacheKind::System),
            "other" => Some(CacheKind::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::PackageManager => "package-manager",
            CacheKind::BuildTool => "build-tool",
            CacheKind::Browser => "browser",
            CacheKind::Ide => "ide",
            CacheKind::System => "system",
            CacheKind::Other => "other",
        }
    }
}

impl std::str::FromStr for CacheKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheKind::from_name(s).ok_or_else(|| format!("Unknown cache type '{s}'"))
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    Important,
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::Important => "important",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "important" => Ok(Priority::Important),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(format!("Unknown priority '{s}'")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UseCase {
    Development,
    Testing,
    Production,
    Experimental,
    Archived,
}

impl UseCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UseCase::Development => "development",
            UseCase::Testing => "testing",
            UseCase::Production => "production",
            UseCase::Experimental => "experimental",
            UseCase::Archived => "archived",
        }
    }
}

impl std::str::FromStr for UseCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" => Ok(UseCase::Development),
            "testing" => Ok(UseCase::Testing),
            "production" => Ok(UseCase::Production),
            "experimental" => Ok(UseCase::Experimental),
            "archived" => Ok(UseCase::Archived),
            _ => Err(format!("Unknown use case '{s}'")),
        }
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Whole days elapsed since `modified`, or `None` when the timestamp is unknown.
pub fn age_in_days(modified: Option<SystemTime>, now: SystemTime) -> Option<u64> {
    let modified = modified?;
    let elapsed = now.duration_since(modified).unwrap_or(Duration::ZERO);
    Some(elapsed.as_secs() / SECONDS_PER_DAY)
}

/// A named, independently sized subdivision of a source's cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheCategory {
    pub id: String,
    pub name: String,
    pub description: String,
    pub paths: Vec<PathBuf>,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
    pub age_days: Option<u64>,
    pub priority: Priority,
    pub use_case: UseCase,
    pub is_project_specific: bool,
    pub project_path: Option<PathBuf>,
}

/// Point-in-time snapshot of one cache source.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub name: String,
    pub kind: CacheKind,
    pub description: String,
    pub paths: Vec<PathBuf>,
    pub is_installed: bool,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
    /// True when any part of `size` came from sampling instead of a full walk.
    pub estimated: bool,
    pub categories: Vec<CacheCategory>,
    pub error: Option<String>,
}

impl CacheInfo {
    pub fn absent(name: &str, kind: CacheKind, description: &str) -> Self {
        CacheInfo {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            paths: Vec::new(),
            is_installed: false,
            size: 0,
            last_modified: None,
            estimated: false,
            categories: Vec::new(),
            error: None,
        }
    }

    pub fn failed(name: &str, kind: CacheKind, description: &str, error: String) -> Self {
        CacheInfo { error: Some(error), ..CacheInfo::absent(name, kind, description) }
    }

    pub fn category(&self, id: &str) -> Option<&CacheCategory> {
        self.categories.iter().find(|category| category.id == id)
    }
}

/// Outcome of clearing a single source.
#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub name: String,
    pub success: bool,
    pub dry_run: bool,
    pub size_before: u64,
    pub size_after: u64,
    pub error: Option<String>,
    pub cleared_paths: Vec<PathBuf>,
    pub cleared_categories: Vec<String>,
}

impl ClearResult {
    pub fn failed(name: &str, dry_run: bool, size_before: u64, error: String) -> Self {
        ClearResult {
            name: name.to_string(),
            success: false,
            dry_run,
            size_before,
            size_after: size_before,
            error: Some(error),
            cleared_paths: Vec::new(),
            cleared_categories: Vec::new(),
        }
    }

    pub fn freed(&self) -> u64 {
        self.size_before.saturating_sub(self.size_after)
    }
}

/// Read-only filter narrowing which categories or paths are eligible for clearing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCriteria {
    pub older_than_days: Option<u64>,
    pub newer_than_days: Option<u64>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub use_cases: Vec<UseCase>,
    pub priorities: Vec<Priority>,
    pub project_specific: Option<bool>,
    pub category_ids: Vec<String>,
}

impl SelectionCriteria {
    pub fn is_empty(&self) -> bool {
        *self == SelectionCriteria::default()
    }

    /// Whether any filter only makes sense against a category.
    pub fn has_category_constraints(&self) -> bool {
        !self.use_cases.is_empty()
            || !self.priorities.is_empty()
            || self.project_specific.is_some()
            || !self.category_ids.is_empty()
    }

    pub fn matches(&self, category: &CacheCategory) -> bool {
        if !self.category_ids.is_empty() && !self.category_ids.contains(&category.id) {
            return false;
        }
        if !self.use_cases.is_empty() && !self.use_cases.contains(&category.use_case) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&category.priority) {
            return false;
        }
        if let Some(wanted) = self.project_specific
            && wanted != category.is_project_specific
        {
            return false;
        }
        self.matches_extent(category.size, category.age_days)
    }

    /// Size and age filters for a path that has no category metadata.
    pub fn matches_path(&self, size: u64, age_days: Option<u64>) -> bool {
        !self.has_category_constraints() && self.matches_extent(size, age_days)
    }

    fn matches_extent(&self, size: u64, age_days: Option<u64>) -> bool {
        if let Some(min) = self.min_size
            && size < min
        {
            return false;
        }
        if let Some(max) = self.max_size
            && size > max
        {
            return false;
        }
        if let Some(days) = self.older_than_days {
            match age_days {
                Some(age) if age >= days => {}
                _ => return false,
            }
        }
        if let Some(days) = self.newer_than_days {
            match age_days {
                Some(age) if age <= days => {}
                _ => return false,
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub sources: usize,
    pub installed: usize,
    pub errors: usize,
    pub total_size: u64,
}

impl ScanSummary {
    pub fn from_infos(infos: &[CacheInfo]) -> Self {
        ScanSummary {
            sources: infos.len(),
            installed: infos.iter().filter(|info| info.is_installed).count(),
            errors: infos.iter().filter(|info| info.error.is_some()).count(),
            total_size: infos.iter().map(|info| info.size).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub freed: u64,
}

impl ClearSummary {
    pub fn from_results(results: &[ClearResult]) -> Self {
        let succeeded = results.iter().filter(|result| result.success).count();
        ClearSummary {
            attempted: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            freed: results.iter().map(ClearResult::freed).sum(),
        }
    }
}
