//! The sources devsweep ships with, in registration order.

use std::path::PathBuf;
use std::sync::Arc;

use dirs_next as dirs;

use crate::model::{CacheKind, Priority, UseCase};

use super::{CacheSource, CategoryLayout, DirectorySource, DockerSource, ProjectArtifactsSource};

fn home_paths(relative: &[&str]) -> Vec<PathBuf> {
    match dirs::home_dir() {
        Some(home) => relative.iter().map(|rel| home.join(rel)).collect(),
        None => Vec::new(),
    }
}

fn npm() -> DirectorySource {
    DirectorySource::new("npm", CacheKind::PackageManager, "npm package cache")
        .binary("npm")
        .roots(home_paths(&[".npm"]))
        .category(CategoryLayout::new(
            "packages",
            "Package tarballs",
            &["_cacache"],
            Priority::Normal,
            UseCase::Development,
        ))
        .category(CategoryLayout::new(
            "npx",
            "npx installs",
            &["_npx"],
            Priority::Low,
            UseCase::Experimental,
        ))
        .category(CategoryLayout::new(
            "logs",
            "Debug logs",
            &["_logs"],
            Priority::Low,
            UseCase::Archived,
        ))
}

fn yarn() -> DirectorySource {
    DirectorySource::new("yarn", CacheKind::PackageManager, "Yarn offline mirror and cache")
        .binary("yarn")
        .roots(home_paths(&[".cache/yarn", "Library/Caches/Yarn", ".yarn/berry/cache"]))
}

fn pnpm() -> DirectorySource {
    DirectorySource::new("pnpm", CacheKind::PackageManager, "pnpm content-addressable store")
        .binary("pnpm")
        .roots(home_paths(&[".local/share/pnpm/store", "Library/pnpm/store", ".pnpm-store"]))
        .estimate_only()
}

fn cargo() -> DirectorySource {
    DirectorySource::new("cargo", CacheKind::PackageManager, "Cargo registry and git checkouts")
        .binary("cargo")
        .roots(home_paths(&[".cargo/registry", ".cargo/git"]))
        .category(CategoryLayout::new(
            "registry-cache",
            "Downloaded crate archives",
            &["cache"],
            Priority::Normal,
            UseCase::Development,
        ))
        .category(CategoryLayout::new(
            "registry-src",
            "Extracted crate sources",
            &["src"],
            Priority::Low,
            UseCase::Development,
        ))
        .category(CategoryLayout::new(
            "git-checkouts",
            "Git dependency checkouts",
            &["checkouts", "db"],
            Priority::Low,
            UseCase::Development,
        ))
}

fn pip() -> DirectorySource {
    DirectorySource::new("pip", CacheKind::PackageManager, "pip wheel and HTTP cache")
        .binary("pip3")
        .binary("pip")
        .roots(home_paths(&[".cache/pip", "Library/Caches/pip"]))
        .category(CategoryLayout::new(
            "http",
            "HTTP responses",
            &["http", "http-v2"],
            Priority::Low,
            UseCase::Development,
        ))
        .category(CategoryLayout::new(
            "wheels",
            "Built wheels",
            &["wheels"],
            Priority::Normal,
            UseCase::Development,
        ))
}

fn go() -> DirectorySource {
    DirectorySource::new("go", CacheKind::BuildTool, "Go build and module download cache")
        .binary("go")
        .roots(home_paths(&[".cache/go-build", "Library/Caches/go-build", "go/pkg/mod/cache"]))
}

fn gradle() -> DirectorySource {
    DirectorySource::new("gradle", CacheKind::BuildTool, "Gradle dependency and build caches")
        .binary("gradle")
        .roots(home_paths(&[".gradle/caches"]))
        .category(CategoryLayout::new(
            "modules",
            "Resolved dependencies",
            &["modules-2"],
            Priority::Normal,
            UseCase::Development,
        ))
        .category(CategoryLayout::new(
            "build-cache",
            "Task output cache",
            &["build-cache-1"],
            Priority::Low,
            UseCase::Development,
        ))
}

fn maven() -> DirectorySource {
    DirectorySource::new("maven", CacheKind::BuildTool, "Maven local repository")
        .binary("mvn")
        .roots(home_paths(&[".m2/repository"]))
        .estimate_only()
}

fn homebrew() -> DirectorySource {
    DirectorySource::new("homebrew", CacheKind::System, "Homebrew download cache")
        .binary("brew")
        .roots(home_paths(&["Library/Caches/Homebrew", ".cache/Homebrew"]))
}

fn chrome() -> DirectorySource {
    DirectorySource::new("chrome", CacheKind::Browser, "Google Chrome disk cache")
        .roots(home_paths(&[
            ".cache/google-chrome",
            "Library/Caches/Google/Chrome",
        ]))
}

fn vscode() -> DirectorySource {
    let mut roots = Vec::new();
    for base in [".config/Code", "Library/Application Support/Code"] {
        for dir in ["Cache", "CachedData", "CachedExtensionVSIXs", "GPUCache", "logs"] {
            roots.extend(home_paths(&[format!("{base}/{dir}").as_str()]));
        }
    }
    // Roots are the cache folders themselves; the parent holds user settings.
    DirectorySource::new("vscode", CacheKind::Ide, "Visual Studio Code caches")
        .binary("code")
        .roots(roots)
}

fn jetbrains() -> DirectorySource {
    DirectorySource::new("jetbrains", CacheKind::Ide, "JetBrains IDE system caches")
        .roots(home_paths(&[".cache/JetBrains", "Library/Caches/JetBrains"]))
}

fn xcode() -> DirectorySource {
    DirectorySource::new("xcode", CacheKind::BuildTool, "Xcode DerivedData")
        .binary("xcodebuild")
        .roots(home_paths(&["Library/Developer/Xcode/DerivedData"]))
}

/// Every built-in source. `project_roots` feeds the project artifact walker.
pub fn builtin_sources(project_roots: Vec<PathBuf>) -> Vec<Arc<dyn CacheSource>> {
    vec![
        Arc::new(npm()),
        Arc::new(yarn()),
        Arc::new(pnpm()),
        Arc::new(cargo()),
        Arc::new(pip()),
        Arc::new(go()),
        Arc::new(gradle()),
        Arc::new(maven()),
        Arc::new(homebrew()),
        Arc::new(chrome()),
        Arc::new(vscode()),
        Arc::new(jetbrains()),
        Arc::new(xcode()),
        Arc::new(DockerSource::new()),
        Arc::new(ProjectArtifactsSource::new(project_roots)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn source_names_are_unique() {
        let sources = builtin_sources(Vec::new());
        let names: HashSet<&str> = sources.iter().map(|source| source.name()).collect();
        assert_eq!(names.len(), sources.len());
    }
}
