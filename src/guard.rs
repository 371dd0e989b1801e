//! Safe-root validation in front of every recursive removal.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::thread;
use std::time::Duration;

use dirs_next as dirs;
use tracing::{debug, error, warn};

use crate::error::AppError;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

// A marker segment only counts when the path has at least this many components.
const MIN_MARKER_DEPTH: usize = 2;

#[derive(Debug, Clone)]
pub struct DeletionGuard {
    safe_roots: Vec<PathBuf>,
    use_markers: bool,
    attempts: u32,
    backoff: Duration,
}

impl DeletionGuard {
    /// Home directory, OS temp directory, and cache/`node_modules`/temp markers.
    pub fn system() -> Self {
        let mut roots = Vec::new();
        if let Some(home) = dirs::home_dir() {
            roots.push(home);
        }
        roots.push(std::env::temp_dir());
        DeletionGuard::with_roots(roots).with_markers(true)
    }

    /// Guard that only trusts the given roots. Marker segments are off.
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        let mut safe_roots = Vec::new();
        for root in roots {
            let root = normalize(&absolute(&root));
            if let Ok(canonical) = fs::canonicalize(&root)
                && canonical != root
            {
                safe_roots.push(canonical);
            }
            safe_roots.push(root);
        }
        DeletionGuard {
            safe_roots,
            use_markers: false,
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_markers(mut self, enabled: bool) -> Self {
        self.use_markers = enabled;
        self
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Whether an already resolved absolute path lies strictly inside a safe region.
    pub fn is_safe(&self, resolved: &Path) -> bool {
        if resolved.parent().is_none() {
            return false;
        }
        if self.safe_roots.iter().any(|root| resolved.starts_with(root) && resolved != root) {
            return true;
        }
        self.use_markers && has_marker_segment(resolved)
    }

    /// Resolve `path` and confirm it may be removed, without touching it.
    pub fn check(&self, path: &Path) -> Result<PathBuf, AppError> {
        let resolved = resolve(path);
        if self.is_safe(&resolved) {
            Ok(resolved)
        } else {
            error!(path = %path.display(), "refusing to remove path outside safe roots");
            Err(AppError::UnsafePath { path: resolved })
        }
    }

    /// Remove `path` recursively. A missing path counts as removed.
    pub fn remove(&self, path: &Path) -> Result<(), AppError> {
        let resolved = self.check(path)?;

        let mut attempt = 1;
        loop {
            match remove_once(&resolved) {
                Ok(()) => {
                    debug!(path = %resolved.display(), "removed");
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(err)
                    if attempt < self.attempts
                        && err.kind() != io::ErrorKind::PermissionDenied =>
                {
                    warn!(
                        path = %resolved.display(),
                        attempt,
                        "removal failed, retrying: {err}"
                    );
                    thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(source) => return Err(AppError::Removal { path: resolved, source }),
            }
        }
    }
}

fn remove_once(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn has_marker_segment(path: &Path) -> bool {
    let segments: Vec<String> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy().to_ascii_lowercase()),
            _ => None,
        })
        .collect();
    segments.len() >= MIN_MARKER_DEPTH
        && segments.iter().any(|segment| {
            segment.contains("cache") || matches!(segment.as_str(), "node_modules" | "temp" | "tmp")
        })
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")).join(path)
    }
}

// Lexical cleanup of `.` and `..`, no filesystem access.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Absolute, canonical form of `path`. The final component is never followed
/// so removing a symlink removes the link, not its target.
fn resolve(path: &Path) -> PathBuf {
    let lexical = normalize(&absolute(path));
    match (lexical.parent(), lexical.file_name()) {
        (Some(parent), Some(name)) => match fs::canonicalize(parent) {
            Ok(parent) => parent.join(name),
            Err(_) => lexical,
        },
        _ => lexical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn guard_for(root: &Path) -> DeletionGuard {
        DeletionGuard::with_roots(vec![root.to_path_buf()]).with_retry(3, Duration::ZERO)
    }

    #[test]
    fn refuses_paths_outside_roots_without_touching_them() {
        let temp = TempDir::new().unwrap();
        let safe = temp.path().join("safe");
        let outside = temp.path().join("outside");
        fs::create_dir_all(&safe).unwrap();
        fs::create_dir_all(outside.join("nested")).unwrap();
        fs::write(outside.join("nested/file.txt"), "keep").unwrap();

        let guard = guard_for(&safe);
        let unsafe_paths = [
            outside.clone(),
            outside.join("nested/file.txt"),
            safe.join("../outside"),
            safe.clone(),
            PathBuf::from("/"),
        ];
        for path in &unsafe_paths {
            let err = guard.remove(path).unwrap_err();
            assert!(err.is_unsafe_path(), "{path:?} should be refused");
        }
        assert!(outside.join("nested/file.txt").exists());
        assert!(safe.exists());
    }

    #[test]
    fn removes_nested_directory() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("cache/dir");
        fs::create_dir_all(target.join("inner")).unwrap();
        fs::write(target.join("inner/a.bin"), "data").unwrap();

        guard_for(temp.path()).remove(&target).unwrap();
        assert!(!target.exists());
        assert!(temp.path().join("cache").exists());
    }

    #[test]
    fn missing_path_is_success() {
        let temp = TempDir::new().unwrap();
        let guard = guard_for(temp.path());
        guard.remove(&temp.path().join("never-existed")).unwrap();
        guard.remove(&temp.path().join("never-existed")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn symlink_removal_keeps_target() {
        let temp = TempDir::new().unwrap();
        let safe = temp.path().join("safe");
        let target = temp.path().join("elsewhere");
        fs::create_dir_all(&safe).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("keep.txt"), "keep").unwrap();
        let link = safe.join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        guard_for(&safe).remove(&link).unwrap();
        assert!(fs::symlink_metadata(&link).is_err());
        assert!(target.join("keep.txt").exists());
    }

    #[test]
    fn marker_segments_mark_paths_safe() {
        let guard = DeletionGuard::with_roots(Vec::new()).with_markers(true);
        assert!(guard.is_safe(Path::new("/opt/project/node_modules/left-pad")));
        assert!(guard.is_safe(Path::new("/var/cache/apt")));
        assert!(guard.is_safe(Path::new("/srv/Caches/app")));
        assert!(!guard.is_safe(Path::new("/opt/project/src")));
        assert!(!guard.is_safe(Path::new("/usr/share/templates/x")));
        assert!(!guard.is_safe(Path::new("/cache")));
        assert!(!guard.is_safe(Path::new("/")));
    }

    #[test]
    fn normalize_collapses_parent_segments() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("/../..")), PathBuf::from("/"));
    }
}
