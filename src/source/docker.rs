use std::convert::TryFrom;
use std::process::{Command, Stdio};

use byte_unit::Byte;
use tracing::{debug, info};

use crate::error::AppError;
use crate::model::{CacheInfo, CacheKind, ClearResult};

use super::{CacheSource, ClearRequest, SourceContext};

const NAME: &str = "docker";
const DESCRIPTION: &str = "Docker images, stopped containers, volumes and build cache";

const PRUNE_COMMANDS: &[&[&str]] = &[
    &["image", "prune", "-a", "-f"],
    &["container", "prune", "-f"],
    &["volume", "prune", "-f"],
    &["network", "prune", "-f"],
    &["builder", "prune", "-a", "-f"],
];

/// Docker's reclaimable space, sized and pruned through the docker CLI rather
/// than the filesystem.
#[derive(Debug, Default)]
pub struct DockerSource;

impl DockerSource {
    pub fn new() -> Self {
        DockerSource
    }

    /// Reclaimable bytes, or `None` when the CLI is present but the daemon is
    /// not reachable.
    fn reclaimable() -> Result<Option<u64>, AppError> {
        let output = Command::new("docker").args(["system", "df"]).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if daemon_unreachable(&stderr) {
                debug!("docker daemon is not reachable: {}", stderr.trim());
                return Ok(None);
            }
            return Err(AppError::Docker(if stderr.trim().is_empty() {
                format!("'docker system df' exited with status {}", output.status)
            } else {
                format!("'docker system df' failed: {}", stderr.trim())
            }));
        }
        Ok(Some(parse_system_df(&String::from_utf8_lossy(&output.stdout))))
    }
}

fn daemon_unreachable(stderr: &str) -> bool {
    const MARKERS: [&str; 3] = [
        "cannot connect to the docker daemon",
        "is the docker daemon running",
        "error during connect",
    ];
    let stderr = stderr.to_ascii_lowercase();
    MARKERS.iter().any(|marker| stderr.contains(marker))
}

fn parse_system_df(stdout: &str) -> u64 {
    const SECTIONS: [&str; 4] = ["Images", "Containers", "Local Volumes", "Build Cache"];

    stdout
        .lines()
        .map(str::trim)
        .filter(|line| SECTIONS.iter().any(|section| line.starts_with(section)))
        .filter_map(parse_reclaimable)
        .fold(0u64, u64::saturating_add)
}

// The RECLAIMABLE column is last, optionally followed by a "(NN%)" token.
fn parse_reclaimable(line: &str) -> Option<u64> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut idx = tokens.len().checked_sub(1)?;
    if tokens[idx].starts_with('(') && idx > 0 {
        idx -= 1;
    }
    let byte = Byte::parse_str(tokens[idx], false).ok()?;
    u64::try_from(byte.as_u128()).ok()
}

impl CacheSource for DockerSource {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Other
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn is_available(&self, ctx: &SourceContext) -> bool {
        ctx.available_with(NAME, || {
            Command::new("docker")
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        })
    }

    fn cache_info(&self, ctx: &SourceContext) -> Result<CacheInfo, AppError> {
        if !self.is_available(ctx) {
            return Ok(CacheInfo::absent(NAME, CacheKind::Other, DESCRIPTION));
        }
        let Some(size) = Self::reclaimable()? else {
            return Ok(CacheInfo::absent(NAME, CacheKind::Other, DESCRIPTION));
        };
        Ok(CacheInfo {
            is_installed: true,
            size,
            ..CacheInfo::absent(NAME, CacheKind::Other, DESCRIPTION)
        })
    }

    fn clear(
        &self,
        ctx: &SourceContext,
        request: &ClearRequest<'_>,
    ) -> Result<ClearResult, AppError> {
        let size_before = match request.cache_info {
            Some(info) => info.size,
            None => self.cache_info(ctx)?.size,
        };

        // Pruning is all-or-nothing, so any category-level filter excludes docker.
        let filtered = request.criteria.is_some_and(|criteria| {
            criteria.has_category_constraints() || !criteria.matches_path(size_before, None)
        });
        if request.dry_run || filtered || size_before == 0 {
            let size_after = if request.dry_run && !filtered { 0 } else { size_before };
            return Ok(ClearResult {
                name: NAME.to_string(),
                success: true,
                dry_run: request.dry_run,
                size_before,
                size_after,
                error: None,
                cleared_paths: Vec::new(),
                cleared_categories: Vec::new(),
            });
        }

        for args in PRUNE_COMMANDS {
            info!("$ docker {}", args.join(" "));
            let status = Command::new("docker").args(args.iter().copied()).status()?;
            if !status.success() {
                let message = format!("docker {} failed with status {}", args.join(" "), status);
                debug!("{message}");
                return Ok(ClearResult::failed(NAME, false, size_before, message));
            }
        }

        let size_after = Self::reclaimable().ok().flatten().unwrap_or(0);
        Ok(ClearResult {
            name: NAME.to_string(),
            success: true,
            dry_run: false,
            size_before,
            size_after,
            error: None,
            cleared_paths: Vec::new(),
            cleared_categories: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reclaimable_column() {
        let output = "\
TYPE            TOTAL     ACTIVE    SIZE      RECLAIMABLE
Images          5         2         1.2GB     800MB (66%)
Containers      3         1         10MB      5MB (50%)
Local Volumes   2         1         100MB     0B (0%)
Build Cache     12        0         300MB     300MB
";
        assert_eq!(parse_system_df(output), 800_000_000 + 5_000_000 + 300_000_000);
    }

    #[test]
    fn stopped_daemon_is_recognised() {
        assert!(daemon_unreachable(
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. \
             Is the docker daemon running?"
        ));
        assert!(daemon_unreachable(
            "error during connect: Get \"http://%2F%2F.%2Fpipe%2FdockerDesktopLinuxEngine\""
        ));
        assert!(!daemon_unreachable("permission denied while trying to connect"));
    }

    #[test]
    fn ignores_unparseable_lines() {
        assert_eq!(parse_reclaimable(""), None);
        assert_eq!(parse_reclaimable("Images nonsense"), None);
    }
}
