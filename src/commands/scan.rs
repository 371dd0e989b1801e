use crate::config::Config;
use crate::error::AppError;
use crate::format::{display_path, format_bytes};
use crate::manager::{CacheManager, ScanOptions, SourceSelection};
use crate::model::{CacheInfo, ScanSummary};

pub struct ScanCommand {
    pub selection: SourceSelection,
    pub verbose: bool,
    pub show_progress: bool,
    pub json: bool,
}

pub fn execute_scan(command: ScanCommand) -> Result<Vec<CacheInfo>, AppError> {
    let config = Config::load()?;
    let manager = CacheManager::from_config(&config)?;
    let options =
        ScanOptions { selection: command.selection.clone(), show_progress: command.show_progress };
    let infos = manager.get_all_cache_info(&options);

    if command.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else {
        print_report(&infos, command.verbose);
    }
    Ok(infos)
}

fn print_report(infos: &[CacheInfo], verbose: bool) {
    println!("Scan results:");
    for info in infos {
        if let Some(err) = &info.error {
            println!("- {:<18} error: {}", info.name, err);
            continue;
        }
        if !info.is_installed {
            if verbose {
                println!("- {:<18} not installed", info.name);
            }
            continue;
        }

        let marker = if info.estimated { "~" } else { "" };
        println!(
            "- {:<18} {:<16} {:>12}",
            info.name,
            info.kind,
            format!("{marker}{}", format_bytes(info.size))
        );
        if verbose {
            for path in &info.paths {
                println!("    • {}", display_path(path));
            }
            for category in &info.categories {
                let age = category
                    .age_days
                    .map(|days| format!("{days}d old"))
                    .unwrap_or_else(|| "age unknown".to_string());
                println!(
                    "    [{}] {:<40} {:>12}  {}, {}, {}",
                    category.id,
                    category.name,
                    format_bytes(category.size),
                    category.priority,
                    category.use_case,
                    age
                );
            }
        }
    }

    let summary = ScanSummary::from_infos(infos);
    if summary.errors > 0 {
        println!("{} source(s) failed to scan.", summary.errors);
    }
    println!("Total reclaimable: {}", format_bytes(summary.total_size));
}
