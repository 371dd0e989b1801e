use std::collections::BTreeMap;

use dialoguer::Confirm;

use crate::config::Config;
use crate::error::AppError;
use crate::format::{display_path, format_bytes};
use crate::manager::{CacheManager, CleanOptions, SourceSelection};
use crate::model::{ClearResult, ClearSummary, SelectionCriteria};

pub struct CleanCommand {
    pub selection: SourceSelection,
    /// `SOURCE:CATEGORY` selectors.
    pub categories: Vec<String>,
    pub criteria: SelectionCriteria,
    pub dry_run: bool,
    pub assume_yes: bool,
    pub verbose: bool,
    pub show_progress: bool,
    pub json: bool,
}

pub fn execute_clean(command: CleanCommand) -> Result<Vec<ClearResult>, AppError> {
    let config = Config::load()?;
    let manager = CacheManager::from_config(&config)?;

    let sub_caches = parse_category_selectors(&command.categories)?;
    let mut selection = command.selection.clone();
    // Category selectors narrow the run to the sources they name.
    if selection.include.is_empty() && !sub_caches.is_empty() {
        selection.include = sub_caches.keys().cloned().collect();
    }

    let mut options = CleanOptions {
        dry_run: true,
        selection,
        sub_caches_to_clear: sub_caches,
        criteria: (!command.criteria.is_empty()).then(|| command.criteria.clone()),
        show_progress: command.show_progress,
    };

    let needs_confirmation = !command.dry_run && !command.assume_yes && config.require_confirmation;
    if needs_confirmation {
        let plan = manager.clean_all_caches(&options);
        let summary = ClearSummary::from_results(&plan);
        if summary.freed == 0 {
            println!("Nothing to delete. All selected caches are already clean.");
            return Ok(plan);
        }
        print_results(&plan, true);
        if !confirm_deletion(summary.freed)? {
            println!("Aborted. No files were deleted.");
            return Ok(plan);
        }
    }

    options.dry_run = command.dry_run;
    let results = manager.clean_all_caches(&options);
    if command.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results, command.verbose || command.dry_run);
    }
    Ok(results)
}

pub fn parse_category_selectors(
    selectors: &[String],
) -> Result<BTreeMap<String, Vec<String>>, AppError> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for selector in selectors {
        let (source, category) = selector
            .split_once(':')
            .filter(|(source, category)| !source.is_empty() && !category.is_empty())
            .ok_or_else(|| AppError::InvalidCategory(selector.clone()))?;
        let ids = map.entry(source.to_string()).or_default();
        if !ids.iter().any(|id| id == category) {
            ids.push(category.to_string());
        }
    }
    Ok(map)
}

fn confirm_deletion(total_size: u64) -> Result<bool, AppError> {
    let confirmed = Confirm::new()
        .with_prompt(format!("About to delete {}. Proceed?", format_bytes(total_size)))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

fn print_results(results: &[ClearResult], verbose: bool) {
    let dry_run = results.iter().any(|result| result.dry_run);
    println!("{}", if dry_run { "Deletion plan:" } else { "Cleanup results:" });
    for result in results {
        if let Some(err) = &result.error {
            println!("- {:<18} failed: {}", result.name, err);
            continue;
        }
        println!(
            "- {:<18} {:>12} across {} path(s)",
            result.name,
            format_bytes(result.freed()),
            result.cleared_paths.len()
        );
        if verbose {
            for path in &result.cleared_paths {
                println!("    • {}", display_path(path));
            }
        }
    }

    let summary = ClearSummary::from_results(results);
    if dry_run {
        println!("Would free: {}", format_bytes(summary.freed));
        println!("Dry run: no files were deleted.");
    } else {
        println!(
            "Freed {} across {} source(s), {} failed.",
            format_bytes(summary.freed),
            summary.succeeded,
            summary.failed
        );
    }
}
