use clap::{ArgAction, Args, Parser, Subcommand};
use devsweep::commands::clean::CleanCommand;
use devsweep::commands::config_cmd::ConfigOptions;
use devsweep::commands::scan::ScanCommand;
use devsweep::commands::{execute_clean, execute_config, execute_list, execute_scan};
use devsweep::error::AppError;
use devsweep::format::parse_size;
use devsweep::manager::SourceSelection;
use devsweep::model::{CacheKind, Priority, SelectionCriteria, UseCase};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("devsweep={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::List => execute_list()?,
        Commands::Scan(args) => {
            execute_scan(ScanCommand {
                selection: args.selection.into_selection(),
                verbose: args.verbose,
                show_progress: args.progress,
                json: args.json,
            })?;
        }
        Commands::Clean(args) => {
            let criteria = args.filters.into_criteria();
            execute_clean(CleanCommand {
                selection: args.selection.into_selection(),
                categories: args.categories,
                criteria,
                dry_run: args.dry_run,
                assume_yes: args.yes,
                verbose: args.verbose,
                show_progress: args.progress,
                json: args.json,
            })?;
        }
        Commands::Config(args) => {
            execute_config(ConfigOptions {
                show_path: args.path,
                edit: args.edit,
                protect: args.protect,
                project_root: args.project_root,
                enable: args.enable,
                disable: args.disable,
            })?;
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "devsweep", version, about = "Find and safely reclaim development tool caches.")]
struct Cli {
    /// Log level for diagnostics written to stderr (overridden by RUST_LOG).
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every registered cache source and whether it is installed.
    #[command(visible_alias = "ls")]
    List,
    /// Measure caches without deleting anything.
    #[command(visible_alias = "sc")]
    Scan(ScanArgs),
    /// Delete caches, or preview the deletion with --dry-run.
    #[command(visible_alias = "cl")]
    Clean(CleanArgs),
    /// Manage devsweep configuration (protected paths, enabled sources).
    #[command(visible_alias = "cfg")]
    Config(ConfigArgs),
}

#[derive(Args)]
struct SelectionArgs {
    /// Only sources of this type (package-manager, build-tool, browser, ide, system, other).
    #[arg(short = 't', long = "type", value_name = "TYPE", action = ArgAction::Append)]
    types: Vec<CacheKind>,

    /// Run exactly these sources, ignoring --type, --exclude and disabled sources.
    #[arg(short = 'i', long = "include", value_name = "SOURCE", action = ArgAction::Append)]
    include: Vec<String>,

    /// Skip these sources.
    #[arg(short = 'x', long = "exclude", value_name = "SOURCE", action = ArgAction::Append)]
    exclude: Vec<String>,
}

impl SelectionArgs {
    fn into_selection(self) -> SourceSelection {
        SourceSelection { include: self.include, types: self.types, exclude: self.exclude }
    }
}

#[derive(Args)]
struct ScanArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    /// Show paths and categories for every source.
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Show live per-source progress while scanning.
    #[arg(long = "progress", action = ArgAction::SetTrue)]
    progress: bool,

    /// Print results as JSON.
    #[arg(long = "json", action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args)]
struct FilterArgs {
    /// Only caches last modified at least this many days ago.
    #[arg(long = "older-than", value_name = "DAYS")]
    older_than: Option<u64>,

    /// Only caches modified within this many days.
    #[arg(long = "newer-than", value_name = "DAYS")]
    newer_than: Option<u64>,

    /// Only caches at least this large (e.g. 500MB).
    #[arg(long = "min-size", value_name = "SIZE", value_parser = parse_size)]
    min_size: Option<u64>,

    /// Only caches at most this large.
    #[arg(long = "max-size", value_name = "SIZE", value_parser = parse_size)]
    max_size: Option<u64>,

    /// Only categories with this priority (critical, important, normal, low).
    #[arg(long = "priority", value_name = "PRIORITY", action = ArgAction::Append)]
    priorities: Vec<Priority>,

    /// Only categories with this use case.
    #[arg(long = "use-case", value_name = "USE_CASE", action = ArgAction::Append)]
    use_cases: Vec<UseCase>,
}

impl FilterArgs {
    fn into_criteria(self) -> SelectionCriteria {
        SelectionCriteria {
            older_than_days: self.older_than,
            newer_than_days: self.newer_than,
            min_size: self.min_size,
            max_size: self.max_size,
            use_cases: self.use_cases,
            priorities: self.priorities,
            project_specific: None,
            category_ids: Vec::new(),
        }
    }
}

#[derive(Args)]
struct CleanArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    #[command(flatten)]
    filters: FilterArgs,

    /// Clear a single category, as SOURCE:CATEGORY (repeatable).
    #[arg(
        short = 'c',
        long = "category",
        value_name = "SOURCE:CATEGORY",
        action = ArgAction::Append
    )]
    categories: Vec<String>,

    /// Report what would be deleted without deleting anything.
    #[arg(short = 'n', long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Skip the confirmation prompt.
    #[arg(short = 'y', long = "yes", action = ArgAction::SetTrue)]
    yes: bool,

    /// Show each deleted path.
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Show live per-source progress.
    #[arg(long = "progress", action = ArgAction::SetTrue)]
    progress: bool,

    /// Print results as JSON.
    #[arg(long = "json", action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args)]
struct ConfigArgs {
    /// Show the configuration file path.
    #[arg(long = "path", action = ArgAction::SetTrue)]
    path: bool,

    /// Open the configuration file in $EDITOR.
    #[arg(long = "edit", action = ArgAction::SetTrue)]
    edit: bool,

    /// Add a glob pattern that must never be cleared.
    #[arg(long = "protect", value_name = "PATTERN")]
    protect: Option<String>,

    /// Add a directory to walk for project build output.
    #[arg(long = "project-root", value_name = "PATH")]
    project_root: Option<String>,

    /// Enable a cache source.
    #[arg(long = "enable", value_name = "SOURCE", action = ArgAction::Append)]
    enable: Vec<String>,

    /// Disable a cache source.
    #[arg(long = "disable", value_name = "SOURCE", action = ArgAction::Append)]
    disable: Vec<String>,
}
