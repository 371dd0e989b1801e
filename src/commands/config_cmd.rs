use std::path::Path;
use std::process::Command;

use crate::config::{Config, config_file_path, ensure_config_file};
use crate::error::AppError;
use crate::format::display_path;
use crate::source::builtin_sources;

pub struct ConfigOptions {
    pub show_path: bool,
    pub edit: bool,
    pub protect: Option<String>,
    pub project_root: Option<String>,
    pub enable: Vec<String>,
    pub disable: Vec<String>,
}

impl ConfigOptions {
    fn mutates(&self) -> bool {
        self.protect.is_some()
            || self.project_root.is_some()
            || !self.enable.is_empty()
            || !self.disable.is_empty()
    }
}

pub fn execute_config(options: ConfigOptions) -> Result<(), AppError> {
    if options.show_path {
        let path = config_file_path()?;
        println!("Configuration file: {}", display_path(&path));
    }

    if options.mutates() {
        let mut config = Config::load()?;
        if let Some(pattern) = &options.protect {
            config.append_protected(pattern.clone());
            println!("Added protected pattern '{}'.", pattern);
        }
        if let Some(root) = &options.project_root {
            if !config.project_roots.contains(root) {
                config.project_roots.push(root.clone());
            }
            println!("Added project root '{}'.", root);
        }
        for (names, enabled) in [(&options.enable, true), (&options.disable, false)] {
            for name in names {
                ensure_known_source(name)?;
                config.set_enabled(name, enabled);
                println!("{} source '{}'.", if enabled { "Enabled" } else { "Disabled" }, name);
            }
        }
        config.save()?;
    }

    if options.edit {
        let path = ensure_config_file()?;
        open_editor(&path)?;
    }

    if !options.show_path && !options.mutates() && !options.edit {
        let path = config_file_path()?;
        println!("Configuration file: {}", display_path(&path));
    }

    Ok(())
}

fn ensure_known_source(name: &str) -> Result<(), AppError> {
    if builtin_sources(Vec::new()).iter().any(|source| source.name() == name) {
        Ok(())
    } else {
        Err(AppError::UnknownSource(name.to_string()))
    }
}

fn open_editor(path: &Path) -> Result<(), AppError> {
    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "nano".to_string());

    let status = Command::new(&editor)
        .arg(path)
        .status()
        .map_err(|err| AppError::Editor(err.to_string()))?;

    if status.success() {
        Ok(())
    } else {
        Err(AppError::Editor(format!("Editor exited with status {}", status)))
    }
}
