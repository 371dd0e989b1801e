use crate::config::Config;
use crate::error::AppError;
use crate::manager::CacheManager;

pub fn execute_list() -> Result<(), AppError> {
    let config = Config::load()?;
    let manager = CacheManager::from_config(&config)?;

    println!("Registered cache sources:");
    for source in manager.sources() {
        let capabilities = source.capabilities();
        let available = source.is_available(manager.context());
        println!(
            "- {:<18} {:<16} {:<14} {:<9}{}",
            source.name(),
            source.kind(),
            if available { "installed" } else { "not installed" },
            if manager.settings().is_enabled(source.name()) { "enabled" } else { "disabled" },
            if capabilities.categories { " categories" } else { "" }
        );
    }
    Ok(())
}
