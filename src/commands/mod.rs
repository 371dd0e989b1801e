pub mod clean;
pub mod config_cmd;
pub mod list;
pub mod scan;

pub use clean::execute_clean;
pub use config_cmd::execute_config;
pub use list::execute_list;
pub use scan::execute_scan;
