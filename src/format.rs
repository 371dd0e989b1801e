use std::path::{Path, PathBuf};

use byte_unit::{Byte, UnitType};
use dirs_next as dirs;

/// Format bytes into a human-readable string using base-1024 units.
pub fn format_bytes(size: u64) -> String {
    if size == 0 {
        "0 B".to_string()
    } else {
        let adjusted = Byte::from_u64(size).get_appropriate_unit(UnitType::Binary);
        format!("{adjusted:#.2}")
    }
}

/// Parse sizes such as `500MB`, `1.5 GiB` or `2048` into bytes.
pub fn parse_size(value: &str) -> Result<u64, String> {
    let byte = Byte::parse_str(value.trim(), true)
        .map_err(|err| format!("Invalid size '{value}': {err}"))?;
    u64::try_from(byte.as_u128()).map_err(|_| format!("Size '{value}' is too large"))
}

/// Replace the home directory prefix with `~` to make output easier to read.
pub fn display_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        let mut display = PathBuf::from("~");
        display.push(stripped);
        return display.display().to_string();
    }

    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_plain_bytes() {
        assert_eq!(format_bytes(0), "0 B");
    }

    #[test]
    fn labels_grow_with_magnitude() {
        assert!(format_bytes(512).ends_with('B'));
        assert!(format_bytes(2 * 1024).contains("KiB"));
        assert!(format_bytes(3 * 1024 * 1024).contains("MiB"));
        assert!(format_bytes(5 * 1024 * 1024 * 1024).contains("GiB"));
        assert!(format_bytes(7 * 1024u64.pow(4)).contains("TiB"));
    }

    #[test]
    fn parses_human_sizes() {
        assert_eq!(parse_size("2048"), Ok(2048));
        assert_eq!(parse_size("1 KiB"), Ok(1024));
        assert_eq!(parse_size("5MB"), Ok(5_000_000));
        assert!(parse_size("lots").is_err());
    }
}
