use super::Config;
use anyhow::Result;
use std::path::Path;

/// Load the configuration file, or fall back to defaults when it is absent.
///
/// A file that exists but cannot be parsed is still an error.
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        log::warn!(
            "Configuration file {} not found, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let config = Config::from_file(path)?;
    log::info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.heuristics.threshold, 4);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "heuristics: [not, a, mapping").unwrap();
        assert!(load_config_or_default(&path).is_err());
    }

    #[test]
    fn test_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "cache:\n  ttl_hours: 12\n").unwrap();
        let config = load_config_or_default(&path).unwrap();
        assert_eq!(config.cache.ttl_hours, 12);
    }
}
