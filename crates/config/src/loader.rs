use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::PorticoConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "portico.toml",
    "portico.yaml",
    "portico.yml",
    "portico.json",
];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Restrict discovery to `path`. Project-local and user-global locations are
/// skipped while the override is set.
pub fn set_config_dir(path: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<PorticoConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./portico.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/portico/portico.{toml,yaml,yml,json}` (user-global)
///
/// Returns `PorticoConfig::default()` when nothing is found or the file does
/// not parse. Callers re-run this to pick up edits (the connector supervisor
/// does so on every start).
pub fn discover_and_load() -> PorticoConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return PorticoConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            PorticoConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return first_existing(&dir);
    }

    first_existing(Path::new(".")).or_else(|| home_config_dir().and_then(|d| first_existing(&d)))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the config directory: override, or `~/.config/portico/`.
pub fn config_dir() -> Option<PathBuf> {
    config_dir_override().or_else(home_config_dir)
}

/// Returns the data directory: `~/.portico/` (credentials, linked sessions).
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".portico"))
        .unwrap_or_else(|| PathBuf::from(".portico"))
}

fn home_config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".config").join("portico"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<PorticoConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("portico.toml");
        std::fs::write(&toml_path, "[gateway]\nport = 9001\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().gateway.port, 9001);

        let yaml_path = dir.path().join("portico.yaml");
        std::fs::write(&yaml_path, "gateway:\n  port: 9002\n").unwrap();
        assert_eq!(load_config(&yaml_path).unwrap().gateway.port, 9002);

        let json_path = dir.path().join("portico.json");
        std::fs::write(&json_path, r#"{"gateway": {"port": 9003}}"#).unwrap();
        assert_eq!(load_config(&json_path).unwrap().gateway.port, 9003);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portico.ini");
        std::fs::write(&path, "port=1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("portico.toml")).is_err());
    }

    // Single test for the process-wide override so parallel tests don't race.
    #[test]
    fn override_dir_controls_discovery() {
        let dir = tempfile::tempdir().unwrap();
        set_config_dir(dir.path().to_path_buf());

        assert!(find_config_file().is_none());
        assert_eq!(discover_and_load().gateway.port, 18789);

        std::fs::write(
            dir.path().join("portico.toml"),
            "[channels.signal]\nhttp_port = 7000\n",
        )
        .unwrap();
        let cfg = discover_and_load();
        assert_eq!(cfg.channels.signal.unwrap().http_port, Some(7000));

        std::fs::write(dir.path().join("portico.toml"), "not = [valid").unwrap();
        assert_eq!(discover_and_load().gateway.port, 18789);

        assert_eq!(config_dir(), Some(dir.path().to_path_buf()));
        clear_config_dir();
    }
}
