//! Process-level bootstrap configuration: home directory and logging.
//!
//! Deliberately separate from [`hearthkit::config::Config`], the module-wiring
//! document - this is the handful of settings the process needs before a
//! registry or a config pipeline exist at all. In practice both are read from
//! the same YAML file (the CLI only takes one `--config` path), so `BootConfig`
//! does not reject unknown fields: the module-wiring keys (`version`,
//! `modules`, `agents`, ...) simply pass through unused by this layer.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::paths::home_dir::resolve_home_dir;

/// Logging configuration: subsystem name -> settings. "default" is the
/// catch-all for targets that don't match an explicit subsystem.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String,
    pub file: String,
    #[serde(default)]
    pub file_level: String,
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BootConfig {
    /// Data/workspace root; empty means "resolve the platform default".
    #[serde(default)]
    pub home_dir: String,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            home_dir: String::new(),
            logging: Some(default_logging_config()),
        }
    }
}

pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/hearthkit.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

const fn default_subdir() -> &'static str {
    ".hearthkit"
}

impl BootConfig {
    /// Loads the bootstrap config layer: defaults, then the YAML file, then
    /// `HEARTHKIT__*` environment overrides. `home_dir` is normalized to an
    /// absolute path and created on disk before returning.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        let base = BootConfig {
            home_dir: String::new(),
            logging: None,
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            .merge(Env::prefixed("HEARTHKIT__").split("__"));

        let mut config: BootConfig = figment
            .extract()
            .with_context(|| "failed to extract bootstrap config from figment".to_string())?;

        normalize_home_dir_inplace(&mut config).context("failed to resolve home_dir")?;
        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut config = Self::default();
                normalize_home_dir_inplace(&mut config).context("failed to resolve home_dir (defaults)")?;
                Ok(config)
            }
        }
    }

    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(),
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config: Option<String>,
    pub verbose: u8,
}

fn normalize_home_dir_inplace(config: &mut BootConfig) -> Result<()> {
    let opt = if config.home_dir.trim().is_empty() {
        None
    } else {
        Some(config.home_dir.clone())
    };
    let resolved: PathBuf = resolve_home_dir(opt, default_subdir(), /*create*/ true)
        .context("home_dir normalization failed")?;
    config.home_dir = resolved.to_string_lossy().to_string();
    Ok(())
}

/// Expands `${VARNAME}` references in a single string such as a DSN or a
/// storage path, failing on the first unbound variable. Extended, accumulated
/// handling of a whole document lives in `hearthkit::config::expand`; this is
/// the narrower single-value form used by bootstrap itself.
pub fn expand_env_in_dsn(dsn: &str) -> Result<String> {
    use std::env;

    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut result = dsn.to_string();
    for caps in re.captures_iter(dsn) {
        let var = &caps[1];
        let value = env::var(var).with_context(|| format!("environment variable '{var}' is not set"))?;
        result = result.replace(&format!("${{{var}}}"), &value);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_logging_has_a_default_section() {
        let logging = default_logging_config();
        assert!(logging.contains_key("default"));
    }

    #[test]
    fn expand_env_in_dsn_substitutes_bound_vars() {
        std::env::set_var("HEARTHKIT_BOOT_TEST_VAR", "secret");
        let out = expand_env_in_dsn("sqlite://${HEARTHKIT_BOOT_TEST_VAR}/db").unwrap();
        assert_eq!(out, "sqlite://secret/db");
        std::env::remove_var("HEARTHKIT_BOOT_TEST_VAR");
    }

    #[test]
    fn expand_env_in_dsn_errors_on_missing_var() {
        std::env::remove_var("HEARTHKIT_BOOT_TEST_MISSING");
        let err = expand_env_in_dsn("sqlite://${HEARTHKIT_BOOT_TEST_MISSING}/db");
        assert!(err.is_err());
    }

    #[test]
    fn load_layered_normalizes_home_dir_to_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("boot.yaml");
        let home = dir.path().join("home");
        std::fs::write(&config_path, format!("home_dir: \"{}\"\n", home.display())).unwrap();

        let config = BootConfig::load_layered(&config_path).unwrap();
        assert!(Path::new(&config.home_dir).is_absolute());
        assert!(Path::new(&config.home_dir).exists());
    }

    #[test]
    fn load_layered_ignores_module_wiring_fields_sharing_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("hearthkit.yaml");
        std::fs::write(
            &config_path,
            "home_dir: \"\"\nversion: \"1\"\nmodules:\n  store.sqlite: {}\n",
        )
        .unwrap();

        let config = BootConfig::load_layered(&config_path).unwrap();
        assert!(Path::new(&config.home_dir).is_absolute());
    }

    #[test]
    fn apply_cli_overrides_bumps_console_level() {
        let mut config = BootConfig::default();
        config.apply_cli_overrides(&CliArgs { config: None, verbose: 2 });
        let level = &config.logging.unwrap()["default"].console_level;
        assert_eq!(level, "trace");
    }
}
