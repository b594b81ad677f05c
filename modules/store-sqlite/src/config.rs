use serde::{Deserialize, Serialize};

fn default_path() -> String {
    "default.db".to_string()
}

/// Raw config node for the `store.sqlite` module. `path` is relative to
/// `{data_dir}/store.sqlite/` unless it is already absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_path() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_sensible_path() {
        assert_eq!(StoreConfig::default().path, "default.db");
    }

    #[test]
    fn deserializes_from_partial_json() {
        let cfg: StoreConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(cfg.path, "default.db");

        let cfg: StoreConfig = serde_json::from_value(serde_json::json!({"path": "prod.db"})).unwrap();
        assert_eq!(cfg.path, "prod.db");
    }
}
