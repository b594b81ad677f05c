//! The canonical configuration document shape.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    #[serde(default)]
    pub security: Option<SecurityConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub provider: Option<String>,
    #[serde(default)]
    pub routing: RoutingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RoutingConfig {
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginConfig {
    pub module: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub plugins: PluginSecurityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PluginSecurityConfig {
    #[serde(default)]
    pub require_certified: bool,
    #[serde(default)]
    pub trusted_keys: Vec<String>,
}

impl Config {
    /// The configured module ids, sorted ascending - the deterministic load
    /// order the lifecycle coordinator is handed.
    pub fn resolve(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.modules.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Runs every structural check to completion, accumulating violations
    /// rather than stopping at the first one.
    pub fn validate(&self, known_module_ids: &[String]) -> Vec<String> {
        let mut violations = Vec::new();

        if self.version != "1" {
            violations.push(format!("unsupported version '{}', expected \"1\"", self.version));
        }

        if self.modules.is_empty() {
            violations.push("no modules configured".to_string());
        }

        for id in self.modules.keys() {
            if !known_module_ids.iter().any(|known| known == id) {
                violations.push(format!("unknown module '{id}'"));
            }
        }

        let default_agents: Vec<_> = self.agents.iter().filter(|(_, a)| a.routing.default).collect();
        if default_agents.len() > 1 {
            violations.push(format!(
                "more than one default agent: {}",
                default_agents.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }

        for (name, agent) in &self.agents {
            if let Some(provider) = &agent.provider {
                if !self.modules.contains_key(provider) {
                    violations.push(format!("agent '{name}' references unknown provider module '{provider}'"));
                }
            }
        }

        for plugin in &self.plugins {
            if plugin.module.trim().is_empty() {
                violations.push("plugin entry with empty module path".to_string());
            }
        }

        if let Some(security) = &self.security {
            for key in &security.plugins.trusted_keys {
                if !is_32_byte_hex(key) {
                    violations.push(format!("trusted key '{key}' is not 32 bytes of hex"));
                }
            }
            if security.plugins.require_certified && security.plugins.trusted_keys.is_empty() {
                violations.push("require_certified is set but trusted_keys is empty".to_string());
            }
        }

        violations
    }
}

fn is_32_byte_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            version: "1".to_string(),
            modules: [("m.a".to_string(), serde_json::json!({}))].into_iter().collect(),
            agents: HashMap::new(),
            plugins: Vec::new(),
            security: None,
        }
    }

    #[test]
    fn valid_config_has_no_violations() {
        let config = base();
        assert!(config.validate(&["m.a".to_string()]).is_empty());
    }

    #[test]
    fn unknown_module_is_flagged() {
        let config = base();
        let violations = config.validate(&[]);
        assert!(violations.iter().any(|v| v.contains("unknown module 'm.a'")));
    }

    #[test]
    fn wrong_version_is_flagged() {
        let mut config = base();
        config.version = "2".to_string();
        let violations = config.validate(&["m.a".to_string()]);
        assert!(violations.iter().any(|v| v.contains("unsupported version")));
    }

    #[test]
    fn resolve_is_sorted_ascending() {
        let mut config = base();
        config.modules.insert("a.z".to_string(), serde_json::json!({}));
        config.modules.insert("a.a".to_string(), serde_json::json!({}));
        assert_eq!(config.resolve(), vec!["a.a".to_string(), "a.z".to_string(), "m.a".to_string()]);
    }

    #[test]
    fn more_than_one_default_agent_is_flagged() {
        let mut config = base();
        config.agents.insert("agent1".into(), AgentConfig { provider: None, routing: RoutingConfig { default: true } });
        config.agents.insert("agent2".into(), AgentConfig { provider: None, routing: RoutingConfig { default: true } });
        let violations = config.validate(&["m.a".to_string()]);
        assert!(violations.iter().any(|v| v.contains("more than one default agent")));
    }
}
