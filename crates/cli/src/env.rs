use crate::error::CliError;
use engine_config::settings::{EngineSettings, env::ENV_PREFIX};
use std::{collections::HashMap, fs, path::Path};
use tracing::debug;

const SENSITIVE_PATTERNS: [&str; 5] = ["password", "passwd", "secret", "token", "credential"];

/// Process environment overlaid with an optional `.env` file. File values
/// win over the process environment.
#[derive(Debug, Clone)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn new() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Load variables from a .env file
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read env file {}: {}", path.display(), e))
        })?;

        self.parse_env_content(&content)?;
        debug!(path = %path.display(), "Loaded env file");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Engine settings built from the `FANOUT_*` variables.
    pub fn settings(&self) -> Result<EngineSettings, CliError> {
        for (key, value) in self.engine_vars() {
            debug!(%key, %value, "Engine variable");
        }
        Ok(EngineSettings::from_lookup(|key| self.get(key))?)
    }

    /// `FANOUT_*` variables with sensitive values masked, sorted by key.
    pub fn engine_vars(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = self
            .vars
            .iter()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .map(|(key, value)| {
                let shown = if is_sensitive(key) { "****".to_string() } else { value.clone() };
                (key.clone(), shown)
            })
            .collect();
        vars.sort();
        vars
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), CliError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid env file: malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::Config(format!(
                    "Invalid env file: empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars.insert(key.to_string(), unquote(value));
        }

        Ok(())
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

fn is_sensitive(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lowered.contains(p))
}
