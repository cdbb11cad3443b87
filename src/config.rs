use std::env;
use std::time::Duration;

pub const SIGNATURE_VAR: &str = "BATCHRUN_SIGNATURE";
pub const SHELL_VAR: &str = "BATCHRUN_SHELL";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Signature the shell requests are tagged with and the executor listens to.
    pub listen_signature: String,
    pub shell: String,
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_signature: "ConfirmShellTask".to_string(),
            shell: "sh".to_string(),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(signature) = lookup(SIGNATURE_VAR).filter(|s| !s.trim().is_empty()) {
            config.listen_signature = signature.trim().to_string();
        }
        if let Some(shell) = lookup(SHELL_VAR).filter(|s| !s.trim().is_empty()) {
            config.shell = shell.trim().to_string();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_variables() {
        assert_eq!(Config::from_lookup(|_| None), Config::default());
    }

    #[test]
    fn variables_override_defaults() {
        let config = Config::from_lookup(|key| match key {
            SIGNATURE_VAR => Some(" Imported ".to_string()),
            SHELL_VAR => Some("bash".to_string()),
            _ => None,
        });
        assert_eq!(config.listen_signature, "Imported");
        assert_eq!(config.shell, "bash");
    }

    #[test]
    fn blank_variables_are_ignored() {
        let config = Config::from_lookup(|_| Some("   ".to_string()));
        assert_eq!(config, Config::default());
    }
}
