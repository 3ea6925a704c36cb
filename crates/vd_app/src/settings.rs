use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "VD_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    /// Where the configuration document is loaded from and saved to.
    pub config_path: PathBuf,
    /// Output port used when the stored document does not name one.
    pub port: Option<String>,
    pub log_filter: String,
    pub save_on_exit: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.json"),
            port: None,
            log_filter: "info".to_string(),
            save_on_exit: true,
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(CONFIG_PATH_ENV).filter(|path| !path.is_empty()) {
            self.config_path = PathBuf::from(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Settings, SettingsError, CONFIG_PATH_ENV};
    use std::path::{Path, PathBuf};

    #[test]
    fn missing_fields_take_defaults() {
        let settings = Settings::from_json("{ \"port\": \"UM-ONE 1\" }").unwrap();
        assert_eq!(settings.port.as_deref(), Some("UM-ONE 1"));
        assert_eq!(settings.config_path, PathBuf::from("config.json"));
        assert_eq!(settings.log_filter, "info");
        assert!(settings.save_on_exit);
    }

    #[test]
    fn keys_are_kebab_case_and_strict() {
        let settings =
            Settings::from_json("{ \"config-path\": \"/tmp/kit.json\", \"save-on-exit\": false }")
                .unwrap();
        assert_eq!(settings.config_path, PathBuf::from("/tmp/kit.json"));
        assert!(!settings.save_on_exit);

        assert!(matches!(
            Settings::from_json("{ \"config_path\": \"x\" }"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn environment_overrides_config_path() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(|key| {
            (key == CONFIG_PATH_ENV).then(|| "/var/lib/kit.json".to_string())
        });
        assert_eq!(settings.config_path, PathBuf::from("/var/lib/kit.json"));

        settings.apply_env_overrides(|_| Some(String::new()));
        assert_eq!(settings.config_path, PathBuf::from("/var/lib/kit.json"));
    }

    #[test]
    fn unreadable_settings_file_is_reported() {
        let err = Settings::load(Path::new("/nonexistent/vd_settings.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }
}
