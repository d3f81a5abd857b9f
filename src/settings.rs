use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PsstError;

pub const DEFAULT_LOCAL_DIR: &str = "~/psst-data";
pub const DEFAULT_BASE_URL: &str = "https://media.talkbank.org/aphasia/RaPID";
pub const DEFAULT_AUTH_SERVER: &str = "https://sla2.talkbank.org:1515";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_local_dir")]
    pub local_dir: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_auth_server")]
    pub auth_server: String,
    #[serde(default)]
    pub download_username: String,
    #[serde(default)]
    pub download_password: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local_dir: default_local_dir(),
            base_url: default_base_url(),
            auth_server: default_auth_server(),
            download_username: String::new(),
            download_password: String::new(),
        }
    }
}

impl Settings {
    pub fn has_credentials(&self) -> bool {
        !self.download_username.is_empty()
    }

    pub fn local_dir_path(&self) -> Result<Utf8PathBuf, PsstError> {
        expand_home(&self.local_dir)
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: Utf8PathBuf,
}

impl SettingsStore {
    pub fn new() -> Result<Self, PsstError> {
        let path = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".config")
                        .join("psstdata")
                        .join("settings.json"),
                )
                .ok()
            })
            .ok_or(PsstError::SettingsPath)?;
        Ok(Self { path })
    }

    pub fn with_path(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings, PsstError> {
        let content = match fs::read_to_string(self.path.as_std_path()) {
            Ok(content) => content,
            Err(_) => return self.save(&Settings::default()),
        };
        match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => Ok(settings),
            Err(err) => {
                warn!(
                    "settings file {} is possibly corrupt ({err}); regenerating defaults",
                    self.path
                );
                self.save(&Settings::default())
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<Settings, PsstError> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| PsstError::Filesystem("invalid settings path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(settings)
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".settings")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
        Ok(settings.clone())
    }
}

pub fn expand_home(path: &str) -> Result<Utf8PathBuf, PsstError> {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return Ok(Utf8PathBuf::from(path)),
    };
    let home = BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok())
        .ok_or_else(|| PsstError::Filesystem("unable to resolve home directory".to_string()))?;
    if rest.is_empty() {
        return Ok(home);
    }
    Ok(home.join(rest))
}

fn default_local_dir() -> String {
    DEFAULT_LOCAL_DIR.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_auth_server() -> String {
    DEFAULT_AUTH_SERVER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let settings = Settings {
            base_url: "https://example.org/data/".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            settings.url("versions.json"),
            "https://example.org/data/versions.json"
        );
    }

    #[test]
    fn absolute_paths_are_not_expanded() {
        assert_eq!(expand_home("/srv/psst").unwrap(), "/srv/psst");
        assert_eq!(expand_home("~other/x").unwrap(), "~other/x");
    }

    #[test]
    fn tilde_expands_to_home() {
        let expanded = expand_home("~/psst-data").unwrap();
        assert!(expanded.ends_with("psst-data"));
        assert!(!expanded.as_str().starts_with('~'));
    }
}
