use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Split, Task, validate_version_id};
use crate::error::PsstError;

pub const LEDGER_FILE_NAME: &str = "versions.json";
pub const DEFAULT_LEDGER_COMMENT: &str = "Most recent versions are first in the list.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitFiles {
    #[serde(default)]
    pub train: Option<String>,
    #[serde(default)]
    pub valid: Option<String>,
    #[serde(default)]
    pub test: Option<String>,
}

impl SplitFiles {
    pub fn get(&self, split: Split) -> Option<&str> {
        match split {
            Split::Train => self.train.as_deref(),
            Split::Valid => self.valid.as_deref(),
            Split::Test => self.test.as_deref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Split, Option<&str>)> + '_ {
        Split::ALL.into_iter().map(|split| (split, self.get(split)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub version_id: String,
    #[serde(default)]
    pub files: SplitFiles,
    #[serde(default)]
    pub comment: String,
    #[serde(skip)]
    pub root_dir: Option<Utf8PathBuf>,
}

impl Version {
    pub fn new(version_id: impl Into<String>, files: SplitFiles) -> Self {
        Self {
            version_id: version_id.into(),
            files,
            comment: String::new(),
            root_dir: None,
        }
    }

    pub fn apply_dir(&self, root_dir: &Utf8Path) -> Version {
        Version {
            root_dir: Some(root_dir.to_path_buf()),
            ..self.clone()
        }
    }

    pub fn is_detached(&self) -> bool {
        self.root_dir.is_none()
    }

    pub fn local_dir(&self) -> Result<Utf8PathBuf, PsstError> {
        let root = self
            .root_dir
            .as_ref()
            .ok_or_else(|| PsstError::DetachedVersion(self.version_id.clone()))?;
        Ok(root.join(format!("psst-data-{}", self.version_id)))
    }

    pub fn split_dir(&self, split: Split) -> Result<Utf8PathBuf, PsstError> {
        Ok(self.local_dir()?.join(split.as_str()))
    }

    pub fn task_files(&self, task: Task) -> Result<BTreeMap<Split, Option<Utf8PathBuf>>, PsstError> {
        let local_dir = self.local_dir()?;
        Ok(self
            .files
            .iter()
            .map(|(split, file)| {
                let path = file.map(|_| {
                    local_dir
                        .join(split.as_str())
                        .join(task.manifest_name(split))
                });
                (split, path)
            })
            .collect())
    }

    pub fn has_test_split(&self) -> bool {
        self.files.test.is_some()
    }

    fn first_missing_file(&self) -> Result<Option<Utf8PathBuf>, PsstError> {
        for task in Task::ALL {
            for path in self.task_files(task)?.into_values().flatten() {
                if !path.as_std_path().exists() {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLedger {
    #[serde(default = "default_comment")]
    pub comment: String,
    #[serde(default)]
    pub versions: Vec<Version>,
}

impl Default for VersionLedger {
    fn default() -> Self {
        Self {
            comment: default_comment(),
            versions: Vec::new(),
        }
    }
}

impl VersionLedger {
    pub fn new(comment: impl Into<String>, versions: Vec<Version>) -> Self {
        Self {
            comment: comment.into(),
            versions,
        }
    }

    pub fn path(cache_root: &Utf8Path) -> Utf8PathBuf {
        cache_root.join(LEDGER_FILE_NAME)
    }

    pub fn from_json(json: &str, cache_root: &Utf8Path) -> Result<Self, PsstError> {
        let ledger: VersionLedger =
            serde_json::from_str(json).map_err(|err| PsstError::ManifestParse(err.to_string()))?;
        let versions = ledger
            .versions
            .into_iter()
            .filter(|version| match validate_version_id(&version.version_id) {
                Ok(()) => true,
                Err(err) => {
                    warn!("skipping version: {err}");
                    false
                }
            })
            .map(|version| version.apply_dir(cache_root))
            .collect();
        Ok(Self {
            comment: ledger.comment,
            versions,
        })
    }

    /// Reads `<cache_root>/versions.json`, keeping only the versions whose
    /// manifests are all present on disk. A missing or unreadable ledger is an
    /// empty one.
    pub fn load_local(cache_root: &Utf8Path) -> Self {
        let path = Self::path(cache_root);
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        let ledger = match Self::from_json(&content, cache_root) {
            Ok(ledger) => ledger,
            Err(err) => {
                warn!("ignoring unreadable ledger {path}: {err}");
                return Self::default();
            }
        };

        let versions = ledger
            .versions
            .into_iter()
            .filter(|version| match version.first_missing_file() {
                Ok(None) => true,
                Ok(Some(missing)) => {
                    warn!("Missing file {missing}");
                    false
                }
                Err(_) => false,
            })
            .collect();

        Self {
            comment: ledger.comment,
            versions,
        }
    }

    pub fn save(&self, cache_root: &Utf8Path) -> Result<(), PsstError> {
        fs::create_dir_all(cache_root.as_std_path())
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".versions")
            .tempfile_in(cache_root.as_std_path())
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
        temp.persist(Self::path(cache_root).as_std_path())
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn apply_dir(&self, root_dir: &Utf8Path) -> Self {
        Self {
            comment: self.comment.clone(),
            versions: self
                .versions
                .iter()
                .map(|version| version.apply_dir(root_dir))
                .collect(),
        }
    }

    pub fn lookup(&self, version_id: &str) -> Result<&Version, PsstError> {
        self.get(version_id)
            .ok_or_else(|| PsstError::VersionNotFound {
                version_id: version_id.to_string(),
                known: self.version_ids().join(", "),
            })
    }

    pub fn get(&self, version_id: &str) -> Option<&Version> {
        self.versions
            .iter()
            .find(|version| version.version_id == version_id)
    }

    pub fn contains(&self, version_id: &str) -> bool {
        self.get(version_id).is_some()
    }

    pub fn latest(&self) -> Result<&Version, PsstError> {
        self.versions.first().ok_or(PsstError::EmptyLedger)
    }

    pub fn version_ids(&self) -> Vec<&str> {
        self.versions
            .iter()
            .map(|version| version.version_id.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

fn default_comment() -> String {
    DEFAULT_LEDGER_COMMENT.to_string()
}
