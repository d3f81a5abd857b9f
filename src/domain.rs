use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PsstError;

/// Version id of the bundled synthetic dataset. Ledgers resolved for it are
/// never written back to disk.
pub const ARTIFICIAL_VERSION_ID: &str = "ARTIFICIAL";

static UNSAFE_VERSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^$|^\.\.?$|[/\\\x00]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Split {
    type Err = PsstError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "train" => Ok(Split::Train),
            "valid" => Ok(Split::Valid),
            "test" => Ok(Split::Test),
            _ => Err(PsstError::InvalidSplit(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    PhonemeRecognition,
    Correctness,
}

impl Task {
    pub const ALL: [Task; 2] = [Task::Correctness, Task::PhonemeRecognition];

    pub fn file_stem(self) -> &'static str {
        match self {
            Task::PhonemeRecognition => "utterances",
            Task::Correctness => "correctness",
        }
    }

    pub fn manifest_name(self, split: Split) -> String {
        format!("{}_{}.tsv", self.file_stem(), split)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::PhonemeRecognition => write!(f, "phoneme-recognition"),
            Task::Correctness => write!(f, "correctness"),
        }
    }
}

impl FromStr for Task {
    type Err = PsstError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "phoneme-recognition" | "asr" => Ok(Task::PhonemeRecognition),
            "correctness" => Ok(Task::Correctness),
            _ => Err(PsstError::InvalidTask(value.to_string())),
        }
    }
}

/// Version ids end up as directory names, so ids that would escape the cache
/// root are refused. Anything else is accepted.
pub fn validate_version_id(value: &str) -> Result<(), PsstError> {
    if UNSAFE_VERSION_ID_RE.is_match(value) {
        return Err(PsstError::InvalidVersionId(value.to_string()));
    }
    Ok(())
}
