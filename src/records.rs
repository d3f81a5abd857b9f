use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PsstError;
use crate::phonology::WAV_FRAME_RATE;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Utterance {
    pub utterance_id: String,
    pub session: String,
    pub test: String,
    pub prompt: String,
    pub transcript: String,
    #[serde(deserialize_with = "deserialize_flag")]
    pub correctness: bool,
    #[serde(deserialize_with = "deserialize_optional_score")]
    pub aq_index: Option<f64>,
    pub duration_frames: u64,
    pub filename: String,
    #[serde(skip)]
    pub root_dir: Option<Utf8PathBuf>,
}

impl Utterance {
    pub fn filename_absolute(&self) -> Result<Utf8PathBuf, PsstError> {
        let root = self.root_dir.as_ref().ok_or_else(|| {
            PsstError::Filesystem(format!("utterance {} has no data directory", self.utterance_id))
        })?;
        Ok(root.join(&self.filename))
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_frames as f64 / f64::from(WAV_FRAME_RATE)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds())
    }

    pub fn session_metadata(&self) -> SessionMetadata {
        SessionMetadata {
            session: self.session.clone(),
            aq_index: self.aq_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMetadata {
    pub session: String,
    pub aq_index: Option<f64>,
}

impl SessionMetadata {
    pub fn severity(&self) -> Result<AqSeverity, PsstError> {
        AqSeverity::from_score(self.aq_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AqSeverity {
    Unknown,
    VerySevere,
    Severe,
    Moderate,
    Mild,
}

impl AqSeverity {
    pub const ALL: [AqSeverity; 5] = [
        AqSeverity::Unknown,
        AqSeverity::VerySevere,
        AqSeverity::Severe,
        AqSeverity::Moderate,
        AqSeverity::Mild,
    ];

    pub fn threshold(self) -> i32 {
        match self {
            AqSeverity::Unknown => -1,
            AqSeverity::VerySevere => 25,
            AqSeverity::Severe => 50,
            AqSeverity::Moderate => 75,
            AqSeverity::Mild => 100,
        }
    }

    pub fn from_score(aq_index: Option<f64>) -> Result<Self, PsstError> {
        let Some(score) = aq_index else {
            return Ok(AqSeverity::Unknown);
        };
        if !score.is_finite() || score > 100.0 {
            return Err(PsstError::InvalidSeverityScore(score.to_string()));
        }
        let severity = if score < 25.0 {
            AqSeverity::VerySevere
        } else if score < 50.0 {
            AqSeverity::Severe
        } else if score < 75.0 {
            AqSeverity::Moderate
        } else {
            AqSeverity::Mild
        };
        Ok(severity)
    }
}

impl fmt::Display for AqSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AqSeverity::Unknown => "UNKNOWN",
            AqSeverity::VerySevere => "VERY_SEVERE",
            AqSeverity::Severe => "SEVERE",
            AqSeverity::Moderate => "MODERATE",
            AqSeverity::Mild => "MILD",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UtteranceCollection {
    utterances: Vec<Utterance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionGroup {
    pub metadata: SessionMetadata,
    pub utterances: UtteranceCollection,
}

impl UtteranceCollection {
    pub fn new(utterances: Vec<Utterance>) -> Self {
        Self { utterances }
    }

    /// Reads a tab-separated manifest with a header row. Every utterance is
    /// anchored to the manifest's directory.
    pub fn from_tsv(path: &Utf8Path) -> Result<Self, PsstError> {
        let tsv_error = |message: String| PsstError::Tsv {
            path: path.to_path_buf(),
            message,
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path.as_std_path())
            .map_err(|err| tsv_error(err.to_string()))?;
        let root_dir = path.parent().map(Utf8Path::to_path_buf);

        let mut utterances = Vec::new();
        for record in reader.deserialize::<Utterance>() {
            let mut utterance = record.map_err(|err| tsv_error(err.to_string()))?;
            utterance.root_dir = root_dir.clone();
            utterances.push(utterance);
        }
        Ok(Self { utterances })
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Utterance> {
        self.utterances.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Utterance> {
        self.utterances.get(index)
    }

    pub fn find(&self, utterance_id: &str) -> Option<&Utterance> {
        self.utterances
            .iter()
            .find(|utterance| utterance.utterance_id == utterance_id)
    }

    pub fn utterance_ids(&self) -> Vec<&str> {
        self.utterances
            .iter()
            .map(|utterance| utterance.utterance_id.as_str())
            .collect()
    }

    pub fn session_names(&self) -> BTreeSet<&str> {
        self.utterances
            .iter()
            .map(|utterance| utterance.session.as_str())
            .collect()
    }

    pub fn sessions(&self) -> Vec<SessionGroup> {
        let mut groups: BTreeMap<&str, SessionGroup> = BTreeMap::new();
        for utterance in &self.utterances {
            groups
                .entry(utterance.session.as_str())
                .or_insert_with(|| SessionGroup {
                    metadata: utterance.session_metadata(),
                    utterances: UtteranceCollection::default(),
                })
                .utterances
                .utterances
                .push(utterance.clone());
        }
        groups.into_values().collect()
    }
}

impl<'a> IntoIterator for &'a UtteranceCollection {
    type Item = &'a Utterance;
    type IntoIter = std::slice::Iter<'a, Utterance>;

    fn into_iter(self) -> Self::IntoIter {
        self.utterances.iter()
    }
}

impl FromIterator<Utterance> for UtteranceCollection {
    fn from_iter<I: IntoIterator<Item = Utterance>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = String::deserialize(deserializer)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected TRUE or FALSE, found `{other}`"
        ))),
    }
}

fn deserialize_optional_score<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    let value = String::deserialize(deserializer)?;
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|err| serde::de::Error::custom(format!("invalid AQ score `{trimmed}`: {err}")))
}
