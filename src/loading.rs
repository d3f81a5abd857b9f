use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::domain::{Split, Task};
use crate::downloader::{Downloader, ProgressSink, VersionSource};
use crate::error::PsstError;
use crate::fetch::ArchiveFetcher;
use crate::records::UtteranceCollection;
use crate::versioning::Version;

#[derive(Debug, Clone)]
pub struct PsstData {
    pub train: UtteranceCollection,
    pub valid: UtteranceCollection,
    pub test: UtteranceCollection,
    pub version: Version,
    pub test_is_placeholder: bool,
}

impl PsstData {
    pub fn new(
        train: UtteranceCollection,
        valid: UtteranceCollection,
        test: UtteranceCollection,
        version: Version,
        test_is_placeholder: bool,
    ) -> Result<Self, PsstError> {
        ensure_disjoint(&train, Split::Train, &test, Split::Test)?;
        ensure_disjoint(&train, Split::Train, &valid, Split::Valid)?;
        if !test_is_placeholder {
            ensure_disjoint(&valid, Split::Valid, &test, Split::Test)?;
        }
        Ok(Self {
            train,
            valid,
            test,
            version,
            test_is_placeholder,
        })
    }

    pub fn split(&self, split: Split) -> &UtteranceCollection {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
            Split::Test => &self.test,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Split, &UtteranceCollection)> {
        Split::ALL.into_iter().map(|split| (split, self.split(split)))
    }
}

fn ensure_disjoint(
    first: &UtteranceCollection,
    first_split: Split,
    second: &UtteranceCollection,
    second_split: Split,
) -> Result<(), PsstError> {
    let first_sessions = first.session_names();
    if second
        .session_names()
        .iter()
        .any(|session| first_sessions.contains(session))
    {
        return Err(PsstError::OverlappingSessions {
            first: first_split,
            second: second_split,
        });
    }
    Ok(())
}

pub fn manifest_paths(
    version: &Version,
    task: Task,
) -> Result<(BTreeMap<Split, Utf8PathBuf>, bool), PsstError> {
    let mut files = version.task_files(task)?;
    let mut placeholder = false;
    if files.get(&Split::Test).cloned().flatten().is_none() {
        warn!(
            "The PSST `train` and `valid` sets were downloaded, but `test` is not yet released. \
             Using a copy of the `valid` data as a placeholder."
        );
        let valid = files.get(&Split::Valid).cloned().flatten();
        files.insert(Split::Test, valid);
        placeholder = true;
    }

    let mut paths = BTreeMap::new();
    for (split, path) in files {
        let path = path.ok_or(PsstError::DataUnavailable(split))?;
        paths.insert(split, path);
    }
    Ok((paths, placeholder))
}

pub fn load_version(version: Version, task: Task) -> Result<PsstData, PsstError> {
    let (paths, placeholder) = manifest_paths(&version, task)?;
    let read = |split: Split| -> Result<UtteranceCollection, PsstError> {
        let path = paths
            .get(&split)
            .ok_or(PsstError::DataUnavailable(split))?;
        UtteranceCollection::from_tsv(path)
    };
    let train = read(Split::Train)?;
    let valid = read(Split::Valid)?;
    let test = read(Split::Test)?;
    PsstData::new(train, valid, test, version, placeholder)
}

pub fn load<R: VersionSource + ArchiveFetcher>(
    downloader: &Downloader<R>,
    task: Task,
    local_dir: &Utf8Path,
    version_id: Option<&str>,
    sink: &dyn ProgressSink,
) -> Result<PsstData, PsstError> {
    let version = downloader.resolve(local_dir, version_id, sink)?;
    info!(
        "Loaded data `{task}` version {} from {local_dir}",
        version.version_id
    );
    load_version(version, task)
}
