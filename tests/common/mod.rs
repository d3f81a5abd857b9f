#![allow(dead_code)]

use std::fs;
use std::io;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use psst_data::domain::{Split, Task};
use psst_data::versioning::{SplitFiles, Version, VersionLedger};

pub const TSV_HEADER: &str =
    "utterance_id\tsession\ttest\tprompt\ttranscript\tcorrectness\taq_index\tduration_frames\tfilename\n";

pub fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

pub fn all_files() -> SplitFiles {
    SplitFiles {
        train: Some("psst-train.tar.gz".to_string()),
        valid: Some("psst-valid.tar.gz".to_string()),
        test: Some("psst-test.tar.gz".to_string()),
    }
}

pub fn files_without_test() -> SplitFiles {
    SplitFiles {
        test: None,
        ..all_files()
    }
}

/// One utterance row per session, with the given AQ score.
pub fn tsv_content(sessions: &[(&str, &str)]) -> String {
    let mut content = TSV_HEADER.to_string();
    for (index, (session, aq)) in sessions.iter().enumerate() {
        content.push_str(&format!(
            "{session}-BNT{:02}-house\t{session}\tBNT\thouse\tHH AW S\tTRUE\t{aq}\t16000\taudio/{session}-{index}.wav\n",
            index + 1
        ));
    }
    content
}

/// Writes both task manifests of `split` under `dataset_dir`.
pub fn write_split(dataset_dir: &Utf8Path, split: Split, sessions: &[(&str, &str)]) {
    let split_dir = dataset_dir.join(split.as_str());
    fs::create_dir_all(split_dir.as_std_path()).unwrap();
    for task in Task::ALL {
        fs::write(
            split_dir.join(task.manifest_name(split)).as_std_path(),
            tsv_content(sessions),
        )
        .unwrap();
    }
}

pub fn default_sessions(split: Split) -> Vec<(&'static str, &'static str)> {
    match split {
        Split::Train => vec![("ACWT01a", "42.5"), ("ACWT02a", "88.1")],
        Split::Valid => vec![("BU01a", "12.0")],
        Split::Test => vec![("KEMPLER03a", "")],
    }
}

/// Creates every released split of `version` on disk and records it in the
/// ledger at `root`.
pub fn install_local(root: &Utf8Path, versions: &[Version], comment: &str) {
    for version in versions {
        let bound = version.apply_dir(root);
        let dataset_dir = bound.local_dir().unwrap();
        for (split, file) in version.files.iter() {
            if file.is_some() {
                write_split(&dataset_dir, split, &default_sessions(split));
            }
        }
    }
    VersionLedger::new(comment, versions.to_vec())
        .save(root)
        .unwrap();
}

pub fn manifest_json(comment: &str, versions: &[Version]) -> String {
    serde_json::to_string(&VersionLedger::new(comment, versions.to_vec())).unwrap()
}

pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A split archive as published: a top-level `<split>/` directory holding
/// both task manifests.
pub fn split_archive(split: Split) -> Vec<u8> {
    let content = tsv_content(&default_sessions(split));
    let names = Task::ALL.map(|task| format!("{split}/{}", task.manifest_name(split)));
    let entries = names
        .iter()
        .map(|name| (name.as_str(), content.as_bytes()))
        .collect::<Vec<_>>();
    tar_gz(&entries)
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber that records formatted log lines.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (result, logs)
}
