mod common;

use std::fs;

use assert_matches::assert_matches;

use psst_data::analysis::DataAnalysis;
use psst_data::domain::{Split, Task};
use psst_data::error::PsstError;
use psst_data::loading::{load_version, manifest_paths};
use psst_data::records::{AqSeverity, UtteranceCollection};
use psst_data::versioning::Version;

use common::{all_files, files_without_test, install_local, utf8_tempdir, write_split};

#[test]
fn released_test_split_is_loaded() {
    let (_temp, root) = utf8_tempdir();
    let version = Version::new("v1", all_files());
    install_local(&root, &[version.clone()], "local");

    let data = load_version(version.apply_dir(&root), Task::PhonemeRecognition).unwrap();

    assert!(!data.test_is_placeholder);
    assert_eq!(data.train.len(), 2);
    assert_eq!(data.valid.len(), 1);
    assert_eq!(data.test.utterance_ids(), vec!["KEMPLER03a-BNT01-house"]);
    assert_eq!(data.test.get(0).unwrap().aq_index, None);
}

#[test]
fn unreleased_test_split_is_replaced_by_valid() {
    let (_temp, root) = utf8_tempdir();
    let version = Version::new("v1", files_without_test()).apply_dir(&root);
    install_local(&root, &[version.clone()], "local");

    let (paths, placeholder) = manifest_paths(&version, Task::Correctness).unwrap();
    assert!(placeholder);
    assert_eq!(paths[&Split::Test], paths[&Split::Valid]);
    assert!(paths[&Split::Test].ends_with("valid/correctness_valid.tsv"));

    let data = load_version(version, Task::Correctness).unwrap();
    assert!(data.test_is_placeholder);
    assert_eq!(data.test, data.valid);
}

#[test]
fn unreleased_valid_split_is_unavailable() {
    let (_temp, root) = utf8_tempdir();
    let mut files = files_without_test();
    files.valid = None;
    let version = Version::new("v1", files).apply_dir(&root);

    assert_matches!(
        manifest_paths(&version, Task::PhonemeRecognition),
        Err(PsstError::DataUnavailable(Split::Valid))
    );
}

#[test]
fn sessions_shared_between_splits_are_rejected() {
    let (_temp, root) = utf8_tempdir();
    let version = Version::new("v1", all_files()).apply_dir(&root);
    let dataset_dir = version.local_dir().unwrap();
    write_split(&dataset_dir, Split::Train, &[("S1", "40"), ("S2", "60")]);
    write_split(&dataset_dir, Split::Valid, &[("S3", "50")]);
    write_split(&dataset_dir, Split::Test, &[("S2", "60")]);

    let err = load_version(version, Task::PhonemeRecognition).unwrap_err();
    assert_matches!(
        err,
        PsstError::OverlappingSessions {
            first: Split::Train,
            second: Split::Test
        }
    );
}

#[test]
fn manifest_columns_are_matched_by_name() {
    let (_temp, dir) = utf8_tempdir();
    let path = dir.join("utterances_train.tsv");
    fs::write(
        path.as_std_path(),
        "session\tutterance_id\ttest\tprompt\ttranscript\tcorrectness\taq_index\tduration_frames\tfilename\tnotes\n\
         ACWT02a\tACWT02a-BNT01-house\tBNT\thouse\tHH AW S\tFALSE\tNA\t8000\taudio/a.wav\tretake\n\
         ACWT02a\tACWT02a-VNT02-<sil>\tVNT\t<sil>\t<sil>\t1\t\t4000\taudio/b.wav\t\n",
    )
    .unwrap();

    let utterances = UtteranceCollection::from_tsv(&path).unwrap();

    assert_eq!(utterances.len(), 2);
    let first = utterances.find("ACWT02a-BNT01-house").unwrap();
    assert!(!first.correctness);
    assert_eq!(first.aq_index, None);
    assert_eq!(first.filename_absolute().unwrap(), dir.join("audio/a.wav"));
    assert!(utterances.get(1).unwrap().correctness);
    assert_eq!(utterances.sessions().len(), 1);
}

#[test]
fn malformed_rows_name_the_manifest() {
    let (_temp, dir) = utf8_tempdir();
    let path = dir.join("broken.tsv");
    fs::write(
        path.as_std_path(),
        format!("{}x\tS1\tBNT\thouse\tHH\tmaybe\t50\t10\ta.wav\n", common::TSV_HEADER),
    )
    .unwrap();

    let err = UtteranceCollection::from_tsv(&path).unwrap_err();
    assert_matches!(err, PsstError::Tsv { path: ref reported, .. } if *reported == path);
}

#[test]
fn analysis_groups_by_severity() {
    let (_temp, root) = utf8_tempdir();
    let version = Version::new("v1", all_files());
    install_local(&root, &[version.clone()], "local");
    let data = load_version(version.apply_dir(&root), Task::PhonemeRecognition).unwrap();

    let train = DataAnalysis::compute(&data.train).unwrap();
    assert_eq!(train.n_sessions, 2);
    assert_eq!(train.n_sessions_by_severity[&AqSeverity::Severe], 1);
    assert_eq!(train.n_sessions_by_severity[&AqSeverity::Mild], 1);
    assert_eq!(train.n_utterances, 2);
    assert_eq!(train.total_duration_seconds, 2.0);
    assert_eq!(train.session_share_by_severity[&AqSeverity::Severe].value, 1);
    assert_eq!(train.session_share_by_severity[&AqSeverity::Severe].proportion, 0.5);
    assert_eq!(train.duration_share_by_severity[&AqSeverity::Mild].value, 1.0);
    assert_eq!(train.duration_share_by_severity[&AqSeverity::Mild].proportion, 0.5);
    assert!(!train.duration_share_by_severity.contains_key(&AqSeverity::Moderate));
    assert_eq!(train.total_duration_seconds_by_severity[&AqSeverity::Moderate], 0.0);

    let test = DataAnalysis::compute(&data.test).unwrap();
    assert_eq!(test.n_sessions_by_severity[&AqSeverity::Unknown], 1);
    assert_eq!(test.total_duration_seconds_by_severity[&AqSeverity::Unknown], 1.0);
}
