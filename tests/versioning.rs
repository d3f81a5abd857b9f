mod common;

use std::fs;

use assert_matches::assert_matches;

use psst_data::domain::Split;
use psst_data::error::PsstError;
use psst_data::versioning::{SplitFiles, Version, VersionLedger};

use common::{all_files, files_without_test, install_local, utf8_tempdir, write_split};

#[test]
fn missing_ledger_is_empty() {
    let (_temp, root) = utf8_tempdir();
    let ledger = VersionLedger::load_local(&root);
    assert!(ledger.is_empty());
    assert_matches!(ledger.latest(), Err(PsstError::EmptyLedger));
}

#[test]
fn malformed_ledger_is_empty() {
    let (_temp, root) = utf8_tempdir();
    fs::write(VersionLedger::path(&root).as_std_path(), "{ not json").unwrap();
    assert!(VersionLedger::load_local(&root).is_empty());
}

#[test]
fn version_with_missing_train_file_is_excluded() {
    let (_temp, root) = utf8_tempdir();
    let version = Version::new(
        "v1",
        SplitFiles {
            train: Some("train/x_train.tsv".to_string()),
            valid: Some("valid/x_valid.tsv".to_string()),
            test: Some("test/x_test.tsv".to_string()),
        },
    );
    let dataset_dir = version.apply_dir(&root).local_dir().unwrap();
    write_split(&dataset_dir, Split::Valid, &[("S1", "50")]);
    write_split(&dataset_dir, Split::Test, &[("S2", "50")]);
    VersionLedger::new("c", vec![version]).save(&root).unwrap();

    let ledger = VersionLedger::load_local(&root);
    assert!(!ledger.contains("v1"));
    assert!(ledger.is_empty());
}

#[test]
fn only_complete_versions_survive() {
    let (_temp, root) = utf8_tempdir();
    install_local(
        &root,
        &[Version::new("v2", all_files()), Version::new("v1", files_without_test())],
        "local",
    );
    // v2 loses one of its manifests.
    let v2 = Version::new("v2", all_files()).apply_dir(&root);
    fs::remove_file(
        v2.split_dir(Split::Test)
            .unwrap()
            .join("correctness_test.tsv")
            .as_std_path(),
    )
    .unwrap();

    let ledger = VersionLedger::load_local(&root);
    assert_eq!(ledger.version_ids(), vec!["v1"]);
    assert_eq!(ledger.comment, "local");
    let v1 = ledger.lookup("v1").unwrap();
    assert_eq!(v1.root_dir.as_deref(), Some(root.as_path()));
    assert!(!v1.has_test_split());
}

#[test]
fn saved_ledger_omits_root_dir() {
    let (_temp, root) = utf8_tempdir();
    let nested = root.join("not").join("yet");
    let ledger = VersionLedger::new("c", vec![Version::new("v1", all_files())]).apply_dir(&nested);
    ledger.save(&nested).unwrap();

    let raw = fs::read_to_string(VersionLedger::path(&nested).as_std_path()).unwrap();
    assert!(!raw.contains("root_dir"));
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["versions"][0]["files"]["test"], "psst-test.tar.gz");
}

#[test]
fn round_trip_preserves_entries() {
    for versions in [
        Vec::new(),
        vec![
            Version {
                comment: "second release".to_string(),
                ..Version::new("2022-03-02", all_files())
            },
            Version::new("2022-01-15", files_without_test()),
        ],
    ] {
        let (_temp, root) = utf8_tempdir();
        let written = VersionLedger::new("Most recent first", versions);
        written.save(&root).unwrap();

        let raw = fs::read_to_string(VersionLedger::path(&root).as_std_path()).unwrap();
        let read = VersionLedger::from_json(&raw, &root).unwrap();
        assert_eq!(read.comment, written.comment);
        assert_eq!(read.len(), written.len());
        for (read, written) in read.iter().zip(written.iter()) {
            assert_eq!(read.version_id, written.version_id);
            assert_eq!(read.files, written.files);
            assert_eq!(read.comment, written.comment);
        }
        assert_eq!(read, written.apply_dir(&root));
    }
}

#[test]
fn one_bad_entry_does_not_hide_the_rest() {
    let (_temp, root) = utf8_tempdir();
    install_local(
        &root,
        &[
            Version::new("2022-04-01+fix", all_files()),
            Version::new("v1", all_files()),
        ],
        "local",
    );
    let path = VersionLedger::path(&root);
    let mut raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path.as_std_path()).unwrap()).unwrap();
    raw["versions"]
        .as_array_mut()
        .unwrap()
        .insert(0, serde_json::json!({"version_id": "../outside", "files": {}}));
    fs::write(path.as_std_path(), raw.to_string()).unwrap();

    let ledger = VersionLedger::load_local(&root);
    assert_eq!(ledger.version_ids(), vec!["2022-04-01+fix", "v1"]);
    assert_eq!(ledger.latest().unwrap().version_id, "2022-04-01+fix");
}
