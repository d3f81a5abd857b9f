use std::fs;
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, warn};

use crate::domain::Split;
use crate::downloader::{ProgressEvent, ProgressSink, report_progress};
use crate::error::PsstError;

pub const STAGING_DIR_NAME: &str = "incomplete";

const STRAY_METADATA_FILES: &[&str] = &[".DS_Store"];

pub trait ArchiveFetcher {
    fn fetch_split(
        &self,
        dataset_dir: &Utf8Path,
        split: Split,
        remote_path: &str,
        sink: &dyn ProgressSink,
    ) -> Result<(), PsstError>;
}

pub fn ensure_split_absent(dataset_dir: &Utf8Path, split: Split) -> Result<Utf8PathBuf, PsstError> {
    let target = dataset_dir.join(split.as_str());
    if target.as_std_path().exists() {
        return Err(PsstError::AlreadyExists(target));
    }
    Ok(target)
}

pub fn install_split_archive<R: Read>(
    reader: R,
    content_length: Option<u64>,
    dataset_dir: &Utf8Path,
    split: Split,
    sink: &dyn ProgressSink,
) -> Result<(), PsstError> {
    let target = ensure_split_absent(dataset_dir, split)?;
    let staging = dataset_dir.join(STAGING_DIR_NAME);
    let staged_split = staging.join(split.as_str());

    if staged_split.as_std_path().exists() {
        debug!("removing leftovers of an interrupted download in {staged_split}");
        fs::remove_dir_all(staged_split.as_std_path())
            .map_err(|err| PsstError::Filesystem(err.to_string()))?;
    }
    fs::create_dir_all(staging.as_std_path())
        .map_err(|err| PsstError::Filesystem(err.to_string()))?;

    if let Err(err) = extract_entries(reader, content_length, &staging, split, sink) {
        discard_staging(&staging);
        return Err(err);
    }
    if !staged_split.as_std_path().is_dir() {
        discard_staging(&staging);
        return Err(PsstError::ArchiveLayout { split });
    }
    fs::rename(staged_split.as_std_path(), target.as_std_path())
        .map_err(|err| PsstError::Filesystem(err.to_string()))?;
    remove_staging(&staging);
    Ok(())
}

fn extract_entries<R: Read>(
    reader: R,
    content_length: Option<u64>,
    staging: &Utf8Path,
    split: Split,
    sink: &dyn ProgressSink,
) -> Result<(), PsstError> {
    let start = Instant::now();
    let bytes_read = Arc::new(AtomicU64::new(0));
    let counting = CountingReader {
        inner: reader,
        count: Arc::clone(&bytes_read),
    };
    let mut archive = Archive::new(GzDecoder::new(counting));
    let entries = archive.entries().map_err(archive_error)?;
    for entry in entries {
        let mut entry = entry.map_err(archive_error)?;
        let unpacked = entry
            .unpack_in(staging.as_std_path())
            .map_err(archive_error)?;
        if !unpacked {
            let name = entry
                .path()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            warn!("skipped archive entry outside the staging directory: {name}");
        }

        if let Some(percent) = percent_remaining(bytes_read.load(Ordering::Relaxed), content_length) {
            report_progress(
                sink,
                ProgressEvent {
                    message: format!("download {split}: {percent}% remaining"),
                    percent_remaining: Some(percent),
                    elapsed: Some(start.elapsed()),
                },
            );
        }
    }
    Ok(())
}

fn remove_staging(staging: &Utf8Path) {
    for name in STRAY_METADATA_FILES {
        let _ = fs::remove_file(staging.join(name).as_std_path());
    }
    if let Err(err) = fs::remove_dir(staging.as_std_path()) {
        warn!("could not remove staging directory {staging}: {err}");
    }
}

fn discard_staging(staging: &Utf8Path) {
    if let Err(err) = fs::remove_dir_all(staging.as_std_path()) {
        warn!("could not clean up staging directory {staging}: {err}");
    }
}

fn percent_remaining(read: u64, total: Option<u64>) -> Option<u8> {
    let total = total.filter(|total| *total > 0)?;
    let remaining = total.saturating_sub(read);
    Some((remaining.saturating_mul(100) / total).min(100) as u8)
}

fn archive_error(err: io::Error) -> PsstError {
    PsstError::Filesystem(format!("archive extraction failed: {err}"))
}

struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.count.fetch_add(read as u64, Ordering::Relaxed);
        Ok(read)
    }
}
