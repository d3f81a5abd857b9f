use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::domain::ARTIFICIAL_VERSION_ID;
use crate::error::PsstError;
use crate::fetch::ArchiveFetcher;
use crate::versioning::{Version, VersionLedger};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub percent_remaining: Option<u8>,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            percent_remaining: None,
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub fn report_progress(sink: &dyn ProgressSink, event: ProgressEvent) {
    if panic::catch_unwind(AssertUnwindSafe(|| sink.event(event))).is_err() {
        debug!("progress sink failed; continuing without it");
    }
}

pub trait VersionSource {
    fn fetch_manifest(&self) -> Result<String, PsstError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatestReuse {
    #[default]
    WhenIdentical,
    WhenPresent,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolvePolicy {
    pub latest_reuse: LatestReuse,
    /// Fall back to the local cache when the manifest request gets an HTTP
    /// error status, not only when the server is unreachable.
    pub fallback_on_http_status: bool,
}

pub struct Downloader<R> {
    remote: R,
    policy: ResolvePolicy,
}

impl<R: VersionSource + ArchiveFetcher> Downloader<R> {
    pub fn new(remote: R) -> Self {
        Self::with_policy(remote, ResolvePolicy::default())
    }

    pub fn with_policy(remote: R, policy: ResolvePolicy) -> Self {
        Self { remote, policy }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn policy(&self) -> ResolvePolicy {
        self.policy
    }

    /// Makes `version_id` (or the latest version when `None`) available
    /// under `cache_root` and returns its validated local descriptor.
    pub fn resolve(
        &self,
        cache_root: &Utf8Path,
        version_id: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<Version, PsstError> {
        let local = VersionLedger::load_local(cache_root);
        if let Some(id) = version_id {
            if let Some(version) = local.get(id) {
                if version.has_test_split() {
                    debug!("version {id} is complete in {cache_root}");
                    return Ok(version.clone());
                }
            }
        }

        report_progress(sink, ProgressEvent::message("phase=Resolve; fetching version manifest"));
        let remote = match self.fetch_remote(cache_root) {
            Ok(remote) => remote,
            Err(err) if self.should_fall_back(&err) => {
                return self.fall_back(&local, cache_root, version_id, err);
            }
            Err(err) => return Err(err),
        };

        let target = match version_id {
            Some(id) => remote.lookup(id)?,
            None => remote.latest()?,
        }
        .clone();

        if version_id.is_none() {
            if let Some(cached) = local.get(&target.version_id) {
                if self.reuses(cached, &target) {
                    debug!("latest version {} is already cached", target.version_id);
                    return Ok(cached.clone());
                }
            }
        }

        // Saved before any archive; an interrupted download keeps its entry.
        if version_id != Some(ARTIFICIAL_VERSION_ID) {
            remote.save(cache_root)?;
        }

        info!("Downloading a new data version: {}", target.version_id);
        let local_dir = target.local_dir()?;
        for (split, path) in target.files.iter() {
            let Some(path) = path else {
                continue;
            };
            report_progress(
                sink,
                ProgressEvent::message(format!("phase=Fetch; split {split}")),
            );
            match self.remote.fetch_split(&local_dir, split, path, sink) {
                Ok(()) => info!("Downloaded `{split}` to {local_dir}."),
                Err(PsstError::AlreadyExists(_)) => {
                    info!("Already `{split}` data in directory: {local_dir}, skipping.")
                }
                Err(err) => {
                    return Err(PsstError::SplitDownload {
                        version_id: target.version_id.clone(),
                        split,
                        source: Box::new(err),
                    });
                }
            }
        }

        let refreshed = VersionLedger::load_local(cache_root);
        refreshed.lookup(&target.version_id).cloned()
    }

    fn fetch_remote(&self, cache_root: &Utf8Path) -> Result<VersionLedger, PsstError> {
        let manifest = self.remote.fetch_manifest()?;
        VersionLedger::from_json(&manifest, cache_root)
    }

    fn should_fall_back(&self, err: &PsstError) -> bool {
        err.is_connectivity() || (self.policy.fallback_on_http_status && err.is_http_status())
    }

    fn reuses(&self, cached: &Version, remote: &Version) -> bool {
        match self.policy.latest_reuse {
            LatestReuse::WhenIdentical => cached == remote,
            LatestReuse::WhenPresent => true,
        }
    }

    fn fall_back(
        &self,
        local: &VersionLedger,
        cache_root: &Utf8Path,
        version_id: Option<&str>,
        err: PsstError,
    ) -> Result<Version, PsstError> {
        if let Some(version) = version_id.and_then(|id| local.get(id)) {
            warn!(
                "Unable to connect to the data server. Using local version {}",
                version.version_id
            );
            return Ok(version.clone());
        }
        if version_id.is_some() || local.is_empty() {
            return Err(PsstError::Unavailable {
                cache_root: absolute(cache_root),
                source: Box::new(err),
            });
        }
        let latest = local.latest()?;
        warn!(
            "Unable to connect to the data server. Using latest local version {}",
            latest.version_id
        );
        Ok(latest.clone())
    }
}

fn absolute(path: &Utf8Path) -> Utf8PathBuf {
    std::path::absolute(path.as_std_path())
        .ok()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(|| path.to_path_buf())
}
