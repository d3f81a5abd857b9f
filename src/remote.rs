use camino::Utf8Path;
use tracing::info;

use crate::domain::Split;
use crate::downloader::{ProgressSink, VersionSource};
use crate::error::PsstError;
use crate::fetch::{ArchiveFetcher, ensure_split_absent, install_split_archive};
use crate::networking::{CredentialPrompt, Method, Session, Transport};
use crate::versioning::LEDGER_FILE_NAME;

pub struct DataServer<T: Transport, P: CredentialPrompt> {
    session: Session<T, P>,
}

impl<T: Transport, P: CredentialPrompt> DataServer<T, P> {
    pub fn new(session: Session<T, P>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session<T, P> {
        &self.session
    }

    fn url(&self, path: &str) -> Result<String, PsstError> {
        Ok(self.session.settings().load()?.url(path))
    }
}

impl<T: Transport, P: CredentialPrompt> VersionSource for DataServer<T, P> {
    fn fetch_manifest(&self) -> Result<String, PsstError> {
        let url = self.url(LEDGER_FILE_NAME)?;
        let response = self.session.request(Method::Get, &url)?;
        response
            .text()
            .map_err(|err| PsstError::Connectivity {
                url,
                message: err.to_string(),
            })
    }
}

impl<T: Transport, P: CredentialPrompt> ArchiveFetcher for DataServer<T, P> {
    fn fetch_split(
        &self,
        dataset_dir: &Utf8Path,
        split: Split,
        remote_path: &str,
        sink: &dyn ProgressSink,
    ) -> Result<(), PsstError> {
        ensure_split_absent(dataset_dir, split)?;
        let url = self.url(remote_path)?;
        info!("fetching {url}");
        let response = self.session.request(Method::Get, &url)?;
        let content_length = response.content_length();
        install_split_archive(response, content_length, dataset_dir, split, sink)
    }
}
