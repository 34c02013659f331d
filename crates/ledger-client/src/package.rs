//! Package management calls.

use crate::{Ledger, LedgerError, LedgerResult};
use tracing::{debug, info};

impl Ledger {
    /// Ids of all packages known to the participant.
    pub async fn list_packages(&self) -> LedgerResult<Vec<String>> {
        let result = self.http.get_json("v1/packages").await?;
        serde_json::from_value(result)
            .map_err(|e| LedgerError::UnexpectedResponse(format!("malformed package list: {}", e)))
    }

    /// The binary content of a package.
    ///
    /// The id is sent as one encoded path segment, so `?`, `#` and `/` stay
    /// part of the id.
    pub async fn get_package(&self, package_id: &str) -> LedgerResult<Vec<u8>> {
        if matches!(package_id, "" | "." | "..") {
            return Err(LedgerError::InvalidRequest(format!(
                "invalid package id {:?}",
                package_id
            )));
        }
        debug!(package_id, "get package");
        Ok(self.http.get_bytes("v1/packages", package_id).await?)
    }

    /// Upload a DAR archive.
    pub async fn upload_dar_file(&self, dar: Vec<u8>) -> LedgerResult<()> {
        info!(len = dar.len(), "Uploading DAR");
        self.http.post_bytes("v1/packages", dar).await?;
        Ok(())
    }
}
