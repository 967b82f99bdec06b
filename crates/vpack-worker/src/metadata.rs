//! Metadata service client.
//!
//! After publishing, the worker records the derived asset against the
//! original upload so the rest of the system can find the playable output.
//! The client is optional; without METADATA_URL the record step is skipped.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{WorkerError, WorkerResult};

/// A derived-asset record sent to the metadata service.
#[derive(Debug, Clone, Serialize)]
pub struct AssetRecord {
    /// Original filename as uploaded
    pub original_filename: String,
    /// Owning user, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Key of the primary playable artifact (manifest, or prefix when
    /// no manifest was produced)
    pub asset_key: String,
    /// Key of the poster frame
    pub thumbnail_key: String,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    id: String,
}

/// HTTP client for the metadata service.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl MetadataClient {
    /// Create from environment variables. METADATA_URL is optional.
    pub fn from_env() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: std::env::var("METADATA_URL")
                .ok()
                .map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    /// A client that records nothing.
    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: None,
        }
    }

    /// Record a derived asset. Returns the record ID, or `None` when the
    /// client is disabled.
    pub async fn record_derived_asset(&self, record: &AssetRecord) -> WorkerResult<Option<String>> {
        let Some(base) = &self.base_url else {
            debug!("metadata client disabled, skipping asset record");
            return Ok(None);
        };

        let response = self
            .http
            .post(format!("{}/assets", base))
            .json(record)
            .send()
            .await
            .map_err(|e| WorkerError::metadata_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::metadata_failed(format!(
                "metadata service returned {}: {}",
                status, body
            )));
        }

        let created: RecordResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::metadata_failed(e.to_string()))?;

        info!(asset_key = %record.asset_key, record_id = %created.id, "recorded derived asset");
        Ok(Some(created.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_client_records_nothing() {
        let client = MetadataClient::disabled();
        let record = AssetRecord {
            original_filename: "talk.mp4".to_string(),
            owner_id: None,
            asset_key: "packaged/talk/manifest.mpd".to_string(),
            thumbnail_key: "packaged/talk/thumbnail.jpg".to_string(),
        };
        let id = client
            .record_derived_asset(&record)
            .await
            .expect("disabled client never fails");
        assert!(id.is_none());
    }

    #[test]
    fn record_omits_empty_owner() {
        let record = AssetRecord {
            original_filename: "talk.mp4".to_string(),
            owner_id: None,
            asset_key: "packaged/talk/manifest.mpd".to_string(),
            thumbnail_key: "packaged/talk/thumbnail.jpg".to_string(),
        };
        let json = serde_json::to_string(&record).expect("serialize record");
        assert!(!json.contains("owner_id"));
    }
}
