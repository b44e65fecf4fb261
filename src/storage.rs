use axum::body::Bytes;
use chrono::Utc;
use regex::Regex;
use std::time::Duration;

use crate::config::SupabaseStorageConfig;
use crate::errors::AppError;

/// Bucket holding every contractor upload.
pub const DOCUMENT_BUCKET: &str = "contractor-docs";
/// Folders an upload may target.
pub const DOCUMENT_FOLDERS: [&str; 4] = ["w9", "coi", "agreements", "submissions"];

/// Object storage client for contractor documents (W-9, COI, signed agreements).
#[derive(Clone)]
pub struct DocumentStorage {
    client: reqwest::Client,
    base_url: String,
    service_role_key: String,
    unsafe_chars: Regex,
}

impl DocumentStorage {
    pub fn new(config: &SupabaseStorageConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create storage client: {}", e))
            })?;
        let unsafe_chars = Regex::new(r"[^a-zA-Z0-9._-]")
            .map_err(|e| AppError::InternalError(format!("Invalid filename pattern: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.clone(),
            unsafe_chars,
        })
    }

    /// Replaces anything outside `[a-zA-Z0-9._-]` with `_`.
    pub fn sanitize_filename(&self, name: &str) -> String {
        self.unsafe_chars.replace_all(name.trim(), "_").into_owned()
    }

    /// Object path for an upload: `{folder}/{unix_millis}-{sanitized}`.
    pub fn object_path(&self, folder: &str, filename: &str) -> Result<String, AppError> {
        if !DOCUMENT_FOLDERS.contains(&folder) {
            return Err(AppError::BadRequest(format!(
                "Unsupported folder '{}': expected one of {}",
                folder,
                DOCUMENT_FOLDERS.join(", ")
            )));
        }
        let sanitized = self.sanitize_filename(filename);
        if sanitized.is_empty() {
            return Err(AppError::BadRequest("Missing filename".to_string()));
        }
        Ok(format!(
            "{}/{}-{}",
            folder,
            Utc::now().timestamp_millis(),
            sanitized
        ))
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, DOCUMENT_BUCKET, path
        )
    }

    /// Stores the bytes and returns their public URL. Never overwrites.
    pub async fn upload(
        &self,
        folder: &str,
        filename: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<String, AppError> {
        if body.is_empty() {
            return Err(AppError::BadRequest("Empty upload".to_string()));
        }

        let path = self.object_path(folder, filename)?;
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, DOCUMENT_BUCKET, path);
        tracing::info!("Uploading {} bytes to {}", body.len(), path);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("apikey", &self.service_role_key)
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .header("cache-control", "3600")
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Storage request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Storage upload failed {}: {}",
                status, error_text
            )));
        }

        Ok(self.public_url(&path))
    }
}
