//! Drive REST client for photo assets.
//!
//! Folder lookup uses the files list endpoint with a `q=` filter; uploads go
//! through the multipart endpoint with a JSON metadata part; public access
//! is granted by creating an anyone/reader permission. Freshly-granted
//! permissions propagate lazily, which is why the display path retries 403s.

use crate::auth::TokenProvider;
use crate::core::{QcError, Result};
use crate::store::firestore::{classify_status, classify_transport};
use crate::store::{PhotoStore, StoredPhoto};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart&fields=id,webViewLink";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

pub struct DriveStore {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl DriveStore {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
        }
    }

    async fn bearer(&self) -> Result<String> {
        Ok(self.tokens.ensure_valid().await?.value)
    }

    async fn check(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| QcError::Serialization(format!("Failed to decode response: {}", e)));
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

/// Direct-content URL for a stored file id.
pub fn content_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?export=view&id={file_id}")
}

/// Alternate content host for the same file id; the display-retry path tries
/// this form when the primary URL fails to load.
pub fn alternate_content_url(file_id: &str) -> String {
    format!("https://lh3.googleusercontent.com/d/{file_id}")
}

/// The store's own viewer UI. Escape hatch shown after retries are exhausted.
pub fn viewer_url(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{file_id}/view")
}

/// Extracts the file id from any of the URL forms above, if present.
pub fn file_id_from_url(url: &str) -> Option<String> {
    if let Some(rest) = url.split("id=").nth(1) {
        let id: String = rest.chars().take_while(|c| *c != '&').collect();
        if !id.is_empty() {
            return Some(id);
        }
    }
    for marker in ["/d/", "/file/d/"] {
        if let Some(rest) = url.split(marker).nth(1) {
            let id: String = rest.chars().take_while(|c| *c != '/' && *c != '?').collect();
            if !id.is_empty() {
                return Some(id);
            }
        }
    }
    None
}

fn escape_query_literal(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

#[async_trait]
impl PhotoStore for DriveStore {
    async fn find_folder(&self, name: &str, parent: Option<&str>) -> Result<Option<String>> {
        let token = self.bearer().await?;
        let mut q = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query_literal(name),
            FOLDER_MIME
        );
        if let Some(parent) = parent {
            q.push_str(&format!(" and '{}' in parents", escape_query_literal(parent)));
        }
        let response = self
            .http
            .get(FILES_URL)
            .query(&[("q", q.as_str()), ("fields", "files(id,name)"), ("pageSize", "1")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_transport)?;
        let body = self.check(response).await?;
        let id = body
            .get("files")
            .and_then(Value::as_array)
            .and_then(|files| files.first())
            .and_then(|f| f.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(id)
    }

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<String> {
        let token = self.bearer().await?;
        let mut metadata = json!({"name": name, "mimeType": FOLDER_MIME});
        if let Some(parent) = parent {
            metadata["parents"] = json!([parent]);
        }
        let response = self
            .http
            .post(FILES_URL)
            .query(&[("fields", "id")])
            .bearer_auth(token)
            .json(&metadata)
            .send()
            .await
            .map_err(classify_transport)?;
        let body = self.check(response).await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| QcError::Serialization("folder create response missing id".into()))
    }

    async fn upload_multipart(
        &self,
        name: &str,
        mime: &str,
        bytes: Vec<u8>,
        parent: &str,
    ) -> Result<StoredPhoto> {
        let token = self.bearer().await?;
        let metadata = json!({"name": name, "parents": [parent]});
        let metadata_part = reqwest::multipart::Part::text(metadata.to_string())
            .mime_str("application/json")
            .map_err(|e| QcError::Validation(format!("bad metadata part: {}", e)))?;
        let media_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(mime)
            .map_err(|e| QcError::Validation(format!("bad media MIME '{}': {}", mime, e)))?;
        let form = reqwest::multipart::Form::new()
            .part("metadata", metadata_part)
            .part("media", media_part);
        let response = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport)?;
        let body = self.check(response).await?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| QcError::Serialization("upload response missing id".into()))?;
        Ok(StoredPhoto {
            url: content_url(&id),
            id,
        })
    }

    async fn set_public_read_permission(&self, file_id: &str) -> Result<()> {
        let token = self.bearer().await?;
        let response = self
            .http
            .post(format!("{FILES_URL}/{file_id}/permissions"))
            .bearer_auth(token)
            .json(&json!({"role": "reader", "type": "anyone"}))
            .send()
            .await
            .map_err(classify_transport)?;
        self.check(response).await?;
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let token = self.bearer().await?;
        let response = self
            .http
            .delete(format!("{FILES_URL}/{file_id}"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_transport)?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_extracted_from_every_url_form() {
        let id = "1AbC-dEf";
        assert_eq!(file_id_from_url(&content_url(id)).as_deref(), Some(id));
        assert_eq!(file_id_from_url(&alternate_content_url(id)).as_deref(), Some(id));
        assert_eq!(file_id_from_url(&viewer_url(id)).as_deref(), Some(id));
        assert_eq!(file_id_from_url("blob:session/123"), None);
    }

    #[test]
    fn query_literals_are_escaped() {
        assert_eq!(escape_query_literal("lote'7"), "lote\\'7");
    }
}
