//! HTTP transport for the records API

use super::RecordBackend;
use crate::config::SyncConfig;
use crate::error::{Result, SdkError};
use crate::model::{Record, RecordKind, RecordPage};
use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectRequest<'a> {
    rejection_note: &'a str,
}

/// `RecordBackend` over the records REST API
///
/// # Example
///
/// ```rust,no_run
/// use biochar_sdk::{HttpBackend, SyncConfig};
///
/// # fn example() -> biochar_sdk::Result<()> {
/// let backend = HttpBackend::new(&SyncConfig {
///     base_url: "https://api.example.org".into(),
///     ..Default::default()
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref api_key) = config.api_key {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| SdkError::Config("API key is not a valid header value".into()))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn collection_url(&self, kind: RecordKind) -> String {
        format!("{}/{}", self.base_url, kind.route_segment())
    }

    fn record_url(&self, kind: RecordKind, id: &str) -> String {
        format!("{}/{}", self.collection_url(kind), urlencoding::encode(id))
    }

    fn sub_unit_url(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
        action: &str,
    ) -> String {
        format!(
            "{}/kontikis/{}/{}",
            self.record_url(kind, record_id),
            urlencoding::encode(kontiki_id),
            action
        )
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn handle_empty(&self, response: Response) -> Result<()> {
        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), body))
}

/// Map a non-success status to the crate's error taxonomy
fn status_error(status: u16, body: String) -> SdkError {
    match status {
        400 | 422 => SdkError::Validation(body),
        404 => SdkError::NotFound(body),
        409 => SdkError::Conflict(body),
        _ => SdkError::Server {
            status,
            message: body,
        },
    }
}

#[async_trait]
impl RecordBackend for HttpBackend {
    async fn list(&self, kind: RecordKind, page: u32, page_size: u32) -> Result<RecordPage> {
        let url = format!("{}?page={}&limit={}", self.collection_url(kind), page, page_size);
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    async fn get(&self, kind: RecordKind, id: &str) -> Result<Record> {
        let response = self.client.get(self.record_url(kind, id)).send().await?;
        self.handle_response(response).await
    }

    async fn verify_sub_unit(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
    ) -> Result<()> {
        let url = self.sub_unit_url(kind, record_id, kontiki_id, "verify");
        let response = self.client.post(&url).send().await?;
        self.handle_empty(response).await
    }

    async fn reject_sub_unit(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
        note: &str,
    ) -> Result<()> {
        let url = self.sub_unit_url(kind, record_id, kontiki_id, "reject");
        let response = self
            .client
            .post(&url)
            .json(&RejectRequest { rejection_note: note })
            .send()
            .await?;
        self.handle_empty(response).await
    }

    async fn verify_record(&self, kind: RecordKind, id: &str) -> Result<()> {
        let url = format!("{}/verify", self.record_url(kind, id));
        let response = self.client.post(&url).send().await?;
        self.handle_empty(response).await
    }

    async fn reject_record(&self, kind: RecordKind, id: &str, note: &str) -> Result<()> {
        let url = format!("{}/reject", self.record_url(kind, id));
        let response = self
            .client
            .post(&url)
            .json(&RejectRequest { rejection_note: note })
            .send()
            .await?;
        self.handle_empty(response).await
    }

    async fn create(&self, kind: RecordKind, payload: &serde_json::Value) -> Result<Record> {
        let response = self
            .client
            .post(self.collection_url(kind))
            .json(payload)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn update(
        &self,
        kind: RecordKind,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<Record> {
        let response = self
            .client
            .patch(self.record_url(kind, id))
            .json(payload)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<()> {
        let response = self.client.delete(self.record_url(kind, id)).send().await?;
        self.handle_empty(response).await
    }
}
