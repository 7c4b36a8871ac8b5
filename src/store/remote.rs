//! HTTP client for the remote REST store.

use super::types::{StorageBackend, StorageError};
use crate::config::get_config;
use crate::model::{Message, UploadedFile};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Lightweight client for the `/files` and `/messages` resources.
pub struct RemoteStore {
    client: Client,
    base_url: Url,
}

impl RemoteStore {
    /// Construct a client for `base_url`, applying `timeout` to every request.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StorageError> {
        let client = Client::builder()
            .user_agent("indicator-desk/0.1")
            .timeout(timeout)
            .build()?;
        let base_url = normalize_base_url(base_url).map_err(StorageError::InvalidUrl)?;
        tracing::debug!(url = %base_url, timeout_secs = timeout.as_secs(), "Initialized remote store client");
        Ok(Self { client, base_url })
    }

    /// Construct a client using configuration derived from the environment.
    pub fn from_config() -> Result<Self, StorageError> {
        let config = get_config();
        Self::new(
            &config.remote_store_url,
            Duration::from_secs(config.remote_timeout_secs),
        )
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<reqwest::RequestBuilder, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(self.client.request(method, url))
    }

    async fn fetch_json<T: DeserializeOwned>(&self, resource: &str) -> Result<T, StorageError> {
        let response = self.request(Method::GET, &[resource])?.send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        resource: &str,
        body: &T,
    ) -> Result<(), StorageError> {
        let response = self
            .request(Method::POST, &[resource])?
            .json(body)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for RemoteStore {
    async fn list_files(&self) -> Result<Vec<UploadedFile>, StorageError> {
        self.fetch_json("files").await
    }

    async fn add_file(&self, file: &UploadedFile) -> Result<(), StorageError> {
        self.post_json("files", file).await?;
        tracing::debug!(id = %file.id, name = %file.name, "File stored remotely");
        Ok(())
    }

    async fn delete_file(&self, id: &str) -> Result<(), StorageError> {
        let response = self.request(Method::DELETE, &["files", id])?.send().await?;
        ensure_success(response).await?;
        tracing::debug!(id, "File deleted remotely");
        Ok(())
    }

    async fn list_messages(&self) -> Result<Vec<Message>, StorageError> {
        self.fetch_json("messages").await
    }

    async fn add_message(&self, message: &Message) -> Result<(), StorageError> {
        self.post_json("messages", message).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::UnexpectedStatus { status, body })
    }
}

fn normalize_base_url(url: &str) -> Result<Url, String> {
    let mut parsed = Url::parse(url).map_err(|err| err.to_string())?;
    if parsed.cannot_be_a_base() {
        return Err(format!("{url} cannot be used as a base URL"));
    }
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentKind, FileMetadata};
    use httpmock::{
        Method::{DELETE, GET, POST},
        MockServer,
    };
    use serde_json::json;

    fn client(server: &MockServer) -> RemoteStore {
        RemoteStore::new(&server.base_url(), Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn lists_files_from_the_files_resource() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/files");
                then.status(200).json_body(json!([{
                    "id": "f1",
                    "name": "casos.csv",
                    "type": "csv",
                    "content": "a,b",
                    "timestamp": 1700000000000_i64,
                    "category": "Saúde"
                }]));
            })
            .await;

        let files = client(&server).list_files().await.expect("files");
        mock.assert_async().await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].kind, ContentKind::TabularText);
    }

    #[tokio::test]
    async fn posts_the_full_record() {
        let server = MockServer::start_async().await;
        let file = UploadedFile::new(
            "notas.txt",
            ContentKind::PlainText,
            "texto".into(),
            FileMetadata::default(),
        );
        let expected = serde_json::to_value(&file).expect("json");
        let mock = server
            .mock_async(move |when, then| {
                when.method(POST).path("/files").json_body(expected);
                then.status(201).json_body(json!({}));
            })
            .await;

        client(&server).add_file(&file).await.expect("stored");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_an_unexpected_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/files/missing");
                then.status(404).json_body(json!({ "error": "File not found" }));
            })
            .await;

        let error = client(&server)
            .delete_file("missing")
            .await
            .expect_err("404");
        assert!(matches!(error, StorageError::UnexpectedStatus { status, .. } if status.as_u16() == 404));
    }

    #[tokio::test]
    async fn base_path_prefix_is_preserved() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/messages");
                then.status(200).json_body(json!([]));
            })
            .await;

        let store = RemoteStore::new(&format!("{}/api/", server.base_url()), Duration::from_secs(5))
            .expect("client");
        assert!(store.list_messages().await.expect("messages").is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transcript_with_free_form_chart_decodes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/messages");
                then.status(200).json_body(json!([{
                    "id": "m1",
                    "role": "model",
                    "text": "Veja",
                    "timestamp": 1,
                    "chartData": {"type": "scatter", "data": [[1, 2], [3, 4]]}
                }]));
            })
            .await;

        let messages = client(&server).list_messages().await.expect("messages");
        let chart = messages[0].chart_data.as_ref().expect("chart");
        assert_eq!(chart.kind(), None);
        assert_eq!(chart.rows().len(), 2);
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(RemoteStore::new("mailto:ops@example.org", Duration::from_secs(1)).is_err());
        assert!(RemoteStore::new("not a url", Duration::from_secs(1)).is_err());
    }
}
