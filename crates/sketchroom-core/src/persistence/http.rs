//! REST client for the persistence service.

use super::{BoxFuture, CanvasStore, PersistenceError, PersistenceResult};
use crate::canvas::{Canvas, CanvasDraft};
use crate::config::SessionConfig;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct CanvasBody {
    canvas: Canvas,
}

#[derive(Deserialize)]
struct CanvasListBody {
    canvases: Vec<Canvas>,
}

/// Talks to `{base}/canvas`, `{base}/canvas/{id}` and
/// `{base}/canvas/{id}/share[/{userId}]` with a bearer credential.
pub struct HttpStore {
    client: Client,
    base_url: String,
    credential: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, credential: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: credential.into(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.persistence_base_url, &config.credential)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn execute(&self, request: RequestBuilder, resource: &str) -> PersistenceResult<Response> {
        let response = request
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| PersistenceError::Http {
                status: None,
                message: e.to_string(),
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        log::warn!("persistence: {resource} answered {status}");
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                PersistenceError::Unauthorized(message)
            }
            StatusCode::NOT_FOUND => PersistenceError::NotFound(resource.to_string()),
            _ => PersistenceError::Http {
                status: Some(status.as_u16()),
                message,
            },
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> PersistenceResult<T> {
        let response = self.execute(request, resource).await?;
        let body: Envelope<T> = response
            .json()
            .await
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        Ok(body.data)
    }

    async fn canvas(&self, request: RequestBuilder, resource: &str) -> PersistenceResult<Canvas> {
        let body: CanvasBody = self.fetch(request, resource).await?;
        Ok(body.canvas)
    }
}

impl CanvasStore for HttpStore {
    fn get_canvas(&self, id: &str) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let request = self.client.get(self.url(&format!("/canvas/{id}")));
        let id = id.to_string();
        Box::pin(async move { self.canvas(request, &id).await })
    }

    fn create_canvas(&self, draft: &CanvasDraft) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let request = self.client.post(self.url("/canvas")).json(draft);
        Box::pin(async move { self.canvas(request, "canvas").await })
    }

    fn update_canvas(
        &self,
        id: &str,
        draft: &CanvasDraft,
    ) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let request = self
            .client
            .put(self.url(&format!("/canvas/{id}")))
            .json(draft);
        let id = id.to_string();
        Box::pin(async move { self.canvas(request, &id).await })
    }

    fn delete_canvas(&self, id: &str) -> BoxFuture<'_, PersistenceResult<()>> {
        let request = self.client.delete(self.url(&format!("/canvas/{id}")));
        let id = id.to_string();
        Box::pin(async move {
            self.execute(request, &id).await?;
            Ok(())
        })
    }

    fn list_canvases(&self) -> BoxFuture<'_, PersistenceResult<Vec<Canvas>>> {
        let request = self.client.get(self.url("/canvas"));
        Box::pin(async move {
            let body: CanvasListBody = self.fetch(request, "canvas").await?;
            Ok(body.canvases)
        })
    }

    fn share_canvas(
        &self,
        id: &str,
        email: &str,
        can_edit: bool,
    ) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let request = self
            .client
            .post(self.url(&format!("/canvas/{id}/share")))
            .json(&json!({ "email": email, "canEdit": can_edit }));
        let id = id.to_string();
        Box::pin(async move { self.canvas(request, &id).await })
    }

    fn remove_share(&self, id: &str, user_id: &str) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let request = self
            .client
            .delete(self.url(&format!("/canvas/{id}/share/{user_id}")));
        let id = id.to_string();
        Box::pin(async move { self.canvas(request, &id).await })
    }

    fn update_share_permission(
        &self,
        id: &str,
        user_id: &str,
        can_edit: bool,
    ) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let request = self
            .client
            .put(self.url(&format!("/canvas/{id}/share/{user_id}")))
            .json(&json!({ "canEdit": can_edit }));
        let id = id.to_string();
        Box::pin(async move { self.canvas(request, &id).await })
    }
}
