//! Client for the bearer-authenticated webhook management API.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use super::ClientError;
use crate::objects::{
    CreateWebhookRequest, DeliveryListResponse, ListDeliveriesQuery, ListWebhooksQuery,
    PublishEventRequest, UpdateWebhookRequest, WebhookListResponse, WebhookResponse,
    WebhookStatsResponse,
};

/// Typed wrapper around every `/webhooks` endpoint plus `POST /events`.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl AdminClient {
    /// Create a client for the server at `base_url` using `token` as the
    /// bearer credential.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            token: token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    /// `POST /webhooks`
    pub async fn create_webhook(
        &self,
        request: &CreateWebhookRequest,
    ) -> Result<WebhookResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint("webhooks")?)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    /// `GET /webhooks`
    pub async fn list_webhooks(
        &self,
        query: &ListWebhooksQuery,
    ) -> Result<WebhookListResponse, ClientError> {
        let response = self
            .http
            .get(self.endpoint("webhooks")?)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        decode(response).await
    }

    /// `GET /webhooks/{id}`
    pub async fn get_webhook(&self, id: i64) -> Result<WebhookResponse, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&format!("webhooks/{id}"))?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        decode(response).await
    }

    /// `PATCH /webhooks/{id}`
    pub async fn update_webhook(
        &self,
        id: i64,
        request: &UpdateWebhookRequest,
    ) -> Result<WebhookResponse, ClientError> {
        let response = self
            .http
            .patch(self.endpoint(&format!("webhooks/{id}"))?)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    /// `DELETE /webhooks/{id}`
    pub async fn delete_webhook(&self, id: i64) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("webhooks/{id}"))?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    /// `GET /webhooks/stats`
    pub async fn stats(&self) -> Result<WebhookStatsResponse, ClientError> {
        let response = self
            .http
            .get(self.endpoint("webhooks/stats")?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        decode(response).await
    }

    /// `GET /webhooks/{id}/deliveries`
    pub async fn list_deliveries(
        &self,
        webhook_id: i64,
        query: &ListDeliveriesQuery,
    ) -> Result<DeliveryListResponse, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&format!("webhooks/{webhook_id}/deliveries"))?)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        decode(response).await
    }

    /// `POST /events`
    pub async fn publish_event(&self, request: &PublishEventRequest) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.endpoint("events")?)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        check(response).await.map(|_| ())
    }
}

/// Turn a non-2xx response into [`ClientError::Api`].
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Api { status, body })
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = check(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
