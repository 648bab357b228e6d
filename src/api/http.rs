//! HTTP client for the conversation backend
//!
//! Thin reqwest wrapper: one shared client with the configured timeout,
//! JSON in and out, non-success statuses turned into `ApiError::Status`.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::wire::{
    ChatRequest, ChatResponse, ConversationSummary, EvalRunResponse, FullConversationResponse,
    RecentConversationsRequest, RecentConversationsResponse,
};
use super::ChatApi;
use crate::config::{stringify_cic_hash, ApiConfig, CicHash};
use crate::error::{ApiError, ApiResult};

/// reqwest-backed [`ChatApi`]
#[derive(Clone)]
pub struct HttpChatApi {
    http: Client,
    base_url: Url,
    config: ApiConfig,
}

impl HttpChatApi {
    pub fn new(config: ApiConfig) -> ApiResult<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// `POST /chat` with the default context and an empty message.
    /// True iff the backend answered with a success status.
    pub async fn test_connection(&self) -> bool {
        let url = match self.endpoint(&["chat"]) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "Connection test failed");
                return false;
            }
        };

        match self
            .http
            .post(url)
            .json(&ChatRequest::probe(&self.config))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "Connection test failed");
                false
            }
        }
    }

    /// Base URL with `segments` appended as individually-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<T, B>(&self, url: Url, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let endpoint = url.path().to_string();
        tracing::debug!(endpoint = %endpoint, "POST");

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;

        Self::decode(endpoint, response).await
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
        let endpoint = url.path().to_string();
        tracing::debug!(endpoint = %endpoint, "GET");

        let response = self
            .http
            .get(url)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;

        Self::decode(endpoint, response).await
    }

    async fn decode<T: DeserializeOwned>(
        endpoint: String,
        response: reqwest::Response,
    ) -> ApiResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(endpoint = %endpoint, status = %status, "Backend returned an error status");
            return Err(ApiError::status(endpoint, status, &body));
        }

        let text = response.text().await.map_err(|source| ApiError::Request {
            endpoint: endpoint.clone(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            endpoint,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn chat(&self, request: &ChatRequest) -> ApiResult<ChatResponse> {
        let url = self.endpoint(&["chat"])?;
        self.post(url, request).await
    }

    async fn recent_conversations(
        &self,
        request: &RecentConversationsRequest,
    ) -> ApiResult<Vec<ConversationSummary>> {
        let url = self.endpoint(&["conversations", "recent"])?;
        let response: RecentConversationsResponse = self.post(url, request).await?;
        Ok(response.conversations)
    }

    async fn conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
        cic_hash: &CicHash,
    ) -> ApiResult<FullConversationResponse> {
        let mut url = self.endpoint(&["conversation", conversation_id])?;
        url.query_pairs_mut()
            .append_pair("user_id", user_id)
            .append_pair("cic_hash", &stringify_cic_hash(cic_hash));

        tracing::info!(conversation_id = %conversation_id, "Fetching full conversation");
        self.get(url).await
    }

    async fn run_evaluation(&self, conversation_id: &str) -> ApiResult<EvalRunResponse> {
        let url = self.endpoint(&["eval", conversation_id])?;
        tracing::info!(conversation_id = %conversation_id, "Running evaluation");
        self.post(url, &serde_json::json!({})).await
    }
}
