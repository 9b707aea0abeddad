//! Single choke point for every call to the learning service.
//!
//! [`ApiGateway::send`] turns a [`RequestDescriptor`] into one HTTP attempt and
//! [`ApiGateway::decode_response`] normalizes whatever comes back into an
//! [`ApiPayload`] or a [`ClientError`]. There are no retries and no caching.

use async_trait::async_trait;
use reqwest::{
    header::{HeaderValue, CONTENT_TYPE},
    Client, Method, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{
    domain::{NeuroProfile, NeuroProfileId},
    protocol::{
        AdaptContentResponse, CredentialsRequest, LoginResponse, ProfileUpdateRequest,
        ProgressEntry, ProgressRecord, TextRequest,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};

const JSON_CONTENT_TYPE: &str = "application/json";
const FALLBACK_BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Endpoint contract exposed by the learning service.
#[async_trait]
pub trait LearningApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> ClientResult<LoginResponse>;
    async fn register(&self, email: &str, password: &str) -> ClientResult<Value>;
    async fn adapt_content(&self, text: &str, token: &str) -> ClientResult<AdaptContentResponse>;
    async fn text_to_speech(&self, text: &str, token: &str) -> ClientResult<BinaryPayload>;
    async fn set_neuroprofile(&self, profile_id: NeuroProfileId, token: &str)
        -> ClientResult<Value>;
    async fn list_neuroprofiles(&self, token: &str) -> ClientResult<Vec<NeuroProfile>>;
    async fn save_progress(&self, entry: &ProgressEntry, token: &str) -> ClientResult<Value>;
    async fn my_analytics(&self, token: &str) -> ClientResult<Vec<ProgressRecord>>;
}

#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub token: Option<String>,
}

impl RequestDescriptor {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            token: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            ..Self::get(path)
        }
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> ClientResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::Decode(format!("failed to encode request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BinaryPayload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for BinaryPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryPayload")
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiPayload {
    Json(Value),
    Binary(BinaryPayload),
}

impl ApiPayload {
    pub fn into_json<T: DeserializeOwned>(self) -> ClientResult<T> {
        match self {
            Self::Json(value) => serde_json::from_value(value)
                .map_err(|e| ClientError::Decode(format!("unexpected response shape: {e}"))),
            Self::Binary(payload) => Err(ClientError::Decode(format!(
                "expected a JSON response, got '{}'",
                payload.content_type
            ))),
        }
    }

    pub fn into_binary(self) -> ClientResult<BinaryPayload> {
        match self {
            Self::Binary(payload) => Ok(payload),
            Self::Json(_) => Err(ClientError::Decode(
                "expected a binary response, got JSON".to_string(),
            )),
        }
    }

    /// For endpoints whose success body carries no contract.
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Binary(_) => Value::Null,
        }
    }
}

pub fn is_json_content_type(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    let essence = lowered.split(';').next().unwrap_or_default().trim();
    lowered.contains(JSON_CONTENT_TYPE) || essence.ends_with("+json")
}

#[derive(Clone)]
pub struct ApiGateway {
    http: Client,
    base_url: String,
}

impl ApiGateway {
    pub fn new(base_url: &Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &Url) -> Self {
        Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // Plain concatenation keeps any path prefix on the base URL (e.g. `/api`).
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn send(&self, request: RequestDescriptor) -> ClientResult<ApiPayload> {
        let url = self.endpoint(&request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            let encoded = serde_json::to_vec(body)
                .map_err(|e| ClientError::Decode(format!("failed to encode request body: {e}")))?;
            builder = builder.body(encoded);
        }

        let response = builder.send().await.map_err(|err| {
            warn!(method = %request.method, path = %request.path, error = %err, "learning api request failed");
            ClientError::from(err)
        })?;
        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status().as_u16(),
            "learning api responded"
        );
        Self::decode_response(response).await
    }

    pub async fn decode_response(response: Response) -> ClientResult<ApiPayload> {
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let err = ClientError::from_error_body(status.as_u16(), &body);
            warn!(status = status.as_u16(), error = %err, "learning api returned an error");
            return Err(err);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Decode(format!("failed to read response body: {e}")))?;

        match content_type {
            Some(content_type) if is_json_content_type(&content_type) => {
                serde_json::from_slice(&body)
                    .map(ApiPayload::Json)
                    .map_err(|e| ClientError::Decode(format!("invalid JSON response: {e}")))
            }
            content_type => Ok(ApiPayload::Binary(BinaryPayload {
                content_type: content_type
                    .unwrap_or_else(|| FALLBACK_BINARY_CONTENT_TYPE.to_string()),
                bytes: body.to_vec(),
            })),
        }
    }
}

#[async_trait]
impl LearningApi for ApiGateway {
    async fn login(&self, email: &str, password: &str) -> ClientResult<LoginResponse> {
        let request = RequestDescriptor::post("/auth/login").json(&CredentialsRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        self.send(request).await?.into_json()
    }

    async fn register(&self, email: &str, password: &str) -> ClientResult<Value> {
        let request = RequestDescriptor::post("/auth/register").json(&CredentialsRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        Ok(self.send(request).await?.into_value())
    }

    async fn adapt_content(&self, text: &str, token: &str) -> ClientResult<AdaptContentResponse> {
        let request = RequestDescriptor::post("/adapt-content")
            .json(&TextRequest {
                text: text.to_string(),
            })?
            .bearer(token);
        self.send(request).await?.into_json()
    }

    async fn text_to_speech(&self, text: &str, token: &str) -> ClientResult<BinaryPayload> {
        let request = RequestDescriptor::post("/text-to-speech")
            .json(&TextRequest {
                text: text.to_string(),
            })?
            .bearer(token);
        self.send(request).await?.into_binary()
    }

    async fn set_neuroprofile(
        &self,
        profile_id: NeuroProfileId,
        token: &str,
    ) -> ClientResult<Value> {
        let request = RequestDescriptor::post("/users/profile")
            .json(&ProfileUpdateRequest {
                neuroprofile_id: profile_id,
            })?
            .bearer(token);
        Ok(self.send(request).await?.into_value())
    }

    async fn list_neuroprofiles(&self, token: &str) -> ClientResult<Vec<NeuroProfile>> {
        let request = RequestDescriptor::get("/neuroprofiles").bearer(token);
        self.send(request).await?.into_json()
    }

    async fn save_progress(&self, entry: &ProgressEntry, token: &str) -> ClientResult<Value> {
        let request = RequestDescriptor::post("/progress").json(entry)?.bearer(token);
        Ok(self.send(request).await?.into_value())
    }

    async fn my_analytics(&self, token: &str) -> ClientResult<Vec<ProgressRecord>> {
        let request = RequestDescriptor::get("/analytics/me").bearer(token);
        self.send(request).await?.into_json()
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
