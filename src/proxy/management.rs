//! Management API pipeline
//!
//! Served by the `API` role. Accepts exchange logs pushed by SDK helpers
//! and feedback submissions; feedback is queued for the batch consumer
//! rather than written inline.

use crate::domain::{ApiKey, AsyncLogRequest, FeedbackPayload, FeedbackQueueMessage, Provider};
use crate::infrastructure::{ColumnarStore, RequestLogRow};
use crate::proxy::headers::{content_types, paths, CONTENT_TYPE};
use crate::proxy::pipeline::Pipeline;
use crate::proxy::request_wrapper::RequestWrapper;
use crate::proxy::types::{ProxyError, ProxyResult};
use crate::queue::FeedbackQueue;
use async_trait::async_trait;
use axum::body::Body;
use http::{Method, Response, StatusCode};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Bearer keys accepted by the management API
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub api_keys: HashSet<ApiKey>,
}

impl AuthConfig {
    /// Blank entries are skipped
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            api_keys: keys
                .into_iter()
                .filter_map(|key| ApiKey::try_new(key.into()).ok())
                .collect(),
        }
    }

    fn authorize(&self, wrapper: &RequestWrapper) -> ProxyResult<()> {
        let Some(credential) = wrapper.credential() else {
            warn!(request_id = %wrapper.request_id(), "Missing management API credentials");
            return Err(ProxyError::Unauthorized);
        };

        match ApiKey::try_new(credential) {
            Ok(key) if self.api_keys.contains(&key) => Ok(()),
            _ => {
                warn!(request_id = %wrapper.request_id(), "Invalid management API key");
                Err(ProxyError::Unauthorized)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct Accepted {
    status: &'static str,
    request_id: String,
}

pub struct ManagementPipeline {
    auth: AuthConfig,
    store: Arc<dyn ColumnarStore>,
    feedback: FeedbackQueue,
}

impl ManagementPipeline {
    pub fn new(auth: AuthConfig, store: Arc<dyn ColumnarStore>, feedback: FeedbackQueue) -> Self {
        Self {
            auth,
            store,
            feedback,
        }
    }

    async fn ingest_log(
        &self,
        wrapper: &RequestWrapper,
        provider: Provider,
    ) -> ProxyResult<Response<Body>> {
        let log: AsyncLogRequest = serde_json::from_slice(wrapper.body())
            .map_err(|e| ProxyError::InvalidRequest(format!("Malformed log payload: {e}")))?;

        let row = RequestLogRow::from_log(wrapper.request_id(), provider, &log);
        self.store
            .insert_request_log(&row)
            .await
            .map_err(|e| ProxyError::Internal(e.to_string()))?;

        info!(
            request_id = %wrapper.request_id(),
            %provider,
            status = log.provider_response.status,
            duration_ms = log.timing.duration_millis(),
            "Exchange log stored"
        );
        json_response(
            StatusCode::OK,
            &Accepted {
                status: "ok",
                request_id: wrapper.request_id().to_string(),
            },
        )
    }

    async fn submit_feedback(&self, wrapper: &RequestWrapper) -> ProxyResult<Response<Body>> {
        let feedback: FeedbackPayload = serde_json::from_slice(wrapper.body())
            .map_err(|e| ProxyError::InvalidRequest(format!("Malformed feedback: {e}")))?;

        if !feedback.has_fields() {
            return Err(ProxyError::InvalidRequest(
                "Feedback must carry a rating or at least one property".to_string(),
            ));
        }

        let request_id = feedback.request_id.to_string();
        self.feedback
            .send(FeedbackQueueMessage { feedback })
            .await
            .map_err(|e| ProxyError::Internal(e.to_string()))?;

        info!(
            request_id = %wrapper.request_id(),
            feedback_for = %request_id,
            queue = %self.feedback.name(),
            "Feedback queued"
        );
        json_response(
            StatusCode::ACCEPTED,
            &Accepted {
                status: "queued",
                request_id,
            },
        )
    }
}

#[async_trait]
impl Pipeline for ManagementPipeline {
    async fn handle(&self, wrapper: RequestWrapper) -> ProxyResult<Response<Body>> {
        let log_provider = match wrapper.path() {
            paths::OPENAI_LOG => Some(Provider::OpenAI),
            paths::ANTHROPIC_LOG => Some(Provider::Anthropic),
            paths::CUSTOM_LOG => Some(Provider::CustomModel),
            _ => None,
        };
        let is_feedback = wrapper.path() == paths::FEEDBACK;

        if wrapper.method() != Method::POST || (log_provider.is_none() && !is_feedback) {
            return Err(ProxyError::NotFound(format!(
                "{} {}",
                wrapper.method(),
                wrapper.path()
            )));
        }

        self.auth.authorize(&wrapper)?;

        match log_provider {
            Some(provider) => self.ingest_log(&wrapper, provider).await,
            None => self.submit_feedback(&wrapper).await,
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> ProxyResult<Response<Body>> {
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_types::APPLICATION_JSON)
        .body(Body::from(serde_json::to_vec(body)?))?)
}
