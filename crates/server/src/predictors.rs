//! Remote prediction service client
//!
//! One HTTP service answers all three prediction questions:
//! `POST {endpoint}/conversion`, `/objections` and `/needs`, each taking the
//! conversation id, messages and profile as JSON.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use sales_agent_config::PredictorsConfig;
use sales_agent_core::{
    ConversionEstimate, ConversionPredictor, CustomerProfile, DetectedNeed, DetectedObjection,
    Message, NeedPredictor, ObjectionPredictor, PredictionError,
};
use sales_agent_decision::Predictors;

use crate::ServerError;

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    conversation_id: &'a str,
    messages: &'a [Message],
    profile: &'a CustomerProfile,
}

#[derive(Debug, Deserialize)]
struct ObjectionsResponse {
    #[serde(default)]
    objections: Vec<DetectedObjection>,
}

#[derive(Debug, Deserialize)]
struct NeedsResponse {
    #[serde(default)]
    needs: Vec<DetectedNeed>,
}

/// HTTP predictor implementing every predictor trait
pub struct RemotePredictor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RemotePredictor {
    pub fn new(
        endpoint: impl Into<String>,
        request_timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ServerError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// `None` when no endpoint is configured
    pub fn from_config(config: &PredictorsConfig) -> Result<Option<Arc<Self>>, ServerError> {
        match &config.endpoint {
            Some(endpoint) => Ok(Some(Arc::new(Self::new(
                endpoint.clone(),
                Duration::from_millis(config.request_timeout_ms),
                config.api_key.clone(),
            )?))),
            None => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Use this service for all three predictions
    pub fn into_predictors(self: Arc<Self>) -> Predictors {
        Predictors::new()
            .with_conversion(self.clone())
            .with_objections(self.clone())
            .with_needs(self)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
    ) -> Result<T, PredictionError> {
        let url = format!("{}/{}", self.endpoint, path);
        let request = PredictionRequest {
            conversation_id,
            messages,
            profile,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                PredictionError::Timeout
            } else if e.is_connect() {
                PredictionError::Unavailable(format!("{}: {}", url, e))
            } else {
                PredictionError::Backend(format!("Request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| PredictionError::InvalidResponse(format!("{}: {}", path, e)))
    }
}

fn classify_status(status: StatusCode, body: String) -> PredictionError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PredictionError::InvalidInput(format!("{} - {}", status, body))
        },
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
            PredictionError::Unavailable(format!("{} - {}", status, body))
        },
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => PredictionError::Timeout,
        _ => PredictionError::Backend(format!("{} - {}", status, body)),
    }
}

#[async_trait]
impl ConversionPredictor for RemotePredictor {
    async fn predict_conversion(
        &self,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
    ) -> Result<ConversionEstimate, PredictionError> {
        let estimate: ConversionEstimate = self
            .post("conversion", conversation_id, messages, profile)
            .await?;
        if !estimate.probability.is_finite() {
            return Err(PredictionError::InvalidResponse(
                "conversion probability is not a number".to_string(),
            ));
        }
        Ok(ConversionEstimate::new(estimate.probability))
    }
}

#[async_trait]
impl ObjectionPredictor for RemotePredictor {
    async fn predict_objections(
        &self,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
    ) -> Result<Vec<DetectedObjection>, PredictionError> {
        let response: ObjectionsResponse = self
            .post("objections", conversation_id, messages, profile)
            .await?;
        Ok(response.objections)
    }
}

#[async_trait]
impl NeedPredictor for RemotePredictor {
    async fn predict_needs(
        &self,
        conversation_id: &str,
        messages: &[Message],
        profile: &CustomerProfile,
    ) -> Result<Vec<DetectedNeed>, PredictionError> {
        let response: NeedsResponse = self
            .post("needs", conversation_id, messages, profile)
            .await?;
        Ok(response.needs)
    }
}
