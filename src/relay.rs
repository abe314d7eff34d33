use std::{sync::Arc, time::Instant};

use tracing::{debug, info};

use crate::{
    config::RelayConfig,
    errors::RelayError,
    identity::{cache::CachedTokenSource, IamTokenSource, TokenSource},
    inference::InferenceInvoker,
    metrics::RelayMetrics,
    models::ChatResponse,
    normalize,
};

/// Runs one chat message through configuration check, token exchange,
/// inference and normalization, strictly in that order.
pub struct ChatRelay {
    config: Arc<RelayConfig>,
    tokens: Arc<dyn TokenSource>,
    invoker: InferenceInvoker,
    metrics: Arc<RelayMetrics>,
}

impl ChatRelay {
    pub fn from_config(config: RelayConfig, metrics: Arc<RelayMetrics>) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|error| {
                RelayError::RequestSetup(format!("failed to build HTTP client: {error}"))
            })?;

        let iam: Arc<dyn TokenSource> =
            Arc::new(IamTokenSource::new(client.clone(), config.iam_url.clone()));
        let tokens: Arc<dyn TokenSource> = if config.token_cache {
            Arc::new(CachedTokenSource::new(iam))
        } else {
            iam
        };
        let invoker = InferenceInvoker::new(
            client,
            config.inference_url.clone(),
            config.profile,
            config.max_new_tokens,
        );

        Ok(Self::new(config, tokens, invoker, metrics))
    }

    pub fn new(
        config: RelayConfig,
        tokens: Arc<dyn TokenSource>,
        invoker: InferenceInvoker,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            tokens,
            invoker,
            metrics,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn token_source(&self) -> &str {
        self.tokens.name()
    }

    pub async fn relay(&self, message: &str) -> Result<ChatResponse, RelayError> {
        let credentials = self.config.credentials()?;

        let started = Instant::now();
        let token = self.tokens.acquire(credentials.api_key).await;
        self.metrics.observe_upstream("token", started.elapsed());
        let token = match token {
            Ok(token) => {
                self.metrics.observe_token("acquired");
                token
            }
            Err(error) => {
                self.metrics.observe_token("failed");
                return Err(error);
            }
        };
        debug!(source = self.tokens.name(), "bearer token ready");

        let started = Instant::now();
        let result = self
            .invoker
            .invoke(message, &token.value, &credentials.target)
            .await;
        let latency = started.elapsed();
        self.metrics.observe_upstream("inference", latency);
        let result = result?;

        let response = normalize::normalize(&result);
        info!(
            profile = %self.invoker.profile(),
            model = %credentials.target.model_id,
            latency_ms = latency.as_millis() as u64,
            "inference relayed"
        );

        Ok(response)
    }
}
