//! Language-model gateway.
//!
//! Every prompt the pipeline sends goes through [`ModelGateway`], which
//! memoizes answers by exact prompt text, caps concurrent upstream calls,
//! retries transient failures per [`RetryPolicy`], and normalizes the two
//! response shapes the upstream may use. Stages depend on the
//! [`LanguageModel`] trait so tests can substitute a scripted fake.

mod cache;
mod protocol;
mod retry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};
use url::Url;

use artmatch_shared::{ArtMatchError, GatewaySettings, Result};

pub use cache::{PromptCache, prompt_hash};
pub use protocol::{CompletionRequest, CompletionResponse, excerpt, parse_completion};
pub use retry::{RATE_LIMIT_STATUS, RetryDecision, RetryPolicy};

/// User-Agent string for upstream requests.
const USER_AGENT: &str = concat!("artmatch/", env!("CARGO_PKG_VERSION"));

/// Characters of prompt/response echoed into debug logs.
const LOG_EXCERPT_CHARS: usize = 200;

/// Anything that turns a prompt into generated text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send `prompt` and return the generated text.
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

/// Diagnostic counters; they never influence results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Invocations that reached the upstream (cache misses).
    pub invocations: u64,
    /// Invocations answered from the cache.
    pub cache_hits: u64,
}

// ---------------------------------------------------------------------------
// ModelGateway
// ---------------------------------------------------------------------------

/// HTTP gateway to the completions upstream.
pub struct ModelGateway {
    client: Client,
    endpoint: Url,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: Option<String>,
    policy: RetryPolicy,
    cooldown: Duration,
    cache: PromptCache,
    in_flight: Semaphore,
    invocations: AtomicU64,
    cache_hits: AtomicU64,
}

impl ModelGateway {
    /// Create a gateway from resolved settings.
    pub fn new(settings: GatewaySettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ArtMatchError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy: RetryPolicy::from_settings(&settings),
            cache: PromptCache::new(settings.cache_capacity),
            in_flight: Semaphore::new(settings.max_in_flight.max(1)),
            endpoint: settings.endpoint,
            model: settings.model,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            api_key: settings.api_key,
            cooldown: settings.cooldown,
            invocations: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        })
    }

    /// Replace the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Snapshot of the diagnostic counters.
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            invocations: self.invocations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Run attempts until one succeeds, the budget is spent, or a
    /// non-retryable error occurs.
    async fn call_with_retry(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = {
                // The permit covers the round trip and cooldown, never the backoff.
                let _permit = self.in_flight.acquire().await.map_err(|_| {
                    ArtMatchError::Upstream("gateway concurrency limiter closed".into())
                })?;
                let outcome = self.attempt(prompt).await;
                if outcome.is_ok() && !self.cooldown.is_zero() {
                    tokio::time::sleep(self.cooldown).await;
                }
                outcome
            };

            let err = match outcome {
                Ok(text) => return Ok(text),
                Err(err) => err,
            };

            match self.policy.decide(attempt, &err) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "model call failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                RetryDecision::Fail => return Err(err),
                RetryDecision::Exhausted => {
                    warn!(attempts = attempt, error = %err, "model call attempts exhausted");
                    return Err(ArtMatchError::UpstreamExhausted {
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }
            }
        }
    }

    /// One HTTP round trip.
    async fn attempt(&self, prompt: &str) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ArtMatchError::Upstream(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if self.policy.is_rate_limit(status.as_u16()) {
            return Err(ArtMatchError::RateLimited {
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(|e| {
            ArtMatchError::Upstream(format!("{}: failed to read body: {e}", self.endpoint))
        })?;

        if !status.is_success() {
            return Err(ArtMatchError::Upstream(format!(
                "HTTP {status}: {}",
                excerpt(&text, LOG_EXCERPT_CHARS)
            )));
        }

        let generated = parse_completion(&text)?;
        debug!(
            response_excerpt = %excerpt(&generated, LOG_EXCERPT_CHARS),
            "model responded"
        );
        Ok(generated)
    }
}

#[async_trait]
impl LanguageModel for ModelGateway {
    /// Answer from the cache when the exact prompt was seen before,
    /// otherwise call the upstream and remember a successful answer.
    ///
    /// Lookup and insert are separate steps, so concurrent invocations of
    /// the same uncached prompt each reach the upstream and each count as
    /// an invocation; the later answer replaces the earlier one.
    #[instrument(skip_all, fields(prompt_len = prompt.len()))]
    async fn invoke(&self, prompt: &str) -> Result<String> {
        if let Some(text) = self.cache.get(prompt).await {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("prompt cache hit");
            return Ok(text);
        }

        let call = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            call,
            prompt_excerpt = %excerpt(prompt, LOG_EXCERPT_CHARS),
            "invoking model"
        );

        let text = self.call_with_retry(prompt).await?;
        self.cache.insert(prompt, text.clone()).await;
        Ok(text)
    }
}
