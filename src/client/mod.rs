//! Governed API client
//!
//! Every provider call flows through one [`GovernedClient`], which wraps a
//! pluggable [`ApiTransport`] with the retry policy and the header-driven
//! rate governor. The composition order matters: each retry attempt is a
//! real call, so each attempt is governed; retries never bypass or reset
//! rate governance.
//!
//! The transport is always passed in explicitly. There is no process-wide
//! default client registered as a construction side effect; one run owns
//! one client and hands it to every component that issues calls.

mod governor;
mod retry;
mod transport;

pub use governor::{RateBudget, RateGovernor, USAGE_HEADERS};
pub use retry::RetryPolicy;
pub use transport::{
    HttpTransport, HttpTransportBuilder, HttpTransportConfig, Pacer, PacerConfig, TokenStyle,
};

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, Method, StringMap};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Transport seam
// ============================================================================

/// A completed provider response: parsed body plus response headers
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Parsed JSON body
    pub body: JsonValue,
    /// Response headers, names lowercased
    pub headers: StringMap,
}

/// The transport seam the engine calls through
///
/// Implemented by [`HttpTransport`] for real providers and by in-memory
/// fakes in tests. Non-2xx responses surface as classifiable errors.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Issue one call and return the response with headers
    async fn call(&self, method: Method, path: &str, params: &JsonObject) -> Result<ApiResponse>;
}

// ============================================================================
// Governed client
// ============================================================================

/// A connected account discovered for the credentials in use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Id of the page the account hangs off
    pub page_id: String,
    /// Id of the business account itself; the partition key for
    /// incremental streams
    pub account_id: String,
}

/// API client composing transport, retry policy and rate governor
pub struct GovernedClient {
    transport: Arc<dyn ApiTransport>,
    governor: RateGovernor,
    retry: RetryPolicy,
    calls: AtomicU64,
}

impl GovernedClient {
    /// Create a client with default retry and governance settings
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            transport,
            governor: RateGovernor::default(),
            retry: RetryPolicy::default(),
            calls: AtomicU64::new(0),
        }
    }

    /// Replace the rate governor
    #[must_use]
    pub fn with_governor(mut self, governor: RateGovernor) -> Self {
        self.governor = governor;
        self
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Total attempts issued through this client, retries included
    pub fn calls_made(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Make a governed call and return the response body
    ///
    /// Each attempt passes through the governor after completion; failed
    /// attempts are retried per the policy.
    pub async fn call(&self, method: Method, path: &str, params: &JsonObject) -> Result<JsonValue> {
        let response = self
            .retry
            .retry(move || async move {
                self.calls.fetch_add(1, Ordering::Relaxed);
                let response = self.transport.call(method, path, params).await?;
                self.governor.observe(&response.headers).await;
                Ok(response)
            })
            .await?;
        Ok(response.body)
    }

    /// Convenience wrapper for GET calls
    pub async fn get(&self, path: &str, params: &JsonObject) -> Result<JsonValue> {
        self.call(Method::GET, path, params).await
    }

    /// Discover the business accounts connected to the credentials
    ///
    /// Fatal at setup time: no qualifying account means the run cannot
    /// start, surfaced as an auth error before any stream reads.
    pub async fn find_accounts(&self) -> Result<Vec<Account>> {
        let body = self
            .get("me/accounts", &JsonObject::new())
            .await
            .map_err(setup_error)?;

        let mut accounts = Vec::new();
        let pages = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for page in &pages {
            let Some(page_id) = page.get("id").and_then(Value::as_str) else {
                continue;
            };
            let mut params = JsonObject::new();
            params.insert("fields".into(), Value::String("instagram_business_account".into()));

            let detail = self.get(page_id, &params).await.map_err(setup_error)?;
            if let Some(account_id) = detail
                .get("instagram_business_account")
                .and_then(|a| a.get("id"))
                .and_then(Value::as_str)
            {
                debug!(page_id, account_id, "Discovered business account");
                accounts.push(Account {
                    page_id: page_id.to_string(),
                    account_id: account_id.to_string(),
                });
            }
        }

        if accounts.is_empty() {
            return Err(Error::auth(
                "Couldn't find a business account for the given access token",
            ));
        }
        Ok(accounts)
    }
}

impl std::fmt::Debug for GovernedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernedClient")
            .field("retry", &self.retry)
            .field("calls", &self.calls_made())
            .finish_non_exhaustive()
    }
}

/// Provider errors during account discovery are configuration problems,
/// not data-fetch problems; keep them distinguishable for the host.
fn setup_error(err: Error) -> Error {
    match err {
        Error::Api { code, message, .. } => {
            Error::auth(format!("Account discovery failed: {code}, {message}"))
        }
        other => other,
    }
}
