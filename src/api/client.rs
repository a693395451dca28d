//
//  sharepoint-client
//  api/client.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! Retrying HTTP Transport
//!
//! This module provides the one place in the client where bytes actually hit
//! the network. [`SpHttpClient`] performs a single logical HTTP exchange
//! with:
//!
//! - Header normalization (caller-supplied headers merged over the required
//!   defaults, caller values winning on conflict)
//! - Automatic digest attachment for state-mutating requests that carry
//!   neither an explicit `X-RequestDigest` nor an `Authorization` header
//! - Exponential-backoff retry on throttling (429) and unavailability (503)
//!   responses, starting at 100ms and doubling for up to 7 attempts
//!
//! ## Retry policy
//!
//! Only 429 and 503 are retried; any other failure is returned immediately.
//! With the default budget the worst case performs 7 attempts separated by
//! sleeps of 100, 200, 400, 800, 1600 and 3200 milliseconds before giving
//! up, and the final error carries the last observed response.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use url::Url;

use crate::api::common::{RecordedResponse, RequestOptions, SpError};
use crate::auth::digest::DigestStore;
use crate::context::RuntimeContext;
use crate::query::url::extract_site_url;

/// Header identifying the client library to the service.
pub const CLIENT_TAG_HEADER: &str = "X-ClientService-ClientTag";

/// First retry delay; doubled after every throttled attempt.
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Total attempts performed before a throttled request is given up on.
const DEFAULT_RETRY_COUNT: u32 = 7;

/// Returns the client-tag header value, e.g. `SPClientRust:0.1.0`.
pub fn client_tag() -> String {
    format!("SPClientRust:{}", crate::VERSION)
}

/// The raw send seam beneath the retry loop.
///
/// Exists so the backoff policy can be exercised against a scripted sender;
/// production use always goes through the `reqwest`-backed implementation.
#[async_trait]
pub(crate) trait RawSend: Send + Sync {
    async fn send(
        &self,
        url: &Url,
        method: Method,
        options: &RequestOptions,
    ) -> Result<RecordedResponse, SpError>;
}

/// `reqwest`-backed sender.
struct ReqwestSend {
    http: reqwest::Client,
}

#[async_trait]
impl RawSend for ReqwestSend {
    async fn send(
        &self,
        url: &Url,
        method: Method,
        options: &RequestOptions,
    ) -> Result<RecordedResponse, SpError> {
        let mut request = self.http.request(method, url.clone());
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        RecordedResponse::from_live(response).await
    }
}

/// The retrying HTTP transport shared by direct dispatch and batching.
///
/// Cheap to clone: all state lives behind `Arc`s. A transport is bound to
/// one [`RuntimeContext`] (for globally configured headers) and one
/// [`DigestStore`] (process-wide by default, injectable for isolation).
#[derive(Clone)]
pub struct SpHttpClient {
    sender: Arc<dyn RawSend>,
    context: Arc<RuntimeContext>,
    digests: Arc<DigestStore>,
    retry_count: u32,
}

impl fmt::Debug for SpHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpHttpClient")
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

impl SpHttpClient {
    /// Creates a transport over a fresh `reqwest` client.
    ///
    /// The client is built with a user-agent marker identifying the library
    /// and version.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be created.
    pub fn new(
        context: Arc<RuntimeContext>,
        digests: Arc<DigestStore>,
    ) -> Result<Self, SpError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("{}/{}", crate::LIB_NAME, crate::VERSION))
            .build()?;
        Ok(Self {
            sender: Arc::new(ReqwestSend { http }),
            context,
            digests,
            retry_count: DEFAULT_RETRY_COUNT,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_sender(
        sender: Arc<dyn RawSend>,
        context: Arc<RuntimeContext>,
        digests: Arc<DigestStore>,
        retry_count: u32,
    ) -> Self {
        Self {
            sender,
            context,
            digests,
            retry_count,
        }
    }

    /// Performs one logical HTTP exchange with full header normalization.
    ///
    /// The effective headers are assembled in layers: required defaults
    /// first (`Accept`, the verbose-OData `Content-Type`, the client tag),
    /// then the context's globally configured headers, then the caller's,
    /// with later layers winning per key. For non-GET verbs lacking an explicit
    /// `X-RequestDigest` or `Authorization` header, the site-collection URL
    /// is derived from the request URL's `_api/` segment and a digest is
    /// obtained and attached.
    ///
    /// # Errors
    ///
    /// - [`SpError::ApiUrlUndetermined`] when a digest is needed but the URL
    ///   carries no `_api/` segment, or the final URL is not absolute
    /// - Any error from digest acquisition or the underlying exchange
    pub async fn fetch(
        &self,
        url: &str,
        method: Method,
        options: &RequestOptions,
    ) -> Result<RecordedResponse, SpError> {
        let mut merged = RequestOptions::new()
            .header("Accept", "application/json")
            .header("Content-Type", "application/json;odata=verbose;charset=utf-8")
            .header(CLIENT_TAG_HEADER, &client_tag());
        // Global options contribute headers only; a body never applies
        // process-wide.
        merged.merge(&RequestOptions {
            headers: self.context.global_options().headers.clone(),
            body: None,
        });
        merged.merge(options);

        if method != Method::GET
            && !merged.has_header("X-RequestDigest")
            && !merged.has_header("Authorization")
        {
            let site_url = extract_site_url(url)?;
            let digest = self.digests.get_digest(&site_url, self).await?;
            merged.set_header("X-RequestDigest", &digest);
        }

        self.fetch_raw(url, method, &merged).await
    }

    /// Performs the underlying network call with throttling retries.
    ///
    /// Headers are sent exactly as given; no defaults or digests are
    /// attached at this level. A response with status other than 429/503 is
    /// returned as-is, success or not; classifying non-2xx statuses is the
    /// response parser's concern.
    pub async fn fetch_raw(
        &self,
        url: &str,
        method: Method,
        options: &RequestOptions,
    ) -> Result<RecordedResponse, SpError> {
        let parsed =
            Url::parse(url).map_err(|_| SpError::ApiUrlUndetermined(url.to_string()))?;

        let mut attempts: u32 = 0;
        let mut delay = INITIAL_RETRY_DELAY;
        loop {
            let response = self.sender.send(&parsed, method.clone(), options).await?;
            if response.status != 429 && response.status != 503 {
                return Ok(response);
            }

            attempts += 1;
            if attempts >= self.retry_count {
                tracing::warn!(
                    url,
                    status = response.status,
                    attempts,
                    "retry budget exhausted"
                );
                return Err(SpError::RetryBudgetExhausted {
                    status: response.status,
                    attempts,
                    body: response.body,
                });
            }

            tracing::debug!(
                url,
                status = response.status,
                delay_ms = delay.as_millis() as u64,
                "throttled; backing off"
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    /// Performs a GET request.
    pub async fn get(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<RecordedResponse, SpError> {
        self.fetch(url, Method::GET, options).await
    }

    /// Performs a POST request.
    pub async fn post(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<RecordedResponse, SpError> {
        self.fetch(url, Method::POST, options).await
    }

    /// Performs a PATCH request.
    pub async fn patch(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<RecordedResponse, SpError> {
        self.fetch(url, Method::PATCH, options).await
    }

    /// Performs a DELETE request.
    pub async fn delete(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<RecordedResponse, SpError> {
        self.fetch(url, Method::DELETE, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Sender that replays a scripted status sequence, recording call times.
    struct ScriptedSend {
        statuses: Vec<u16>,
        calls: AtomicUsize,
        instants: Mutex<Vec<Instant>>,
    }

    impl ScriptedSend {
        fn new(statuses: Vec<u16>) -> Arc<Self> {
            Arc::new(Self {
                statuses,
                calls: AtomicUsize::new(0),
                instants: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RawSend for ScriptedSend {
        async fn send(
            &self,
            _url: &Url,
            _method: Method,
            _options: &RequestOptions,
        ) -> Result<RecordedResponse, SpError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.instants.lock().unwrap().push(Instant::now());
            let status = *self.statuses.get(call).unwrap_or(&200);
            Ok(RecordedResponse {
                status,
                status_text: String::new(),
                body: format!("call {call}"),
            })
        }
    }

    fn client_over(sender: Arc<ScriptedSend>) -> SpHttpClient {
        SpHttpClient::with_sender(
            sender,
            Arc::new(RuntimeContext::new()),
            Arc::new(DigestStore::new()),
            DEFAULT_RETRY_COUNT,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_resolves_after_throttling_with_doubling_delays() {
        let sender = ScriptedSend::new(vec![429, 429, 429, 200]);
        let client = client_over(Arc::clone(&sender));

        let response = client
            .fetch_raw("https://x.com/_api/web", Method::GET, &RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(sender.calls(), 4);

        let instants = sender.instants.lock().unwrap();
        let gaps: Vec<u64> = instants
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![100, 200, 400]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_rejects_after_exactly_seven_attempts() {
        let sender = ScriptedSend::new(vec![429; 16]);
        let client = client_over(Arc::clone(&sender));

        let err = client
            .fetch_raw("https://x.com/_api/web", Method::GET, &RequestOptions::new())
            .await
            .unwrap_err();

        assert_eq!(sender.calls(), 7);
        match err {
            SpError::RetryBudgetExhausted { status, attempts, .. } => {
                assert_eq!(status, 429);
                assert_eq!(attempts, 7);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_status_returned_immediately() {
        let sender = ScriptedSend::new(vec![404]);
        let client = client_over(Arc::clone(&sender));

        let response = client
            .fetch_raw("https://x.com/_api/web", Method::GET, &RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(sender.calls(), 1);
    }

    #[tokio::test]
    async fn test_relative_url_is_rejected_at_dispatch() {
        let sender = ScriptedSend::new(vec![200]);
        let client = client_over(Arc::clone(&sender));

        match client
            .fetch_raw("_api/web", Method::GET, &RequestOptions::new())
            .await
        {
            Err(SpError::ApiUrlUndetermined(url)) => assert_eq!(url, "_api/web"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(sender.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_attaches_digest_for_non_get() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/sites/dev/_api/contextinfo")
            .with_status(200)
            .with_body(
                r#"{"d":{"GetContextWebInformation":{"FormDigestValue":"0xDIGEST","FormDigestTimeoutSeconds":1800}}}"#,
            )
            .create_async()
            .await;
        let web_mock = server
            .mock("POST", "/sites/dev/_api/web/lists")
            .match_header("X-RequestDigest", "0xDIGEST")
            .match_header("Accept", "application/json")
            .with_status(200)
            .with_body(r#"{"d":{"Title":"created"}}"#)
            .create_async()
            .await;

        let context = Arc::new(RuntimeContext::new());
        let client =
            SpHttpClient::new(context, Arc::new(DigestStore::new())).unwrap();

        let url = format!("{}/sites/dev/_api/web/lists", server.url());
        let response = client.post(&url, &RequestOptions::new()).await.unwrap();

        assert_eq!(response.status, 200);
        web_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_skips_digest_when_authorization_present() {
        let mut server = mockito::Server::new_async().await;
        let web_mock = server
            .mock("POST", "/sites/dev/_api/web/lists")
            .match_header("Authorization", "Bearer token")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let context = Arc::new(RuntimeContext::new());
        let client =
            SpHttpClient::new(context, Arc::new(DigestStore::new())).unwrap();

        let url = format!("{}/sites/dev/_api/web/lists", server.url());
        let options = RequestOptions::new().header("Authorization", "Bearer token");
        client.post(&url, &options).await.unwrap();

        web_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_digest_needs_api_marker() {
        let context = Arc::new(RuntimeContext::new());
        let client =
            SpHttpClient::new(context, Arc::new(DigestStore::new())).unwrap();

        match client
            .post("https://x.com/sites/dev/web", &RequestOptions::new())
            .await
        {
            Err(SpError::ApiUrlUndetermined(url)) => {
                assert_eq!(url, "https://x.com/sites/dev/web");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_caller_headers_win_over_defaults() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sites/dev/_api/web")
            .match_header("Accept", "application/json;odata=minimalmetadata")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let context = Arc::new(RuntimeContext::new());
        let client =
            SpHttpClient::new(context, Arc::new(DigestStore::new())).unwrap();

        let url = format!("{}/sites/dev/_api/web", server.url());
        let options =
            RequestOptions::new().header("Accept", "application/json;odata=minimalmetadata");
        client.get(&url, &options).await.unwrap();

        mock.assert_async().await;
    }
}
