//
//  sharepoint-client
//  auth/digest.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! Request Digest Acquisition and Caching
//!
//! Every state-mutating SharePoint request must carry a short-lived
//! anti-forgery token (the "request digest") unless the caller supplied its
//! own digest or bearer authorization. Tokens are obtained from the
//! `/_api/contextinfo` endpoint of a site collection and remain valid for a
//! server-declared number of seconds.
//!
//! [`DigestStore`] caches tokens per site-collection URL. One process-wide
//! store is shared by all transports by default; an isolated store can be
//! injected for tests or for callers that must not share digest state.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sharepoint_client::auth::digest::DigestStore;
//! use sharepoint_client::context::{RuntimeContext, SpRuntime};
//!
//! # fn main() -> Result<(), sharepoint_client::SpError> {
//! // A runtime with digest state isolated from the rest of the process.
//! let runtime = SpRuntime::with_digest_store(
//!     RuntimeContext::new().with_base_url("https://tenant.sharepoint.com/sites/dev"),
//!     Arc::new(DigestStore::new()),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use reqwest::Method;
use serde::Deserialize;

use crate::api::client::SpHttpClient;
use crate::api::common::{RequestOptions, SpError};
use crate::odata::{extract_error_message, unwrap_envelopes};
use crate::query::url::combine;

/// The process-wide default store shared by all transports.
static DEFAULT_STORE: Lazy<Arc<DigestStore>> = Lazy::new(|| Arc::new(DigestStore::new()));

/// Returns the process-wide default digest store.
pub fn default_digest_store() -> Arc<DigestStore> {
    Arc::clone(&DEFAULT_STORE)
}

/// A cached digest token with its expiration instant.
#[derive(Debug, Clone)]
pub struct CachedDigest {
    /// The digest token value, sent as `X-RequestDigest`.
    pub value: String,
    /// Instant after which the token is no longer valid.
    pub expiration: DateTime<Utc>,
}

/// The `GetContextWebInformation` payload of a context-info response.
#[derive(Debug, Deserialize)]
struct ContextWebInformation {
    #[serde(rename = "FormDigestValue")]
    form_digest_value: String,
    #[serde(rename = "FormDigestTimeoutSeconds")]
    form_digest_timeout_seconds: i64,
}

/// Per-site-collection cache of request digest tokens.
///
/// Keys are the exact site-collection URL strings the transport derives by
/// truncating request URLs at their `_api/` segment; no URL normalization is
/// applied. Entries are replaced on refresh and only ever removed by
/// [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct DigestStore {
    entries: Mutex<HashMap<String, CachedDigest>>,
}

impl DigestStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the cache. Used by tests and for explicit invalidation.
    pub fn clear(&self) {
        self.entries.lock().expect("digest store poisoned").clear();
    }

    /// Returns the cached token for `site_url` if present and not expired.
    fn cached(&self, site_url: &str) -> Option<String> {
        let entries = self.entries.lock().expect("digest store poisoned");
        entries
            .get(site_url)
            .filter(|entry| entry.expiration > Utc::now())
            .map(|entry| entry.value.clone())
    }

    /// Obtains a digest token for a site collection.
    ///
    /// Returns the cached token when one exists inside its expiration
    /// window. Otherwise issues a POST to `{site_url}/_api/contextinfo`
    /// with verbose-OData headers, stores the token keyed by the exact
    /// `site_url` string with expiration `now + FormDigestTimeoutSeconds`,
    /// and returns it.
    ///
    /// The context-info call goes through the transport's raw fetch, so it
    /// participates in throttling retries but never recurses into digest
    /// acquisition itself.
    ///
    /// # Errors
    ///
    /// A failed context-info call propagates to the caller; there is no
    /// retry beyond what the transport layer itself performs.
    pub async fn get_digest(
        &self,
        site_url: &str,
        http: &SpHttpClient,
    ) -> Result<String, SpError> {
        if let Some(value) = self.cached(site_url) {
            tracing::debug!(site_url, "digest cache hit");
            return Ok(value);
        }

        tracing::debug!(site_url, "requesting new digest");
        let url = combine(&[site_url, "_api/contextinfo"]);
        let options = RequestOptions::new()
            .header("Accept", "application/json;odata=verbose")
            .header("Content-Type", "application/json;odata=verbose;charset=utf-8");

        let response = http.fetch_raw(&url, Method::POST, &options).await?;
        if !response.is_success() {
            return Err(SpError::Http {
                status: response.status,
                message: extract_error_message(&response.body),
            });
        }

        let parsed: serde_json::Value = serde_json::from_str(&response.body)?;
        let unwrapped = unwrap_envelopes(parsed);
        let info_value = unwrapped
            .get("GetContextWebInformation")
            .cloned()
            .unwrap_or(unwrapped);
        let info: ContextWebInformation = serde_json::from_value(info_value)?;

        let entry = CachedDigest {
            value: info.form_digest_value,
            expiration: Utc::now() + Duration::seconds(info.form_digest_timeout_seconds),
        };
        let value = entry.value.clone();
        self.entries
            .lock()
            .expect("digest store poisoned")
            .insert(site_url.to_string(), entry);

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RuntimeContext, SpRuntime};

    fn isolated_runtime(base_url: &str) -> (Arc<SpRuntime>, Arc<DigestStore>) {
        let store = Arc::new(DigestStore::new());
        let runtime = SpRuntime::with_digest_store(
            RuntimeContext::new().with_base_url(base_url),
            Arc::clone(&store),
        )
        .unwrap();
        (runtime, store)
    }

    fn context_info_body(value: &str, timeout: i64) -> String {
        format!(
            r#"{{"d":{{"GetContextWebInformation":{{"FormDigestValue":"{value}","FormDigestTimeoutSeconds":{timeout}}}}}}}"#
        )
    }

    #[tokio::test]
    async fn test_second_call_within_window_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/_api/contextinfo")
            .with_status(200)
            .with_body(context_info_body("0x1234,valid", 1800))
            .expect(1)
            .create_async()
            .await;

        let (runtime, store) = isolated_runtime(&server.url());
        let site = format!("{}/", server.url());

        let first = store.get_digest(&site, runtime.http()).await.unwrap();
        let second = store.get_digest(&site, runtime.http()).await.unwrap();

        assert_eq!(first, "0x1234,valid");
        assert_eq!(first, second);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed_with_one_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/_api/contextinfo")
            .with_status(200)
            .with_body(context_info_body("0x5678,fresh", 0))
            .expect(2)
            .create_async()
            .await;

        let (runtime, store) = isolated_runtime(&server.url());
        let site = format!("{}/", server.url());

        // Timeout of zero expires the entry immediately, forcing a refresh.
        let first = store.get_digest(&site, runtime.http()).await.unwrap();
        let second = store.get_digest(&site, runtime.http()).await.unwrap();

        assert_eq!(first, "0x5678,fresh");
        assert_eq!(second, "0x5678,fresh");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/_api/contextinfo")
            .with_status(200)
            .with_body(context_info_body("0x9abc,long", 1800))
            .expect(2)
            .create_async()
            .await;

        let (runtime, store) = isolated_runtime(&server.url());
        let site = format!("{}/", server.url());

        store.get_digest(&site, runtime.http()).await.unwrap();
        store.clear();
        store.get_digest(&site, runtime.http()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_context_info_failure_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/_api/contextinfo")
            .with_status(403)
            .with_body(r#"{"odata.error":{"message":{"value":"Access denied"}}}"#)
            .create_async()
            .await;

        let (runtime, store) = isolated_runtime(&server.url());
        let site = format!("{}/", server.url());

        match store.get_digest(&site, runtime.http()).await {
            Err(SpError::Http { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "Access denied");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
