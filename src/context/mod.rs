//
//  sharepoint-client
//  context/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! Runtime Context and Absolute-URL Resolution
//!
//! This module answers the question "which SharePoint deployment is this
//! process talking to". A [`RuntimeContext`] gathers every source a base URL
//! can come from (explicit configuration, a server-rendered page context,
//! or the current browser-style location) and resolves candidate resource
//! URLs to absolute form using a fixed precedence order.
//!
//! [`SpRuntime`] bundles the context with the HTTP transport and a digest
//! store into the single shared handle that every queryable and batch
//! carries.
//!
//! # Resolution Order
//!
//! 1. The candidate is already absolute → used as-is
//! 2. An explicitly configured base URL
//! 3. The page context's web absolute URL, then its server-relative URL
//! 4. The current location truncated at a `/_layouts/` or `/_siteassets/`
//!    marker
//! 5. Otherwise the candidate is returned unchanged; a request against the
//!    unresolved URL fails at dispatch
//!
//! # Example
//!
//! ```rust,no_run
//! use sharepoint_client::context::{RuntimeContext, SpRuntime};
//!
//! # fn main() -> Result<(), sharepoint_client::SpError> {
//! let runtime = SpRuntime::new(
//!     RuntimeContext::new().with_base_url("https://tenant.sharepoint.com/sites/dev"),
//! )?;
//!
//! let lists = runtime.queryable("_api/web/lists");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::Deserialize;

use crate::api::batch::SpBatch;
use crate::api::client::SpHttpClient;
use crate::api::common::{RequestOptions, SpError};
use crate::auth::digest::{default_digest_store, DigestStore};
use crate::query::queryable::Queryable;
use crate::query::url::{combine, is_url_absolute};

/// Server-provided page context information.
///
/// Deserializes from the `_spPageContextInfo` JSON object a classic
/// SharePoint page embeds, carrying the containing web's URLs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageContext {
    /// Absolute URL of the containing web.
    #[serde(default, rename = "webAbsoluteUrl")]
    pub web_absolute_url: Option<String>,

    /// Server-relative URL of the containing web.
    #[serde(default, rename = "webServerRelativeUrl")]
    pub web_server_relative_url: Option<String>,
}

/// Configuration describing the deployment every request is resolved against.
///
/// Built once, shared immutably afterwards. Besides the base-URL sources it
/// carries the globally configured request options (headers applied to every
/// request beneath any per-request options).
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    base_url: Option<String>,
    page_context: Option<PageContext>,
    current_location: Option<String>,
    global_options: RequestOptions,
}

impl RuntimeContext {
    /// Creates an empty context. Without at least one base-URL source, only
    /// queryables built from absolute URLs can be dispatched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the explicitly configured base URL (highest-precedence source).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    /// Sets the server-rendered page context.
    pub fn with_page_context(mut self, page_context: PageContext) -> Self {
        self.page_context = Some(page_context);
        self
    }

    /// Sets the current location string, inspected for `/_layouts/` and
    /// `/_siteassets/` markers as a last-resort base URL source.
    pub fn with_current_location(mut self, location: &str) -> Self {
        self.current_location = Some(location.to_string());
        self
    }

    /// Sets request options applied globally, beneath per-queryable and
    /// per-call options. Only headers are meaningful here; a body on global
    /// options is ignored at dispatch.
    pub fn with_global_options(mut self, options: RequestOptions) -> Self {
        self.global_options = options;
        self
    }

    /// Returns the configured base URL, if any.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Returns the globally configured request options.
    pub fn global_options(&self) -> &RequestOptions {
        &self.global_options
    }

    /// Resolves a possibly-relative URL to absolute form.
    ///
    /// Applies the resolution order documented at module level. Resolution
    /// failure is silent: the candidate is returned unchanged and the
    /// request eventually fails at dispatch against the unresolved URL.
    pub fn resolve_absolute_url(&self, candidate: &str) -> String {
        if is_url_absolute(candidate) {
            return candidate.to_string();
        }

        if let Some(base) = &self.base_url {
            return combine(&[base, candidate]);
        }

        if let Some(page_context) = &self.page_context {
            if let Some(web) = &page_context.web_absolute_url {
                return combine(&[web, candidate]);
            }
            if let Some(web) = &page_context.web_server_relative_url {
                return combine(&[web, candidate]);
            }
        }

        if let Some(location) = &self.current_location {
            let lower = location.to_ascii_lowercase();
            for marker in ["/_layouts/", "/_siteassets/"] {
                if let Some(index) = lower.find(marker) {
                    return combine(&[&location[..index], candidate]);
                }
            }
        }

        candidate.to_string()
    }
}

/// The shared runtime handle carried by every queryable and batch.
///
/// Bundles the [`RuntimeContext`], the retrying HTTP transport and the
/// digest store. Cheap to share: the runtime lives behind an `Arc` and all
/// of its state is immutable after construction (the digest store uses
/// interior mutability).
///
/// # Example
///
/// ```rust,no_run
/// use sharepoint_client::context::{RuntimeContext, SpRuntime};
///
/// # async fn example() -> Result<(), sharepoint_client::SpError> {
/// let runtime = SpRuntime::new(
///     RuntimeContext::new().with_base_url("https://tenant.sharepoint.com/sites/dev"),
/// )?;
///
/// let batch = runtime.create_batch();
/// let pending = runtime.queryable("_api/web").in_batch(&batch).get();
/// batch.execute().await?;
/// let web = pending.await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SpRuntime {
    context: Arc<RuntimeContext>,
    http: SpHttpClient,
}

impl SpRuntime {
    /// Creates a runtime over the process-wide digest store.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(context: RuntimeContext) -> Result<Arc<Self>, SpError> {
        Self::with_digest_store(context, default_digest_store())
    }

    /// Creates a runtime with an isolated digest store.
    ///
    /// Used by tests and by callers that must not share digest state with
    /// the rest of the process.
    pub fn with_digest_store(
        context: RuntimeContext,
        digests: Arc<DigestStore>,
    ) -> Result<Arc<Self>, SpError> {
        let context = Arc::new(context);
        let http = SpHttpClient::new(Arc::clone(&context), digests)?;
        Ok(Arc::new(Self { context, http }))
    }

    /// Builds a queryable rooted at `base` (absolute or relative to the
    /// context's resolved base URL).
    pub fn queryable(self: &Arc<Self>, base: &str) -> Queryable {
        Queryable::from_parts(Arc::clone(self), base, None)
    }

    /// Creates a new, empty batch bound to this runtime.
    pub fn create_batch(self: &Arc<Self>) -> Arc<SpBatch> {
        SpBatch::new(Arc::clone(self))
    }

    /// Returns the HTTP transport.
    pub fn http(&self) -> &SpHttpClient {
        &self.http
    }

    /// Returns the runtime context.
    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_candidate_used_as_is() {
        let context = RuntimeContext::new().with_base_url("https://configured.example.com");
        assert_eq!(
            context.resolve_absolute_url("https://other.example.com/_api/web"),
            "https://other.example.com/_api/web"
        );
    }

    #[test]
    fn test_configured_base_wins_over_page_context() {
        let context = RuntimeContext::new()
            .with_base_url("https://configured.example.com/sites/dev")
            .with_page_context(PageContext {
                web_absolute_url: Some("https://page.example.com".to_string()),
                web_server_relative_url: None,
            });

        assert_eq!(
            context.resolve_absolute_url("_api/web"),
            "https://configured.example.com/sites/dev/_api/web"
        );
    }

    #[test]
    fn test_page_context_absolute_then_relative() {
        let context = RuntimeContext::new().with_page_context(PageContext {
            web_absolute_url: Some("https://page.example.com/sites/dev".to_string()),
            web_server_relative_url: Some("/sites/dev".to_string()),
        });
        assert_eq!(
            context.resolve_absolute_url("_api/web"),
            "https://page.example.com/sites/dev/_api/web"
        );

        let relative_only = RuntimeContext::new().with_page_context(PageContext {
            web_absolute_url: None,
            web_server_relative_url: Some("/sites/dev".to_string()),
        });
        assert_eq!(relative_only.resolve_absolute_url("_api/web"), "sites/dev/_api/web");
    }

    #[test]
    fn test_location_markers() {
        let context = RuntimeContext::new().with_current_location(
            "https://tenant.sharepoint.com/sites/dev/_layouts/15/workbench.aspx",
        );
        assert_eq!(
            context.resolve_absolute_url("_api/web"),
            "https://tenant.sharepoint.com/sites/dev/_api/web"
        );

        let assets = RuntimeContext::new().with_current_location(
            "https://tenant.sharepoint.com/sites/dev/_SiteAssets/page.aspx",
        );
        assert_eq!(
            assets.resolve_absolute_url("_api/web"),
            "https://tenant.sharepoint.com/sites/dev/_api/web"
        );
    }

    #[test]
    fn test_unresolvable_candidate_returned_unchanged() {
        let context = RuntimeContext::new();
        assert_eq!(context.resolve_absolute_url("_api/web"), "_api/web");
    }

    #[test]
    fn test_page_context_deserializes_from_page_shape() {
        let json = r#"{
            "webAbsoluteUrl": "https://tenant.sharepoint.com/sites/dev",
            "webServerRelativeUrl": "/sites/dev",
            "siteAbsoluteUrl": "https://tenant.sharepoint.com"
        }"#;

        let page: PageContext = serde_json::from_str(json).unwrap();
        assert_eq!(
            page.web_absolute_url.as_deref(),
            Some("https://tenant.sharepoint.com/sites/dev")
        );
        assert_eq!(page.web_server_relative_url.as_deref(), Some("/sites/dev"));
    }
}
