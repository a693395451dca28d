//
//  sharepoint-client
//  query/queryable.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! The Fluent Request Builder
//!
//! A [`Queryable`] accumulates a resource URL, a parent-URL reference and an
//! ordered query-string mapping, and converts chained configuration into one
//! request descriptor when a terminal verb is invoked. Every resource
//! wrapper an application defines is a thin layer over this type: derive a
//! child with a URL fragment, add query options, dispatch.
//!
//! ## Parent inference
//!
//! SharePoint URLs embed OData keys in parentheses
//! (`.../items(19)/fields`), which must not be treated as path boundaries.
//! When a queryable is built from a string, its parent URL is inferred by
//! three rules evaluated in order:
//!
//! 1. An absolute URL, or one containing no `/`, is its own parent and the
//!    path segment is appended
//! 2. If the last `/` occurs after the last `(`, split at the last `/`
//!    (`.../items(19)/fields` → parent `.../items(19)`)
//! 3. Otherwise split at the last `(` (`.../items(19)` → parent `.../items`)
//!
//! ## Dispatch
//!
//! Terminal verbs build the descriptor synchronously. With a batch attached
//! the descriptor is queued immediately and the returned future resolves
//! when the batch executes; without one, the returned future performs the
//! exchange through the retrying transport when awaited.
//!
//! # Example
//!
//! ```rust,no_run
//! use sharepoint_client::context::{RuntimeContext, SpRuntime};
//!
//! # async fn example() -> Result<(), sharepoint_client::SpError> {
//! let runtime = SpRuntime::new(
//!     RuntimeContext::new().with_base_url("https://tenant.sharepoint.com/sites/dev"),
//! )?;
//!
//! let items = runtime
//!     .queryable("_api/web/lists/getByTitle('Tasks')/items")
//!     .select(&["Id", "Title"])
//!     .filter("Status eq 'Open'")
//!     .order_by("Id", true)
//!     .top(10)
//!     .get()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::api::batch::{BatchDependency, SpBatch};
use crate::api::common::{PageCursor, RequestOptions, SpError};
use crate::context::SpRuntime;
use crate::odata::{ODataDefaultParser, ResponseParser};
use crate::query::url::{combine, is_url_absolute, resolve_aliases};

/// A fully resolved request descriptor, ready for dispatch or queueing.
pub(crate) struct RequestContext {
    pub url: String,
    pub method: Method,
    pub options: RequestOptions,
    pub parser: Arc<dyn ResponseParser>,
    /// Held until the descriptor has been handed off, so an attached batch
    /// cannot execute mid-construction.
    pub dependency: Option<BatchDependency>,
}

/// Where a descriptor went when the terminal verb ran.
enum Routed {
    Queued(oneshot::Receiver<Result<Value, SpError>>),
    Direct {
        runtime: Arc<SpRuntime>,
        url: String,
        method: Method,
        options: RequestOptions,
        parser: Arc<dyn ResponseParser>,
    },
}

/// The fluent request builder.
///
/// Each derived queryable owns its own URL and query state; deriving never
/// shares mutable state with the source. Cloning is cheap: the runtime and
/// any attached batch are shared handles.
#[derive(Clone)]
pub struct Queryable {
    url: String,
    parent_url: String,
    query: IndexMap<String, String>,
    options: RequestOptions,
    runtime: Arc<SpRuntime>,
    batch: Option<Arc<SpBatch>>,
}

impl Queryable {
    /// Builds a queryable from a string base, inferring the parent URL by
    /// the three rules documented at module level.
    pub fn from_parts(runtime: Arc<SpRuntime>, base: &str, path: Option<&str>) -> Self {
        let path = path.unwrap_or("");
        let slash = base.rfind('/').map(|i| i as i64).unwrap_or(-1);
        let paren = base.rfind('(').map(|i| i as i64).unwrap_or(-1);

        let (parent_url, url) = if is_url_absolute(base) || slash < 0 {
            (base.to_string(), combine(&[base, path]))
        } else if slash > paren {
            let index = slash as usize;
            let parent = base[..index].to_string();
            let tail = combine(&[&base[index..], path]);
            let url = combine(&[&parent, &tail]);
            (parent, url)
        } else {
            let index = paren as usize;
            (base[..index].to_string(), combine(&[base, path]))
        };

        Self {
            url,
            parent_url,
            query: IndexMap::new(),
            options: RequestOptions::new(),
            runtime,
            batch: None,
        }
    }

    /// Derives a child queryable from a parent.
    ///
    /// The child is rooted at the parent's URL with `path` appended, and
    /// inherits the parent's configured options, batch attachment and any
    /// cross-site `@target` parameter. Query options do not carry over: the
    /// child addresses a different resource.
    pub fn from_parent(parent: &Queryable, path: Option<&str>) -> Self {
        let mut child = Self {
            url: combine(&[&parent.url, path.unwrap_or("")]),
            parent_url: parent.url.clone(),
            query: IndexMap::new(),
            options: parent.options.clone(),
            runtime: Arc::clone(&parent.runtime),
            batch: parent.batch.clone(),
        };
        if let Some(target) = parent.query.get("@target") {
            child.query.insert("@target".to_string(), target.clone());
        }
        child
    }

    /// Returns the accumulated resource URL (before query resolution).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the immediate containing resource's URL.
    pub fn parent_url(&self) -> &str {
        &self.parent_url
    }

    /// Returns the accumulated query mapping.
    pub fn query(&self) -> &IndexMap<String, String> {
        &self.query
    }

    /// Merges request options applied at dispatch; later merges override
    /// earlier ones per key.
    pub fn configure(mut self, options: RequestOptions) -> Self {
        self.options.merge(&options);
        self
    }

    /// Adds or replaces an arbitrary query parameter.
    pub fn query_param(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    /// Sets the `$filter` expression. Repeated calls overwrite.
    pub fn filter(self, expression: &str) -> Self {
        self.query_param("$filter", expression)
    }

    /// Sets `$select`, joining multiple fields with `,`. Repeated calls
    /// overwrite.
    pub fn select(self, selects: &[&str]) -> Self {
        let joined = selects.join(",");
        self.query_param("$select", &joined)
    }

    /// Sets `$expand`, joining multiple relations with `,`. Repeated calls
    /// overwrite.
    pub fn expand(self, expands: &[&str]) -> Self {
        let joined = expands.join(",");
        self.query_param("$expand", &joined)
    }

    /// Appends an ordering clause to `$orderby`.
    ///
    /// Unlike the other options, repeated calls accumulate clauses into one
    /// comma-separated value.
    pub fn order_by(mut self, field: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        let clause = format!("{field} {direction}");
        let value = match self.query.get("$orderby") {
            Some(existing) => format!("{existing},{clause}"),
            None => clause,
        };
        self.query.insert("$orderby".to_string(), value);
        self
    }

    /// Sets `$skip`. Repeated calls overwrite.
    pub fn skip(self, count: u32) -> Self {
        self.query_param("$skip", &count.to_string())
    }

    /// Sets `$top`. Repeated calls overwrite.
    pub fn top(self, count: u32) -> Self {
        self.query_param("$top", &count.to_string())
    }

    /// Attaches this queryable to a batch: terminal verbs queue into the
    /// batch instead of dispatching immediately.
    pub fn in_batch(mut self, batch: &Arc<SpBatch>) -> Self {
        self.batch = Some(Arc::clone(batch));
        self
    }

    /// Guards an operation that requires multiple sequential round trips.
    ///
    /// Such operations cannot take part in a batch (their later requests
    /// depend on earlier responses), so invoking one on a batched queryable
    /// fails synchronously with [`SpError::NotSupportedInBatch`], before
    /// anything is queued.
    pub fn ensure_not_batched(&self, operation: &'static str) -> Result<(), SpError> {
        if self.batch.is_some() {
            return Err(SpError::NotSupportedInBatch(operation));
        }
        Ok(())
    }

    /// Derives a queryable for the parent resource, inheriting configured
    /// options and any cross-site `@target` parameter.
    pub fn get_parent(&self, path: Option<&str>) -> Queryable {
        let mut parent = Queryable::from_parts(Arc::clone(&self.runtime), &self.parent_url, path);
        parent.options = self.options.clone();
        if let Some(target) = self.query.get("@target") {
            parent
                .query
                .insert("@target".to_string(), target.clone());
        }
        parent
    }

    /// Derives a sibling/child queryable from this one's URL.
    ///
    /// Inherits configured options and `@target`; the current batch
    /// attachment is carried over only when `include_batch` is set.
    pub fn spawn(&self, additional_path: Option<&str>, include_batch: bool) -> Queryable {
        let mut derived = Queryable::from_parts(Arc::clone(&self.runtime), &self.url, additional_path);
        derived.options = self.options.clone();
        if let Some(target) = self.query.get("@target") {
            derived
                .query
                .insert("@target".to_string(), target.clone());
        }
        if include_batch {
            derived.batch = self.batch.clone();
        }
        derived
    }

    /// Resolves aliased parameters and serializes the URL plus query string.
    ///
    /// A value written as `'!@label::value'` is rewritten to a reference
    /// (`@label`) with the literal extracted into its own query parameter;
    /// the remaining entries are concatenated as `key=value` pairs joined
    /// by `&`.
    pub fn to_url_and_query(&self) -> String {
        let (url, resolved) = resolve_aliases(&self.url, &self.query);
        if resolved.is_empty() {
            return url;
        }
        let query = resolved
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{url}?{query}")
    }

    /// Converts the accumulated state into a request descriptor.
    ///
    /// The URL is resolved to absolute form through the runtime context,
    /// per-call options are merged over the queryable's configured options,
    /// and, when a batch is attached, a dependency token is acquired so
    /// the batch cannot execute before the descriptor is handed off.
    pub(crate) fn to_request_context(
        &self,
        method: Method,
        options: RequestOptions,
        parser: Arc<dyn ResponseParser>,
    ) -> RequestContext {
        let candidate = self.to_url_and_query();
        let url = self.runtime.context().resolve_absolute_url(&candidate);
        let mut merged = self.options.clone();
        merged.merge(&options);
        let dependency = self.batch.as_ref().map(SpBatch::add_dependency);
        RequestContext {
            url,
            method,
            options: merged,
            parser,
            dependency,
        }
    }

    /// Builds the descriptor and routes it: queued into the attached batch
    /// (synchronously, preserving insertion order) or kept for direct
    /// dispatch. The dependency token is released on every path once the
    /// descriptor has been handed off.
    fn route(
        &self,
        method: Method,
        options: RequestOptions,
        parser: Arc<dyn ResponseParser>,
    ) -> Routed {
        let context = self.to_request_context(method, options, parser);
        match &self.batch {
            Some(batch) => {
                let receiver = batch.register(
                    context.url,
                    context.method,
                    context.options,
                    context.parser,
                );
                drop(context.dependency);
                Routed::Queued(receiver)
            }
            None => Routed::Direct {
                runtime: Arc::clone(&self.runtime),
                url: context.url,
                method: context.method,
                options: context.options,
                parser: context.parser,
            },
        }
    }

    /// Dispatches with an explicit verb, options and result parser.
    ///
    /// This is the generic terminal every convenience verb delegates to.
    pub fn request_with_parser(
        &self,
        method: Method,
        options: RequestOptions,
        parser: Arc<dyn ResponseParser>,
    ) -> impl Future<Output = Result<Value, SpError>> + Send + 'static {
        let routed = self.route(method, options, parser);
        async move {
            match routed {
                Routed::Queued(receiver) => match receiver.await {
                    Ok(result) => result,
                    Err(_) => Err(SpError::BatchAbandoned),
                },
                Routed::Direct {
                    runtime,
                    url,
                    method,
                    options,
                    parser,
                } => {
                    let response = runtime.http().fetch(&url, method, &options).await?;
                    parser.parse(response).await
                }
            }
        }
    }

    /// Performs a GET and parses the OData payload.
    pub fn get(&self) -> impl Future<Output = Result<Value, SpError>> + Send + 'static {
        self.request_with_parser(
            Method::GET,
            RequestOptions::new(),
            Arc::new(ODataDefaultParser),
        )
    }

    /// Performs a GET and deserializes the payload into `T`.
    pub fn get_as<T: DeserializeOwned>(
        &self,
    ) -> impl Future<Output = Result<T, SpError>> + Send + 'static {
        let pending = self.get();
        async move {
            let value = pending.await?;
            Ok(serde_json::from_value(value)?)
        }
    }

    /// Performs a POST with the given options (headers and body).
    pub fn post(
        &self,
        options: RequestOptions,
    ) -> impl Future<Output = Result<Value, SpError>> + Send + 'static {
        self.request_with_parser(Method::POST, options, Arc::new(ODataDefaultParser))
    }

    /// Performs a PATCH with the given options.
    pub fn patch(
        &self,
        options: RequestOptions,
    ) -> impl Future<Output = Result<Value, SpError>> + Send + 'static {
        self.request_with_parser(Method::PATCH, options, Arc::new(ODataDefaultParser))
    }

    /// Deletes the resource.
    ///
    /// Emitted as a POST tunneling the verb through `X-HTTP-Method`, with
    /// `IF-Match: *`, which is how the service expects deletions.
    pub fn delete(&self) -> impl Future<Output = Result<Value, SpError>> + Send + 'static {
        let options = RequestOptions::new()
            .header("X-HTTP-Method", "DELETE")
            .header("IF-Match", "*");
        self.request_with_parser(Method::POST, options, Arc::new(ODataDefaultParser))
    }

    /// Returns a lazy page cursor over this queryable's collection.
    ///
    /// Pages are fetched on demand; see [`PageCursor`].
    pub fn pages(&self) -> PageCursor {
        let candidate = self.to_url_and_query();
        let start = self.runtime.context().resolve_absolute_url(&candidate);
        PageCursor::new(Arc::clone(&self.runtime), start)
    }
}
