//
//  sharepoint-client
//  api/batch.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! OData Batch Coordination
//!
//! A batch collects request descriptors registered against one batch
//! identity and executes them as a single `multipart/mixed` POST to the
//! `/_api/$batch` endpoint, then distributes the parsed per-part responses
//! back to each descriptor's waiting caller in the order the descriptors
//! were added.
//!
//! ## Change set grouping
//!
//! Consecutive non-GET requests are wrapped together in a nested
//! `changeset_{guid}` boundary, which the server may treat as one atomic
//! unit. Any GET request closes the open change set before being emitted as
//! a standalone part; a later non-GET opens a fresh change set.
//!
//! ## Lifecycle
//!
//! One execution moves through `collecting → serializing → sent → parsing →
//! distributing → done`, with `failed` reachable from the sent, parsing and
//! distributing phases. A batch executes at most once; executing an empty
//! batch resolves immediately with no network call.
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
//! let batch = runtime.create_batch();
//! let lists = runtime.queryable("_api/web/lists").in_batch(&batch).get();
//! let title = runtime.queryable("_api/web/title").in_batch(&batch).get();
//!
//! batch.execute().await?;
//! let (lists, title) = (lists.await?, title.await?);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::Method;
use serde_json::Value;
use tokio::sync::{oneshot, Notify};

use crate::api::client::{client_tag, CLIENT_TAG_HEADER};
use crate::api::common::{RequestOptions, SpError};
use crate::api::multipart::parse_batch_response;
use crate::context::SpRuntime;
use crate::odata::ResponseParser;
use crate::query::url::{combine, is_url_absolute};
use crate::util::new_guid;

/// One pending request inside a batch.
///
/// Owned exclusively by the batch once registered; the originating caller
/// holds only the receiving end of the oneshot channel.
pub(crate) struct QueuedRequest {
    pub url: String,
    pub method: Method,
    pub options: RequestOptions,
    pub parser: Arc<dyn ResponseParser>,
    pub tx: oneshot::Sender<Result<Value, SpError>>,
}

/// Execution phases of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchPhase {
    Collecting,
    Serializing,
    Sent,
    Parsing,
    Distributing,
    Done,
    Failed,
}

struct BatchInner {
    phase: BatchPhase,
    requests: Vec<QueuedRequest>,
}

/// Coordinates one multipart batch exchange.
///
/// Created via [`SpRuntime::create_batch`]; queryables attach to it with
/// [`Queryable::in_batch`](crate::query::queryable::Queryable::in_batch).
/// Dropping an executed batch is inert; dropping a batch that never executed
/// wakes every waiting caller with [`SpError::BatchAbandoned`].
pub struct SpBatch {
    id: String,
    runtime: Arc<SpRuntime>,
    inner: Mutex<BatchInner>,
    dependencies: AtomicUsize,
    drained: Notify,
}

/// A pending-work guard tied to a batch's lifetime.
///
/// Hold one while performing a multi-step resource resolution that will add
/// further requests to the batch; [`SpBatch::execute`] does not serialize
/// until every guard has been released. Release is deterministic: the guard
/// resolves on drop, on every exit path.
#[must_use = "the batch waits until this dependency guard is dropped"]
pub struct BatchDependency {
    batch: Arc<SpBatch>,
}

impl Drop for BatchDependency {
    fn drop(&mut self) {
        if self.batch.dependencies.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.batch.drained.notify_waiters();
        }
    }
}

impl SpBatch {
    /// Creates an empty batch with a fresh boundary GUID.
    pub(crate) fn new(runtime: Arc<SpRuntime>) -> Arc<Self> {
        Arc::new(Self {
            id: new_guid(),
            runtime,
            inner: Mutex::new(BatchInner {
                phase: BatchPhase::Collecting,
                requests: Vec::new(),
            }),
            dependencies: AtomicUsize::new(0),
            drained: Notify::new(),
        })
    }

    /// Returns the batch boundary identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the number of requests currently collected.
    pub fn request_count(&self) -> usize {
        self.inner.lock().expect("batch poisoned").requests.len()
    }

    /// Acquires a pending-work guard that delays execution until dropped.
    pub fn add_dependency(self: &Arc<Self>) -> BatchDependency {
        self.dependencies.fetch_add(1, Ordering::AcqRel);
        BatchDependency {
            batch: Arc::clone(self),
        }
    }

    /// Registers a request, returning the receiver its result arrives on.
    ///
    /// Registration against an already-executed batch resolves the receiver
    /// immediately with an error instead of queueing.
    pub(crate) fn register(
        &self,
        url: String,
        method: Method,
        options: RequestOptions,
        parser: Arc<dyn ResponseParser>,
    ) -> oneshot::Receiver<Result<Value, SpError>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("batch poisoned");
        if inner.phase != BatchPhase::Collecting {
            let _ = tx.send(Err(SpError::BatchFailed(
                "batch has already been executed".to_string(),
            )));
            return rx;
        }

        tracing::debug!(batch = %self.id, %method, url = %url, "queueing batched request");
        inner.requests.push(QueuedRequest {
            url,
            method,
            options,
            parser,
            tx,
        });
        rx
    }

    fn set_phase(&self, phase: BatchPhase) {
        let mut inner = self.inner.lock().expect("batch poisoned");
        tracing::debug!(batch = %self.id, from = ?inner.phase, to = ?phase, "batch phase");
        inner.phase = phase;
    }

    /// Waits until every outstanding [`BatchDependency`] has been released.
    async fn wait_for_dependencies(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            // Register before checking the counter; a release between the
            // check and the await would otherwise be lost.
            drained.as_mut().enable();
            if self.dependencies.load(Ordering::Acquire) == 0 {
                break;
            }
            drained.await;
        }
    }

    /// Executes the batch.
    ///
    /// Resolves immediately when no requests were collected. Otherwise
    /// serializes every collected request into one multipart body, POSTs it
    /// to `{base}/_api/$batch`, parses the multipart response, and resolves
    /// or rejects each request's receiver in original order. Each request's
    /// parser is awaited before the next is processed, so side effects
    /// observe batch order.
    ///
    /// # Errors
    ///
    /// - [`SpError::ApiUrlUndetermined`] when no absolute base URL can be
    ///   resolved for the batch endpoint
    /// - [`SpError::Http`] when the batch POST itself is answered non-2xx
    /// - [`SpError::BatchParse`] for a malformed multipart response or a
    ///   record count that does not match the request count
    ///
    /// On any of these, every collected request is rejected with
    /// [`SpError::BatchFailed`] before the error is returned; no request is
    /// ever left pending.
    pub async fn execute(&self) -> Result<(), SpError> {
        self.wait_for_dependencies().await;

        let requests = {
            let mut inner = self.inner.lock().expect("batch poisoned");
            if inner.phase != BatchPhase::Collecting {
                return Err(SpError::BatchFailed(
                    "batch has already been executed".to_string(),
                ));
            }
            if inner.requests.is_empty() {
                inner.phase = BatchPhase::Done;
                return Ok(());
            }
            inner.phase = BatchPhase::Serializing;
            std::mem::take(&mut inner.requests)
        };

        let base = self.runtime.context().resolve_absolute_url("");
        if !is_url_absolute(&base) {
            self.set_phase(BatchPhase::Failed);
            let error = SpError::ApiUrlUndetermined(base);
            Self::reject_all(requests, &format!("{error}"));
            return Err(error);
        }

        let body = serialize_batch_body(
            &self.id,
            self.runtime.context().global_options(),
            &requests,
        );
        let batch_url = combine(&[&base, "_api/$batch"]);
        let options = RequestOptions::new()
            .header(
                "Content-Type",
                &format!("multipart/mixed; boundary=batch_{}", self.id),
            )
            .with_body(body);

        tracing::debug!(batch = %self.id, requests = requests.len(), url = %batch_url, "executing batch");
        let response = match self
            .runtime
            .http()
            .fetch(&batch_url, Method::POST, &options)
            .await
        {
            Ok(response) => response,
            Err(error) => {
                self.set_phase(BatchPhase::Failed);
                Self::reject_all(requests, &format!("batch POST failed: {error}"));
                return Err(error);
            }
        };
        self.set_phase(BatchPhase::Sent);

        if !response.is_success() {
            self.set_phase(BatchPhase::Failed);
            let error = SpError::Http {
                status: response.status,
                message: crate::odata::extract_error_message(&response.body),
            };
            Self::reject_all(requests, &format!("batch POST failed: {error}"));
            return Err(error);
        }

        self.set_phase(BatchPhase::Parsing);
        let records = match parse_batch_response(&response.body) {
            Ok(records) => records,
            Err(error) => {
                self.set_phase(BatchPhase::Failed);
                Self::reject_all(requests, &format!("{error}"));
                return Err(error);
            }
        };

        if records.len() != requests.len() {
            self.set_phase(BatchPhase::Failed);
            let error = SpError::BatchParse(format!(
                "expected {} responses, parsed {}",
                requests.len(),
                records.len()
            ));
            Self::reject_all(requests, &format!("{error}"));
            return Err(error);
        }

        self.set_phase(BatchPhase::Distributing);
        for (request, record) in requests.into_iter().zip(records) {
            let result = request.parser.parse(record).await;
            if let Err(error) = &result {
                tracing::debug!(batch = %self.id, url = %request.url, %error, "batched request failed");
            }
            let _ = request.tx.send(result);
        }

        self.set_phase(BatchPhase::Done);
        Ok(())
    }

    /// Rejects every collected request with a [`SpError::BatchFailed`]
    /// carrying `message`.
    fn reject_all(requests: Vec<QueuedRequest>, message: &str) {
        for request in requests {
            let _ = request
                .tx
                .send(Err(SpError::BatchFailed(message.to_string())));
        }
    }
}

/// Serializes collected requests into one multipart batch body.
///
/// Emitted headers per part are assembled in layers: globally configured
/// headers, then the request's own headers, then required defaults filled
/// only when absent (`Accept`, the verbose `Content-Type` for non-GET
/// parts, the client tag). A tunneled `X-HTTP-Method` header replaces the
/// verb on the embedded request line and is stripped from the emitted
/// headers.
fn serialize_batch_body(
    batch_id: &str,
    global: &RequestOptions,
    requests: &[QueuedRequest],
) -> String {
    let mut body = String::new();
    let mut change_set_id = String::new();

    for request in requests {
        if request.method == Method::GET {
            if !change_set_id.is_empty() {
                body.push_str(&format!("--changeset_{change_set_id}--\n\n"));
                change_set_id.clear();
            }
            body.push_str(&format!("--batch_{batch_id}\n"));
        } else {
            if change_set_id.is_empty() {
                change_set_id = new_guid();
                body.push_str(&format!("--batch_{batch_id}\n"));
                body.push_str(&format!(
                    "Content-Type: multipart/mixed; boundary=\"changeset_{change_set_id}\"\n\n"
                ));
            }
            body.push_str(&format!("--changeset_{change_set_id}\n"));
        }

        body.push_str("Content-Type: application/http\n");
        body.push_str("Content-Transfer-Encoding: binary\n\n");

        let mut headers = RequestOptions {
            headers: global.headers.clone(),
            body: None,
        };
        headers.merge(&RequestOptions {
            headers: request.options.headers.clone(),
            body: None,
        });

        let mut verb = request.method.as_str().to_string();
        if let Some(tunneled) = headers.remove_header("X-HTTP-Method") {
            verb = tunneled;
        }
        if !headers.has_header("Accept") {
            headers.set_header("Accept", "application/json");
        }
        if request.method != Method::GET && !headers.has_header("Content-Type") {
            headers.set_header("Content-Type", "application/json;odata=verbose;charset=utf-8");
        }
        if !headers.has_header(CLIENT_TAG_HEADER) {
            headers.set_header(CLIENT_TAG_HEADER, &client_tag());
        }

        body.push_str(&format!("{} {} HTTP/1.1\n", verb, request.url));
        for (name, value) in &headers.headers {
            body.push_str(&format!("{name}: {value}\n"));
        }
        body.push('\n');

        if let Some(payload) = &request.options.body {
            body.push_str(&format!("{payload}\n\n"));
        }
    }

    if !change_set_id.is_empty() {
        body.push_str(&format!("--changeset_{change_set_id}--\n\n"));
    }
    body.push_str(&format!("--batch_{batch_id}--\n"));
    body
}
