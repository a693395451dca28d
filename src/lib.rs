//
//  sharepoint-client
//  lib.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! # SharePoint REST Client Library
//!
//! A fluent client for the SharePoint REST/OData API. Method chains lazily
//! build a URL, query string and request descriptor, dispatched only when a
//! terminal verb is invoked: either immediately through a retrying
//! transport, or packed with other requests into one multipart OData batch.
//!
//! ## Overview
//!
//! ```rust,no_run
//! use sharepoint_client::context::{RuntimeContext, SpRuntime};
//!
//! # async fn example() -> Result<(), sharepoint_client::SpError> {
//! let runtime = SpRuntime::new(
//!     RuntimeContext::new().with_base_url("https://tenant.sharepoint.com/sites/dev"),
//! )?;
//!
//! // Direct dispatch.
//! let items = runtime
//!     .queryable("_api/web/lists/getByTitle('Tasks')/items")
//!     .select(&["Id", "Title"])
//!     .top(10)
//!     .get()
//!     .await?;
//!
//! // Batched dispatch: queue first, execute once, then read the results.
//! let batch = runtime.create_batch();
//! let web = runtime.queryable("_api/web").in_batch(&batch).get();
//! let lists = runtime.queryable("_api/web/lists").in_batch(&batch).get();
//! batch.execute().await?;
//! let (web, lists) = (web.await?, lists.await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Lazy request building**: URL segments, query options and headers
//!   accumulate without I/O until a terminal verb runs
//! - **OData batching**: heterogeneous requests packed into one
//!   `multipart/mixed` exchange, with GET isolation and grouped change sets
//! - **Digest management**: anti-forgery tokens fetched and cached per site
//!   collection, attached automatically to state-mutating requests
//! - **Throttling resilience**: exponential backoff on 429/503 responses
//! - **Dialect-aware parsing**: verbose and minimal-metadata payloads
//!   normalized behind one parser seam
//!
//! ## Module Structure
//!
//! - [`api`]: Transport, batching, multipart parsing and shared types
//! - [`auth`]: Request digest acquisition and caching
//! - [`query`]: URL assembly and the fluent request builder
//! - [`odata`]: Dialect detection, identity extraction, response parsing
//! - [`context`]: Runtime context and absolute-URL resolution
//! - [`util`]: GUID generation and argument validation

/// Transport, batching, multipart parsing and shared API types.
pub mod api;

/// Request digest acquisition and caching.
pub mod auth;

/// Runtime context and absolute-URL resolution.
pub mod context;

/// OData dialect detection and response parsing.
pub mod odata;

/// URL assembly and the fluent request builder.
pub mod query;

/// Shared utility helpers.
pub mod util;

/// Re-export of the unified error type.
pub use api::common::SpError;

/// Re-export of the request option bundle.
pub use api::common::RequestOptions;

/// Re-export of the batch coordinator and its dependency guard.
pub use api::batch::{BatchDependency, SpBatch};

/// Re-export of the runtime entry points.
pub use context::{PageContext, RuntimeContext, SpRuntime};

/// Re-export of the fluent request builder.
pub use query::queryable::Queryable;

/// Library name constant, used in the user-agent marker.
pub const LIB_NAME: &str = "sharepoint-client";

/// Library version, derived from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
