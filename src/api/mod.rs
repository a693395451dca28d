//
//  sharepoint-client
//  api/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! # API Transport Layer
//!
//! Everything between a resolved request descriptor and the wire lives
//! here.
//!
//! ## Architecture
//!
//! - [`client`]: The retrying HTTP transport with digest attachment and
//!   exponential backoff on throttling
//! - [`batch`]: Collection, serialization and demultiplexing of multipart
//!   OData batches
//! - [`multipart`]: The line-oriented parser splitting a multipart batch
//!   response into per-request records
//! - [`common`]: Shared types: the error enum, request options, normalized
//!   responses and paged traversal
//!
//! ## Dispatch paths
//!
//! A request descriptor reaches the network one of two ways: directly
//! through [`client::SpHttpClient::fetch`], or queued into an
//! [`batch::SpBatch`] that later performs one `POST /_api/$batch` for every
//! descriptor it collected. Both paths normalize responses into
//! [`common::RecordedResponse`] before parsing, so callers cannot tell the
//! difference.

/// Retrying HTTP transport.
pub mod client;

/// Batch collection, serialization and response distribution.
pub mod batch;

/// Multipart batch response parsing.
pub mod multipart;

/// Shared API types: errors, options, responses, pagination.
pub mod common;

pub use batch::{BatchDependency, SpBatch};
pub use client::SpHttpClient;
pub use common::{PageCursor, PagedResult, RecordedResponse, RequestOptions, SpError};
pub use multipart::parse_batch_response;
