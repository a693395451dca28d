//
//  sharepoint-client
//  auth/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! Authentication concerns of the client.
//!
//! SharePoint's write protection is the request digest: a short-lived
//! anti-forgery token attached as `X-RequestDigest` to every state-mutating
//! request that does not carry its own digest or bearer authorization. The
//! [`digest`] module owns acquiring and caching those tokens.

/// Request digest acquisition and per-site-collection caching.
pub mod digest;

pub use digest::{default_digest_store, CachedDigest, DigestStore};
