//
//  sharepoint-client
//  query/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! Request construction: URL assembly and the fluent builder.
//!
//! The [`url`] module holds the pure string helpers (path joining,
//! absolute-URL detection, `_api/` site derivation, alias rewriting);
//! [`queryable`] composes them into the chainable request builder every
//! resource wrapper derives from.

/// Pure URL string helpers.
pub mod url;

/// The fluent request builder.
pub mod queryable;

pub use queryable::Queryable;
