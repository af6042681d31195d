// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Action-keyword routing for the Quarry plugin engine.
//!
//! This crate provides:
//! - [`KeywordIndex`]: immutable forward (keyword to plugins) and reverse
//!   (plugin to keywords) registrations, plus the query builder
//! - [`KeywordRouter`]: the shared, mutable router holding the current index
//!
//! Queries are built and their candidates selected against one index
//! snapshot, so keyword changes never tear an in-flight dispatch.

pub mod index;
pub mod router;

pub use index::KeywordIndex;
pub use router::{KeywordRouter, Route};
