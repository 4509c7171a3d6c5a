//! Core library for `mitl`.
//!
//! `mitl` turns a project directory into a reproducible container image
//! (a "capsule") and runs commands inside it, caching aggressively: the
//! capsule is named by a deterministic content digest of the project, and
//! per-project dependency artifacts persist in named volumes keyed by
//! lockfile hashes.
//!
//! This library exists to share code between the `mitl` binary and the
//! integration tests; it is not a supported public API.

pub mod capsule;
pub mod config;
pub mod detect;
pub mod digest;
pub mod error;
pub mod fs;
pub mod hydrate;
pub mod ignore;
pub mod lockfile;
pub mod normalize;
pub mod recipe;
pub mod run;
pub mod runtime;
pub mod volume;
