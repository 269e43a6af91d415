//! # sitepipe
//!
//! A dependency-aware build pipeline for static content. Point it at a source
//! tree and every file runs through the transformers that accept it, in
//! registration order, before landing in the destination directory.
//!
//! # Architecture: Scan, Classify, Execute, Write
//!
//! ```text
//! 1. Scan      src/          →  SourceEntry*        (walkdir, sorted, lazy)
//! 2. Classify  SourceEntry   →  transformer chain   (pure, registry order)
//! 3. Execute   tasks         →  Artifact*           (waves on the rayon pool)
//! 4. Write     Artifact*     →  _site/              (parallel, per-file errors)
//! ```
//!
//! Files may refer to each other with `@ref(path)` tokens. A token is
//! resolved only once its target has run its whole chain, so a page always
//! links to the *final* name of a stylesheet even when that stylesheet's own
//! transformers rename it (`styles.util.css` → `styles.css`, or a
//! fingerprinted `styles.1a2b3c4d.css`). Tasks waiting on each other in a
//! cycle fail with an error naming every member.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Walks the source root, yields one entry per file and directory |
//! | [`classify`] | Picks each entry's transformer chain and default output path |
//! | [`registry`] | Ordered transformer registration; frozen before a build |
//! | [`transform`] | The `Transformer` trait every build stage implements |
//! | [`engine`] | Task scheduling, reference resolution, cycle detection |
//! | [`reference`] | `@ref(...)` token discovery and substitution |
//! | [`artifact`] | The artifact map (identity → output path) and artifacts |
//! | [`writer`] | Writes artifacts under the destination |
//! | [`layout`] | Page layouts (maud document shell) |
//! | [`transformers`] | Built-in markdown, layout, css-minify, fingerprint |
//! | [`config`] | `sitepipe.toml` loading, merging, and validation |
//! | [`rules`] | Glob / prefix path rules for exclude and passthrough |
//! | [`types`] | Source entries, content types, path helpers |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Registration Order Is Precedence
//!
//! Nothing about a transformer's type decides when it runs. If a utility-CSS
//! compiler has to run before a CSS post-processor, it is registered first.
//! Swapping two lines in `sitepipe.toml` is the whole story.
//!
//! ## Deterministic Waves
//!
//! Completed tasks become visible to others only between waves, in scan
//! order. Thread scheduling therefore never changes which tasks see which
//! outputs, and two builds of the same tree write identical bytes.
//!
//! ## Failures Stay Local
//!
//! A broken reference or a failing transformer fails that one file. Every
//! other file is still built and written, and the build reports all errors
//! together at the end.

pub mod artifact;
pub mod classify;
pub mod config;
pub mod engine;
pub mod layout;
pub mod output;
pub mod reference;
pub mod registry;
pub mod rules;
pub mod scan;
pub mod transform;
pub mod transformers;
pub mod types;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_helpers;
