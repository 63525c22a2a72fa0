//! PDF Annotator Cache Library
//!
//! Bounded per-page cache for renderer-supplied page geometry. Only pages
//! within a configurable window around the current page are retained, and
//! the whole cache is invalidated when the document is reloaded.

pub mod window;

pub use window::{CacheGeneration, CacheStats, PageWindowCache};
