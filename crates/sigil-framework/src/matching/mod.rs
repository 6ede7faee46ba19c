//! Alias matching.

mod cache;

pub use cache::ModuleCache;
