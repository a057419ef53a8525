//! Content-addressed result cache for expensive extraction calls.
//!
//! One JSON record per source document, written next to the source as
//! `<source>.cache.json`. Records are keyed by the source's resolved path
//! only, never by its contents: a source edited in place keeps hitting its
//! old record. [`ResultCache::load`] logs when the stored digest no longer
//! matches, but still serves the record.
//!
//! **Access rules:**
//! - a missing, unreadable, or undecodable record is a miss, never an error
//! - records are only ever written or overwritten, never deleted
//! - writes go through a temp file and a rename, so a record is never torn

mod cache;

pub use cache::{CACHE_SCHEMA_VERSION, CACHE_SUFFIX, CacheRecord, ResultCache, sha256_hex, write_atomic};
