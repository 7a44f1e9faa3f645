//! Property-based tests for gateway invariants
//!
//! Cache keys must be stable functions of the logical request, and the
//! split-second timing format must round-trip epoch milliseconds.

pub mod cache_key;
pub mod timing;
