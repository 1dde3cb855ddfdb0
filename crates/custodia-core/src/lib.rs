//! # custodia-core
//!
//! The trait seam between the CUSTODIA append protocol and its storage
//! backends. Implementations live elsewhere: the in-memory reference store
//! in `custodia-audit`, the SQLite store in `custodia-store`.

pub mod traits;

pub use traits::{AppendOutcome, AuditStore};
