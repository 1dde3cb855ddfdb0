//! # custodia-contracts
//!
//! Shared types and error taxonomy for the CUSTODIA audit log.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions, the event builder, and error types.

pub mod entry;
pub mod error;
pub mod event;
pub mod verify;
