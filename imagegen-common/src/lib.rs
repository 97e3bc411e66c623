//! Shared types and external service clients for the image generation pipeline.
//!
//! Each collaborator (object store, inference endpoint, record table) is exposed
//! as a trait with a real AWS-backed implementation and a manual mock that is
//! always available, so services can substitute fakes in tests without patching.

pub mod artifact_store;
pub mod event;
pub mod generation;
pub mod inference;
pub mod keys;
pub mod record_store;
