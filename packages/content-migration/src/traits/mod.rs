//! Collaborator contracts consumed by the orchestrator.

pub mod index;
pub mod provider;
pub mod source;
pub mod transformer;
