//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into workflow use-cases.
//! - Keep CLI and other callers decoupled from storage details.

pub mod carrier_locks;
pub mod document_service;
pub mod movement_engine;
