//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate persistence contracts into the comment, mention and
//!   notification use cases.
//! - Keep presentation callers decoupled from storage details.
//!
//! # Invariants
//! - Services depend on repository traits, never on concrete adapters.
//! - Secondary effects (mention dispatch, read confirmation) never fail the
//!   primary action.

pub mod comment_thread;
pub mod mention_dispatch;
pub mod notification_center;
