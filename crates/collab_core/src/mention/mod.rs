//! Mention extraction and highlighting.
//!
//! # Responsibility
//! - Turn free text into safe display markup with highlighted mentions.
//! - Produce the candidate name set fed to notification dispatch.
//!
//! # Invariants
//! - Parsing never fails; anything that is not a mention stays text.
//! - Name resolution happens elsewhere (`repo::identity_repo`).

pub mod parser;
