//! Invite Triage: screens pending connection invitations.

pub mod config;
pub mod error;
pub mod llm;
pub mod session;
pub mod testing;
pub mod triage;
