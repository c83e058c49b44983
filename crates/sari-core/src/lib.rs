//! # sari-core
//!
//! Core types for SARI:
//! - Domain enums shared by storage and the HTTP layer
//! - Input validation for names, emails, passwords and post text
//! - One-time email codes and password-reset tokens
//! - Argon2id password hashing
//! - HMAC-signed session tokens
//!
//! This crate has no network code and no storage code.
//! The server crate builds on it.

pub mod codes;
pub mod error;
pub mod model;
pub mod password;
pub mod session;
pub mod validate;
