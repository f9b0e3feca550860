//! # Tessera (Identity & Access Core)
//!
//! `tessera` is the identity and access service for a multi-tenant platform.
//! It owns user credentials, sessions, two-factor authentication, and
//! entity-scoped role membership.
//!
//! ## Tenant Model (Entities)
//!
//! Entities form a tree (for example organization -> team). A membership grants
//! a role on one entity; role resolution walks down the tree so that a role on
//! a parent applies to every descendant. A closer (direct or less distant)
//! membership always wins over an inherited one.
//!
//! ## Authentication
//!
//! - **Passwords** are stored as bcrypt hashes and never logged.
//! - **Sessions** are opaque random tokens delivered as HttpOnly cookies with a
//!   separate refresh token. Refreshing rotates both tokens.
//! - **Two-factor** accounts go through a short-lived pending session after the
//!   password step; the pending session carries no privileges until a TOTP or
//!   backup code is verified.
//!
//! ## Auditing
//!
//! Security-relevant operations append to an audit log inside the same
//! transaction as the change they record. A failed audit write fails the
//! operation.

pub mod api;
pub mod authz;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod jobs;
pub mod mail;
pub mod models;
pub mod password;
pub mod service;
pub mod store;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;
