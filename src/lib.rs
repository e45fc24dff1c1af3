//! txledger - balance lookups and a status-aware transaction ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Ledger
//! - [`transaction`] - Ledger record types and input validation
//! - [`persistence`] - Ledger store (SQLite and in-memory)
//!
//! ## Chain Access
//! - [`chain`] - JSON-RPC client for native balances, token balances and broadcast
//! - [`gateway`] - Concurrent native + token balance lookups
//!
//! ## Integration
//! - [`api`] - REST endpoints
//! - [`node`] - Startup wiring
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger
// ============================================================================
pub mod persistence;
pub mod transaction;

// ============================================================================
// Chain Access
// ============================================================================
pub mod chain;
pub mod gateway;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "api")]
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
