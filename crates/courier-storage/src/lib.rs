// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Courier delivery engine.
//!
//! WAL-mode SQLite with embedded migrations. Each [`Database`] handle owns one
//! `tokio-rusqlite` background thread; several handles (one per worker
//! process) may share a file, so every read-modify-write runs inside a
//! `BEGIN IMMEDIATE` transaction.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
