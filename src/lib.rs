//! # Diagram Stream
//!
//! Client side of a repository-to-diagram generation service.
//!
//! A generation session asks the backend for a cost estimate, opens a
//! server-sent event stream, reassembles the explanation, component mapping
//! and Mermaid diagram as they arrive, reports monotonic progress, and caches
//! the finished artifact in SQLite so the next request for the same
//! repository is served locally.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Backend    │──▶│ SSE decoder  │──▶│ Accumulator  │
//! │ (HTTP, SSE)  │   │   (core)     │   │ + progress   │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                     ┌────────────────────────┤
//!                     ▼                        ▼
//!               ┌──────────┐            ┌──────────────┐
//!               │  SQLite  │            │  Reporters   │
//!               │  cache   │            │ (stderr/JSON)│
//!               └──────────┘            └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dgs init                          # create the cache database
//! dgs generate octo demo            # cached or freshly generated diagram
//! dgs regenerate octo demo --instructions "focus on the API layer"
//! dgs show octo demo --diagram-only
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`backend`] | Generation backend trait |
//! | [`client`] | reqwest backend implementation |
//! | [`session`] | Session controller and snapshots |
//! | [`progress`] | Progress reporters |
//! | [`sqlite_cache`] | SQLite artifact cache |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`generate`] | `generate` / `regenerate` / `modify` / `cost` commands |
//! | [`show`] | `show` command |

pub mod backend;
pub mod client;
pub mod config;
pub mod db;
pub mod generate;
pub mod migrate;
pub mod progress;
pub mod session;
pub mod show;
pub mod sqlite_cache;
