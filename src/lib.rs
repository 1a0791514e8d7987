//! # Remote Curator
//!
//! A background curation pipeline for remote hierarchical file stores.
//!
//! One run sweeps the remote namespace exactly once (cycles and multiple
//! parents included), classifies every file into a managed bucket by
//! extension and run-local population, extracts text where it can,
//! deduplicates by content hash and name, and rebuilds a similarity index
//! over the admitted knowledge. Per-item failures quarantine the item and
//! the sweep continues.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────────┐   ┌───────────────┐
//! │  Remote     │──▶│  Pipeline                 │──▶│  State dir     │
//! │  store API  │   │ scan→classify→admit→move │   │ ledger/index  │
//! └────────────┘   └────────────┬─────────────┘   └──────┬────────┘
//!                               │                        │
//!                        ┌──────┴──────┐          ┌──────┴──────┐
//!                        │     CLI     │          │    HTTP     │
//!                        │  (curator)  │          │   server    │
//!                        └─────────────┘          └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`remote`] | Remote store trait, HTTP client, in-memory test double |
//! | [`enumerate`] | Exactly-once namespace traversal |
//! | [`classify`] | Bucket mapping and run-local histogram rule |
//! | [`extract`] | Text extraction (plain, pdf, docx, pptx, xlsx) |
//! | [`ledger`] | Content-hash and name dedup ledger |
//! | [`knowledge`] | Persistent admitted-text store |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Flat similarity index and published snapshots |
//! | [`organize`] | Bucket creation, moves, folder cleanup |
//! | [`pipeline`] | The run body |
//! | [`service`] | Run lifecycle, status, queries |
//! | [`server`] | HTTP control surface |

pub mod classify;
pub mod config;
pub mod embedding;
pub mod enumerate;
pub mod error;
pub mod extract;
pub mod index;
pub mod knowledge;
pub mod ledger;
pub mod models;
pub mod organize;
pub mod pipeline;
pub mod remote;
pub mod server;
pub mod service;
