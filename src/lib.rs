//! Maturity Store - scoring engine for maturity assessments
//!
//! Takes a flat dataset where each row is one assessed entity and each
//! `<group>.<criterion>` column is a scored criterion, and turns it into a
//! normalized relational store with derived scores, per-category statistics
//! and ranking queries.
//!
//! ## Pipeline
//!
//! ```text
//! dataset.json
//!     ↓ resolver    (column labels -> dimension groups)
//!     ↓ aggregator  (criteria -> dimension, global and composite scores)
//!     ↓ db          (entities, dimension_scores, detail_scores, group_statistics)
//!     ↓ services    (import orchestration, read-only queries, events)
//!     ↓ export      (JSON reports)
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/maturity-store/
//! ├── maturity.db            # SQLite store
//! ├── export/                # JSON reports
//! └── config.toml            # Configuration
//! ```

pub mod aggregator;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod export;
pub mod resolver;
pub mod services;
pub mod views;

pub use config::Config;
pub use dataset::Dataset;
pub use db::AssessmentDb;
pub use error::{ErrorKind, MaturityError};
pub use services::{EntityBreakdown, ImportReport, QueryService, Services};
