//! Service layer for maturity-store
//!
//! Services sit between the CLI and the repositories:
//!
//! ```text
//! CLI commands (thin)
//!     ↓
//! Service Layer (orchestration, events)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod import_service;
pub mod query_service;

pub use events::{drain_events, EventBus, EventListener, LoggingEventListener, StoreEvent};
pub use import_service::{ImportReport, ImportService, SkippedEntity};
pub use query_service::{EntityBreakdown, QueryService};

use std::sync::Arc;

use crate::config::Config;
use crate::db::AssessmentDb;

/// Service container holding a shared store and event bus
pub struct Services {
    pub import: Arc<ImportService>,
    pub query: Arc<QueryService>,
    pub events: Arc<EventBus>,
    pub db: Arc<AssessmentDb>,
}

impl Services {
    pub fn new(db: Arc<AssessmentDb>, config: Arc<Config>) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            import: Arc::new(ImportService::new(db.clone(), config.clone(), events.clone())),
            query: Arc::new(QueryService::new(db.clone(), config)),
            events,
            db,
        }
    }
}
