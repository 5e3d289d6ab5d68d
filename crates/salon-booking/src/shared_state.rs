//! State handed to every HTTP handler.

use std::sync::Arc;

use crate::agent::ChatAgent;
use crate::booking_db::BookingDatabase;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    /// Configuration (read-only after startup)
    pub config: Arc<Config>,
    pub database: Arc<BookingDatabase>,
    /// `None` when no model key is configured.
    pub agent: Option<Arc<ChatAgent>>,
}

impl AppState {
    pub fn new(config: Config, database: Arc<BookingDatabase>, agent: Option<ChatAgent>) -> Self {
        Self {
            config: Arc::new(config),
            database,
            agent: agent.map(Arc::new),
        }
    }
}
