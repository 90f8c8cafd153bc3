//! List-data collaborator for meetings and agents.
//!
//! Every operation is scoped to the signed-in user: a user never sees or
//! touches another user's rows, and an unknown or foreign id is reported as
//! `NotFound` rather than a permission error.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::error::ConsilioError;
use crate::filter::FilterState;
use crate::models::{Agent, Meeting, Page};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub id: String,
    pub name: String,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMeeting {
    pub name: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingUpdate {
    pub id: String,
    pub name: String,
    pub agent_id: String,
}

#[async_trait]
pub trait MeetingStore: Send + Sync {
    /// Meetings matching `filters`, newest first, paginated from page 1.
    async fn list_meetings(
        &self,
        user_id: &str,
        filters: &FilterState,
        page_size: u32,
    ) -> Result<Page<Meeting>, StoreError>;

    async fn create_meeting(&self, user_id: &str, meeting: NewMeeting) -> Result<Meeting, StoreError>;

    async fn update_meeting(&self, user_id: &str, update: MeetingUpdate) -> Result<Meeting, StoreError>;

    async fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>, StoreError>;

    async fn create_agent(&self, user_id: &str, agent: NewAgent) -> Result<Agent, StoreError>;

    async fn update_agent(&self, user_id: &str, update: AgentUpdate) -> Result<Agent, StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Open the configured backend. PostgreSQL gets its schema applied and its
/// pool handed back alongside the store.
pub async fn open(
    config: &DatabaseConfig,
) -> Result<(Arc<dyn MeetingStore>, Option<PgPool>), ConsilioError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok((Arc::new(MemoryStore::new()), None))
        }
        StoreBackend::Postgres => {
            let pool = crate::db::create_pool(config).await?;
            crate::db::ensure_schema(&pool).await?;
            tracing::info!(max_connections = config.max_connections, "PostgreSQL store ready");
            Ok((Arc::new(PgStore::new(pool.clone())), Some(pool)))
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Zero-based row offset of a 1-based page.
fn page_offset(page: u32, page_size: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(page_size)
}
