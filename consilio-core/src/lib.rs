pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod form;
pub mod gate;
pub mod listing;
pub mod models;
pub mod schema;
pub mod store;

pub use auth::{AuthBackend, AuthError, HttpAuthClient, SocialProvider};
pub use cache::{CacheStatus, QueryCache};
pub use config::ConsilioConfig;
pub use error::ConsilioError;
pub use filter::{FilterPatch, FilterState, FilterStore, UrlFilterStore, DEFAULT_PAGE};
pub use form::{FormMachine, FormState};
pub use gate::{GateDecision, PageKind};
pub use listing::{ListingController, ListingSource, ListingView};
pub use schema::{Schema, ValidationErrors};
pub use store::{MeetingStore, MemoryStore, PgStore, StoreError};
