//! Listing cache keyed by `(user, FilterState)`.
//!
//! An identical filter state hits the cached page; any change to the state is
//! a miss and a fresh fetch. A meeting write invalidates every entry of the
//! writing user. Pages are evicted oldest-first once a user exceeds the
//! configured capacity, and whole users are evicted oldest-first once the
//! cache tracks more than `max_users` of them.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::filter::FilterState;
use crate::models::{Meeting, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

#[derive(Debug, Default)]
struct UserEntries {
    pages: HashMap<FilterState, Page<Meeting>>,
    order: VecDeque<FilterState>,
}

#[derive(Debug, Default)]
struct Entries {
    /// Bumped on every invalidation. A fetch that started under an older
    /// generation is not cached, whichever user was invalidated.
    generation: u64,
    users: HashMap<String, UserEntries>,
    user_order: VecDeque<String>,
}

#[derive(Debug)]
pub struct QueryCache {
    capacity: usize,
    max_users: usize,
    entries: Mutex<Entries>,
}

impl QueryCache {
    pub fn new(capacity: usize, max_users: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            max_users: max_users.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, user_id: &str, filters: &FilterState) -> Option<Page<Meeting>> {
        self.lock()
            .users
            .get(user_id)
            .and_then(|user| user.pages.get(filters).cloned())
    }

    fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Store `page` unless an invalidation happened since `generation`.
    fn insert_at(&self, user_id: &str, filters: FilterState, page: Page<Meeting>, generation: u64) {
        let mut entries = self.lock();
        if entries.generation != generation {
            tracing::debug!(user_id, "Discarding listing fetched before invalidation");
            return;
        }

        if !entries.users.contains_key(user_id) {
            entries.user_order.push_back(user_id.to_string());
        }
        let user = entries.users.entry(user_id.to_string()).or_default();
        if user.pages.insert(filters.clone(), page).is_none() {
            user.order.push_back(filters);
        }
        while user.order.len() > self.capacity {
            if let Some(oldest) = user.order.pop_front() {
                user.pages.remove(&oldest);
            }
        }

        while entries.user_order.len() > self.max_users {
            if let Some(oldest) = entries.user_order.pop_front() {
                entries.users.remove(&oldest);
            }
        }
    }

    pub fn insert(&self, user_id: &str, filters: FilterState, page: Page<Meeting>) {
        let generation = self.generation();
        self.insert_at(user_id, filters, page, generation);
    }

    /// Drop every cached listing of `user_id`.
    pub fn invalidate_user(&self, user_id: &str) {
        let mut entries = self.lock();
        entries.generation += 1;
        if entries.users.remove(user_id).is_some() {
            entries.user_order.retain(|id| id != user_id);
        }
    }

    pub fn len(&self, user_id: &str) -> usize {
        self.lock()
            .users
            .get(user_id)
            .map(|user| user.pages.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }

    /// Number of users with at least one cached page.
    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    /// Return the cached page for `filters`, or run `fetch` and cache its
    /// result. Errors are not cached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        user_id: &str,
        filters: &FilterState,
        fetch: F,
    ) -> Result<(Page<Meeting>, CacheStatus), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Page<Meeting>, E>>,
    {
        if let Some(page) = self.get(user_id, filters) {
            return Ok((page, CacheStatus::Hit));
        }

        let generation = self.generation();
        let page = fetch().await?;
        self.insert_at(user_id, filters.clone(), page.clone(), generation);
        Ok((page, CacheStatus::Miss))
    }
}
