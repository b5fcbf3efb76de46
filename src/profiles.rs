use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::credentials::Credentials;
use crate::graph::{GraphClient, UserProfile};

/// In-memory cache of user profiles, keyed by user id.
///
/// Policy: a cached profile is never refreshed or evicted while the process
/// runs. Only successful fetches are stored, so a user who got the fallback
/// name is looked up again on their next message. With `max_entries` set,
/// profiles fetched after the cache is full are returned but not stored.
pub struct ProfileCache {
    entries: RwLock<HashMap<String, UserProfile>>,
    max_entries: Option<usize>,
}

impl ProfileCache {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    pub async fn get(&self, user_id: &str) -> Option<UserProfile> {
        self.entries.read().await.get(user_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Store a profile unless one is already cached for the user or the cache
    /// is full. Returns the profile that is cached afterwards, if any.
    async fn store(&self, user_id: &str, profile: UserProfile) -> Option<UserProfile> {
        let mut entries = self.entries.write().await;
        // Two concurrent misses for one user both fetch; the first write wins.
        if let Some(existing) = entries.get(user_id) {
            return Some(existing.clone());
        }
        if let Some(max) = self.max_entries {
            if entries.len() >= max {
                debug!("Profile cache full ({} entries), not caching {}", max, user_id);
                return None;
            }
        }
        entries.insert(user_id.to_string(), profile.clone());
        Some(profile)
    }

    /// Return the profile of `user_id` as seen by `page_id`, fetching it from
    /// the Graph API on a cache miss. Never fails: every error degrades to
    /// [`UserProfile::fallback`].
    pub async fn resolve(
        &self,
        graph: &GraphClient,
        credentials: &Credentials,
        user_id: &str,
        page_id: &str,
    ) -> UserProfile {
        if let Some(profile) = self.get(user_id).await {
            return profile;
        }

        let Some(access_token) = credentials.resolve(page_id) else {
            return UserProfile::fallback(user_id);
        };

        match graph.user_profile(user_id, access_token).await {
            Ok(profile) => self.store(user_id, profile.clone()).await.unwrap_or(profile),
            Err(e) => {
                warn!("Failed to fetch profile of user {}: {:#}", user_id, e);
                UserProfile::fallback(user_id)
            }
        }
    }
}
