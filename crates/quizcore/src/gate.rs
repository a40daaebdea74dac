//! Channel-subscription gate with a short-lived membership cache.

use crate::error::AppResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Default cache lifetime for a membership answer
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// A user's standing in the required channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Creator,
    Administrator,
    Member,
    /// Restricted users may or may not still be in the channel
    Restricted { is_member: bool },
    Left,
    Banned,
}

impl MembershipStatus {
    pub fn is_subscribed(self) -> bool {
        match self {
            MembershipStatus::Creator | MembershipStatus::Administrator | MembershipStatus::Member => true,
            MembershipStatus::Restricted { is_member } => is_member,
            MembershipStatus::Left | MembershipStatus::Banned => false,
        }
    }
}

/// Looks up channel membership on the messaging platform.
#[async_trait]
pub trait MembershipProbe: Send + Sync {
    async fn membership(&self, user_id: i64) -> AppResult<MembershipStatus>;
}

struct CachedStatus {
    subscribed: bool,
    cached_at: Instant,
}

/// Cached membership check used to gate quiz access.
pub struct SubscriptionGate {
    probe: Option<Arc<dyn MembershipProbe>>,
    enabled: bool,
    ttl: Duration,
    cache: Mutex<HashMap<i64, CachedStatus>>,
}

impl SubscriptionGate {
    pub fn new(probe: Arc<dyn MembershipProbe>, enabled: bool, ttl: Duration) -> Self {
        Self {
            probe: Some(probe),
            enabled,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Gate that lets everyone through without any I/O.
    pub fn disabled() -> Self {
        Self {
            probe: None,
            enabled: false,
            ttl: DEFAULT_TTL,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the user currently counts as subscribed.
    ///
    /// Answers from the cache while the entry is younger than the TTL.
    pub async fn is_subscribed(&self, user_id: i64) -> bool {
        if !self.enabled {
            return true;
        }

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&user_id) {
                if entry.cached_at.elapsed() < self.ttl {
                    return entry.subscribed;
                }
            }
        }

        self.query(user_id).await
    }

    /// Re-query the platform, ignoring any cached answer.
    pub async fn refresh(&self, user_id: i64) -> bool {
        if !self.enabled {
            return true;
        }
        self.query(user_id).await
    }

    async fn query(&self, user_id: i64) -> bool {
        let Some(probe) = &self.probe else {
            return true;
        };
        match probe.membership(user_id).await {
            Ok(status) => {
                let subscribed = status.is_subscribed();
                log::debug!("Membership for user {}: {:?}", user_id, status);
                self.cache.lock().await.insert(
                    user_id,
                    CachedStatus {
                        subscribed,
                        cached_at: Instant::now(),
                    },
                );
                subscribed
            }
            Err(e) => {
                // Fail open and leave the cache alone.
                log::warn!("Membership check failed for user {}: {}", user_id, e);
                true
            }
        }
    }

    /// Drop expired entries.
    pub async fn cleanup(&self) {
        let mut cache = self.cache.lock().await;
        cache.retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }
}
