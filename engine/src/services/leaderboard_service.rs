use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use super::cache_service::CacheLayer;
use super::notify::{LiveEvent, NotificationHub};
use crate::metrics::LEADERBOARD_BROADCASTS_TOTAL;
use crate::models::{LeaderboardEntry, LeaderboardKind, LeaderboardView, RankedEntry};
use crate::store::LeaderboardStore;

/// Ranked views over total score and max streak, with live push on change.
///
/// Ordering is descending by metric with ties broken ascending by user id, so
/// two backends (and two reads) always agree. `rank_of` for a user outside the
/// top-N is `1 + count(strictly greater values)`: tied users share a rank.
pub struct LeaderboardService {
    store: Arc<dyn LeaderboardStore>,
    cache: Arc<CacheLayer>,
    hub: Arc<NotificationHub>,
    top_n: usize,
}

impl LeaderboardService {
    pub fn new(
        store: Arc<dyn LeaderboardStore>,
        cache: Arc<CacheLayer>,
        hub: Arc<NotificationHub>,
        top_n: usize,
    ) -> Self {
        Self {
            store,
            cache,
            hub,
            top_n,
        }
    }

    /// Upserts the user's entry for one ranking kind, then pushes the fresh
    /// top-N to every live observer. Called only after the underlying state
    /// change has durably committed.
    pub async fn update(
        &self,
        kind: LeaderboardKind,
        user_id: &str,
        username: &str,
        value: i64,
    ) -> Result<()> {
        let entry = LeaderboardEntry {
            user_id: user_id.to_string(),
            username: username.to_string(),
            value,
            updated_at: Utc::now(),
        };
        self.store.upsert(kind, &entry).await?;
        self.cache.invalidate_leaderboards().await;

        let top = self.top_entries(kind).await?;
        LEADERBOARD_BROADCASTS_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();
        self.hub.broadcast(LiveEvent::Leaderboard {
            kind,
            entries: top,
        });
        Ok(())
    }

    /// Top-N with ranks, cache-aside.
    pub async fn top_entries(&self, kind: LeaderboardKind) -> Result<Vec<RankedEntry>> {
        let entries = match self.cache.leaderboard(kind).await {
            Some(entries) => entries,
            None => {
                let entries = self.store.top_n(kind, self.top_n).await?;
                self.cache.put_leaderboard(kind, &entries).await;
                entries
            }
        };

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| RankedEntry {
                rank: i as u64 + 1,
                user_id: entry.user_id,
                username: entry.username,
                value: entry.value,
            })
            .collect())
    }

    /// Rank of one user, or None if they have no entry yet. Served from the
    /// cached top-N when possible, else via the count-based fallback.
    pub async fn rank_of(&self, kind: LeaderboardKind, user_id: &str) -> Result<Option<u64>> {
        let top = self.top_entries(kind).await?;
        if let Some(ranked) = top.iter().find(|e| e.user_id == user_id) {
            return Ok(Some(ranked.rank));
        }

        let entry = match self.store.entry(kind, user_id).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let greater = self.store.count_greater(kind, entry.value).await?;
        Ok(Some(greater + 1))
    }

    /// Full view for one ranking kind: top-N plus the viewer's own entry.
    pub async fn view(
        &self,
        kind: LeaderboardKind,
        viewer: Option<&str>,
    ) -> Result<LeaderboardView> {
        let leaderboard = self.top_entries(kind).await?;

        let viewer_entry = match viewer {
            Some(user_id) => {
                if let Some(in_top) = leaderboard.iter().find(|e| e.user_id == user_id) {
                    Some(in_top.clone())
                } else if let Some(entry) = self.store.entry(kind, user_id).await? {
                    let greater = self.store.count_greater(kind, entry.value).await?;
                    Some(RankedEntry {
                        rank: greater + 1,
                        user_id: entry.user_id,
                        username: entry.username,
                        value: entry.value,
                    })
                } else {
                    None
                }
            }
            None => None,
        };

        Ok(LeaderboardView {
            leaderboard,
            viewer: viewer_entry,
        })
    }
}
