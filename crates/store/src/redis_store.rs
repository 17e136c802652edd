//! Redis-backed store.
//!
//! Layout under the configured key prefix `p`:
//!
//! | key                         | type   | contents                              |
//! |-----------------------------|--------|---------------------------------------|
//! | `p:tracking:{cid}`          | string | tracking row JSON                     |
//! | `p:tracking:{cid}:version`  | string | tracking version                      |
//! | `p:due`                     | zset   | campaign ids scored by next-due millis|
//! | `p:analyses:{cid}`          | list   | analysis JSON, newest first           |
//! | `p:recommendation:{id}`     | string | recommendation JSON                   |
//! | `p:pending`                 | set    | ids of pending recommendations        |
//! | `p:actions:{cid}`           | list   | auto-apply attempt JSON, oldest first |
//!
//! Multi-key writes run as Lua scripts so each is applied atomically.

use async_trait::async_trait;
use campaign_core::config::RedisConfig;
use campaign_core::{
    Analysis, AppliedAction, CampaignTracking, Decision, Recommendation, StoreError, StoreResult,
};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{decided, sort_queue, AnalysisCommit, AnalysisStore};

/// Returns -2 on success, otherwise the version found (-1 when untracked).
///
/// KEYS: tracking, version, due, analyses, pending, actions, then one key per
/// recommendation. ARGV: expected version, tracking JSON, new version,
/// campaign id, due score, analysis JSON, action count, the action JSONs,
/// then `(json, pending flag, id)` for each recommendation key in order.
const COMMIT_SCRIPT: &str = r#"
local found = tonumber(redis.call('GET', KEYS[2]) or '-1')
if found ~= tonumber(ARGV[1]) then
  return found
end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SET', KEYS[2], ARGV[3])
redis.call('ZADD', KEYS[3], ARGV[5], ARGV[4])
redis.call('LPUSH', KEYS[4], ARGV[6])
local actions = tonumber(ARGV[7])
for i = 1, actions do
  redis.call('RPUSH', KEYS[6], ARGV[7 + i])
end
local base = 8 + actions
for k = 7, #KEYS do
  local j = base + (k - 7) * 3
  redis.call('SET', KEYS[k], ARGV[j])
  if ARGV[j + 1] == '1' then
    redis.call('SADD', KEYS[5], ARGV[j + 2])
  end
end
return -2
"#;

/// Returns 1 when registered, 0 when the campaign already exists.
const TRACK_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
redis.call('ZADD', KEYS[3], ARGV[4], ARGV[3])
return 1
"#;

/// Returns 1 when the recommendation was still pending and is now decided.
const DECIDE_SCRIPT: &str = r#"
if redis.call('SREM', KEYS[2], ARGV[1]) == 1 then
  redis.call('SET', KEYS[1], ARGV[2])
  return 1
end
return 0
"#;

fn backend(error: redis::RedisError) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn due_score(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

#[derive(Debug, Clone)]
struct Keys {
    prefix: String,
}

impl Keys {
    fn tracking(&self, campaign_id: &str) -> String {
        format!("{}:tracking:{campaign_id}", self.prefix)
    }

    fn version(&self, campaign_id: &str) -> String {
        format!("{}:tracking:{campaign_id}:version", self.prefix)
    }

    fn due(&self) -> String {
        format!("{}:due", self.prefix)
    }

    fn analyses(&self, campaign_id: &str) -> String {
        format!("{}:analyses:{campaign_id}", self.prefix)
    }

    fn actions(&self, campaign_id: &str) -> String {
        format!("{}:actions:{campaign_id}", self.prefix)
    }

    fn recommendation_prefix(&self) -> String {
        format!("{}:recommendation:", self.prefix)
    }

    fn recommendation(&self, id: Uuid) -> String {
        format!("{}{id}", self.recommendation_prefix())
    }

    fn pending(&self) -> String {
        format!("{}:pending", self.prefix)
    }
}

pub struct RedisStore {
    conn: ConnectionManager,
    keys: Keys,
    commit_script: Script,
    track_script: Script,
    decide_script: Script,
}

impl RedisStore {
    pub async fn connect(config: &RedisConfig) -> StoreResult<Self> {
        info!(url = %config.url, prefix = %config.key_prefix, "Connecting to Redis");

        let client = redis::Client::open(config.url.as_str()).map_err(backend)?;
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let mut conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Backend(format!("connect timed out after {timeout:?}")))?
            .map_err(backend)?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await.map_err(backend)?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            conn,
            keys: Keys {
                prefix: config.key_prefix.clone(),
            },
            commit_script: Script::new(COMMIT_SCRIPT),
            track_script: Script::new(TRACK_SCRIPT),
            decide_script: Script::new(DECIDE_SCRIPT),
        })
    }

    async fn load_trackings(&self, ids: Vec<String>) -> StoreResult<Vec<CampaignTracking>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.keys.tracking(id)).collect();
        let mut conn = self.conn.clone();
        let rows: Vec<Option<String>> = conn.mget(keys).await.map_err(backend)?;
        rows.into_iter()
            .flatten()
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .collect()
    }

    async fn load_recommendation(&self, id: Uuid) -> StoreResult<Recommendation> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(self.keys.recommendation(id)).await.map_err(backend)?;
        let json = json.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[async_trait]
impl AnalysisStore for RedisStore {
    async fn due_campaigns(&self, now: DateTime<Utc>) -> StoreResult<Vec<CampaignTracking>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore(self.keys.due(), "-inf", due_score(now))
            .await
            .map_err(backend)?;
        debug!(due = ids.len(), "Loaded due campaign ids");
        self.load_trackings(ids).await
    }

    async fn find_campaign(&self, campaign_id: &str) -> StoreResult<Option<CampaignTracking>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(self.keys.tracking(campaign_id)).await.map_err(backend)?;
        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
            .transpose()
    }

    async fn list_campaigns(&self) -> StoreResult<Vec<CampaignTracking>> {
        let mut conn = self.conn.clone();
        let mut ids: Vec<String> = conn.zrange(self.keys.due(), 0, -1).await.map_err(backend)?;
        ids.sort();
        self.load_trackings(ids).await
    }

    async fn track_campaign(&self, tracking: CampaignTracking) -> StoreResult<CampaignTracking> {
        let json = serde_json::to_string(&tracking)?;
        let mut conn = self.conn.clone();
        let created: i64 = self
            .track_script
            .key(self.keys.tracking(&tracking.campaign_id))
            .key(self.keys.version(&tracking.campaign_id))
            .key(self.keys.due())
            .arg(json)
            .arg(tracking.version)
            .arg(&tracking.campaign_id)
            .arg(due_score(tracking.next_analysis_date))
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        if created == 0 {
            return Err(StoreError::AlreadyTracked(tracking.campaign_id));
        }
        info!(campaign_id = %tracking.campaign_id, "Campaign tracked");
        Ok(tracking)
    }

    async fn commit_analysis(&self, commit: AnalysisCommit) -> StoreResult<u64> {
        let AnalysisCommit {
            mut tracking,
            expected_version,
            analysis,
        } = commit;
        let version = expected_version + 1;
        tracking.version = version;
        let campaign_id = tracking.campaign_id.clone();

        let mut invocation = self.commit_script.prepare_invoke();
        invocation
            .key(self.keys.tracking(&campaign_id))
            .key(self.keys.version(&campaign_id))
            .key(self.keys.due())
            .key(self.keys.analyses(&campaign_id))
            .key(self.keys.pending())
            .key(self.keys.actions(&campaign_id))
            .arg(expected_version)
            .arg(serde_json::to_string(&tracking)?)
            .arg(version)
            .arg(&campaign_id)
            .arg(due_score(tracking.next_analysis_date))
            .arg(serde_json::to_string(&analysis)?)
            .arg(analysis.applied_actions.len());
        for action in &analysis.applied_actions {
            invocation.arg(serde_json::to_string(action)?);
        }
        for rec in &analysis.recommendations {
            invocation
                .key(self.keys.recommendation(rec.id))
                .arg(serde_json::to_string(rec)?)
                .arg(if rec.is_pending() { "1" } else { "0" })
                .arg(rec.id.to_string());
        }

        let mut conn = self.conn.clone();
        let result: i64 = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        match result {
            -2 => {
                debug!(campaign_id = %campaign_id, version = version, "Analysis committed");
                Ok(version)
            }
            -1 => Err(StoreError::NotFound(campaign_id)),
            found => {
                metrics::counter!("store.version_conflicts", "backend" => "redis").increment(1);
                Err(StoreError::VersionConflict {
                    campaign_id,
                    expected: expected_version,
                    found: found as u64,
                })
            }
        }
    }

    async fn record_applied_actions(&self, campaign_id: &str, actions: &[AppliedAction]) -> StoreResult<()> {
        if actions.is_empty() {
            return Ok(());
        }
        let rows = actions
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let mut conn = self.conn.clone();
        // one RPUSH with every value is applied atomically
        let _: i64 = conn.rpush(self.keys.actions(campaign_id), rows).await.map_err(backend)?;
        debug!(campaign_id = %campaign_id, count = actions.len(), "Applied actions logged");
        Ok(())
    }

    async fn applied_actions(&self, campaign_id: &str) -> StoreResult<Vec<AppliedAction>> {
        let mut conn = self.conn.clone();
        let rows: Vec<String> = conn
            .lrange(self.keys.actions(campaign_id), 0, -1)
            .await
            .map_err(backend)?;
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    async fn list_analyses(&self, campaign_id: &str, limit: usize) -> StoreResult<Vec<Analysis>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let stop = isize::try_from(limit).unwrap_or(isize::MAX) - 1;
        let rows: Vec<String> = conn
            .lrange(self.keys.analyses(campaign_id), 0, stop)
            .await
            .map_err(backend)?;
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    async fn pending_recommendations(&self, campaign_id: Option<&str>) -> StoreResult<Vec<Recommendation>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.keys.pending()).await.map_err(backend)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids
            .iter()
            .map(|id| format!("{}{id}", self.keys.recommendation_prefix()))
            .collect();
        let rows: Vec<Option<String>> = conn.mget(keys).await.map_err(backend)?;

        let mut pending = Vec::with_capacity(rows.len());
        for json in rows.into_iter().flatten() {
            let rec: Recommendation = serde_json::from_str(&json)?;
            if rec.is_pending() && campaign_id.map_or(true, |cid| rec.campaign_id == cid) {
                pending.push(rec);
            }
        }
        sort_queue(&mut pending);
        Ok(pending)
    }

    async fn decide_recommendation(
        &self,
        id: Uuid,
        decision: Decision,
        actor: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Recommendation> {
        let current = self.load_recommendation(id).await?;
        if !current.is_pending() {
            return Err(StoreError::InvalidStatusTransition {
                id,
                from: current.status,
            });
        }
        let updated = decided(current, decision, actor, at);

        let mut conn = self.conn.clone();
        let applied: i64 = self
            .decide_script
            .key(self.keys.recommendation(id))
            .key(self.keys.pending())
            .arg(id.to_string())
            .arg(serde_json::to_string(&updated)?)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        if applied == 0 {
            // decided concurrently
            let latest = self.load_recommendation(id).await?;
            return Err(StoreError::InvalidStatusTransition {
                id,
                from: latest.status,
            });
        }
        Ok(updated)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = Keys {
            prefix: "optimizer".into(),
        };
        assert_eq!(keys.tracking("123"), "optimizer:tracking:123");
        assert_eq!(keys.version("123"), "optimizer:tracking:123:version");
        assert_eq!(keys.analyses("123"), "optimizer:analyses:123");
        assert_eq!(keys.actions("123"), "optimizer:actions:123");
        let id = Uuid::nil();
        assert_eq!(
            keys.recommendation(id),
            "optimizer:recommendation:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_scripts_only_touch_declared_keys() {
        for script in [COMMIT_SCRIPT, TRACK_SCRIPT, DECIDE_SCRIPT] {
            for call in script.split("redis.call(").skip(1) {
                let target = call.split_once(", ").map(|(_, rest)| rest).unwrap_or_default();
                assert!(target.starts_with("KEYS["), "key not declared in KEYS: {call}");
            }
        }
    }

    #[test]
    fn test_due_score_orders_by_time() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::days(3);
        assert!(due_score(earlier) < due_score(later));
    }
}
