/// Attempt Ledger Storage
///
/// The per-(student, assignment) ledger is the only shared mutable state of
/// the engine. Every implementation must make `reserve` atomic: concurrent
/// callers can never hold more than `limit` slots.
///
/// **Ledger fields:**
/// - slots: reserved or recorded attempts counted against the limit
/// - sequence: monotonic attempt number source, never rewound
/// - attempts: recorded attempts
/// - best: highest recorded grade, only raised

use crate::error::StoreError;
use async_trait::async_trait;
use autograde_common::redis as keys;
use autograde_common::types::{Assignment, AssignmentId, Attempt, AttemptKey, GradeRecord};
use dashmap::DashMap;
use tracing::debug;

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn save_assignment(&self, assignment: &Assignment) -> Result<(), StoreError>;

    async fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError>;

    /// Reserve one slot; `None` once `limit` slots are taken. Returns the attempt number.
    async fn reserve(&self, key: &AttemptKey, limit: Option<u32>) -> Result<Option<u32>, StoreError>;

    /// Give a reserved slot back without recording anything.
    async fn release(&self, key: &AttemptKey) -> Result<(), StoreError>;

    /// Persist an attempt and raise the best grade; returns the resulting record.
    async fn record(&self, attempt: &Attempt) -> Result<GradeRecord, StoreError>;

    /// Recorded attempts ordered by attempt number.
    async fn attempts(&self, key: &AttemptKey) -> Result<Vec<Attempt>, StoreError>;

    /// `None` until the first attempt is recorded.
    async fn best_grade(&self, key: &AttemptKey) -> Result<Option<GradeRecord>, StoreError>;
}

#[derive(Debug, Default)]
struct Ledger {
    slots: u32,
    sequence: u32,
    attempts: Vec<Attempt>,
    best: Option<u8>,
}

/// Process-local store; used by the CLI and tests.
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    assignments: DashMap<AssignmentId, Assignment>,
    ledgers: DashMap<AttemptKey, Ledger>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn save_assignment(&self, assignment: &Assignment) -> Result<(), StoreError> {
        self.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        Ok(self.assignments.get(&id).map(|a| a.clone()))
    }

    async fn reserve(&self, key: &AttemptKey, limit: Option<u32>) -> Result<Option<u32>, StoreError> {
        // The entry guard holds the shard lock for the whole check-and-increment
        let mut ledger = self.ledgers.entry(*key).or_default();
        if limit.is_some_and(|limit| ledger.slots >= limit) {
            return Ok(None);
        }
        ledger.slots += 1;
        ledger.sequence += 1;
        Ok(Some(ledger.sequence))
    }

    async fn release(&self, key: &AttemptKey) -> Result<(), StoreError> {
        if let Some(mut ledger) = self.ledgers.get_mut(key) {
            ledger.slots = ledger.slots.saturating_sub(1);
        }
        Ok(())
    }

    async fn record(&self, attempt: &Attempt) -> Result<GradeRecord, StoreError> {
        let key = AttemptKey::new(attempt.student_id, attempt.assignment_id);
        let mut ledger = self.ledgers.entry(key).or_default();
        ledger.attempts.push(attempt.clone());
        ledger.attempts.sort_by_key(|a| a.attempt_number);

        let best = match ledger.best {
            Some(best) if best >= attempt.grade => best,
            _ => attempt.grade,
        };
        ledger.best = Some(best);
        Ok(GradeRecord::new(key, best))
    }

    async fn attempts(&self, key: &AttemptKey) -> Result<Vec<Attempt>, StoreError> {
        Ok(self
            .ledgers
            .get(key)
            .map(|ledger| ledger.attempts.clone())
            .unwrap_or_default())
    }

    async fn best_grade(&self, key: &AttemptKey) -> Result<Option<GradeRecord>, StoreError> {
        Ok(self
            .ledgers
            .get(key)
            .and_then(|ledger| ledger.best)
            .map(|best| GradeRecord::new(*key, best)))
    }
}

/// Redis-backed store; atomicity comes from server-side Lua scripts.
#[derive(Clone)]
pub struct RedisAttemptStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisAttemptStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        debug!(url = redis_url, "Connected attempt store to Redis");
        Ok(Self { conn })
    }

    pub fn from_connection(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl AttemptStore for RedisAttemptStore {
    async fn save_assignment(&self, assignment: &Assignment) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::store_assignment(&mut conn, assignment).await?)
    }

    async fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::get_assignment(&mut conn, id).await?)
    }

    async fn reserve(&self, key: &AttemptKey, limit: Option<u32>) -> Result<Option<u32>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::reserve_attempt(&mut conn, key, limit).await?)
    }

    async fn release(&self, key: &AttemptKey) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::release_attempt(&mut conn, key).await?)
    }

    async fn record(&self, attempt: &Attempt) -> Result<GradeRecord, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::push_attempt(&mut conn, attempt).await?)
    }

    async fn attempts(&self, key: &AttemptKey) -> Result<Vec<Attempt>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::list_attempts(&mut conn, key).await?)
    }

    async fn best_grade(&self, key: &AttemptKey) -> Result<Option<GradeRecord>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::get_best_grade(&mut conn, key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn attempt(key: &AttemptKey, number: u32, grade: u8) -> Attempt {
        Attempt {
            submission_id: Uuid::new_v4(),
            student_id: key.student_id,
            assignment_id: key.assignment_id,
            suite_version: 1,
            attempt_number: number,
            grade,
            earned_points: u32::from(grade),
            total_points: 100,
            partial: false,
            breakdown: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_reserve_respects_limit_and_release() {
        let store = MemoryAttemptStore::new();
        let key = AttemptKey::new(1, 10);

        assert_eq!(store.reserve(&key, Some(2)).await.unwrap(), Some(1));
        assert_eq!(store.reserve(&key, Some(2)).await.unwrap(), Some(2));
        assert_eq!(store.reserve(&key, Some(2)).await.unwrap(), None);

        store.release(&key).await.unwrap();
        // Numbers are never reused after a release
        assert_eq!(store.reserve(&key, Some(2)).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_unlimited_reserve() {
        let store = MemoryAttemptStore::new();
        let key = AttemptKey::new(1, 10);
        for expected in 1..=20 {
            assert_eq!(store.reserve(&key, None).await.unwrap(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_exceed_limit() {
        let store = Arc::new(MemoryAttemptStore::new());
        let key = AttemptKey::new(5, 9);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.reserve(&key, Some(3)).await.unwrap() })
            })
            .collect();

        let mut granted = Vec::new();
        for handle in handles {
            if let Some(number) = handle.await.unwrap() {
                granted.push(number);
            }
        }
        granted.sort();
        assert_eq!(granted, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_best_grade_only_rises() {
        let store = MemoryAttemptStore::new();
        let key = AttemptKey::new(2, 3);

        assert_eq!(store.best_grade(&key).await.unwrap(), None);
        assert_eq!(store.record(&attempt(&key, 1, 60)).await.unwrap().best_grade, 60);
        assert_eq!(store.record(&attempt(&key, 2, 40)).await.unwrap().best_grade, 60);
        assert_eq!(store.record(&attempt(&key, 3, 90)).await.unwrap().best_grade, 90);

        let record = store.best_grade(&key).await.unwrap().unwrap();
        assert_eq!(record, GradeRecord::new(key, 90));
        assert_eq!((record.student_id, record.assignment_id), (2, 3));
    }

    #[tokio::test]
    async fn test_attempts_are_ordered_by_number() {
        let store = MemoryAttemptStore::new();
        let key = AttemptKey::new(2, 3);
        store.record(&attempt(&key, 2, 10)).await.unwrap();
        store.record(&attempt(&key, 1, 20)).await.unwrap();

        let numbers: Vec<u32> = store.attempts(&key).await.unwrap().iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert!(store.attempts(&AttemptKey::new(9, 9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_reserve_is_atomic() {
        let store = Arc::new(RedisAttemptStore::connect("redis://127.0.0.1:6379").await.unwrap());
        let key = AttemptKey::new(rand_id(), rand_id());

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.reserve(&key, Some(2)).await.unwrap() })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                granted += 1;
            }
        }
        assert_eq!(granted, 2);

        store.release(&key).await.unwrap();
        assert_eq!(store.reserve(&key, Some(2)).await.unwrap(), Some(3));
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_records_and_raises_best() {
        let store = RedisAttemptStore::connect("redis://127.0.0.1:6379").await.unwrap();
        let key = AttemptKey::new(rand_id(), rand_id());

        assert_eq!(store.record(&attempt(&key, 2, 80)).await.unwrap().best_grade, 80);
        assert_eq!(store.record(&attempt(&key, 1, 50)).await.unwrap().best_grade, 80);

        let attempts = store.attempts(&key).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].attempt_number, 1);
        assert_eq!(store.best_grade(&key).await.unwrap(), Some(GradeRecord::new(key, 80)));
    }

    fn rand_id() -> i64 {
        (Uuid::new_v4().as_u128() % 1_000_000_000) as i64
    }
}
