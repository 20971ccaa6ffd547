use crate::types::{Assignment, AssignmentId, Attempt, AttemptKey, GradeRecord};
use redis::{AsyncCommands, RedisResult};

/// Redis key schema for the grading ledger.
/// API and CLI share these helpers so keys never drift.

pub const ASSIGNMENT_PREFIX: &str = "autograde:assignment";
pub const SLOTS_PREFIX: &str = "autograde:slots";
pub const SEQUENCE_PREFIX: &str = "autograde:seq";
pub const ATTEMPTS_PREFIX: &str = "autograde:attempts";
pub const BEST_PREFIX: &str = "autograde:best";

/// Check-and-increment of the attempt slots, plus the next attempt number.
/// Returns -1 when the limit (ARGV[1], negative for unlimited) is reached.
const RESERVE_SCRIPT: &str = r#"
local used = tonumber(redis.call('GET', KEYS[1]) or '0')
local limit = tonumber(ARGV[1])
if limit >= 0 and used >= limit then
  return -1
end
redis.call('INCR', KEYS[1])
return redis.call('INCR', KEYS[2])
"#;

const RELEASE_SCRIPT: &str = r#"
local used = tonumber(redis.call('GET', KEYS[1]) or '0')
if used > 0 then
  return redis.call('DECR', KEYS[1])
end
return 0
"#;

/// Raises the stored best grade only when ARGV[1] is strictly greater.
const RAISE_BEST_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
local grade = tonumber(ARGV[1])
if current == false or grade > tonumber(current) then
  redis.call('SET', KEYS[1], grade)
  return grade
end
return tonumber(current)
"#;

pub fn assignment_key(id: AssignmentId) -> String {
    format!("{}:{}", ASSIGNMENT_PREFIX, id)
}

pub fn slots_key(key: &AttemptKey) -> String {
    format!("{}:{}", SLOTS_PREFIX, key)
}

pub fn sequence_key(key: &AttemptKey) -> String {
    format!("{}:{}", SEQUENCE_PREFIX, key)
}

pub fn attempts_key(key: &AttemptKey) -> String {
    format!("{}:{}", ATTEMPTS_PREFIX, key)
}

pub fn best_key(key: &AttemptKey) -> String {
    format!("{}:{}", BEST_PREFIX, key)
}

fn encode_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

fn decode_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string()))
}

/// Store a published assignment (with its test unit table)
pub async fn store_assignment(
    conn: &mut redis::aio::ConnectionManager,
    assignment: &Assignment,
) -> RedisResult<()> {
    let payload = serde_json::to_string(assignment).map_err(encode_error)?;
    conn.set(assignment_key(assignment.id), payload).await
}

pub async fn get_assignment(
    conn: &mut redis::aio::ConnectionManager,
    id: AssignmentId,
) -> RedisResult<Option<Assignment>> {
    let payload: Option<String> = conn.get(assignment_key(id)).await?;
    payload
        .map(|data| serde_json::from_str(&data).map_err(decode_error))
        .transpose()
}

/// Atomically reserve one attempt slot.
/// Returns the attempt number, or `None` if `limit` slots are already used.
pub async fn reserve_attempt(
    conn: &mut redis::aio::ConnectionManager,
    key: &AttemptKey,
    limit: Option<u32>,
) -> RedisResult<Option<u32>> {
    let limit_arg: i64 = limit.map(i64::from).unwrap_or(-1);
    let number: i64 = redis::Script::new(RESERVE_SCRIPT)
        .key(slots_key(key))
        .key(sequence_key(key))
        .arg(limit_arg)
        .invoke_async(conn)
        .await?;

    if number < 0 {
        Ok(None)
    } else {
        Ok(Some(number as u32))
    }
}

/// Give back a reserved slot. The attempt sequence is never rewound.
pub async fn release_attempt(
    conn: &mut redis::aio::ConnectionManager,
    key: &AttemptKey,
) -> RedisResult<()> {
    let _: i64 = redis::Script::new(RELEASE_SCRIPT)
        .key(slots_key(key))
        .invoke_async(conn)
        .await?;
    Ok(())
}

/// Append an attempt and raise the best grade; returns the resulting best grade.
pub async fn push_attempt(
    conn: &mut redis::aio::ConnectionManager,
    attempt: &Attempt,
) -> RedisResult<GradeRecord> {
    let key = AttemptKey::new(attempt.student_id, attempt.assignment_id);
    let payload = serde_json::to_string(attempt).map_err(encode_error)?;
    let _: i64 = conn.rpush(attempts_key(&key), payload).await?;

    let best: i64 = redis::Script::new(RAISE_BEST_SCRIPT)
        .key(best_key(&key))
        .arg(i64::from(attempt.grade))
        .invoke_async(conn)
        .await?;
    Ok(GradeRecord::new(key, best.clamp(0, 100) as u8))
}

pub async fn list_attempts(
    conn: &mut redis::aio::ConnectionManager,
    key: &AttemptKey,
) -> RedisResult<Vec<Attempt>> {
    let payloads: Vec<String> = conn.lrange(attempts_key(key), 0, -1).await?;
    let mut attempts = payloads
        .iter()
        .map(|data| serde_json::from_str::<Attempt>(data).map_err(decode_error))
        .collect::<RedisResult<Vec<_>>>()?;
    // Completion order can differ from reservation order.
    attempts.sort_by_key(|a| a.attempt_number);
    Ok(attempts)
}

pub async fn get_best_grade(
    conn: &mut redis::aio::ConnectionManager,
    key: &AttemptKey,
) -> RedisResult<Option<GradeRecord>> {
    let best: Option<i64> = conn.get(best_key(key)).await?;
    Ok(best.map(|g| GradeRecord::new(*key, g.clamp(0, 100) as u8)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_keys_are_scoped_per_student_and_assignment() {
        let key = AttemptKey::new(7, 42);
        assert_eq!(slots_key(&key), "autograde:slots:42:7");
        assert_eq!(sequence_key(&key), "autograde:seq:42:7");
        assert_eq!(attempts_key(&key), "autograde:attempts:42:7");
        assert_eq!(best_key(&key), "autograde:best:42:7");
    }

    #[test]
    fn test_assignment_key_deterministic() {
        assert_eq!(assignment_key(3), assignment_key(3));
        assert_eq!(assignment_key(3), "autograde:assignment:3");
    }

    #[test]
    fn test_keys_differ_between_students() {
        let a = AttemptKey::new(1, 10);
        let b = AttemptKey::new(2, 10);
        assert_ne!(slots_key(&a), slots_key(&b));
        assert_ne!(best_key(&a), best_key(&b));
    }
}
