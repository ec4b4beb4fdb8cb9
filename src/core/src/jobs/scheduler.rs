//! Job selection policy.
//!
//! Pure ordering logic for claim selection: jobs are ranked by **effective
//! priority** — `priority + waiting_time` — with ties broken by earliest
//! `created_at`. The store's claim query embeds the same ordering in SQL;
//! this module is the policy's first-class, testable form.
//!
//! Priority alone would starve low-priority jobs forever under a steady
//! stream of higher-priority enqueues. Because `waiting_time` grows with
//! every enqueue a job sits through, any job's score eventually exceeds
//! any fixed competitor, bounding worst-case wait.

use chrono::{DateTime, Utc};

use super::job::{Job, JobState};

/// Effective priority: the sole ranking key for job selection.
pub fn effective_priority(priority: i64, waiting_time: i64) -> i64 {
    priority.saturating_add(waiting_time)
}

/// Whether a job is claimable at `now`.
///
/// Mirrors the store's claim predicate: unlocked, and either pending or
/// failed with an elapsed `next_retry_at`.
pub fn is_claimable_at(job: &Job, now: DateTime<Utc>) -> bool {
    if job.locked_by.is_some() {
        return false;
    }
    match job.state {
        JobState::Pending => true,
        JobState::Failed => job.next_retry_at.map_or(true, |at| at <= now),
        _ => false,
    }
}

/// Select the job a requesting worker should receive from a candidate set.
///
/// Highest effective priority wins; among equals, the oldest job wins.
/// Returns `None` when nothing is claimable.
pub fn select_next<'a>(candidates: &'a [Job], now: DateTime<Utc>) -> Option<&'a Job> {
    candidates
        .iter()
        .filter(|job| is_claimable_at(job, now))
        .max_by(|a, b| {
            a.effective_priority()
                .cmp(&b.effective_priority())
                // older job ranks higher on equal scores
                .then_with(|| b.created_at.cmp(&a.created_at))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobId;
    use chrono::Duration;

    fn job(id: &str, priority: i64, waiting_time: i64, age_secs: i64) -> Job {
        let now = Utc::now();
        Job {
            id: JobId::from(id),
            command: "true".to_string(),
            state: JobState::Pending,
            attempts: 0,
            max_retries: 3,
            timeout_secs: 20,
            backoff_base: 2,
            priority,
            waiting_time,
            created_at: now - Duration::seconds(age_secs),
            updated_at: now,
            next_retry_at: None,
            error_message: None,
            output: None,
            execution_time: None,
            locked_by: None,
            locked_at: None,
        }
    }

    #[test]
    fn test_effective_priority() {
        assert_eq!(effective_priority(5, 0), 5);
        assert_eq!(effective_priority(3, 4), 7);
        assert_eq!(effective_priority(i64::MAX, 1), i64::MAX);
    }

    #[test]
    fn test_select_highest_effective_priority() {
        let now = Utc::now();
        // Effective priorities 6, 7, 9, 2: the aged-out jobs outrank the
        // newest despite lower user priorities.
        let jobs = vec![
            job("a", 3, 3, 40),
            job("b", 5, 2, 30),
            job("c", 8, 1, 20),
            job("d", 2, 0, 10),
        ];
        assert_eq!(select_next(&jobs, now).unwrap().id.as_str(), "c");
    }

    #[test]
    fn test_tie_broken_by_oldest() {
        let now = Utc::now();
        let jobs = vec![job("young", 5, 0, 1), job("old", 5, 0, 100)];
        assert_eq!(select_next(&jobs, now).unwrap().id.as_str(), "old");
    }

    #[test]
    fn test_locked_jobs_are_skipped() {
        let now = Utc::now();
        let mut locked = job("locked", 10, 0, 10);
        locked.state = JobState::Processing;
        locked.locked_by = Some("worker-1".to_string());
        let jobs = vec![locked, job("free", 1, 0, 5)];
        assert_eq!(select_next(&jobs, now).unwrap().id.as_str(), "free");
    }

    #[test]
    fn test_failed_job_gated_on_next_retry_at() {
        let now = Utc::now();

        let mut cooling = job("cooling", 9, 0, 10);
        cooling.state = JobState::Failed;
        cooling.next_retry_at = Some(now + Duration::seconds(60));
        assert!(!is_claimable_at(&cooling, now));

        let mut ready = job("ready", 9, 0, 10);
        ready.state = JobState::Failed;
        ready.next_retry_at = Some(now - Duration::seconds(1));
        assert!(is_claimable_at(&ready, now));

        let jobs = vec![cooling, ready];
        assert_eq!(select_next(&jobs, now).unwrap().id.as_str(), "ready");
    }

    #[test]
    fn test_empty_candidate_set() {
        let now = Utc::now();
        assert!(select_next(&[], now).is_none());

        let mut done = job("done", 5, 0, 10);
        done.state = JobState::Completed;
        assert!(select_next(&[done], now).is_none());
    }
}
