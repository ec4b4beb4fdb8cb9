//! Integration tests for the persistent job store.
//!
//! Tests cover:
//! - Enqueue defaults, duplicates, and the anti-starvation counter
//! - Claim ordering, eligibility, and the at-most-one-claimant guarantee
//! - Settle transitions, idempotent-settle rejection, and retry/DLQ flow
//! - Administrative operations (remove, clear, DLQ, config table)

use std::time::Duration;

use conveyor_core::error::ErrorCode;
use conveyor_core::jobs::{JobId, JobSpec, JobState};
use conveyor_core::store::JobStore;
use tempfile::TempDir;

async fn open_store() -> (TempDir, JobStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::connect(dir.path().join("conveyor.db"))
        .await
        .unwrap();
    (dir, store)
}

fn spec(id: &str, priority: i64) -> JobSpec {
    JobSpec::new(id, "true").with_priority(priority)
}

async fn fetch(store: &JobStore, id: &str) -> conveyor_core::jobs::Job {
    store.get(&JobId::from(id)).await.unwrap().unwrap()
}

// ============================================================================
// Enqueue Tests
// ============================================================================

#[tokio::test]
async fn test_enqueue_applies_builtin_defaults() {
    let (_dir, store) = open_store().await;

    let job = store.enqueue(&JobSpec::new("job1", "echo hi")).await.unwrap();

    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_retries, 3);
    assert_eq!(job.timeout_secs, 20);
    assert_eq!(job.backoff_base, 2);
    assert_eq!(job.priority, 5);
    assert_eq!(job.waiting_time, 0);
    assert!(job.locked_by.is_none());
    assert!(job.next_retry_at.is_none());
}

#[tokio::test]
async fn test_enqueue_duplicate_id_is_rejected() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("job1", 5)).await.unwrap();
    let err = store.enqueue(&spec("job1", 9)).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::DuplicateJob);

    // The original record is untouched.
    let job = store.get(&JobId::from("job1")).await.unwrap().unwrap();
    assert_eq!(job.priority, 5);
}

#[tokio::test]
async fn test_enqueue_ages_waiting_jobs() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("a", 5)).await.unwrap();
    store.enqueue(&spec("b", 5)).await.unwrap();
    store.enqueue(&spec("c", 5)).await.unwrap();

    assert_eq!(fetch(&store, "a").await.waiting_time, 2);
    assert_eq!(fetch(&store, "b").await.waiting_time, 1);
    assert_eq!(fetch(&store, "c").await.waiting_time, 0);
}

#[tokio::test]
async fn test_enqueue_reads_config_table_defaults() {
    let (_dir, store) = open_store().await;

    store.config_set("max-retries", "7").await.unwrap();
    store.config_set("backoff-base", "4").await.unwrap();

    let job = store.enqueue(&JobSpec::new("job1", "true")).await.unwrap();
    assert_eq!(job.max_retries, 7);
    assert_eq!(job.backoff_base, 4);

    // Explicit spec values still win over the config table.
    let job = store
        .enqueue(&JobSpec::new("job2", "true").with_max_retries(1))
        .await
        .unwrap();
    assert_eq!(job.max_retries, 1);
    assert_eq!(job.backoff_base, 4);
}

#[tokio::test]
async fn test_terminal_jobs_do_not_age() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("done", 5)).await.unwrap();
    let claimed = store.claim("w1").await.unwrap().unwrap();
    store.settle_success(&claimed.id, "", 0.1).await.unwrap();

    store.enqueue(&spec("new", 5)).await.unwrap();

    let done = store.get(&JobId::from("done")).await.unwrap().unwrap();
    assert_eq!(done.waiting_time, 0);
}

// ============================================================================
// Claim Tests
// ============================================================================

#[tokio::test]
async fn test_claim_on_empty_store_is_not_an_error() {
    let (_dir, store) = open_store().await;
    assert!(store.claim("w1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_sets_lock_and_processing_state() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("job1", 5)).await.unwrap();
    let job = store.claim("w1").await.unwrap().unwrap();

    assert_eq!(job.state, JobState::Processing);
    assert_eq!(job.locked_by.as_deref(), Some("w1"));
    assert!(job.locked_at.is_some());
    assert!(job.next_retry_at.is_none());

    // A locked job is invisible to other claimants.
    assert!(store.claim("w2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_order_follows_effective_priority_then_age() {
    let (_dir, store) = open_store().await;

    // After the fourth enqueue the waiting times are 3/2/1/0, giving
    // effective priorities 6/7/9/2.
    store.enqueue(&spec("a", 3)).await.unwrap();
    store.enqueue(&spec("b", 5)).await.unwrap();
    store.enqueue(&spec("c", 8)).await.unwrap();
    store.enqueue(&spec("d", 2)).await.unwrap();

    let mut order = Vec::new();
    while let Some(job) = store.claim("w1").await.unwrap() {
        order.push(job.id.to_string());
    }

    assert_eq!(order, vec!["c", "b", "a", "d"]);
}

#[tokio::test]
async fn test_claim_tie_broken_by_oldest() {
    let (_dir, store) = open_store().await;

    // Same user priority; the earlier enqueue accumulates more waiting
    // time and additionally wins any exact tie by age.
    store.enqueue(&spec("first", 5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    store.enqueue(&spec("second", 6)).await.unwrap();

    // Effective priorities: first = 5 + 1 = 6, second = 6 + 0 = 6.
    let job = store.claim("w1").await.unwrap().unwrap();
    assert_eq!(job.id.as_str(), "first");
}

#[tokio::test]
async fn test_at_most_one_claimant_for_a_single_job() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("contested", 5)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim(&format!("worker-{}", i)).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_concurrent_claims_never_hand_out_the_same_job() {
    let (_dir, store) = open_store().await;

    for i in 0..5 {
        store.enqueue(&spec(&format!("job{}", i), 5)).await.unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim(&format!("worker-{}", i)).await.unwrap()
        }));
    }

    let mut claimed: Vec<String> = Vec::new();
    for handle in handles {
        if let Some(job) = handle.await.unwrap() {
            claimed.push(job.id.to_string());
        }
    }

    let before_dedup = claimed.len();
    claimed.sort();
    claimed.dedup();
    assert_eq!(claimed.len(), before_dedup, "a job was claimed twice");
    assert_eq!(claimed.len(), 5);
}

// ============================================================================
// Settle Tests
// ============================================================================

#[tokio::test]
async fn test_settle_success_records_output_and_clears_lock() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("job1", 5)).await.unwrap();
    let job = store.claim("w1").await.unwrap().unwrap();

    store.settle_success(&job.id, "all good", 1.25).await.unwrap();

    let job = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.output.as_deref(), Some("all good"));
    assert_eq!(job.execution_time, Some(1.25));
    assert!(job.locked_by.is_none());
    assert!(job.locked_at.is_none());
}

#[tokio::test]
async fn test_settle_unknown_job_is_not_found() {
    let (_dir, store) = open_store().await;

    let id = JobId::from("ghost");
    let err = store.settle_success(&id, "", 0.0).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::JobNotFound);

    let err = store.settle_failure(&id, "boom", None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::JobNotFound);
}

#[tokio::test]
async fn test_second_settle_is_rejected_and_changes_nothing() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("job1", 5)).await.unwrap();
    let job = store.claim("w1").await.unwrap().unwrap();

    store.settle_success(&job.id, "first", 1.0).await.unwrap();

    let err = store
        .settle_success(&job.id, "second", 2.0)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidStateTransition);

    let err = store
        .settle_failure(&job.id, "late failure", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidStateTransition);

    let job = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.output.as_deref(), Some("first"));
    assert_eq!(job.execution_time, Some(1.0));
    assert!(job.error_message.is_none());
}

#[tokio::test]
async fn test_settle_failure_schedules_retry_with_backoff() {
    let (_dir, store) = open_store().await;

    store
        .enqueue(&JobSpec::new("job1", "false").with_backoff_base(2).with_max_retries(3))
        .await
        .unwrap();
    let job = store.claim("w1").await.unwrap().unwrap();

    let before = chrono::Utc::now();
    store
        .settle_failure(&job.id, "Exit code 1", Some(0.2))
        .await
        .unwrap();

    let job = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.error_message.as_deref(), Some("Exit code 1"));
    assert!(job.locked_by.is_none());

    // First failure: retry ~2s out (backoff_base^1).
    let next = job.next_retry_at.expect("retry must be scheduled");
    let delay = (next - before).num_milliseconds();
    assert!((1900..=2500).contains(&delay), "unexpected delay {}ms", delay);

    // Not claimable while the backoff is cooling down.
    assert!(store.claim("w2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_job_claimable_after_backoff_with_waiting_time_preserved() {
    let (_dir, store) = open_store().await;

    store
        .enqueue(&JobSpec::new("retry-me", "false").with_backoff_base(1))
        .await
        .unwrap();
    // Age the job by one enqueue.
    store.enqueue(&spec("filler", 1)).await.unwrap();

    let job = store.claim("w1").await.unwrap().unwrap();
    assert_eq!(job.waiting_time, 1);
    store.settle_failure(&job.id, "boom", None).await.unwrap();

    // backoff_base 1 → 1s delay.
    assert!(store.claim("w1").await.unwrap().map(|j| j.id.to_string()) != Some("retry-me".into()));
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let job = store.claim("w1").await.unwrap().unwrap();
    assert_eq!(job.id.as_str(), "retry-me");
    assert_eq!(job.attempts, 1);
    assert_eq!(job.waiting_time, 1, "aging survives the retry cycle");
}

#[tokio::test]
async fn test_zero_retries_goes_straight_to_dlq() {
    let (_dir, store) = open_store().await;

    store
        .enqueue(&JobSpec::new("job1", "false").with_max_retries(0))
        .await
        .unwrap();
    let job = store.claim("w1").await.unwrap().unwrap();

    store
        .settle_failure(&job.id, "Exit code 1", Some(0.1))
        .await
        .unwrap();

    let job = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 1);
    assert!(job.next_retry_at.is_none());
    assert!(job.locked_by.is_none());

    // Dead jobs are out of the claim pool.
    assert!(store.claim("w1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_retry_budget_exhaustion_reaches_dlq() {
    let (_dir, store) = open_store().await;

    store
        .enqueue(
            &JobSpec::new("doomed", "false")
                .with_max_retries(1)
                .with_backoff_base(1),
        )
        .await
        .unwrap();

    // Attempt 1 fails: retry scheduled.
    let job = store.claim("w1").await.unwrap().unwrap();
    store.settle_failure(&job.id, "first", None).await.unwrap();
    assert_eq!(
        store.get(&job.id).await.unwrap().unwrap().state,
        JobState::Failed
    );

    tokio::time::sleep(Duration::from_millis(1200)).await;

    // Attempt 2 fails: budget exhausted, job dies.
    let job = store.claim("w1").await.unwrap().unwrap();
    assert_eq!(job.attempts, 1);
    store.settle_failure(&job.id, "second", None).await.unwrap();

    let job = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 2);
    assert_eq!(job.error_message.as_deref(), Some("second"));
}

// ============================================================================
// DLQ Tests
// ============================================================================

async fn kill_job(store: &JobStore, id: &str) {
    store
        .enqueue(&JobSpec::new(id, "false").with_max_retries(0))
        .await
        .unwrap();
    let job = store.claim("w1").await.unwrap().unwrap();
    assert_eq!(job.id.as_str(), id);
    store.settle_failure(&job.id, "Exit code 1", None).await.unwrap();
}

#[tokio::test]
async fn test_dlq_list_is_a_filtered_read() {
    let (_dir, store) = open_store().await;

    kill_job(&store, "dead1").await;
    store.enqueue(&spec("alive", 5)).await.unwrap();

    let dlq = store.dlq_list().await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].id.as_str(), "dead1");
}

#[tokio::test]
async fn test_dlq_retry_resets_job_to_pending() {
    let (_dir, store) = open_store().await;

    kill_job(&store, "dead1").await;
    store.dlq_retry(&JobId::from("dead1")).await.unwrap();

    let job = store.get(&JobId::from("dead1")).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert!(job.error_message.is_none());
    assert!(job.next_retry_at.is_none());
    assert!(job.locked_by.is_none());

    // The job competes for workers again.
    let job = store.claim("w2").await.unwrap().unwrap();
    assert_eq!(job.id.as_str(), "dead1");
}

#[tokio::test]
async fn test_dlq_retry_rejects_non_dead_jobs() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("alive", 5)).await.unwrap();
    let err = store.dlq_retry(&JobId::from("alive")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidStateTransition);

    let err = store.dlq_retry(&JobId::from("ghost")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::JobNotFound);
}

#[tokio::test]
async fn test_dlq_clear_removes_only_dead_jobs() {
    let (_dir, store) = open_store().await;

    kill_job(&store, "dead1").await;
    kill_job(&store, "dead2").await;
    store.enqueue(&spec("alive", 5)).await.unwrap();

    assert_eq!(store.dlq_clear().await.unwrap(), 2);
    assert!(store.dlq_list().await.unwrap().is_empty());
    assert!(store.get(&JobId::from("alive")).await.unwrap().is_some());
}

// ============================================================================
// Administrative Tests
// ============================================================================

#[tokio::test]
async fn test_remove_is_a_no_op_on_unknown_ids() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("job1", 5)).await.unwrap();
    assert!(store.remove(&JobId::from("job1")).await.unwrap());
    assert!(!store.remove(&JobId::from("job1")).await.unwrap());
    assert!(!store.remove(&JobId::from("never-existed")).await.unwrap());
}

#[tokio::test]
async fn test_clear_all_and_counts() {
    let (_dir, store) = open_store().await;

    kill_job(&store, "c").await;
    store.enqueue(&spec("a", 5)).await.unwrap();
    store.enqueue(&spec("b", 5)).await.unwrap();
    let claimed = store.claim("w1").await.unwrap().unwrap();
    store.settle_success(&claimed.id, "", 0.1).await.unwrap();

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.dead, 1);
    assert_eq!(counts.processing, 0);
    assert_eq!(counts.failed, 0);

    assert_eq!(store.clear_all().await.unwrap(), 3);
    assert_eq!(store.counts().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_list_filters_by_state() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("a", 5)).await.unwrap();
    store.enqueue(&spec("b", 5)).await.unwrap();
    let claimed = store.claim("w1").await.unwrap().unwrap();

    let all = store.list(None).await.unwrap();
    assert_eq!(all.len(), 2);

    let pending = store.list(Some(JobState::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1);

    let processing = store.list(Some(JobState::Processing)).await.unwrap();
    assert_eq!(processing.len(), 1);
    assert_eq!(processing[0].id, claimed.id);
}

// ============================================================================
// Config Table Tests
// ============================================================================

#[tokio::test]
async fn test_config_set_get_and_overwrite() {
    let (_dir, store) = open_store().await;

    assert!(store.config_get("max-retries").await.unwrap().is_none());

    store.config_set("max-retries", "5").await.unwrap();
    assert_eq!(
        store.config_get("max-retries").await.unwrap().as_deref(),
        Some("5")
    );

    store.config_set("max-retries", "9").await.unwrap();
    assert_eq!(
        store.config_get("max-retries").await.unwrap().as_deref(),
        Some("9")
    );

    store.config_set("backoff-base", "3").await.unwrap();
    let all = store.config_all().await.unwrap();
    assert_eq!(
        all,
        vec![
            ("backoff-base".to_string(), "3".to_string()),
            ("max-retries".to_string(), "9".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_non_numeric_config_default_is_a_configuration_error() {
    let (_dir, store) = open_store().await;

    store.config_set("max-retries", "many").await.unwrap();
    let err = store.enqueue(&JobSpec::new("job1", "true")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfigurationError);
}

// ============================================================================
// Anti-starvation Property
// ============================================================================

#[tokio::test]
async fn test_waiting_time_grows_by_one_per_enqueue() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("patient", 0)).await.unwrap();

    for i in 0..5 {
        store.enqueue(&spec(&format!("filler{}", i), 50)).await.unwrap();
        let job = store.get(&JobId::from("patient")).await.unwrap().unwrap();
        assert_eq!(job.waiting_time, i + 1);
        assert_eq!(job.effective_priority(), job.waiting_time);
    }
}

#[tokio::test]
async fn test_aged_job_eventually_outranks_a_steady_hot_stream() {
    let (_dir, store) = open_store().await;

    store.enqueue(&spec("old-low", 1)).await.unwrap();

    // A steady stream of priority-8 jobs, each drained as it arrives. The
    // low-priority job gains +1 effective priority per round and wins as
    // soon as it reaches the stream's score: at 8 the age tie-break
    // already favors it.
    let mut winning_round = None;
    for round in 0..10 {
        store
            .enqueue(&spec(&format!("hot{}", round), 8))
            .await
            .unwrap();

        let job = store.claim("w1").await.unwrap().unwrap();
        if job.id.as_str() == "old-low" {
            winning_round = Some(round);
            break;
        }
        assert_eq!(job.id.as_str(), format!("hot{}", round));
        store.settle_success(&job.id, "", 0.0).await.unwrap();
    }

    assert_eq!(winning_round, Some(6));
}
