//! Bounded-concurrency job pool.
//!
//! Each job is its own tokio task admitted through a counting semaphore;
//! finished results flow to a single collector over a channel sized to the
//! job count, so producers never block on a full queue.
use crate::error::{FlowError, FlowResult};
use crate::invoker::Params;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Concurrency used when the caller passes zero.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// One independent unit of fan-out work.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    pub id: String,
    pub params: Params,
}

impl JobDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: Params::new(),
        }
    }

    pub fn with_params(id: impl Into<String>, params: Params) -> Self {
        Self {
            id: id.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub output: Map<String, Value>,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_duration_ms: f64,
    pub average_duration_ms: f64,
    pub errors: Vec<String>,
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    /// Aggregate collected results. Callers guarantee `results` is non-empty.
    pub fn from_results(results: Vec<JobResult>) -> Self {
        let total = results.len();
        let successful = results.iter().filter(|result| result.success).count();
        let total_duration_ms: f64 = results.iter().map(|result| result.duration_ms).sum();
        let average_duration_ms = if total == 0 {
            0.0
        } else {
            total_duration_ms / total as f64
        };
        let errors = results
            .iter()
            .filter_map(|result| {
                result
                    .error
                    .as_ref()
                    .map(|message| format!("{}: {}", result.id, message))
            })
            .collect();
        Self {
            total,
            successful,
            failed: total - successful,
            total_duration_ms,
            average_duration_ms,
            errors,
            results,
        }
    }

    /// Results ordered by job id, for deterministic rendering.
    pub fn sorted_results(&self) -> Vec<&JobResult> {
        let mut results: Vec<&JobResult> = self.results.iter().collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));
        results
    }
}

/// Run `work` over every job with at most `max_concurrency` in flight.
///
/// Job failures (errors or panics) are recorded in their `JobResult` and
/// never affect siblings. The pool itself fails only on empty input or on
/// cancellation; on cancellation queued jobs are never started and admitted
/// jobs are drained before `FlowError::Cancelled` is returned.
pub async fn run_batch<F, Fut>(
    cancel: &CancellationToken,
    jobs: Vec<JobDescriptor>,
    max_concurrency: usize,
    work: F,
) -> FlowResult<BatchSummary>
where
    F: Fn(CancellationToken, JobDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Map<String, Value>>> + Send + 'static,
{
    if jobs.is_empty() {
        return Err(FlowError::invalid("batch requires at least one job"));
    }
    let limit = if max_concurrency == 0 {
        DEFAULT_MAX_CONCURRENCY
    } else {
        max_concurrency
    };
    let total = jobs.len();
    tracing::debug!(total, limit, "starting batch");

    let semaphore = Arc::new(Semaphore::new(limit));
    let work = Arc::new(work);
    let (tx, mut rx) = mpsc::channel::<JobResult>(total);
    let mut tasks = JoinSet::new();
    let ids: Vec<String> = jobs.iter().map(|job| job.id.clone()).collect();

    for job in jobs {
        let semaphore = semaphore.clone();
        let work = work.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            let id = job.id.clone();
            let start = Instant::now();
            // Build and run the job inside its own task so a panic, whether in
            // `work` itself or in the future it returns, surfaces as a JoinError.
            let outcome = match tokio::spawn(async move { (*work)(cancel, job).await }).await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(anyhow!("job panicked: {join_err}")),
            };
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
            drop(permit);
            let result = match outcome {
                Ok(output) => JobResult {
                    id,
                    success: true,
                    error: None,
                    output,
                    duration_ms,
                },
                Err(err) => {
                    tracing::debug!(job = %id, error = %err, "job failed");
                    JobResult {
                        id,
                        success: false,
                        error: Some(format!("{err:#}")),
                        output: Map::new(),
                        duration_ms,
                    }
                }
            };
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    let mut results = collect(cancel, &mut rx, &mut tasks, total).await?;
    drain(&mut tasks).await;
    fill_missing(&ids, &mut results);

    let summary = BatchSummary::from_results(results);
    tracing::info!(
        total = summary.total,
        successful = summary.successful,
        failed = summary.failed,
        total_duration_ms = summary.total_duration_ms,
        "batch complete"
    );
    Ok(summary)
}

/// Receive job results until every sender is gone or the token fires.
///
/// A cancel that lands once all `total` results are already queued is not a
/// cancellation: the batch finished.
async fn collect(
    cancel: &CancellationToken,
    rx: &mut mpsc::Receiver<JobResult>,
    tasks: &mut JoinSet<()>,
    total: usize,
) -> FlowResult<Vec<JobResult>> {
    let mut results = Vec::with_capacity(total);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                while let Ok(result) = rx.try_recv() {
                    results.push(result);
                }
                if results.len() == total {
                    tracing::debug!(total, "cancel arrived after every job finished");
                    return Ok(results);
                }
                drain(tasks).await;
                // Anything that finished while draining still counts as completed.
                while let Ok(result) = rx.try_recv() {
                    results.push(result);
                }
                tracing::warn!(completed = results.len(), total, "batch cancelled");
                return Err(FlowError::Cancelled {
                    completed: results.len(),
                    total,
                });
            }
            received = rx.recv() => match received {
                Some(result) => results.push(result),
                None => return Ok(results),
            },
        }
    }
}

/// Record a failure for every job whose task ended without reporting.
fn fill_missing(ids: &[String], results: &mut Vec<JobResult>) {
    if results.len() == ids.len() {
        return;
    }
    let mut reported: HashMap<String, usize> = HashMap::new();
    for result in results.iter() {
        *reported.entry(result.id.clone()).or_default() += 1;
    }
    for id in ids {
        if let Some(count) = reported.get_mut(id.as_str()).filter(|count| **count > 0) {
            *count -= 1;
            continue;
        }
        tracing::warn!(job = %id, "job ended without a result");
        results.push(JobResult {
            id: id.clone(),
            success: false,
            error: Some("job ended without reporting a result".to_string()),
            output: Map::new(),
            duration_ms: 0.0,
        });
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            tracing::warn!(error = %err, "batch task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn jobs(ids: &[&str]) -> Vec<JobDescriptor> {
        ids.iter().map(|id| JobDescriptor::new(*id)).collect()
    }

    #[tokio::test]
    async fn empty_job_list_is_rejected() {
        let cancel = CancellationToken::new();
        let err = run_batch(&cancel, Vec::new(), 2, |_, _| async { Ok(Map::new()) })
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn failing_job_is_isolated() {
        let cancel = CancellationToken::new();
        let summary = run_batch(&cancel, jobs(&["p1", "p2", "p3"]), 2, |_, job| async move {
            if job.id == "p2" {
                Err(anyhow!("unreadable"))
            } else {
                let mut output = Map::new();
                output.insert("path".to_string(), json!(job.id));
                Ok(output)
            }
        })
        .await
        .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors, vec!["p2: unreadable".to_string()]);
        assert_eq!(summary.results.len(), 3);
        let ids: Vec<&str> = summary.sorted_results().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn panicking_job_still_produces_a_result() {
        let cancel = CancellationToken::new();
        let summary = run_batch(&cancel, jobs(&["ok", "bad"]), 0, |_, job| async move {
            if job.id == "bad" {
                panic!("exploded");
            }
            Ok(Map::new())
        })
        .await
        .unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.errors[0].starts_with("bad: job panicked"));
    }

    #[tokio::test]
    async fn panic_while_building_the_job_future_is_recorded() {
        let cancel = CancellationToken::new();
        let summary = run_batch(&cancel, jobs(&["ok", "bad"]), 2, |_, job| {
            if job.id == "bad" {
                panic!("exploded before returning a future");
            }
            async { Ok(Map::new()) }
        })
        .await
        .unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.results.len(), 2);
        assert!(summary.errors[0].starts_with("bad: job panicked"));
    }

    #[test]
    fn silent_tasks_are_filled_in_as_failures() {
        let ids = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let mut results = vec![JobResult {
            id: "a".to_string(),
            success: true,
            error: None,
            output: Map::new(),
            duration_ms: 1.0,
        }];
        fill_missing(&ids, &mut results);
        assert_eq!(results.len(), 3);
        let summary = BatchSummary::from_results(results);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 2);
    }

    #[tokio::test]
    async fn cancel_after_every_result_arrived_is_not_a_cancellation() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(2);
        for id in ["a", "b"] {
            tx.send(JobResult {
                id: id.to_string(),
                success: true,
                error: None,
                output: Map::new(),
                duration_ms: 1.0,
            })
            .await
            .unwrap();
        }
        // The sender stays open, so only the token can end collection.
        cancel.cancel();
        let mut tasks = JoinSet::new();
        let results = collect(&cancel, &mut rx, &mut tasks, 2).await.unwrap();
        assert_eq!(results.len(), 2);
        drop(tx);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let ids: Vec<String> = (0..10).map(|i| format!("job-{i:02}")).collect();
        let jobs: Vec<JobDescriptor> = ids.iter().map(JobDescriptor::new).collect();

        let cancel = CancellationToken::new();
        let (in_flight_w, peak_w) = (in_flight.clone(), peak.clone());
        let summary = run_batch(&cancel, jobs, 2, move |_, _| {
            let in_flight = in_flight_w.clone();
            let peak = peak_w.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Map::new())
            }
        })
        .await
        .unwrap();

        assert_eq!(summary.total, 10);
        assert_eq!(summary.successful, 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn averages_match_totals() {
        let cancel = CancellationToken::new();
        let summary = run_batch(&cancel, jobs(&["a", "b", "c", "d"]), 3, |_, _| async {
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(Map::new())
        })
        .await
        .unwrap();
        assert_eq!(summary.successful + summary.failed, summary.total);
        let reconstructed = summary.average_duration_ms * summary.total as f64;
        assert!((reconstructed - summary.total_duration_ms).abs() < 1.0);
    }

    #[tokio::test]
    async fn cancellation_is_reported_not_truncated() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let started = Arc::new(AtomicUsize::new(0));
        let started_w = started.clone();
        let ids: Vec<String> = (0..6).map(|i| format!("slow-{i}")).collect();
        let jobs: Vec<JobDescriptor> = ids.iter().map(JobDescriptor::new).collect();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = run_batch(&cancel, jobs, 1, move |token, _| {
            let started = started_w.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::select! {
                    _ = token.cancelled() => Err(anyhow!("interrupted")),
                    _ = tokio::time::sleep(Duration::from_secs(5)) => Ok(Map::new()),
                }
            }
        })
        .await
        .unwrap_err();

        match err {
            FlowError::Cancelled { completed, total } => {
                assert_eq!(total, 6);
                assert!(completed <= 1);
            }
            other => panic!("expected cancellation, got {other}"),
        }
        // Only the admitted job ever started; queued jobs were never run.
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn summary_from_results_counts_failures() {
        let summary = BatchSummary::from_results(vec![
            JobResult {
                id: "b".to_string(),
                success: false,
                error: Some("bad".to_string()),
                output: Map::new(),
                duration_ms: 3.0,
            },
            JobResult {
                id: "a".to_string(),
                success: true,
                error: None,
                output: Map::new(),
                duration_ms: 1.0,
            },
        ]);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_duration_ms, 4.0);
        assert_eq!(summary.average_duration_ms, 2.0);
        assert_eq!(summary.errors, vec!["b: bad".to_string()]);
    }
}
