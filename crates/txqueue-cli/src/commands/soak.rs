//! Concurrent soak run against one shared queue.
//!
//! Every worker is spawned first and parked on a start gate; only once all of
//! them exist does the gate open and they hammer a single `ReservationQueue`.
//! If a spawn fails the gate aborts, so already-parked workers return at once.
//! Afterwards the final counts are compared with what the workload must leave
//! behind if no entry was lost or duplicated.

use crate::config::{SoakConfig, SoakOverrides, Workload};
use crate::support::{init_tracing, pass_fail, print_json_or_exit};
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use txqueue::{QueueError, QueueStats, ReservationQueue};

#[derive(Debug, thiserror::Error)]
pub enum SoakError {
    #[error("worker {worker} failed at iteration {iteration}: {source}")]
    Worker {
        worker: usize,
        iteration: usize,
        #[source]
        source: QueueError,
    },

    #[error("failed to spawn soak worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },

    #[error("worker {worker} panicked")]
    Panicked { worker: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open,
    Aborted,
}

/// One-shot release for parked workers; unlike a counting barrier it can be
/// released before every party has arrived.
struct StartGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl StartGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Closed),
            released: Condvar::new(),
        }
    }

    /// Park until the gate opens or aborts. Returns `true` only when opened.
    fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while *state == GateState::Closed {
            self.released.wait(&mut state);
        }
        *state == GateState::Open
    }

    fn open(&self) {
        self.release(GateState::Open);
    }

    fn abort(&self) {
        self.release(GateState::Aborted);
    }

    fn release(&self, to: GateState) {
        *self.state.lock() = to;
        self.released.notify_all();
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoakReport {
    pub action: &'static str,
    pub workload: Workload,
    pub threads: usize,
    pub iterations: usize,
    pub operations: u64,
    pub elapsed_ms: u64,
    pub expected: QueueStats,
    pub actual: QueueStats,
    pub passed: bool,
    pub generated_at: DateTime<Utc>,
}

impl SoakReport {
    fn new(
        config: &SoakConfig,
        actual: QueueStats,
        elapsed: Duration,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let expected = expected_stats(config);
        let total = (config.threads as u64).saturating_mul(config.iterations as u64);
        Self {
            action: "soak",
            workload: config.workload,
            threads: config.threads,
            iterations: config.iterations,
            operations: total.saturating_mul(config.workload.ops_per_iteration()),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            expected,
            actual,
            passed: actual == expected,
            generated_at,
        }
    }
}

/// Final counts a correct queue must show after `config` has run.
pub fn expected_stats(config: &SoakConfig) -> QueueStats {
    let total = config.threads.saturating_mul(config.iterations);
    match config.workload {
        Workload::Enqueue => QueueStats {
            backlog: total,
            reserved: 0,
            issued: total as u64,
        },
        Workload::Cycle => QueueStats {
            backlog: 0,
            reserved: 0,
            issued: total as u64,
        },
    }
}

pub fn run_soak(config: &SoakConfig) -> Result<SoakReport, SoakError> {
    run_soak_with(config, |worker| {
        Ok(thread::Builder::new().name(format!("soak-worker-{worker}")))
    })
}

/// Run the soak, asking `builder` for the thread builder of each worker.
fn run_soak_with<B>(config: &SoakConfig, builder: B) -> Result<SoakReport, SoakError>
where
    B: Fn(usize) -> io::Result<thread::Builder>,
{
    let capacity = expected_stats(config).backlog.max(config.threads);
    let queue: ReservationQueue<u64> = ReservationQueue::with_capacity(capacity);
    let gate = StartGate::new();

    tracing::info!(
        workload = %config.workload,
        threads = config.threads,
        iterations = config.iterations,
        "soak starting"
    );
    let (outcomes, elapsed) = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(config.threads);
        for worker in 0..config.threads {
            let queue = &queue;
            let gate = &gate;
            let spawned = builder(worker).and_then(|b| {
                b.spawn_scoped(scope, move || {
                    if !gate.wait() {
                        return Ok(());
                    }
                    run_worker(queue, config.workload, config.iterations, worker)
                })
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    gate.abort();
                    tracing::error!(worker, error = %source, "failed to spawn soak worker");
                    return Err(SoakError::Spawn { worker, source });
                }
            }
        }

        let started = Instant::now();
        gate.open();
        let outcomes: Vec<Result<(), SoakError>> = handles
            .into_iter()
            .enumerate()
            .map(|(worker, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(SoakError::Panicked { worker }))
            })
            .collect();
        Ok((outcomes, started.elapsed()))
    })?;

    for outcome in outcomes {
        outcome?;
    }

    let report = SoakReport::new(config, queue.stats(), elapsed, Utc::now());
    if report.passed {
        tracing::info!(elapsed_ms = report.elapsed_ms, "soak finished");
    } else {
        tracing::error!(
            expected = ?report.expected,
            actual = ?report.actual,
            "soak finished with unexpected queue counts"
        );
    }
    Ok(report)
}

fn run_worker(
    queue: &ReservationQueue<u64>,
    workload: Workload,
    iterations: usize,
    worker: usize,
) -> Result<(), SoakError> {
    for iteration in 0..iterations {
        let value = iteration as u64;
        match workload {
            Workload::Enqueue => {
                queue.enqueue(value);
            }
            Workload::Cycle => {
                cycle_once(queue, value).map_err(|source| SoakError::Worker {
                    worker,
                    iteration,
                    source,
                })?;
            }
        }
    }
    tracing::debug!(worker, "soak worker finished");
    Ok(())
}

/// One full reservation round trip.
///
/// Each step before a `create_transaction` leaves one more entry in the
/// backlog than this worker takes out, so the reserves cannot see an empty
/// queue no matter how workers interleave.
fn cycle_once(queue: &ReservationQueue<u64>, value: u64) -> Result<(), QueueError> {
    queue.enqueue(value);
    let reservation = queue.create_transaction()?;
    queue.update_transaction(reservation.key, reservation.value.wrapping_add(1))?;
    queue.discard_transaction(reservation.key)?;
    let reservation = queue.create_transaction()?;
    queue.close_transaction(reservation.key)?;
    Ok(())
}

pub fn run(config_path: Option<String>, overrides: SoakOverrides, json_output: bool) {
    let config = SoakConfig::load(config_path.as_deref().map(Path::new), &overrides)
        .unwrap_or_else(|e| {
            eprintln!("error: {e}");
            std::process::exit(1);
        });
    init_tracing(&config.log_level);

    let report = run_soak(&config).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });

    if json_output {
        print_json_or_exit(&report);
    } else {
        println!("txqueue soak");
        println!();
        println!("  workload: {}", report.workload);
        println!("  threads: {}", report.threads);
        println!("  iterations: {}", report.iterations);
        println!("  operations: {}", report.operations);
        println!("  elapsed: {} ms", report.elapsed_ms);
        println!(
            "  backlog: {} (expected {})",
            report.actual.backlog, report.expected.backlog
        );
        println!(
            "  reserved: {} (expected {})",
            report.actual.reserved, report.expected.reserved
        );
        println!(
            "  issued: {} (expected {})",
            report.actual.issued, report.expected.issued
        );
        println!("  result: {}", pass_fail(report.passed));
    }

    if !report.passed {
        std::process::exit(1);
    }
}
