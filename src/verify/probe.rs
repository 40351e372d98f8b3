//! Live verification of a plan against the reachability oracle.
//!
//! Probes run on a bounded rayon pool. Each probe is retried with
//! exponential backoff on failure, and a shared [`CancelToken`] stops the
//! run: anything not yet confirmed is reported as unverified and the run
//! never counts as passed.

use log::{debug, info, warn};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::oracle::{PairExpectation, Reachability, ReachabilityMatrix};
use crate::config::ProbeConfig;
use crate::error::ProbeTimeout;

const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Shared cancellation flag for a verification run
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless cancelled first. Returns false on cancel.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }
}

/// One probe invocation
#[derive(Debug, Clone)]
pub struct ProbeRequest<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub source_ip: Ipv4Addr,
    pub target_ip: Ipv4Addr,
    pub timeout: Duration,
    pub cancel: &'a CancelToken,
}

/// Why a single probe attempt produced no observation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    TimedOut,

    #[error("probe cancelled")]
    Cancelled,

    #[error("probe failed: {0}")]
    Failed(String),
}

/// A reachability check between two hosts of a live network.
///
/// Implementations must honor `request.timeout` and should return
/// [`ProbeError::Cancelled`] promptly once `request.cancel` fires.
pub trait Probe: Sync {
    fn probe(&self, request: &ProbeRequest<'_>) -> Result<Reachability, ProbeError>;
}

/// Outcome for one oracle entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Pass,
    Mismatch { observed: Reachability },
    TimedOut {
        #[serde(serialize_with = "serialize_display")]
        error: ProbeTimeout,
    },
    Failed { error: String },
    /// Never confirmed because the run was cancelled
    Unverified,
}

fn serialize_display<T: std::fmt::Display, S: serde::Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub source: String,
    pub target: String,
    pub expected: Reachability,
    pub outcome: ProbeOutcome,
    pub attempts: u32,
}

/// Results of a verification run, in oracle order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub cancelled: bool,
    pub results: Vec<ProbeResult>,
}

impl VerificationReport {
    /// True only for a complete run where every probe matched the oracle
    pub fn passed(&self) -> bool {
        !self.cancelled && self.results.iter().all(|r| r.outcome == ProbeOutcome::Pass)
    }

    pub fn count(&self, pred: impl Fn(&ProbeOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| r.outcome != ProbeOutcome::Pass)
    }
}

/// Runs oracle probes concurrently with bounded parallelism
#[derive(Debug, Clone)]
pub struct ProbeRunner {
    workers: usize,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl From<&ProbeConfig> for ProbeRunner {
    fn from(config: &ProbeConfig) -> Self {
        Self::new(config.workers, config.timeout).with_retries(config.retries, config.backoff)
    }
}

impl ProbeRunner {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            workers,
            timeout,
            retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Extra attempts after a failed one, waiting `backoff * 2^n` in between
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn run(
        &self,
        oracle: &ReachabilityMatrix,
        probe: &dyn Probe,
        cancel: &CancelToken,
    ) -> Result<VerificationReport, rayon::ThreadPoolBuildError> {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.max(1))
            .thread_name(|i| format!("probe-{}", i))
            .build()?;

        info!(
            "Probing {} host pair(s) with {} worker(s), timeout {:?}",
            oracle.entries.len(),
            self.workers,
            self.timeout
        );

        let results: Vec<ProbeResult> =
            pool.install(|| oracle.entries.par_iter().map(|entry| self.run_one(entry, probe, cancel)).collect());

        let report = VerificationReport {
            cancelled: cancel.is_cancelled(),
            results,
        };
        let passed = report.count(|o| *o == ProbeOutcome::Pass);
        if report.cancelled {
            warn!(
                "Verification cancelled: {} passed, {} unverified",
                passed,
                report.count(|o| *o == ProbeOutcome::Unverified)
            );
        } else {
            info!("Verification finished: {}/{} probe(s) passed", passed, report.results.len());
        }
        Ok(report)
    }

    fn run_one(&self, entry: &PairExpectation, probe: &dyn Probe, cancel: &CancelToken) -> ProbeResult {
        let request = ProbeRequest {
            source: &entry.source,
            target: &entry.target,
            source_ip: entry.source_ip,
            target_ip: entry.target_ip,
            timeout: self.timeout,
            cancel,
        };

        let mut attempts = 0;
        let outcome = loop {
            if cancel.is_cancelled() {
                break ProbeOutcome::Unverified;
            }
            attempts += 1;

            let started = Instant::now();
            let result = match probe.probe(&request) {
                // An answer that arrives past the deadline counts as a timeout
                Ok(_) if started.elapsed() > self.timeout => Err(ProbeError::TimedOut),
                other => other,
            };

            let error = match result {
                Ok(observed) if observed == entry.expected => break ProbeOutcome::Pass,
                Ok(observed) => break ProbeOutcome::Mismatch { observed },
                Err(ProbeError::Cancelled) => break ProbeOutcome::Unverified,
                Err(e) => e,
            };
            debug!(
                "Probe {} -> {} attempt {} failed: {}",
                entry.source, entry.target, attempts, error
            );

            if attempts > self.retries {
                break match error {
                    ProbeError::TimedOut => ProbeOutcome::TimedOut {
                        error: ProbeTimeout {
                            from: entry.source.clone(),
                            to: entry.target.clone(),
                            timeout: self.timeout,
                            attempts,
                        },
                    },
                    other => ProbeOutcome::Failed {
                        error: other.to_string(),
                    },
                };
            }

            let delay = self.backoff.saturating_mul(1u32 << (attempts - 1).min(16));
            if !cancel.sleep(delay) {
                break ProbeOutcome::Unverified;
            }
        };

        ProbeResult {
            source: entry.source.clone(),
            target: entry.target.clone(),
            expected: entry.expected,
            outcome,
            attempts,
        }
    }
}
