//! Background reclamation of idle, over-seeded and over-quota swarms.
//!
//! Each sweep enumerates the engine's swarms, drops those idle longer than
//! the inactivity TTL or seeded past the ratio ceiling, then drops the
//! least recently used survivors until completed bytes fit the storage
//! quota. The byte total is rebuilt from engine stats on every sweep.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::access::AccessTracker;
use crate::swarm::{InfoHash, SwarmEngine};

/// Limits enforced by every sweep. Fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionPolicy {
    /// Swarms idle longer than this are dropped
    pub inactivity_ttl: Duration,
    /// Swarms whose upload/download ratio reaches this are dropped
    pub max_ratio: f64,
    /// Ceiling on completed bytes across all swarms
    pub storage_quota: u64,
    pub sweep_interval: Duration,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            inactivity_ttl: Duration::from_secs(15 * 60),
            max_ratio: 2.0,
            storage_quota: gigabytes_to_bytes(50.0),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Converts a (possibly fractional) gigabyte count to bytes.
pub fn gigabytes_to_bytes(gigabytes: f64) -> u64 {
    (gigabytes.max(0.0) * 1024.0 * 1024.0 * 1024.0) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    Inactive,
    RatioExceeded,
    QuotaExceeded,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub evicted: Vec<(InfoHash, EvictionReason)>,
    /// Swarms the engine failed to drop; they stay registered
    pub drop_failures: Vec<InfoHash>,
    /// Completed bytes across every enumerated swarm
    pub bytes_before: u64,
    /// Completed bytes across swarms still registered after the sweep
    pub bytes_after: u64,
    /// Access records dropped because the engine no longer has the swarm
    pub pruned_records: usize,
}

impl SweepReport {
    pub fn evicted_for(&self, reason: EvictionReason) -> usize {
        self.evicted.iter().filter(|(_, r)| *r == reason).count()
    }
}

struct Candidate {
    info_hash: InfoHash,
    bytes_completed: u64,
    last_access: Instant,
}

/// Runs sweeps against a swarm engine and the shared access tracker.
#[derive(Clone)]
pub struct EvictionEngine {
    engine: Arc<dyn SwarmEngine>,
    tracker: Arc<AccessTracker>,
    policy: EvictionPolicy,
}

impl EvictionEngine {
    pub fn new(
        engine: Arc<dyn SwarmEngine>,
        tracker: Arc<AccessTracker>,
        policy: EvictionPolicy,
    ) -> Self {
        Self {
            engine,
            tracker,
            policy,
        }
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Runs one sweep. Never fails: engine errors are logged and the
    /// affected swarm is skipped.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut survivors = Vec::new();

        let registered = self.engine.swarms().await;
        let known: HashSet<InfoHash> = registered.iter().copied().collect();
        report.pruned_records = self.tracker.retain(|info_hash| known.contains(info_hash));
        if report.pruned_records > 0 {
            debug!("Pruned {} orphaned access records", report.pruned_records);
        }

        for info_hash in registered {
            let stats = match self.engine.stats(info_hash).await {
                Ok(stats) => stats,
                Err(e) => {
                    // Dropped between enumeration and now
                    debug!("Skipping swarm {} during sweep: {}", info_hash, e);
                    continue;
                }
            };
            report.examined += 1;
            report.bytes_before += stats.bytes_completed;

            let last_access = self.tracker.touch_if_absent(info_hash);
            let inactive_for = last_access.elapsed();
            let ratio = stats.ratio();

            let reason = if inactive_for > self.policy.inactivity_ttl {
                Some(EvictionReason::Inactive)
            } else if ratio >= self.policy.max_ratio {
                Some(EvictionReason::RatioExceeded)
            } else {
                None
            };

            let candidate = Candidate {
                info_hash,
                bytes_completed: stats.bytes_completed,
                last_access,
            };

            match reason {
                Some(reason) => {
                    debug!(
                        "Swarm {} violates policy: inactive {:?}, ratio {:.2}",
                        info_hash, inactive_for, ratio
                    );
                    if !self.evict(&candidate, reason, &mut report).await {
                        survivors.push(candidate);
                    }
                }
                None => survivors.push(candidate),
            }
        }

        let mut total: u64 = survivors.iter().map(|c| c.bytes_completed).sum();
        if total > self.policy.storage_quota {
            info!(
                "Storage quota exceeded: {} of {} bytes used by {} swarms",
                total,
                self.policy.storage_quota,
                survivors.len()
            );

            survivors.sort_by_key(|candidate| candidate.last_access);
            for candidate in &survivors {
                if total <= self.policy.storage_quota {
                    break;
                }
                if self
                    .evict(candidate, EvictionReason::QuotaExceeded, &mut report)
                    .await
                {
                    total = total.saturating_sub(candidate.bytes_completed);
                }
            }
        }
        report.bytes_after = total;

        if report.evicted.is_empty() && report.drop_failures.is_empty() {
            debug!(
                "Sweep examined {} swarms, {} bytes completed, nothing evicted",
                report.examined, report.bytes_before
            );
        } else {
            info!(
                "Sweep examined {} swarms: {} inactive, {} over ratio, {} over quota, {} drop failures, {} -> {} bytes",
                report.examined,
                report.evicted_for(EvictionReason::Inactive),
                report.evicted_for(EvictionReason::RatioExceeded),
                report.evicted_for(EvictionReason::QuotaExceeded),
                report.drop_failures.len(),
                report.bytes_before,
                report.bytes_after
            );
        }

        report
    }

    /// Drops and forgets one swarm. Returns false when the engine refused.
    async fn evict(
        &self,
        candidate: &Candidate,
        reason: EvictionReason,
        report: &mut SweepReport,
    ) -> bool {
        match self.engine.drop_swarm(candidate.info_hash).await {
            Ok(()) => {
                self.tracker.forget(&candidate.info_hash);
                info!("Evicted swarm {} ({:?})", candidate.info_hash, reason);
                report.evicted.push((candidate.info_hash, reason));
                true
            }
            Err(e) => {
                warn!("Failed to drop swarm {}: {}", candidate.info_hash, e);
                report.drop_failures.push(candidate.info_hash);
                false
            }
        }
    }

    /// Sweeps every `sweep_interval` until `shutdown` is cancelled. The
    /// first sweep runs one full interval after start.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.policy.sweep_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                "Eviction loop started: every {:?}, ttl {:?}, max ratio {}, quota {} bytes",
                period,
                self.policy.inactivity_ttl,
                self.policy.max_ratio,
                self.policy.storage_quota
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }

            info!("Eviction loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = EvictionPolicy::default();
        assert_eq!(policy.inactivity_ttl, Duration::from_secs(900));
        assert_eq!(policy.max_ratio, 2.0);
        assert_eq!(policy.storage_quota, 50 * 1024 * 1024 * 1024);
        assert_eq!(policy.sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_fractional_gigabytes() {
        assert_eq!(gigabytes_to_bytes(0.5), 512 * 1024 * 1024);
        assert_eq!(gigabytes_to_bytes(-1.0), 0);
    }
}
