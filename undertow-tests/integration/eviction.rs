//! Eviction sweeps over the simulated engine with paused time.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use undertow_core::swarm::{InfoHash, SwarmStats};
use undertow_core::{AccessTracker, EvictionEngine, EvictionPolicy, EvictionReason, SwarmEngine};
use undertow_sim::{MetainfoBuilder, SimulatedSwarmEngine};

struct Sweeper {
    engine: SimulatedSwarmEngine,
    tracker: Arc<AccessTracker>,
    eviction: EvictionEngine,
}

fn policy() -> EvictionPolicy {
    EvictionPolicy {
        inactivity_ttl: Duration::from_secs(60),
        max_ratio: 2.0,
        storage_quota: 1_000,
        sweep_interval: Duration::from_secs(30),
    }
}

fn sweeper(policy: EvictionPolicy) -> Sweeper {
    let engine = SimulatedSwarmEngine::new();
    let tracker = Arc::new(AccessTracker::new());
    let eviction = EvictionEngine::new(Arc::new(engine.clone()), tracker.clone(), policy);
    Sweeper {
        engine,
        tracker,
        eviction,
    }
}

impl Sweeper {
    /// Registers a swarm holding `completed` bytes and stamps its access.
    async fn swarm(&self, name: &str, completed: u64) -> InfoHash {
        let info_hash = self.untracked_swarm(name, completed).await;
        self.tracker.touch(info_hash);
        info_hash
    }

    async fn untracked_swarm(&self, name: &str, completed: u64) -> InfoHash {
        let built = MetainfoBuilder::new(name)
            .pattern_file(&format!("{name}/video.mkv"), 64)
            .pattern_file(&format!("{name}/sample.mkv"), 16)
            .build()
            .await
            .unwrap();
        let info_hash = self.engine.add_metainfo(&built.bytes).await.unwrap();
        self.engine
            .set_stats(
                info_hash,
                SwarmStats {
                    bytes_downloaded: completed,
                    bytes_uploaded: 0,
                    bytes_completed: completed,
                },
            )
            .unwrap();
        info_hash
    }
}

#[tokio::test(start_paused = true)]
async fn test_idle_swarm_is_evicted_after_ttl() {
    let sweeper = sweeper(policy());
    let idle = sweeper.swarm("idle", 100).await;

    tokio::time::advance(Duration::from_secs(30)).await;
    let fresh = sweeper.swarm("fresh", 100).await;
    let early = sweeper.eviction.sweep().await;
    assert!(early.evicted.is_empty());

    tokio::time::advance(Duration::from_secs(31)).await;
    let report = sweeper.eviction.sweep().await;

    assert_eq!(report.examined, 2);
    assert_eq!(report.evicted, vec![(idle, EvictionReason::Inactive)]);
    assert_eq!(sweeper.engine.swarms().await, vec![fresh]);
    assert!(sweeper.tracker.last_access(&idle).is_none());
    assert!(sweeper.tracker.last_access(&fresh).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_ratio_ceiling_is_inclusive() {
    let sweeper = sweeper(policy());
    let at_limit = sweeper.swarm("at-limit", 100).await;
    let below = sweeper.swarm("below", 100).await;
    sweeper
        .engine
        .set_stats(
            at_limit,
            SwarmStats {
                bytes_downloaded: 100,
                bytes_uploaded: 200,
                bytes_completed: 100,
            },
        )
        .unwrap();
    sweeper
        .engine
        .set_stats(
            below,
            SwarmStats {
                bytes_downloaded: 100,
                bytes_uploaded: 199,
                bytes_completed: 100,
            },
        )
        .unwrap();

    let report = sweeper.eviction.sweep().await;

    assert_eq!(report.evicted, vec![(at_limit, EvictionReason::RatioExceeded)]);
    assert_eq!(sweeper.engine.swarms().await, vec![below]);
}

#[tokio::test(start_paused = true)]
async fn test_nothing_downloaded_is_never_over_ratio() {
    let sweeper = sweeper(policy());
    let seeding = sweeper.swarm("seeding", 0).await;
    sweeper
        .engine
        .set_stats(
            seeding,
            SwarmStats {
                bytes_downloaded: 0,
                bytes_uploaded: 5_000,
                bytes_completed: 0,
            },
        )
        .unwrap();

    let report = sweeper.eviction.sweep().await;

    assert!(report.evicted.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_quota_evicts_least_recently_used_first() {
    let sweeper = sweeper(policy());
    let oldest = sweeper.swarm("oldest", 400).await;
    tokio::time::advance(Duration::from_secs(1)).await;
    let middle = sweeper.swarm("middle", 400).await;
    tokio::time::advance(Duration::from_secs(1)).await;
    let newest = sweeper.swarm("newest", 400).await;

    let report = sweeper.eviction.sweep().await;

    assert_eq!(report.bytes_before, 1_200);
    assert_eq!(report.evicted, vec![(oldest, EvictionReason::QuotaExceeded)]);
    assert_eq!(report.bytes_after, 800);
    let mut remaining = vec![middle, newest];
    remaining.sort();
    assert_eq!(sweeper.engine.swarms().await, remaining);
}

#[tokio::test(start_paused = true)]
async fn test_quota_evicts_several_in_access_order() {
    let sweeper = sweeper(EvictionPolicy {
        storage_quota: 600,
        ..policy()
    });
    // Touched out of registration order so access order differs from hash order
    let third = sweeper.untracked_swarm("third", 300).await;
    let first = sweeper.untracked_swarm("first", 300).await;
    let kept = sweeper.untracked_swarm("kept", 300).await;
    let second = sweeper.untracked_swarm("second", 300).await;
    let fourth = sweeper.untracked_swarm("fourth", 300).await;
    for info_hash in [first, second, third, fourth, kept] {
        sweeper.tracker.touch(info_hash);
        tokio::time::advance(Duration::from_secs(1)).await;
    }

    let report = sweeper.eviction.sweep().await;

    assert_eq!(report.bytes_before, 1_500);
    assert_eq!(
        report.evicted,
        vec![
            (first, EvictionReason::QuotaExceeded),
            (second, EvictionReason::QuotaExceeded),
            (third, EvictionReason::QuotaExceeded),
        ]
    );
    assert_eq!(report.bytes_after, 600);
    let mut remaining = vec![fourth, kept];
    remaining.sort();
    assert_eq!(sweeper.engine.swarms().await, remaining);
}

#[tokio::test(start_paused = true)]
async fn test_policy_evictions_count_toward_quota() {
    let sweeper = sweeper(policy());
    let stale = sweeper.swarm("stale", 900).await;
    tokio::time::advance(Duration::from_secs(61)).await;
    let active = sweeper.swarm("active", 600).await;

    let report = sweeper.eviction.sweep().await;

    assert_eq!(report.evicted, vec![(stale, EvictionReason::Inactive)]);
    assert_eq!(report.bytes_after, 600);
    assert_eq!(sweeper.engine.swarms().await, vec![active]);
}

#[tokio::test(start_paused = true)]
async fn test_drop_failure_does_not_stop_sweep() {
    let sweeper = sweeper(policy());
    let stuck = sweeper.swarm("stuck", 10).await;
    let idle = sweeper.swarm("idle", 10).await;
    sweeper.engine.fail_drops_for(stuck);

    tokio::time::advance(Duration::from_secs(61)).await;
    let report = sweeper.eviction.sweep().await;

    assert_eq!(report.drop_failures, vec![stuck]);
    assert_eq!(report.evicted, vec![(idle, EvictionReason::Inactive)]);
    assert_eq!(sweeper.engine.swarms().await, vec![stuck]);
    assert!(sweeper.tracker.last_access(&stuck).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_untracked_swarm_gets_a_fresh_record() {
    let sweeper = sweeper(policy());
    let orphan = sweeper.untracked_swarm("orphan", 10).await;

    let first = sweeper.eviction.sweep().await;
    assert!(first.evicted.is_empty());
    assert!(sweeper.tracker.last_access(&orphan).is_some());

    tokio::time::advance(Duration::from_secs(61)).await;
    let second = sweeper.eviction.sweep().await;
    assert_eq!(second.evicted, vec![(orphan, EvictionReason::Inactive)]);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_prunes_records_of_vanished_swarms() {
    let sweeper = sweeper(policy());
    let gone = sweeper.swarm("gone", 10).await;
    let live = sweeper.swarm("live", 10).await;

    // A touch racing a drop leaves a record with no swarm behind it
    sweeper.engine.drop_swarm(gone).await.unwrap();
    sweeper.tracker.touch(gone);

    let report = sweeper.eviction.sweep().await;

    assert_eq!(report.pruned_records, 1);
    assert_eq!(report.examined, 1);
    assert!(report.evicted.is_empty());
    assert!(sweeper.tracker.last_access(&gone).is_none());
    assert!(sweeper.tracker.last_access(&live).is_some());

    let again = sweeper.eviction.sweep().await;
    assert_eq!(again.pruned_records, 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_sweep_finds_nothing_new() {
    let sweeper = sweeper(policy());
    sweeper.swarm("a", 700).await;
    tokio::time::advance(Duration::from_secs(1)).await;
    sweeper.swarm("b", 700).await;

    let first = sweeper.eviction.sweep().await;
    assert_eq!(first.evicted.len(), 1);

    let second = sweeper.eviction.sweep().await;
    assert!(second.evicted.is_empty());
    assert_eq!(second.bytes_before, 700);
    assert_eq!(second.bytes_after, 700);
}

#[tokio::test(start_paused = true)]
async fn test_background_loop_sweeps_until_cancelled() {
    let sweeper = sweeper(policy());
    let idle = sweeper.swarm("idle", 10).await;
    let shutdown = CancellationToken::new();
    let handle = sweeper.eviction.spawn(shutdown.clone());

    // The first sweep runs one interval after start, before the TTL lapses
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(sweeper.engine.swarms().await, vec![idle]);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(sweeper.engine.swarms().await.is_empty());
    assert!(sweeper.tracker.is_empty());

    shutdown.cancel();
    handle.await.unwrap();
}
