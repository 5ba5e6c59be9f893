use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use presence_api::{Clock, LivenessStore, TimestampMs};

const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Период sweep'а по умолчанию: треть retention window, но не меньше секунды.
pub fn default_sweep_period(retention_window: Duration) -> Duration {
    (retention_window / 3).max(MIN_SWEEP_PERIOD)
}

/// Итог одного прохода.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub cutoff_ms: TimestampMs,
    /// Ключи из snapshot'а.
    pub candidates: usize,
    /// Реально удалённые. Меньше `candidates`, если heartbeat успел обновить запись.
    pub evicted: usize,
}

// ═══════════════════════════════════════════════════════════════
//  Sweeper
// ═══════════════════════════════════════════════════════════════

/// Удаляет записи старше retention window. Единственное, что ограничивает
/// рост store при постоянном притоке новых subject'ов.
pub struct Sweeper {
    store: Arc<dyn LivenessStore>,
    clock: Arc<dyn Clock>,
    retention_ms: i64,
}

impl Sweeper {
    pub fn new(store: Arc<dyn LivenessStore>, clock: Arc<dyn Clock>, retention_window: Duration) -> Self {
        Self {
            store,
            clock,
            retention_ms: i64::try_from(retention_window.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Snapshot ключей старше `now - retention`, затем удаление каждого.
    ///
    /// Между snapshot'ом и удалением lock не держится. Запись, обновлённая
    /// heartbeat'ом в этом окне, остаётся в store.
    pub fn sweep_once(&self) -> SweepReport {
        let cutoff_ms = self.clock.now_ms().saturating_sub(self.retention_ms);
        let candidates = self.store.snapshot_keys_older_than(cutoff_ms);
        let evicted = candidates
            .iter()
            .filter(|id| self.store.remove_if_older_than(id, cutoff_ms))
            .count();
        SweepReport {
            cutoff_ms,
            candidates: candidates.len(),
            evicted,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Запустить sweeper: один проход каждые `period` до отмены `token`.
///
/// Первый проход через `period` после старта. Пропущенные тики не
/// догоняются. Паника внутри прохода логируется, тик пропускается,
/// task продолжает работать.
pub fn spawn_sweeper(sweeper: Sweeper, period: Duration, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(?period, retention_ms = sweeper.retention_ms, "sweeper started");

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                _ = ticker.tick() => {
                    match catch_unwind(AssertUnwindSafe(|| sweeper.sweep_once())) {
                        Ok(report) if report.evicted > 0 => {
                            tracing::info!(
                                evicted = report.evicted,
                                candidates = report.candidates,
                                remaining = sweeper.store.len(),
                                "sweep evicted stale subjects"
                            );
                        }
                        Ok(report) => {
                            tracing::debug!(candidates = report.candidates, "sweep: nothing to evict");
                        }
                        Err(payload) => {
                            tracing::error!(
                                panic = panic_message(payload.as_ref()),
                                "sweep failed, skipping tick"
                            );
                        }
                    }
                }
            }
        }

        tracing::info!("sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ShardedStore;
    use presence_api::{ManualClock, SubjectId};

    const RETENTION: Duration = Duration::from_secs(300);

    fn setup() -> (Arc<ShardedStore>, Arc<ManualClock>, Sweeper) {
        let store = Arc::new(ShardedStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let sweeper = Sweeper::new(store.clone(), clock.clone(), RETENTION);
        (store, clock, sweeper)
    }

    #[test]
    fn evicts_only_entries_past_retention() {
        let (store, clock, sweeper) = setup();
        store.put(&"stale".into(), 0);
        store.put(&"fresh".into(), 200_000);

        clock.set(300_001);
        let report = sweeper.sweep_once();
        assert_eq!(report.cutoff_ms, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(store.get(&"stale".into()), None);
        assert_eq!(store.get(&"fresh".into()), Some(200_000));
    }

    #[test]
    fn nothing_evicted_before_retention_elapses() {
        let (store, clock, sweeper) = setup();
        store.put(&"a".into(), 0);
        clock.set(300_000);
        assert_eq!(sweeper.sweep_once().evicted, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sweep_bounds_growth() {
        let (store, clock, sweeper) = setup();
        for i in 0..10_000u64 {
            store.put(&SubjectId::from(i), 0);
        }
        clock.advance(RETENTION + Duration::from_millis(1));
        let report = sweeper.sweep_once();
        assert_eq!(report.candidates, 10_000);
        assert_eq!(report.evicted, 10_000);
        assert!(store.is_empty());
    }

    #[test]
    fn default_period_is_a_third_of_retention() {
        assert_eq!(default_sweep_period(Duration::from_secs(900)), Duration::from_secs(300));
        assert_eq!(default_sweep_period(Duration::from_millis(30)), MIN_SWEEP_PERIOD);
    }

    #[test]
    fn panic_message_extracts_text() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_sweeps_on_tick() {
        let (store, clock, sweeper) = setup();
        for i in 0..100u64 {
            store.put(&SubjectId::from(i), 0);
        }
        clock.advance(RETENTION + Duration::from_secs(1));

        let token = CancellationToken::new();
        let period = Duration::from_secs(100);
        let handle = spawn_sweeper(sweeper, period, token.clone());

        tokio::time::sleep(period + Duration::from_millis(10)).await;
        assert!(store.is_empty());

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_stops_on_cancel() {
        let (_store, _clock, sweeper) = setup();
        let token = CancellationToken::new();
        let handle = spawn_sweeper(sweeper, Duration::from_secs(60), token.clone());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    struct PanickingClock;

    impl Clock for PanickingClock {
        fn now_ms(&self) -> TimestampMs {
            panic!("clock exploded")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panic_in_sweep_does_not_kill_task() {
        let sweeper = Sweeper::new(Arc::new(ShardedStore::new()), Arc::new(PanickingClock), RETENTION);
        let token = CancellationToken::new();
        let period = Duration::from_secs(10);
        let handle = spawn_sweeper(sweeper, period, token.clone());

        tokio::time::sleep(period * 3 + Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        token.cancel();
        handle.await.unwrap();
    }
}
