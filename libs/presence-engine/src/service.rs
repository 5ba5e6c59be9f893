use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use presence_api::{Clock, LivenessStore, PresenceStatus, SubjectId, TimestampMs};

use crate::error::EngineError;
use crate::sweeper::Sweeper;

// ═══════════════════════════════════════════════════════════════
//  PresenceConfig
// ═══════════════════════════════════════════════════════════════

/// Пороги presence. Читаются один раз при старте.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Максимальный возраст последнего heartbeat для статуса online.
    /// Интервал heartbeat'ов клиента должен быть заметно меньше.
    pub online_threshold: Duration,
    /// Возраст записи, после которого sweeper её удаляет. `>= online_threshold`.
    pub retention_window: Duration,
}

impl PresenceConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.online_threshold.is_zero() {
            return Err(EngineError::config("online_threshold", "must be greater than zero"));
        }
        if self.retention_window < self.online_threshold {
            return Err(EngineError::config(
                "retention_window",
                format!(
                    "{:?} is shorter than online_threshold {:?}",
                    self.retention_window, self.online_threshold
                ),
            ));
        }
        Ok(())
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            online_threshold: Duration::from_secs(30),
            retention_window: Duration::from_secs(15 * 60),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  PresenceService
// ═══════════════════════════════════════════════════════════════

/// Heartbeat ingestion, sign-off и запросы статуса поверх `LivenessStore`.
///
/// Online/offline никогда не хранится: переход в offline неявный,
/// это сравнение `now - last_seen < online_threshold` в момент чтения.
///
/// Часы могут прыгнуть назад (wall-clock, NTP). Тогда разность отрицательна
/// и subject считается online чуть дольше, чем должен. Это известное
/// приближение, не корректируется.
pub struct PresenceService {
    store: Arc<dyn LivenessStore>,
    clock: Arc<dyn Clock>,
    config: PresenceConfig,
    threshold_ms: i64,
}

impl PresenceService {
    pub fn new(
        store: Arc<dyn LivenessStore>,
        clock: Arc<dyn Clock>,
        config: PresenceConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let threshold_ms = i64::try_from(config.online_threshold.as_millis()).unwrap_or(i64::MAX);
        Ok(Self {
            store,
            clock,
            config,
            threshold_ms,
        })
    }

    /// Зафиксировать heartbeat с текущим временем часов.
    pub fn heartbeat(&self, id: &SubjectId) {
        let now = self.clock.now_ms();
        self.store.put(id, now);
        tracing::trace!(subject = %id, now, "heartbeat");
    }

    /// Явный выход: запись удаляется сразу, `last_seen` не сохраняется.
    ///
    /// Порядок между конкурентными heartbeat и sign-off одного subject'а
    /// не гарантируется. Если heartbeat запишется после удаления, subject
    /// снова будет online до следующего sign-off или истечения порога.
    /// Это принятая гонка, а не ошибка.
    pub fn sign_off(&self, id: &SubjectId) {
        self.store.delete(id);
        tracing::debug!(subject = %id, "signed off");
    }

    pub fn status(&self, id: &SubjectId) -> PresenceStatus {
        self.status_at(id, self.clock.now_ms())
    }

    /// Статус относительно заданного момента `now`.
    pub fn status_at(&self, id: &SubjectId, now: TimestampMs) -> PresenceStatus {
        match self.store.get(id) {
            None => PresenceStatus::unknown(),
            Some(last_seen) if now.saturating_sub(last_seen) < self.threshold_ms => {
                PresenceStatus::online()
            }
            Some(last_seen) => PresenceStatus::offline(last_seen),
        }
    }

    /// Статус для каждого id, все относительно одного snapshot'а `now`.
    ///
    /// Неизвестные id присутствуют в ответе как offline без `last_seen`.
    /// Дубликаты схлопываются. Чтения per-subject независимы: атомарность
    /// батча только по времени, не multi-key транзакция.
    pub fn batch_status<'a, I>(&self, ids: I) -> HashMap<SubjectId, PresenceStatus>
    where
        I: IntoIterator<Item = &'a SubjectId>,
    {
        let now = self.clock.now_ms();
        let statuses: HashMap<SubjectId, PresenceStatus> = ids
            .into_iter()
            .map(|id| (id.clone(), self.status_at(id, now)))
            .collect();
        tracing::trace!(count = statuses.len(), now, "batch status");
        statuses
    }

    /// Sweeper над тем же store, часами и retention window.
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(self.store.clone(), self.clock.clone(), self.config.retention_window)
    }

    /// Число записей в store (online + offline с last_seen).
    pub fn tracked(&self) -> usize {
        self.store.len()
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn LivenessStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
