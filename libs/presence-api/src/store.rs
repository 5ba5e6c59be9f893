use crate::types::{SubjectId, TimestampMs};

/// Хранилище last-seen меток: subject → timestamp последнего heartbeat.
///
/// Единственное разделяемое mutable состояние. Реализации обязаны быть
/// безопасны для конкурентного доступа из request handler'ов и sweeper'а.
/// Ни одна операция не возвращает ошибку: исчерпание памяти фатально
/// и предотвращается sweeper'ом, а не обработкой ошибок.
pub trait LivenessStore: Send + Sync {
    /// Upsert с семантикой max: более ранний timestamp не перезаписывает поздний.
    fn put(&self, id: &SubjectId, ts: TimestampMs);

    fn get(&self, id: &SubjectId) -> Option<TimestampMs>;

    /// Idempotent: отсутствие записи не ошибка.
    fn delete(&self, id: &SubjectId);

    /// Ключи с `last_seen < cutoff`. Только для sweeper'а.
    fn snapshot_keys_older_than(&self, cutoff: TimestampMs) -> Vec<SubjectId>;

    /// Удалить запись только если она всё ещё старше `cutoff`.
    /// Запись, обновлённая heartbeat'ом после snapshot'а, выживает.
    fn remove_if_older_than(&self, id: &SubjectId, cutoff: TimestampMs) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
