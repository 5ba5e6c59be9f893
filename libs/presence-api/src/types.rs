use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unix-время в миллисекундах.
pub type TimestampMs = i64;

// ════════════════════════════════════════════════════════════════
//  SubjectId
// ════════════════════════════════════════════════════════════════

/// Непрозрачный идентификатор субъекта (пользователя).
///
/// Выдаётся внешним auth слоем. Числовые id нормализуются
/// в десятичную строку на границе (HTTP adapter).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for SubjectId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl From<u64> for SubjectId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl Borrow<str> for SubjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ════════════════════════════════════════════════════════════════
//  PresenceStatus
// ════════════════════════════════════════════════════════════════

/// Производный статус присутствия. Никогда не хранится,
/// вычисляется при чтении из last-seen и порога.
///
/// `last_seen` заполнен только для offline субъектов, у которых
/// ещё есть запись в store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceStatus {
    pub online: bool,
    pub last_seen: Option<TimestampMs>,
}

impl PresenceStatus {
    pub fn online() -> Self {
        Self { online: true, last_seen: None }
    }

    pub fn offline(last_seen: TimestampMs) -> Self {
        Self { online: false, last_seen: Some(last_seen) }
    }

    /// Never seen, signed off, or evicted. Indistinguishable by design of the store.
    pub fn unknown() -> Self {
        Self { online: false, last_seen: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_id_is_transparent_in_json() {
        let id = SubjectId::from("alice");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""alice""#);
        let back: SubjectId = serde_json::from_str(r#""alice""#).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn numeric_ids_normalize_to_decimal() {
        assert_eq!(SubjectId::from(42i64).as_str(), "42");
        assert_eq!(SubjectId::from(7u64), SubjectId::from("7"));
    }

    #[test]
    fn status_constructors() {
        assert_eq!(PresenceStatus::online(), PresenceStatus { online: true, last_seen: None });
        assert_eq!(PresenceStatus::offline(5).last_seen, Some(5));
        assert!(!PresenceStatus::unknown().online);
        assert_eq!(PresenceStatus::unknown().last_seen, None);
    }
}
