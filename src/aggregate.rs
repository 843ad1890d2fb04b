use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const DEFAULT_REPUTATION: f64 = 100.0;
pub const MAX_REPUTATION: f64 = 100.0;

/// Well-formed view of a room's moderation aggregates, rebuilt from whatever
/// the stored document actually holds. Historically inconsistent rooms
/// self-heal on every transactional read; there is no separate migration.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomState {
    pub participants: Vec<String>,
    pub violation_count: BTreeMap<String, u64>,
}

impl RoomState {
    /// `known_parties` are the ids the caller can vouch for (the two ids
    /// encoded in the room id plus the sender); they are appended to any
    /// valid participants already on the document, deduplicated in order.
    /// Violation counts keep existing non-negative integer entries and drop
    /// everything else; every participant ends up with at least a zero.
    pub fn from_doc(doc: Option<&Value>, known_parties: &[String]) -> Self {
        let mut participants: Vec<String> = Vec::new();
        if let Some(list) = doc.and_then(|d| d.get("participants")).and_then(Value::as_array) {
            for entry in list {
                if let Some(id) = entry.as_str() {
                    if !id.is_empty() && !participants.iter().any(|p| p == id) {
                        participants.push(id.to_string());
                    }
                }
            }
        }
        for id in known_parties {
            if !id.is_empty() && !participants.iter().any(|p| p == id) {
                participants.push(id.clone());
            }
        }

        let mut violation_count: BTreeMap<String, u64> = BTreeMap::new();
        for id in &participants {
            violation_count.insert(id.clone(), 0);
        }
        if let Some(counts) = doc
            .and_then(|d| d.get("violationCount"))
            .and_then(Value::as_object)
        {
            for (id, raw) in counts {
                if let Some(count) = raw.as_u64() {
                    violation_count.insert(id.clone(), count);
                }
            }
        }

        Self {
            participants,
            violation_count,
        }
    }

    /// Increments the sender's count by one and returns the new total.
    pub fn record_violation(&mut self, sender_id: &str) -> u64 {
        if !self.participants.iter().any(|p| p == sender_id) {
            self.participants.push(sender_id.to_string());
        }
        let count = self.violation_count.entry(sender_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn to_patch(&self) -> Value {
        json!({
            "participants": self.participants,
            "violationCount": self.violation_count,
        })
    }
}

/// Well-formed view of a user's reputation. Reputation only ever moves
/// downward through this pipeline and stays within [0, 100].
#[derive(Debug, Clone, PartialEq)]
pub struct UserState {
    pub reputation: f64,
    has_legacy_score: bool,
}

impl UserState {
    pub fn from_doc(doc: Option<&Value>) -> Self {
        let reputation = doc
            .and_then(|d| d.get("reputation"))
            .and_then(Value::as_f64)
            .filter(|r| r.is_finite())
            .map(|r| r.clamp(0.0, MAX_REPUTATION))
            .unwrap_or(DEFAULT_REPUTATION);
        let has_legacy_score = doc
            .and_then(|d| d.get("score"))
            .map_or(false, |v| !v.is_null());
        Self {
            reputation,
            has_legacy_score,
        }
    }

    /// Deducts `points`, floored at zero, and returns the new reputation.
    pub fn penalize(&mut self, points: u32) -> f64 {
        self.reputation = (self.reputation - f64::from(points)).max(0.0);
        self.reputation
    }

    /// Older app builds read a mirrored `score` field; it is kept in sync
    /// only when the stored document already carries one.
    pub fn to_patch(&self) -> Value {
        if self.has_legacy_score {
            json!({ "reputation": self.reputation, "score": self.reputation })
        } else {
            json!({ "reputation": self.reputation })
        }
    }
}
