use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Approved,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedBy {
    Rule,
    Ai,
}

/// Violation categories a message can be blocked or flagged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Sexual,
    HateOrThreat,
    Grooming,
    Scam,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sexual => "sexual",
            Category::HateOrThreat => "hate_or_threat",
            Category::Grooming => "grooming",
            Category::Scam => "scam",
        }
    }
}

/// Lenient view over a message document. Chat clients and older app builds
/// have written messages with missing or mistyped fields, so every accessor
/// tolerates whatever is actually stored.
#[derive(Debug, Clone, Default)]
pub struct MessageView {
    pub kind: Option<String>,
    pub code: Option<Value>,
    pub text: Option<Value>,
    pub sender_id: Option<String>,
    pub status: Option<String>,
}

impl MessageView {
    pub fn from_value(doc: &Value) -> Self {
        Self {
            kind: doc.get("type").and_then(Value::as_str).map(str::to_owned),
            code: doc.get("code").filter(|v| !v.is_null()).cloned(),
            text: doc.get("text").cloned(),
            sender_id: doc
                .get("senderId")
                .and_then(Value::as_str)
                .map(str::to_owned),
            status: doc.get("status").and_then(Value::as_str).map(str::to_owned),
        }
    }

    /// System/event messages are not user-authored chat content.
    pub fn is_system(&self) -> bool {
        self.kind.as_deref() == Some("system") || self.code.is_some()
    }

    /// A message with no status yet is treated as pending; any present
    /// status other than `pending` is terminal.
    pub fn is_pending(&self) -> bool {
        match self.status.as_deref() {
            None => true,
            Some(status) => status == "pending",
        }
    }
}

/// The moderation verdict for a message. `to_patch` always rewrites all five
/// decision fields so a merge write can never leave stale values from an
/// earlier decision behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub status: MessageStatus,
    pub blocked_by: Option<BlockedBy>,
    pub reason: Option<Category>,
    pub warning: bool,
    pub ai_score: Option<f64>,
}

impl Decision {
    pub fn approve(ai_score: Option<f64>) -> Self {
        Self {
            status: MessageStatus::Approved,
            blocked_by: None,
            reason: None,
            warning: false,
            ai_score,
        }
    }

    /// Approved but visibly flagged: the scam carve-out.
    pub fn approve_with_warning(reason: Category, ai_score: f64) -> Self {
        Self {
            status: MessageStatus::Approved,
            blocked_by: None,
            reason: Some(reason),
            warning: true,
            ai_score: Some(ai_score),
        }
    }

    pub fn rule_block(reason: Category) -> Self {
        Self {
            status: MessageStatus::Blocked,
            blocked_by: Some(BlockedBy::Rule),
            reason: Some(reason),
            warning: true,
            ai_score: None,
        }
    }

    pub fn ai_block(reason: Category, ai_score: f64) -> Self {
        Self {
            status: MessageStatus::Blocked,
            blocked_by: Some(BlockedBy::Ai),
            reason: Some(reason),
            warning: true,
            ai_score: Some(ai_score),
        }
    }

    pub fn to_patch(&self) -> Value {
        json!({
            "status": self.status,
            "blockedBy": self.blocked_by,
            "reason": self.reason,
            "warning": self.warning,
            "aiScore": self.ai_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_messages_detected() {
        let view = MessageView::from_value(&json!({ "type": "system", "text": "joined" }));
        assert!(view.is_system());

        let view = MessageView::from_value(&json!({ "code": "game_invite", "senderId": "a" }));
        assert!(view.is_system());

        let view = MessageView::from_value(&json!({ "text": "hi", "senderId": "a" }));
        assert!(!view.is_system());
    }

    #[test]
    fn test_pending_detection_is_lenient() {
        assert!(MessageView::from_value(&json!({ "text": "hi" })).is_pending());
        assert!(MessageView::from_value(&json!({ "status": "pending" })).is_pending());
        assert!(!MessageView::from_value(&json!({ "status": "approved" })).is_pending());
        assert!(!MessageView::from_value(&json!({ "status": "blocked" })).is_pending());
        // A garbage status is present-and-not-pending, hence terminal.
        assert!(!MessageView::from_value(&json!({ "status": "weird" })).is_pending());
    }

    #[test]
    fn test_approve_patch_rewrites_every_decision_field() {
        let patch = Decision::approve(Some(0.42)).to_patch();
        assert_eq!(
            patch,
            json!({
                "status": "approved",
                "blockedBy": null,
                "reason": null,
                "warning": false,
                "aiScore": 0.42,
            })
        );
    }

    #[test]
    fn test_rule_block_patch() {
        let patch = Decision::rule_block(Category::Sexual).to_patch();
        assert_eq!(
            patch,
            json!({
                "status": "blocked",
                "blockedBy": "rule",
                "reason": "sexual",
                "warning": true,
                "aiScore": null,
            })
        );
    }

    #[test]
    fn test_ai_block_patch() {
        let patch = Decision::ai_block(Category::HateOrThreat, 0.9).to_patch();
        assert_eq!(
            patch,
            json!({
                "status": "blocked",
                "blockedBy": "ai",
                "reason": "hate_or_threat",
                "warning": true,
                "aiScore": 0.9,
            })
        );
    }

    #[test]
    fn test_scam_warning_patch_stays_approved() {
        let patch = Decision::approve_with_warning(Category::Scam, 0.95).to_patch();
        assert_eq!(patch["status"], "approved");
        assert_eq!(patch["reason"], "scam");
        assert_eq!(patch["warning"], true);
        assert_eq!(patch["blockedBy"], Value::Null);
    }
}
