use crate::aggregate::{RoomState, UserState};
use crate::classifier::Classify;
use crate::config::Config;
use crate::message::{Category, Decision, MessageView};
use crate::normalize;
use crate::penalty::PenaltySchedule;
use crate::rules::RuleMatcher;
use crate::store::{self, MemoryStore};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

/// A new-message trigger event. Delivery is at least once; the pipeline is
/// idempotent against replays.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub room_id: String,
    pub message_id: String,
    /// The message document as it looked when the event fired.
    pub snapshot: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// System/event messages are not moderation targets.
    NotChatContent,
    MissingSender,
    AlreadyDecided,
    MessageGone,
    StoreUnavailable,
}

/// What one invocation of the pipeline did. Every message resolves to
/// approved or blocked; `Skipped` means another path already owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Skipped(SkipReason),
    Approved {
        score: Option<f64>,
        scam_warning: bool,
    },
    RuleBlocked(Category),
    AiBlocked {
        category: Category,
        score: f64,
        violations: u64,
        reputation: f64,
    },
}

/// Sequences normalization, rule matching, the remote classifier call and
/// the blocking decision for each new chat message.
pub struct ModerationEngine<C> {
    rules: RuleMatcher,
    schedule: PenaltySchedule,
    score_threshold: f64,
    classifier: C,
    store: Arc<MemoryStore>,
}

impl<C: Classify> ModerationEngine<C> {
    pub fn new(config: &Config, classifier: C, store: Arc<MemoryStore>) -> Result<Self> {
        Ok(Self {
            rules: RuleMatcher::new(&config.rules)?,
            schedule: config.penalty,
            score_threshold: config.classifier.score_threshold,
            classifier,
            store,
        })
    }

    /// Entry point for one delivery of a new-message event. Never returns an
    /// error: anything that goes wrong inside the pipeline degrades to a
    /// fail-open approval so no message can stay pending forever.
    pub async fn moderate(&self, event: &MessageEvent) -> Outcome {
        match self.run(event).await {
            Ok(outcome) => outcome,
            Err(error) => {
                log::warn!(
                    "Moderation pipeline failed for {}/{}: {error:#}",
                    event.room_id,
                    event.message_id
                );
                self.rescue(event)
            }
        }
    }

    async fn run(&self, event: &MessageEvent) -> Result<Outcome> {
        let message = MessageView::from_value(&event.snapshot);

        if message.is_system() {
            return Ok(Outcome::Skipped(SkipReason::NotChatContent));
        }
        let sender_id = match message.sender_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Ok(Outcome::Skipped(SkipReason::MissingSender)),
        };
        if !message.is_pending() {
            log::debug!(
                "Message {}/{} already decided, ignoring redelivery",
                event.room_id,
                event.message_id
            );
            return Ok(Outcome::Skipped(SkipReason::AlreadyDecided));
        }

        let path = store::message_path(&event.room_id, &event.message_id);
        let text = normalize::normalize_field(message.text.as_ref());
        if text.is_empty() {
            self.store.merge(&path, &Decision::approve(None).to_patch())?;
            return Ok(Outcome::Approved {
                score: None,
                scam_warning: false,
            });
        }

        if let Some(category) = self.rules.check(&text) {
            log::info!(
                "Rule match ({}) blocked message {}/{}",
                category.as_str(),
                event.room_id,
                event.message_id
            );
            self.store
                .merge(&path, &Decision::rule_block(category).to_patch())?;
            return Ok(Outcome::RuleBlocked(category));
        }

        let verdict = match self.classifier.classify(&text).await {
            Ok(verdict) => verdict,
            Err(error) => {
                log::warn!(
                    "Classifier unavailable for {}/{}, approving fail-open: {error:#}",
                    event.room_id,
                    event.message_id
                );
                self.store.merge(&path, &Decision::approve(None).to_patch())?;
                return Ok(Outcome::Approved {
                    score: None,
                    scam_warning: false,
                });
            }
        };

        // The score gate dominates the label: low confidence is safe no
        // matter what the model called it.
        if verdict.score < self.score_threshold {
            self.store
                .merge(&path, &Decision::approve(Some(verdict.score)).to_patch())?;
            return Ok(Outcome::Approved {
                score: Some(verdict.score),
                scam_warning: false,
            });
        }

        match verdict.label.category() {
            None => {
                self.store
                    .merge(&path, &Decision::approve(Some(verdict.score)).to_patch())?;
                Ok(Outcome::Approved {
                    score: Some(verdict.score),
                    scam_warning: false,
                })
            }
            Some(Category::Scam) => {
                // Visible flag, no punitive consequence.
                self.store.merge(
                    &path,
                    &Decision::approve_with_warning(Category::Scam, verdict.score).to_patch(),
                )?;
                Ok(Outcome::Approved {
                    score: Some(verdict.score),
                    scam_warning: true,
                })
            }
            Some(category) => self.commit_violation(event, &sender_id, category, verdict.score),
        }
    }

    /// Applies the blocking decision plus penalty atomically across the
    /// message, room and user documents. The status re-check runs inside the
    /// transaction, closing the check-then-act gap left by the outer
    /// idempotency guard.
    fn commit_violation(
        &self,
        event: &MessageEvent,
        sender_id: &str,
        category: Category,
        score: f64,
    ) -> Result<Outcome> {
        let message_path = store::message_path(&event.room_id, &event.message_id);
        let room_path = store::room_path(&event.room_id);
        let user_path = store::user_path(sender_id);
        let parties = known_parties(&event.room_id, sender_id);

        let outcome = self.store.run_transaction(|txn| {
            let current = match txn.get(&message_path) {
                Some(doc) => doc,
                None => return Ok(Outcome::Skipped(SkipReason::MessageGone)),
            };
            if !MessageView::from_value(&current).is_pending() {
                return Ok(Outcome::Skipped(SkipReason::AlreadyDecided));
            }

            let room_doc = txn.get(&room_path);
            let mut room = RoomState::from_doc(room_doc.as_ref(), &parties);
            let violations = room.record_violation(sender_id);

            let user_doc = txn.get(&user_path);
            let mut user = UserState::from_doc(user_doc.as_ref());
            let reputation = user.penalize(self.schedule.deduction(violations));

            txn.merge(&room_path, room.to_patch());
            txn.merge(&user_path, user.to_patch());
            txn.merge(&message_path, Decision::ai_block(category, score).to_patch());

            Ok(Outcome::AiBlocked {
                category,
                score,
                violations,
                reputation,
            })
        })?;

        if let Outcome::AiBlocked {
            violations,
            reputation,
            ..
        } = &outcome
        {
            log::info!(
                "Blocked message {}/{} ({}, score {score:.2}): sender {sender_id} at {violations} violations, reputation {reputation}",
                event.room_id,
                event.message_id,
                category.as_str()
            );
        }
        Ok(outcome)
    }

    /// Last-resort guard: re-reads the message and force-approves it if
    /// still pending, so a malfunction never strands it. Logs and never
    /// propagates; platform-level redelivery could duplicate side effects.
    fn rescue(&self, event: &MessageEvent) -> Outcome {
        let path = store::message_path(&event.room_id, &event.message_id);
        match self.store.get(&path) {
            Some(doc) if MessageView::from_value(&doc).is_pending() => {
                match self.store.merge(&path, &Decision::approve(None).to_patch()) {
                    Ok(()) => Outcome::Approved {
                        score: None,
                        scam_warning: false,
                    },
                    Err(error) => {
                        log::error!(
                            "Fail-open rescue write for {}/{} failed: {error:#}",
                            event.room_id,
                            event.message_id
                        );
                        Outcome::Skipped(SkipReason::StoreUnavailable)
                    }
                }
            }
            Some(_) => Outcome::Skipped(SkipReason::AlreadyDecided),
            None => Outcome::Skipped(SkipReason::MessageGone),
        }
    }
}

/// Direct-chat room ids encode both member ids as `{uidA}_{uidB}`. Together
/// with the sender these are the parties the committer can vouch for when a
/// room document is missing or malformed.
fn known_parties(room_id: &str, sender_id: &str) -> Vec<String> {
    let mut parties: Vec<String> = Vec::new();
    if let Some((a, b)) = room_id.split_once('_') {
        for id in [a, b] {
            if !id.is_empty() && !parties.iter().any(|p| p == id) {
                parties.push(id.to_string());
            }
        }
    }
    if !parties.iter().any(|p| p == sender_id) {
        parties.push(sender_id.to_string());
    }
    parties
}
