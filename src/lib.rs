pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod message;
pub mod normalize;
pub mod penalty;
pub mod pipeline;
pub mod rules;
pub mod store;

pub use classifier::{Classify, Label, RemoteClassifier, Verdict};
pub use config::Config;
pub use message::{BlockedBy, Category, Decision, MessageStatus};
pub use penalty::PenaltySchedule;
pub use pipeline::{MessageEvent, ModerationEngine, Outcome, SkipReason};
pub use rules::RuleMatcher;
pub use store::MemoryStore;
