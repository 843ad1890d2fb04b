use chat_sentinel::pipeline::{MessageEvent, Outcome, SkipReason};
use chat_sentinel::{Config, MemoryStore, ModerationEngine, RemoteClassifier, RuleMatcher};
use clap::{Arg, Command};
use log::LevelFilter;
use serde_json::json;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("chat-sentinel")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Content-moderation and reputation-penalty pipeline for chat rooms")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/chat-sentinel.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test-message")
                .long("test-message")
                .value_name("TEXT")
                .help("Run a message text through the rule matcher")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("remote")
                .long("remote")
                .help("Also call the configured remote classifier for --test-message")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("demo")
                .short('d')
                .long("demo")
                .help("Run a canned message batch through the full pipeline")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    if let Some(text) = matches.get_one::<String>("test-message") {
        test_message(&config, text, matches.get_flag("remote")).await;
        return;
    }

    if matches.get_flag("demo") {
        if let Err(e) = run_demo(&config).await {
            eprintln!("Demo failed: {e}");
            process::exit(1);
        }
        return;
    }

    eprintln!("No action requested. Try --test-message, --demo, or --help.");
    process::exit(1);
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file {path} not found, using built-in defaults");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    match Config::default().to_file(path) {
        Ok(()) => println!("✅ Default configuration written to {path}"),
        Err(e) => {
            eprintln!("❌ Failed to write configuration: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();
    println!(
        "Keywords: sexual={}, hate_or_threat={}, grooming={}",
        config.rules.sexual.len(),
        config.rules.hate_or_threat.len(),
        config.rules.grooming.len()
    );
    println!("Classifier endpoint: {}", config.classifier.endpoint);
    println!(
        "Timeout: {} ms, score threshold: {}",
        config.classifier.timeout_ms, config.classifier.score_threshold
    );
    println!(
        "Penalty: {} free offenses, then {} points doubling",
        config.penalty.grace_offenses, config.penalty.base_points
    );
    println!();

    match config.validate() {
        Ok(()) => println!("✅ Configuration is valid"),
        Err(e) => {
            println!("❌ Configuration validation failed:");
            println!("Error: {e}");
            process::exit(1);
        }
    }
}

async fn test_message(config: &Config, text: &str, remote: bool) {
    let normalized = chat_sentinel::normalize::normalize(text);
    println!("Normalized: {normalized}");

    let matcher = match RuleMatcher::new(&config.rules) {
        Ok(matcher) => matcher,
        Err(e) => {
            eprintln!("❌ Invalid rule configuration: {e}");
            process::exit(1);
        }
    };

    match matcher.check(&normalized) {
        Some(category) => {
            println!("🚫 Rule match: {} - message would be blocked", category.as_str());
            return;
        }
        None => println!("No rule match"),
    }

    if remote {
        let classifier = match RemoteClassifier::new(
            &config.classifier.endpoint,
            config.classifier.timeout(),
        ) {
            Ok(classifier) => classifier,
            Err(e) => {
                eprintln!("❌ Failed to build classifier client: {e}");
                process::exit(1);
            }
        };
        use chat_sentinel::Classify;
        match classifier.classify(&normalized).await {
            Ok(verdict) => {
                println!("Classifier verdict: {:?} (score {:.2})", verdict.label, verdict.score);
                if verdict.score < config.classifier.score_threshold {
                    println!("✅ Below threshold - message would be approved");
                } else {
                    match verdict.label.category() {
                        None => println!("✅ Normal - message would be approved"),
                        Some(category) if category == chat_sentinel::Category::Scam => {
                            println!("⚠️ Scam - approved with a visible warning")
                        }
                        Some(category) => println!(
                            "🚫 {} - blocked with a reputation penalty",
                            category.as_str()
                        ),
                    }
                }
            }
            Err(e) => {
                println!("⚠️ Classifier unavailable ({e}); message would be approved fail-open")
            }
        }
    }
}

async fn run_demo(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let classifier =
        RemoteClassifier::new(&config.classifier.endpoint, config.classifier.timeout())?;
    let engine = ModerationEngine::new(config, classifier, store.clone())?;

    let room_id = "alice_bob";
    let batch = [
        ("m1", "alice", "Chào bạn, hôm nay bạn thế nào?"),
        ("m2", "bob", "nhắn tin FREE sex nha"),
        ("m3", "alice", "liên hệ mình qua www.example.com"),
        ("m4", "bob", "gọi cho tôi 0912345678 nhé"),
        ("m5", "alice", "   "),
    ];

    println!("📨 Processing {} demo messages in room {room_id}", batch.len());
    println!("(remote classifier at {}; failures approve fail-open)", config.classifier.endpoint);
    println!();

    for (message_id, sender, text) in batch {
        let snapshot = json!({ "text": text, "senderId": sender, "status": "pending" });
        store.insert(
            &chat_sentinel::store::message_path(room_id, message_id),
            snapshot.clone(),
        );
        let event = MessageEvent {
            room_id: room_id.to_string(),
            message_id: message_id.to_string(),
            snapshot,
        };

        let outcome = engine.moderate(&event).await;
        println!("{message_id} <{sender}> {text:?}");
        println!("  → {}", describe(&outcome));
    }

    if let Some(room) = store.get(&chat_sentinel::store::room_path(room_id)) {
        println!();
        println!("Room aggregates: {room}");
    }
    Ok(())
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Skipped(SkipReason::NotChatContent) => "skipped (system message)".to_string(),
        Outcome::Skipped(reason) => format!("skipped ({reason:?})"),
        Outcome::Approved {
            score,
            scam_warning: false,
        } => match score {
            Some(score) => format!("approved (score {score:.2})"),
            None => "approved".to_string(),
        },
        Outcome::Approved {
            score,
            scam_warning: true,
        } => format!(
            "approved with scam warning (score {:.2})",
            score.unwrap_or(0.0)
        ),
        Outcome::RuleBlocked(category) => format!("blocked by rule ({})", category.as_str()),
        Outcome::AiBlocked {
            category,
            score,
            violations,
            reputation,
        } => format!(
            "blocked by classifier ({}, score {score:.2}) - violation #{violations}, reputation {reputation}",
            category.as_str()
        ),
    }
}
