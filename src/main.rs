use clap::{Arg, Command};
use log::LevelFilter;
use prism_moderator::classifier::{ClassifierError, ClassifierService, ModelArtifact};
use prism_moderator::config::Config;
use prism_moderator::event_log::EventLogger;
use prism_moderator::moderator::Moderator;
use prism_moderator::platform::{
    Author, ChannelRef, ChatPlatform, InboundMessage, Permissions, PlatformError,
};
use std::collections::HashMap;
use std::path::Path;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("prism-moderator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Chat moderation assistant with a trained text classifier")
        .long_about(
            "Prism Moderator classifies inbound chat messages with a trained \
             text classifier and takes a graduated action based on confidence \
             thresholds:\n\
             - allow below the flag threshold\n\
             - flag for moderator review above it\n\
             - delete and warn above the delete threshold (privileged authors exempt)\n\
             Every action is appended to a capped event history and a static \
             HTML dashboard is regenerated alongside it.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("prism-moderator.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("generate-model")
                .long("generate-model")
                .value_name("FILE")
                .help("Write the built-in demo classifier artifact for trying the pipeline")
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
                .help("Classify a single message and show the policy decision")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("history")
                .long("history")
                .value_name("N")
                .help("Print the last N records of the moderation log")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("demo")
                .long("demo")
                .help("Run in demonstration mode (simulate message processing)")
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

    if let Some(model_path) = matches.get_one::<String>("generate-model") {
        generate_demo_model(model_path);
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
        match config.validate() {
            Ok(()) => {
                println!("Configuration OK");
                println!("  model artifact:   {}", config.model_path);
                println!("  data directory:   {}", config.data_dir);
                println!(
                    "  thresholds:       delete >= {:.2}, flag >= {:.2}",
                    config.policy.delete_threshold, config.policy.flag_threshold
                );
                println!("  retention cap:    {}", config.retention_cap);
                match config.mod_channel_id {
                    Some(id) => println!("  moderator channel: {id}"),
                    None => println!("  moderator channel: unset (guild owner fallback)"),
                }
            }
            Err(e) => {
                println!("Configuration validation failed: {e}");
                process::exit(1);
            }
        }
        return;
    }

    if let Some(n) = matches.get_one::<String>("history") {
        let n: usize = match n.parse() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("--history expects a number, got '{n}'");
                process::exit(1);
            }
        };
        show_history(&config, n);
        return;
    }

    if let Some(text) = matches.get_one::<String>("test-message") {
        test_message(&config, text);
        return;
    }

    if matches.get_flag("demo") {
        if let Err(e) = run_demo(&config).await {
            log::error!("Demo run failed: {e}");
            process::exit(1);
        }
        return;
    }

    // Default invocation: verify the setup is ready to moderate. The chat
    // platform transport is owned by the embedding host, so there is no
    // event loop to run from here.
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        process::exit(1);
    }
    match ClassifierService::load(&config.model_path) {
        Ok(service) => {
            log::info!(
                "Classifier ready with labels: {}",
                service.labels().join(", ")
            );
            println!("Setup OK. Embed prism_moderator in your platform host to moderate,");
            println!("or run with --demo to simulate message processing.");
        }
        Err(e) => {
            // Without its artifact the classifier cannot function; refuse
            // to pretend we could moderate.
            eprintln!("Cannot start moderating: {e}");
            if matches!(e, ClassifierError::ModelNotFound { .. }) {
                eprintln!("Train a model first, or write a demo artifact with --generate-model");
            }
            process::exit(1);
        }
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn generate_demo_model(path: &str) {
    let artifact = ModelArtifact::demo();
    let serialized = match serde_json::to_string_pretty(&artifact) {
        Ok(serialized) => serialized,
        Err(e) => {
            eprintln!("Error serializing demo model: {e}");
            process::exit(1);
        }
    };
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error creating {}: {e}", parent.display());
                process::exit(1);
            }
        }
    }
    match std::fs::write(path, serialized) {
        Ok(()) => {
            println!("Demo classifier artifact written to: {path}");
            println!("It is hand-weighted for demonstrations; train a real model for production.");
        }
        Err(e) => {
            eprintln!("Error writing demo model: {e}");
            process::exit(1);
        }
    }
}

fn show_history(config: &Config, n: usize) {
    let logger = match EventLogger::new(Path::new(&config.data_dir), config.retention_cap) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Error opening data directory: {e}");
            process::exit(1);
        }
    };
    match logger.tail(n) {
        Ok(lines) if lines.is_empty() => println!("No moderation events logged yet."),
        Ok(lines) => {
            println!("Last {} moderation events:", lines.len());
            for line in lines {
                println!("  {line}");
            }
        }
        Err(e) => {
            eprintln!("Error reading moderation log: {e}");
            process::exit(1);
        }
    }
}

fn test_message(config: &Config, text: &str) {
    let service = match ClassifierService::load(&config.model_path) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Cannot load classifier: {e}");
            if matches!(e, ClassifierError::ModelNotFound { .. }) {
                eprintln!("Write a demo artifact with --generate-model to try the pipeline");
            }
            process::exit(1);
        }
    };

    match service.classify(text) {
        Ok(prediction) => {
            let action = config.policy.decide(prediction.confidence, false);
            println!("Message:    {text}");
            println!("Label:      {}", prediction.label);
            println!("Confidence: {:.3}", prediction.confidence);
            println!("Action:     {action:?} (for an unprivileged author)");
        }
        Err(e) => {
            eprintln!("Prediction failed: {e}");
            process::exit(1);
        }
    }
}

/// Stand-in platform for `--demo`: prints every effect it is asked to
/// perform instead of talking to a real chat service.
struct ConsolePlatform {
    permissions: HashMap<u64, Permissions>,
}

const DEMO_BOT_ID: u64 = 1;

#[async_trait::async_trait]
impl ChatPlatform for ConsolePlatform {
    fn self_id(&self) -> u64 {
        DEMO_BOT_ID
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError> {
        println!("  [platform] deleted message {message_id} in channel {channel_id}");
        Ok(())
    }

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> Result<(), PlatformError> {
        println!("  [platform] -> channel {channel_id}: {}", text.replace('\n', " | "));
        Ok(())
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), PlatformError> {
        println!("  [platform] -> DM {user_id}: {}", text.replace('\n', " | "));
        Ok(())
    }

    async fn send_channel_file(&self, channel_id: u64, path: &Path) -> Result<(), PlatformError> {
        println!(
            "  [platform] -> channel {channel_id}: attached {}",
            path.display()
        );
        Ok(())
    }

    async fn send_direct_file(
        &self,
        user_id: u64,
        path: &Path,
        note: &str,
    ) -> Result<(), PlatformError> {
        println!("  [platform] -> DM {user_id}: {note} {}", path.display());
        Ok(())
    }

    async fn permissions(&self, _channel_id: u64, user_id: u64) -> Result<Permissions, PlatformError> {
        Ok(self.permissions.get(&user_id).copied().unwrap_or_default())
    }
}

async fn run_demo(config: &Config) -> anyhow::Result<()> {
    println!("Running demonstration with the built-in demo classifier");
    println!();

    let classifier = Arc::new(
        ClassifierService::from_artifact(ModelArtifact::demo())
            .map_err(|e| anyhow::anyhow!("demo artifact rejected: {e}"))?,
    );
    let logger = EventLogger::new(Path::new(&config.data_dir), config.retention_cap)?;
    let mut demo_config = config.clone();
    demo_config.mod_channel_id = Some(900);
    let moderator = Moderator::new(classifier, logger, &demo_config);

    let platform = ConsolePlatform {
        permissions: HashMap::from([
            (
                20,
                Permissions {
                    administrator: true,
                    ..Permissions::none()
                },
            ),
            (21, Permissions::moderator()),
        ]),
    };

    let script: Vec<(u64, &str, &str)> = vec![
        (10, "casual_carl", "hey everyone, thanks for joining the meeting"),
        (11, "promo_pete", "free stuff for everyone today"),
        (12, "rude_randy", "you are worthless and should quit"),
        (20, "admin_alice", "urgent verify your bank account password"),
        (21, "mod_mary", "!history 5"),
        (21, "mod_mary", "!dashboard"),
    ];

    for (i, (author_id, author_name, content)) in script.into_iter().enumerate() {
        let message = InboundMessage {
            id: 1000 + i as u64,
            author: Author {
                id: author_id,
                name: author_name.to_string(),
                is_automated: false,
            },
            channel: ChannelRef {
                id: 100,
                guild: "demo-guild".to_string(),
                name: "general".to_string(),
                owner_id: Some(20),
            },
            content: content.to_string(),
            is_direct: false,
        };

        println!("{author_name}: {content}");
        let outcome = moderator.process(&platform, &message).await;
        println!("  outcome: {outcome:?}");
        println!();
    }

    println!(
        "Event history: {}",
        moderator.logger().events_path().display()
    );
    println!(
        "Dashboard:     {}",
        moderator.logger().dashboard_path().display()
    );
    Ok(())
}
