//! Gossip Node Binary
//!
//! Speaks newline-delimited JSON on stdin/stdout. Logs go to stderr.

use tokio::io::BufReader;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use gossip_node::network::transport::write_lines;
use gossip_node::node::config::CONFIG_ENV;
use gossip_node::node::{GossipNode, NodeConfig};

#[tokio::main]
async fn main() {
    let (config, source) = match NodeConfig::from_env() {
        Ok(Some(cfg)) => (cfg, Ok(CONFIG_ENV)),
        Ok(None) => (NodeConfig::default(), Ok("defaults")),
        Err(e) => (NodeConfig::default(), Err(e)),
    };

    // Initialize logging
    let level = config.logging.level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    match source {
        Ok(from) => info!("Configuration loaded from {}", from),
        Err(e) => error!("Failed to load config, using defaults: {}", e),
    }
    info!(
        "Retry timeout: {}ms, max retries: {}",
        config.gossip.retry_timeout_ms, config.gossip.max_retries
    );

    let node = GossipNode::new(config);

    let Some(outgoing) = node.transport().take_receiver() else {
        error!("Outbound receiver already taken");
        std::process::exit(1);
    };
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        if let Err(e) = write_lines(outgoing, &mut stdout).await {
            error!("Writer stopped: {}", e);
        }
    });

    if let Err(e) = node.run(BufReader::new(tokio::io::stdin())).await {
        error!("Node stopped: {}", e);
        std::process::exit(1);
    }

    // Pending retries are abandoned with the process
    info!("Goodbye!");
}
