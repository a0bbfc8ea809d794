//! Chorus swarm simulator
//!
//! Runs a small swarm over a lossy in-memory medium and logs what emerged.

use chorus_node::{NodeConfig, Swarm};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chorus_sim=info,chorus_node=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let nodes: usize = env_or("CHORUS_SIM_NODES", 4);
    let seconds: u32 = env_or("CHORUS_SIM_SECONDS", 60);
    let loss: f64 = env_or("CHORUS_SIM_LOSS", 0.2);
    let template = NodeConfig::from_env()?;
    let seed = template.seed;

    info!(nodes, seconds, loss, seed, "starting swarm simulation");
    let mut swarm = Swarm::new(nodes, template, loss, seed)?;

    // New situation every five simulated seconds.
    for _ in 0..seconds.div_ceil(5) {
        swarm.shuffle_situations();
        swarm.run_for(5_000);
    }

    for member in swarm.members() {
        let node = &member.node;
        info!(
            node = %node.id(),
            leader = ?node.coordination().leader(),
            words = node.signals().vocabulary().len(),
            peers = node.peers().len(),
            health = %node.ecosystem().swarm_health(),
            "node summary"
        );
    }
    let stats = swarm.stats();
    info!(sent = stats.sent, delivered = stats.delivered, dropped = stats.dropped, "medium summary");
    Ok(())
}
