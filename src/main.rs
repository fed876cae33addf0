use std::path::PathBuf;

use anyhow::{Context, Result};
use replay_embed::dom::Realm;
use replay_embed::harness::{render_posted, Harness};
use replay_embed::{mount, EmbedConfig, EmbedParams, MessageRelay};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

const EMBED_PAGE_HTML: &str = "<!DOCTYPE html><html><head></head><body></body></html>";

fn main() -> Result<()> {
    let query = std::env::args().nth(1).unwrap_or_default();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let config_path = std::env::var("REPLAY_EMBED_CONFIG")
        .ok()
        .map(PathBuf::from);
    let config = EmbedConfig::load(config_path).context("failed to load embed config")?;
    let params = EmbedParams::from_query(&query).context("invalid embed query")?;
    let identity = config
        .identity_for(&query)
        .context("failed to build page identity")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    LocalSet::new().block_on(&runtime, run(config, params, identity))
}

async fn run(config: EmbedConfig, params: EmbedParams, identity: String) -> Result<()> {
    let realm = Realm::new();
    let document = realm.parse_document(EMBED_PAGE_HTML);
    let player = mount(&document, &params, &config.replay_base)?;

    let (harness, mut parent_outbox) = Harness::new(&config.replay_base);
    let relay = MessageRelay::new(player, harness.parent(), identity)
        .with_resolver_settings(&config.resolver);
    tracing::info!(identity = relay.identity(), "relay ready");

    let printer = tokio::task::spawn_local(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(posted) = parent_outbox.recv().await {
            let mut line = render_posted(&posted)?;
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = Vec::new();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match harness.event_for(&line) {
            Ok(event) => pending.extend(relay.handle_message(&event).overrides),
            Err(err) => tracing::warn!(error = %err, "skipping input line"),
        }
        pending.retain(|handle| !handle.is_finished());
    }

    for handle in pending {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "override task panicked");
        }
    }

    // Dropping the last parent handles closes the outbox and ends the printer.
    drop(relay);
    drop(harness);
    printer.await.context("printer task failed")??;
    Ok(())
}
