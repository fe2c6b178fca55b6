//! Anonymous chat server.
//!
//! Configured from the environment (and `.env`); see
//! [`ServerConfig::from_env`]. Set `BLOCKED_WORDS` to enable the word-list
//! filter.

use duochat::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duochat=info,duochat_room=info,duochat_moderation=info,chat_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn build(config: ServerConfig) -> Result<DuochatServer<JsonCodec>, DuochatError> {
    let words = config.blocked_words.clone();
    let builder = DuochatServer::builder().config(config);
    if words.is_empty() {
        builder.filter(AllowAll).build().await
    } else {
        tracing::info!(words = words.len(), "word-list filter enabled");
        builder.filter(WordListFilter::new(words)).build().await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = ServerConfig::from_env()?;
    let server = build(config).await?;

    tracing::info!(
        ws = ?server.local_addr().ok(),
        http = ?server.http_addr(),
        "chat server listening"
    );
    server.run().await?;
    Ok(())
}
