use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::application::{LedgerService, UserProfile};
use crate::conversation::Dialogue;

use super::render_reply;

/// Read messages from stdin, one per line, until EOF or `/quit`.
pub(super) async fn run_chat(service: LedgerService, profile: UserProfile) -> Result<()> {
    let dialogue = Dialogue::new(service);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!(user = profile.user_key, "chat session started");
    let greeting = dialogue.handle(&profile, "/start").await;
    stdout.write_all(render_reply(&greeting).as_bytes()).await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        let reply = dialogue.handle(&profile, line).await;
        stdout.write_all(render_reply(&reply).as_bytes()).await?;
        stdout.flush().await?;
    }

    info!(user = profile.user_key, "chat session ended");
    Ok(())
}
