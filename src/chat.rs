// Terminal front end for the analyst chat: same context and turn loop as the
// web UI, fed from stdin.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

use crate::analyst::{AnalystContext, AnalystProfile, ConfigureOutcome, TurnOutcome, Upload};
use crate::config::Settings;

const EXIT_COMMANDS: &[&str] = &["exit", "quit"];

pub async fn run_terminal_chat(settings: &Settings, profile: AnalystProfile, file: &Path) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let mut context = AnalystContext::new(profile);
    match context
        .configure(settings, None, Some(Upload { file_name, bytes }))
        .await
    {
        ConfigureOutcome::Initialized | ConfigureOutcome::AlreadyInitialized => {}
        ConfigureOutcome::MissingInput => {
            bail!("No API key available. Pass --api-key or set GOOGLE_API_KEY.")
        }
        ConfigureOutcome::Failed(message) => bail!(message),
    }

    let mut stdout = tokio::io::stdout();
    for message in context.transcript() {
        write_line(&mut stdout, &message.content).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if EXIT_COMMANDS.contains(&question) {
            break;
        }
        match context.ask(question).await {
            TurnOutcome::Answered(reply) => write_line(&mut stdout, &reply).await?,
            TurnOutcome::Failed(message) => eprintln!("{}", message),
            TurnOutcome::Ignored => {}
        }
    }

    info!(turns = context.transcript().len(), "Chat session finished");
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}
