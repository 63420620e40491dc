use anyhow::{Context, anyhow};
use log::Level;
use stage_director::{
    Author, Director, GithubSource, Host, MemoryHost, OpenAIBackend, Settings, ThreadMessage,
    logging,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const AI_PREFIX: &str = "ai: ";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load();
    let log_dir = settings.log_dir();
    logging::init(&log_dir, Level::Debug).context("failed to initialize logging")?;

    let api_key = settings
        .openai_api_key
        .clone()
        .ok_or_else(|| anyhow!("no OpenAI API key in settings or OPENAI_API_KEY"))?;
    let backend = Arc::new(OpenAIBackend::new(&api_key, settings.model.clone()));
    let source = Arc::new(GithubSource::from_settings(&settings));
    let host = MemoryHost::new(settings.character_name.clone(), settings.user_name.clone());

    let mut director = Director::new(settings, host, source, backend);
    director.initialize().await?;
    write_panel(&director, &log_dir).await?;
    println!(
        "Stage {} loaded. Type messages; prefix character replies with \"{AI_PREFIX}\".",
        director.state().current_stage_number
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message = match line.strip_prefix(AI_PREFIX) {
            Some(content) => ThreadMessage::ai(content),
            None => ThreadMessage::user(line),
        };

        let seen = director.host().messages().len();
        director.host_mut().push_message(message.clone());
        match director.on_message_added(message).await {
            Ok(outcome) => log::debug!("[Console] {outcome:?}"),
            Err(e) => {
                log::error!("[Console] {e}");
                eprintln!("Error: {e}");
            }
        }

        for message in director.host().messages().iter().skip(seen) {
            if message.author == Author::System {
                println!("[system] {}", message.content);
            }
        }
        write_panel(&director, &log_dir).await?;
    }

    Ok(())
}

async fn write_panel(director: &Director<MemoryHost>, log_dir: &Path) -> anyhow::Result<()> {
    if let Some(panel) = &director.host().panel {
        tokio::fs::write(log_dir.join("panel.html"), panel)
            .await
            .context("failed to write panel.html")?;
    }
    Ok(())
}
