//! `maitre chat` — Interactive or single-message conversation through the
//! full pipeline.

use maitre_config::AppConfig;
use maitre_core::ChannelKind;
use maitre_pipeline::{Pipeline, PipelineBuilder, RespondRequest};
use std::io::Write;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::debug;

pub async fn run(
    message: Option<String>,
    user: String,
    group: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    MAITRE_API_KEY      (generic)");
        eprintln!("    OPENROUTER_API_KEY  (recommended)");
        eprintln!("    OPENAI_API_KEY      (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let channel = if group {
        ChannelKind::Group
    } else {
        ChannelKind::Direct
    };
    let pipeline = PipelineBuilder::from_config(&config).await?.build();
    debug!(user_id = %user, %channel, provider = pipeline.provider_name(), "Chat session started");

    match message {
        Some(text) => {
            let reply = pipeline
                .respond(RespondRequest::new(&user, text).with_channel(channel))
                .await;
            println!("{}", reply.text);
        }
        None => interactive(&pipeline, &config, &user, channel).await?,
    }

    let dropped = pipeline.writer().dropped();
    if dropped > 0 {
        debug!(dropped, "Background jobs dropped during session");
    }
    pipeline.shutdown().await;
    Ok(())
}

async fn interactive(
    pipeline: &Pipeline,
    config: &AppConfig,
    user: &str,
    channel: ChannelKind,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  maitre — {}", config.persona.venue_name);
    println!();
    println!("  Provider:  {}", pipeline.provider_name());
    println!("  Model:     {}", config.default_model);
    println!("  User:      {user}");
    println!("  Channel:   {channel}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  '/reset' forgets the conversation, 'exit' quits.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "exit" | "quit" | "/exit" | "/quit" | ":q" => break,
            "/reset" => {
                pipeline.reset(user);
                println!("  (conversation cleared)");
            }
            text => {
                let reply = pipeline
                    .respond(RespondRequest::new(user, text).with_channel(channel))
                    .await;
                println!();
                for reply_line in reply.text.lines() {
                    println!("  Assistant > {reply_line}");
                }
                println!("  [{} · {:.2}]", reply.intent.intent, reply.intent.confidence);
                println!();
            }
        }
        prompt()?;
    }

    println!();
    println!("  До встречи!");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
