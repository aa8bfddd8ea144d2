//! One-shot send command.

use std::path::Path;

use anyhow::{Context, Result};
use deckchat_core::client::ChatClient;
use deckchat_core::config::Config;
use deckchat_core::session::Session;

use crate::cli::render;

pub struct SendOptions<'a> {
    pub message: &'a str,
    pub conversation: Option<&'a str>,
    pub no_stream: bool,
    pub save_deck: Option<&'a Path>,
    pub config: &'a Config,
}

pub async fn run(options: SendOptions<'_>) -> Result<()> {
    let client = ChatClient::from_config(options.config)?;
    let mut session = match options.conversation {
        Some(id) => Session::resume(id),
        None => Session::new(),
    };

    if options.no_stream {
        session.send_once(&client, options.message).await?;
    } else {
        session
            .send_with(&client, options.message, |event, _| {
                if let Some(line) = render::event_line(event) {
                    eprintln!("{line}");
                }
            })
            .await?;
    }

    if let Some(reply) = session.conversation.last_reply() {
        println!("{}", render::reply(reply));
    }
    if let Some(id) = session.conversation.conversation_id() {
        eprintln!("conversation: {id}");
    }

    if let Some(path) = options.save_deck {
        let Some(deck) = session.deck.current() else {
            anyhow::bail!("The reply did not include a presentation");
        };
        let json = serde_json::to_string_pretty(deck).context("serialize deck")?;
        std::fs::write(path, json)
            .with_context(|| format!("write deck to {}", path.display()))?;
        eprintln!("Saved deck to {}", path.display());
    }

    Ok(())
}
