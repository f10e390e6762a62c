use anyhow::Result;
use chrono::Local;
use emotia_classifier::ClassificationGateway;
use emotia_core::{generate_user_id, ChatMessage, Config, CredentialProvider, EmotionAnnotation};
use emotia_session::{SendError, SessionManager};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::helpers::build_gateway;

const QUIT_COMMAND: &str = "/quit";

fn render_message(message: &ChatMessage) -> String {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");
    let emoji = message
        .emotion
        .as_ref()
        .map_or(String::new(), |emotion| format!(" {}", emotion.emoji));
    format!("[{time}] {}: {}{emoji}", message.sender_id, message.text)
}

/// Classify an outgoing line when annotation is enabled; failures only lose the annotation
async fn annotate(gateway: Option<&ClassificationGateway>, text: &str) -> Option<EmotionAnnotation> {
    let gateway = gateway?;
    match gateway.classify(text).await {
        Ok(result) => Some(result.annotation()),
        Err(e) => {
            log::warn!("Could not classify outgoing message: {e}");
            None
        }
    }
}

pub async fn chat_command(
    mut config: Config,
    server: Option<String>,
    user: Option<String>,
    annotate_outgoing: bool,
) -> Result<()> {
    if let Some(server) = server {
        config.session.server_url = server;
    }
    let user_id = user.unwrap_or_else(generate_user_id);

    let gateway = if annotate_outgoing {
        if config.credential().is_none() {
            anyhow::bail!("--annotate needs an API key; run `emotia config set-key <KEY>`");
        }
        Some(build_gateway(&config)?)
    } else {
        None
    };

    let session = SessionManager::websocket(&config.session, user_id);
    let own_id = session.user_id().to_string();
    session.on_status_change(|status| println!("* {status}"));
    session.on_message(move |message| {
        if message.sender_id != own_id {
            println!("{}", render_message(message));
        }
    });
    session.on_typing(|peer, is_typing| {
        if is_typing {
            println!("* {peer} is typing...");
        }
    });
    session.on_emotion(|emotion| {
        println!("* your last message read as {} {}", emotion.emoji, emotion.label);
    });

    println!("Joining {} (type {QUIT_COMMAND} to leave)", session.url());
    session.open()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text == QUIT_COMMAND {
            break;
        }
        if text.is_empty() {
            continue;
        }
        let emotion = annotate(gateway.as_ref(), text).await;
        match session.send_annotated(text, emotion) {
            Ok(message) => println!("{}", render_message(&message)),
            Err(SendError::NotConnected(status)) => {
                println!("* not sent, session is {status}");
            }
            Err(e) => println!("* not sent: {e}"),
        }
    }

    session.close();
    session.join().await;
    Ok(())
}
