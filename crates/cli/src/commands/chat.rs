//! `chatdesk chat`: interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;

use chatdesk_agent::ChatService;
use chatdesk_core::session::{ConversationStatus, SessionId};
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
    session: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    if !config.has_api_key() && !matches!(config.provider.as_str(), "ollama" | "vllm" | "llamacpp") {
        eprintln!();
        eprintln!("  ERROR: No API key configured for provider '{}'.", config.provider);
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    CHATDESK_API_KEY=...   (any provider)");
        eprintln!("    GEMINI_API_KEY=...     (Gemini)");
        eprintln!("    OPENAI_API_KEY=...     (OpenAI)");
        eprintln!();
        eprintln!("  Or add api_key to {}", chatdesk_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let service = chatdesk_gateway::build_service(&config).await?;
    let mut session_id = session.map(SessionId::from);

    if let Some(msg) = message {
        let reply = service.handle(&msg, session_id).await?;
        println!("{}", reply.message);
        eprintln!("  session: {} ({})", reply.session_id, status_label(reply.status));
        return Ok(());
    }

    println!();
    println!("  chatdesk: interactive mode");
    println!("  Provider:  {} ({})", config.provider, config.model);
    println!("  Type your message and press Enter. Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        if turn(&service, line, &mut session_id).await {
            println!("  (conversation closed)");
            break;
        }
    }

    println!();
    Ok(())
}

/// Send one line; returns true once the conversation has ended.
async fn turn(service: &ChatService, line: &str, session_id: &mut Option<SessionId>) -> bool {
    match service.handle(line, session_id.clone()).await {
        Ok(reply) => {
            println!();
            for text in reply.message.lines() {
                println!("  Assistant > {text}");
            }
            println!();
            *session_id = Some(reply.session_id);
            reply.status == ConversationStatus::Ended
        }
        Err(e) => {
            eprintln!("  [Error] {e}");
            println!();
            false
        }
    }
}

fn status_label(status: ConversationStatus) -> &'static str {
    match status {
        ConversationStatus::Active => "active",
        ConversationStatus::Ended => "ended",
    }
}
