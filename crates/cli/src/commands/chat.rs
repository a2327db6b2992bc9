//! `carwise chat` and `carwise ask`.

use std::io::Write;

use carwise_agent::{ChatReply, FallbackOrchestrator};
use carwise_core::message::SessionId;
use carwise_core::store::DocumentStore;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::runtime::Runtime;

pub async fn ask(message: &str, show_attempts: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let orchestrator = runtime.orchestrator()?;
    let session = SessionId::new();

    eprint!("  Thinking...");
    let result = orchestrator.respond(message, &session).await;
    eprint!("\r              \r");

    match result {
        Ok(reply) => {
            println!("{}", reply.answer_text);
            print_footer(&reply, show_attempts);
        }
        Err(e) => {
            tracing::error!(error = %e, "No tier could answer");
            println!("{}", orchestrator.apology());
        }
    }
    Ok(())
}

pub async fn run(session: Option<String>, show_attempts: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let orchestrator = runtime.orchestrator()?;
    let session = session.map(|s| SessionId::from(&s)).unwrap_or_default();

    print_banner(&runtime, &orchestrator).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "exit" | "quit" => break,
            "/reset" => {
                orchestrator.sessions().reset(&session).await;
                println!("  Conversation cleared.\n");
            }
            "/info" => {
                let memory = orchestrator.sessions().get_or_create(&session).await;
                let info = memory.lock().await.info();
                println!("  Exchanges: {}", info.exchanges);
                println!("  Summary:   {}", if info.summary.is_empty() { "-" } else { info.summary.as_str() });
                println!("  Topics:    {}\n", info.recent_topics.join(", "));
            }
            _ => {
                eprint!("  ...");
                let result = orchestrator.respond(input, &session).await;
                eprint!("\r     \r");
                println!();
                match result {
                    Ok(reply) => {
                        for line in reply.answer_text.lines() {
                            println!("  Carwise > {line}");
                        }
                        print_footer(&reply, show_attempts);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "No tier could answer");
                        println!("  Carwise > {}", orchestrator.apology());
                    }
                }
                println!();
            }
        }
        prompt()?;
    }

    println!();
    println!("  Tạm biệt! 🚗");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  Bạn > ");
    std::io::stdout().flush()
}

async fn print_banner(runtime: &Runtime, orchestrator: &FallbackOrchestrator) {
    let chunks = runtime.store.count().await.unwrap_or(0);
    let search = if orchestrator.web_search().is_enabled() {
        "enabled".to_string()
    } else {
        format!("disabled ({})", orchestrator.web_search().disabled_reason().unwrap_or("-"))
    };

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        Carwise: Tư vấn ô tô thông minh         ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:       {}", runtime.config.default_model);
    println!("  Knowledge:   {chunks} chunks");
    println!("  Web search:  {search}");
    println!();
    println!("  Commands: /reset, /info, exit");
    println!();
}

fn print_footer(reply: &ChatReply, show_attempts: bool) {
    if !reply.sources.is_empty() {
        println!("  [{}] sources: {}", reply.path, reply.sources.join(", "));
    }
    if show_attempts {
        println!("  route: {} ({})", reply.route.path, reply.route.reason);
        for attempt in &reply.attempts {
            println!("  - {}: {}", attempt.state, attempt.outcome);
        }
    }
}
