//! The `search` and `chat` subcommands.

use std::io::Write;

use anyhow::Result;
use ragchat_core::{ChatRequest, RagPipeline, SourceRef};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

const PREVIEW_WIDTH: usize = 120;

/// Print the ranked chunks for one query.
pub async fn search(pipeline: &RagPipeline, query: &str) -> Result<()> {
    let results = pipeline.query(query).await?;
    if results.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let chunk = &result.chunk;
        println!(
            "{}. [{:.3}] {} ({}..{})",
            rank + 1,
            result.score,
            chunk.id,
            chunk.start_offset,
            chunk.end_offset
        );
        println!("   {}", one_line(&chunk.text, PREVIEW_WIDTH));
    }
    Ok(())
}

/// Run the interactive chat loop until `/quit` or end of input.
pub async fn chat(pipeline: &RagPipeline, session: Option<String>, use_rag: bool) -> Result<()> {
    let session_id = pipeline.conversations().create_session(session.as_deref()).await;
    println!("Session {session_id}. Commands: /history, /clear, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for message in pipeline.conversations().history(&session_id).await {
                    println!("{}: {}", message.role.as_str(), message.text);
                }
                continue;
            }
            "/clear" => {
                pipeline.conversations().clear_session(&session_id).await;
                println!("History cleared.");
                continue;
            }
            _ => {}
        }

        let request = ChatRequest::new(line).with_session(&session_id).with_rag(use_rag);
        match pipeline.chat(request).await {
            Ok(reply) => {
                println!("{}", reply.response);
                print_sources(&reply.sources);
            }
            Err(e) => warn!(error = %e, "turn failed"),
        }
    }
    Ok(())
}

fn print_sources(sources: &[SourceRef]) {
    if sources.is_empty() {
        return;
    }
    println!();
    for source in sources {
        let name = source.source_name.as_deref().unwrap_or(&source.document_id);
        println!("  [{:.3}] {name}: {}", source.score, one_line(&source.preview, PREVIEW_WIDTH));
    }
}

/// Collapse whitespace and cut to `width` characters.
fn one_line(text: &str, width: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        return flat;
    }
    let mut cut: String = flat.chars().take(width).collect();
    cut.push_str("...");
    cut
}
