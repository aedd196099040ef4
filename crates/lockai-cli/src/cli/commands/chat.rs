//! Chat command: sends one message and streams the reply to the terminal.

use std::io::Write;

use anyhow::{Context, Result, bail};
use lockai_core::chat::events::{EventSender, ExchangeEvent, create_event_channel};
use lockai_core::config::Config;
use lockai_core::workspace::Workspace;
use tokio_util::sync::CancellationToken;

pub async fn run(config: Config, message: &str, session: Option<String>) -> Result<()> {
    let mut workspace = Workspace::new(config);
    if let Some(id) = session {
        workspace
            .select_session(&id)
            .with_context(|| format!("open session '{id}'"))?;
    }

    let (tx, mut rx) = create_event_channel();
    let sender = EventSender::new(tx);

    let printer = tokio::spawn(async move {
        let mut failure: Option<String> = None;
        while let Some(event) = rx.recv().await {
            match &*event {
                ExchangeEvent::Delta { text } => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                ExchangeEvent::SearchStarted { query } => {
                    eprintln!("正在搜索: {query}");
                }
                ExchangeEvent::SearchKeywords { keywords } => {
                    eprintln!("关键词: {}", keywords.join("、"));
                }
                ExchangeEvent::DrawingStarted { prompt } => {
                    eprintln!("正在生成图片: {prompt}");
                }
                ExchangeEvent::ImageReady { url } => {
                    println!("\n![生成的图片]({url})");
                }
                ExchangeEvent::Completed { .. } => {
                    println!();
                }
                ExchangeEvent::Failed { message } => {
                    failure = Some(message.clone());
                }
            }
        }
        failure
    });

    let cancel = CancellationToken::new();
    workspace.send_message(message, &sender, &cancel).await?;

    // Close the channel so the printer drains and exits.
    drop(sender);
    let failure = printer.await.context("event printer crashed")?;

    if let Some(message) = failure {
        bail!("{message}");
    }

    if let Some(id) = workspace.active_session_id() {
        eprintln!("会话: {id}");
    }
    Ok(())
}
