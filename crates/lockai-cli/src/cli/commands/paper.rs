//! Paper command handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use lockai_core::config::Config;
use lockai_core::paper::tracker::{PaperPhase, PaperTracker};
use lockai_core::store::records;
use lockai_core::workspace::Workspace;
use tokio::sync::Mutex;

pub async fn generate(config: Config, topic: &str) -> Result<()> {
    let mut workspace = Workspace::new(config);
    let display = spawn_stage_printer(workspace.tracker());

    workspace.generate_paper(topic).await?;

    display.await.context("stage printer crashed")?;
    report_outcome(&workspace.tracker()).await
}

pub async fn revise(config: Config, id: &str, instruction: &str) -> Result<()> {
    let mut workspace = Workspace::new(config);
    let display = spawn_stage_printer(workspace.tracker());

    workspace.revise_paper(id, instruction).await?;

    display.await.context("stage printer crashed")?;
    report_outcome(&workspace.tracker()).await
}

pub async fn status(config: Config, id: &str) -> Result<()> {
    let workspace = Workspace::new(config);
    let snapshot = workspace
        .api()
        .paper_status(id)
        .await
        .with_context(|| format!("fetch status for paper '{id}'"))?;

    println!("状态: {}", snapshot.status);
    if let Some(detail) = snapshot.progress_detail {
        println!("进度: {detail}");
    }
    if let Some(url) = snapshot.pdf_url {
        println!("PDF: {url}");
    }
    if let Some(error) = snapshot.error {
        println!("错误: {error}");
    }
    Ok(())
}

pub async fn watch(config: Config, id: &str) -> Result<()> {
    let mut workspace = Workspace::new(config);
    workspace
        .select_paper(id)
        .await
        .with_context(|| format!("resume tracking paper '{id}'"))?;

    if let Some(lease) = workspace.take_poll_lease() {
        let display = spawn_stage_printer(workspace.tracker());
        lease.join().await;
        workspace.sync_active_record().await;
        display.await.context("stage printer crashed")?;
    }

    report_outcome(&workspace.tracker()).await
}

pub fn list() -> Result<()> {
    let records = records::list_records().context("list paper records")?;
    if records.is_empty() {
        println!("No paper records found.");
        return Ok(());
    }

    for record in records {
        let pdf = record.pdf_url.as_deref().unwrap_or("-");
        println!(
            "{}  {}  {}  {}",
            record.id, record.status, record.topic, pdf
        );
    }
    Ok(())
}

pub async fn delete(config: Config, id: &str) -> Result<()> {
    let mut workspace = Workspace::new(config);
    workspace
        .delete_paper(id)
        .await
        .with_context(|| format!("delete paper record '{id}'"))?;
    println!("Deleted paper record {id}");
    Ok(())
}

/// Prints stage transitions until the tracker reaches a terminal phase.
fn spawn_stage_printer(tracker: Arc<Mutex<PaperTracker>>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_stage = String::new();
        loop {
            let (phase, stage, detail) = {
                let tracker = tracker.lock().await;
                (
                    tracker.phase(),
                    tracker.stage().to_string(),
                    tracker.detail().to_string(),
                )
            };

            if stage != last_stage && !stage.is_empty() {
                if detail.is_empty() {
                    println!("[{stage}]");
                } else {
                    println!("[{stage}] {detail}");
                }
                last_stage = stage;
            }

            if matches!(phase, PaperPhase::Completed | PaperPhase::Errored) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
}

async fn report_outcome(tracker: &Arc<Mutex<PaperTracker>>) -> Result<()> {
    let tracker = tracker.lock().await;
    match tracker.phase() {
        PaperPhase::Completed => {
            if let Some(error) = tracker.revision_error() {
                println!("修改失败: {error}");
            }
            match tracker.pdf_url() {
                Some(url) => println!("论文已完成: {url}"),
                None => println!("论文已完成"),
            }
            Ok(())
        }
        PaperPhase::Errored => {
            bail!("生成失败: {}", tracker.error().unwrap_or("未知错误"))
        }
        phase => bail!("论文未完成 (当前阶段: {phase:?})"),
    }
}
