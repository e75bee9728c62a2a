use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::ReportError;
use crate::llm::ModelGateway;
use crate::memory::{ConversationEntry, ConversationMemory};

/// System instructions for the analysis model.
pub const ANALYST_PERSONA: &str = "\
You are a compassionate, highly-experienced clinical psychologist (PhD-level) assistant.
Your task: read a full user conversation transcript and produce a concise, evidence-based analysis.
Always be empathetic, nonjudgmental, and cautious.
Use screening concepts like PHQ-9, GAD-7, GHQ if relevant.
Do not provide a definitive medical diagnosis; instead, use \"probable\" or \"possible.\"
Prioritize safety: if suicidal ideation or self-harm risk is detected, recommend immediate professional help.

Mental illness categories you must use: Anxiety, Depression, Burnout, Sleep disorders, Academic stress, Social isolation.
You may combine them if relevant (e.g., \"probable Depression and Academic stress\").

Output Format:
Return only a JSON object in this exact structure:
{
  \"analysied_report\": \"...\",
  \"root_case\": \"...\",
  \"mental_illness\": \"...\",
  \"problem\": \"...\",
  \"recommendation\": \"...\"
}

Rules:
- Each value must be a string in double quotes.
- Do not output explanations or extra text.
- \"mental_illness\" must only mention one or more of the defined categories (with probable/possible if appropriate).
- Use plain English, concise, one to three sentences max.
";

const REPORT_PREFIX: &str = "mental_health_report_";

/// Structured analysis returned by the model.
///
/// Field names match the keys the model is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub analysied_report: String,
    pub root_case: String,
    pub mental_illness: String,
    pub problem: String,
    pub recommendation: String,
}

impl Analysis {
    /// Parses a model reply, tolerating Markdown code fences.
    pub fn parse(reply: &str) -> Option<Self> {
        serde_json::from_str(strip_fences(reply)).ok()
    }

    /// Wraps an unstructured reply so the report still carries it.
    pub fn unstructured(reply: &str) -> Self {
        Self {
            analysied_report: reply.to_string(),
            root_case: "Analysis completed but format may need review".into(),
            mental_illness: "Analysis in progress".into(),
            problem: "Detailed analysis provided in report".into(),
            recommendation: "Please review the analysis report".into(),
        }
    }
}

fn strip_fences(reply: &str) -> &str {
    let text = reply.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// A saved report document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: String,
    pub conversation_count: usize,
    pub analysis: Analysis,
    pub conversation_data: Vec<ConversationEntry>,
}

/// Result of [`ReportGenerator::generate`].
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub filename: String,
    pub path: PathBuf,
    pub report: Report,
}

/// Listing entry for a saved report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub filename: String,
    pub created: String,
    pub size: u64,
}

/// Produces clinical-style summaries of the conversation window and keeps
/// them as JSON files in a reports directory.
pub struct ReportGenerator {
    dir: PathBuf,
    gateway: Arc<ModelGateway>,
}

impl ReportGenerator {
    pub fn new(dir: impl Into<PathBuf>, gateway: Arc<ModelGateway>) -> Self {
        Self {
            dir: dir.into(),
            gateway,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Analyzes the current window and saves the report.
    pub async fn generate(&self, memory: &ConversationMemory) -> Result<GeneratedReport, ReportError> {
        let entries = memory.all().await;
        if entries.is_empty() {
            return Err(ReportError::EmptyMemory);
        }
        let transcript = memory.transcript().await;
        let prompt = format!("input:{transcript}\n\nNow produce the analysis as instructed.");
        info!(entries = entries.len(), "generating report");
        let reply = self
            .gateway
            .complete_with_system(Some(ANALYST_PERSONA), &prompt)
            .await;
        let analysis = Analysis::parse(reply.text()).unwrap_or_else(|| {
            warn!("analysis reply was not structured, keeping raw text");
            Analysis::unstructured(reply.text())
        });

        let now = Local::now();
        let report = Report {
            timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            conversation_count: entries.len(),
            analysis,
            conversation_data: entries,
        };
        tokio::fs::create_dir_all(&self.dir).await?;
        let stem = format!("{REPORT_PREFIX}{}", now.format("%Y%m%d_%H%M%S"));
        let (filename, path, mut file) = self.claim(&stem).await?;
        file.write_all(&serde_json::to_vec_pretty(&report)?).await?;
        file.flush().await?;
        info!(path = %path.display(), "report saved");
        Ok(GeneratedReport {
            filename,
            path,
            report,
        })
    }

    /// Creates `{stem}.json`, or the first free `{stem}_N.json` from 2 up.
    ///
    /// Files are opened with `create_new`, so concurrent callers never share
    /// a name.
    async fn claim(&self, stem: &str) -> Result<(String, PathBuf, File), ReportError> {
        let mut n = 1;
        loop {
            let filename = if n == 1 {
                format!("{stem}.json")
            } else {
                format!("{stem}_{n}.json")
            };
            let path = self.dir.join(&filename);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((filename, path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(%filename, "report name taken");
                    n += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Lists saved reports, newest first. A missing directory lists nothing.
    pub async fn list(&self) -> Result<Vec<ReportSummary>, ReportError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut found = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.ends_with(".json") {
                continue;
            }
            let meta = entry.metadata().await?;
            let created: DateTime<Local> = meta.created().or_else(|_| meta.modified())?.into();
            found.push((created, filename, meta.len()));
        }
        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        debug!(count = found.len(), "listed reports");
        Ok(found
            .into_iter()
            .map(|(created, filename, size)| ReportSummary {
                filename,
                created: created.format("%Y-%m-%d %H:%M:%S").to_string(),
                size,
            })
            .collect())
    }

    /// Reads one saved report by file name.
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>, ReportError> {
        if filename.is_empty()
            || filename.contains(['/', '\\'])
            || filename.contains("..")
        {
            return Err(ReportError::InvalidName(filename.to_string()));
        }
        match tokio::fs::read(self.dir.join(filename)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ReportError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}
