//! LLM-backed summarizer.
//!
//! The full workflow makes four calls: initial summary, key points, a
//! refinement of the summary using the key points, then a final polish.
//! Basic summaries are a single call.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use super::documents::{Document, load_document};
use super::{Summarizer, SummaryRequest};
use crate::error::SummarizeError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Bullet or numbered list item.
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("valid list item regex")
});

const INITIAL_PROMPT: &str = "Create a comprehensive summary of the following text. \
     Focus on the main ideas and key information.";
const KEY_POINTS_PROMPT: &str = "Extract the key points from the following text as a bullet list. \
     Focus on the most important information.";
const REFINE_PROMPT: &str = "Refine the following summary using the key points provided. \
     Make it more coherent and comprehensive.";
const POLISH_PROMPT: &str = "Polish the following summary to make it more readable and professional. \
     Ensure it flows well and is well-structured.";
const BASIC_PROMPT: &str = "Write a concise summary of the following text.";

/// Sampling settings for summarization calls.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 4000,
        }
    }
}

/// Text gathered for a request, plus the documents it came from.
struct Input {
    text: String,
    docs: Vec<Document>,
}

/// Summarizes text and documents through an [`LlmProvider`].
pub struct LlmSummarizer {
    llm: Arc<dyn LlmProvider>,
    config: SummarizerConfig,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: SummarizerConfig) -> Self {
        Self { llm, config }
    }

    async fn ask(
        &self,
        model: Option<&str>,
        instruction: &str,
        content: String,
    ) -> Result<String, SummarizeError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(instruction),
            ChatMessage::user(content),
        ])
        .with_model(model.map(str::to_string))
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.complete(request).await?;
        Ok(response.content.trim().to_string())
    }

    /// Load whatever the request points at.
    ///
    /// Unreadable files in a batch are skipped; the batch fails only when
    /// none of them load.
    async fn gather(&self, request: &SummaryRequest) -> Result<Input, SummarizeError> {
        match request {
            SummaryRequest::TextSummarization { text, .. } => Ok(Input {
                text: text.clone(),
                docs: Vec::new(),
            }),
            SummaryRequest::FileSummarization { file_path, .. } => {
                let doc = load_document(Path::new(file_path)).await?;
                Ok(Input {
                    text: doc.content.clone(),
                    docs: vec![doc],
                })
            }
            SummaryRequest::BatchSummarization { file_paths, .. } => {
                let mut docs = Vec::with_capacity(file_paths.len());
                for path in file_paths {
                    match load_document(Path::new(path)).await {
                        Ok(doc) => docs.push(doc),
                        Err(e) => warn!(file = %path, error = %e, "Skipping unreadable file"),
                    }
                }
                if docs.is_empty() {
                    return Err(SummarizeError::EmptyInput(format!(
                        "none of the {} files could be read",
                        file_paths.len()
                    )));
                }

                let text = docs
                    .iter()
                    .map(|d| format!("=== {} ===\n{}", d.file_name, d.content))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Ok(Input { text, docs })
            }
        }
    }

    async fn run_workflow(
        &self,
        text: &str,
        model: Option<&str>,
    ) -> Result<serde_json::Value, SummarizeError> {
        if text.trim().is_empty() {
            return Err(SummarizeError::EmptyInput("document has no text".to_string()));
        }

        let initial = self.ask(model, INITIAL_PROMPT, text.to_string()).await?;
        debug!(chars = initial.len(), "Initial summary ready");

        let key_points_raw = self.ask(model, KEY_POINTS_PROMPT, text.to_string()).await?;
        let key_points = parse_key_points(&key_points_raw);
        debug!(count = key_points.len(), "Key points extracted");

        let refined = self
            .ask(
                model,
                REFINE_PROMPT,
                format!(
                    "Original summary:\n{initial}\n\nKey points:\n{}",
                    key_points
                        .iter()
                        .map(|p| format!("- {p}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                ),
            )
            .await?;

        let final_summary = self.ask(model, POLISH_PROMPT, refined.clone()).await?;

        let original_words = text.split_whitespace().count();
        let summary_words = final_summary.split_whitespace().count();

        Ok(serde_json::json!({
            "final_summary": final_summary,
            "initial_summary": initial,
            "refined_summary": refined,
            "key_points": key_points,
            "metadata": {
                "model": model.unwrap_or(self.llm.model_name()),
                "original_words": original_words,
                "summary_words": summary_words,
                "compression_ratio": compression_ratio(original_words, summary_words),
            }
        }))
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<serde_json::Value, SummarizeError> {
        let input = self.gather(request).await?;
        info!(kind = %request.kind(), chars = input.text.len(), files = input.docs.len(), "Summarizing");

        let mut result = self.run_workflow(&input.text, request.model_name()).await?;
        result["metadata"]["document_count"] = serde_json::json!(input.docs.len());
        if !input.docs.is_empty() {
            result["files_processed"] =
                serde_json::Value::Array(input.docs.iter().map(file_info).collect());
        }
        Ok(result)
    }

    async fn summarize_basic(
        &self,
        request: &SummaryRequest,
        custom_prompt: Option<&str>,
    ) -> Result<serde_json::Value, SummarizeError> {
        let input = self.gather(request).await?;
        if input.text.trim().is_empty() {
            return Err(SummarizeError::EmptyInput("document has no text".to_string()));
        }
        let model = request.model_name();
        let custom_prompt = custom_prompt.map(str::trim).filter(|p| !p.is_empty());
        info!(
            kind = %request.kind(),
            chars = input.text.len(),
            custom = custom_prompt.is_some(),
            "Basic summary"
        );

        let summary = match custom_prompt {
            Some(prompt) => {
                self.ask(model, prompt, format!("Text to summarize:\n{}", input.text))
                    .await?
            }
            None => self.ask(model, BASIC_PROMPT, input.text.clone()).await?,
        };

        let original_words = input.text.split_whitespace().count();
        let summary_words = summary.split_whitespace().count();
        let ratio = compression_ratio(original_words, summary_words);

        let mut result = serde_json::json!({
            "summary": summary,
            "stats": {
                "original_words": original_words,
                "summary_words": summary_words,
                "compression_ratio": ratio,
                "compression_percentage": format!("{:.1}%", (1.0 - ratio) * 100.0),
            },
            "model_used": model.unwrap_or(self.llm.model_name()),
        });
        if !input.docs.is_empty() {
            result["files_processed"] =
                serde_json::Value::Array(input.docs.iter().map(file_info).collect());
            result["total_files"] = serde_json::json!(input.docs.len());
        }
        Ok(result)
    }

    fn default_model(&self) -> &str {
        self.llm.model_name()
    }
}

fn file_info(doc: &Document) -> serde_json::Value {
    serde_json::json!({
        "filename": doc.file_name,
        "size": doc.size,
        "extension": doc.extension,
    })
}

/// Pull list items out of a model response; falls back to non-empty lines.
fn parse_key_points(raw: &str) -> Vec<String> {
    let items: Vec<String> = raw
        .lines()
        .filter_map(|line| LIST_ITEM.captures(line))
        .map(|caps| caps[1].to_string())
        .collect();

    if !items.is_empty() {
        return items;
    }

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Summary size relative to the original, rounded to three decimals.
fn compression_ratio(original_words: usize, summary_words: usize) -> f64 {
    if original_words == 0 {
        return 0.0;
    }
    let ratio = summary_words as f64 / original_words as f64;
    (ratio * 1000.0).round() / 1000.0
}
