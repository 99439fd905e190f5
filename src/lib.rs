//! Summarizer: async job tracking for an HTTP summarization service.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod summarize;
