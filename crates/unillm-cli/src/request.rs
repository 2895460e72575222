use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use serde_json::Value;
use unillm_core::{BoxError, ChatMessage, RequestOptions, UsageRecord};

/// Flags shared by `prompt` and `chat`
#[derive(Args, Clone, Debug, Default)]
pub struct RequestArgs {
    /// Service to call (defaults to `default_service` from the config)
    #[arg(long, short)]
    pub service: Option<String>,

    /// Model override
    #[arg(long, short)]
    pub model: Option<String>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub top_p: Option<f32>,

    #[arg(long)]
    pub top_k: Option<u32>,

    /// Stop sequence (repeatable)
    #[arg(long = "stop")]
    pub stop: Vec<String>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Extra generation parameter as KEY=VALUE; VALUE is parsed as JSON when possible
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    /// System prompt placed before the conversation
    #[arg(long)]
    pub system: Option<String>,

    /// File holding a custom prompt template
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Print token usage after each reply
    #[arg(long)]
    pub usage: bool,
}

impl RequestArgs {
    pub fn load_template(&self) -> anyhow::Result<Option<String>> {
        read_template(self.template.as_ref())
    }

    /// Request options for these flags; `template` is the loaded template source
    pub fn options(&self, template: Option<String>, stream: bool) -> RequestOptions {
        let mut options = RequestOptions::new();
        if let Some(model) = &self.model {
            options = options.with_model(model.clone());
        }
        if stream {
            options = options.with_streaming();
        }
        if let Some(max_tokens) = self.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            options = options.with_temperature(temperature);
        }
        if let Some(top_p) = self.top_p {
            options = options.with_top_p(top_p);
        }
        if let Some(top_k) = self.top_k {
            options = options.with_top_k(top_k);
        }
        if !self.stop.is_empty() {
            options = options.with_stop(self.stop.clone());
        }
        if let Some(seed) = self.seed {
            options = options.with_seed(seed);
        }
        for (key, value) in &self.params {
            options = options.with_param(key.clone(), value.clone());
        }
        if let Some(source) = template {
            options = options.with_prompt_template(source);
        }
        if self.usage {
            options = options.with_usage(|usage: UsageRecord| async move {
                print_usage(&usage);
                Ok::<(), BoxError>(())
            });
        }
        options
    }

    /// Messages that open every conversation
    pub fn preamble(&self) -> Vec<ChatMessage> {
        self.system.iter().map(ChatMessage::system).collect()
    }
}

pub fn read_template(path: Option<&PathBuf>) -> anyhow::Result<Option<String>> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("failed to read template {:?}: {}", path, e)),
        None => Ok(None),
    }
}

/// `--system` followed by turns alternating user and assistant, user first
pub fn conversation(system: Option<&str>, turns: &[String]) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = system.into_iter().map(ChatMessage::system).collect();
    messages.extend(turns.iter().enumerate().map(|(i, turn)| {
        if i % 2 == 0 {
            ChatMessage::user(turn.as_str())
        } else {
            ChatMessage::assistant(turn.as_str())
        }
    }));
    messages
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn print_usage(usage: &UsageRecord) {
    eprintln!(
        "{}",
        format!(
            "📊 Tokens: prompt={}, completion={}, total={}",
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens()
        )
        .dimmed()
    );
}
