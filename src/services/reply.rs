//! Reply generation for the public chat endpoint.
//!
//! Language-model output is produced by an external provider; this module
//! only owns the seam ([`ReplyGenerator`]) and a knowledge-base responder that
//! answers from FAQs and ingested document chunks.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::entities::{bot, document_chunk, faq};
use crate::db::enums::MessageRole;

pub const FAQ_MATCH_THRESHOLD: f64 = 0.5;
const MAX_EXCERPT_CHARS: usize = 600;

#[derive(Error, Debug)]
pub enum ReplyError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Provider returned status {0}")]
    Status(u16),
    #[error("Provider response was invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct ReplyContext {
    pub bot: bot::Model,
    /// Earlier turns of the conversation, oldest first, excluding `message`.
    pub history: Vec<(MessageRole, String)>,
    pub message: String,
    pub faqs: Vec<faq::Model>,
    pub chunks: Vec<document_chunk::Model>,
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, ctx: &ReplyContext) -> Result<String, ReplyError>;
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "be", "can", "do", "does", "for", "how", "i", "in", "is", "it", "me",
    "my", "of", "on", "or", "the", "to", "we", "what", "with", "you", "your",
];

pub fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Dice coefficient over content words.
pub fn similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    (2 * shared) as f64 / (a.len() + b.len()) as f64
}

pub fn best_faq<'a>(message: &str, faqs: &'a [faq::Model]) -> Option<&'a faq::Model> {
    let query = tokens(message);
    faqs.iter()
        .map(|f| (f, similarity(&query, &tokens(&f.question))))
        .filter(|(_, score)| *score >= FAQ_MATCH_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(f, _)| f)
}

/// The chunk sharing the most content words with the message, if it covers at least half of them.
pub fn best_chunk<'a>(
    message: &str,
    chunks: &'a [document_chunk::Model],
) -> Option<&'a document_chunk::Model> {
    let query = tokens(message);
    if query.is_empty() {
        return None;
    }
    let needed = query.len().div_ceil(2);
    chunks
        .iter()
        .map(|c| (c, tokens(&c.content).intersection(&query).count()))
        .filter(|(_, shared)| *shared >= needed)
        // Earlier chunks win ties.
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.position.cmp(&a.0.position)))
        .map(|(c, _)| c)
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= MAX_EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_EXCERPT_CHARS).collect();
    match cut.rfind(char::is_whitespace) {
        Some(idx) => format!("{}…", cut[..idx].trim_end()),
        None => format!("{cut}…"),
    }
}

/// Answers from the bot's knowledge base without any external call.
#[derive(Debug, Default, Clone)]
pub struct KnowledgeResponder;

impl KnowledgeResponder {
    pub fn answer(&self, ctx: &ReplyContext) -> String {
        if let Some(f) = best_faq(&ctx.message, &ctx.faqs) {
            debug!(faq_id = f.id, "Answered from FAQ.");
            return f.answer.clone();
        }
        if let Some(c) = best_chunk(&ctx.message, &ctx.chunks) {
            debug!(chunk_id = c.id, document_id = c.document_id, "Answered from document chunk.");
            return excerpt(&c.content);
        }
        ctx.bot.fallback_message.clone()
    }
}

#[async_trait]
impl ReplyGenerator for KnowledgeResponder {
    async fn generate(&self, ctx: &ReplyContext) -> Result<String, ReplyError> {
        Ok(self.answer(ctx))
    }
}

#[derive(Serialize)]
struct ProviderMessage<'a> {
    role: MessageRole,
    content: &'a str,
}

#[derive(Serialize)]
struct ProviderRequest<'a> {
    model: &'a str,
    temperature: f32,
    system_prompt: &'a str,
    messages: Vec<ProviderMessage<'a>>,
    context: Vec<&'a str>,
}

#[derive(Deserialize)]
struct ProviderResponse {
    reply: String,
}

/// Delegates to an external reply provider; falls back to the knowledge base on failure.
pub struct HttpReplyGenerator {
    client: Client,
    endpoint: String,
    fallback: KnowledgeResponder,
}

impl HttpReplyGenerator {
    pub fn new(endpoint: String) -> Result<Self, ReplyError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            endpoint,
            fallback: KnowledgeResponder,
        })
    }

    async fn call_provider(&self, ctx: &ReplyContext) -> Result<String, ReplyError> {
        let mut messages: Vec<ProviderMessage> = ctx
            .history
            .iter()
            .map(|(role, content)| ProviderMessage { role: *role, content })
            .collect();
        messages.push(ProviderMessage {
            role: MessageRole::User,
            content: &ctx.message,
        });

        let mut context: Vec<&str> = Vec::new();
        if let Some(f) = best_faq(&ctx.message, &ctx.faqs) {
            context.push(&f.answer);
        }
        if let Some(c) = best_chunk(&ctx.message, &ctx.chunks) {
            context.push(&c.content);
        }

        let request = ProviderRequest {
            model: &ctx.bot.model,
            temperature: ctx.bot.temperature,
            system_prompt: &ctx.bot.system_prompt,
            messages,
            context,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReplyError::Status(status.as_u16()));
        }
        let body: ProviderResponse = response.json().await?;
        let reply = body.reply.trim();
        if reply.is_empty() {
            return Err(ReplyError::InvalidResponse("empty reply".to_string()));
        }
        Ok(reply.to_string())
    }
}

#[async_trait]
impl ReplyGenerator for HttpReplyGenerator {
    async fn generate(&self, ctx: &ReplyContext) -> Result<String, ReplyError> {
        match self.call_provider(ctx).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(bot_id = ctx.bot.id, error = %e, "Reply provider failed, answering from knowledge base.");
                Ok(self.fallback.answer(ctx))
            }
        }
    }
}
