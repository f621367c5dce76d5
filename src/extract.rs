use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::source::ToolRecord;
use crate::words::{format_timestamp, Level, TermObservation};

const BASE_BACKOFF_MS: u64 = 2000;
const MAX_BACKOFF_MS: u64 = 60_000;
const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 2000;
/// The extractor is stricter than the corpus filter: it drops anything the
/// model itself rates below this.
const MIN_TREND: u8 = 4;

static JSON_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());
static VERSION_MARK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"v\d+|gpt-\d+").unwrap());

const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "ai", "artificial", "intelligence", "machine", "learning", "deep", "neural",
    "network", "model", "algorithm", "data", "tool", "software", "platform",
    "solution", "system", "technology", "application", "service", "api",
];

const PRODUCT_NAMES: &[&str] = &[
    "chatgpt", "claude", "midjourney", "dall-e", "stable diffusion", "gpt-4", "gpt-3",
    "openai", "anthropic", "google", "microsoft", "hugging face", "langchain",
    "tensorflow", "pytorch", "keras", "scikit-learn", "jupyter", "github",
    "discord", "slack", "notion", "figma", "canva", "photoshop", "premiere",
    "after effects", "blender", "unity", "unreal", "chrome", "firefox", "safari",
];

const BRAND_MARKERS: &[&str] = &["xl", "pro", "plus", "beta", "alpha"];

pub const SYSTEM_PROMPT: &str = r#"You are an expert in discovering emerging English terminology from AI and technology content. Identify conceptual vocabulary suitable for search-trend analysis and for building new-word websites.

Strictly avoid:
- Company names (e.g. OpenAI, Google, Microsoft)
- Product or tool names (e.g. ChatGPT, Midjourney, LangChain)
- Established technical terms (e.g. deep learning, neural networks)
- Version numbers and model names (e.g. GPT-4, V6, XL, Pro)

Focus on:
1. Emerging technical concepts from the last two years
2. New industry terminology forming in the AI field
3. Technology trend vocabulary
4. New application scenarios and usage patterns
5. New methodologies and workflows

Return results ONLY in English using this JSON format:
{
  "new_words": [
    {
      "word": "English conceptual term or phrase",
      "category": "e.g. Emerging Technology, Application Concept, Methodology, Industry Trend",
      "definition": "Meaning of the concept",
      "context": "How it appears in the description",
      "importance": "high/medium/low",
      "trend_potential": 1-10,
      "business_value": "high/medium/low",
      "is_emerging": true/false,
      "related_terms": ["..."],
      "target_sectors": ["..."]
    }
  ]
}"#;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no API key configured (set AIWORDS_OPENAI_API_KEY)")]
    MissingKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("reply had no message content")]
    EmptyReply,
}

impl ExtractError {
    fn is_retryable(&self) -> bool {
        match self {
            ExtractError::Api { status, .. } => *status == 429 || *status >= 500,
            ExtractError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub observations: Vec<TermObservation>,
    pub batches: usize,
    pub failed_batches: usize,
}

/// Sends tool batches to an OpenAI-compatible chat endpoint and turns the
/// replies into observations.
pub struct TermExtractor {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    batch_size: usize,
    max_retries: u32,
    delay: Duration,
}

impl TermExtractor {
    pub fn from_settings(settings: &Settings) -> Result<Self, ExtractError> {
        let api_key = settings.openai_api_key.clone().ok_or(ExtractError::MissingKey)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            batch_size: settings.batch_size.max(1),
            max_retries: settings.max_retries,
            delay: Duration::from_millis(settings.request_delay_ms),
        })
    }

    /// All batches in order. A failed batch is logged and contributes nothing.
    pub async fn extract(&self, tools: &[ToolRecord]) -> Extraction {
        let batches: Vec<&[ToolRecord]> = tools.chunks(self.batch_size).collect();
        let pb = ProgressBar::new(batches.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} batches ({eta})")
        {
            pb.set_style(style.progress_chars("=> "));
        }

        let mut validator = Validator::default();
        let mut accepted = Vec::new();
        let mut failed = 0usize;

        for (i, batch) in batches.iter().enumerate() {
            match self.complete_with_retry(batch).await {
                Ok(reply) => {
                    let extracted_at = format_timestamp(Utc::now());
                    let parsed = parse_reply(&reply, &extracted_at);
                    let before = accepted.len();
                    accepted.extend(parsed.into_iter().filter(|o| validator.accept(o)));
                    debug!(batch = i + 1, kept = accepted.len() - before, "batch parsed");
                }
                Err(e) => {
                    failed += 1;
                    warn!("Batch {}/{} failed: {}", i + 1, batches.len(), e);
                }
            }
            pb.inc(1);
            if i + 1 < batches.len() && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        pb.finish_and_clear();
        info!(
            "Extracted {} terms from {} tools ({} batches, {} failed)",
            accepted.len(),
            tools.len(),
            batches.len(),
            failed
        );
        Extraction {
            observations: accepted,
            batches: batches.len(),
            failed_batches: failed,
        }
    }

    async fn complete_with_retry(&self, batch: &[ToolRecord]) -> Result<String, ExtractError> {
        let prompt = user_prompt(&tools_text(batch));
        let mut attempt = 0;
        loop {
            match self.complete(&prompt).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = backoff_delay(attempt);
                    warn!(
                        "{} (attempt {}/{}), backing off {:.1}s",
                        e,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, ExtractError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Api {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ExtractError::EmptyReply)
    }
}

/// Doubling delay from `BASE_BACKOFF_MS`, capped at `MAX_BACKOFF_MS`.
fn backoff_delay(attempt: u32) -> Duration {
    let ms = BASE_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

pub fn tools_text(batch: &[ToolRecord]) -> String {
    let mut text = String::new();
    for (i, tool) in batch.iter().enumerate() {
        let _ = writeln!(text, "{}. Tool: {}", i + 1, tool.name);
        let _ = writeln!(text, "   Description: {}", tool.description);
        let _ = writeln!(text, "   Categories: {}", tool.categories.join(", "));
        text.push('\n');
    }
    text
}

pub fn user_prompt(tools_text: &str) -> String {
    format!(
        "Analyze the following AI tool descriptions and identify emerging English concepts \
         and technical terminology. Ignore product names and focus on conceptual vocabulary:\n\n\
         {}\n\
         Do not extract product, tool, company or brand names, established technical terms, \
         or version numbers. Return results in the specified JSON format. RESPOND ONLY IN ENGLISH.",
        tools_text
    )
}

/// Pull the `new_words` array out of free-form model output. Anything that
/// doesn't decode yields an empty list.
pub fn parse_reply(reply: &str, extracted_at: &str) -> Vec<TermObservation> {
    let Some(m) = JSON_OBJECT_RE.find(reply) else {
        debug!("no JSON object in reply");
        return Vec::new();
    };
    let value: serde_json::Value = match serde_json::from_str(m.as_str()) {
        Ok(v) => v,
        Err(e) => {
            debug!("unparseable JSON in reply: {}", e);
            return Vec::new();
        }
    };
    let Some(items) = value.get("new_words").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| serde_json::from_value::<TermObservation>(item.clone()).ok())
        .map(|mut o| {
            o.word = o.word.trim().to_string();
            if o.category.trim().is_empty() {
                o.category = "Unknown".to_string();
            }
            o.extracted_at = extracted_at.to_string();
            o
        })
        .collect()
}

/// Per-run acceptance heuristics for extracted terms.
#[derive(Default)]
pub struct Validator {
    seen: HashSet<String>,
}

impl Validator {
    pub fn accept(&mut self, obs: &TermObservation) -> bool {
        let word = obs.word.trim().to_lowercase();
        if word.chars().count() < 3 || self.seen.contains(&word) {
            return false;
        }
        if STOP_WORDS.contains(&word.as_str()) || PRODUCT_NAMES.contains(&word.as_str()) {
            return false;
        }
        if VERSION_MARK_RE.is_match(&word)
            || word.split_whitespace().any(|t| BRAND_MARKERS.contains(&t))
        {
            return false;
        }
        if obs.trend_potential < MIN_TREND {
            return false;
        }
        self.seen.insert(word);
        true
    }
}

/// Canned observations standing in for the model when running offline.
pub fn mock_observations(extracted_at: &str) -> Vec<TermObservation> {
    let mock = |word: &str, category: &str, definition: &str, context: &str, trend: u8| {
        TermObservation {
            definition: definition.to_string(),
            context: context.to_string(),
            importance: if trend >= 8 { Level::High } else { Level::Medium },
            trend_potential: trend,
            business_value: Level::High,
            is_emerging: trend >= 7,
            ..TermObservation::new(word, category, extracted_at)
        }
    };
    vec![
        mock(
            "Constitutional AI",
            "AI Safety",
            "Training a model to follow an explicit set of written principles",
            "assistant trained with constitutional principles",
            8,
        ),
        mock(
            "Multimodal Support",
            "AI Capability",
            "Handling text, images and audio in one interaction",
            "answers questions about uploaded images",
            6,
        ),
        mock(
            "Vibe Coding",
            "Methodology",
            "Building software by steering an AI assistant with natural-language intent",
            "AI-first code editor built for vibe coding",
            9,
        ),
        mock(
            "Agentic Workflow",
            "Methodology",
            "Multi-step task execution planned and carried out by autonomous agents",
            "executes multi-step tasks with minimal human intervention",
            8,
        ),
        mock(
            "Voice Cloning",
            "Application Concept",
            "Synthesizing speech in a specific person's voice from short samples",
            "voice cloning and synthetic speech",
            7,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const AT: &str = "2026-10-19T12:00:00Z";

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/llm_reply.txt").unwrap()
    }

    #[test]
    fn parses_reply_wrapped_in_prose() {
        let obs = parse_reply(&fixture(), AT);
        let words: Vec<&str> = obs.iter().map(|o| o.word.as_str()).collect();
        assert_eq!(
            words,
            vec!["Vibe Coding", "Ambient Agents", "ChatGPT", "Prompt Debt", "Pro Mode", "Agentic Commerce", ""]
        );
        let vibe = &obs[0];
        assert_eq!(vibe.category, "Methodology");
        assert_eq!(vibe.importance, Level::High);
        assert_eq!(vibe.trend_potential, 9);
        assert!(vibe.is_emerging);
        assert_eq!(vibe.related_terms, vec!["pair programming", "prompting"]);
        assert_eq!(vibe.extracted_at, AT);

        let ambient = &obs[1];
        assert_eq!(ambient.trend_potential, 8);
        assert!(ambient.is_emerging);
        assert_eq!(ambient.category, "Unknown");
    }

    #[test]
    fn validator_applies_heuristics() {
        let mut v = Validator::default();
        let kept: Vec<String> = parse_reply(&fixture(), AT)
            .into_iter()
            .filter(|o| v.accept(o))
            .map(|o| o.word)
            .collect();
        // ChatGPT: product; Prompt Debt: trend 3; Pro Mode: brand marker; "": empty
        assert_eq!(kept, vec!["Vibe Coding", "Ambient Agents", "Agentic Commerce"]);
    }

    #[test]
    fn validator_rejects_repeats_within_run() {
        let mut v = Validator::default();
        let o = TermObservation {
            trend_potential: 7,
            ..TermObservation::new("Agent Mesh", "Architecture", AT)
        };
        assert!(v.accept(&o));
        let again = TermObservation::new(" agent mesh ", "Other", AT);
        assert!(!v.accept(&TermObservation { trend_potential: 7, ..again }));
    }

    #[test]
    fn version_markers_rejected() {
        let mut v = Validator::default();
        for w in ["Model v2 routing", "gpt-5 reasoning"] {
            let o = TermObservation { trend_potential: 9, ..TermObservation::new(w, "X", AT) };
            assert!(!v.accept(&o), "{}", w);
        }
    }

    #[test]
    fn garbage_replies_yield_nothing() {
        assert!(parse_reply("Sorry, I can't help with that.", AT).is_empty());
        assert!(parse_reply("{ broken json", AT).is_empty());
        assert!(parse_reply(r#"{"terms": []}"#, AT).is_empty());
        assert!(parse_reply(r#"{"new_words": "none"}"#, AT).is_empty());
    }

    #[test]
    fn prompt_lists_tools() {
        let tools = vec![ToolRecord {
            name: "Cursor".into(),
            description: "AI code editor".into(),
            categories: vec!["Dev".into(), "Code".into()],
            link: String::new(),
            source: String::new(),
        }];
        let text = tools_text(&tools);
        assert!(text.contains("1. Tool: Cursor"));
        assert!(text.contains("   Categories: Dev, Code"));
        assert!(user_prompt(&text).contains(&text));
    }

    #[test]
    fn retryable_statuses() {
        assert!(ExtractError::Api { status: 429, body: String::new() }.is_retryable());
        assert!(ExtractError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(!ExtractError::Api { status: 401, body: String::new() }.is_retryable());
        assert!(!ExtractError::EmptyReply.is_retryable());
    }

    #[test]
    fn mock_observations_pass_validation() {
        let mut v = Validator::default();
        let obs = mock_observations(AT);
        assert!(obs.iter().all(|o| v.accept(o)));
        assert!(obs.iter().all(|o| o.extracted_at == AT));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2), Duration::from_millis(8000));
        assert_eq!(backoff_delay(5), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_delay(64), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[test]
    fn missing_key_is_reported() {
        let err = TermExtractor::from_settings(&Settings::default()).err().unwrap();
        assert!(matches!(err, ExtractError::MissingKey));
    }

    #[test]
    fn request_shape() {
        let req = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["model"], "gpt-4o-mini");
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["max_tokens"], 2000);
    }
}
