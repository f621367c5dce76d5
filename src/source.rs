use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const CARD_SELECTORS: &[&str] = &[
    ".tool-card",
    ".ai-tool",
    "[data-testid='tool-card']",
    ".grid-item",
    ".tool-item",
];

/// One listed AI tool, as handed to the term extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub source: String,
}

/// Where the tools for this run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    File,
    Live,
    Mock,
}

/// Tools file > live scrape > built-in fixtures (only when `allow_mock`).
pub async fn collect(
    target_url: &str,
    tools_file: Option<&Path>,
    allow_mock: bool,
) -> Result<(Vec<ToolRecord>, Origin)> {
    if let Some(path) = tools_file {
        return Ok((load_tools(path)?, Origin::File));
    }

    match scrape_tools(target_url).await {
        Ok(tools) if !tools.is_empty() => return Ok((tools, Origin::Live)),
        Ok(_) => warn!("No tool cards found on {}", target_url),
        Err(e) => warn!("Scraping {} failed: {:#}", target_url, e),
    }

    if allow_mock {
        warn!("Falling back to built-in mock tools");
        return Ok((mock_tools(), Origin::Mock));
    }
    anyhow::bail!("No tools collected from {}", target_url)
}

pub fn load_tools(path: &Path) -> Result<Vec<ToolRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tools file {}", path.display()))?;
    let tools: Vec<ToolRecord> = serde_json::from_str(&text)
        .with_context(|| format!("Invalid tools file {}", path.display()))?;
    info!("Loaded {} tools from {}", tools.len(), path.display());
    Ok(dedup_by_name(tools))
}

pub async fn scrape_tools(url: &str) -> Result<Vec<ToolRecord>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to create HTTP client")?;

    info!("Fetching tool listing: {}", url);
    let response = client.get(url).send().await.context("HTTP request failed")?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP {} for {}", status, url);
    }
    let html = response.text().await.context("Failed to read response body")?;

    let tools = parse_tool_cards(&html, url);
    info!("Parsed {} unique tools", tools.len());
    Ok(tools)
}

/// Extract tool cards using the first selector that matches anything.
pub fn parse_tool_cards(html: &str, page_url: &str) -> Vec<ToolRecord> {
    let document = Html::parse_document(html);
    let origin = site_origin(page_url);
    let host = origin.trim_start_matches("https://").trim_start_matches("http://");

    let cards: Vec<ElementRef> = CARD_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .map(|sel| document.select(&sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    let tools = cards
        .into_iter()
        .filter_map(|card| parse_card(card, &origin, host))
        .collect();
    dedup_by_name(tools)
}

fn parse_card(card: ElementRef, origin: &str, host: &str) -> Option<ToolRecord> {
    let name = first_text(card, "h1, h2, h3, h4, h5, h6")?;
    let description = first_text(card, "p").unwrap_or_default();

    let tag_sel = Selector::parse("span[class], div[class]").ok()?;
    let categories = card
        .select(&tag_sel)
        .filter(|el| {
            el.value().classes().any(|c| {
                let c = c.to_lowercase();
                c.contains("tag") || c.contains("category")
            })
        })
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();

    let link_sel = Selector::parse("a[href]").ok()?;
    let link = card
        .select(&link_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| {
            if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{}/{}", origin, href.trim_start_matches('/'))
            }
        })
        .unwrap_or_default();

    Some(ToolRecord {
        name,
        description,
        categories,
        link,
        source: host.to_string(),
    })
}

fn first_text(el: ElementRef, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    el.select(&sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

fn element_text(el: ElementRef) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `scheme://host` of a URL; the input unchanged if it has no scheme.
fn site_origin(url: &str) -> String {
    match url.split_once("//") {
        Some((scheme, rest)) => {
            let host = rest.split('/').next().unwrap_or("");
            format!("{}//{}", scheme, host)
        }
        None => url.trim_end_matches('/').to_string(),
    }
}

fn dedup_by_name(tools: Vec<ToolRecord>) -> Vec<ToolRecord> {
    let mut seen = HashSet::new();
    tools
        .into_iter()
        .filter(|t| !t.name.trim().is_empty() && seen.insert(t.name.clone()))
        .collect()
}

/// Fixture listing used when every live source fails.
pub fn mock_tools() -> Vec<ToolRecord> {
    let mock = |name: &str, description: &str, categories: &[&str], link: &str| ToolRecord {
        name: name.to_string(),
        description: description.to_string(),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        link: link.to_string(),
        source: "mock".to_string(),
    };
    vec![
        mock(
            "Perplexity AI",
            "AI-powered answer engine that provides conversational answers with citations",
            &["Search AI", "Research Tool", "Information Retrieval"],
            "https://perplexity.ai",
        ),
        mock(
            "Runway ML",
            "AI video generation and editing platform with real-time capabilities",
            &["Video AI", "Content Creation", "Media Generation"],
            "https://runwayml.com",
        ),
        mock(
            "Sora",
            "Text-to-video generation model with realistic motion and world simulation",
            &["Video Generation", "Generative AI"],
            "https://openai.com/sora",
        ),
        mock(
            "LangChain",
            "Framework for composing retrieval-augmented generation pipelines and agent workflows",
            &["AI Framework", "LLM Integration"],
            "https://langchain.com",
        ),
        mock(
            "AutoGPT",
            "Autonomous AI agent that plans and executes multi-step tasks with minimal human intervention",
            &["AI Agents", "Automation"],
            "https://agpt.co",
        ),
        mock(
            "Cursor",
            "AI-first code editor built for vibe coding and codebase-aware pair programming",
            &["Developer Tools", "Code Generation"],
            "https://cursor.com",
        ),
        mock(
            "ElevenLabs",
            "Voice cloning and synthetic speech with emotional prosody control",
            &["Voice AI", "Audio Generation"],
            "https://elevenlabs.io",
        ),
        mock(
            "Gamma",
            "Generates presentation decks from prompts using AI-native document design",
            &["Productivity", "Presentation"],
            "https://gamma.app",
        ),
        mock(
            "Lovable",
            "Prompt-to-app builder that turns natural language specs into full-stack web apps",
            &["No-Code", "App Builder"],
            "https://lovable.dev",
        ),
        mock(
            "Mem",
            "Self-organizing notes with an AI knowledge graph and ambient recall",
            &["Knowledge Management", "Personal AI"],
            "https://mem.ai",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/tool_listing.html").unwrap()
    }

    #[test]
    fn parses_cards_from_listing() {
        let tools = parse_tool_cards(&fixture(), "https://theresanaiforthat.com/trending/week/");
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Lovable", "Granola", "Cursor"]);

        let lovable = &tools[0];
        assert_eq!(
            lovable.description,
            "Prompt-to-app builder that turns natural language specs into full-stack apps."
        );
        assert_eq!(lovable.categories, vec!["No-Code", "App Builder"]);
        assert_eq!(lovable.link, "https://theresanaiforthat.com/ai/lovable/");
        assert_eq!(lovable.source, "theresanaiforthat.com");

        assert_eq!(tools[2].link, "https://cursor.com");
    }

    #[test]
    fn first_matching_selector_wins() {
        let html = r#"<div class="grid-item"><h3>Grid</h3></div>
                      <div class="tool-item"><h3>Item</h3></div>"#;
        let tools = parse_tool_cards(html, "https://example.com");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "Grid");
        assert_eq!(tools[0].description, "");
    }

    #[test]
    fn cards_without_heading_skipped() {
        let html = r#"<div class="tool-card"><p>no name</p></div>"#;
        assert!(parse_tool_cards(html, "https://example.com").is_empty());
    }

    #[test]
    fn origin_of_urls() {
        assert_eq!(site_origin("https://a.com/x/y?z=1"), "https://a.com");
        assert_eq!(site_origin("a.com/"), "a.com");
    }

    #[test]
    fn mock_listing_is_unique() {
        let tools = mock_tools();
        assert_eq!(dedup_by_name(tools.clone()).len(), tools.len());
        assert!(tools.iter().all(|t| !t.description.is_empty()));
    }

    #[test]
    fn tools_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        std::fs::write(
            &path,
            r#"[{"name": "Cursor", "description": "AI editor"}, {"name": "Cursor"}, {"name": "Mem"}]"#,
        )
        .unwrap();
        let tools = load_tools(&path).unwrap();
        assert_eq!(tools.len(), 2);
        assert!(tools[0].categories.is_empty());
    }
}
