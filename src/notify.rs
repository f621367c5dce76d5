use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lettre::message::header::{ContentType, ContentTypeErr};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::pipeline::RunStats;
use crate::words::stats::SummaryStats;
use crate::words::{format_timestamp, WordRecord};

const BOT_NAME: &str = "AI Words Mining Bot";
const TIMEOUT_SECS: u64 = 10;
/// Discord rejects embed descriptions over 4096 chars.
const MAX_EMBED_CHARS: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Info,
    Success,
    Warning,
    Error,
}

impl Status {
    fn title(self) -> &'static str {
        match self {
            Status::Info => "AI Words Mining - Status Update",
            Status::Success => "AI Words Mining - Success Report",
            Status::Warning => "AI Words Mining - Warning Report",
            Status::Error => "AI Words Mining - Error Report",
        }
    }

    fn slack_color(self) -> &'static str {
        match self {
            Status::Info => "#0099ff",
            Status::Success => "good",
            Status::Warning => "warning",
            Status::Error => "danger",
        }
    }

    fn discord_color(self) -> u32 {
        match self {
            Status::Info => 0x0099ff,
            Status::Success => 0x00ff00,
            Status::Warning => 0xffff00,
            Status::Error => 0xff0000,
        }
    }
}

/// A rendered message, independent of the webhook flavour it goes out as.
#[derive(Debug, Clone)]
pub struct Notice {
    pub status: Status,
    pub text: String,
}

pub fn start_notice(target_url: &str, mock: bool, now: DateTime<Utc>) -> Notice {
    let mut text = String::new();
    let _ = writeln!(text, "Started: {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(text, "Source: {}", target_url);
    if mock {
        let _ = writeln!(text, "Mode: mock");
    }
    Notice { status: Status::Info, text }
}

pub fn success_notice(
    words: &[WordRecord],
    summary: &SummaryStats,
    run: &RunStats,
    source_url: &str,
    now: DateTime<Utc>,
) -> Notice {
    let mut text = String::new();
    let _ = writeln!(text, "Completed: {}\n", now.format("%Y-%m-%d %H:%M:%S UTC"));

    let _ = writeln!(text, "Summary:");
    let _ = writeln!(text, "- Tools collected: {}", run.tools_collected);
    let _ = writeln!(text, "- Terms extracted: {}", run.terms_extracted);
    let _ = writeln!(text, "- Total words: {}", summary.total_words);
    let _ = writeln!(text, "- Emerging terms: {}", summary.emerging_terms_count);
    let _ = writeln!(text, "- Average trend score: {}", summary.average_trend_score);
    let _ = writeln!(text, "- Categories: {}", summary.categories.len());

    if !summary.top_categories.is_empty() {
        let _ = writeln!(text, "\nTop categories:");
        for c in &summary.top_categories {
            let _ = writeln!(text, "- {}: {} words", c.category, c.count);
        }
    }

    if !words.is_empty() {
        let _ = writeln!(text, "\nTop words:");
        for (i, w) in words.iter().take(5).enumerate() {
            let _ = writeln!(text, "{}. {} ({})", i + 1, w.word, w.category);
        }
    }

    let _ = writeln!(text, "\nSource: {}", source_url);
    Notice { status: Status::Success, text }
}

pub fn warning_notice(
    warnings: &[String],
    summary: Option<&SummaryStats>,
    now: DateTime<Utc>,
) -> Notice {
    let mut text = String::new();
    let _ = writeln!(text, "Time: {}\n", now.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(text, "Warnings:");
    for w in warnings {
        let _ = writeln!(text, "- {}", w);
    }
    if let Some(s) = summary {
        let _ = writeln!(text, "\nCompleted with warnings:");
        let _ = writeln!(text, "- Total words: {}", s.total_words);
        let _ = writeln!(text, "- Emerging terms: {}", s.emerging_terms_count);
    }
    Notice { status: Status::Warning, text }
}

pub fn error_notice(stage: &str, error: &str, run: &RunStats, now: DateTime<Utc>) -> Notice {
    let mut text = String::new();
    let _ = writeln!(text, "Time: {}\n", now.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(text, "Error: {}", error);
    let _ = writeln!(text, "Stage: {}", stage);
    if run.tools_collected > 0 || run.words_processed > 0 {
        let _ = writeln!(text, "\nPartial results:");
        if run.tools_collected > 0 {
            let _ = writeln!(text, "- Collected: {} tools", run.tools_collected);
        }
        if run.words_processed > 0 {
            let _ = writeln!(text, "- Processed: {} words", run.words_processed);
        }
    }
    Notice { status: Status::Error, text }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Slack,
    Discord,
    Plain,
}

fn flavor(url: &str) -> Flavor {
    let url = url.to_lowercase();
    if url.contains("hooks.slack.com") {
        Flavor::Slack
    } else if url.contains("discord.com/api/webhooks") || url.contains("discordapp.com/api/webhooks") {
        Flavor::Discord
    } else {
        Flavor::Plain
    }
}

/// JSON body for `notice`, shaped for whichever service `url` points at.
pub fn payload(url: &str, notice: &Notice, now: DateTime<Utc>) -> Value {
    let title = notice.status.title();
    match flavor(url) {
        Flavor::Slack => json!({
            "username": BOT_NAME,
            "icon_emoji": ":robot_face:",
            "text": title,
            "attachments": [{
                "color": notice.status.slack_color(),
                "text": notice.text,
                "ts": now.timestamp(),
            }],
        }),
        Flavor::Discord => {
            let description: String = notice.text.chars().take(MAX_EMBED_CHARS).collect();
            json!({
                "username": BOT_NAME,
                "content": title,
                "embeds": [{
                    "title": title,
                    "description": description,
                    "color": notice.status.discord_color(),
                    "timestamp": format_timestamp(now),
                }],
            })
        }
        Flavor::Plain => json!({
            "username": BOT_NAME,
            "text": format!("{}\n\n{}", title, notice.text),
            "timestamp": format_timestamp(now),
        }),
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("invalid content type: {0}")]
    ContentType(#[from] ContentTypeErr),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// SMTP sender for the same notices, with run outputs attached.
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl Mailer {
    /// `None` (logged) unless host, recipient and a sender address are set.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let (Some(host), Some(to)) = (settings.smtp_host.as_deref(), settings.email_to.as_deref()) else {
            debug!("SMTP not configured, email notifications disabled");
            return None;
        };
        let Some(from) = settings.email_from.as_deref().or(settings.smtp_username.as_deref()) else {
            warn!("SMTP host set but no sender address (email_from or smtp_username)");
            return None;
        };
        match Self::build(settings, host, from, to) {
            Ok(mailer) => Some(mailer),
            Err(e) => {
                warn!("Email notifications disabled: {}", e);
                None
            }
        }
    }

    fn build(settings: &Settings, host: &str, from: &str, to: &str) -> Result<Self, MailError> {
        let from: Mailbox = from.parse()?;
        let to: Mailbox = to.parse()?;
        // 465 is implicit TLS; anything else upgrades with STARTTLS.
        let mut builder = if settings.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        }
        .port(settings.smtp_port)
        .timeout(Some(Duration::from_secs(30)));
        if let (Some(user), Some(password)) = (&settings.smtp_username, &settings.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    pub async fn send(&self, notice: &Notice, attachments: &[PathBuf]) -> Result<(), MailError> {
        let message = build_message(&self.from, &self.to, notice, attachments)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Plain-text body plus one attachment per readable file. Missing files are
/// skipped with a warning.
pub fn build_message(
    from: &Mailbox,
    to: &Mailbox,
    notice: &Notice,
    attachments: &[PathBuf],
) -> Result<Message, MailError> {
    let mut body = MultiPart::mixed().singlepart(SinglePart::plain(notice.text.clone()));
    for path in attachments {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!("Skipping attachment {}: {}", path.display(), e);
                continue;
            }
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".into());
        let content_type = ContentType::parse(attachment_type(path))?;
        body = body.singlepart(Attachment::new(name).body(bytes, content_type));
    }

    Ok(Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(notice.status.title())
        .multipart(body)?)
}

fn attachment_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("md") => "text/markdown",
        _ => "application/octet-stream",
    }
}

/// Fans a notice out to the configured webhook and mailbox. Delivery failures
/// are logged, never propagated: the run's data is already written.
pub struct Notifier {
    client: reqwest::Client,
    url: Option<String>,
    mailer: Option<Mailer>,
}

impl Notifier {
    pub fn from_settings(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: settings.webhook_url.clone(),
            mailer: Mailer::from_settings(settings),
        }
    }

    /// True when at least one channel accepted the message. Attachments only
    /// go out by email.
    pub async fn send(&self, notice: &Notice, attachments: &[PathBuf]) -> bool {
        let hooked = self.send_webhook(notice).await;
        let mailed = match &self.mailer {
            Some(mailer) => match mailer.send(notice, attachments).await {
                Ok(()) => {
                    info!("Emailed {:?} notification ({} attachments)", notice.status, attachments.len());
                    true
                }
                Err(e) => {
                    warn!("Email delivery failed: {}", e);
                    false
                }
            },
            None => false,
        };
        hooked || mailed
    }

    async fn send_webhook(&self, notice: &Notice) -> bool {
        let Some(url) = self.url.as_deref() else {
            debug!("No webhook configured, skipping {:?} notification", notice.status);
            return false;
        };

        let body = payload(url, notice, Utc::now());
        match self.client.post(url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Sent {:?} notification", notice.status);
                true
            }
            Ok(resp) => {
                warn!("Webhook returned {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Webhook delivery failed: {}", e);
                false
            }
        }
    }
}
