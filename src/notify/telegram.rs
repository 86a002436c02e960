use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Notifier, NotifyError};

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct TelegramNotifier {
    api_base: String,
    token: String,
    chat_id: String,
    client: Client,
    timeout: Duration,
}

// Hand-written so the bot token never ends up in logs.
impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.api_base)
            .field("chat_id", &self.chat_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String) -> Self {
        Self {
            api_base: DEFAULT_TELEGRAM_API.to_string(),
            token,
            chat_id,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    /// Point at a different Bot API host (self-hosted API server, tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize, Default)]
struct ApiReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

fn classify_status(status: StatusCode, description: String) -> NotifyError {
    let msg = format!("telegram HTTP {}: {}", status.as_u16(), description);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        NotifyError::Transient(msg)
    } else {
        NotifyError::Fatal(msg)
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        if self.token.is_empty() || self.chat_id.is_empty() {
            return Err(NotifyError::Fatal(
                "telegram credentials missing (TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID)".into(),
            ));
        }

        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let rsp = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                // Strip the URL: it embeds the bot token.
                NotifyError::Transient(format!("telegram request failed: {}", e.without_url()))
            })?;

        let status = rsp.status();
        let reply: ApiReply = rsp.json().await.unwrap_or_default();
        let description = reply.description.unwrap_or_default();

        if !status.is_success() {
            return Err(classify_status(status, description));
        }
        if !reply.ok {
            return Err(NotifyError::Fatal(format!(
                "telegram rejected message: {description}"
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
