use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use schemars::{schema_for, JsonSchema};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::{settings::LlmSettings, APP_USER_AGENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: Role,
    pub(crate) content: String,
}

impl ChatMessage {
    pub(crate) fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat-completion backend.
#[async_trait]
pub(crate) trait ChatModel: Send + Sync {
    /// Sends `messages` and returns the text of the first completion choice.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub(crate) struct ChatClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatClient {
    pub(crate) fn new(settings: &LlmSettings) -> Result<Self> {
        let http = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "chat completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&ChatRequest {
                model: &self.model,
                messages: &messages,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("chat completion error ({status}): {error_text}"));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no choices"))
    }
}

/// Asks the model for JSON shaped like `T` and parses the reply.
///
/// The JSON schema of `T` is appended to `prompt`, so callers describe only
/// the task. Code fences and prose around the JSON are tolerated.
pub(crate) async fn ask_json<T>(model: &dyn ChatModel, system: &str, prompt: &str) -> Result<T>
where
    T: JsonSchema + DeserializeOwned,
{
    let schema = serde_json::to_string_pretty(&schema_for!(T))?;
    let prompt = format!("{prompt}\nThe JSON must conform to this JSON schema:\n{schema}\n");
    debug!(%prompt, "sending prompt");

    let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
    let response = model.complete(messages).await?;
    debug!(raw_response = %response, "received model response");

    parse_json(&response)
        .with_context(|| format!("model reply is not the expected JSON: {response}"))
}

/// Reads the first JSON value of a model reply. Code fences and prose
/// before or after the value are skipped.
fn parse_json<T: DeserializeOwned>(response: &str) -> serde_json::Result<T> {
    let json = json_start(response);
    match serde_json::Deserializer::from_str(json).into_iter::<T>().next() {
        Some(value) => value,
        None => serde_json::from_str(json),
    }
}

/// The reply from its first `{` or `[` on, with any leading code fence
/// removed.
fn json_start(response: &str) -> &str {
    let trimmed = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_start();
    match trimmed.find(['{', '[']) {
        Some(start) => &trimmed[start..],
        None => trimmed,
    }
}
