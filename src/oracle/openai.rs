//! Relevance oracle backed by an OpenAI-compatible chat-completions endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OracleConfig;
use crate::models::ClaimKind;
use crate::oracle::{ClaimJudgement, OracleCapabilities, OracleError, OracleScore, RelevanceOracle};
use crate::utils::{oracle_retry_config, truncate_chars, with_retry, HttpClient, RetryConfig};

/// Passages are truncated to this many characters in prompts
const MAX_PASSAGE_CHARS: usize = 1500;

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelevanceReply {
    relevance: f64,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct JudgementReply {
    needs_citation: f64,
    #[serde(default)]
    kind: Option<String>,
}

/// Oracle calling a chat-completions API
#[derive(Debug, Clone)]
pub struct OpenAiOracle {
    client: HttpClient,
    endpoint: String,
    model: String,
    api_key: String,
    retry: RetryConfig,
}

impl OpenAiOracle {
    /// Create an oracle from configuration and a resolved API key
    pub fn new(config: &OracleConfig, api_key: String) -> Result<Self, OracleError> {
        let timeout = config.timeout();
        let client = HttpClient::new(timeout)?.rate_limit_per_second(config.requests_per_second);
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            retry: oracle_retry_config(config.max_retries, timeout, config.call_deadline()),
        })
    }

    async fn chat_once(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system.to_string(),
                },
                Message {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
            max_tokens: 60,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(OracleError::RateLimit(retry_after));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message: truncate_chars(&body, 200),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::InvalidResponse("empty completion".to_string()))
    }

    /// The first attempt runs on the permit taken in `ready`; retries take their own.
    async fn chat(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let mut attempt = 0u32;
        with_retry(self.retry, || {
            attempt += 1;
            let retrying = attempt > 1;
            async move {
                if retrying {
                    self.client.until_ready().await;
                }
                self.chat_once(system, user).await
            }
        })
        .await
    }
}

const SCORE_PROMPT: &str = "You rate how well a source passage supports a claim from an academic \
manuscript. Reply with JSON only: {\"relevance\": <number between 0 and 1>, \"confidence\": <number \
between 0 and 1>}. Relevance 1 means the passage directly states or demonstrates the claim, 0 means \
it is unrelated. Confidence is how sure you are of the relevance value.";

const JUDGE_PROMPT: &str = "You decide whether a sentence from an academic manuscript makes a claim \
that should be supported by a citation. Reply with JSON only: {\"needs_citation\": <probability \
between 0 and 1>, \"kind\": \"factual\"|\"statistical\"|\"theoretical\"|\"methodological\"|\"interpretation\"}.";

#[async_trait]
impl RelevanceOracle for OpenAiOracle {
    fn id(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> OracleCapabilities {
        OracleCapabilities::SCORE | OracleCapabilities::JUDGE_CLAIM
    }

    async fn ready(&self) {
        self.client.until_ready().await;
    }

    async fn score(&self, claim: &str, passage: &str) -> Result<OracleScore, OracleError> {
        let user = format!(
            "Claim: {}\n\nPassage: {}",
            claim.trim(),
            truncate_chars(passage.trim(), MAX_PASSAGE_CHARS)
        );
        let text = self.chat(SCORE_PROMPT, &user).await?;
        let reply: RelevanceReply = parse_json_reply(&text)?;
        OracleScore::new(reply.relevance, reply.confidence)
    }

    async fn judge_claim(&self, sentence: &str) -> Result<ClaimJudgement, OracleError> {
        let text = self.chat(JUDGE_PROMPT, sentence.trim()).await?;
        let reply: JudgementReply = parse_json_reply(&text)?;
        ClaimJudgement::new(reply.needs_citation, reply.kind.as_deref().and_then(parse_kind))
    }
}

fn parse_kind(kind: &str) -> Option<ClaimKind> {
    match kind.trim().to_lowercase().as_str() {
        "factual" => Some(ClaimKind::Factual),
        "statistical" => Some(ClaimKind::Statistical),
        "theoretical" => Some(ClaimKind::Theoretical),
        "methodological" => Some(ClaimKind::Methodological),
        "interpretation" | "opinion" => Some(ClaimKind::Interpretation),
        _ => None,
    }
}

/// Parse a JSON object from a model reply, tolerating markdown fences and
/// surrounding prose.
fn parse_json_reply<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, OracleError> {
    let trimmed = text.trim();
    let json_text = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => {
            return Err(OracleError::InvalidResponse(format!(
                "no JSON object in reply: {}",
                truncate_chars(trimmed, 80)
            )))
        }
    };
    Ok(serde_json::from_str(json_text)?)
}
