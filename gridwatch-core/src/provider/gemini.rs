use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Config,
    error::{DashboardError, DashboardResult},
    model::TipRequest,
    provider::{ServiceId, parse_json, require_key, send, truncate_body},
};

use super::TipGenerator;

const SERVICE: ServiceId = ServiceId::Gemini;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Single-turn `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiTipGenerator {
    api_key: Option<String>,
    base_url: String,
    model: String,
    http: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

impl GeminiTipGenerator {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        http: Client,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            model: model.into(),
            http,
        }
    }

    pub fn from_config(config: &Config, http: Client) -> Self {
        Self::new(
            config.api_key(SERVICE).map(str::to_owned),
            config.base_url(SERVICE),
            config.model(SERVICE).unwrap_or(DEFAULT_MODEL),
            http,
        )
    }
}

#[async_trait]
impl TipGenerator for GeminiTipGenerator {
    async fn generate_tips(&self, request: &TipRequest) -> DashboardResult<String> {
        let api_key = require_key(SERVICE, self.api_key.as_deref())?;
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);

        let prompt = request.prompt();
        debug!("Sending prompt to {}: {prompt}", self.model);

        let payload = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: &prompt }],
            }],
        };

        let (status, body) = send(
            SERVICE,
            self.http.post(&url).query(&[("key", api_key)]).json(&payload),
        )
        .await?;

        if !status.is_success() {
            return Err(DashboardError::upstream(
                SERVICE.display_name(),
                format!("call failed with status {status}: {}", truncate_body(&body)),
            ));
        }

        let parsed: GenerateResponse = parse_json(SERVICE, &body)?;
        let text = parsed.first_text().ok_or_else(|| {
            DashboardError::malformed(SERVICE.display_name(), "no candidate text in response")
        })?;

        info!("Received {} characters of tips", text.len());
        Ok(text)
    }
}
