// src/ai/persona.rs
use anyhow::{anyhow, Result};
use log::info;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::connector::PersonaAnalyzer;
use super::error::remote_error;
use super::{AiError, API_KEY_HEADER};
use crate::capture::ImagePayload;
use crate::config::Config;
use crate::pipeline::PersonaDetails;

pub const PERSONA_INSTRUCTION: &str = "Identify the single most prominent object in this image. \
Give it a short, funny personality, as if it were a character with strong opinions (one or two sentences). \
Then write an animation prompt for a roughly 5-second looping video in which this object comes to life. \
The motion must fit the object's physical form: it can wiggle, bounce, blink or gesture with parts it \
actually has, but it should stay recognisably the same object in the same setting. \
Answer with JSON only, using the fields objectName, personality and animationPrompt.";

/// Vision model client that invents a persona for a photo
pub struct GeminiAnalyzer {
    client: Client,
    api_key: String,
    base_url: String,
    model_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    InlineData(InlineData),
    Text(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Deserialize)]
struct TextPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

// Everything optional so a missing field is reported by name.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPersona {
    object_name: Option<String>,
    personality: Option<String>,
    animation_prompt: Option<String>,
}

impl GeminiAnalyzer {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        info!("Initializing persona model: {} at {}", config.persona_model, config.base_url);

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.clone(),
            model_name: config.persona_model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model_name)
    }
}

impl PersonaAnalyzer for GeminiAnalyzer {
    fn analyze(&self, image: &ImagePayload) -> Result<PersonaDetails, AiError> {
        info!(
            "Asking {} for a persona ({} bytes of {})",
            self.model_name,
            image.len(),
            image.mime_type()
        );

        let request = build_request(image, PERSONA_INSTRUCTION);
        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(remote_error(status, &body));
        }

        let text = extract_text(&body)?;
        let persona = parse_persona(&text)?;
        info!("Persona ready: {}", persona.object_name);
        Ok(persona)
    }
}

fn persona_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "objectName": {
                "type": "STRING",
                "description": "Short common name of the most prominent object"
            },
            "personality": {
                "type": "STRING",
                "description": "A short comedic personality for the object"
            },
            "animationPrompt": {
                "type": "STRING",
                "description": "Directive for a ~5 second looping animation of the object"
            }
        },
        "required": ["objectName", "personality", "animationPrompt"],
        "propertyOrdering": ["objectName", "personality", "animationPrompt"]
    })
}

fn build_request(image: &ImagePayload, instruction: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                Part::InlineData(InlineData {
                    mime_type: image.mime_type().to_string(),
                    data: image.to_base64(),
                }),
                Part::Text(instruction.to_string()),
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: persona_schema(),
        },
    }
}

/// Pull the model's text answer out of a `generateContent` response body.
fn extract_text(body: &str) -> Result<String, AiError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| AiError::RemoteCall(format!("unreadable response: {}", e)))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AiError::RemoteCall(format!(
            "request blocked by safety filters: {}",
            reason
        )));
    }

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .ok_or_else(|| AiError::RemoteCall("the model returned no answer".to_string()))
}

/// Validate the model's JSON answer into a persona with every field filled in.
pub fn parse_persona(text: &str) -> Result<PersonaDetails, AiError> {
    let raw: RawPersona = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AiError::Schema(format!("persona is not valid JSON: {}", e)))?;

    Ok(PersonaDetails {
        object_name: required("objectName", raw.object_name)?,
        personality: required("personality", raw.personality)?,
        animation_prompt: required("animationPrompt", raw.animation_prompt)?,
    })
}

fn required(field: &str, value: Option<String>) -> Result<String, AiError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(AiError::Schema(format!("persona field `{}` is empty", field))),
        None => Err(AiError::Schema(format!("persona is missing `{}`", field))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}
