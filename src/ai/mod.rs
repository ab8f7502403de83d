//! Provider-agnostic text generation.
//!
//! Handlers depend only on [`TextGenerator`]; one implementation exists
//! per provider. JSON-producing call sites go through [`generate_json`],
//! which owns the retry-with-decreasing-temperature contract.

mod anthropic;
mod openai;

pub use anthropic::AnthropicGenerator;
pub use openai::OpenAiGenerator;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error)]
pub enum GenError {
    #[error("no API key configured for provider {0}")]
    MissingApiKey(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("provider returned http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("empty completion from provider")]
    Empty,
    #[error("could not parse generated JSON after {attempts} attempts: {last_error}")]
    BadJson { attempts: u32, last_error: String },
}

#[derive(Debug, Clone, Copy)]
pub struct GenOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        opts: &GenOptions,
    ) -> Result<String, GenError>;
}

/// Construct a generator for the named provider.
pub fn build(provider: &str, api_key: String) -> Box<dyn TextGenerator> {
    match provider {
        "openai" => Box::new(OpenAiGenerator::new(api_key)),
        _ => Box::new(AnthropicGenerator::new(api_key)),
    }
}

/// Retry contract for JSON generation: up to `max_attempts` calls, each at
/// a lower temperature than the last, never below `floor`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub start_temperature: f32,
    pub step: f32,
    pub floor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            start_temperature: 0.2,
            step: 0.05,
            floor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Temperature for each attempt, e.g. `[0.2, 0.15, 0.1]` by default.
    pub fn temperatures(&self) -> Vec<f32> {
        (0..self.max_attempts)
            .map(|i| (self.start_temperature - self.step * i as f32).max(self.floor))
            .collect()
    }
}

/// Ask the generator for JSON and parse it into `T`.
///
/// Markdown code fences are stripped before parsing. A parse failure moves
/// to the next attempt of the policy; transport/provider errors surface
/// immediately since a cooler retry would not help them.
pub async fn generate_json<T: DeserializeOwned>(
    generator: &dyn TextGenerator,
    policy: &RetryPolicy,
    system: &str,
    user: &str,
    max_tokens: u32,
) -> Result<T, GenError> {
    let temperatures = policy.temperatures();
    let attempts = temperatures.len() as u32;
    let mut last_error = String::new();

    for (i, temperature) in temperatures.into_iter().enumerate() {
        let opts = GenOptions {
            temperature,
            max_tokens,
        };
        let text = generator.generate(system, user, &opts).await?;
        let body = extract_json(&text);
        if body.trim().is_empty() {
            last_error = "empty completion".to_string();
        } else {
            match serde_json::from_str::<T>(body) {
                Ok(v) => return Ok(v),
                Err(e) => last_error = e.to_string(),
            }
        }
        warn!(
            attempt = i + 1,
            temperature, "generated output was not valid JSON: {}", last_error
        );
    }

    Err(GenError::BadJson {
        attempts,
        last_error,
    })
}

/// Strip a surrounding markdown code fence if present; providers often
/// wrap JSON in ```json blocks even when told not to.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        // skip a language identifier on the fence line
        let content_start = text[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}
