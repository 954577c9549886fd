use std::time::Duration;

use anyhow::Context as _;
use serde_json::Value;

/// Minimal blocking client for the OpenAI Responses API.
pub struct ResponsesClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ResponsesClient {
    pub fn new(base_url: &str, api_key: String, model: String) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            endpoint: responses_endpoint(base_url),
            api_key,
            model,
        })
    }

    pub fn complete(&self, instructions: &str, input: &str) -> anyhow::Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "instructions": instructions,
            "input": input,
            "text": { "format": { "type": "text" } },
            "store": false,
        });
        // GPT-5 models reject sampling parameters.
        if !self.model.starts_with("gpt-5")
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("temperature".to_owned(), serde_json::json!(0.2));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().context("read OpenAI response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or(raw);
            anyhow::bail!("OpenAI API error ({status}): {message}");
        }

        let value: Value = serde_json::from_str(&raw).context("parse OpenAI response")?;
        extract_output_text(&value)
    }
}

pub fn responses_endpoint(base_url: &str) -> String {
    format!("{}/responses", base_url.trim_end_matches('/'))
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_json).ok()?;
    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Concatenates every `output_text` part of every `message` output item.
fn extract_output_text(value: &Value) -> anyhow::Result<String> {
    let output = value
        .get("output")
        .and_then(Value::as_array)
        .context("missing `output` array in response")?;

    let text = output
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<String>();

    if text.trim().is_empty() {
        anyhow::bail!("OpenAI output text is empty");
    }
    Ok(text)
}
