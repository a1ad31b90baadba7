//! Client for the generative-language service behind `POST /detect`.
//!
//! Sends a clinical-analysis prompt, plus an optional JPEG or PNG image, to a
//! `generateContent` endpoint and returns the reply as an HTML fragment.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Image types the analysis service accepts.
pub const SUPPORTED_IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
  pub base_url:     String,
  pub model:        String,
  /// Without a key every analysis fails with [`AnalysisError::NotConfigured`].
  pub api_key:      Option<String>,
  pub timeout_secs: u64,
}

impl Default for AnalysisSettings {
  fn default() -> Self {
    Self {
      base_url:     "https://generativelanguage.googleapis.com".to_owned(),
      model:        "gemini-1.5-flash".to_owned(),
      api_key:      None,
      timeout_secs: 60,
    }
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AnalysisError {
  #[error("the analysis service is not configured")]
  NotConfigured,

  #[error("unsupported image format {0:?}; use JPEG or PNG")]
  UnsupportedImage(String),

  #[error("request to the analysis service failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("analysis service returned {status}")]
  Status { status: u16 },

  #[error("analysis service returned no text")]
  EmptyResponse,
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateResponse {
  candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Candidate {
  content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
  parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidatePart {
  text: Option<String>,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// An image to analyse alongside the text.
#[derive(Debug, Clone)]
pub struct ImageInput {
  pub mime_type: String,
  pub data:      Bytes,
}

impl ImageInput {
  /// Accept only the types in [`SUPPORTED_IMAGE_TYPES`].
  pub fn new(mime_type: impl Into<String>, data: Bytes) -> Result<Self, AnalysisError> {
    let mime_type = mime_type.into();
    if !SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
      return Err(AnalysisError::UnsupportedImage(mime_type));
    }
    Ok(Self { mime_type, data })
  }
}

/// Async client for the analysis service.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct AnalysisClient {
  client:   Client,
  settings: AnalysisSettings,
}

impl AnalysisClient {
  pub fn new(settings: AnalysisSettings) -> Result<Self, AnalysisError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(settings.timeout_secs))
      .build()?;
    Ok(Self { client, settings })
  }

  fn url(&self) -> String {
    format!(
      "{}/v1beta/models/{}:generateContent",
      self.settings.base_url.trim_end_matches('/'),
      self.settings.model
    )
  }

  /// Run one analysis and return the cleaned HTML fragment.
  pub async fn analyze(
    &self,
    input_text: &str,
    image: Option<&ImageInput>,
  ) -> Result<String, AnalysisError> {
    let api_key = self
      .settings
      .api_key
      .as_deref()
      .filter(|k| !k.is_empty())
      .ok_or(AnalysisError::NotConfigured)?;

    let mut parts = vec![json!({ "text": build_prompt(input_text) })];
    if let Some(image) = image {
      parts.push(json!({
        "inline_data": {
          "mime_type": image.mime_type,
          "data":      B64.encode(&image.data),
        }
      }));
    }

    let resp = self
      .client
      .post(self.url())
      .query(&[("key", api_key)])
      .json(&json!({ "contents": [{ "parts": parts }] }))
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(AnalysisError::Status { status: resp.status().as_u16() });
    }

    let body: GenerateResponse = resp.json().await?;
    let text: String = body
      .candidates
      .into_iter()
      .next()
      .map(|c| {
        c.content
          .parts
          .into_iter()
          .filter_map(|p| p.text)
          .collect()
      })
      .unwrap_or_default();

    if text.trim().is_empty() {
      return Err(AnalysisError::EmptyResponse);
    }
    Ok(clean_response(&text))
  }
}

// ─── Prompt and reply shaping ────────────────────────────────────────────────

/// The structured clinical-analysis prompt wrapped around the staff input.
pub fn build_prompt(input_text: &str) -> String {
  format!(
    "You are a clinical decision support assistant for trained healthcare workers.
Based on the information below, provide a structured clinical analysis.
Format the output using simple HTML tags (<h4>, <ul>, <li>, <p>, <b>, <i>).

Input data:
{input_text}

Structure the analysis as:
<h4>1. Red Flags / Urgent Actions</h4>
<p>Critical signs that warrant immediate escalation, or \"No immediate red flags identified.\"</p>
<h4>2. Top Potential Conditions</h4>
<ul><li>Conditions from most to least likely, each with a High, Medium or Low confidence.</li></ul>
<h4>3. Key Questions to Ask Patient</h4>
<ul><li>Three or four critical follow-up questions.</li></ul>
<h4>4. Recommended Initial Investigations</h4>
<ul><li>Relevant lab tests or imaging.</li></ul>
<p><em><b>Disclaimer:</b> This AI analysis supports clinical judgment and is not a substitute for a professional medical diagnosis.</em></p>
"
  )
}

/// Strip a surrounding ```` ```html ```` fence and `<html>` wrapper.
pub fn clean_response(raw: &str) -> String {
  let mut text = raw.trim();
  if let Some(rest) = text.strip_prefix("```html") {
    text = rest.trim();
  }
  if let Some(rest) = text.strip_suffix("```") {
    text = rest.trim();
  }
  if let Some(rest) = text.strip_prefix("<html>") {
    text = rest.trim();
  }
  if let Some(rest) = text.strip_suffix("</html>") {
    text = rest.trim();
  }
  text.to_owned()
}
