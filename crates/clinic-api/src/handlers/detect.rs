//! `POST /detect`: AI-assisted condition suggestions.
//!
//! Body: `{"text": "...", "image_base64": "...", "image_mime_type": "image/png"}`.
//! At least one of text or image is required. The reply is
//! `{"conditions": "<html fragment>"}`.

use axum::{Json, extract::State};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use bytes::Bytes;
use clinic_core::{
  audit::{EventType, NewAuditEntry},
  store::ClinicStore,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::record;
use crate::{
  AppState,
  analysis::{AnalysisError, ImageInput},
  context::RequestContext,
  error::ApiError,
};

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DetectBody {
  pub text:            String,
  pub image_base64:    Option<String>,
  pub image_mime_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectResponse {
  pub conditions: String,
}

impl DetectBody {
  /// Decode the optional image. An absent or blank image is `None`.
  fn image(&self) -> Result<Option<ImageInput>, ApiError> {
    let Some(encoded) = self.image_base64.as_deref().filter(|s| !s.trim().is_empty()) else {
      return Ok(None);
    };
    let mime = self.image_mime_type.as_deref().unwrap_or_default();
    let data = B64
      .decode(encoded.trim())
      .map_err(|e| ApiError::Validation(format!("image is not valid base64: {e}")))?;
    ImageInput::new(mime, Bytes::from(data))
      .map(Some)
      .map_err(|e| ApiError::UnsupportedMedia(e.to_string()))
  }
}

fn preview(text: &str) -> String { text.chars().take(PREVIEW_CHARS).collect() }

/// `POST /detect`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  ctx: RequestContext,
  Json(body): Json<DetectBody>,
) -> Result<Json<DetectResponse>, ApiError>
where
  S: ClinicStore + 'static,
{
  let image = body.image()?;
  let text = body.text.trim();
  if text.is_empty() && image.is_none() {
    return Err(ApiError::Validation("provide symptoms text or an image".into()));
  }

  match state.analyzer.analyze(text, image.as_ref()).await {
    Ok(conditions) => {
      record(
        &*state.store,
        NewAuditEntry::new(ctx.actor(), EventType::AiAnalysis).details(json!({
          "input_preview": preview(text),
          "has_image": image.is_some(),
        })),
      )
      .await?;
      Ok(Json(DetectResponse { conditions }))
    }
    Err(e) => {
      tracing::warn!(error = %e, "analysis failed");
      record(
        &*state.store,
        NewAuditEntry::new(ctx.actor(), EventType::AiAnalysisFailed)
          .details(json!({ "error": e.to_string() })),
      )
      .await?;
      Err(match e {
        AnalysisError::UnsupportedImage(_) => ApiError::UnsupportedMedia(e.to_string()),
        other => ApiError::External(other.to_string()),
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_image_is_ignored() {
    let body = DetectBody { image_base64: Some("  ".into()), ..Default::default() };
    assert!(body.image().unwrap().is_none());
  }

  #[test]
  fn image_must_be_base64_and_supported() {
    let body = DetectBody {
      image_base64: Some("***".into()),
      image_mime_type: Some("image/png".into()),
      ..Default::default()
    };
    assert!(matches!(body.image(), Err(ApiError::Validation(_))));

    let body = DetectBody {
      image_base64: Some(B64.encode(b"GIF89a")),
      image_mime_type: Some("image/gif".into()),
      ..Default::default()
    };
    assert!(matches!(body.image(), Err(ApiError::UnsupportedMedia(_))));

    let body = DetectBody {
      image_base64: Some(B64.encode(b"\x89PNG")),
      image_mime_type: Some("image/png".into()),
      ..Default::default()
    };
    let image = body.image().unwrap().unwrap();
    assert_eq!(image.data.as_ref(), b"\x89PNG");
  }

  #[test]
  fn preview_is_char_bounded() {
    let long = "ज्वर ".repeat(40);
    assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS);
    assert_eq!(preview("cough"), "cough");
  }
}
