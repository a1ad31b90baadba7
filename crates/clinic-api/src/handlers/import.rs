//! `POST /patients/import`: bulk intake from a CSV upload.
//!
//! Rows are validated one by one. Valid rows are committed together; invalid
//! rows are reported as `Row N: message`, counting the header as row 1.

use std::collections::BTreeMap;

use axum::{Json, extract::State};
use clinic_core::{
  audit::{EventType, NewAuditEntry},
  patient::{NewVersion, OtherVital, PatientFields, PatientForm},
  store::ClinicStore,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::record;
use crate::{AppState, context::RequestContext, error::ApiError};

/// Columns every upload must carry.
pub const REQUIRED_COLUMNS: [&str; 12] = [
  "name",
  "age",
  "gender",
  "phone_number",
  "email",
  "temperature",
  "bp_systolic",
  "bp_diastolic",
  "sugar",
  "height",
  "weight",
  "record_date",
];

#[derive(Debug, Deserialize)]
struct CsvRow {
  name:         String,
  age:          String,
  gender:       String,
  phone_number: String,
  email:        String,
  temperature:  String,
  bp_systolic:  String,
  bp_diastolic: String,
  sugar:        String,
  height:       String,
  weight:       String,
  record_date:  String,
  /// JSON object of extra vitals, e.g. `{"SpO2": "97%"}`.
  #[serde(default)]
  other_vitals: String,
}

fn parse_other_vitals(raw: &str) -> Result<Vec<OtherVital>, String> {
  if raw.trim().is_empty() {
    return Ok(Vec::new());
  }
  let map: BTreeMap<String, Value> = serde_json::from_str(raw)
    .map_err(|_| "other_vitals must be a JSON object".to_owned())?;
  Ok(
    map
      .into_iter()
      .map(|(name, value)| OtherVital {
        name,
        value: match value {
          Value::String(s) => s,
          other => other.to_string(),
        },
      })
      .collect(),
  )
}

impl CsvRow {
  fn into_version(self) -> Result<NewVersion, String> {
    let form = PatientForm {
      other_vitals: parse_other_vitals(&self.other_vitals)?,
      name: self.name,
      age: self.age,
      gender: self.gender,
      phone_number: self.phone_number,
      email: self.email,
      temperature: self.temperature,
      bp_systolic: self.bp_systolic,
      bp_diastolic: self.bp_diastolic,
      sugar: self.sugar,
      height: self.height,
      weight: self.weight,
      record_date: self.record_date,
      ..PatientForm::default()
    };
    PatientFields::try_from(form)
      .and_then(NewVersion::new)
      .map_err(|e| e.to_string())
  }
}

/// The outcome of parsing an upload, before anything is stored.
#[derive(Debug, Default)]
pub struct ParsedUpload {
  pub rows:   Vec<NewVersion>,
  pub errors: Vec<String>,
}

/// Parse a CSV upload. Fails as a whole only when required columns are
/// missing or the header itself is unreadable.
pub fn parse_upload(body: &str) -> Result<ParsedUpload, ApiError> {
  let mut reader = csv::ReaderBuilder::new()
    .trim(csv::Trim::All)
    .flexible(true)
    .from_reader(body.as_bytes());

  let headers = reader
    .headers()
    .map_err(|e| ApiError::Validation(format!("unreadable CSV header: {e}")))?
    .clone();

  let missing: Vec<&str> = REQUIRED_COLUMNS
    .iter()
    .copied()
    .filter(|c| !headers.iter().any(|h| h == *c))
    .collect();
  if !missing.is_empty() {
    return Err(ApiError::Validation(format!(
      "missing required columns: {}",
      missing.join(", ")
    )));
  }

  let mut parsed = ParsedUpload::default();
  for (i, result) in reader.records().enumerate() {
    let row_number = i + 2;
    let outcome = result
      .and_then(|r| r.deserialize::<CsvRow>(Some(&headers)))
      .map_err(|e| e.to_string())
      .and_then(CsvRow::into_version);
    match outcome {
      Ok(row) => parsed.rows.push(row),
      Err(msg) => parsed.errors.push(format!("Row {row_number}: {msg}")),
    }
  }
  Ok(parsed)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportResponse {
  pub added:  usize,
  pub errors: Vec<String>,
}

/// `POST /patients/import`: body: `text/csv`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  ctx: RequestContext,
  body: String,
) -> Result<Json<ImportResponse>, ApiError>
where
  S: ClinicStore + 'static,
{
  let parsed = match parse_upload(&body) {
    Ok(parsed) => parsed,
    Err(e) => {
      record(
        &*state.store,
        NewAuditEntry::new(ctx.actor(), EventType::DataUploadFailed)
          .details(json!({ "reason": e.to_string() })),
      )
      .await?;
      return Err(e);
    }
  };

  let added = if parsed.rows.is_empty() {
    0
  } else {
    state
      .store
      .import_patients(ctx.actor(), parsed.rows)
      .await
      .map_err(ApiError::from_store)?
      .len()
  };

  if added == 0 {
    record(
      &*state.store,
      NewAuditEntry::new(ctx.actor(), EventType::DataUploadFailed)
        .details(json!({ "reason": "no valid rows", "errors": parsed.errors.len() })),
    )
    .await?;
  }
  if !parsed.errors.is_empty() {
    tracing::warn!(rejected = parsed.errors.len(), added, "upload rows rejected");
  }

  Ok(Json(ImportResponse { added, errors: parsed.errors }))
}
