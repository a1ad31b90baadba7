//! Patient records: the versioned unit of the clinic store.
//!
//! A patient is identified by a stable UHID. Every edit appends a new
//! [`PatientRecord`] version and deactivates the previous one, so the full
//! history stays queryable by UHID. Rows are never deleted.

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  vitals::{self, VitalAssessment},
};

/// Upper bound on the number of free-form vitals attached to one record.
pub const MAX_OTHER_VITALS: usize = 20;

// ─── Fields ──────────────────────────────────────────────────────────────────

/// A measurement without a dedicated column, e.g. `SpO2 = 97%`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherVital {
  pub name:  String,
  pub value: String,
}

/// The caller-editable content of a patient record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientFields {
  // ── Demographics ─────────────────────────────────────────────────────────
  pub name:                String,
  pub age:                 Option<u32>,
  pub gender:              String,
  pub phone_number:        Option<String>,
  pub email:               Option<String>,
  pub address:             Option<String>,

  // ── Vitals ───────────────────────────────────────────────────────────────
  /// Degrees Fahrenheit.
  pub temperature:         Option<f64>,
  pub bp_systolic:         Option<i64>,
  pub bp_diastolic:        Option<i64>,
  /// mg/dL.
  pub sugar:               Option<i64>,
  /// Centimetres.
  pub height:              Option<f64>,
  /// Kilograms.
  pub weight:              Option<f64>,
  #[serde(default)]
  pub other_vitals:        Vec<OtherVital>,

  // ── Lifestyle ────────────────────────────────────────────────────────────
  pub smoking_status:      Option<String>,
  pub alcohol_frequency:   Option<String>,
  pub physical_activity:   Option<String>,
  pub diet_type:           Option<String>,

  // ── Past history ─────────────────────────────────────────────────────────
  pub chronic_conditions:  Option<String>,
  pub current_medications: Option<String>,
  pub allergies:           Option<String>,

  pub record_date:         NaiveDate,
}

impl PatientFields {
  /// Fields with only the required values set.
  pub fn new(
    name: impl Into<String>,
    gender: impl Into<String>,
    record_date: NaiveDate,
  ) -> Self {
    Self {
      name: name.into(),
      age: None,
      gender: gender.into(),
      phone_number: None,
      email: None,
      address: None,
      temperature: None,
      bp_systolic: None,
      bp_diastolic: None,
      sugar: None,
      height: None,
      weight: None,
      other_vitals: Vec::new(),
      smoking_status: None,
      alcohol_frequency: None,
      physical_activity: None,
      diet_type: None,
      chronic_conditions: None,
      current_medications: None,
      allergies: None,
      record_date,
    }
  }

  /// Check the invariants that typed construction cannot express.
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::MissingField("name"));
    }
    if self.gender.trim().is_empty() {
      return Err(Error::MissingField("gender"));
    }
    if self.other_vitals.len() > MAX_OTHER_VITALS {
      return Err(Error::TooManyOtherVitals {
        max: MAX_OTHER_VITALS,
        got: self.other_vitals.len(),
      });
    }
    if self.other_vitals.iter().any(|v| v.name.trim().is_empty()) {
      return Err(Error::MissingField("other vital name"));
    }
    Ok(())
  }
}

// ─── Form input ──────────────────────────────────────────────────────────────

/// Untyped patient input as submitted by staff: every value is a string and
/// empty strings mean "not recorded".
///
/// Converted to [`PatientFields`] with [`TryFrom`], which reports the first
/// malformed value as a validation error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientForm {
  pub name:                String,
  pub age:                 String,
  pub gender:              String,
  pub phone_number:        String,
  pub email:               String,
  pub address:             String,
  pub temperature:         String,
  pub bp_systolic:         String,
  pub bp_diastolic:        String,
  pub sugar:               String,
  pub height:              String,
  pub weight:              String,
  pub other_vitals:        Vec<OtherVital>,
  pub smoking_status:      String,
  pub alcohol_frequency:   String,
  pub physical_activity:   String,
  pub diet_type:           String,
  pub chronic_conditions:  String,
  pub current_medications: String,
  pub allergies:           String,
  pub record_date:         String,
}

fn parse_opt<T: FromStr>(
  raw: &str,
  field: &'static str,
  expected: &'static str,
) -> Result<Option<T>> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Ok(None);
  }
  trimmed.parse().map(Some).map_err(|_| Error::InvalidField {
    field,
    value: trimmed.to_owned(),
    expected,
  })
}

fn text_opt(raw: &str) -> Option<String> {
  let trimmed = raw.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(raw: &str, field: &'static str) -> Result<NaiveDate> {
  let trimmed = raw.trim();
  NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| {
    Error::InvalidDate { field, value: trimmed.to_owned() }
  })
}

impl TryFrom<PatientForm> for PatientFields {
  type Error = Error;

  fn try_from(form: PatientForm) -> Result<Self> {
    let name = form.name.trim().to_owned();
    if name.is_empty() {
      return Err(Error::MissingField("name"));
    }
    let gender = form.gender.trim().to_owned();
    if gender.is_empty() {
      return Err(Error::MissingField("gender"));
    }

    let other_vitals = form
      .other_vitals
      .into_iter()
      .map(|v| OtherVital {
        name:  v.name.trim().to_owned(),
        value: v.value.trim().to_owned(),
      })
      .filter(|v| !(v.name.is_empty() && v.value.is_empty()))
      .collect();

    let fields = PatientFields {
      name,
      age: parse_opt(&form.age, "age", "integer")?,
      gender,
      phone_number: text_opt(&form.phone_number),
      email: text_opt(&form.email),
      address: text_opt(&form.address),
      temperature: parse_opt(&form.temperature, "temperature", "number")?,
      bp_systolic: parse_opt(&form.bp_systolic, "systolic BP", "integer")?,
      bp_diastolic: parse_opt(&form.bp_diastolic, "diastolic BP", "integer")?,
      sugar: parse_opt(&form.sugar, "blood sugar", "integer")?,
      height: parse_opt(&form.height, "height", "number")?,
      weight: parse_opt(&form.weight, "weight", "number")?,
      other_vitals,
      smoking_status: text_opt(&form.smoking_status),
      alcohol_frequency: text_opt(&form.alcohol_frequency),
      physical_activity: text_opt(&form.physical_activity),
      diet_type: text_opt(&form.diet_type),
      chronic_conditions: text_opt(&form.chronic_conditions),
      current_medications: text_opt(&form.current_medications),
      allergies: text_opt(&form.allergies),
      record_date: parse_date(&form.record_date, "record date")?,
    };
    fields.validate()?;
    Ok(fields)
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// One stored version of a patient record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
  /// Surrogate row key; differs between versions of the same patient.
  pub record_id:  i64,
  pub uhid:       String,
  /// Starts at 1 and increases by one with every edit.
  pub version:    u32,
  pub is_active:  bool,
  #[serde(flatten)]
  pub fields:     PatientFields,
  #[serde(flatten)]
  pub assessment: VitalAssessment,
  pub created_at: DateTime<Utc>,
}

fn show<T: Display>(v: &Option<T>) -> String {
  v.as_ref().map(ToString::to_string).unwrap_or_default()
}

impl PatientRecord {
  /// Stringified view of every audited field.
  ///
  /// Row metadata (`record_id`, `version`, `is_active`, `created_at`) is
  /// excluded: it changes on every edit and is not patient data.
  pub fn audit_snapshot(&self) -> BTreeMap<String, String> {
    let f = &self.fields;
    let a = &self.assessment;
    let other_vitals = f
      .other_vitals
      .iter()
      .map(|v| format!("{}={}", v.name, v.value))
      .collect::<Vec<_>>()
      .join("; ");

    [
      ("name", f.name.clone()),
      ("age", show(&f.age)),
      ("gender", f.gender.clone()),
      ("phone_number", show(&f.phone_number)),
      ("email", show(&f.email)),
      ("address", show(&f.address)),
      ("temperature", show(&f.temperature)),
      ("bp_systolic", show(&f.bp_systolic)),
      ("bp_diastolic", show(&f.bp_diastolic)),
      ("sugar", show(&f.sugar)),
      ("height", show(&f.height)),
      ("weight", show(&f.weight)),
      ("other_vitals", other_vitals),
      ("smoking_status", show(&f.smoking_status)),
      ("alcohol_frequency", show(&f.alcohol_frequency)),
      ("physical_activity", show(&f.physical_activity)),
      ("diet_type", show(&f.diet_type)),
      ("chronic_conditions", show(&f.chronic_conditions)),
      ("current_medications", show(&f.current_medications)),
      ("allergies", show(&f.allergies)),
      ("record_date", f.record_date.to_string()),
      ("bmi", a.bmi.to_string()),
      ("temp_status", a.temp_status.to_string()),
      ("bp_status", a.bp_status.to_string()),
      ("sugar_status", a.sugar_status.to_string()),
      ("bmi_status", a.bmi_status.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v))
    .collect()
  }
}

/// Input to [`crate::store::ClinicStore::create_patient`] and
/// [`crate::store::ClinicStore::update_patient`]: the fields plus their
/// assessment, computed once so every store backend agrees on it.
#[derive(Debug, Clone)]
pub struct NewVersion {
  pub fields:     PatientFields,
  pub assessment: VitalAssessment,
}

impl NewVersion {
  pub fn new(fields: PatientFields) -> Result<Self> {
    fields.validate()?;
    let assessment = vitals::assess(&fields);
    Ok(Self { fields, assessment })
  }
}

// ─── UHID ────────────────────────────────────────────────────────────────────

/// The UHID prefix for patients registered in `year`, e.g. `HC2026-`.
pub fn uhid_prefix(year: i32) -> String { format!("HC{year}-") }

/// The UHID following `last` in `year`. `last` is the highest UHID already
/// issued with that year's prefix, if any; an unparsable value restarts the
/// sequence at 1.
pub fn next_uhid(year: i32, last: Option<&str>) -> String {
  let prefix = uhid_prefix(year);
  let seq = last
    .and_then(|u| u.strip_prefix(&prefix))
    .and_then(|s| s.parse::<u32>().ok())
    .map_or(1, |n| n + 1);
  format!("{prefix}{seq:05}")
}
