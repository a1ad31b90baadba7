//! Vital-sign assessment: BMI and the four Normal/Abnormal status flags.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::patient::PatientFields;

/// Whether a measurement falls inside its reference range.
///
/// A missing measurement is always `Abnormal`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
pub enum VitalStatus {
  Normal,
  Abnormal,
}

impl VitalStatus {
  fn from_range(in_range: bool) -> Self {
    if in_range { Self::Normal } else { Self::Abnormal }
  }

  pub fn is_normal(self) -> bool { self == Self::Normal }
}

/// Computed values derived from a record's measurements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalAssessment {
  pub bmi:          f64,
  pub temp_status:  VitalStatus,
  pub bp_status:    VitalStatus,
  pub sugar_status: VitalStatus,
  pub bmi_status:   VitalStatus,
}

impl VitalAssessment {
  /// True if any of the four statuses is `Abnormal`.
  pub fn any_abnormal(&self) -> bool {
    self.statuses().iter().any(|s| !s.is_normal())
  }

  pub fn statuses(&self) -> [VitalStatus; 4] {
    [self.temp_status, self.bp_status, self.sugar_status, self.bmi_status]
  }
}

/// Body-mass index from height in centimetres and weight in kilograms,
/// rounded to two decimals. Zero when either value is missing or not
/// positive.
pub fn compute_bmi(height_cm: Option<f64>, weight_kg: Option<f64>) -> f64 {
  match (height_cm, weight_kg) {
    (Some(h), Some(w)) if h > 0.0 && w > 0.0 => {
      let metres = h / 100.0;
      (w / (metres * metres) * 100.0).round() / 100.0
    }
    _ => 0.0,
  }
}

/// Assess the vitals of a set of patient fields.
pub fn assess(fields: &PatientFields) -> VitalAssessment {
  let bmi = compute_bmi(fields.height, fields.weight);

  let temp_status = VitalStatus::from_range(
    fields.temperature.is_some_and(|t| (97.0..=99.0).contains(&t)),
  );
  let bp_status = VitalStatus::from_range(
    matches!(
      (fields.bp_systolic, fields.bp_diastolic),
      (Some(sys), Some(dia)) if (90..=120).contains(&sys) && (60..=80).contains(&dia)
    ),
  );
  let sugar_status = VitalStatus::from_range(
    fields.sugar.is_some_and(|s| (80..=110).contains(&s)),
  );
  let bmi_status = VitalStatus::from_range((18.5..=24.9).contains(&bmi));

  VitalAssessment { bmi, temp_status, bp_status, sugar_status, bmi_status }
}
