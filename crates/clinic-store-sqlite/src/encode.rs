//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! UTC timestamps are stored as fixed-width RFC 3339 strings so they sort
//! lexicographically. Calendar dates are `YYYY-MM-DD`; clinic-local reminder
//! times are `YYYY-MM-DDTHH:MM:SS`. Enumerations use their display strings and
//! structured values are compact JSON.

use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use clinic_core::{
  audit::{AuditLogEntry, FieldDiff},
  patient::{OtherVital, PatientFields, PatientRecord},
  reminder::{Prescription, Reminder},
  user::User,
  vitals::VitalAssessment,
};
use rusqlite::Row;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn encode_local(dt: NaiveDateTime) -> String { dt.format(LOCAL_FORMAT).to_string() }

pub fn decode_local(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, LOCAL_FORMAT)
    .map_err(|e| Error::Decode(format!("local time {s:?}: {e}")))
}

/// Parse a stored enumeration string.
pub fn decode_enum<T: FromStr>(s: &str, kind: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {kind}: {s:?}")))
}

fn decode_json_opt<T: serde::de::DeserializeOwned>(s: Option<&str>) -> Result<Option<T>> {
  Ok(s.map(serde_json::from_str).transpose()?)
}

// ─── Patients ────────────────────────────────────────────────────────────────

/// Column list matching [`RawPatient::from_row`].
pub const PATIENT_COLUMNS: &str = "record_id, uhid, version, is_active, \
  name, age, gender, phone_number, email, address, \
  temperature, bp_systolic, bp_diastolic, sugar, height, weight, other_vitals, \
  smoking_status, alcohol_frequency, physical_activity, diet_type, \
  chronic_conditions, current_medications, allergies, \
  bmi, temp_status, bp_status, sugar_status, bmi_status, \
  record_date, created_at";

/// A `patients` row with dates, enums and JSON still in string form.
pub struct RawPatient {
  pub record_id:           i64,
  pub uhid:                String,
  pub version:             u32,
  pub is_active:           bool,
  pub name:                String,
  pub age:                 Option<u32>,
  pub gender:              String,
  pub phone_number:        Option<String>,
  pub email:               Option<String>,
  pub address:             Option<String>,
  pub temperature:         Option<f64>,
  pub bp_systolic:         Option<i64>,
  pub bp_diastolic:        Option<i64>,
  pub sugar:               Option<i64>,
  pub height:              Option<f64>,
  pub weight:              Option<f64>,
  pub other_vitals:        String,
  pub smoking_status:      Option<String>,
  pub alcohol_frequency:   Option<String>,
  pub physical_activity:   Option<String>,
  pub diet_type:           Option<String>,
  pub chronic_conditions:  Option<String>,
  pub current_medications: Option<String>,
  pub allergies:           Option<String>,
  pub bmi:                 f64,
  pub temp_status:         String,
  pub bp_status:           String,
  pub sugar_status:        String,
  pub bmi_status:          String,
  pub record_date:         String,
  pub created_at:          String,
}

impl RawPatient {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:           row.get(0)?,
      uhid:                row.get(1)?,
      version:             row.get(2)?,
      is_active:           row.get(3)?,
      name:                row.get(4)?,
      age:                 row.get(5)?,
      gender:              row.get(6)?,
      phone_number:        row.get(7)?,
      email:               row.get(8)?,
      address:             row.get(9)?,
      temperature:         row.get(10)?,
      bp_systolic:         row.get(11)?,
      bp_diastolic:        row.get(12)?,
      sugar:               row.get(13)?,
      height:              row.get(14)?,
      weight:              row.get(15)?,
      other_vitals:        row.get(16)?,
      smoking_status:      row.get(17)?,
      alcohol_frequency:   row.get(18)?,
      physical_activity:   row.get(19)?,
      diet_type:           row.get(20)?,
      chronic_conditions:  row.get(21)?,
      current_medications: row.get(22)?,
      allergies:           row.get(23)?,
      bmi:                 row.get(24)?,
      temp_status:         row.get(25)?,
      bp_status:           row.get(26)?,
      sugar_status:        row.get(27)?,
      bmi_status:          row.get(28)?,
      record_date:         row.get(29)?,
      created_at:          row.get(30)?,
    })
  }

  pub fn into_record(self) -> Result<PatientRecord> {
    let other_vitals: Vec<OtherVital> = serde_json::from_str(&self.other_vitals)?;

    let fields = PatientFields {
      name: self.name,
      age: self.age,
      gender: self.gender,
      phone_number: self.phone_number,
      email: self.email,
      address: self.address,
      temperature: self.temperature,
      bp_systolic: self.bp_systolic,
      bp_diastolic: self.bp_diastolic,
      sugar: self.sugar,
      height: self.height,
      weight: self.weight,
      other_vitals,
      smoking_status: self.smoking_status,
      alcohol_frequency: self.alcohol_frequency,
      physical_activity: self.physical_activity,
      diet_type: self.diet_type,
      chronic_conditions: self.chronic_conditions,
      current_medications: self.current_medications,
      allergies: self.allergies,
      record_date: decode_date(&self.record_date)?,
    };

    let assessment = VitalAssessment {
      bmi:          self.bmi,
      temp_status:  decode_enum(&self.temp_status, "vital status")?,
      bp_status:    decode_enum(&self.bp_status, "vital status")?,
      sugar_status: decode_enum(&self.sugar_status, "vital status")?,
      bmi_status:   decode_enum(&self.bmi_status, "vital status")?,
    };

    Ok(PatientRecord {
      record_id: self.record_id,
      uhid: self.uhid,
      version: self.version,
      is_active: self.is_active,
      fields,
      assessment,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Prescriptions and reminders ─────────────────────────────────────────────

pub const PRESCRIPTION_COLUMNS: &str = "prescription_id, uhid, reminder_type, \
  doctor_name, medication_name, frequency, duration_days, start_date, \
  follow_up_datetime, special_note, created_at";

pub struct RawPrescription {
  pub prescription_id:    i64,
  pub uhid:               String,
  pub reminder_type:      String,
  pub doctor_name:        Option<String>,
  pub medication_name:    Option<String>,
  pub frequency:          Option<u32>,
  pub duration_days:      Option<u32>,
  pub start_date:         Option<String>,
  pub follow_up_datetime: Option<String>,
  pub special_note:       Option<String>,
  pub created_at:         String,
}

impl RawPrescription {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      prescription_id:    row.get(0)?,
      uhid:               row.get(1)?,
      reminder_type:      row.get(2)?,
      doctor_name:        row.get(3)?,
      medication_name:    row.get(4)?,
      frequency:          row.get(5)?,
      duration_days:      row.get(6)?,
      start_date:         row.get(7)?,
      follow_up_datetime: row.get(8)?,
      special_note:       row.get(9)?,
      created_at:         row.get(10)?,
    })
  }

  pub fn into_prescription(self) -> Result<Prescription> {
    Ok(Prescription {
      prescription_id:    self.prescription_id,
      uhid:               self.uhid,
      reminder_type:      decode_enum(&self.reminder_type, "reminder type")?,
      doctor_name:        self.doctor_name,
      medication_name:    self.medication_name,
      frequency:          self.frequency,
      duration_days:      self.duration_days,
      start_date:         self.start_date.as_deref().map(decode_date).transpose()?,
      follow_up_datetime: self
        .follow_up_datetime
        .as_deref()
        .map(decode_local)
        .transpose()?,
      special_note:       self.special_note,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawReminder {
  pub reminder_id:     i64,
  pub prescription_id: i64,
  pub reminder_time:   String,
  pub status:          String,
}

impl RawReminder {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      reminder_id:     row.get(0)?,
      prescription_id: row.get(1)?,
      reminder_time:   row.get(2)?,
      status:          row.get(3)?,
    })
  }

  pub fn into_reminder(self) -> Result<Reminder> {
    Ok(Reminder {
      reminder_id:     self.reminder_id,
      prescription_id: self.prescription_id,
      reminder_time:   decode_local(&self.reminder_time)?,
      status:          decode_enum(&self.status, "reminder status")?,
    })
  }
}

// ─── Audit log ───────────────────────────────────────────────────────────────

pub const AUDIT_COLUMNS: &str = "log_id, user_id, username, event_type, \
  event_details, timestamp, session_id, ip_address, changed_from, changed_to";

pub struct RawAuditEntry {
  pub log_id:        i64,
  pub user_id:       Option<i64>,
  pub username:      String,
  pub event_type:    String,
  pub event_details: Option<String>,
  pub timestamp:     String,
  pub session_id:    Option<String>,
  pub ip_address:    Option<String>,
  pub changed_from:  Option<String>,
  pub changed_to:    Option<String>,
}

impl RawAuditEntry {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      log_id:        row.get(0)?,
      user_id:       row.get(1)?,
      username:      row.get(2)?,
      event_type:    row.get(3)?,
      event_details: row.get(4)?,
      timestamp:     row.get(5)?,
      session_id:    row.get(6)?,
      ip_address:    row.get(7)?,
      changed_from:  row.get(8)?,
      changed_to:    row.get(9)?,
    })
  }

  pub fn into_entry(self) -> Result<AuditLogEntry> {
    let changed_from: Option<BTreeMap<String, String>> =
      decode_json_opt(self.changed_from.as_deref())?;
    let changed_to: Option<BTreeMap<String, String>> =
      decode_json_opt(self.changed_to.as_deref())?;

    let diff = match (changed_from, changed_to) {
      (None, None) => None,
      (from, to) => Some(FieldDiff {
        changed_from: from.unwrap_or_default(),
        changed_to:   to.unwrap_or_default(),
      }),
    };

    Ok(AuditLogEntry {
      log_id: self.log_id,
      user_id: self.user_id,
      username: self.username,
      event_type: decode_enum(&self.event_type, "event type")?,
      details: decode_json_opt(self.event_details.as_deref())?,
      timestamp: decode_dt(&self.timestamp)?,
      session_id: self.session_id,
      ip_address: self.ip_address,
      diff,
    })
  }
}

// ─── Users ───────────────────────────────────────────────────────────────────

pub const USER_COLUMNS: &str =
  "user_id, username, role, department, is_active, created_at";

pub struct RawUser {
  pub user_id:    i64,
  pub username:   String,
  pub role:       String,
  pub department: Option<String>,
  pub is_active:  bool,
  pub created_at: String,
}

impl RawUser {
  /// Read the user columns starting at `offset`, so joins can reuse this.
  pub fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:    row.get(offset)?,
      username:   row.get(offset + 1)?,
      role:       row.get(offset + 2)?,
      department: row.get(offset + 3)?,
      is_active:  row.get(offset + 4)?,
      created_at: row.get(offset + 5)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:    self.user_id,
      username:   self.username,
      role:       decode_enum(&self.role, "role")?,
      department: self.department,
      is_active:  self.is_active,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveTime, TimeZone};

  use super::*;

  #[test]
  fn utc_timestamps_are_fixed_width_and_sortable() {
    let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    let b = a + chrono::Duration::microseconds(1);
    let (ea, eb) = (encode_dt(a), encode_dt(b));
    assert_eq!(ea.len(), eb.len());
    assert!(ea < eb);
    assert_eq!(decode_dt(&ea).unwrap(), a);
  }

  #[test]
  fn local_times_roundtrip() {
    let t = NaiveDate::from_ymd_opt(2026, 5, 10)
      .unwrap()
      .and_time(NaiveTime::from_hms_opt(20, 0, 0).unwrap());
    assert_eq!(encode_local(t), "2026-05-10T20:00:00");
    assert_eq!(decode_local(&encode_local(t)).unwrap(), t);
  }

  #[test]
  fn unknown_enum_is_a_decode_error() {
    let err = decode_enum::<clinic_core::vitals::VitalStatus>("Fine", "vital status")
      .unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
  }
}
