//! Prescriptions and the reminder instances expanded from them.
//!
//! A [`ReminderPlan`] describes what staff asked for. [`ReminderPlan::expand`]
//! turns it into concrete, clinic-local reminder times; the store persists the
//! prescription and one [`Reminder`] row per time in one transaction.
//!
//! Reminder status is a lazy two-state machine: `Scheduled` flips to `Sent`
//! the first time the reminder list is read after `reminder_time` has passed.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

// ─── Enumerations ────────────────────────────────────────────────────────────

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
pub enum ReminderType {
  Medication,
  #[serde(rename = "Follow-up")]
  #[strum(serialize = "Follow-up")]
  FollowUp,
  Other,
}

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
pub enum ReminderStatus {
  Scheduled,
  Sent,
}

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
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Meridiem {
  Am,
  Pm,
}

// ─── Clock time ──────────────────────────────────────────────────────────────

/// A 12-hour wall-clock time as entered on the scheduling form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
  /// 1–12.
  pub hour:     u8,
  /// 0–59.
  pub minute:   u8,
  pub meridiem: Meridiem,
}

impl ClockTime {
  pub fn new(hour: u8, minute: u8, meridiem: Meridiem) -> Self {
    Self { hour, minute, meridiem }
  }

  /// Convert to a 24-hour time. 12 AM is midnight and 12 PM is noon.
  pub fn to_naive_time(self) -> Result<NaiveTime> {
    if !(1..=12).contains(&self.hour) || self.minute > 59 {
      return Err(Error::InvalidClockTime {
        hour:   self.hour,
        minute: self.minute,
      });
    }
    let hour = match (self.meridiem, self.hour) {
      (Meridiem::Am, 12) => 0,
      (Meridiem::Am, h) => h,
      (Meridiem::Pm, 12) => 12,
      (Meridiem::Pm, h) => h + 12,
    };
    NaiveTime::from_hms_opt(hour.into(), self.minute.into(), 0).ok_or(
      Error::InvalidClockTime { hour: self.hour, minute: self.minute },
    )
  }
}

/// Upper bound on doses per day for a medication plan.
pub const MAX_DOSES_PER_DAY: u32 = 24;

/// Upper bound on the length of a medication plan.
pub const MAX_DURATION_DAYS: u32 = 365;

// ─── Plan ────────────────────────────────────────────────────────────────────

/// What staff asked to be reminded about. The variant name is the
/// `reminder_type` discriminant on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reminder_type")]
pub enum ReminderPlan {
  Medication {
    doctor_name:     String,
    medication_name: String,
    /// Doses per day.
    frequency:       u32,
    /// Number of days, starting at `start_date`.
    duration_days:   u32,
    start_date:      NaiveDate,
    /// One entry per dose; must have exactly `frequency` entries.
    dose_times:      Vec<ClockTime>,
    #[serde(default)]
    special_note:    Option<String>,
  },
  #[serde(rename = "Follow-up")]
  FollowUp {
    date:         NaiveDate,
    time:         ClockTime,
    #[serde(default)]
    doctor_name:  Option<String>,
    #[serde(default)]
    special_note: Option<String>,
  },
  Other {
    title:        String,
    #[serde(default)]
    special_note: Option<String>,
  },
}

impl ReminderPlan {
  pub fn reminder_type(&self) -> ReminderType {
    match self {
      Self::Medication { .. } => ReminderType::Medication,
      Self::FollowUp { .. } => ReminderType::FollowUp,
      Self::Other { .. } => ReminderType::Other,
    }
  }

  /// Short human-readable label used in audit details.
  pub fn title(&self) -> &str {
    match self {
      Self::Medication { medication_name, .. } => medication_name,
      Self::FollowUp { .. } => "Follow-up Appointment",
      Self::Other { title, .. } => title,
    }
  }

  /// Expand the plan into concrete reminder times, in chronological order
  /// for each day.
  ///
  /// Validation happens up front: a plan that fails here produces no
  /// reminders at all.
  pub fn expand(&self) -> Result<Vec<NaiveDateTime>> {
    match self {
      Self::Medication {
        doctor_name,
        medication_name,
        frequency,
        duration_days,
        start_date,
        dose_times,
        ..
      } => {
        if doctor_name.trim().is_empty() {
          return Err(Error::MissingField("doctor name"));
        }
        if medication_name.trim().is_empty() {
          return Err(Error::MissingField("medication name"));
        }
        if !(1..=MAX_DOSES_PER_DAY).contains(frequency) {
          return Err(Error::Validation(format!(
            "frequency must be between 1 and {MAX_DOSES_PER_DAY} doses per day"
          )));
        }
        if !(1..=MAX_DURATION_DAYS).contains(duration_days) {
          return Err(Error::Validation(format!(
            "duration must be between 1 and {MAX_DURATION_DAYS} days"
          )));
        }
        if dose_times.len() != *frequency as usize {
          return Err(Error::ReminderSlotMismatch {
            frequency: *frequency,
            supplied:  dose_times.len(),
          });
        }

        let times = dose_times
          .iter()
          .map(|t| t.to_naive_time())
          .collect::<Result<Vec<_>>>()?;

        let total = times
          .len()
          .checked_mul(*duration_days as usize)
          .ok_or_else(|| Error::Validation("too many reminders".into()))?;
        let mut out = Vec::with_capacity(total);
        for day in 0..*duration_days {
          let date = start_date
            .checked_add_days(Days::new(day.into()))
            .ok_or_else(|| Error::Validation("duration overflows the calendar".into()))?;
          out.extend(times.iter().map(|t| date.and_time(*t)));
        }
        Ok(out)
      }
      Self::FollowUp { date, time, .. } => Ok(vec![date.and_time(time.to_naive_time()?)]),
      Self::Other { title, .. } => {
        if title.trim().is_empty() {
          return Err(Error::MissingField("title"));
        }
        Ok(Vec::new())
      }
    }
  }
}

/// Input to [`crate::store::ClinicStore::schedule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrescription {
  pub uhid: String,
  #[serde(flatten)]
  pub plan: ReminderPlan,
}

// ─── Stored types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
  pub prescription_id:    i64,
  pub uhid:               String,
  pub reminder_type:      ReminderType,
  pub doctor_name:        Option<String>,
  /// Medication name, or the title of a follow-up / other reminder.
  pub medication_name:    Option<String>,
  pub frequency:          Option<u32>,
  pub duration_days:      Option<u32>,
  pub start_date:         Option<NaiveDate>,
  pub follow_up_datetime: Option<NaiveDateTime>,
  pub special_note:       Option<String>,
  pub created_at:         DateTime<Utc>,
}

/// One concrete reminder instance. `reminder_time` is clinic-local.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
  pub reminder_id:     i64,
  pub prescription_id: i64,
  pub reminder_time:   NaiveDateTime,
  pub status:          ReminderStatus,
}

/// A prescription with its reminders, as returned by listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionView {
  pub prescription: Prescription,
  /// Name from the patient's active record, if one exists.
  pub patient_name: Option<String>,
  pub reminders:    Vec<Reminder>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn hm(h: u32, m: u32) -> NaiveTime { NaiveTime::from_hms_opt(h, m, 0).unwrap() }

  fn medication(frequency: u32, duration_days: u32, dose_times: Vec<ClockTime>) -> ReminderPlan {
    ReminderPlan::Medication {
      doctor_name: "Dr. Menon".into(),
      medication_name: "Amoxicillin".into(),
      frequency,
      duration_days,
      start_date: date(2026, 5, 10),
      dose_times,
      special_note: None,
    }
  }

  #[test]
  fn twelve_hour_conversion() {
    assert_eq!(ClockTime::new(12, 0, Meridiem::Am).to_naive_time().unwrap(), hm(0, 0));
    assert_eq!(ClockTime::new(12, 0, Meridiem::Pm).to_naive_time().unwrap(), hm(12, 0));
    assert_eq!(ClockTime::new(1, 30, Meridiem::Pm).to_naive_time().unwrap(), hm(13, 30));
    assert_eq!(ClockTime::new(11, 59, Meridiem::Am).to_naive_time().unwrap(), hm(11, 59));
  }

  #[test]
  fn out_of_range_clock_time_is_rejected() {
    assert!(ClockTime::new(0, 0, Meridiem::Am).to_naive_time().is_err());
    assert!(ClockTime::new(13, 0, Meridiem::Pm).to_naive_time().is_err());
    assert!(ClockTime::new(9, 60, Meridiem::Am).to_naive_time().is_err());
  }

  #[test]
  fn medication_expands_day_by_slot() {
    let plan = medication(
      2,
      3,
      vec![ClockTime::new(8, 0, Meridiem::Am), ClockTime::new(8, 0, Meridiem::Pm)],
    );
    let times = plan.expand().unwrap();
    assert_eq!(times.len(), 6);

    let first = date(2026, 5, 10).and_time(hm(0, 0));
    let last = date(2026, 5, 12).and_time(hm(23, 59));
    assert!(times.iter().all(|t| *t >= first && *t <= last));

    assert_eq!(times[0], date(2026, 5, 10).and_time(hm(8, 0)));
    assert_eq!(times[1], date(2026, 5, 10).and_time(hm(20, 0)));
    assert_eq!(times[5], date(2026, 5, 12).and_time(hm(20, 0)));
  }

  #[test]
  fn slot_count_mismatch_is_rejected() {
    let plan = medication(3, 2, vec![ClockTime::new(9, 0, Meridiem::Am)]);
    assert!(matches!(
      plan.expand(),
      Err(Error::ReminderSlotMismatch { frequency: 3, supplied: 1 })
    ));
  }

  #[test]
  fn zero_frequency_is_rejected() {
    assert!(medication(0, 2, vec![]).expand().is_err());
  }

  #[test]
  fn oversized_plans_are_rejected_before_expanding() {
    let nine_am = ClockTime::new(9, 0, Meridiem::Am);
    assert!(matches!(
      medication(1, u32::MAX, vec![nine_am]).expand(),
      Err(Error::Validation(_))
    ));
    assert!(matches!(
      medication(1, MAX_DURATION_DAYS + 1, vec![nine_am]).expand(),
      Err(Error::Validation(_))
    ));
    assert!(matches!(
      medication(MAX_DOSES_PER_DAY + 1, 1, vec![nine_am; 25]).expand(),
      Err(Error::Validation(_))
    ));

    let longest = medication(1, MAX_DURATION_DAYS, vec![nine_am]).expand().unwrap();
    assert_eq!(longest.len(), MAX_DURATION_DAYS as usize);
  }

  #[test]
  fn follow_up_expands_to_one_and_other_to_none() {
    let follow_up = ReminderPlan::FollowUp {
      date:         date(2026, 6, 1),
      time:         ClockTime::new(10, 15, Meridiem::Am),
      doctor_name:  None,
      special_note: None,
    };
    assert_eq!(follow_up.expand().unwrap(), vec![date(2026, 6, 1).and_time(hm(10, 15))]);

    let other = ReminderPlan::Other { title: "Collect reports".into(), special_note: None };
    assert!(other.expand().unwrap().is_empty());
  }

  #[test]
  fn plan_deserialises_from_tagged_json() {
    let json = serde_json::json!({
      "reminder_type": "Follow-up",
      "date": "2026-06-01",
      "time": { "hour": 4, "minute": 0, "meridiem": "PM" }
    });
    let plan: ReminderPlan = serde_json::from_value(json).unwrap();
    assert_eq!(plan.reminder_type(), ReminderType::FollowUp);
    assert_eq!(plan.expand().unwrap()[0].time(), hm(16, 0));
  }
}
