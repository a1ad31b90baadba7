//! Aggregate statistics over patient records.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{patient::PatientRecord, vitals::VitalStatus};

/// Headline counts, computed by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
  /// Distinct UHIDs, active or not.
  pub total_patients:        u64,
  pub total_active_patients: u64,
  pub total_prescriptions:   u64,
  /// Active records with at least one abnormal vital.
  pub abnormal_vitals_count: u64,
}

/// A labelled data series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
  pub labels: Vec<String>,
  pub data:   Vec<u64>,
}

impl Series {
  fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, u64)>) -> Self {
    let (labels, data) = pairs
      .into_iter()
      .map(|(l, d)| (l.to_owned(), d))
      .unzip();
    Self { labels, data }
  }
}

/// Population overview of the active records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overview {
  pub total_patients:     u64,
  /// Rounded mean over records with a recorded age; 0 if none.
  pub avg_age:            u64,
  pub male_percentage:    i64,
  pub female_percentage:  i64,
  pub other_percentage:   i64,
  /// `Normal` vs `Abnormal` across all four statuses of every record.
  pub health_status:      Series,
  pub gender:             Series,
  /// Records per calendar month of `record_date`, chronological.
  pub monthly_trends:     Series,
  pub bmi_status:         Series,
  pub age_groups:         Series,
  /// Abnormal count per vital.
  pub abnormal_breakdown: Series,
}

fn percentage(part: u64, total: u64) -> i64 {
  (part as f64 / total as f64 * 100.0).round() as i64
}

fn age_group(age: u32) -> usize {
  match age {
    0..=18 => 0,
    19..=35 => 1,
    36..=55 => 2,
    56..=75 => 3,
    _ => 4,
  }
}

impl Overview {
  /// Compute the overview of `records`; callers pass active records only.
  pub fn from_records(records: &[PatientRecord]) -> Self {
    let total = records.len() as u64;
    if total == 0 {
      return Self::default();
    }

    let ages: Vec<u32> = records.iter().filter_map(|r| r.fields.age).collect();
    let avg_age = if ages.is_empty() {
      0
    } else {
      (ages.iter().map(|a| u64::from(*a)).sum::<u64>() as f64 / ages.len() as f64).round()
        as u64
    };

    let gender_is = |g: &str| {
      records
        .iter()
        .filter(|r| r.fields.gender.eq_ignore_ascii_case(g))
        .count() as u64
    };
    let male = gender_is("male");
    let female = gender_is("female");
    let male_percentage = percentage(male, total);
    let female_percentage = percentage(female, total);

    let normal: u64 = records
      .iter()
      .map(|r| r.assessment.statuses().iter().filter(|s| s.is_normal()).count() as u64)
      .sum();

    let mut months: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for r in records {
      let d = r.fields.record_date;
      if let Some(first) = NaiveDate::from_ymd_opt(d.year(), d.month(), 1) {
        *months.entry(first).or_default() += 1;
      }
    }
    let monthly_trends = Series {
      labels: months.keys().map(|m| m.format("%b %Y").to_string()).collect(),
      data:   months.values().copied().collect(),
    };

    let abnormal = |pick: fn(&PatientRecord) -> VitalStatus| {
      records.iter().filter(|r| pick(r) == VitalStatus::Abnormal).count() as u64
    };
    let abnormal_bmi = abnormal(|r| r.assessment.bmi_status);

    let mut groups = [0u64; 5];
    for age in &ages {
      groups[age_group(*age)] += 1;
    }

    Self {
      total_patients: total,
      avg_age,
      male_percentage,
      female_percentage,
      other_percentage: 100 - male_percentage - female_percentage,
      health_status: Series::from_pairs([
        ("Normal", normal),
        ("Abnormal", total * 4 - normal),
      ]),
      gender: Series::from_pairs([
        ("Male", male),
        ("Female", female),
        ("Other", total - male - female),
      ]),
      monthly_trends,
      bmi_status: Series::from_pairs([
        ("Normal BMI", total - abnormal_bmi),
        ("Abnormal BMI", abnormal_bmi),
      ]),
      age_groups: Series::from_pairs(
        ["0-18", "19-35", "36-55", "56-75", "76+"]
          .into_iter()
          .zip(groups),
      ),
      abnormal_breakdown: Series::from_pairs([
        ("Temperature", abnormal(|r| r.assessment.temp_status)),
        ("Blood Pressure", abnormal(|r| r.assessment.bp_status)),
        ("Blood Sugar", abnormal(|r| r.assessment.sugar_status)),
        ("BMI", abnormal_bmi),
      ]),
    }
  }
}
