//! Audit log entries and the field-level diff recorder.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

// ─── Event types ─────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
  LoginSuccess,
  LoginFailure,
  Logout,
  PatientCreated,
  PatientUpdated,
  ViewRecords,
  ViewHistory,
  ViewOverview,
  DataUploaded,
  DataUploadFailed,
  UserCreated,
  UserCreationFailed,
  UserDeleted,
  UnauthorizedAccess,
  LogExport,
  ReminderSet,
  ReminderCancelled,
  AiAnalysis,
  AiAnalysisFailed,
}

// ─── Actor ───────────────────────────────────────────────────────────────────

/// Who performed an action, as known to the request that performed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub user_id:    Option<i64>,
  pub username:   String,
  pub session_id: Option<String>,
  pub ip_address: Option<String>,
}

impl Actor {
  /// An unauthenticated caller, e.g. a failed login attempt.
  pub fn anonymous(ip_address: Option<String>) -> Self {
    Self {
      user_id: None,
      username: "Anonymous".to_owned(),
      session_id: None,
      ip_address,
    }
  }

  /// The server itself, e.g. when seeding the first admin account.
  pub fn system() -> Self {
    Self {
      user_id: None,
      username: "system".to_owned(),
      session_id: None,
      ip_address: None,
    }
  }
}

// ─── Diff ────────────────────────────────────────────────────────────────────

/// Before/after values of the fields that changed between two versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
  pub changed_from: BTreeMap<String, String>,
  pub changed_to:   BTreeMap<String, String>,
}

impl FieldDiff {
  pub fn is_empty(&self) -> bool {
    self.changed_from.is_empty() && self.changed_to.is_empty()
  }
}

/// Compare two field maps and keep the keys present in both whose values
/// differ.
pub fn diff_fields(
  before: &BTreeMap<String, String>,
  after: &BTreeMap<String, String>,
) -> FieldDiff {
  let mut diff = FieldDiff::default();
  for (key, old) in before {
    if let Some(new) = after.get(key)
      && new != old
    {
      diff.changed_from.insert(key.clone(), old.clone());
      diff.changed_to.insert(key.clone(), new.clone());
    }
  }
  diff
}

// ─── Entries ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::ClinicStore::record_event`].
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
  pub actor:      Actor,
  pub event_type: EventType,
  pub details:    Option<serde_json::Value>,
  pub diff:       Option<FieldDiff>,
}

impl NewAuditEntry {
  pub fn new(actor: Actor, event_type: EventType) -> Self {
    Self { actor, event_type, details: None, diff: None }
  }

  pub fn details(mut self, details: impl Into<serde_json::Value>) -> Self {
    self.details = Some(details.into());
    self
  }

  pub fn diff(mut self, diff: FieldDiff) -> Self {
    self.diff = Some(diff);
    self
  }
}

/// An immutable record of one user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
  pub log_id:     i64,
  /// `None` for anonymous actions and for users deleted since.
  pub user_id:    Option<i64>,
  pub username:   String,
  pub event_type: EventType,
  pub details:    Option<serde_json::Value>,
  pub timestamp:  DateTime<Utc>,
  pub session_id: Option<String>,
  pub ip_address: Option<String>,
  pub diff:       Option<FieldDiff>,
}

/// Filters for browsing the audit log. Dates are inclusive and interpreted
/// as UTC calendar days.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
  /// Case-insensitive substring match on the username.
  pub username:   Option<String>,
  pub event_type: Option<EventType>,
  pub start_date: Option<NaiveDate>,
  pub end_date:   Option<NaiveDate>,
}

/// Distinct values present in the log, offered as filter choices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFacets {
  pub usernames:   Vec<String>,
  pub event_types: Vec<EventType>,
}

// ─── Sessions ────────────────────────────────────────────────────────────────

/// Audit entries sharing one `session_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSession {
  pub session_id: Option<String>,
  pub username:   String,
  pub ip_address: Option<String>,
  pub start_time: DateTime<Utc>,
  pub actions:    Vec<AuditLogEntry>,
}

/// Group entries by session, keeping each session's actions in the order
/// given (callers pass entries oldest first), and sort sessions by start time,
/// newest first.
pub fn group_sessions(entries: Vec<AuditLogEntry>) -> Vec<AuditSession> {
  let mut index: HashMap<Option<String>, usize> = HashMap::new();
  let mut sessions: Vec<AuditSession> = Vec::new();

  for entry in entries {
    let slot = *index.entry(entry.session_id.clone()).or_insert_with(|| {
      sessions.push(AuditSession {
        session_id: entry.session_id.clone(),
        username:   entry.username.clone(),
        ip_address: entry.ip_address.clone(),
        start_time: entry.timestamp,
        actions:    Vec::new(),
      });
      sessions.len() - 1
    });
    sessions[slot].actions.push(entry);
  }

  sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
  sessions
}

// ─── Pagination ──────────────────────────────────────────────────────────────

/// One page of an in-memory sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
  pub items:    Vec<T>,
  /// 1-based.
  pub page:     usize,
  pub per_page: usize,
  pub total:    usize,
  pub pages:    usize,
}

impl<T> Page<T> {
  /// Slice `all` to page `page` (clamped to at least 1).
  pub fn paginate(all: Vec<T>, page: usize, per_page: usize) -> Self {
    let page = page.max(1);
    let per_page = per_page.max(1);
    let total = all.len();
    let pages = total.div_ceil(per_page);
    let items = all
      .into_iter()
      .skip((page - 1) * per_page)
      .take(per_page)
      .collect();
    Self { items, page, per_page, total, pages }
  }

  pub fn has_prev(&self) -> bool { self.page > 1 }

  pub fn has_next(&self) -> bool { self.page < self.pages }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn identical_maps_have_empty_diff() {
    let m = map(&[("name", "Asha"), ("age", "30")]);
    assert!(diff_fields(&m, &m.clone()).is_empty());
  }

  #[test]
  fn diff_keeps_only_changed_keys() {
    let before = map(&[("name", "Asha"), ("age", "30"), ("sugar", "")]);
    let after = map(&[("name", "Asha"), ("age", "31"), ("sugar", "120")]);
    let d = diff_fields(&before, &after);
    assert_eq!(d.changed_from, map(&[("age", "30"), ("sugar", "")]));
    assert_eq!(d.changed_to, map(&[("age", "31"), ("sugar", "120")]));
  }

  #[test]
  fn keys_missing_on_one_side_are_ignored() {
    let before = map(&[("name", "Asha"), ("legacy", "x")]);
    let after = map(&[("name", "Asha"), ("fresh", "y")]);
    assert!(diff_fields(&before, &after).is_empty());
  }

  #[test]
  fn event_type_strings() {
    assert_eq!(EventType::PatientUpdated.to_string(), "PATIENT_UPDATED");
    assert_eq!("AI_ANALYSIS_FAILED".parse::<EventType>().unwrap(), EventType::AiAnalysisFailed);
  }

  fn entry(id: i64, session: Option<&str>, secs: i64) -> AuditLogEntry {
    AuditLogEntry {
      log_id:     id,
      user_id:    Some(1),
      username:   "nurse1".into(),
      event_type: EventType::ViewRecords,
      details:    None,
      timestamp:  Utc.timestamp_opt(secs, 0).unwrap(),
      session_id: session.map(str::to_owned),
      ip_address: None,
      diff:       None,
    }
  }

  #[test]
  fn sessions_group_and_sort_newest_first() {
    let sessions = group_sessions(vec![
      entry(1, Some("a"), 100),
      entry(2, Some("b"), 200),
      entry(3, Some("a"), 300),
      entry(4, None, 400),
    ]);
    assert_eq!(sessions.len(), 3);
    assert_eq!(sessions[0].session_id, None);
    assert_eq!(sessions[1].session_id.as_deref(), Some("b"));
    assert_eq!(sessions[2].actions.len(), 2);
    assert_eq!(sessions[2].actions[1].log_id, 3);
  }

  #[test]
  fn pagination_bounds() {
    let page = Page::paginate((1..=23).collect::<Vec<_>>(), 3, 10);
    assert_eq!(page.items, vec![21, 22, 23]);
    assert_eq!(page.pages, 3);
    assert!(page.has_prev());
    assert!(!page.has_next());

    let empty = Page::paginate(Vec::<u8>::new(), 0, 10);
    assert_eq!(empty.page, 1);
    assert_eq!(empty.pages, 0);
    assert!(!empty.has_next());
  }
}
