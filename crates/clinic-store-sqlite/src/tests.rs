//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{NaiveDate, NaiveTime, Utc};
use clinic_core::{
  Classify, FailureKind,
  audit::{Actor, AuditQuery, EventType, NewAuditEntry},
  patient::{NewVersion, PatientFields},
  reminder::{ClockTime, Meridiem, NewPrescription, ReminderPlan, ReminderStatus, ReminderType},
  store::ClinicStore,
  user::{NewUser, Role},
  vitals::VitalStatus,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

fn actor() -> Actor {
  Actor {
    user_id:    None,
    username:   "nurse1".into(),
    session_id: Some("session-a".into()),
    ip_address: Some("10.0.0.7".into()),
  }
}

fn fields(name: &str) -> PatientFields {
  let mut f = PatientFields::new(name, "Female", date(2026, 3, 1));
  f.age = Some(34);
  f.temperature = Some(98.2);
  f.bp_systolic = Some(118);
  f.bp_diastolic = Some(76);
  f.sugar = Some(95);
  f.height = Some(170.0);
  f.weight = Some(70.0);
  f
}

fn version(f: PatientFields) -> NewVersion { NewVersion::new(f).unwrap() }

async fn create(s: &SqliteStore, name: &str) -> String {
  s.create_patient(actor(), version(fields(name)))
    .await
    .unwrap()
    .uhid
}

async fn events(s: &SqliteStore, event_type: EventType) -> Vec<clinic_core::audit::AuditLogEntry> {
  s.audit_log(AuditQuery { event_type: Some(event_type), ..Default::default() })
    .await
    .unwrap()
}

// ─── Patient records ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_stores_version_one() {
  let s = store().await;
  let record = s.create_patient(actor(), version(fields("Asha"))).await.unwrap();

  assert_eq!(record.version, 1);
  assert!(record.is_active);
  assert!(record.uhid.starts_with(&format!("HC{}-", chrono::Datelike::year(&Utc::now()))));
  assert_eq!(record.assessment.bmi, 24.22);

  let fetched = s.get_active(record.uhid.clone()).await.unwrap().unwrap();
  assert_eq!(fetched.record_id, record.record_id);
  assert_eq!(fetched.fields, record.fields);
  assert_eq!(fetched.assessment, record.assessment);

  let created = events(&s, EventType::PatientCreated).await;
  assert_eq!(created.len(), 1);
  assert!(created[0].diff.is_none());
}

#[tokio::test]
async fn uhids_are_sequential() {
  let s = store().await;
  let a = create(&s, "A").await;
  let b = create(&s, "B").await;
  assert!(a.ends_with("-00001"), "{a}");
  assert!(b.ends_with("-00002"), "{b}");
}

#[tokio::test]
async fn uhid_sequence_continues_past_five_digits() {
  let s = store().await;
  let a = create(&s, "A").await;
  let b = create(&s, "B").await;
  let prefix = a.trim_end_matches("00001").to_owned();
  s.execute_batch(format!(
    "UPDATE patients SET uhid = '{prefix}99999' WHERE uhid = '{a}';
     UPDATE patients SET uhid = '{prefix}100000' WHERE uhid = '{b}';"
  ))
  .await
  .unwrap();

  let c = create(&s, "C").await;
  assert_eq!(c, format!("{prefix}100001"));
}

#[tokio::test]
async fn history_is_contiguous_with_one_active() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;

  for age in 35..39 {
    let mut f = fields("Asha");
    f.age = Some(age);
    s.update_patient(actor(), uhid.clone(), version(f), None).await.unwrap();
  }

  let history = s.get_history(uhid.clone()).await.unwrap();
  let versions: Vec<u32> = history.iter().map(|r| r.version).collect();
  assert_eq!(versions, vec![5, 4, 3, 2, 1]);
  assert_eq!(history.iter().filter(|r| r.is_active).count(), 1);
  assert!(history[0].is_active);

  let active = s.get_active(uhid).await.unwrap().unwrap();
  assert_eq!(active.version, 5);
  assert_eq!(active.fields.age, Some(38));
}

#[tokio::test]
async fn update_records_changed_fields_only() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;

  let mut f = fields("Asha");
  f.sugar = Some(150);
  s.update_patient(actor(), uhid, version(f), None).await.unwrap();

  let updated = events(&s, EventType::PatientUpdated).await;
  let diff = updated[0].diff.clone().unwrap();
  assert_eq!(diff.changed_from.get("sugar").map(String::as_str), Some("95"));
  assert_eq!(diff.changed_to.get("sugar").map(String::as_str), Some("150"));
  assert_eq!(diff.changed_to.get("sugar_status").map(String::as_str), Some("Abnormal"));
  assert_eq!(diff.changed_to.len(), 2);
}

#[tokio::test]
async fn unchanged_edit_records_empty_diff() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;
  s.update_patient(actor(), uhid, version(fields("Asha")), None)
    .await
    .unwrap();

  let updated = events(&s, EventType::PatientUpdated).await;
  assert_eq!(updated.len(), 1);
  let diff = updated[0].diff.clone().unwrap();
  assert!(diff.is_empty());
}

#[tokio::test]
async fn update_unknown_patient_is_not_found() {
  let s = store().await;
  let err = s
    .update_patient(actor(), "HC1999-00001".into(), version(fields("X")), None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PatientNotFound(_)));
  assert_eq!(err.kind(), FailureKind::NotFound);
  assert!(events(&s, EventType::PatientUpdated).await.is_empty());
}

#[tokio::test]
async fn stale_expected_version_conflicts_and_writes_nothing() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;
  s.update_patient(actor(), uhid.clone(), version(fields("Asha")), Some(1))
    .await
    .unwrap();

  let err = s
    .update_patient(actor(), uhid.clone(), version(fields("Asha B")), Some(1))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::VersionConflict { expected: 1, active: 2, .. }));
  assert_eq!(err.kind(), FailureKind::Conflict);

  let active = s.get_active(uhid.clone()).await.unwrap().unwrap();
  assert_eq!(active.version, 2);
  assert_eq!(active.fields.name, "Asha");
  assert_eq!(s.get_history(uhid).await.unwrap().len(), 2);
  assert_eq!(events(&s, EventType::PatientUpdated).await.len(), 1);
}

#[tokio::test]
async fn failure_after_deactivation_rolls_back_the_update() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;
  s.execute_batch(
    "CREATE TRIGGER fail_update_audit BEFORE INSERT ON audit_logs
     WHEN NEW.event_type = 'PATIENT_UPDATED'
     BEGIN SELECT RAISE(ABORT, 'audit unavailable'); END;"
      .into(),
  )
  .await
  .unwrap();

  let err = s
    .update_patient(actor(), uhid.clone(), version(fields("Asha B")), None)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), FailureKind::Persistence);

  let history: Vec<_> = s
    .get_history(uhid.clone())
    .await
    .unwrap()
    .into_iter()
    .map(|r| (r.version, r.is_active))
    .collect();
  assert_eq!(history, vec![(1, true)]);
  let active = s.get_active(uhid).await.unwrap().unwrap();
  assert_eq!(active.fields.name, "Asha");
}

#[tokio::test]
async fn concurrent_updates_last_writer_wins() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;

  let (a, b) = tokio::join!(
    s.update_patient(actor(), uhid.clone(), version(fields("From A")), None),
    s.update_patient(actor(), uhid.clone(), version(fields("From B")), None),
  );
  let (a, b) = (a.unwrap(), b.unwrap());
  let last = if a.version > b.version { &a } else { &b };
  assert_eq!(last.version, 3);

  let history = s.get_history(uhid.clone()).await.unwrap();
  assert_eq!(history.len(), 3);
  assert_eq!(history.iter().filter(|r| r.is_active).count(), 1);

  let active = s.get_active(uhid).await.unwrap().unwrap();
  assert_eq!(active.version, 3);
  assert_eq!(active.fields.name, last.fields.name);
}

#[tokio::test]
async fn list_active_skips_old_versions() {
  let s = store().await;
  let a = create(&s, "A").await;
  create(&s, "B").await;
  s.update_patient(actor(), a, version(fields("A2")), None).await.unwrap();

  let active = s.list_active().await.unwrap();
  let names: Vec<&str> = active.iter().map(|r| r.fields.name.as_str()).collect();
  assert_eq!(names, vec!["A2", "B"]);
}

#[tokio::test]
async fn import_inserts_all_with_one_audit_entry() {
  let s = store().await;
  create(&s, "Existing").await;

  let records = s
    .import_patients(actor(), vec![version(fields("P")), version(fields("Q"))])
    .await
    .unwrap();
  assert_eq!(records.len(), 2);
  assert!(records[1].uhid.ends_with("-00003"));
  assert_eq!(s.list_active().await.unwrap().len(), 3);

  let uploads = events(&s, EventType::DataUploaded).await;
  assert_eq!(uploads.len(), 1);
  assert_eq!(uploads[0].details.as_ref().unwrap()["records_added"], 2);
}

// ─── Prescriptions and reminders ─────────────────────────────────────────────

fn medication(uhid: &str, frequency: u32, duration_days: u32, slots: usize) -> NewPrescription {
  let times = [ClockTime::new(8, 0, Meridiem::Am), ClockTime::new(8, 0, Meridiem::Pm)];
  NewPrescription {
    uhid: uhid.to_owned(),
    plan: ReminderPlan::Medication {
      doctor_name: "Dr. Menon".into(),
      medication_name: "Amoxicillin".into(),
      frequency,
      duration_days,
      start_date: date(2026, 5, 10),
      dose_times: times.iter().copied().cycle().take(slots).collect(),
      special_note: None,
    },
  }
}

fn at(d: NaiveDate, h: u32, m: u32) -> chrono::NaiveDateTime {
  d.and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
}

#[tokio::test]
async fn schedule_expands_reminders() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;

  let view = s.schedule(actor(), medication(&uhid, 2, 3, 2)).await.unwrap();
  assert_eq!(view.reminders.len(), 6);
  assert_eq!(view.patient_name.as_deref(), Some("Asha"));
  assert_eq!(view.prescription.frequency, Some(2));
  assert_eq!(view.prescription.start_date, Some(date(2026, 5, 10)));
  assert!(view.reminders.iter().all(|r| r.status == ReminderStatus::Scheduled));
  assert_eq!(view.reminders[0].reminder_time, at(date(2026, 5, 10), 8, 0));
  assert_eq!(view.reminders[5].reminder_time, at(date(2026, 5, 12), 20, 0));

  assert_eq!(events(&s, EventType::ReminderSet).await.len(), 1);
}

#[tokio::test]
async fn slot_mismatch_writes_nothing() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;

  let err = s.schedule(actor(), medication(&uhid, 3, 2, 2)).await.unwrap_err();
  assert_eq!(err.kind(), FailureKind::Validation);

  let now = at(date(2026, 1, 1), 0, 0);
  assert!(s.list_prescriptions(None, now).await.unwrap().is_empty());
  assert!(events(&s, EventType::ReminderSet).await.is_empty());
}

#[tokio::test]
async fn failure_midway_through_reminders_writes_nothing() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;
  // Let the first reminder in, then fail.
  s.execute_batch(
    "CREATE TRIGGER fail_second_reminder BEFORE INSERT ON reminders
     WHEN (SELECT count(*) FROM reminders) >= 1
     BEGIN SELECT RAISE(ABORT, 'disk full'); END;"
      .into(),
  )
  .await
  .unwrap();

  let err = s.schedule(actor(), medication(&uhid, 2, 3, 2)).await.unwrap_err();
  assert_eq!(err.kind(), FailureKind::Persistence);

  let now = at(date(2026, 1, 1), 0, 0);
  assert!(s.list_prescriptions(None, now).await.unwrap().is_empty());
  assert!(events(&s, EventType::ReminderSet).await.is_empty());
}

#[tokio::test]
async fn schedule_for_unknown_patient_is_not_found() {
  let s = store().await;
  let err = s
    .schedule(actor(), medication("HC1999-00009", 2, 1, 2))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), FailureKind::NotFound);
}

#[tokio::test]
async fn listing_sweeps_only_past_due_reminders() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;
  s.schedule(actor(), medication(&uhid, 2, 3, 2)).await.unwrap();

  // 11 May, noon: the first three doses have passed.
  let now = at(date(2026, 5, 11), 12, 0);
  let views = s.list_prescriptions(None, now).await.unwrap();
  let statuses: Vec<ReminderStatus> = views[0].reminders.iter().map(|r| r.status).collect();
  assert_eq!(
    statuses,
    vec![
      ReminderStatus::Sent,
      ReminderStatus::Sent,
      ReminderStatus::Sent,
      ReminderStatus::Scheduled,
      ReminderStatus::Scheduled,
      ReminderStatus::Scheduled,
    ]
  );

  // A reminder due exactly now is swept too.
  let views = s
    .list_prescriptions(None, at(date(2026, 5, 11), 20, 0))
    .await
    .unwrap();
  assert_eq!(views[0].reminders[3].status, ReminderStatus::Sent);
}

#[tokio::test]
async fn listing_filters_by_type_newest_first() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;
  s.schedule(actor(), medication(&uhid, 2, 1, 2)).await.unwrap();
  s.schedule(
    actor(),
    NewPrescription {
      uhid: uhid.clone(),
      plan: ReminderPlan::FollowUp {
        date:         date(2026, 6, 1),
        time:         ClockTime::new(10, 30, Meridiem::Am),
        doctor_name:  Some("Dr. Rao".into()),
        special_note: None,
      },
    },
  )
  .await
  .unwrap();
  s.schedule(
    actor(),
    NewPrescription {
      uhid,
      plan: ReminderPlan::Other { title: "Collect reports".into(), special_note: None },
    },
  )
  .await
  .unwrap();

  let now = at(date(2026, 1, 1), 0, 0);
  let all = s.list_prescriptions(None, now).await.unwrap();
  let types: Vec<ReminderType> = all.iter().map(|v| v.prescription.reminder_type).collect();
  assert_eq!(
    types,
    vec![ReminderType::Other, ReminderType::FollowUp, ReminderType::Medication]
  );
  assert!(all[0].reminders.is_empty());
  assert_eq!(all[0].prescription.medication_name.as_deref(), Some("Collect reports"));

  let follow_ups = s
    .list_prescriptions(Some(ReminderType::FollowUp), now)
    .await
    .unwrap();
  assert_eq!(follow_ups.len(), 1);
  assert_eq!(
    follow_ups[0].prescription.follow_up_datetime,
    Some(at(date(2026, 6, 1), 10, 30))
  );
  assert_eq!(follow_ups[0].reminders.len(), 1);
}

#[tokio::test]
async fn cancel_removes_prescription_and_reminders() {
  let s = store().await;
  let uhid = create(&s, "Asha").await;
  let view = s.schedule(actor(), medication(&uhid, 2, 3, 2)).await.unwrap();

  s.cancel_prescription(actor(), view.prescription.prescription_id)
    .await
    .unwrap();

  let now = at(date(2026, 1, 1), 0, 0);
  assert!(s.list_prescriptions(None, now).await.unwrap().is_empty());
  assert_eq!(s.dashboard_stats().await.unwrap().total_prescriptions, 0);

  let cancelled = events(&s, EventType::ReminderCancelled).await;
  assert_eq!(cancelled[0].details.as_ref().unwrap()["reminders_removed"], 6);

  let err = s
    .cancel_prescription(actor(), view.prescription.prescription_id)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PrescriptionNotFound(_)));
}

// ─── Audit log ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_filters_and_facets() {
  let s = store().await;
  s.record_event(NewAuditEntry::new(Actor::anonymous(None), EventType::LoginFailure))
    .await
    .unwrap();
  s.record_event(
    NewAuditEntry::new(actor(), EventType::ViewRecords).details(serde_json::json!({ "n": 1 })),
  )
  .await
  .unwrap();

  let all = s.audit_log(AuditQuery::default()).await.unwrap();
  assert_eq!(all.len(), 2);
  assert!(all[0].timestamp <= all[1].timestamp);

  let by_name = s
    .audit_log(AuditQuery { username: Some("NURSE".into()), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(by_name.len(), 1);
  assert_eq!(by_name[0].event_type, EventType::ViewRecords);
  assert_eq!(by_name[0].session_id.as_deref(), Some("session-a"));

  let today = Utc::now().date_naive();
  let in_range = s
    .audit_log(AuditQuery {
      start_date: Some(today),
      end_date: Some(today),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(in_range.len(), 2);

  let before = s
    .audit_log(AuditQuery { end_date: Some(date(2000, 1, 1)), ..Default::default() })
    .await
    .unwrap();
  assert!(before.is_empty());

  let facets = s.audit_facets().await.unwrap();
  assert_eq!(facets.usernames, vec!["Anonymous".to_owned(), "nurse1".to_owned()]);
  assert_eq!(facets.event_types, vec![EventType::LoginFailure, EventType::ViewRecords]);
}

// ─── Users and sessions ──────────────────────────────────────────────────────

fn new_user(username: &str) -> NewUser {
  NewUser {
    username:      username.to_owned(),
    password_hash: "$argon2id$stub".into(),
    role:          Role::HealthWorker,
    department:    Some("OPD".into()),
  }
}

#[tokio::test]
async fn duplicate_username_conflicts() {
  let s = store().await;
  s.add_user(actor(), new_user("asha")).await.unwrap();
  let err = s.add_user(actor(), new_user("asha")).await.unwrap_err();
  assert!(matches!(err, Error::UsernameTaken(_)));
  assert_eq!(err.kind(), FailureKind::Conflict);
  assert_eq!(s.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn credentials_and_sessions() {
  let s = store().await;
  let user = s.add_user(actor(), new_user("asha")).await.unwrap();

  let (found, hash) = s.find_credentials("asha".into()).await.unwrap().unwrap();
  assert_eq!(found.user_id, user.user_id);
  assert_eq!(hash, "$argon2id$stub");
  assert!(s.find_credentials("nobody".into()).await.unwrap().is_none());

  let session = s
    .open_session(user.user_id, "digest-1".into(), Some("10.0.0.9".into()))
    .await
    .unwrap();
  let resolved = s.resolve_session("digest-1".into()).await.unwrap().unwrap();
  assert_eq!(resolved.session_id, session.session_id);
  assert_eq!(resolved.user.role, Role::HealthWorker);

  s.close_session("digest-1".into()).await.unwrap();
  assert!(s.resolve_session("digest-1".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_a_user_detaches_audit_and_closes_sessions() {
  let s = store().await;
  let user = s.add_user(actor(), new_user("asha")).await.unwrap();
  s.open_session(user.user_id, "digest-2".into(), None).await.unwrap();

  let as_user = Actor {
    user_id:    Some(user.user_id),
    username:   user.username.clone(),
    session_id: None,
    ip_address: None,
  };
  s.record_event(NewAuditEntry::new(as_user, EventType::ViewRecords))
    .await
    .unwrap();

  s.delete_user(actor(), user.user_id).await.unwrap();

  assert!(s.list_users().await.unwrap().is_empty());
  assert!(s.resolve_session("digest-2".into()).await.unwrap().is_none());

  let views = events(&s, EventType::ViewRecords).await;
  assert_eq!(views[0].user_id, None);
  assert_eq!(views[0].username, "asha");

  let err = s.delete_user(actor(), user.user_id).await.unwrap_err();
  assert!(matches!(err, Error::UserNotFound(_)));
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn dashboard_counts() {
  let s = store().await;
  let a = create(&s, "Normal").await;
  let mut sick = fields("Febrile");
  sick.temperature = Some(102.5);
  s.create_patient(actor(), version(sick)).await.unwrap();
  s.update_patient(actor(), a.clone(), version(fields("Normal")), None)
    .await
    .unwrap();
  s.schedule(actor(), medication(&a, 2, 1, 2)).await.unwrap();

  let stats = s.dashboard_stats().await.unwrap();
  assert_eq!(stats.total_patients, 2);
  assert_eq!(stats.total_active_patients, 2);
  assert_eq!(stats.total_prescriptions, 1);
  assert_eq!(stats.abnormal_vitals_count, 1);

  let active = s.list_active().await.unwrap();
  assert!(active.iter().any(|r| r.assessment.temp_status == VitalStatus::Abnormal));
}
