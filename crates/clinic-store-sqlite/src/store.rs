//! [`SqliteStore`]: the SQLite implementation of [`ClinicStore`].

use std::path::Path;

use chrono::{DateTime, Datelike, Days, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use serde_json::json;
use uuid::Uuid;

use clinic_core::{
  audit::{
    diff_fields, Actor, AuditFacets, AuditLogEntry, AuditQuery, EventType,
    NewAuditEntry,
  },
  patient::{next_uhid, uhid_prefix, NewVersion, PatientRecord},
  reminder::{
    NewPrescription, Prescription, PrescriptionView, ReminderPlan, ReminderStatus,
    ReminderType,
  },
  stats::DashboardStats,
  store::ClinicStore,
  user::{validate_username, NewUser, Session, User},
};

use crate::{
  encode::{
    decode_dt, decode_enum, encode_date, encode_dt, encode_local, RawAuditEntry,
    RawPatient, RawPrescription, RawReminder, RawUser, AUDIT_COLUMNS,
    PATIENT_COLUMNS, PRESCRIPTION_COLUMNS, USER_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A clinic store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted. All calls
/// run on the connection's own thread, one at a time.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` inside an `IMMEDIATE` transaction. The transaction commits only
  /// if `f` returns `Ok`; any error rolls everything back.
  async fn transact<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match f(&tx) {
          Ok(value) => {
            tx.commit()?;
            Ok(Ok(value))
          }
          Err(e) => Ok(Err(e)),
        }
      })
      .await?
  }

  /// Run a read-only `f` against the connection.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }
}

#[cfg(test)]
impl SqliteStore {
  /// Run raw SQL against the store, e.g. to install failure triggers.
  pub(crate) async fn execute_batch(&self, sql: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────
//
// These take a plain `&Connection` so they work both inside a transaction
// (which derefs to its connection) and on their own.

fn insert_audit(
  conn: &Connection,
  entry: NewAuditEntry,
  at: DateTime<Utc>,
) -> Result<AuditLogEntry> {
  let details = entry.details.as_ref().map(serde_json::to_string).transpose()?;
  let (from, to) = match &entry.diff {
    Some(d) => (
      Some(serde_json::to_string(&d.changed_from)?),
      Some(serde_json::to_string(&d.changed_to)?),
    ),
    None => (None, None),
  };

  conn.execute(
    "INSERT INTO audit_logs (
       user_id, username, event_type, event_details, timestamp,
       session_id, ip_address, changed_from, changed_to
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    rusqlite::params![
      entry.actor.user_id,
      entry.actor.username,
      entry.event_type.as_ref(),
      details,
      encode_dt(at),
      entry.actor.session_id,
      entry.actor.ip_address,
      from,
      to,
    ],
  )?;

  Ok(AuditLogEntry {
    log_id:     conn.last_insert_rowid(),
    user_id:    entry.actor.user_id,
    username:   entry.actor.username,
    event_type: entry.event_type,
    details:    entry.details,
    timestamp:  at,
    session_id: entry.actor.session_id,
    ip_address: entry.actor.ip_address,
    diff:       entry.diff,
  })
}

fn query_patients(
  conn: &Connection,
  filter: &str,
  params: impl rusqlite::Params,
) -> Result<Vec<PatientRecord>> {
  let mut stmt =
    conn.prepare(&format!("SELECT {PATIENT_COLUMNS} FROM patients {filter}"))?;
  let raws = stmt
    .query_map(params, RawPatient::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawPatient::into_record).collect()
}

fn active_record(conn: &Connection, uhid: &str) -> Result<Option<PatientRecord>> {
  Ok(
    query_patients(conn, "WHERE uhid = ?1 AND is_active = 1", [uhid])?
      .into_iter()
      .next(),
  )
}

/// The next UHID for the year of `at`, given every UHID issued so far
/// (including those inserted earlier in the current transaction).
fn allocate_uhid(conn: &Connection, at: DateTime<Utc>) -> Result<String> {
  let year = at.year();
  let prefix = uhid_prefix(year);
  let pattern = format!("{prefix}%");
  // Compare sequences numerically: `-100000` sorts below `-99999` as text.
  let seq_start = prefix.len() as i64 + 1;
  let last: Option<String> = conn
    .query_row(
      "SELECT uhid FROM patients WHERE uhid LIKE ?1
       ORDER BY CAST(substr(uhid, ?2) AS INTEGER) DESC LIMIT 1",
      rusqlite::params![pattern, seq_start],
      |r| r.get(0),
    )
    .optional()?;
  Ok(next_uhid(year, last.as_deref()))
}

/// Insert `input` as an active version of `uhid`.
fn insert_version(
  conn: &Connection,
  uhid: &str,
  version: u32,
  input: NewVersion,
  at: DateTime<Utc>,
) -> Result<PatientRecord> {
  let NewVersion { fields: f, assessment: a } = input;
  let other_vitals = serde_json::to_string(&f.other_vitals)?;

  conn.execute(
    &format!(
      "INSERT INTO patients ({}) VALUES (
         ?1, ?2, 1, ?3, ?4, ?5, ?6, ?7, ?8,
         ?9, ?10, ?11, ?12, ?13, ?14, ?15,
         ?16, ?17, ?18, ?19, ?20, ?21, ?22,
         ?23, ?24, ?25, ?26, ?27, ?28, ?29
       )",
      // Every column but the generated record_id.
      PATIENT_COLUMNS.trim_start_matches("record_id, ")
    ),
    rusqlite::params![
      uhid,
      version,
      f.name,
      f.age,
      f.gender,
      f.phone_number,
      f.email,
      f.address,
      f.temperature,
      f.bp_systolic,
      f.bp_diastolic,
      f.sugar,
      f.height,
      f.weight,
      other_vitals,
      f.smoking_status,
      f.alcohol_frequency,
      f.physical_activity,
      f.diet_type,
      f.chronic_conditions,
      f.current_medications,
      f.allergies,
      a.bmi,
      a.temp_status.as_ref(),
      a.bp_status.as_ref(),
      a.sugar_status.as_ref(),
      a.bmi_status.as_ref(),
      encode_date(f.record_date),
      encode_dt(at),
    ],
  )?;

  Ok(PatientRecord {
    record_id: conn.last_insert_rowid(),
    uhid: uhid.to_owned(),
    version,
    is_active: true,
    fields: f,
    assessment: a,
    created_at: at,
  })
}

fn load_prescription(conn: &Connection, id: i64) -> Result<Option<Prescription>> {
  conn
    .query_row(
      &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE prescription_id = ?1"),
      [id],
      RawPrescription::from_row,
    )
    .optional()?
    .map(RawPrescription::into_prescription)
    .transpose()
}

/// Attach the patient's current name and the reminders, in time order.
fn load_view(conn: &Connection, prescription: Prescription) -> Result<PrescriptionView> {
  let patient_name: Option<String> = conn
    .query_row(
      "SELECT name FROM patients WHERE uhid = ?1 AND is_active = 1",
      [&prescription.uhid],
      |r| r.get(0),
    )
    .optional()?;

  let mut stmt = conn.prepare(
    "SELECT reminder_id, prescription_id, reminder_time, status
       FROM reminders WHERE prescription_id = ?1
      ORDER BY reminder_time, reminder_id",
  )?;
  let reminders = stmt
    .query_map([prescription.prescription_id], RawReminder::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawReminder::into_reminder)
    .collect::<Result<Vec<_>>>()?;

  Ok(PrescriptionView { prescription, patient_name, reminders })
}

fn load_user(conn: &Connection, user_id: i64) -> Result<Option<User>> {
  conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
      [user_id],
      |row| RawUser::from_row_at(row, 0),
    )
    .optional()?
    .map(RawUser::into_user)
    .transpose()
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
  let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
  Ok(n.max(0) as u64)
}

// ─── ClinicStore impl ────────────────────────────────────────────────────────

impl ClinicStore for SqliteStore {
  type Error = Error;

  // ── Patient records ───────────────────────────────────────────────────────

  async fn create_patient(&self, actor: Actor, input: NewVersion) -> Result<PatientRecord> {
    let now = Utc::now();

    let record = self
      .transact(move |conn| {
        let uhid = allocate_uhid(conn, now)?;
        let record = insert_version(conn, &uhid, 1, input, now)?;
        insert_audit(
          conn,
          NewAuditEntry::new(actor, EventType::PatientCreated)
            .details(json!({ "uhid": record.uhid, "name": record.fields.name })),
          now,
        )?;
        Ok(record)
      })
      .await?;

    tracing::info!(uhid = %record.uhid, "patient created");
    Ok(record)
  }

  async fn update_patient(
    &self,
    actor: Actor,
    uhid: String,
    input: NewVersion,
    expected_version: Option<u32>,
  ) -> Result<PatientRecord> {
    let now = Utc::now();

    let record = self
      .transact(move |conn| {
        let previous = active_record(conn, &uhid)?
          .ok_or_else(|| Error::PatientNotFound(uhid.clone()))?;

        if let Some(expected) = expected_version
          && expected != previous.version
        {
          return Err(Error::VersionConflict {
            uhid,
            expected,
            active: previous.version,
          });
        }

        conn.execute(
          "UPDATE patients SET is_active = 0 WHERE record_id = ?1",
          [previous.record_id],
        )?;
        let record = insert_version(conn, &uhid, previous.version + 1, input, now)?;

        let diff = diff_fields(&previous.audit_snapshot(), &record.audit_snapshot());
        insert_audit(
          conn,
          NewAuditEntry::new(actor, EventType::PatientUpdated)
            .details(json!({ "uhid": uhid, "version": record.version }))
            .diff(diff),
          now,
        )?;
        Ok(record)
      })
      .await?;

    tracing::info!(uhid = %record.uhid, version = record.version, "patient updated");
    Ok(record)
  }

  async fn get_active(&self, uhid: String) -> Result<Option<PatientRecord>> {
    self.read(move |conn| active_record(conn, &uhid)).await
  }

  async fn get_history(&self, uhid: String) -> Result<Vec<PatientRecord>> {
    self
      .read(move |conn| {
        query_patients(conn, "WHERE uhid = ?1 ORDER BY version DESC", [uhid])
      })
      .await
  }

  async fn list_active(&self) -> Result<Vec<PatientRecord>> {
    self
      .read(|conn| query_patients(conn, "WHERE is_active = 1 ORDER BY uhid", []))
      .await
  }

  async fn import_patients(
    &self,
    actor: Actor,
    inputs: Vec<NewVersion>,
  ) -> Result<Vec<PatientRecord>> {
    let now = Utc::now();

    let records = self
      .transact(move |conn| {
        let mut records = Vec::with_capacity(inputs.len());
        for input in inputs {
          let uhid = allocate_uhid(conn, now)?;
          records.push(insert_version(conn, &uhid, 1, input, now)?);
        }
        insert_audit(
          conn,
          NewAuditEntry::new(actor, EventType::DataUploaded)
            .details(json!({ "records_added": records.len() })),
          now,
        )?;
        Ok(records)
      })
      .await?;

    tracing::info!(count = records.len(), "patients imported");
    Ok(records)
  }

  // ── Prescriptions and reminders ───────────────────────────────────────────

  async fn schedule(&self, actor: Actor, input: NewPrescription) -> Result<PrescriptionView> {
    // Expansion validates the whole plan before anything is written.
    let times = input.plan.expand()?;
    let now = Utc::now();

    let view = self
      .transact(move |conn| {
        let NewPrescription { uhid, plan } = input;
        if active_record(conn, &uhid)?.is_none() {
          return Err(Error::PatientNotFound(uhid));
        }

        let reminder_type = plan.reminder_type();
        let title = plan.title().to_owned();
        let (doctor_name, frequency, duration_days, start_date, follow_up, note) =
          match plan {
            ReminderPlan::Medication {
              doctor_name,
              frequency,
              duration_days,
              start_date,
              special_note,
              ..
            } => (
              Some(doctor_name),
              Some(frequency),
              Some(duration_days),
              Some(encode_date(start_date)),
              None,
              special_note,
            ),
            ReminderPlan::FollowUp { doctor_name, special_note, .. } => (
              doctor_name,
              None,
              None,
              None,
              times.first().copied().map(encode_local),
              special_note,
            ),
            ReminderPlan::Other { special_note, .. } => {
              (None, None, None, None, None, special_note)
            }
          };

        conn.execute(
          "INSERT INTO prescriptions (
             uhid, reminder_type, doctor_name, medication_name, frequency,
             duration_days, start_date, follow_up_datetime, special_note, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            uhid,
            reminder_type.as_ref(),
            doctor_name,
            title,
            frequency,
            duration_days,
            start_date,
            follow_up,
            note,
            encode_dt(now),
          ],
        )?;
        let prescription_id = conn.last_insert_rowid();

        {
          let mut stmt = conn.prepare(
            "INSERT INTO reminders (prescription_id, reminder_time, status)
             VALUES (?1, ?2, ?3)",
          )?;
          for t in &times {
            stmt.execute(rusqlite::params![
              prescription_id,
              encode_local(*t),
              ReminderStatus::Scheduled.as_ref(),
            ])?;
          }
        }

        insert_audit(
          conn,
          NewAuditEntry::new(actor, EventType::ReminderSet).details(json!({
            "uhid": uhid,
            "reminder_type": reminder_type,
            "title": title,
            "reminders": times.len(),
          })),
          now,
        )?;

        let prescription = load_prescription(conn, prescription_id)?
          .ok_or(Error::PrescriptionNotFound(prescription_id))?;
        load_view(conn, prescription)
      })
      .await?;

    tracing::info!(
      prescription_id = view.prescription.prescription_id,
      reminders = view.reminders.len(),
      "reminders scheduled"
    );
    Ok(view)
  }

  async fn list_prescriptions(
    &self,
    reminder_type: Option<ReminderType>,
    now: NaiveDateTime,
  ) -> Result<Vec<PrescriptionView>> {
    let now_str = encode_local(now);
    let type_str = reminder_type.map(|t| t.as_ref().to_owned());

    self
      .transact(move |conn| {
        let swept = conn.execute(
          "UPDATE reminders SET status = ?1
            WHERE status = ?2 AND reminder_time <= ?3",
          rusqlite::params![
            ReminderStatus::Sent.as_ref(),
            ReminderStatus::Scheduled.as_ref(),
            now_str,
          ],
        )?;
        if swept > 0 {
          tracing::debug!(swept, "reminders marked sent");
        }

        let mut stmt = conn.prepare(&format!(
          "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions
            WHERE ?1 IS NULL OR reminder_type = ?1
            ORDER BY created_at DESC, prescription_id DESC"
        ))?;
        let raws = stmt
          .query_map([type_str], RawPrescription::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        raws
          .into_iter()
          .map(|raw| load_view(conn, raw.into_prescription()?))
          .collect()
      })
      .await
  }

  async fn cancel_prescription(&self, actor: Actor, prescription_id: i64) -> Result<()> {
    let now = Utc::now();

    self
      .transact(move |conn| {
        let prescription = load_prescription(conn, prescription_id)?
          .ok_or(Error::PrescriptionNotFound(prescription_id))?;

        let removed = conn.execute(
          "DELETE FROM reminders WHERE prescription_id = ?1",
          [prescription_id],
        )?;
        conn.execute(
          "DELETE FROM prescriptions WHERE prescription_id = ?1",
          [prescription_id],
        )?;

        insert_audit(
          conn,
          NewAuditEntry::new(actor, EventType::ReminderCancelled).details(json!({
            "prescription_id": prescription_id,
            "uhid": prescription.uhid,
            "reminder_type": prescription.reminder_type,
            "reminders_removed": removed,
          })),
          now,
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(prescription_id, "prescription cancelled");
    Ok(())
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn record_event(&self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
    let now = Utc::now();
    self.transact(move |conn| insert_audit(conn, entry, now)).await
  }

  async fn audit_log(&self, query: AuditQuery) -> Result<Vec<AuditLogEntry>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if let Some(name) = query.username.filter(|n| !n.trim().is_empty()) {
      params.push(name.trim().to_lowercase());
      clauses.push("instr(lower(username), ?) > 0");
    }
    if let Some(event_type) = query.event_type {
      params.push(event_type.as_ref().to_owned());
      clauses.push("event_type = ?");
    }
    if let Some(start) = query.start_date {
      params.push(encode_dt(start.and_time(NaiveTime::MIN).and_utc()));
      clauses.push("timestamp >= ?");
    }
    if let Some(end) = query.end_date
      && let Some(next_day) = end.checked_add_days(Days::new(1))
    {
      params.push(encode_dt(next_day.and_time(NaiveTime::MIN).and_utc()));
      clauses.push("timestamp < ?");
    }

    let filter = if clauses.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", clauses.join(" AND "))
    };

    self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {AUDIT_COLUMNS} FROM audit_logs {filter} ORDER BY timestamp, log_id"
        ))?;
        let raws = stmt
          .query_map(rusqlite::params_from_iter(params), RawAuditEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawAuditEntry::into_entry).collect()
      })
      .await
  }

  async fn audit_facets(&self) -> Result<AuditFacets> {
    self
      .read(|conn| {
        let usernames = conn
          .prepare("SELECT DISTINCT username FROM audit_logs ORDER BY username")?
          .query_map([], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let event_types = conn
          .prepare("SELECT DISTINCT event_type FROM audit_logs ORDER BY event_type")?
          .query_map([], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?
          .iter()
          .map(|s| decode_enum(s, "event type"))
          .collect::<Result<Vec<EventType>>>()?;
        Ok(AuditFacets { usernames, event_types })
      })
      .await
  }

  // ── Users and sessions ────────────────────────────────────────────────────

  async fn add_user(&self, actor: Actor, input: NewUser) -> Result<User> {
    validate_username(&input.username)?;
    let now = Utc::now();

    let user = self
      .transact(move |conn| {
        let username = input.username.trim().to_owned();
        let taken = conn
          .query_row(
            "SELECT 1 FROM users WHERE username = ?1",
            [&username],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Err(Error::UsernameTaken(username));
        }

        conn.execute(
          "INSERT INTO users (username, password_hash, role, department, is_active, created_at)
           VALUES (?1, ?2, ?3, ?4, 1, ?5)",
          rusqlite::params![
            username,
            input.password_hash,
            input.role.as_ref(),
            input.department,
            encode_dt(now),
          ],
        )?;

        let user = User {
          user_id: conn.last_insert_rowid(),
          username,
          role: input.role,
          department: input.department,
          is_active: true,
          created_at: now,
        };
        insert_audit(
          conn,
          NewAuditEntry::new(actor, EventType::UserCreated)
            .details(json!({ "username": user.username, "role": user.role })),
          now,
        )?;
        Ok(user)
      })
      .await?;

    tracing::info!(username = %user.username, role = %user.role, "user created");
    Ok(user)
  }

  async fn find_credentials(&self, username: String) -> Result<Option<(User, String)>> {
    self
      .read(move |conn| {
        conn
          .query_row(
            &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = ?1"),
            [username.trim()],
            |row| Ok((RawUser::from_row_at(row, 0)?, row.get::<_, String>(6)?)),
          )
          .optional()?
          .map(|(raw, hash)| -> Result<_> { Ok((raw.into_user()?, hash)) })
          .transpose()
      })
      .await
  }

  async fn list_users(&self) -> Result<Vec<User>> {
    self
      .read(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))?;
        let raws = stmt
          .query_map([], |row| RawUser::from_row_at(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawUser::into_user).collect()
      })
      .await
  }

  async fn delete_user(&self, actor: Actor, user_id: i64) -> Result<()> {
    let now = Utc::now();

    let username = self
      .transact(move |conn| {
        let user = load_user(conn, user_id)?.ok_or(Error::UserNotFound(user_id))?;

        conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?;
        conn.execute(
          "UPDATE audit_logs SET user_id = NULL WHERE user_id = ?1",
          [user_id],
        )?;
        conn.execute("DELETE FROM users WHERE user_id = ?1", [user_id])?;

        insert_audit(
          conn,
          NewAuditEntry::new(actor, EventType::UserDeleted)
            .details(json!({ "user_id": user_id, "username": user.username })),
          now,
        )?;
        Ok(user.username)
      })
      .await?;

    tracing::info!(user_id, %username, "user deleted");
    Ok(())
  }

  async fn open_session(
    &self,
    user_id: i64,
    token_digest: String,
    ip_address: Option<String>,
  ) -> Result<Session> {
    let now = Utc::now();
    let session_id = Uuid::new_v4().to_string();

    self
      .transact(move |conn| {
        let user = load_user(conn, user_id)?.ok_or(Error::UserNotFound(user_id))?;
        conn.execute(
          "INSERT INTO sessions (token_digest, session_id, user_id, ip_address, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![token_digest, session_id, user_id, ip_address, encode_dt(now)],
        )?;
        Ok(Session { session_id, user, ip_address, created_at: now })
      })
      .await
  }

  async fn resolve_session(&self, token_digest: String) -> Result<Option<Session>> {
    self
      .read(move |conn| {
        let row = conn
          .query_row(
            "SELECT u.user_id, u.username, u.role, u.department, u.is_active, u.created_at,
                    s.session_id, s.ip_address, s.created_at
               FROM sessions s JOIN users u ON u.user_id = s.user_id
              WHERE s.token_digest = ?1 AND u.is_active = 1",
            [token_digest],
            |row| {
              Ok((
                RawUser::from_row_at(row, 0)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, String>(8)?,
              ))
            },
          )
          .optional()?;

        row
          .map(|(user, session_id, ip_address, created_at)| -> Result<_> {
            Ok(Session {
              session_id,
              user: user.into_user()?,
              ip_address,
              created_at: decode_dt(&created_at)?,
            })
          })
          .transpose()
      })
      .await
  }

  async fn close_session(&self, token_digest: String) -> Result<()> {
    self
      .transact(move |conn| {
        conn.execute("DELETE FROM sessions WHERE token_digest = ?1", [token_digest])?;
        Ok(())
      })
      .await
  }

  // ── Statistics ────────────────────────────────────────────────────────────

  async fn dashboard_stats(&self) -> Result<DashboardStats> {
    self
      .read(|conn| {
        Ok(DashboardStats {
          total_patients:        count(conn, "SELECT COUNT(DISTINCT uhid) FROM patients")?,
          total_active_patients: count(
            conn,
            "SELECT COUNT(*) FROM patients WHERE is_active = 1",
          )?,
          total_prescriptions:   count(conn, "SELECT COUNT(*) FROM prescriptions")?,
          abnormal_vitals_count: count(
            conn,
            "SELECT COUNT(*) FROM patients
              WHERE is_active = 1
                AND 'Abnormal' IN (temp_status, bp_status, sugar_status, bmi_status)",
          )?,
        })
      })
      .await
  }
}
