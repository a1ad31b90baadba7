//! SQL schema for the clinic SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL,       -- 'admin' | 'health_worker' | 'user'
    department    TEXT,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL
);

-- Only the SHA-256 digest of a bearer token is stored.
CREATE TABLE IF NOT EXISTS sessions (
    token_digest TEXT PRIMARY KEY,
    session_id   TEXT NOT NULL UNIQUE,
    user_id      INTEGER NOT NULL REFERENCES users(user_id),
    ip_address   TEXT,
    created_at   TEXT NOT NULL
);

-- Patient versions are append-only apart from the is_active flag.
-- No DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS patients (
    record_id           INTEGER PRIMARY KEY AUTOINCREMENT,
    uhid                TEXT NOT NULL,
    version             INTEGER NOT NULL CHECK (version >= 1),
    is_active           INTEGER NOT NULL,
    name                TEXT NOT NULL,
    age                 INTEGER,
    gender              TEXT NOT NULL,
    phone_number        TEXT,
    email               TEXT,
    address             TEXT,
    temperature         REAL,
    bp_systolic         INTEGER,
    bp_diastolic        INTEGER,
    sugar               INTEGER,
    height              REAL,
    weight              REAL,
    other_vitals        TEXT NOT NULL DEFAULT '[]',   -- JSON list of {name, value}
    smoking_status      TEXT,
    alcohol_frequency   TEXT,
    physical_activity   TEXT,
    diet_type           TEXT,
    chronic_conditions  TEXT,
    current_medications TEXT,
    allergies           TEXT,
    bmi                 REAL NOT NULL,
    temp_status         TEXT NOT NULL,
    bp_status           TEXT NOT NULL,
    sugar_status        TEXT NOT NULL,
    bmi_status          TEXT NOT NULL,
    record_date         TEXT NOT NULL,   -- YYYY-MM-DD
    created_at          TEXT NOT NULL,   -- RFC 3339 UTC
    UNIQUE (uhid, version)
);

-- At most one active version per patient.
CREATE UNIQUE INDEX IF NOT EXISTS patients_active_idx
    ON patients(uhid) WHERE is_active = 1;

-- Prescriptions follow the patient, not a particular version.
CREATE TABLE IF NOT EXISTS prescriptions (
    prescription_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    uhid               TEXT NOT NULL,
    reminder_type      TEXT NOT NULL,   -- 'Medication' | 'Follow-up' | 'Other'
    doctor_name        TEXT,
    medication_name    TEXT,
    frequency          INTEGER,
    duration_days      INTEGER,
    start_date         TEXT,
    follow_up_datetime TEXT,
    special_note       TEXT,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reminders (
    reminder_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    prescription_id INTEGER NOT NULL REFERENCES prescriptions(prescription_id),
    reminder_time   TEXT NOT NULL,   -- clinic-local, YYYY-MM-DDTHH:MM:SS
    status          TEXT NOT NULL DEFAULT 'Scheduled'
);

CREATE TABLE IF NOT EXISTS audit_logs (
    log_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER REFERENCES users(user_id),
    username      TEXT NOT NULL,
    event_type    TEXT NOT NULL,
    event_details TEXT,              -- JSON
    timestamp     TEXT NOT NULL,     -- RFC 3339 UTC, fixed width
    session_id    TEXT,
    ip_address    TEXT,
    changed_from  TEXT,              -- JSON object, NULL for non-diff events
    changed_to    TEXT
);

CREATE INDEX IF NOT EXISTS patients_uhid_idx        ON patients(uhid);
CREATE INDEX IF NOT EXISTS prescriptions_uhid_idx   ON prescriptions(uhid);
CREATE INDEX IF NOT EXISTS reminders_due_idx        ON reminders(status, reminder_time);
CREATE INDEX IF NOT EXISTS audit_logs_timestamp_idx ON audit_logs(timestamp);

PRAGMA user_version = 1;
";
