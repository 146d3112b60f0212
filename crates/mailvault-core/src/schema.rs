//! Store schema bootstrap.
//!
//! Creates the per-account tables, the FTS5 shadow indexes with their sync
//! triggers, and the supporting indexes. Guarded by `PRAGMA user_version` so
//! repeated opens are cheap no-ops once the schema is current.

use sqlx::SqlitePool;
use tracing::debug;

use crate::Result;

/// Current schema version, persisted via `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// Statements creating the base tables, shadow indexes, and triggers.
///
/// The FTS tables are external-content tables keyed to the base table's rowid;
/// the triggers keep them in sync inside the same transaction as the mutating
/// statement, so base row and index entry can never diverge in-process.
const SCHEMA_STATEMENTS: &[&str] = &[
    // Emails
    r"
    CREATE TABLE IF NOT EXISTS emails (
        id TEXT PRIMARY KEY,
        thread_id TEXT,
        folder_id TEXT,
        subject TEXT,
        snippet TEXT,
        from_name TEXT,
        from_email TEXT,
        to_json TEXT,
        cc_json TEXT,
        bcc_json TEXT,
        date INTEGER,
        unread INTEGER DEFAULT 1,
        starred INTEGER DEFAULT 0,
        has_attachments INTEGER DEFAULT 0,
        body_html TEXT,
        body_text TEXT,
        headers_json TEXT,
        cached_at INTEGER
    )
    ",
    r"
    CREATE VIRTUAL TABLE IF NOT EXISTS emails_fts USING fts5(
        subject,
        snippet,
        body_text,
        from_name,
        from_email,
        content='emails',
        content_rowid='rowid'
    )
    ",
    r"
    CREATE TRIGGER IF NOT EXISTS emails_ai AFTER INSERT ON emails BEGIN
        INSERT INTO emails_fts(rowid, subject, snippet, body_text, from_name, from_email)
        VALUES (new.rowid, new.subject, new.snippet, new.body_text, new.from_name, new.from_email);
    END
    ",
    r"
    CREATE TRIGGER IF NOT EXISTS emails_ad AFTER DELETE ON emails BEGIN
        INSERT INTO emails_fts(emails_fts, rowid, subject, snippet, body_text, from_name, from_email)
        VALUES ('delete', old.rowid, old.subject, old.snippet, old.body_text, old.from_name, old.from_email);
    END
    ",
    r"
    CREATE TRIGGER IF NOT EXISTS emails_au AFTER UPDATE ON emails BEGIN
        INSERT INTO emails_fts(emails_fts, rowid, subject, snippet, body_text, from_name, from_email)
        VALUES ('delete', old.rowid, old.subject, old.snippet, old.body_text, old.from_name, old.from_email);
        INSERT INTO emails_fts(rowid, subject, snippet, body_text, from_name, from_email)
        VALUES (new.rowid, new.subject, new.snippet, new.body_text, new.from_name, new.from_email);
    END
    ",
    // Events
    r"
    CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        calendar_id TEXT,
        title TEXT,
        description TEXT,
        location TEXT,
        start_time INTEGER,
        end_time INTEGER,
        all_day INTEGER DEFAULT 0,
        recurring INTEGER DEFAULT 0,
        rrule TEXT,
        participants_json TEXT,
        status TEXT,
        busy INTEGER DEFAULT 1,
        cached_at INTEGER
    )
    ",
    r"
    CREATE VIRTUAL TABLE IF NOT EXISTS events_fts USING fts5(
        title,
        description,
        location,
        content='events',
        content_rowid='rowid'
    )
    ",
    r"
    CREATE TRIGGER IF NOT EXISTS events_ai AFTER INSERT ON events BEGIN
        INSERT INTO events_fts(rowid, title, description, location)
        VALUES (new.rowid, new.title, new.description, new.location);
    END
    ",
    r"
    CREATE TRIGGER IF NOT EXISTS events_ad AFTER DELETE ON events BEGIN
        INSERT INTO events_fts(events_fts, rowid, title, description, location)
        VALUES ('delete', old.rowid, old.title, old.description, old.location);
    END
    ",
    r"
    CREATE TRIGGER IF NOT EXISTS events_au AFTER UPDATE ON events BEGIN
        INSERT INTO events_fts(events_fts, rowid, title, description, location)
        VALUES ('delete', old.rowid, old.title, old.description, old.location);
        INSERT INTO events_fts(rowid, title, description, location)
        VALUES (new.rowid, new.title, new.description, new.location);
    END
    ",
    // Contacts
    r"
    CREATE TABLE IF NOT EXISTS contacts (
        id TEXT PRIMARY KEY,
        given_name TEXT,
        surname TEXT,
        display_name TEXT,
        email TEXT,
        phone TEXT,
        company TEXT,
        job_title TEXT,
        notes TEXT,
        photo_url TEXT,
        groups_json TEXT,
        cached_at INTEGER
    )
    ",
    r"
    CREATE VIRTUAL TABLE IF NOT EXISTS contacts_fts USING fts5(
        given_name,
        surname,
        display_name,
        email,
        company,
        content='contacts',
        content_rowid='rowid'
    )
    ",
    r"
    CREATE TRIGGER IF NOT EXISTS contacts_ai AFTER INSERT ON contacts BEGIN
        INSERT INTO contacts_fts(rowid, given_name, surname, display_name, email, company)
        VALUES (new.rowid, new.given_name, new.surname, new.display_name, new.email, new.company);
    END
    ",
    r"
    CREATE TRIGGER IF NOT EXISTS contacts_ad AFTER DELETE ON contacts BEGIN
        INSERT INTO contacts_fts(contacts_fts, rowid, given_name, surname, display_name, email, company)
        VALUES ('delete', old.rowid, old.given_name, old.surname, old.display_name, old.email, old.company);
    END
    ",
    r"
    CREATE TRIGGER IF NOT EXISTS contacts_au AFTER UPDATE ON contacts BEGIN
        INSERT INTO contacts_fts(contacts_fts, rowid, given_name, surname, display_name, email, company)
        VALUES ('delete', old.rowid, old.given_name, old.surname, old.display_name, old.email, old.company);
        INSERT INTO contacts_fts(rowid, given_name, surname, display_name, email, company)
        VALUES (new.rowid, new.given_name, new.surname, new.display_name, new.email, new.company);
    END
    ",
    // Folders
    r"
    CREATE TABLE IF NOT EXISTS folders (
        id TEXT PRIMARY KEY,
        name TEXT,
        folder_type TEXT,
        unread_count INTEGER DEFAULT 0,
        total_count INTEGER DEFAULT 0,
        cached_at INTEGER
    )
    ",
    // Calendars
    r"
    CREATE TABLE IF NOT EXISTS calendars (
        id TEXT PRIMARY KEY,
        name TEXT,
        description TEXT,
        is_primary INTEGER DEFAULT 0,
        read_only INTEGER DEFAULT 0,
        hex_color TEXT,
        cached_at INTEGER
    )
    ",
    // Sync cursors
    r"
    CREATE TABLE IF NOT EXISTS sync_state (
        resource TEXT PRIMARY KEY,
        last_sync INTEGER,
        cursor TEXT,
        metadata_json TEXT
    )
    ",
    // Indexes for the hot filters
    "CREATE INDEX IF NOT EXISTS idx_emails_folder ON emails(folder_id)",
    "CREATE INDEX IF NOT EXISTS idx_emails_thread ON emails(thread_id)",
    "CREATE INDEX IF NOT EXISTS idx_emails_date ON emails(date DESC)",
    "CREATE INDEX IF NOT EXISTS idx_emails_unread ON emails(unread) WHERE unread = 1",
    "CREATE INDEX IF NOT EXISTS idx_emails_starred ON emails(starred) WHERE starred = 1",
    "CREATE INDEX IF NOT EXISTS idx_events_calendar ON events(calendar_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_time ON events(start_time, end_time)",
    "CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email)",
];

/// Initializes the schema for a freshly opened store.
///
/// Idempotent: returns immediately when the persisted schema version is
/// already current. All statements run inside a single transaction.
///
/// # Errors
///
/// Returns an error if the version check or any schema statement fails.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;

    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    debug!(from = version, to = SCHEMA_VERSION, "initializing schema");

    let mut tx = pool.begin().await?;
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    // PRAGMA does not accept bind parameters; the version is a crate constant.
    sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}
