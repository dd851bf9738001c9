//! Triage repository for persistent storage of messages, results, overrides,
//! rules, flags, and the activity log.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{FeatureFlags, Priority, RuleConfig, TriageOverride, TriageResult};
use crate::Result;
use crate::service::MessageMeta;

/// Repository for triage state.
///
/// Owns a `SQLite` pool; all tables are created on construction.
pub struct TriageRepository {
    pool: SqlitePool,
}

/// One row of the shared team inbox: the override state of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInboxItem {
    /// Message the override applies to.
    pub email_id: String,
    /// Whether the message has been handled.
    pub done: bool,
    /// Latest note, or empty.
    pub note: String,
    /// User tags.
    pub tags: Vec<String>,
    /// Timestamp of the last change.
    pub updated_at: String,
}

impl TriageRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation
    /// fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation
    /// fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                thread_id TEXT,
                sender TEXT NOT NULL,
                subject TEXT NOT NULL,
                snippet TEXT NOT NULL,
                message_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS triage_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL UNIQUE,
                priority TEXT NOT NULL,
                category TEXT NOT NULL,
                summary TEXT NOT NULL,
                action TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (message_id) REFERENCES messages(id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'open',
                done INTEGER NOT NULL DEFAULT 0,
                tags_json TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (message_id) REFERENCES messages(id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (message_id) REFERENCES messages(id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS rule_configs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                matchers_json TEXT NOT NULL,
                priority TEXT NOT NULL,
                category TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS feature_flags (
                key TEXT PRIMARY KEY,
                value_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Index for the team inbox and override listings
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_assignments_updated_at
            ON assignments(updated_at)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_notes_message_id
            ON notes(message_id, updated_at)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or refresh the stored metadata for a listed message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn save_message_meta(&self, meta: &MessageMeta) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r"
            INSERT INTO messages (
                id, thread_id, sender, subject, snippet, message_date, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                thread_id = excluded.thread_id,
                sender = excluded.sender,
                subject = excluded.subject,
                snippet = excluded.snippet,
                message_date = excluded.message_date,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&meta.id)
        .bind(&meta.thread_id)
        .bind(&meta.from)
        .bind(&meta.subject)
        .bind(&meta.snippet)
        .bind(&meta.date)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store (or refresh) the engine's result for a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn save_triage_result(&self, message_id: &str, triage: &TriageResult) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r"
            INSERT INTO triage_results (
                message_id, priority, category, summary, action, confidence, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(message_id) DO UPDATE SET
                priority = excluded.priority,
                category = excluded.category,
                summary = excluded.summary,
                action = excluded.action,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at
            ",
        )
        .bind(message_id)
        .bind(triage.priority.as_str())
        .bind(&triage.category)
        .bind(&triage.summary)
        .bind(&triage.action)
        .bind(triage.confidence)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the stored triage result for a message, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_triage_result(&self, message_id: &str) -> Result<Option<TriageResult>> {
        let row = sqlx::query(
            r"
            SELECT priority, category, summary, action, confidence
            FROM triage_results
            WHERE message_id = ?
            ",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| TriageResult {
            priority: Priority::parse(r.get("priority")),
            category: r.get("category"),
            summary: r.get("summary"),
            action: r.get("action"),
            confidence: r.get("confidence"),
        }))
    }

    /// Record a user override for a message.
    ///
    /// The note and tags are normalized (length and count caps). A
    /// placeholder message row is created when the message has not been
    /// synced yet, so overrides can arrive before listings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_override(
        &self,
        message_id: &str,
        done: bool,
        note: &str,
        tags: &[String],
    ) -> Result<TriageOverride> {
        let now = Utc::now().to_rfc3339();
        let note = TriageOverride::normalize_note(note);
        let tags = TriageOverride::normalize_tags(tags);
        let tags_json = serde_json::to_string(&tags)?;

        sqlx::query(
            r"
            INSERT INTO messages (id, thread_id, sender, subject, snippet, message_date, created_at, updated_at)
            VALUES (?, NULL, 'unknown', '(pending sync)', '', ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(message_id)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            INSERT INTO assignments (message_id, status, done, tags_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(message_id) DO UPDATE SET
                status = excluded.status,
                done = excluded.done,
                tags_json = excluded.tags_json,
                updated_at = excluded.updated_at
            ",
        )
        .bind(message_id)
        .bind(if done { "done" } else { "open" })
        .bind(i32::from(done))
        .bind(&tags_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            INSERT INTO notes (message_id, body, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(message_id)
        .bind(&note)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(TriageOverride {
            done,
            note,
            tags,
            updated_at: now,
        })
    }

    /// Get the override for a message, if one was ever recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_override(&self, message_id: &str) -> Result<Option<TriageOverride>> {
        let row = sqlx::query(
            r"
            SELECT
                a.done,
                a.tags_json,
                a.updated_at AS assignment_updated_at,
                n.body AS note_body,
                n.updated_at AS note_updated_at
            FROM assignments a
            LEFT JOIN notes n
                ON n.id = (
                    SELECT id
                    FROM notes
                    WHERE message_id = a.message_id
                    ORDER BY updated_at DESC, id DESC
                    LIMIT 1
                )
            WHERE a.message_id = ?
            ",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_override(&r)))
    }

    /// List every recorded override, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_overrides(&self) -> Result<Vec<(String, TriageOverride)>> {
        let rows = sqlx::query(
            r"
            SELECT
                a.message_id,
                a.done,
                a.tags_json,
                a.updated_at AS assignment_updated_at,
                n.body AS note_body,
                n.updated_at AS note_updated_at
            FROM assignments a
            LEFT JOIN notes n
                ON n.id = (
                    SELECT id
                    FROM notes
                    WHERE message_id = a.message_id
                    ORDER BY updated_at DESC, id DESC
                    LIMIT 1
                )
            ORDER BY a.updated_at DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("message_id"), row_to_override(r)))
            .collect())
    }

    /// Flat view of all overrides for the shared team inbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_team_inbox(&self) -> Result<Vec<TeamInboxItem>> {
        let overrides = self.list_overrides().await?;
        Ok(overrides
            .into_iter()
            .map(|(email_id, o)| TeamInboxItem {
                email_id,
                done: o.done,
                note: o.note,
                tags: o.tags,
                updated_at: o.updated_at,
            })
            .collect())
    }

    /// List configured rules, seeding the default security rule when the
    /// table is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn list_rule_configs(&self) -> Result<Vec<RuleConfig>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, description, matchers_json, priority, category, enabled
            FROM rule_configs
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            let default_rule = RuleConfig::default_security_rule();
            self.create_rule_config(&default_rule).await?;
            return Ok(vec![default_rule]);
        }

        Ok(rows
            .iter()
            .map(|r| RuleConfig {
                id: r.get("id"),
                name: r.get("name"),
                description: r.get("description"),
                matchers: parse_string_array(r.get("matchers_json")),
                priority: Priority::parse(r.get("priority")),
                category: r.get("category"),
                enabled: r.get::<i64, _>("enabled") != 0,
            })
            .collect())
    }

    /// Insert a new rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails (including a
    /// duplicate rule id).
    pub async fn create_rule_config(&self, rule: &RuleConfig) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r"
            INSERT INTO rule_configs (
                id, name, description, matchers_json, priority, category, enabled, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(serde_json::to_string(&rule.matchers)?)
        .bind(rule.priority.as_str())
        .bind(&rule.category)
        .bind(i32::from(rule.enabled))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Current feature flags, seeding the default row when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn feature_flags(&self) -> Result<FeatureFlags> {
        let row = sqlx::query("SELECT value_json FROM feature_flags WHERE key = 'system'")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(parse_feature_flags(r.get("value_json"))),
            None => {
                let flags = FeatureFlags::default();
                self.store_feature_flags(flags).await?;
                Ok(flags)
            }
        }
    }

    /// Toggle AI shadow triage and return the resulting flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn set_ai_triage_enabled(&self, enabled: bool) -> Result<FeatureFlags> {
        let flags = FeatureFlags::from_toggle(enabled);
        self.store_feature_flags(flags).await?;
        Ok(flags)
    }

    async fn store_feature_flags(&self, flags: FeatureFlags) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r"
            INSERT INTO feature_flags (key, value_json, updated_at)
            VALUES ('system', ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value_json = excluded.value_json,
                updated_at = excluded.updated_at
            ",
        )
        .bind(serde_json::to_string(&flags)?)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append a structured event to the activity log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn log_activity(&self, event: &str, payload: &serde_json::Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO activity_log (event, payload_json, created_at) VALUES (?, ?, ?)",
        )
        .bind(event)
        .bind(payload.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of activity log entries for an event, for tests and stats.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_activity(&self, event: &str) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM activity_log WHERE event = ?")
            .bind(event)
            .fetch_one(&self.pool)
            .await?;

        #[allow(clippy::cast_sign_loss)]
        Ok(row.get::<i64, _>("n") as u64)
    }
}

/// Convert a joined assignments/notes row to a `TriageOverride`.
///
/// The later of the assignment and note timestamps wins as `updated_at`.
fn row_to_override(row: &sqlx::sqlite::SqliteRow) -> TriageOverride {
    let assignment_updated_at: String = row.get("assignment_updated_at");
    let note_updated_at: Option<String> = row.get("note_updated_at");
    let updated_at = match note_updated_at {
        Some(note_ts) if note_ts > assignment_updated_at => note_ts,
        _ => assignment_updated_at,
    };

    TriageOverride {
        done: row.get::<i64, _>("done") != 0,
        note: row.get::<Option<String>, _>("note_body").unwrap_or_default(),
        tags: parse_string_array(row.get("tags_json")),
        updated_at,
    }
}

/// Parse a `*_json` column into strings, dropping anything malformed.
fn parse_string_array(raw: String) -> Vec<String> {
    serde_json::from_str::<Vec<serde_json::Value>>(&raw)
        .map(|values| {
            values
                .into_iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse the persisted flags JSON, defaulting on any malformed value.
fn parse_feature_flags(raw: String) -> FeatureFlags {
    serde_json::from_str::<FeatureFlags>(&raw)
        .map(|flags| FeatureFlags::from_toggle(flags.ai_triage_enabled))
        .unwrap_or_default()
}
