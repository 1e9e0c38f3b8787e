//! SQLite schema (spec §6 "Persisted state layout").

use rusqlite::{Connection, Result};

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA foreign_keys=ON;

        CREATE TABLE IF NOT EXISTS users (
            id               TEXT PRIMARY KEY,
            username         TEXT UNIQUE NOT NULL,
            password_hash    TEXT NOT NULL,
            tier             TEXT NOT NULL,
            used_this_month  INTEGER NOT NULL DEFAULT 0,
            last_reset       TEXT NOT NULL,
            active           INTEGER NOT NULL DEFAULT 1,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS analyses (
            id              TEXT PRIMARY KEY,
            user_id         TEXT,
            query           TEXT NOT NULL,
            query_type      TEXT NOT NULL,
            platform        TEXT NOT NULL,
            status          TEXT NOT NULL,
            bot             REAL,
            trend           REAL,
            review          REAL,
            promotion       REAL,
            authenticity    REAL,
            band            TEXT,
            correlation_id  TEXT UNIQUE NOT NULL,
            failure_reason  TEXT,
            created_at      TEXT NOT NULL,
            started_at      TEXT,
            completed_at    TEXT,
            processing_ms   INTEGER,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );
        CREATE INDEX IF NOT EXISTS idx_analyses_user ON analyses(user_id);
        CREATE INDEX IF NOT EXISTS idx_analyses_status ON analyses(status);

        CREATE TABLE IF NOT EXISTS agent_results (
            analysis_id     TEXT NOT NULL,
            agent_type      TEXT NOT NULL,
            score           REAL NOT NULL,
            confidence      REAL NOT NULL,
            status          TEXT NOT NULL,
            evidence        TEXT NOT NULL,
            processing_ms   INTEGER,
            created_at      TEXT NOT NULL,
            completed_at    TEXT,
            PRIMARY KEY (analysis_id, agent_type),
            FOREIGN KEY (analysis_id) REFERENCES analyses(id)
        );

        CREATE TABLE IF NOT EXISTS shame_list (
            id              TEXT PRIMARY KEY,
            analysis_id     TEXT UNIQUE NOT NULL,
            product_name    TEXT NOT NULL,
            band            TEXT NOT NULL,
            bot             REAL NOT NULL,
            authenticity    REAL NOT NULL,
            active          INTEGER NOT NULL DEFAULT 1,
            display_order   INTEGER NOT NULL,
            created_at      TEXT NOT NULL,
            FOREIGN KEY (analysis_id) REFERENCES analyses(id)
        );
        ",
    )
}
