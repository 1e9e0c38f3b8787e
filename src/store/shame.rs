//! Shame List repository (spec §4.I): a derived projection, populated by the
//! application (not a DB trigger — see DESIGN.md's Open Question
//! resolution) whenever a completed analysis meets the manipulation
//! threshold.

use rusqlite::{params, Row};
use uuid::Uuid;

use crate::domain::{Band, ShameEntry};
use crate::error::StoreError;

use super::Store;

fn row_to_shame_entry(row: &Row) -> rusqlite::Result<ShameEntry> {
    let id: String = row.get("id")?;
    let analysis_id: String = row.get("analysis_id")?;
    let band: String = row.get("band")?;
    Ok(ShameEntry {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        analysis_id: Uuid::parse_str(&analysis_id).unwrap_or_default(),
        product_name: row.get("product_name")?,
        band: Band::from_str(&band).unwrap_or(Band::Red),
        bot: row.get("bot")?,
        authenticity: row.get("authenticity")?,
        active: row.get::<_, i64>("active")? != 0,
        display_order: row.get("display_order")?,
        created_at: row.get("created_at")?,
    })
}

impl Store {
    pub async fn insert_shame_entry(&self, entry: ShameEntry) -> Result<ShameEntry, StoreError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO shame_list (id, analysis_id, product_name, band, bot, authenticity, active, display_order, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(analysis_id) DO NOTHING",
                params![
                    entry.id.to_string(),
                    entry.analysis_id.to_string(),
                    entry.product_name,
                    entry.band.as_str(),
                    entry.bot,
                    entry.authenticity,
                    entry.active as i64,
                    entry.display_order,
                    entry.created_at,
                ],
            )?;
            Ok(entry)
        })
        .await
    }

    /// Top entries for the public Shame List, ordered `display_order ASC,
    /// bot DESC, created_at DESC` (spec §4.I `topN`).
    pub async fn list_shame(&self, limit: u32) -> Result<Vec<ShameEntry>, StoreError> {
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM shame_list WHERE active = 1
                 ORDER BY display_order ASC, bot DESC, created_at DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], row_to_shame_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// Administrative removal from the public feed (spec's supplemented
    /// admin deactivate endpoint — see SPEC_FULL.md).
    pub async fn deactivate_shame_entry(&self, analysis_id: Uuid) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE shame_list SET active = 0 WHERE analysis_id = ?1",
                params![analysis_id.to_string()],
            )?;
            Ok(())
        })
        .await
    }
}
