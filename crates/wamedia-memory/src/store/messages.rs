//! Message record upsert and queries.

use super::Store;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use uuid::Uuid;
use wamedia_core::{
    error::WamediaError,
    media::{MediaKind, MediaSource},
    message::{MediaStatus, MessageRecord},
};

const COLUMNS: &str = "id, instance, remote_jid, message_id, from_me, push_name, kind, content, \
     caption, mimetype, media_source, media_status, storage_key, sha256, size, error, timestamp";

/// SQL expression ranking `{table}.media_status`; higher is better.
fn status_rank(table: &str) -> String {
    format!(
        "(CASE {table}.media_status WHEN 'stored' THEN 3 WHEN 'thumbnail' THEN 2 \
         WHEN 'failed' THEN 1 ELSE 0 END)"
    )
}

impl Store {
    /// Insert or update a record keyed on `(instance, message_id)`.
    ///
    /// A redelivery never lowers the media status of a row: `stored` beats
    /// `thumbnail`, which beats `failed`.
    ///
    /// Returns the id of the persisted row, which for an existing row is the
    /// original id rather than `record.id`.
    pub async fn upsert_message(&self, record: &MessageRecord) -> Result<Uuid, WamediaError> {
        let sql = format!(
            "INSERT INTO messages (id, instance, remote_jid, message_id, from_me, push_name, kind, \
                 content, caption, mimetype, media_source, media_status, storage_key, sha256, size, \
                 error, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (instance, message_id) DO UPDATE SET \
                 remote_jid = excluded.remote_jid, \
                 from_me = excluded.from_me, \
                 push_name = COALESCE(excluded.push_name, messages.push_name), \
                 kind = excluded.kind, \
                 content = excluded.content, \
                 caption = excluded.caption, \
                 mimetype = excluded.mimetype, \
                 media_source = excluded.media_source, \
                 media_status = excluded.media_status, \
                 storage_key = excluded.storage_key, \
                 sha256 = excluded.sha256, \
                 size = excluded.size, \
                 error = excluded.error, \
                 timestamp = excluded.timestamp, \
                 updated_at = datetime('now') \
             WHERE {rank_new} >= {rank_old} \
             RETURNING id",
            rank_new = status_rank("excluded"),
            rank_old = status_rank("messages"),
        );
        let returned: Option<(String,)> = sqlx::query_as(&sql)
        .bind(record.id.to_string())
        .bind(&record.instance)
        .bind(&record.remote_jid)
        .bind(&record.message_id)
        .bind(record.from_me)
        .bind(&record.push_name)
        .bind(record.kind.as_str())
        .bind(&record.content)
        .bind(&record.caption)
        .bind(&record.mimetype)
        .bind(record.media_source.map(|s| s.as_str()))
        .bind(record.media_status.as_str())
        .bind(&record.storage_key)
        .bind(&record.sha256)
        .bind(record.size.map(|s| s as i64))
        .bind(&record.error)
        .bind(format_ts(&record.timestamp))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WamediaError::Memory(format!("upsert failed: {e}")))?;

        let id = match returned {
            Some((id,)) => id,
            // Update skipped by the WHERE guard; the row is unchanged.
            None => {
                let (id,): (String,) = sqlx::query_as(
                    "SELECT id FROM messages WHERE instance = ? AND message_id = ?",
                )
                .bind(&record.instance)
                .bind(&record.message_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| WamediaError::Memory(format!("lookup failed: {e}")))?;
                id
            }
        };
        Uuid::parse_str(&id).map_err(|e| WamediaError::Memory(format!("bad row id {id}: {e}")))
    }

    pub async fn get_message(
        &self,
        instance: &str,
        message_id: &str,
    ) -> Result<Option<MessageRecord>, WamediaError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM messages WHERE instance = ? AND message_id = ?"
        ))
        .bind(instance)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WamediaError::Memory(format!("query failed: {e}")))?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Most recent records, newest first. `instance = None` spans all instances.
    pub async fn recent_messages(
        &self,
        instance: Option<&str>,
        limit: i64,
    ) -> Result<Vec<MessageRecord>, WamediaError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM messages \
             WHERE (?1 IS NULL OR instance = ?1) \
             ORDER BY timestamp DESC, created_at DESC \
             LIMIT ?2"
        ))
        .bind(instance)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WamediaError::Memory(format!("query failed: {e}")))?;

        rows.iter().map(record_from_row).collect()
    }

    /// Records whose media could not be re-hosted, newest first.
    pub async fn failed_media(&self, limit: i64) -> Result<Vec<MessageRecord>, WamediaError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM messages WHERE media_status = 'failed' \
             ORDER BY timestamp DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WamediaError::Memory(format!("query failed: {e}")))?;

        rows.iter().map(record_from_row).collect()
    }

    /// Row counts per media status. Statuses with no rows are omitted.
    pub async fn count_by_status(&self) -> Result<BTreeMap<String, i64>, WamediaError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT media_status, COUNT(*) FROM messages GROUP BY media_status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WamediaError::Memory(format!("count failed: {e}")))?;

        Ok(rows.into_iter().collect())
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn record_from_row(row: &SqliteRow) -> Result<MessageRecord, WamediaError> {
    let get_err = |e: sqlx::Error| WamediaError::Memory(format!("bad row: {e}"));

    let id: String = row.try_get("id").map_err(get_err)?;
    let kind: String = row.try_get("kind").map_err(get_err)?;
    let media_source: Option<String> = row.try_get("media_source").map_err(get_err)?;
    let media_status: String = row.try_get("media_status").map_err(get_err)?;
    let size: Option<i64> = row.try_get("size").map_err(get_err)?;
    let timestamp: String = row.try_get("timestamp").map_err(get_err)?;

    Ok(MessageRecord {
        id: Uuid::parse_str(&id).map_err(|e| WamediaError::Memory(format!("bad id {id}: {e}")))?,
        instance: row.try_get("instance").map_err(get_err)?,
        remote_jid: row.try_get("remote_jid").map_err(get_err)?,
        message_id: row.try_get("message_id").map_err(get_err)?,
        from_me: row.try_get("from_me").map_err(get_err)?,
        push_name: row.try_get("push_name").map_err(get_err)?,
        kind: kind.parse::<MediaKind>().map_err(WamediaError::Memory)?,
        content: row.try_get("content").map_err(get_err)?,
        caption: row.try_get("caption").map_err(get_err)?,
        mimetype: row.try_get("mimetype").map_err(get_err)?,
        media_source: media_source
            .map(|s| s.parse::<MediaSource>())
            .transpose()
            .map_err(WamediaError::Memory)?,
        media_status: media_status
            .parse::<MediaStatus>()
            .map_err(WamediaError::Memory)?,
        storage_key: row.try_get("storage_key").map_err(get_err)?,
        sha256: row.try_get("sha256").map_err(get_err)?,
        size: size.map(|s| s.max(0) as u64),
        error: row.try_get("error").map_err(get_err)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| WamediaError::Memory(format!("bad timestamp {timestamp}: {e}")))?,
    })
}
