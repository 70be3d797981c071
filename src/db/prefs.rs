//! Key/value preferences: the stored notification permission and the
//! permission-prompt dismissal record.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::reminder::permission::PermissionState;
use crate::reminder::prompt::Dismissal;

pub const PERMISSION_KEY: &str = "notification_permission";
pub const PROMPT_DISMISSED_KEY: &str = "notification-permission-dismissed";

pub fn get_pref(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM preferences WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_pref(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn remove_pref(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM preferences WHERE key = ?1", params![key])?;
    Ok(())
}

/// The stored permission flag. Missing or unreadable means `Default`.
pub fn load_permission(conn: &Connection) -> Result<PermissionState> {
    let state = get_pref(conn, PERMISSION_KEY)?
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default();
    Ok(state)
}

pub fn store_permission(conn: &Connection, state: PermissionState) -> Result<()> {
    set_pref(conn, PERMISSION_KEY, state.as_str())?;
    Ok(())
}

/// Read the prompt dismissal record. Anything that is not epoch millis is a
/// legacy marker and comes back as [`Dismissal::Legacy`].
pub fn load_dismissal(conn: &Connection) -> Result<Option<Dismissal>> {
    let Some(raw) = get_pref(conn, PROMPT_DISMISSED_KEY)? else {
        return Ok(None);
    };
    let dismissal = raw
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(Dismissal::At)
        .unwrap_or(Dismissal::Legacy);
    Ok(Some(dismissal))
}

pub fn store_dismissal(conn: &Connection, at: DateTime<Utc>) -> Result<()> {
    set_pref(conn, PROMPT_DISMISSED_KEY, &at.timestamp_millis().to_string())?;
    Ok(())
}

pub fn clear_dismissal(conn: &Connection) -> Result<()> {
    remove_pref(conn, PROMPT_DISMISSED_KEY)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::db::open_memory_database().unwrap()
    }

    #[test]
    fn permission_defaults_until_stored() {
        let conn = test_db();
        assert_eq!(load_permission(&conn).unwrap(), PermissionState::Default);

        store_permission(&conn, PermissionState::Granted).unwrap();
        assert_eq!(load_permission(&conn).unwrap(), PermissionState::Granted);

        store_permission(&conn, PermissionState::Denied).unwrap();
        assert_eq!(load_permission(&conn).unwrap(), PermissionState::Denied);
    }

    #[test]
    fn dismissal_round_trip_and_legacy_value() {
        let conn = test_db();
        assert!(load_dismissal(&conn).unwrap().is_none());

        let at = Utc.timestamp_millis_opt(1_760_000_000_000).unwrap();
        store_dismissal(&conn, at).unwrap();
        assert_eq!(load_dismissal(&conn).unwrap(), Some(Dismissal::At(at)));

        set_pref(&conn, PROMPT_DISMISSED_KEY, "true").unwrap();
        assert_eq!(load_dismissal(&conn).unwrap(), Some(Dismissal::Legacy));

        clear_dismissal(&conn).unwrap();
        assert!(load_dismissal(&conn).unwrap().is_none());
    }
}
