// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-owner provider credentials stored in `channel_credentials`.

use std::collections::BTreeMap;

use beacon_core::{BeaconError, Channel, ChannelCredentials};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};

/// Credentials for one owner and channel, read fresh on every call.
pub async fn credentials(
    db: &Database,
    owner_id: i64,
    channel: Channel,
) -> Result<Option<ChannelCredentials>, BeaconError> {
    let raw = db
        .connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT credentials FROM channel_credentials WHERE owner_id = ?1 AND channel = ?2",
                params![owner_id, channel.as_ref()],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    raw.map(|raw| {
        serde_json::from_str::<BTreeMap<String, String>>(&raw)
            .map(ChannelCredentials::from)
            .map_err(|e| {
                BeaconError::Config(format!(
                    "credentials for owner {owner_id} on {channel} are not a JSON object of strings: {e}"
                ))
            })
    })
    .transpose()
}

/// Insert or replace credentials for one owner and channel.
pub async fn set_credentials(
    db: &Database,
    owner_id: i64,
    channel: Channel,
    credentials: &ChannelCredentials,
) -> Result<(), BeaconError> {
    let encoded = serde_json::to_string(credentials)
        .map_err(|e| BeaconError::Internal(format!("failed to encode credentials: {e}")))?;
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO channel_credentials (owner_id, channel, credentials, updated_at)
                 VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT(owner_id, channel) DO UPDATE
                 SET credentials = excluded.credentials, updated_at = excluded.updated_at",
                params![owner_id, channel.as_ref(), encoded],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn rotated_credentials_are_visible_immediately() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("c.db").to_str().unwrap())
            .await
            .unwrap();

        assert!(credentials(&db, 1, Channel::Sms).await.unwrap().is_none());

        let first = ChannelCredentials::new()
            .with("account_sid", "AC1")
            .with("auth_token", "old");
        set_credentials(&db, 1, Channel::Sms, &first).await.unwrap();
        let loaded = credentials(&db, 1, Channel::Sms).await.unwrap().unwrap();
        assert_eq!(loaded.get("auth_token"), Some("old"));

        let rotated = first.clone().with("auth_token", "new");
        set_credentials(&db, 1, Channel::Sms, &rotated).await.unwrap();
        let loaded = credentials(&db, 1, Channel::Sms).await.unwrap().unwrap();
        assert_eq!(loaded.get("auth_token"), Some("new"));

        assert!(credentials(&db, 1, Channel::Chat).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_credentials_are_a_config_error() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("c.db").to_str().unwrap())
            .await
            .unwrap();
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO channel_credentials (owner_id, channel, credentials) VALUES (5, 'email', '[1,2]')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(matches!(
            credentials(&db, 5, Channel::Email).await,
            Err(BeaconError::Config(_))
        ));
    }
}
