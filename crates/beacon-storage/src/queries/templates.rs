// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Template lookups against the owner-managed `templates` table.

use beacon_core::{BeaconError, Channel, Template};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{format_ts, template_from_row, TEMPLATE_COLUMNS};

/// The active template for (owner, event key, channel).
///
/// Several active rows resolve deterministically: most recently activated
/// first (never-activated rows last), then highest id.
pub async fn active_template(
    db: &Database,
    owner_id: i64,
    event_key: &str,
    channel: Channel,
) -> Result<Option<Template>, BeaconError> {
    let event_key = event_key.to_string();
    let sql = format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates
         WHERE owner_id = ?1 AND event_key = ?2 AND channel = ?3 AND active = 1
         ORDER BY activated_at IS NULL, activated_at DESC, id DESC
         LIMIT 1"
    );
    db.connection()
        .call(move |conn| -> Result<Option<Template>, rusqlite::Error> {
            conn.query_row(
                &sql,
                params![owner_id, event_key, channel.as_ref()],
                template_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// A template by id, scoped to its owner. Inactive templates are returned too.
pub async fn template_by_id(
    db: &Database,
    owner_id: i64,
    template_id: i64,
) -> Result<Option<Template>, BeaconError> {
    let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1 AND owner_id = ?2");
    db.connection()
        .call(move |conn| -> Result<Option<Template>, rusqlite::Error> {
            conn.query_row(&sql, params![template_id, owner_id], template_from_row)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Write a template row, returning its id. `template.id` is ignored.
///
/// Template administration lives outside this service; this exists for
/// seeding and fixtures.
pub async fn insert_template(db: &Database, template: &Template) -> Result<i64, BeaconError> {
    let buttons = serde_json::to_string(&template.buttons)
        .map_err(|e| BeaconError::Internal(format!("failed to encode buttons: {e}")))?;
    let template = template.clone();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO templates (owner_id, event_key, channel, subject, body_text,
                     body_html, buttons, active, activated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    template.owner_id,
                    template.event_key,
                    template.channel.as_ref(),
                    template.subject,
                    template.body_text,
                    template.body_html,
                    buttons,
                    template.active,
                    template.activated_at.map(format_ts),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use beacon_core::ContentButton;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    use super::*;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    fn template(body: &str) -> Template {
        Template {
            id: 0,
            owner_id: 1,
            event_key: "order_missing_data".into(),
            channel: Channel::Chat,
            subject: None,
            body_text: body.into(),
            body_html: None,
            buttons: vec![ContentButton {
                label: "Complete order".into(),
                url: Some("{checkout_url}".into()),
                payload: None,
            }],
            active: true,
            activated_at: None,
        }
    }

    #[tokio::test]
    async fn finds_only_active_matching_template() {
        let (db, _dir) = setup_db().await;

        let mut inactive = template("old");
        inactive.active = false;
        insert_template(&db, &inactive).await.unwrap();
        let mut sms = template("sms body");
        sms.channel = Channel::Sms;
        insert_template(&db, &sms).await.unwrap();
        let id = insert_template(&db, &template("current")).await.unwrap();

        let found = active_template(&db, 1, "order_missing_data", Channel::Chat)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.body_text, "current");
        assert_eq!(found.buttons.len(), 1);

        assert!(active_template(&db, 2, "order_missing_data", Channel::Chat)
            .await
            .unwrap()
            .is_none());
        assert!(active_template(&db, 1, "order_missing_data", Channel::Email)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn most_recently_activated_wins() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();

        let mut newer = template("newer");
        newer.activated_at = Some(now);
        let newer_id = insert_template(&db, &newer).await.unwrap();
        let mut older = template("older");
        older.activated_at = Some(now - Duration::days(3));
        insert_template(&db, &older).await.unwrap();
        insert_template(&db, &template("never activated")).await.unwrap();

        let found = active_template(&db, 1, "order_missing_data", Channel::Chat)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newer_id);
    }

    #[tokio::test]
    async fn by_id_is_owner_scoped() {
        let (db, _dir) = setup_db().await;
        let mut inactive = template("pinned");
        inactive.active = false;
        let id = insert_template(&db, &inactive).await.unwrap();

        let found = template_by_id(&db, 1, id).await.unwrap().unwrap();
        assert!(!found.active);
        assert!(template_by_id(&db, 2, id).await.unwrap().is_none());
    }
}
