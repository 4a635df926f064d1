// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator subcommands: `preview`, `dead`, `cancel`, `recover`.

use beacon_core::{
    BeaconError, Channel, ContentSpec, Correlation, EnqueueRequest, Message, MessageId,
    MessageStatus, MessageStore, RenderedContent, TemplateData,
};
use chrono::Utc;
use tracing::info;

use crate::app::App;

/// Longest `last_error` shown in the dead-letter listing.
const ERROR_PREVIEW_CHARS: usize = 120;

/// Render the owner's active template for an event without storing anything.
pub async fn preview(
    app: &App,
    owner_id: i64,
    event_key: &str,
    channel: Channel,
    data: Option<&str>,
) -> Result<RenderedContent, BeaconError> {
    let data = parse_data(data)?;
    app.dispatcher
        .preview(owner_id, event_key, channel, &data)
        .await?
        .ok_or_else(|| BeaconError::NoTemplate {
            owner_id,
            event_key: event_key.to_string(),
            channel,
        })
}

fn parse_data(raw: Option<&str>) -> Result<TemplateData, BeaconError> {
    let Some(raw) = raw else {
        return Ok(TemplateData::new());
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(BeaconError::Validation(
            "--data must be a JSON object".into(),
        )),
        Err(e) => Err(BeaconError::Validation(format!("--data is not valid JSON: {e}"))),
    }
}

/// Dead-lettered messages, most recent first.
pub async fn list_dead(app: &App, limit: usize) -> Result<Vec<Message>, BeaconError> {
    app.store.list_by_status(MessageStatus::Dead, limit).await
}

/// Enqueue a fresh copy of a dead message. The dead row stays as it is.
pub async fn requeue_dead(app: &App, id: MessageId) -> Result<MessageId, BeaconError> {
    let message = app
        .store
        .get(id)
        .await?
        .ok_or(BeaconError::NotFound { id })?;
    if message.status != MessageStatus::Dead {
        return Err(BeaconError::Validation(format!(
            "message {id} is {}; only dead messages can be requeued",
            message.status
        )));
    }

    let mut request = EnqueueRequest::new(
        message.owner_id,
        message.channel,
        message.recipient,
        ContentSpec::Rendered(message.content),
    )
    .with_correlation(Correlation {
        client_id: message.client_id,
        order_id: message.order_id,
        order_group_id: message.order_group_id,
    })
    .with_priority(message.priority);
    if let Some(event) = message.source_event {
        request = request.with_source_event(event);
    }

    let outcome = app.dispatcher.enqueue(request).await?;
    info!(dead = %id, new = %outcome.id, "dead message requeued");
    Ok(outcome.id)
}

pub async fn cancel(app: &App, id: MessageId, reason: &str) -> Result<(), BeaconError> {
    app.store.cancel(id, reason).await?;
    info!(message_id = %id, reason, "message cancelled");
    Ok(())
}

/// Return expired claims to the queue now instead of waiting for a worker pass.
pub async fn recover(app: &App) -> Result<u64, BeaconError> {
    app.store.recover_expired(Utc::now()).await
}

/// One line per message for terminal output.
pub fn format_row(message: &Message) -> String {
    let error = message.last_error.as_deref().unwrap_or("-");
    let error: String = if error.chars().count() > ERROR_PREVIEW_CHARS {
        let cut: String = error.chars().take(ERROR_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        error.to_string()
    };
    format!(
        "{:>8}  owner={:<6} {:<5} {:<28} attempts={}/{}  {}  {}",
        message.id,
        message.owner_id,
        message.channel,
        message.recipient,
        message.attempts,
        message.max_attempts,
        message.updated_at.format("%Y-%m-%d %H:%M:%S"),
        error
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::config_in;
    use beacon_core::{MessageDraft, TemplateSource};

    async fn app() -> (App, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(config_in(&dir)).await.unwrap();
        (app, dir)
    }

    async fn dead_message(app: &App) -> MessageId {
        let mut draft = MessageDraft::new(
            1,
            Channel::Sms,
            "+15550000003",
            RenderedContent::text("Your payment is overdue"),
        );
        draft.order_id = Some(42);
        app.store
            .insert_attempted(draft, Some("invalid number (HTTP 400)"))
            .await
            .unwrap()
    }

    #[test]
    fn data_must_be_an_object() {
        assert!(parse_data(None).unwrap().is_empty());
        assert_eq!(
            parse_data(Some(r#"{"checkout_url":"https://x/y"}"#)).unwrap()["checkout_url"],
            "https://x/y"
        );
        assert!(matches!(parse_data(Some("[1]")), Err(BeaconError::Validation(_))));
        assert!(matches!(parse_data(Some("{")), Err(BeaconError::Validation(_))));
    }

    #[tokio::test]
    async fn preview_without_template_reports_no_template() {
        let (app, _dir) = app().await;
        assert!(app
            .store
            .active_template(1, "order_missing_data", Channel::Chat)
            .await
            .unwrap()
            .is_none());
        let err = preview(&app, 1, "order_missing_data", Channel::Chat, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BeaconError::NoTemplate { owner_id: 1, .. }));
    }

    #[tokio::test]
    async fn requeue_copies_a_dead_message() {
        let (app, _dir) = app().await;
        let dead = dead_message(&app).await;

        let listed = list_dead(&app, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(format_row(&listed[0]).contains("invalid number"));

        let fresh = requeue_dead(&app, dead).await.unwrap();
        assert_ne!(fresh, dead);
        let copy = app.store.get(fresh).await.unwrap().unwrap();
        assert_eq!(copy.status, MessageStatus::Queued);
        assert_eq!(copy.attempts, 0);
        assert_eq!(copy.order_id, Some(42));
        assert_eq!(copy.content.body_text, "Your payment is overdue");
        assert_eq!(
            app.store.get(dead).await.unwrap().unwrap().status,
            MessageStatus::Dead
        );
    }

    #[tokio::test]
    async fn only_dead_messages_can_be_requeued() {
        let (app, _dir) = app().await;
        let queued = app
            .dispatcher
            .enqueue(EnqueueRequest::new(
                1,
                Channel::Sms,
                "+15550000001",
                ContentSpec::rendered(None, "hi"),
            ))
            .await
            .unwrap()
            .id;
        assert!(matches!(
            requeue_dead(&app, queued).await,
            Err(BeaconError::Validation(_))
        ));
        assert!(matches!(
            requeue_dead(&app, MessageId(9999)).await,
            Err(BeaconError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_is_limited_to_queued_messages() {
        let (app, _dir) = app().await;
        let dead = dead_message(&app).await;
        assert!(matches!(
            cancel(&app, dead, "order paid").await,
            Err(BeaconError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn recover_on_a_quiet_queue_is_zero() {
        let (app, _dir) = app().await;
        assert_eq!(recover(&app).await.unwrap(), 0);
    }
}
