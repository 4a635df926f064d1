// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory template and credential sources.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use beacon_core::{BeaconError, Channel, ChannelCredentials, CredentialSource, Template, TemplateSource};

/// Templates held in memory, resolved with the same tie-break as the
/// SQLite source: most recently activated, then highest id.
#[derive(Default)]
pub struct StaticTemplates {
    templates: RwLock<Vec<Template>>,
}

impl StaticTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, template: Template) -> Self {
        self.templates.get_mut().push(template);
        self
    }

    pub async fn add(&self, template: Template) {
        self.templates.write().await.push(template);
    }

    /// Flip the active flag of every template with `id`.
    pub async fn set_active(&self, id: i64, active: bool) {
        for template in self.templates.write().await.iter_mut() {
            if template.id == id {
                template.active = active;
            }
        }
    }
}

#[async_trait]
impl TemplateSource for StaticTemplates {
    async fn active_template(
        &self,
        owner_id: i64,
        event_key: &str,
        channel: Channel,
    ) -> Result<Option<Template>, BeaconError> {
        let templates = self.templates.read().await;
        Ok(templates
            .iter()
            .filter(|t| {
                t.active && t.owner_id == owner_id && t.event_key == event_key && t.channel == channel
            })
            .max_by_key(|t| (t.activated_at.is_some(), t.activated_at, t.id))
            .cloned())
    }

    async fn template_by_id(
        &self,
        owner_id: i64,
        template_id: i64,
    ) -> Result<Option<Template>, BeaconError> {
        let templates = self.templates.read().await;
        Ok(templates
            .iter()
            .find(|t| t.owner_id == owner_id && t.id == template_id)
            .cloned())
    }
}

/// Credentials held in memory, keyed by owner and channel.
#[derive(Default)]
pub struct StaticCredentials {
    values: RwLock<HashMap<(i64, Channel), ChannelCredentials>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, owner_id: i64, channel: Channel, credentials: ChannelCredentials) -> Self {
        self.values.get_mut().insert((owner_id, channel), credentials);
        self
    }

    /// Replace credentials, as a settings change would.
    pub async fn set(&self, owner_id: i64, channel: Channel, credentials: ChannelCredentials) {
        self.values
            .write()
            .await
            .insert((owner_id, channel), credentials);
    }

    pub async fn remove(&self, owner_id: i64, channel: Channel) {
        self.values.write().await.remove(&(owner_id, channel));
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn credentials(
        &self,
        owner_id: i64,
        channel: Channel,
    ) -> Result<Option<ChannelCredentials>, BeaconError> {
        Ok(self.values.read().await.get(&(owner_id, channel)).cloned())
    }
}

/// A template fixture with only the fields tests usually care about.
pub fn template(id: i64, owner_id: i64, event_key: &str, channel: Channel, body: &str) -> Template {
    Template {
        id,
        owner_id,
        event_key: event_key.to_string(),
        channel,
        subject: None,
        body_text: body.to_string(),
        body_html: None,
        buttons: Vec::new(),
        active: true,
        activated_at: None,
    }
}
