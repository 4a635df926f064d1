// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter registry.

use std::collections::HashMap;
use std::sync::Arc;

use beacon_core::{BeaconError, Channel, ChannelAdapter};
use tracing::{info, warn};

/// Maps each [`Channel`] to the adapter that delivers on it.
///
/// # Examples
///
/// ```
/// use beacon_dispatch::AdapterRegistry;
/// use beacon_core::Channel;
///
/// let registry = AdapterRegistry::new();
/// assert!(!registry.has(Channel::Sms));
/// assert!(registry.channels().is_empty());
/// ```
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under the channel it reports. Replaces any adapter
    /// previously registered for that channel.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        let channel = adapter.channel();
        info!(channel = %channel, adapter = adapter.name(), "channel adapter registered");
        if self.adapters.insert(channel, adapter).is_some() {
            warn!(channel = %channel, "replaced previously registered adapter");
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&channel).cloned()
    }

    /// Like [`get`](Self::get), but a missing adapter is an error.
    pub fn require(&self, channel: Channel) -> Result<Arc<dyn ChannelAdapter>, BeaconError> {
        self.get(channel)
            .ok_or(BeaconError::AdapterNotFound { channel })
    }

    pub fn has(&self, channel: Channel) -> bool {
        self.adapters.contains_key(&channel)
    }

    /// Registered channels in declaration order.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.adapters.keys().copied().collect();
        channels.sort();
        channels
    }

    /// Shut down every adapter, logging rather than stopping on failures.
    pub async fn shutdown_all(&self) {
        for channel in self.channels() {
            if let Some(adapter) = self.adapters.get(&channel)
                && let Err(e) = adapter.shutdown().await
            {
                warn!(channel = %channel, error = %e, "adapter shutdown failed");
            }
        }
    }
}
