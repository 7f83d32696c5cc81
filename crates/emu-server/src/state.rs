//! Shared application state, handed to every axum handler via `State`.

use std::sync::Arc;

use emu_core::registry::Registry;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, config: AppConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    /// Populates the registry from the loaded configuration's `Topics` and
    /// `Queues` sections (spec.md §6 "On startup the registry is populated
    /// from this structure").
    pub fn seed_from_config(&self) {
        for queue_cfg in &self.config.queues {
            let mut attrs = self.config.queue_attribute_defaults.to_queue_attributes();
            if let Some(wait) = queue_cfg.receive_message_wait_time_seconds {
                attrs.receive_message_wait_time_seconds = wait;
            }
            if let Some(size) = queue_cfg.maximum_message_size {
                attrs.maximum_message_size = size;
            }
            if let Some(vt) = queue_cfg.visibility_timeout {
                attrs.visibility_timeout = vt;
            }
            if let Some(delay) = queue_cfg.delay_seconds {
                attrs.delay_seconds = delay;
            }
            attrs.fifo_queue = queue_cfg.fifo_queue;
            if let Some(ref policy) = queue_cfg.redrive_policy {
                attrs.redrive_policy = emu_core::model::RedrivePolicy::from_json(policy);
            }

            if let Err(e) = self.registry.create_queue(&queue_cfg.name, attrs) {
                tracing::warn!(queue = %queue_cfg.name, error = %e, "failed to seed queue from config");
            }
        }

        for topic_cfg in &self.config.topics {
            let topic = self.registry.create_topic(&topic_cfg.name);
            for sub in &topic_cfg.subscriptions {
                let endpoint = sub
                    .queue_name
                    .as_deref()
                    .or(sub.end_point.as_deref())
                    .unwrap_or_default();
                let subscriber =
                    emu_core::model::Subscriber::from_protocol_endpoint(&sub.protocol, endpoint, sub.raw);
                let Some(subscriber) = subscriber else {
                    tracing::warn!(protocol = %sub.protocol, "unknown subscription protocol in config, skipping");
                    continue;
                };
                let filter_policy = sub
                    .filter_policy
                    .clone()
                    .map(emu_core::model::FilterPolicy);
                topic.subscribe(subscriber, filter_policy);
            }
        }
    }

    /// Creates only the queues/topics from `config` that are not already
    /// present by name (hot-reload semantics — ignore on conflict, log a
    /// warning, per the Open Question resolution in DESIGN.md).
    pub fn merge_from_config(&self, config: &AppConfig) {
        for queue_cfg in &config.queues {
            if self.registry.get_queue(&queue_cfg.name).is_some() {
                tracing::debug!(queue = %queue_cfg.name, "hot reload: queue already exists, ignoring");
                continue;
            }
            let mut attrs = config.queue_attribute_defaults.to_queue_attributes();
            if let Some(wait) = queue_cfg.receive_message_wait_time_seconds {
                attrs.receive_message_wait_time_seconds = wait;
            }
            attrs.fifo_queue = queue_cfg.fifo_queue;
            if let Err(e) = self.registry.create_queue(&queue_cfg.name, attrs) {
                tracing::warn!(queue = %queue_cfg.name, error = %e, "hot reload: failed to create queue");
            } else {
                tracing::info!(queue = %queue_cfg.name, "hot reload: created queue");
            }
        }

        for topic_cfg in &config.topics {
            if self.registry.get_topic(&topic_cfg.name).is_some() {
                tracing::debug!(topic = %topic_cfg.name, "hot reload: topic already exists, ignoring");
                continue;
            }
            let topic = self.registry.create_topic(&topic_cfg.name);
            tracing::info!(topic = %topic_cfg.name, "hot reload: created topic");
            for sub in &topic_cfg.subscriptions {
                let endpoint = sub
                    .queue_name
                    .as_deref()
                    .or(sub.end_point.as_deref())
                    .unwrap_or_default();
                if let Some(subscriber) =
                    emu_core::model::Subscriber::from_protocol_endpoint(&sub.protocol, endpoint, sub.raw)
                {
                    let filter_policy = sub.filter_policy.clone().map(emu_core::model::FilterPolicy);
                    topic.subscribe(subscriber, filter_policy);
                }
            }
        }
    }
}
