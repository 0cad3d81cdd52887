//! # Connection Registry
//!
//! Holds the named connection handles to the remote inference services.
//!
//! ## Lifecycle:
//! 1. **Startup**: every service descriptor is connected concurrently
//! 2. **Failures**: logged and left absent, never retried
//! 3. **Serving**: the finished registry is shared read-only with all handlers
//!
//! Because the registry is fully built before the HTTP server binds, it
//! needs no lock; handlers share it through an `Arc`.

use crate::config::ServiceDescriptor;
use crate::gradio::{Connector, PredictClient};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

/// Connection state of one service as reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub url: String,
    pub connected: bool,
}

/// Immutable mapping from logical service name to connection handle.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    services: BTreeMap<String, ServiceEntry>,
}

#[derive(Clone)]
struct ServiceEntry {
    url: String,
    handle: Option<Arc<dyn PredictClient>>,
}

impl ConnectionRegistry {
    /// Attempt every connection once and collect the outcome.
    ///
    /// Attempts run concurrently and independently: one failing does not
    /// delay or cancel the others.
    pub async fn connect_all(descriptors: &[ServiceDescriptor], connector: &dyn Connector) -> Self {
        let attempts = descriptors.iter().map(|descriptor| async move {
            let handle = match connector.connect(&descriptor.url).await {
                Ok(handle) => {
                    info!(service = %descriptor.name, url = %descriptor.url, "Gradio client initialized successfully");
                    Some(handle)
                }
                Err(e) => {
                    error!(service = %descriptor.name, url = %descriptor.url, error = %e, "Failed to initialize Gradio client");
                    None
                }
            };
            (descriptor, handle)
        });

        let mut registry = Self::default();
        for (descriptor, handle) in join_all(attempts).await {
            registry.insert(descriptor, handle);
        }
        registry
    }

    fn insert(&mut self, descriptor: &ServiceDescriptor, handle: Option<Arc<dyn PredictClient>>) {
        self.services.insert(
            descriptor.name.clone(),
            ServiceEntry {
                url: descriptor.url.clone(),
                handle,
            },
        );
    }

    /// Handle for `name`, if its connection succeeded at startup.
    pub fn get(&self, name: &str) -> Option<Arc<dyn PredictClient>> {
        self.services.get(name).and_then(|entry| entry.handle.clone())
    }

    pub fn connected_count(&self) -> usize {
        self.services.values().filter(|entry| entry.handle.is_some()).count()
    }

    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.services
            .iter()
            .map(|(name, entry)| ServiceStatus {
                name: name.clone(),
                url: entry.url.clone(),
                connected: entry.handle.is_some(),
            })
            .collect()
    }
}
