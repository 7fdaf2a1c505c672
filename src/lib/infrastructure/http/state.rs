//! Application state module

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

use crate::domain::delivery::{DeliveryService, Sender};

/// Application configuration
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// The sender every message is sent from
    pub sender: Sender,

    /// Whether SMTP credentials are configured
    pub smtp_configured: bool,
}

/// Global application state
#[derive(Clone)]
pub struct AppState<D: DeliveryService> {
    /// The time the server started
    pub start_time: DateTime<Utc>,

    /// The application configuration
    pub config: AppConfig,

    /// Delivery service
    pub deliveries: Arc<D>,
}

impl<D: DeliveryService> AppState<D> {
    /// Create a new application state
    pub fn new(config: AppConfig, deliveries: D) -> Self {
        Self {
            start_time: Utc::now(),
            config,
            deliveries: Arc::new(deliveries),
        }
    }
}

impl<D: DeliveryService> fmt::Debug for AppState<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("start_time", &self.start_time)
            .field("config", &self.config)
            .field("deliveries", &"DeliveryService")
            .finish()
    }
}
