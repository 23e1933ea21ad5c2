//! Client registry.
//!
//! Immutable for the process lifetime. Expired clients stay registered and
//! are skipped by the scheduler each cycle.

use chrono::NaiveDate;

use scanwatch_common::config::{ClientConfig, ClientsConfig};

use crate::notification::Destination;
use crate::screener::ScanQuery;

/// Subscriber accounts in source order.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Vec<ClientConfig>,
}

impl ClientRegistry {
    pub fn new(clients: Vec<ClientConfig>) -> Self {
        Self { clients }
    }

    /// Iterate clients in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ClientConfig> {
        self.clients.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ClientConfig> {
        self.clients.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Number of clients whose subscription covers `today`.
    pub fn active_on(&self, today: NaiveDate) -> usize {
        self.clients.iter().filter(|c| !is_expired(c, today)).count()
    }
}

impl From<ClientsConfig> for ClientRegistry {
    fn from(config: ClientsConfig) -> Self {
        Self::new(config.0)
    }
}

impl<'a> IntoIterator for &'a ClientRegistry {
    type Item = &'a ClientConfig;
    type IntoIter = std::slice::Iter<'a, ClientConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.clients.iter()
    }
}

/// A subscription is active through its expiry date.
pub fn is_expired(client: &ClientConfig, today: NaiveDate) -> bool {
    today > client.expiry
}

/// The screener query for a client.
pub fn query_for(client: &ClientConfig) -> ScanQuery {
    ScanQuery {
        scanner_url: client.scanner_url.clone(),
        payload: client.payload.clone(),
    }
}

/// The delivery target for a client.
pub fn destination_for(client: &ClientConfig) -> Destination {
    Destination::new(client.bot_token.clone(), client.chat_id.clone())
}
