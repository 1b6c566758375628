//! Mediator routing.
//!
//! An agency keeps one route per recipient key registered by the agents it
//! serves. A forward addressed to a registered key is delivered on the
//! connection that registered it.

use crate::connection::Connection;
use crate::error::{ProtocolError, Result};
use chrono::{DateTime, Utc};
use pairwise_core::Verkey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

/// A registered route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub recipient_key: Verkey,
    /// Id of the agency-side connection with the route owner.
    pub connection_id: String,
    /// Local verkey of that connection.
    pub owner_verkey: Verkey,
    pub registered_at: DateTime<Utc>,
}

/// Recipient key to owning connection.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: RwLock<HashMap<Verkey, RouteRecord>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `recipient_key` to `owner`. Re-registering replaces the old route.
    pub fn register_route(&self, recipient_key: Verkey, owner: &Connection) -> RouteRecord {
        let record = RouteRecord {
            recipient_key: recipient_key.clone(),
            connection_id: owner.id.clone(),
            owner_verkey: owner.verkey.clone(),
            registered_at: Utc::now(),
        };

        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = routes.insert(recipient_key, record.clone()).is_some();

        info!(
            recipient_key = %record.recipient_key,
            owner = %record.owner_verkey,
            replaced,
            "route registered"
        );
        record
    }

    /// Remove the route for `recipient_key`, returning it if there was one.
    ///
    /// Only the connection that registered a route may remove it; a route
    /// owned by another connection is reported as `RouteNotFound` and kept.
    pub fn remove_route(&self, recipient_key: &Verkey, owner: &Connection) -> Result<Option<RouteRecord>> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        match routes.get(recipient_key) {
            None => {
                debug!(%recipient_key, "no route to remove");
                Ok(None)
            }
            Some(route) if route.owner_verkey != owner.verkey => {
                warn!(
                    %recipient_key,
                    owner = %route.owner_verkey,
                    requested_by = %owner.verkey,
                    "refusing to remove a route owned by another connection"
                );
                Err(ProtocolError::RouteNotFound(recipient_key.to_string()))
            }
            Some(_) => {
                let removed = routes.remove(recipient_key);
                info!(%recipient_key, owner = %owner.verkey, "route removed");
                Ok(removed)
            }
        }
    }

    /// Where a message for `recipient_key` should go.
    pub fn forward(&self, recipient_key: &Verkey) -> Result<RouteRecord> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .get(recipient_key)
            .cloned()
            .ok_or_else(|| ProtocolError::RouteNotFound(recipient_key.to_string()))
    }

    /// All routes, ordered by recipient key.
    pub fn get_routes(&self) -> Vec<RouteRecord> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut records: Vec<_> = routes.values().cloned().collect();
        records.sort_by(|a, b| a.recipient_key.cmp(&b.recipient_key));
        records
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The mediator an agent receives through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agency {
    /// The agency's routing key.
    pub verkey: Verkey,
    pub endpoint: String,
    /// The agent's connection with the agency.
    pub connection: Connection,
}

impl Agency {
    pub fn new(verkey: Verkey, endpoint: impl Into<String>, connection: Connection) -> Self {
        Self {
            verkey,
            endpoint: endpoint.into(),
            connection,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Keys senders must wrap for to reach this agent through the agency.
    pub fn routing_keys(&self) -> Vec<Verkey> {
        vec![self.verkey.clone()]
    }
}
