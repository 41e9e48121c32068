use crate::core::domain::envelope::Envelope;
use crate::core::ports::broker::BrokerPort;
use crate::messaging::event_channel;
use crate::utils::error::NotifierResult;
use actix::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A serialized frame pushed to one WebSocket session.
///
/// The registry hands these to each session's mailbox; the session actor
/// writes the text onto the socket.
#[derive(Message)]
#[rtype(result = "()")]
pub struct OutboundFrame(pub String);

/// Registry-internal view of one live connection.
struct ConnectionEntry {
    recipient: Recipient<OutboundFrame>,
}

#[derive(Default)]
struct RegistryState {
    /// tenant_id -> user_id -> connection_id -> entry.
    tenants: HashMap<String, HashMap<String, HashMap<u64, ConnectionEntry>>>,
    /// Tenants whose broker channel this process subscribes to. Must always
    /// equal the set of tenants with at least one live connection.
    subscribed: HashSet<String>,
}

/// Subscriber-side state: which sockets belong to which tenant and user.
///
/// The registry exclusively owns every connection from the moment its
/// handshake succeeds until cleanup, and it owns the subscribe/unsubscribe
/// lifecycle on the broker: the first connection for a tenant subscribes the
/// tenant's channel, the last one unsubscribes it.
///
/// One instance exists per process, constructed at startup and shared by the
/// WebSocket handler and the fan-out listener. Each mutating operation takes
/// the single internal lock; a subscription transition runs its broker call
/// inside the critical section, so a first-connect's subscribe and a
/// last-disconnect's unsubscribe for the same tenant can never reorder
/// against each other. Delivery only snapshots under the lock and sends
/// after releasing it.
pub struct ConnectionRegistry {
    broker: Arc<dyn BrokerPort>,
    state: Mutex<RegistryState>,
    next_connection_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(broker: Arc<dyn BrokerPort>) -> Self {
        Self {
            broker,
            state: Mutex::new(RegistryState::default()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Registers a connection and returns its process-local id.
    ///
    /// If this is the first connection under `tenant_id` across all users,
    /// the tenant's channel is subscribed on the broker. A failed subscribe
    /// is logged but does not unregister the connection: the subscription
    /// intent is recorded in the broker adapter, which repairs the
    /// broker-side state when the connection comes back.
    pub async fn connect(
        &self,
        tenant_id: &str,
        user_id: &str,
        recipient: Recipient<OutboundFrame>,
    ) -> u64 {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock().await;
        state
            .tenants
            .entry(tenant_id.to_string())
            .or_default()
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id, ConnectionEntry { recipient });

        // Subscribing while the lock is held keeps the broker call ordered
        // against a racing last-disconnect's unsubscribe for this tenant.
        if state.subscribed.insert(tenant_id.to_string()) {
            if let Err(e) = self.broker.subscribe(&event_channel(tenant_id)).await {
                warn!(tenant_id, "subscribe failed, will be repaired on reconnect: {e}");
            }
        }
        drop(state);

        info!(tenant_id, user_id, connection_id, "connection registered");
        connection_id
    }

    /// Removes a connection.
    ///
    /// Idempotent: disconnecting an id that was already removed is a no-op.
    /// Empty user and tenant entries are pruned, and the tenant's channel is
    /// unsubscribed when its last connection goes away.
    pub async fn disconnect(&self, connection_id: u64, tenant_id: &str, user_id: &str) {
        let mut state = self.state.lock().await;

        let Some(users) = state.tenants.get_mut(tenant_id) else {
            return;
        };
        let Some(connections) = users.get_mut(user_id) else {
            return;
        };
        if connections.remove(&connection_id).is_none() {
            return;
        }
        if connections.is_empty() {
            users.remove(user_id);
        }
        if users.is_empty() {
            state.tenants.remove(tenant_id);
            // Still under the lock: a reconnect for this tenant cannot
            // subscribe until this unsubscribe has completed.
            if state.subscribed.remove(tenant_id) {
                if let Err(e) = self.broker.unsubscribe(&event_channel(tenant_id)).await {
                    warn!(tenant_id, "unsubscribe failed: {e}");
                }
            }
        }
        drop(state);

        info!(tenant_id, user_id, connection_id, "connection removed");
    }

    /// Delivers an envelope to every local connection of a tenant.
    ///
    /// `channel_tenant` is the tenant derived from the broker channel the
    /// frame arrived on. An envelope whose own tenant does not match is
    /// dropped with a warning; this is defense in depth against a
    /// misconfigured broker ever causing cross-tenant leakage.
    ///
    /// Sends are non-blocking: a connection whose mailbox rejects the frame
    /// is disconnected, and delivery continues with its siblings. Returns the
    /// number of successful deliveries.
    pub async fn deliver(&self, channel_tenant: &str, envelope: &Envelope) -> usize {
        if envelope.tenant_id != channel_tenant {
            warn!(
                channel_tenant,
                envelope_tenant = envelope.tenant_id.as_str(),
                "dropping envelope with mismatched tenant"
            );
            return 0;
        }

        let frame = match serde_json::to_string(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(channel_tenant, "failed to serialize envelope: {e}");
                return 0;
            }
        };

        // Snapshot the recipients so the sends run without the lock held.
        let targets: Vec<(u64, String, Recipient<OutboundFrame>)> = {
            let state = self.state.lock().await;
            match state.tenants.get(channel_tenant) {
                Some(users) => users
                    .iter()
                    .flat_map(|(user_id, connections)| {
                        connections.iter().map(move |(connection_id, entry)| {
                            (*connection_id, user_id.clone(), entry.recipient.clone())
                        })
                    })
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (connection_id, user_id, recipient) in targets {
            match recipient.try_send(OutboundFrame(frame.clone())) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        tenant_id = channel_tenant,
                        user_id = user_id.as_str(),
                        connection_id,
                        "send failed, removing connection: {e}"
                    );
                    failed.push((connection_id, user_id));
                }
            }
        }

        for (connection_id, user_id) in failed {
            self.disconnect(connection_id, channel_tenant, &user_id).await;
        }

        debug!(
            tenant_id = channel_tenant,
            event_type = envelope.event_type(),
            delivered,
            "envelope delivered"
        );
        delivered
    }

    /// Unsubscribes every tenant channel and drops all connection state.
    ///
    /// Called once at process shutdown; its lifetime ends with the process.
    pub async fn close(&self) -> NotifierResult<()> {
        let tenants: Vec<String> = {
            let mut state = self.state.lock().await;
            state.tenants.clear();
            state.subscribed.drain().collect()
        };

        for tenant_id in tenants {
            if let Err(e) = self.broker.unsubscribe(&event_channel(&tenant_id)).await {
                warn!(
                    tenant_id = tenant_id.as_str(),
                    "unsubscribe on close failed: {e}"
                );
            }
        }
        Ok(())
    }

    /// Tenants this process currently subscribes to.
    pub async fn subscribed_tenants(&self) -> Vec<String> {
        self.state.lock().await.subscribed.iter().cloned().collect()
    }

    /// Number of live connections registered under a tenant.
    pub async fn connection_count(&self, tenant_id: &str) -> usize {
        let state = self.state.lock().await;
        state
            .tenants
            .get(tenant_id)
            .map(|users| users.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }
}
