//! Event Subscription Module
//!
//! Events are buffered per call in an [`EventLog`] and only reach the
//! [`EventPublisher`] once the call has committed.

use drip_common::types::{Address, Amount};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Which singleton an administrative event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Token,
    Faucet,
}

/// Structured events emitted by the ledger and the faucet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DripEvent {
    /// A participant claimed from the faucet
    TokensClaimed {
        claimant: Address,
        amount: Amount,
        timestamp: u64,
    },
    /// Pause flag changed
    FaucetPaused { paused: bool },
    /// Balance movement; `from == None` is a mint
    Transfer {
        from: Option<Address>,
        to: Address,
        amount: Amount,
    },
    /// Ledger minter rewired
    MinterChanged { previous: Address, minter: Address },
    /// Administrative identity handed over
    OwnershipTransferred {
        component: Component,
        previous: Address,
        owner: Address,
    },
}

impl DripEvent {
    /// Participant addresses this event concerns.
    pub fn involves(&self, address: &Address) -> bool {
        match self {
            DripEvent::TokensClaimed { claimant, .. } => claimant == address,
            DripEvent::Transfer { from, to, .. } => to == address || from.as_ref() == Some(address),
            DripEvent::MinterChanged { previous, minter } => previous == address || minter == address,
            DripEvent::OwnershipTransferred { previous, owner, .. } => previous == address || owner == address,
            DripEvent::FaucetPaused { .. } => true,
        }
    }
}

/// Events produced by one call, discarded if the call fails.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<DripEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: DripEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[DripEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<DripEvent> {
        self.events
    }
}

/// Subscription filter
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    /// Only deliver events involving one of these addresses (empty = all)
    pub addresses: Vec<Address>,
}

impl SubscriptionFilter {
    fn matches(&self, event: &DripEvent) -> bool {
        self.addresses.is_empty() || self.addresses.iter().any(|a| event.involves(a))
    }
}

/// Event subscriber handle
pub struct EventSubscriber {
    filter: SubscriptionFilter,
    receiver: broadcast::Receiver<DripEvent>,
}

impl EventSubscriber {
    /// Receive the next matching event; `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<DripEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Subscriber lagged, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<DripEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Fan-out of committed events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<DripEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> EventSubscriber {
        EventSubscriber {
            filter,
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish event to all subscribers
    pub fn publish(&self, event: DripEvent) {
        if let Err(e) = self.sender.send(event) {
            debug!("No subscribers to receive event: {:?}", e.0);
        }
    }

    /// Publish everything a committed call produced, in order.
    pub fn publish_log(&self, log: EventLog) {
        for event in log.into_events() {
            self.publish(event);
        }
    }

    /// Get receiver count (active subscribers)
    pub fn active_subscribers(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
