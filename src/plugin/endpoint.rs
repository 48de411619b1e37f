use std::fmt;
use std::sync::mpsc;

use crate::plugin::manifest::PluginId;

/// One-way transport into a plugin's isolated context.
///
/// Posting never blocks and reports nothing back: the message is addressed to
/// `target_origin` and the far side decides whether to accept it.
pub trait Endpoint: fmt::Debug {
    fn post(&self, message: &str, target_origin: &str);
}

/// Builds the endpoint for a freshly registered plugin.
pub type Connector = Box<dyn Fn(&PluginId) -> Box<dyn Endpoint>>;

/// A message that left the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    pub to: PluginId,
    pub target_origin: String,
    pub message: String,
}

/// Endpoint that forwards every post into a shared channel, tagged with the plugin it was
/// addressed to. Sharing one receiver across plugins preserves the global send order.
#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    id: PluginId,
    tx: mpsc::Sender<Posted>,
}

impl ChannelEndpoint {
    pub fn new(id: PluginId, tx: mpsc::Sender<Posted>) -> Self {
        Self { id, tx }
    }

    pub fn connector(tx: mpsc::Sender<Posted>) -> Connector {
        Box::new(move |id: &PluginId| {
            Box::new(ChannelEndpoint::new(id.clone(), tx.clone())) as Box<dyn Endpoint>
        })
    }
}

impl Endpoint for ChannelEndpoint {
    fn post(&self, message: &str, target_origin: &str) {
        let posted = Posted {
            to: self.id.clone(),
            target_origin: target_origin.to_string(),
            message: message.to_string(),
        };
        if self.tx.send(posted).is_err() {
            tracing::debug!("endpoint {} closed, message discarded", self.id);
        }
    }
}
