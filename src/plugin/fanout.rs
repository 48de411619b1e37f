use crate::plugin::envelope::Envelope;
use crate::plugin::focus::Dispatch;
use crate::plugin::manifest::PluginId;
use crate::plugin::registry::PluginRegistry;

/// Outcome of one send. Delivery is advisory: a drop is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { to: PluginId },
    Dropped(DropReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// No plugin holds focus.
    NoFocus,
    /// The addressee has no registry record.
    Unregistered(PluginId),
    /// The envelope could not be encoded.
    Encode(String),
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent { .. })
    }
}

/// Serialize `envelope` and post it to `id`'s endpoint, addressed to its trusted origin.
pub fn deliver(registry: &PluginRegistry, id: &PluginId, envelope: &Envelope) -> Delivery {
    let Some(record) = registry.lookup(id.as_str()) else {
        tracing::debug!("dropping {} for unregistered plugin {id}", envelope.kind());
        return Delivery::Dropped(DropReason::Unregistered(id.clone()));
    };

    let message = match envelope.to_json() {
        Ok(message) => message,
        Err(err) => {
            tracing::error!("failed to encode {} for {id}: {err}", envelope.kind());
            return Delivery::Dropped(DropReason::Encode(err.to_string()));
        }
    };

    tracing::trace!("post {} -> {id}", envelope.kind());
    record.endpoint.post(&message, &record.trusted_origin);
    Delivery::Sent { to: id.clone() }
}

pub fn deliver_dispatch(registry: &PluginRegistry, dispatch: &Dispatch) -> Delivery {
    deliver(registry, &dispatch.to, &dispatch.envelope)
}

/// Send to whichever plugin holds focus, if any.
pub fn deliver_to_focused(
    registry: &PluginRegistry,
    focused: Option<&PluginId>,
    envelope: &Envelope,
) -> Delivery {
    match focused {
        Some(id) => deliver(registry, id, envelope),
        None => {
            tracing::debug!("dropping {}: no plugin in focus", envelope.kind());
            Delivery::Dropped(DropReason::NoFocus)
        }
    }
}
