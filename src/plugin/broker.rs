//! Turns inbound plugin messages into capability calls and correlates the results.

use std::sync::mpsc;

use serde::Deserialize;
use serde_json::Value;
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;

use crate::msg::Msg;
use crate::plugin::envelope::{Envelope, InboundRequest};
use crate::plugin::focus::{Dispatch, FocusController};
use crate::plugin::host_fns::{CapabilityResult, CapabilityTable, Completion, ConfigCall};
use crate::plugin::manifest::PluginId;
use crate::plugin::permission::Operation;
use crate::plugin::registry::PluginRegistry;

new_key_type! {
    /// Handle of one in-flight capability call.
    pub struct CallKey;
}

/// Who receives a response once its capability call completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseRouting {
    /// The plugin that issued the request, even if it has lost focus since.
    #[default]
    Requester,
    /// Whichever plugin holds focus at completion time, or nobody.
    Focused,
}

/// A raw message received from a plugin context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The endpoint the message came from.
    pub source: PluginId,
    /// Origin claimed by the transport for the sending context.
    pub origin: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InboundRejection {
    #[error("no plugin in focus")]
    NoFocus,
    #[error("message from {0}, which does not hold focus")]
    SourceNotFocused(PluginId),
    #[error("origin {origin} does not match trusted origin {trusted}")]
    OriginMismatch { origin: String, trusted: String },
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("operation not allowed: {0}")]
    UnknownOperation(String),
}

impl InboundRejection {
    /// Rejections at the trust boundary, as opposed to plain noise.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            InboundRejection::SourceNotFocused(_) | InboundRejection::OriginMismatch { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    Dispatched(CallKey),
    Rejected(InboundRejection),
}

#[derive(Debug, Clone)]
struct PendingCall {
    requester: PluginId,
    operation: Operation,
    id: Value,
}

#[derive(Debug)]
pub struct RpcBroker {
    routing: ResponseRouting,
    pending: SlotMap<CallKey, PendingCall>,
    tx: mpsc::Sender<Msg>,
}

impl RpcBroker {
    pub fn new(routing: ResponseRouting, tx: mpsc::Sender<Msg>) -> Self {
        Self {
            routing,
            pending: SlotMap::with_key(),
            tx,
        }
    }

    pub fn routing(&self) -> ResponseRouting {
        self.routing
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Validate an inbound message and, if it passes, start the capability call.
    ///
    /// Rejected messages get no response. The caller decides how loudly to log them.
    pub fn handle_inbound(
        &mut self,
        message: &InboundMessage,
        focus: &FocusController,
        registry: &PluginRegistry,
        capabilities: &mut CapabilityTable,
    ) -> InboundOutcome {
        match self.accept(message, focus, registry) {
            Ok((requester, operation, request)) => {
                InboundOutcome::Dispatched(self.start(requester, operation, request, capabilities))
            }
            Err(rejection) => InboundOutcome::Rejected(rejection),
        }
    }

    fn accept(
        &self,
        message: &InboundMessage,
        focus: &FocusController,
        registry: &PluginRegistry,
    ) -> Result<(PluginId, Operation, InboundRequest), InboundRejection> {
        let focused = focus.focused().ok_or(InboundRejection::NoFocus)?;
        let record = registry
            .lookup(focused.as_str())
            .ok_or(InboundRejection::NoFocus)?;

        if message.source != *focused {
            return Err(InboundRejection::SourceNotFocused(message.source.clone()));
        }
        if message.origin != record.trusted_origin {
            return Err(InboundRejection::OriginMismatch {
                origin: message.origin.clone(),
                trusted: record.trusted_origin.clone(),
            });
        }

        let request = InboundRequest::parse(&message.data)
            .map_err(|err| InboundRejection::Malformed(err.to_string()))?;
        let operation = Operation::from_name(&request.kind)
            .ok_or_else(|| InboundRejection::UnknownOperation(request.kind.clone()))?;

        Ok((focused.clone(), operation, request))
    }

    fn start(
        &mut self,
        requester: PluginId,
        operation: Operation,
        request: InboundRequest,
        capabilities: &mut CapabilityTable,
    ) -> CallKey {
        let key = self.pending.insert(PendingCall {
            requester: requester.clone(),
            operation,
            id: request.id,
        });
        let done = Completion::new(key, self.tx.clone());

        tracing::debug!("{requester} -> {}.{}", request.key, operation.name());

        match ConfigCall::from_arguments(operation, &request.arguments) {
            Ok(call) => capabilities.dispatch(&request.key, &requester, call, done),
            Err(err) => done.complete(Err(err)),
        }

        key
    }

    /// Turn a finished capability call into its response, addressed per the routing policy.
    pub fn complete(
        &mut self,
        key: CallKey,
        outcome: CapabilityResult,
        focus: &FocusController,
    ) -> Option<Dispatch> {
        let Some(call) = self.pending.remove(key) else {
            tracing::warn!("completion for unknown call {key:?}");
            return None;
        };

        let target = match self.routing {
            ResponseRouting::Requester => Some(call.requester.clone()),
            ResponseRouting::Focused => focus.focused().cloned(),
        };
        let Some(target) = target else {
            tracing::debug!(
                "{} response for {} dropped: no plugin in focus",
                call.operation.name(),
                call.requester
            );
            return None;
        };

        if target != call.requester {
            tracing::warn!(
                "{} response requested by {} routed to {target}",
                call.operation.name(),
                call.requester
            );
        }

        let envelope = Envelope::response(
            call.id,
            call.operation,
            outcome.map_err(|err| err.to_string()),
        );
        Some(Dispatch::new(target, envelope))
    }

    /// Forget a call whose capability dropped its completion. No response is sent.
    pub fn abandon(&mut self, key: CallKey) -> bool {
        match self.pending.remove(key) {
            Some(call) => {
                tracing::debug!(
                    "{} call from {} abandoned by its capability",
                    call.operation.name(),
                    call.requester
                );
                true
            }
            None => false,
        }
    }
}
