use crate::plugin::broker::{CallKey, InboundMessage};
use crate::plugin::envelope::CompilationReport;
use crate::plugin::host_fns::CapabilityResult;
use crate::plugin::manifest::{PluginDescriptor, PluginId};

/// All possible messages that drive state transitions.
#[derive(Debug)]
pub enum Msg {
    // -- Host application events
    TabChanged(String),
    CompilationFinished(CompilationReport),

    // -- Plugin traffic
    Inbound(InboundMessage),
    CapabilityCompleted(CallKey, CapabilityResult),
    CapabilityAbandoned(CallKey),

    // -- Registration
    Register(PluginDescriptor),
    Unregister(PluginId),

    // -- System
    Quit,
}
