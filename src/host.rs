use std::sync::mpsc;

use anyhow::Result;

use crate::compilation::CompilationSnapshot;
use crate::model::config::AppConfig;
use crate::msg::Msg;
use crate::plugin::broker::{CallKey, InboundMessage, InboundOutcome, RpcBroker};
use crate::plugin::endpoint::{Connector, Endpoint};
use crate::plugin::envelope::{CompilationReport, Envelope};
use crate::plugin::fanout::{self, Delivery};
use crate::plugin::focus::FocusController;
use crate::plugin::host_fns::{
    CapabilityResult, CapabilityTable, ConfigCapability, FileConfigStore, RegistrationError,
};
use crate::plugin::manifest::{PluginDescriptor, PluginId};
use crate::plugin::registry::PluginRegistry;

/// One host session: the registry, the focus slot, the broker and the capabilities the
/// focused plugin may call. Sessions share nothing, so several can run side by side.
pub struct Host {
    registry: PluginRegistry,
    focus: FocusController,
    broker: RpcBroker,
    capabilities: CapabilityTable,
    compilation: CompilationSnapshot,
    connector: Connector,
    pub should_quit: bool,
}

impl Host {
    /// Build a session from config: registers the enabled plugins and the built-in config
    /// store under `broker.config_namespace`.
    pub fn new(
        config: &AppConfig,
        event_tx: mpsc::Sender<Msg>,
        connector: Connector,
    ) -> Result<Self> {
        let mut host = Self::bare(config, event_tx, connector);
        host.register_capability(
            config.broker.config_namespace.clone(),
            Box::new(FileConfigStore::new(config.config_root())),
        )?;

        for plugin in config.enabled_plugins() {
            host.register(&plugin.descriptor());
        }
        for line in host.registry.list_notifications() {
            tracing::info!("{line}");
        }

        Ok(host)
    }

    /// A session with no capabilities and no plugins.
    pub fn bare(config: &AppConfig, event_tx: mpsc::Sender<Msg>, connector: Connector) -> Self {
        Self {
            registry: PluginRegistry::new(),
            focus: FocusController::new(),
            broker: RpcBroker::new(config.broker.response_routing, event_tx),
            capabilities: CapabilityTable::new(),
            compilation: CompilationSnapshot::new(),
            connector,
            should_quit: false,
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn focus(&self) -> &FocusController {
        &self.focus
    }

    pub fn broker(&self) -> &RpcBroker {
        &self.broker
    }

    pub fn register_capability(
        &mut self,
        namespace: impl Into<String>,
        capability: Box<dyn ConfigCapability>,
    ) -> Result<(), RegistrationError> {
        self.capabilities.register(namespace, capability)
    }

    /// Register through the session's connector.
    pub fn register(&mut self, descriptor: &PluginDescriptor) {
        let endpoint = (self.connector)(&descriptor.id());
        self.register_with(descriptor, endpoint);
    }

    pub fn register_with(&mut self, descriptor: &PluginDescriptor, endpoint: Box<dyn Endpoint>) {
        self.registry.register(descriptor, endpoint);
    }

    pub fn unregister(&mut self, id: &PluginId) {
        if self.registry.unregister(id).is_some() && self.focus.forget(id.as_str()) {
            tracing::debug!("focused plugin {id} unregistered, focus cleared");
        }
    }

    pub fn update(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::TabChanged(tab) => self.handle_tab_changed(&tab),
            Msg::CompilationFinished(report) => {
                self.handle_compilation_finished(report);
            }
            Msg::Inbound(message) => {
                self.handle_inbound(&message);
            }
            Msg::CapabilityCompleted(key, outcome) => {
                self.handle_capability_completed(key, outcome);
            }
            Msg::CapabilityAbandoned(key) => {
                self.broker.abandon(key);
            }
            Msg::Register(descriptor) => self.register(&descriptor),
            Msg::Unregister(id) => self.unregister(&id),
            Msg::Quit => self.should_quit = true,
        }
        Ok(())
    }

    fn handle_tab_changed(&mut self, tab: &str) {
        let transition = self
            .focus
            .on_tab_changed(tab, &self.registry, self.compilation.current());

        for dispatch in &transition {
            fanout::deliver_dispatch(&self.registry, dispatch);
        }
    }

    /// Only the focused plugin hears about finished compilations.
    fn handle_compilation_finished(&mut self, report: CompilationReport) -> Delivery {
        self.compilation.record(&report);
        fanout::deliver_to_focused(
            &self.registry,
            self.focus.focused(),
            &Envelope::compilation_finished(report),
        )
    }

    fn handle_inbound(&mut self, message: &InboundMessage) -> InboundOutcome {
        let outcome = self.broker.handle_inbound(
            message,
            &self.focus,
            &self.registry,
            &mut self.capabilities,
        );

        if let InboundOutcome::Rejected(rejection) = &outcome {
            if rejection.is_security_event() {
                tracing::warn!("dropped message from {}: {rejection}", message.source);
            } else {
                tracing::debug!("dropped message from {}: {rejection}", message.source);
            }
        }
        outcome
    }

    fn handle_capability_completed(&mut self, key: CallKey, outcome: CapabilityResult) -> Delivery {
        match self.broker.complete(key, outcome, &self.focus) {
            Some(dispatch) => fanout::deliver_dispatch(&self.registry, &dispatch),
            None => Delivery::Dropped(fanout::DropReason::NoFocus),
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("registry", &self.registry)
            .field("focus", &self.focus)
            .field("broker", &self.broker)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
