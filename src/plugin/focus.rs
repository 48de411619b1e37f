use serde_json::Value;
use smallvec::SmallVec;

use crate::plugin::envelope::Envelope;
use crate::plugin::manifest::PluginId;
use crate::plugin::registry::PluginRegistry;

/// An envelope addressed to one plugin, not yet sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub to: PluginId,
    pub envelope: Envelope,
}

impl Dispatch {
    pub fn new(to: PluginId, envelope: Envelope) -> Self {
        Self { to, envelope }
    }
}

/// At most three notifications come out of one transition: unfocus, focus, compilationData.
pub type Transition = SmallVec<[Dispatch; 3]>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FocusState {
    #[default]
    Unfocused,
    FocusedOn(PluginId),
}

/// Single-slot focus tracker driven by tab changes.
#[derive(Debug, Default)]
pub struct FocusController {
    state: FocusState,
}

impl FocusController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FocusState {
        &self.state
    }

    pub fn focused(&self) -> Option<&PluginId> {
        match &self.state {
            FocusState::FocusedOn(id) => Some(id),
            FocusState::Unfocused => None,
        }
    }

    pub fn is_focused(&self, id: &str) -> bool {
        self.focused().is_some_and(|focused| focused.as_str() == id)
    }

    /// Apply an "active tab changed" event and return the notifications it produces, in
    /// send order.
    ///
    /// `snapshot` is the current compilation result handed to a newly focused plugin.
    pub fn on_tab_changed(
        &mut self,
        next: &str,
        registry: &PluginRegistry,
        snapshot: Option<Value>,
    ) -> Transition {
        let mut out = Transition::new();
        let next_registered = registry.contains(next);

        if next_registered && self.is_focused(next) {
            tracing::trace!("tab {next} already focused");
            return out;
        }

        if let FocusState::FocusedOn(prev) = &self.state {
            if prev.as_str() != next {
                out.push(Dispatch::new(prev.clone(), Envelope::unfocus()));
            }
        }

        if next_registered {
            let id = PluginId::new(next);
            tracing::debug!("focus -> {id}");
            self.state = FocusState::FocusedOn(id.clone());
            out.push(Dispatch::new(id.clone(), Envelope::focus()));
            out.push(Dispatch::new(id, Envelope::compilation_data(snapshot)));
        } else {
            tracing::debug!("tab {next} is not a plugin, focus cleared");
            self.state = FocusState::Unfocused;
        }

        out
    }

    /// Drop focus if it is held by `id`. No notification: the plugin is already gone.
    pub fn forget(&mut self, id: &str) -> bool {
        if self.is_focused(id) {
            self.state = FocusState::Unfocused;
            return true;
        }
        false
    }
}
