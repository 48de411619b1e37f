use serde::{Deserialize, Serialize};

/// The complete set of host operations a focused plugin may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    SetConfig,
    GetConfig,
    RemoveConfig,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::SetConfig,
        Operation::GetConfig,
        Operation::RemoveConfig,
    ];

    /// Look up an operation by its wire name. Names outside the allow-list yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::SetConfig => "setConfig",
            Operation::GetConfig => "getConfig",
            Operation::RemoveConfig => "removeConfig",
        }
    }
}
