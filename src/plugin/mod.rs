pub mod broker;
pub mod endpoint;
pub mod envelope;
pub mod fanout;
pub mod focus;
pub mod host_fns;
pub mod manifest;
pub mod permission;
pub mod registry;

pub use broker::{InboundMessage, ResponseRouting, RpcBroker};
pub use endpoint::{ChannelEndpoint, Connector, Endpoint, Posted};
pub use envelope::Envelope;
pub use focus::{FocusController, FocusState};
pub use manifest::{PluginDescriptor, PluginId};
pub use registry::PluginRegistry;
