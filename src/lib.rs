//! Plugin host that multiplexes one focus slot among externally hosted plugins and brokers
//! an origin-checked request/response protocol with whichever plugin holds focus.

pub mod compilation;
pub mod host;
pub mod model;
pub mod msg;
pub mod plugin;

pub use host::Host;
pub use msg::Msg;
