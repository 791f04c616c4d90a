//! Model Router (C4) and outbound Provider contract.

mod echo;
mod provider;
mod router;
mod scripted;

pub use echo::EchoProvider;
pub use provider::Provider;
pub use router::{ModelRouter, RoutingContext};
pub use scripted::ScriptedProvider;
