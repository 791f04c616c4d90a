//! Planner (C5) and Plan Simulator (C6).

mod action_intent;
mod json_extract;
mod planner;
mod simulator;

pub use action_intent::classify_action_intent;
pub use json_extract::parse_json_response;
pub use planner::Planner;
pub use simulator::{drop_high_severity_steps, simulate};
