//! Tool Registry (C3) and Constitution Gate (C10).

mod gate;
mod registry;
mod schema;

pub use gate::{ConstitutionGate, DefaultConstitutionGate, GateVerdict, PermissiveGate};
pub use registry::{SchemaError, Tool, ToolDescription, ToolInvocation, ToolRegistry, ToolResult, ToolSource};
pub use schema::{validate_schema_node, validate_value};
