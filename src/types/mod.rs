//! Core types for the workflow graph.

pub mod edge;
pub mod schema;
pub mod step;

pub use edge::Edge;
pub use schema::IdSchema;
pub use step::{GraphId, Person, PropertyBag, Resource, Step, StepId, ToolRef};
