//! Step types for the workflow graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a step within its owning graph.
///
/// Wraps a UUID and implements `Ord` for deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepId(Uuid);

impl StepId {
    /// Create a new StepId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a new StepId from a UUID string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for StepId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Unique identifier for a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphId(Uuid);

impl GraphId {
    /// Create a new GraphId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A data resource consumed or produced by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Human-readable name of the resource.
    pub name: String,
    /// Optional locator (path, URL, or identifier in the versioning backend).
    pub locator: Option<String>,
}

impl Resource {
    /// Create a named resource without a locator.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: None,
        }
    }

    /// Create a resource with a locator.
    pub fn located(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: Some(locator.into()),
        }
    }
}

/// A person who participated in a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Display name.
    pub name: String,
    /// Optional role (e.g. "analyst", "operator").
    pub role: Option<String>,
}

impl Person {
    /// Create a person without a role.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
        }
    }
}

/// Reference to the tool used to perform a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRef {
    /// Tool name.
    pub name: String,
    /// Optional version string.
    pub version: Option<String>,
}

/// Insertion-ordered key/value property bag.
///
/// Keys are unique; setting an existing key updates its value in place
/// and preserves the original position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBag {
    entries: Vec<(String, String)>,
}

impl PropertyBag {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a key, updating in place if present. Returns `true` if the
    /// stored value changed.
    pub(crate) fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            if entry.1 == value {
                return false;
            }
            entry.1 = value;
            true
        } else {
            self.entries.push((key, value));
            true
        }
    }

    /// Remove a key, returning its value if it was present.
    pub(crate) fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single recorded workflow action.
///
/// Steps are created only through the graph's factory and mutated only
/// through the graph's mutation API; fields are therefore read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    id: StepId,
    graph: GraphId,
    recorded_at: Option<DateTime<Utc>>,
    title: String,
    description: String,
    properties: PropertyBag,
    inputs: Vec<Resource>,
    outputs: Vec<Resource>,
    persons: Vec<Person>,
    tool: Option<ToolRef>,
}

impl Step {
    /// Create a fresh, detached step. Only the graph factory calls this.
    pub(crate) fn new(id: StepId, graph: GraphId) -> Self {
        Self {
            id,
            graph,
            recorded_at: None,
            title: String::new(),
            description: String::new(),
            properties: PropertyBag::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            persons: Vec::new(),
            tool: None,
        }
    }

    /// Step identifier, unique within the owning graph.
    pub fn id(&self) -> StepId {
        self.id
    }

    /// Back-reference to the owning graph.
    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// When the step was recorded, if known.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.recorded_at
    }

    /// Step title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Free-text description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Ordered key/value properties.
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    /// Input resources.
    pub fn inputs(&self) -> &[Resource] {
        &self.inputs
    }

    /// Output resources. The Initial step may legitimately have none.
    pub fn outputs(&self) -> &[Resource] {
        &self.outputs
    }

    /// Participating persons.
    pub fn persons(&self) -> &[Person] {
        &self.persons
    }

    /// Tool used to perform the step, if any.
    pub fn tool(&self) -> Option<&ToolRef> {
        self.tool.as_ref()
    }

    // Mutators are crate-private; the model facade is the mutation API.

    pub(crate) fn set_recorded_at(&mut self, at: Option<DateTime<Utc>>) {
        self.recorded_at = at;
    }

    pub(crate) fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub(crate) fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub(crate) fn properties_mut(&mut self) -> &mut PropertyBag {
        &mut self.properties
    }

    pub(crate) fn add_input(&mut self, resource: Resource) {
        self.inputs.push(resource);
    }

    pub(crate) fn add_output(&mut self, resource: Resource) {
        self.outputs.push(resource);
    }

    pub(crate) fn add_person(&mut self, person: Person) {
        self.persons.push(person);
    }

    pub(crate) fn set_tool(&mut self, tool: Option<ToolRef>) {
        self.tool = tool;
    }
}
