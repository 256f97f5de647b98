//! Schema registry: components and archetypes.
//!
//! Components are interned by name (a later definition under the same name
//! wins). Archetypes are named, ordered component-name lists identified by a
//! stable 1-based id. Both are immutable once storage has been allocated
//! against them; the registry itself does not enforce a freeze, since the
//! store captures the column set at spawn time.

use std::collections::HashMap;

use crate::runtime::error::{SchemaError, SchemaResult};
use crate::runtime::types::{ArchetypeId, ScalarType};

/// One scalar field of a component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// Field name, unique within its component.
    pub name: String,
    /// Scalar type tag determining the column element width.
    pub ty: ScalarType,
}

impl Field {
    /// Creates a field from a name and scalar type.
    pub fn new(name: impl Into<String>, ty: ScalarType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// A named record of typed scalar fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Component {
    /// Component name, unique across the registry.
    pub name: String,
    /// Ordered field list.
    pub fields: Vec<Field>,
}

impl Component {
    /// Creates a component from a name and field list.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self { name: name.into(), fields }
    }
}

/// A named, ordered set of component names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchetypeDesc {
    /// Archetype name (informational; ids are the stable handle).
    pub name: String,
    /// Component names in declaration order.
    pub components: Vec<String>,
}

/// Registry of component and archetype definitions.
///
/// ## Invariants
/// - Archetype ids are 1-based indices into an append-only vector and stay
///   valid for the registry's lifetime.
/// - Component definitions are last-wins by name.
#[derive(Default)]
pub struct SchemaRegistry {
    components: HashMap<String, Component>,
    archetypes: Vec<ArchetypeDesc>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a component definition by name. A later definition under the
    /// same name replaces the earlier one.
    pub fn define_component(&mut self, component: Component) {
        self.components.insert(component.name.clone(), component);
    }

    /// Defines an archetype and returns its 1-based id.
    pub fn define_archetype(&mut self, name: impl Into<String>, components: &[&str]) -> ArchetypeId {
        self.archetypes.push(ArchetypeDesc {
            name: name.into(),
            components: components.iter().map(|c| (*c).to_string()).collect(),
        });
        self.archetypes.len() as ArchetypeId
    }

    /// Returns the component registered under `name`, if any.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// Returns the archetype for a 1-based id, if it exists.
    pub fn archetype(&self, id: ArchetypeId) -> Option<&ArchetypeDesc> {
        if id == 0 {
            return None;
        }
        self.archetypes.get(id as usize - 1)
    }

    /// Resolves the column paths (`"Component.field"`) and scalar types for
    /// an archetype, in component/field declaration order.
    ///
    /// ## Errors
    /// Fails if the archetype id is unknown or references an undefined
    /// component.
    pub fn column_layout(&self, id: ArchetypeId) -> SchemaResult<Vec<(String, ScalarType)>> {
        let desc = self
            .archetype(id)
            .ok_or(SchemaError::UnknownArchetype { archetype: id })?;

        let mut columns = Vec::new();
        for comp_name in &desc.components {
            let comp = self
                .component(comp_name)
                .ok_or_else(|| SchemaError::UnknownComponent { component: comp_name.clone() })?;
            for field in &comp.fields {
                columns.push((format!("{}.{}", comp.name, field.name), field.ty));
            }
        }
        Ok(columns)
    }
}
