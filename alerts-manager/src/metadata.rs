//! Lookups over the property/target/operator catalogs
//!
//! These are pure functions over catalogs previously fetched through
//! [`AlertManager::get_properties`](crate::AlertManager::get_properties) and
//! friends; none of them calls the adapter.

use std::collections::HashMap;

use crate::model::{Id, Operator, Property, Target};

/// Properties measured on `target`, matched by target id
pub fn properties_for_target<'a>(properties: &'a [Property], target: &Target) -> Vec<&'a Property> {
    properties
        .iter()
        .filter(|property| property.target.target_id == target.target_id)
        .collect()
}

/// Operators valid for `property`, in the property's order
///
/// Operator ids missing from the catalog are skipped.
pub fn operators_for_property<'a>(operators: &'a [Operator], property: &Property) -> Vec<&'a Operator> {
    let map = operator_map(operators);

    property
        .valid_operators
        .iter()
        .filter_map(|id| {
            let operator = map.get(id).copied();
            if operator.is_none() {
                tracing::debug!("Property references unknown operator {}", id);
            }
            operator
        })
        .collect()
}

/// Properties indexed by id; a later duplicate id replaces an earlier one
pub fn property_map(properties: &[Property]) -> HashMap<Id, &Property> {
    properties
        .iter()
        .filter_map(|property| Some((property.property_id.clone()?, property)))
        .collect()
}

/// Operators indexed by id; a later duplicate id replaces an earlier one
pub fn operator_map(operators: &[Operator]) -> HashMap<Id, &Operator> {
    operators
        .iter()
        .filter_map(|operator| Some((operator.operator_id.clone()?, operator)))
        .collect()
}

/// One level of the property tree
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyNode<'a> {
    /// Label of this level (group, category or description segment)
    pub description: String,
    /// Property whose path ends at this node
    pub item: Option<&'a Property>,
    /// Child levels, in first-seen order
    pub items: Vec<PropertyNode<'a>>,
}

impl<'a> PropertyNode<'a> {
    fn new(description: String) -> Self {
        Self {
            description,
            item: None,
            items: Vec::new(),
        }
    }
}

/// Arrange properties into a tree by their group, category and description path
///
/// Each property contributes the path `[group, category.., description..]`;
/// siblings with the same label are merged. A missing group is an empty label.
pub fn property_tree(properties: &[Property]) -> Vec<PropertyNode<'_>> {
    let mut roots = Vec::new();

    for property in properties {
        let path: Vec<String> = std::iter::once(property.group.clone().unwrap_or_default())
            .chain(property.category.iter().cloned())
            .chain(property.description.iter().cloned())
            .collect();

        insert(&mut roots, &path, property);
    }

    roots
}

fn insert<'a>(level: &mut Vec<PropertyNode<'a>>, path: &[String], property: &'a Property) {
    let Some((label, rest)) = path.split_first() else {
        return;
    };

    let index = match level.iter().position(|node| &node.description == label) {
        Some(index) => index,
        None => {
            level.push(PropertyNode::new(label.clone()));
            level.len() - 1
        }
    };

    let node = &mut level[index];
    if rest.is_empty() {
        node.item = Some(property);
    } else {
        insert(&mut node.items, rest, property);
    }
}
