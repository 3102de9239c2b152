//! GENA notification body parsing.
//!
//! A NOTIFY body is a `propertyset` document listing changed state
//! variables. Services built around a `LastChange` variable deliver
//! their real payload as XML-escaped text inside that variable, so
//! decoding happens in two stages: [`parse_property_set`] yields the
//! variable/value pairs with the escaping undone, and
//! [`parse_last_change`] breaks a `LastChange` value into per-instance
//! variable changes.

use xmltree::{Element, XMLNode};

use crate::error::{ControlPointError, Result};

/// A changed state variable from a propertyset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    /// State variable name
    pub variable: String,
    /// New value as sent by the device
    pub value: String,
}

/// One variable change inside a `LastChange` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastChangeEntry {
    /// Instance the change applies to, usually "0"
    pub instance_id: String,
    /// State variable name
    pub variable: String,
    /// New value from the `val` attribute
    pub value: String,
    /// Channel qualifier for per-channel variables like Volume
    pub channel: Option<String>,
}

/// Parse a GENA propertyset body into variable/value pairs.
///
/// Pairs are returned in document order. A variable with an empty
/// element yields an empty value.
pub fn parse_property_set(xml: &str) -> Result<Vec<PropertyChange>> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| ControlPointError::Parse(format!("invalid propertyset: {e}")))?;

    if root.name != "propertyset" {
        return Err(ControlPointError::Parse(format!(
            "expected propertyset, got {}",
            root.name
        )));
    }

    let mut changes = Vec::new();
    for property in child_elements(&root) {
        if property.name != "property" {
            continue;
        }
        // Each property wraps exactly one variable element
        if let Some(variable) = child_elements(property).next() {
            changes.push(PropertyChange {
                variable: variable.name.clone(),
                value: element_text(variable),
            });
        }
    }

    Ok(changes)
}

/// Parse a `LastChange` event document into per-instance changes.
///
/// The input is the already-unescaped value of the `LastChange`
/// variable, an `Event` document with one element per instance and one
/// child per changed variable carrying the value in a `val` attribute.
pub fn parse_last_change(xml: &str) -> Result<Vec<LastChangeEntry>> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| ControlPointError::Parse(format!("invalid LastChange event: {e}")))?;

    if root.name != "Event" {
        return Err(ControlPointError::Parse(format!(
            "expected Event, got {}",
            root.name
        )));
    }

    let mut entries = Vec::new();
    for instance in child_elements(&root) {
        if instance.name != "InstanceID" {
            continue;
        }
        let instance_id = instance
            .attributes
            .get("val")
            .cloned()
            .unwrap_or_else(|| "0".to_string());

        for variable in child_elements(instance) {
            let value = variable.attributes.get("val").cloned().unwrap_or_default();
            entries.push(LastChangeEntry {
                instance_id: instance_id.clone(),
                variable: variable.name.clone(),
                value,
                channel: variable.attributes.get("channel").cloned(),
            });
        }
    }

    Ok(entries)
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    })
}

fn element_text(element: &Element) -> String {
    element
        .get_text()
        .map(|t| t.into_owned())
        .unwrap_or_default()
}
