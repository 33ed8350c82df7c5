//! The declarative model document.
//!
//! [`ModelDocument`] is the logical schema shared by the native XML format
//! and the SBML importer: both produce one before the assembler runs, so a
//! model loads identically whichever format it came from.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{ModelError, Result};

#[derive(Clone, Debug, Default)]
pub struct ModelDocument {
    pub reactions: Vec<ReactionEntry>,
    pub rules: Vec<RuleEntry>,
    pub parameters: Vec<(String, f64)>,
    pub species: Vec<(String, f64)>,
}

/// One `<reaction>` element: the immediate stoichiometry text, the
/// optional delayed stoichiometry text, and the typed attribute sets of
/// its propensity and delay children.
#[derive(Clone, Debug)]
pub struct ReactionEntry {
    pub text: String,
    pub after: Option<String>,
    pub propensity_type: String,
    pub propensity_fields: HashMap<String, String>,
    pub delay_type: String,
    pub delay_fields: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct RuleEntry {
    pub rule_type: String,
    pub frequency: String,
    pub equation: String,
}

impl ModelDocument {
    pub fn from_xml_file(path: impl AsRef<Path>) -> Result<ModelDocument> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Xml(format!("reading {}: {}", path.display(), e)))?;
        Self::from_xml_str(&text)
    }

    pub fn from_xml_str(text: &str) -> Result<ModelDocument> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|e| ModelError::Xml(format!("parsing model document: {}", e)))?;
        let root = doc.root_element();
        if root.tag_name().name() != "model" {
            return Err(ModelError::Xml(format!(
                "expected <model> root element, found <{}>",
                root.tag_name().name()
            )));
        }

        let mut document = ModelDocument::default();
        for node in root.children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "reaction" => document.reactions.push(parse_reaction_element(&node)?),
                "rule" => document.rules.push(parse_rule_element(&node)?),
                "parameter" => document.parameters.push(parse_value_element(&node)?),
                "species" => document.species.push(parse_value_element(&node)?),
                other => log::warn!("ignoring unrecognized element <{}>", other),
            }
        }
        Ok(document)
    }
}

fn parse_reaction_element(node: &roxmltree::Node) -> Result<ReactionEntry> {
    let text = node
        .attribute("text")
        .ok_or_else(|| {
            ModelError::MalformedReaction("reaction element is missing 'text'".to_string())
        })?
        .to_string();
    let after = node.attribute("after").map(String::from);

    let mut propensity = None;
    let mut delay = None;
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "propensity" => {
                if propensity.replace(typed_fields(&child, "propensity")?).is_some() {
                    return Err(ModelError::MalformedReaction(format!(
                        "reaction '{}' has more than one propensity",
                        text
                    )));
                }
            }
            "delay" => {
                if delay.replace(typed_fields(&child, "delay")?).is_some() {
                    return Err(ModelError::MalformedReaction(format!(
                        "reaction '{}' has more than one delay",
                        text
                    )));
                }
            }
            other => log::warn!("ignoring element <{}> inside reaction '{}'", other, text),
        }
    }
    let (propensity_type, propensity_fields) = propensity.ok_or_else(|| {
        ModelError::MalformedReaction(format!("reaction '{}' has no propensity", text))
    })?;
    let (delay_type, delay_fields) = delay.ok_or_else(|| {
        ModelError::MalformedReaction(format!("reaction '{}' has no delay", text))
    })?;

    Ok(ReactionEntry {
        text,
        after,
        propensity_type,
        propensity_fields,
        delay_type,
        delay_fields,
    })
}

/// Pull the `type` attribute plus all remaining attributes as a field map.
fn typed_fields(
    node: &roxmltree::Node,
    what: &str,
) -> Result<(String, HashMap<String, String>)> {
    let kind = node
        .attribute("type")
        .ok_or_else(|| {
            ModelError::MalformedReaction(format!("{} element is missing 'type'", what))
        })?
        .to_string();
    let fields = node
        .attributes()
        .filter(|a| a.name() != "type")
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect();
    Ok((kind, fields))
}

fn parse_rule_element(node: &roxmltree::Node) -> Result<RuleEntry> {
    let rule_type = node
        .attribute("type")
        .ok_or_else(|| ModelError::MalformedReaction("rule element is missing 'type'".to_string()))?
        .to_string();
    let frequency = node.attribute("frequency").unwrap_or("repeated").to_string();
    let equation = node
        .attribute("equation")
        .ok_or_else(|| {
            ModelError::MalformedReaction("rule element is missing 'equation'".to_string())
        })?
        .to_string();
    Ok(RuleEntry {
        rule_type,
        frequency,
        equation,
    })
}

fn parse_value_element(node: &roxmltree::Node) -> Result<(String, f64)> {
    let what = node.tag_name().name();
    let name = node
        .attribute("name")
        .ok_or_else(|| ModelError::Xml(format!("{} element is missing 'name'", what)))?;
    let value = node
        .attribute("value")
        .ok_or_else(|| ModelError::Xml(format!("{} '{}' is missing 'value'", what, name)))?;
    let value: f64 = value.trim().parse().map_err(|_| {
        ModelError::Xml(format!("{} '{}' has non-numeric value '{}'", what, name, value))
    })?;
    Ok((name.to_string(), value))
}

/// Parse one side-separated reaction string, `"reactants -- products"`.
/// Species are `+`-separated; repeating a name repeats its unit
/// stoichiometry; either side may be empty.
pub(crate) fn parse_reaction_text(text: &str) -> Result<(Vec<String>, Vec<String>)> {
    let mut sides = text.split("--");
    let reactants = sides.next().unwrap_or("");
    let products = sides.next().ok_or_else(|| {
        ModelError::MalformedReaction(format!(
            "reaction text '{}' has no '--' separator",
            text
        ))
    })?;
    if sides.next().is_some() {
        return Err(ModelError::MalformedReaction(format!(
            "reaction text '{}' has more than one '--' separator",
            text
        )));
    }
    Ok((split_side(reactants), split_side(products)))
}

fn split_side(side: &str) -> Vec<String> {
    side.split('+')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
