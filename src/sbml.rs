//! SBML subset importer.
//!
//! Translates an SBML document into the native [`ModelDocument`] form:
//! every kinetic law becomes a `general` propensity whose rate string is
//! the stringified MathML with known parameter names rewritten to the
//! internal parameter prefix. The rate strings then flow through the same
//! expression parser as hand-written models, so both follow identical
//! semantics.
//!
//! Out-of-subset constructs (events, extra compartments, non-assignment
//! rules, reserved-name collisions) warn and are skipped.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::document::{ModelDocument, ReactionEntry, RuleEntry};
use crate::error::{ModelError, Result};

const RESERVED_NAMES: [&str; 2] = ["volume", "t"];

pub fn load_sbml_file(path: impl AsRef<Path>) -> Result<ModelDocument> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ModelError::Xml(format!("reading {}: {}", path.display(), e)))?;
    load_sbml_str(&text)
}

pub fn load_sbml_str(text: &str) -> Result<ModelDocument> {
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| ModelError::Xml(format!("parsing SBML document: {}", e)))?;
    let root = doc.root_element();
    let model = child(&root, "model")
        .ok_or_else(|| ModelError::Xml("SBML document has no <model> element".to_string()))?;

    let mut document = ModelDocument::default();
    let mut param_names: HashSet<String> = HashSet::new();

    let compartments = list(&model, "listOfCompartments", "compartment");
    if compartments.len() > 1 {
        log::warn!(
            "SBML model declares {} compartments; only a single scalar cell volume is supported",
            compartments.len()
        );
    }

    // Global parameters, then every kinetic law's local parameters, merged
    // into one flat namespace. Collisions take the last value silently.
    for node in list(&model, "listOfParameters", "parameter") {
        import_parameter(&node, &mut document, &mut param_names);
    }
    for reaction in list(&model, "listOfReactions", "reaction") {
        if let Some(law) = child(&reaction, "kineticLaw") {
            for list_name in ["listOfParameters", "listOfLocalParameters"] {
                for item_name in ["parameter", "localParameter"] {
                    for node in list(&law, list_name, item_name) {
                        import_parameter(&node, &mut document, &mut param_names);
                    }
                }
            }
        }
    }

    for node in list(&model, "listOfSpecies", "species") {
        let Some(id) = ident(&node) else {
            log::warn!("SBML species without an id, skipping");
            continue;
        };
        if RESERVED_NAMES.contains(&id) {
            log::warn!("SBML species '{}' collides with a reserved name, skipping", id);
            continue;
        }
        let amount = node
            .attribute("initialAmount")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .or_else(|| {
                node.attribute("initialConcentration")
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite())
            })
            .unwrap_or(0.0);
        document.species.push((id.to_string(), amount));
    }

    for reaction in list(&model, "listOfReactions", "reaction") {
        let id = reaction.attribute("id").unwrap_or("(unnamed)");
        if reaction
            .attribute("reversible")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            log::warn!(
                "SBML reaction '{}' is reversible; stochastic semantics treat it as irreversible",
                id
            );
        }
        let Some(law) = child(&reaction, "kineticLaw") else {
            log::warn!("SBML reaction '{}' has no kinetic law, skipping", id);
            continue;
        };
        let Some(math) = child(&law, "math") else {
            log::warn!("SBML reaction '{}' kinetic law has no math, skipping", id);
            continue;
        };
        let rate = mathml_to_string(&math, &param_names)?;

        let reactants = species_references(&reaction, "listOfReactants", id);
        let products = species_references(&reaction, "listOfProducts", id);
        let text = format!("{} -- {}", reactants.join(" + "), products.join(" + "));

        document.reactions.push(ReactionEntry {
            text,
            after: None,
            propensity_type: "general".to_string(),
            propensity_fields: HashMap::from([("rate".to_string(), rate)]),
            delay_type: "none".to_string(),
            delay_fields: HashMap::new(),
        });
    }

    if let Some(rules) = child(&model, "listOfRules") {
        for node in rules.children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "assignmentRule" => {
                    let Some(variable) = node.attribute("variable") else {
                        log::warn!("SBML assignment rule without a variable, skipping");
                        continue;
                    };
                    let Some(math) = child(&node, "math") else {
                        log::warn!("SBML assignment rule for '{}' has no math, skipping", variable);
                        continue;
                    };
                    let rhs = mathml_to_string(&math, &param_names)?;
                    let lhs = if param_names.contains(variable) {
                        format!("_{}", variable)
                    } else {
                        variable.to_string()
                    };
                    document.rules.push(RuleEntry {
                        rule_type: "assignment".to_string(),
                        frequency: "repeated".to_string(),
                        equation: format!("{} = {}", lhs, rhs),
                    });
                }
                other => log::warn!("SBML rule kind '{}' is not supported, skipping", other),
            }
        }
    }

    if child(&model, "listOfEvents").is_some() {
        log::warn!("SBML events are not supported, skipping");
    }

    Ok(document)
}

fn import_parameter(
    node: &roxmltree::Node,
    document: &mut ModelDocument,
    param_names: &mut HashSet<String>,
) {
    let Some(id) = ident(node) else {
        log::warn!("SBML parameter without an id, skipping");
        return;
    };
    if RESERVED_NAMES.contains(&id) {
        log::warn!("SBML parameter '{}' collides with a reserved name, skipping", id);
        return;
    }
    let value = node
        .attribute("value")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0);
    document.parameters.push((id.to_string(), value));
    param_names.insert(id.to_string());
}

/// One species name per unit of stoichiometry, ready for the native
/// `"a + a + b -- c"` reaction grammar.
fn species_references<'a>(
    reaction: &roxmltree::Node<'a, '_>,
    list_name: &str,
    reaction_id: &str,
) -> Vec<&'a str> {
    let mut names = Vec::new();
    for node in list(reaction, list_name, "speciesReference") {
        let Some(species) = node.attribute("species") else {
            continue;
        };
        let stoich = node
            .attribute("stoichiometry")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.0);
        let count = stoich.round();
        if (stoich - count).abs() > 1e-9 {
            log::warn!(
                "SBML reaction '{}' has non-integer stoichiometry {} for '{}', rounding",
                reaction_id,
                stoich,
                species
            );
        }
        for _ in 0..count.max(0.0) as i64 {
            names.push(species);
        }
    }
    names
}

fn ident<'a>(node: &roxmltree::Node<'a, '_>) -> Option<&'a str> {
    node.attribute("id").or_else(|| node.attribute("name"))
}

fn child<'a, 'i>(node: &roxmltree::Node<'a, 'i>, name: &str) -> Option<roxmltree::Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn list<'a, 'i>(
    node: &roxmltree::Node<'a, 'i>,
    list_name: &str,
    item_name: &str,
) -> Vec<roxmltree::Node<'a, 'i>> {
    child(node, list_name)
        .map(|l| {
            l.children()
                .filter(|n| n.is_element() && n.tag_name().name() == item_name)
                .collect()
        })
        .unwrap_or_default()
}

/// Stringify MathML content markup into the native rate grammar.
/// Identifiers naming known parameters get the internal `_` prefix here,
/// so the downstream parser classifies them correctly.
fn mathml_to_string(math: &roxmltree::Node, params: &HashSet<String>) -> Result<String> {
    let body = math
        .children()
        .find(|n| n.is_element())
        .ok_or_else(|| ModelError::Xml("empty <math> element".to_string()))?;
    walk_mathml(&body, params)
}

fn walk_mathml(node: &roxmltree::Node, params: &HashSet<String>) -> Result<String> {
    let unsupported = |what: &str| {
        ModelError::unparseable("<kinetic law math>", format!("unsupported MathML: {}", what))
    };
    match node.tag_name().name() {
        "apply" => {
            let mut elements = node.children().filter(|n| n.is_element());
            let op = elements.next().ok_or_else(|| unsupported("empty apply"))?;
            let args: Vec<String> = elements
                .filter(|n| n.tag_name().name() != "logbase")
                .map(|n| walk_mathml(&n, params))
                .collect::<Result<_>>()?;
            let arity = |n: usize| -> Result<()> {
                if args.len() != n {
                    return Err(unsupported(&format!(
                        "{} expects {} operands",
                        op.tag_name().name(),
                        n
                    )));
                }
                Ok(())
            };
            match op.tag_name().name() {
                "plus" => Ok(if args.is_empty() {
                    "0".to_string()
                } else {
                    format!("({})", args.join(" + "))
                }),
                "minus" => match args.len() {
                    1 => Ok(format!("(-{})", args[0])),
                    2 => Ok(format!("({} - {})", args[0], args[1])),
                    _ => Err(unsupported("minus expects one or two operands")),
                },
                "times" => Ok(if args.is_empty() {
                    "1".to_string()
                } else {
                    format!("({})", args.join(" * "))
                }),
                "divide" => {
                    arity(2)?;
                    Ok(format!("({} / {})", args[0], args[1]))
                }
                "power" => {
                    arity(2)?;
                    Ok(format!("({} ^ {})", args[0], args[1]))
                }
                "exp" => {
                    arity(1)?;
                    Ok(format!("exp({})", args[0]))
                }
                "ln" => {
                    arity(1)?;
                    Ok(format!("log({})", args[0]))
                }
                "log" => {
                    arity(1)?;
                    // MathML log defaults to base 10; an explicit logbase
                    // rescales the same way.
                    let base = match child(node, "logbase") {
                        Some(logbase) => {
                            let inner = logbase
                                .children()
                                .find(|n| n.is_element())
                                .ok_or_else(|| unsupported("empty logbase"))?;
                            walk_mathml(&inner, params)?
                        }
                        None => "10".to_string(),
                    };
                    Ok(format!("(log({}) / log({}))", args[0], base))
                }
                "abs" => {
                    arity(1)?;
                    Ok(format!("abs({})", args[0]))
                }
                "max" => Ok(format!("Max({})", args.join(", "))),
                "min" => Ok(format!("Min({})", args.join(", "))),
                other => Err(unsupported(other)),
            }
        }
        "ci" => {
            let name = node.text().unwrap_or("").trim();
            if name.is_empty() {
                return Err(unsupported("empty <ci>"));
            }
            if params.contains(name) {
                Ok(format!("_{}", name))
            } else {
                Ok(name.to_string())
            }
        }
        "cn" => stringify_cn(node, &unsupported),
        "csymbol" => {
            let url = node.attribute("definitionURL").unwrap_or("");
            if url.ends_with("/time") || url.contains("#time") {
                Ok("t".to_string())
            } else {
                Err(unsupported("csymbol"))
            }
        }
        "pi" => Ok("pi".to_string()),
        "exponentiale" => Ok("e".to_string()),
        other => Err(unsupported(other)),
    }
}

fn stringify_cn(
    node: &roxmltree::Node,
    unsupported: &dyn Fn(&str) -> ModelError,
) -> Result<String> {
    let pieces: Vec<&str> = node
        .children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    match node.attribute("type") {
        Some("e-notation") => {
            if pieces.len() != 2 {
                return Err(unsupported("e-notation <cn>"));
            }
            Ok(format!("{}e{}", pieces[0], pieces[1]))
        }
        Some("rational") => {
            if pieces.len() != 2 {
                return Err(unsupported("rational <cn>"));
            }
            Ok(format!("({} / {})", pieces[0], pieces[1]))
        }
        _ => {
            let text = pieces.first().copied().unwrap_or("");
            if text.parse::<f64>().is_err() {
                return Err(unsupported("non-numeric <cn>"));
            }
            Ok(text.to_string())
        }
    }
}
