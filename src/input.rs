//! Loader for the Open-PSA subset the kernel consumes.
//!
//! A pull parse over `quick_xml` events builds a lightweight element tree
//! with byte offsets, and a second pass resolves definitions into a
//! [`Model`]: fault trees with nested formulas, basic and house events
//! with probability expressions, and CCF groups. Validation failures
//! carry the offset of the offending element.

use std::collections::HashMap;
use std::path::Path;

use log::info;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::ccf::{CcfGroup, CcfModel};
use crate::error::{Error, Result};
use crate::expression::Expression;
use crate::model::{Arg, Connective, Model};

#[derive(Debug)]
struct Element {
    name: String,
    attributes: HashMap<String, String>,
    children: Vec<Element>,
    /// Byte offset in the source document.
    offset: u64,
}

impl Element {
    fn attr(&self, key: &str) -> Result<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| self.invalid(format!("missing attribute `{key}`")))
    }

    fn attr_f64(&self, key: &str) -> Result<f64> {
        let raw = self.attr(key)?;
        raw.parse().map_err(|_| self.invalid(format!("attribute `{key}` is not a number: {raw}")))
    }

    fn invalid(&self, message: impl Into<String>) -> Error {
        Error::validity_at(message, format!("<{}> at byte {}", self.name, self.offset))
    }

    fn child(&self, name: &str) -> Result<&Element> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| self.invalid(format!("missing child <{name}>")))
    }
}

fn element_from(start: &BytesStart<'_>, offset: u64) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = HashMap::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| {
            Error::validity_at(format!("bad attribute: {e}"), format!("<{name}> at byte {offset}"))
        })?;
        attributes.insert(
            String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
            String::from_utf8_lossy(&attribute.value).into_owned(),
        );
    }
    Ok(Element { name, attributes, children: Vec::new(), offset })
}

/// Parses the document into an element tree.
fn parse_tree(reader: &mut Reader<impl std::io::BufRead>) -> Result<Element> {
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    loop {
        let offset = reader.buffer_position() as u64;
        match reader.read_event_into(&mut buf).map_err(Error::Xml)? {
            Event::Start(start) => {
                stack.push(element_from(&start, offset)?);
            }
            Event::Empty(start) => {
                let element = element_from(&start, offset)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    Error::validity_at("unexpected end tag", format!("byte {offset}"))
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Eof => {
                return Err(Error::validity("unexpected end of document"));
            }
            // Text content, comments and declarations carry nothing here.
            _ => {}
        }
        buf.clear();
    }
}

/// Loads and resolves a model from a file path.
pub fn parse_model(path: impl AsRef<Path>) -> Result<Model> {
    let path = path.as_ref();
    let mut reader = Reader::from_file(path).map_err(Error::Xml)?;
    let root = parse_tree(&mut reader)?;
    info!("loaded model document {:?}", path);
    resolve(&root)
}

/// Resolves a model from an in-memory document.
pub fn parse_model_str(document: &str) -> Result<Model> {
    let mut reader = Reader::from_str(document);
    let root = parse_tree(&mut reader)?;
    resolve(&root)
}

struct Resolver {
    model: Model,
    basic_ids: HashMap<String, usize>,
    house_ids: HashMap<String, usize>,
    gate_ids: HashMap<String, usize>,
}

fn resolve(root: &Element) -> Result<Model> {
    if root.name != "opsa-mef" {
        return Err(root.invalid("expected <opsa-mef> document root"));
    }

    let mut resolver = Resolver {
        model: Model::new(),
        basic_ids: HashMap::new(),
        house_ids: HashMap::new(),
        gate_ids: HashMap::new(),
    };

    // Definitions first: events and gate names, so formulas can refer
    // forward.
    for section in &root.children {
        match section.name.as_str() {
            "model-data" => {
                for definition in &section.children {
                    resolver.define_event(definition)?;
                }
            }
            "define-fault-tree" => {
                for definition in &section.children {
                    match definition.name.as_str() {
                        "define-gate" => {
                            let name = definition.attr("name")?.to_string();
                            let id = resolver.model.add_gate(
                                name.clone(),
                                Connective::Null,
                                Vec::new(),
                            );
                            if resolver.gate_ids.insert(name, id).is_some() {
                                return Err(definition.invalid("duplicate gate"));
                            }
                        }
                        "define-basic-event" | "define-house-event" => {
                            resolver.define_event(definition)?;
                        }
                        _ => return Err(definition.invalid("unknown fault-tree definition")),
                    }
                }
            }
            "define-CCF-group" => {}
            _ => return Err(section.invalid("unknown top-level element")),
        }
    }

    // Formula bodies and CCF groups.
    for section in &root.children {
        match section.name.as_str() {
            "define-fault-tree" => {
                let mut top = None;
                for definition in &section.children {
                    if definition.name != "define-gate" {
                        continue;
                    }
                    let id = resolver.gate_ids[definition.attr("name")?];
                    if definition.children.len() != 1 {
                        return Err(definition.invalid("a gate defines exactly one formula"));
                    }
                    let (connective, args) = resolver.formula(&definition.children[0])?;
                    resolver.model.gates[id].connective = connective;
                    resolver.model.gates[id].args = args;
                    // The first gate of the tree is the top event.
                    top.get_or_insert(id);
                }
                if let Some(top) = top {
                    resolver.model.set_top(top);
                }
            }
            "define-CCF-group" => resolver.ccf_group(section)?,
            _ => {}
        }
    }

    Ok(resolver.model)
}

impl Resolver {
    fn define_event(&mut self, definition: &Element) -> Result<()> {
        let name = definition.attr("name")?.to_string();
        match definition.name.as_str() {
            "define-basic-event" => {
                let expression = expression(definition.child_expression()?)?;
                let id = self.model.add_basic_event(name.clone(), expression);
                if self.basic_ids.insert(name, id).is_some() {
                    return Err(definition.invalid("duplicate basic event"));
                }
            }
            "define-house-event" => {
                let state = definition.child("constant")?.attr("value")? == "true";
                let id = self.model.add_house_event(name.clone(), state);
                if self.house_ids.insert(name, id).is_some() {
                    return Err(definition.invalid("duplicate house event"));
                }
            }
            _ => return Err(definition.invalid("unknown model-data definition")),
        }
        Ok(())
    }

    /// One formula element into a connective and resolved arguments;
    /// nested formulas become anonymous gates.
    fn formula(&mut self, element: &Element) -> Result<(Connective, Vec<Arg>)> {
        let connective = match element.name.as_str() {
            "and" => Connective::And,
            "or" => Connective::Or,
            "xor" => Connective::Xor,
            "not" => Connective::Not,
            "nand" => Connective::Nand,
            "nor" => Connective::Nor,
            "iff" => Connective::Iff,
            "imply" => Connective::Imply,
            "null" => Connective::Null,
            "atleast" => {
                let min = element.attr("min")?.parse().map_err(|_| {
                    element.invalid("atleast needs an integer `min`")
                })?;
                Connective::AtLeast(min)
            }
            "constant" => {
                return Ok((Connective::Constant(element.attr("value")? == "true"), Vec::new()));
            }
            other => return Err(element.invalid(format!("unknown connective <{other}>"))),
        };
        let mut args = Vec::with_capacity(element.children.len());
        for child in &element.children {
            args.push(self.argument(child)?);
        }
        Ok((connective, args))
    }

    fn argument(&mut self, element: &Element) -> Result<Arg> {
        match element.name.as_str() {
            "basic-event" => {
                let name = element.attr("name")?;
                let id = *self
                    .basic_ids
                    .get(name)
                    .ok_or_else(|| element.invalid(format!("undefined basic event `{name}`")))?;
                Ok(Arg::basic(id))
            }
            "house-event" => {
                let name = element.attr("name")?;
                let id = *self
                    .house_ids
                    .get(name)
                    .ok_or_else(|| element.invalid(format!("undefined house event `{name}`")))?;
                Ok(Arg::house(id))
            }
            "gate" => {
                let name = element.attr("name")?;
                let id = *self
                    .gate_ids
                    .get(name)
                    .ok_or_else(|| element.invalid(format!("undefined gate `{name}`")))?;
                Ok(Arg::gate(id))
            }
            // An inline formula becomes an anonymous gate.
            _ => {
                let (connective, args) = self.formula(element)?;
                let id = self.model.add_gate(
                    format!("__anonymous_{}", self.model.gates.len()),
                    connective,
                    args,
                );
                Ok(Arg::gate(id))
            }
        }
    }

    fn ccf_group(&mut self, element: &Element) -> Result<()> {
        let name = element.attr("name")?.to_string();
        let model = match element.attr("model")? {
            "beta-factor" => CcfModel::BetaFactor,
            "MGL" => CcfModel::Mgl,
            "alpha-factor" => CcfModel::AlphaFactor,
            "phi-factor" => CcfModel::PhiFactor,
            other => return Err(element.invalid(format!("unknown CCF model `{other}`"))),
        };
        let mut members = Vec::new();
        for member in &element.child("members")?.children {
            let member_name = member.attr("name")?;
            let id = *self.basic_ids.get(member_name).ok_or_else(|| {
                member.invalid(format!("undefined CCF member `{member_name}`"))
            })?;
            members.push(id);
        }
        let distribution = expression(element.child("distribution")?.child_expression()?)?;
        let mut factors = Vec::new();
        for factor in &element.child("factors")?.children {
            factors.push(factor.attr_f64("value")?);
        }
        self.model.ccf_groups.push(CcfGroup {
            name,
            model,
            members,
            factors,
            expression: distribution,
        });
        Ok(())
    }
}

impl Element {
    /// The sole expression child of a definition.
    fn child_expression(&self) -> Result<&Element> {
        match self.children.as_slice() {
            [child] => Ok(child),
            _ => Err(self.invalid("expected exactly one expression child")),
        }
    }
}

fn expression(element: &Element) -> Result<Expression> {
    let expression = match element.name.as_str() {
        "float" => Expression::Constant(element.attr_f64("value")?),
        "exponential" => Expression::Exponential { lambda: element.attr_f64("lambda")? },
        "GLM" => Expression::Glm {
            gamma: element.attr_f64("gamma")?,
            lambda: element.attr_f64("lambda")?,
            mu: element.attr_f64("mu")?,
        },
        "Weibull" => Expression::Weibull {
            shape: element.attr_f64("shape")?,
            scale: element.attr_f64("scale")?,
        },
        "uniform-deviate" => Expression::Uniform {
            min: element.attr_f64("min")?,
            max: element.attr_f64("max")?,
        },
        "normal-deviate" => Expression::Normal {
            mean: element.attr_f64("mean")?,
            sigma: element.attr_f64("sigma")?,
        },
        "lognormal-deviate" => Expression::Lognormal {
            mu: element.attr_f64("mu")?,
            sigma: element.attr_f64("sigma")?,
        },
        "histogram" => {
            let numbers = |key: &str| -> Result<Vec<f64>> {
                element
                    .attr(key)?
                    .split_whitespace()
                    .map(|token| {
                        token.parse().map_err(|_| {
                            element.invalid(format!("bad number `{token}` in `{key}`"))
                        })
                    })
                    .collect()
            };
            Expression::Histogram { boundaries: numbers("boundaries")?, weights: numbers("weights")? }
        }
        other => return Err(element.invalid(format!("unknown expression <{other}>"))),
    };
    expression.validate().map_err(|e| match e {
        Error::Validity { message, .. } => element.invalid(message),
        other => other,
    })?;
    Ok(expression)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
        <opsa-mef>
          <define-fault-tree name="two-trains">
            <define-gate name="top">
              <or>
                <gate name="both"/>
                <not><basic-event name="backup"/></not>
              </or>
            </define-gate>
            <define-gate name="both">
              <and>
                <basic-event name="pump"/>
                <basic-event name="valve"/>
                <house-event name="maintenance"/>
              </and>
            </define-gate>
          </define-fault-tree>
          <model-data>
            <define-basic-event name="pump">
              <exponential lambda="1e-4"/>
            </define-basic-event>
            <define-basic-event name="valve">
              <float value="0.05"/>
            </define-basic-event>
            <define-basic-event name="backup">
              <float value="0.9"/>
            </define-basic-event>
            <define-house-event name="maintenance">
              <constant value="true"/>
            </define-house-event>
          </model-data>
        </opsa-mef>
    "#;

    #[test]
    fn test_parse_small_model() {
        let model = parse_model_str(SMALL).unwrap();
        assert_eq!(model.basic_events.len(), 3);
        assert_eq!(model.house_events.len(), 1);
        // "top", "both", plus the anonymous gate for the inline <not>.
        assert_eq!(model.gates.len(), 3);
        assert_eq!(model.top, Some(0));
        assert_eq!(model.gates[0].name, "top");
        assert_eq!(model.gates[0].connective, Connective::Or);
        assert_eq!(model.gates[0].args.len(), 2);
        assert!(model.validate(1.0).is_ok());
    }

    #[test]
    fn test_undefined_reference_is_validity_error() {
        let document = r#"
            <opsa-mef>
              <define-fault-tree name="ft">
                <define-gate name="top">
                  <or><basic-event name="ghost"/></or>
                </define-gate>
              </define-fault-tree>
            </opsa-mef>
        "#;
        let error = parse_model_str(document).unwrap_err();
        match error {
            Error::Validity { message, location } => {
                assert!(message.contains("ghost"));
                assert!(location.unwrap().contains("byte"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_probability_rejected_at_parse() {
        let document = r#"
            <opsa-mef>
              <model-data>
                <define-basic-event name="a">
                  <float value="1.5"/>
                </define-basic-event>
              </model-data>
            </opsa-mef>
        "#;
        assert!(matches!(parse_model_str(document), Err(Error::Validity { .. })));
    }

    #[test]
    fn test_ccf_group_parsing() {
        let document = r#"
            <opsa-mef>
              <define-fault-tree name="ft">
                <define-gate name="top">
                  <and>
                    <basic-event name="a"/>
                    <basic-event name="b"/>
                  </and>
                </define-gate>
              </define-fault-tree>
              <model-data>
                <define-basic-event name="a"><float value="0.01"/></define-basic-event>
                <define-basic-event name="b"><float value="0.01"/></define-basic-event>
              </model-data>
              <define-CCF-group name="pumps" model="beta-factor">
                <members>
                  <basic-event name="a"/>
                  <basic-event name="b"/>
                </members>
                <distribution><float value="0.01"/></distribution>
                <factors>
                  <factor value="0.1"/>
                </factors>
              </define-CCF-group>
            </opsa-mef>
        "#;
        let model = parse_model_str(document).unwrap();
        assert_eq!(model.ccf_groups.len(), 1);
        assert_eq!(model.ccf_groups[0].model, CcfModel::BetaFactor);
        assert_eq!(model.ccf_groups[0].members, vec![0, 1]);
        assert_eq!(model.ccf_groups[0].factors, vec![0.1]);
    }
}
