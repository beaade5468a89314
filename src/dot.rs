use std::collections::HashSet;

use crate::model::Model;
use crate::pdag::{GateType, Pdag};

/// Renders the PDAG as a DOT document for external layout.
///
/// Gates are boxes labeled with their connective, basic events are
/// circles labeled with their model names, and complemented edges are
/// dashed.
pub fn to_dot(pdag: &Pdag, model: &Model) -> Result<String, std::fmt::Error> {
    use std::fmt::Write as _;

    let mut dot = String::new();
    writeln!(dot, "digraph fault_tree {{")?;
    writeln!(dot, "rankdir=TB;")?;
    writeln!(dot, "node [shape=box];")?;

    let root = pdag.root();
    writeln!(dot, "top [shape=plaintext, label=\"top\"];")?;
    writeln!(
        dot,
        "top -> n{}{};",
        root.index(),
        if root.is_complement() { " [style=dashed]" } else { "" }
    )?;

    let mut variables = HashSet::new();
    for index in pdag.topological_order() {
        let gate = pdag.gate(index);
        let label = match gate.connective {
            GateType::And => "AND".to_string(),
            GateType::Or => "OR".to_string(),
            GateType::AtLeast(k) => format!("ATLEAST({k}/{})", gate.args.len()),
            GateType::Xor => "XOR".to_string(),
        };
        writeln!(dot, "n{index} [label=\"{label}\"];")?;
        for arg in &gate.args {
            if pdag.is_variable(arg.index()) {
                variables.insert(arg.index());
            }
            writeln!(
                dot,
                "n{index} -> n{}{};",
                arg.index(),
                if arg.is_complement() { " [style=dashed]" } else { "" }
            )?;
        }
    }

    if pdag.is_variable(root.index()) {
        variables.insert(root.index());
    }
    writeln!(dot, "{{ rank=sink")?;
    for &index in &variables {
        let name = &model.basic_events[pdag.event_of(index) as usize].name;
        writeln!(dot, "n{index} [shape=circle, label=\"{name}\"];")?;
    }
    writeln!(dot, "}}")?;

    writeln!(dot, "}}")?;
    Ok(dot)
}
