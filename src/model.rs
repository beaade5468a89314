//! In-memory fault-tree model: the validated form the kernel consumes.
//!
//! The loader (or a test) builds a [`Model`] out of basic events, house
//! events, and gates referencing each other by index; [`Model::validate`]
//! enforces the structural invariants before any analysis may start.

use std::collections::HashMap;

use crate::ccf::CcfGroup;
use crate::error::{Error, Result};
use crate::expression::Expression;

pub type EventId = usize;
pub type GateId = usize;

/// Boolean connective of a model gate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
    /// At least `k` of the arguments.
    AtLeast(u32),
    Xor,
    Not,
    Nand,
    Nor,
    /// Pass-through of the sole argument.
    Null,
    /// `args[0] -> args[1]`.
    Imply,
    /// `args[0] <-> args[1]`.
    Iff,
    Constant(bool),
}

/// What a signed gate argument points at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArgKind {
    Gate,
    Basic,
    House,
}

/// Signed reference to a gate or event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Arg {
    pub kind: ArgKind,
    pub index: usize,
    pub complement: bool,
}

impl Arg {
    pub fn gate(index: GateId) -> Self {
        Arg { kind: ArgKind::Gate, index, complement: false }
    }

    pub fn basic(index: EventId) -> Self {
        Arg { kind: ArgKind::Basic, index, complement: false }
    }

    pub fn house(index: usize) -> Self {
        Arg { kind: ArgKind::House, index, complement: false }
    }

    pub fn negate(mut self) -> Self {
        self.complement = !self.complement;
        self
    }
}

#[derive(Debug, Clone)]
pub struct BasicEvent {
    pub name: String,
    pub expression: Expression,
}

#[derive(Debug, Clone)]
pub struct HouseEvent {
    pub name: String,
    pub state: bool,
}

#[derive(Debug, Clone)]
pub struct GateDef {
    pub name: String,
    pub connective: Connective,
    pub args: Vec<Arg>,
}

/// A parsed, not-yet-validated fault-tree model.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub basic_events: Vec<BasicEvent>,
    pub house_events: Vec<HouseEvent>,
    pub gates: Vec<GateDef>,
    pub ccf_groups: Vec<CcfGroup>,
    pub top: Option<GateId>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_basic_event(&mut self, name: impl Into<String>, expression: Expression) -> EventId {
        self.basic_events.push(BasicEvent { name: name.into(), expression });
        self.basic_events.len() - 1
    }

    pub fn add_house_event(&mut self, name: impl Into<String>, state: bool) -> usize {
        self.house_events.push(HouseEvent { name: name.into(), state });
        self.house_events.len() - 1
    }

    pub fn add_gate(
        &mut self,
        name: impl Into<String>,
        connective: Connective,
        args: Vec<Arg>,
    ) -> GateId {
        self.gates.push(GateDef { name: name.into(), connective, args });
        self.gates.len() - 1
    }

    pub fn set_top(&mut self, gate: GateId) {
        self.top = Some(gate);
    }

    pub fn top_gate(&self) -> Result<GateId> {
        self.top.ok_or_else(|| Error::validity("model has no top gate"))
    }

    /// Structural and semantic validation per the modeling rules.
    ///
    /// Checks names, reference ranges, connective arities, acyclicity,
    /// and that every probability expression is sane on `[0, mission_time]`.
    pub fn validate(&self, mission_time: f64) -> Result<()> {
        let mut names = HashMap::new();
        for (kind, name) in self
            .basic_events
            .iter()
            .map(|e| ("basic event", &e.name))
            .chain(self.house_events.iter().map(|e| ("house event", &e.name)))
            .chain(self.gates.iter().map(|g| ("gate", &g.name)))
        {
            if name.is_empty() {
                return Err(Error::Logic(format!("{kind} with empty name")));
            }
            if let Some(other) = names.insert(name.clone(), kind) {
                return Err(Error::validity_at(
                    format!("duplicate definition (also a {other})"),
                    name.clone(),
                ));
            }
        }

        for event in &self.basic_events {
            event.expression.validate().map_err(|e| match e {
                Error::Validity { message, .. } => Error::validity_at(message, &event.name),
                other => other,
            })?;
            for t in [0.0, mission_time] {
                let p = event.expression.value(t);
                if !(0.0..=1.0).contains(&p) {
                    return Err(Error::validity_at(
                        format!("probability {p} outside [0, 1] at t = {t}"),
                        &event.name,
                    ));
                }
            }
        }

        for gate in &self.gates {
            self.check_gate(gate)?;
        }

        let top = self.top_gate()?;
        self.check_acyclic(top)?;
        Ok(())
    }

    fn check_gate(&self, gate: &GateDef) -> Result<()> {
        let n = gate.args.len();
        let arity_err = |want: &str| {
            Err(Error::validity_at(
                format!("{:?} expects {want} arguments, got {n}", gate.connective),
                &gate.name,
            ))
        };
        match gate.connective {
            Connective::Not | Connective::Null => {
                if n != 1 {
                    return arity_err("exactly 1");
                }
            }
            Connective::Imply | Connective::Iff | Connective::Xor => {
                if n != 2 {
                    return arity_err("exactly 2");
                }
            }
            Connective::AtLeast(k) => {
                if n < 2 {
                    return arity_err("at least 2");
                }
                if k < 1 || k as usize > n {
                    return Err(Error::validity_at(
                        format!("ATLEAST needs 1 <= k <= {n}, got k = {k}"),
                        &gate.name,
                    ));
                }
            }
            Connective::Constant(_) => {
                if n != 0 {
                    return arity_err("no");
                }
            }
            Connective::And | Connective::Or | Connective::Nand | Connective::Nor => {
                if n == 0 {
                    return arity_err("at least 1");
                }
            }
        }
        for arg in &gate.args {
            let bound = match arg.kind {
                ArgKind::Gate => self.gates.len(),
                ArgKind::Basic => self.basic_events.len(),
                ArgKind::House => self.house_events.len(),
            };
            if arg.index >= bound {
                return Err(Error::validity_at(
                    format!("dangling {:?} reference #{}", arg.kind, arg.index),
                    &gate.name,
                ));
            }
        }
        Ok(())
    }

    fn check_acyclic(&self, top: GateId) -> Result<()> {
        #[derive(Copy, Clone, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }
        let mut marks = vec![Mark::White; self.gates.len()];
        // Iterative DFS with an explicit enter/exit stack.
        let mut stack = vec![(top, false)];
        while let Some((gate, exit)) = stack.pop() {
            if exit {
                marks[gate] = Mark::Black;
                continue;
            }
            match marks[gate] {
                Mark::Black => continue,
                Mark::Grey => {
                    return Err(Error::validity_at("cycle through gate", &self.gates[gate].name));
                }
                Mark::White => {}
            }
            marks[gate] = Mark::Grey;
            stack.push((gate, true));
            for arg in &self.gates[gate].args {
                if arg.kind == ArgKind::Gate {
                    if marks[arg.index] == Mark::Grey {
                        return Err(Error::validity_at(
                            "cycle through gate",
                            &self.gates[arg.index].name,
                        ));
                    }
                    if marks[arg.index] == Mark::White {
                        stack.push((arg.index, false));
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluates a gate under a truth assignment to the basic events.
    ///
    /// Used by the equivalence tests to compare the model against its
    /// preprocessed PDAG. House events take their fixed state.
    pub fn eval_gate(&self, gate: GateId, basics: &[bool]) -> bool {
        let def = &self.gates[gate];
        let vals: Vec<bool> = def
            .args
            .iter()
            .map(|arg| {
                let v = match arg.kind {
                    ArgKind::Gate => self.eval_gate(arg.index, basics),
                    ArgKind::Basic => basics[arg.index],
                    ArgKind::House => self.house_events[arg.index].state,
                };
                v != arg.complement
            })
            .collect();
        match def.connective {
            Connective::And => vals.iter().all(|&v| v),
            Connective::Or => vals.iter().any(|&v| v),
            Connective::AtLeast(k) => vals.iter().filter(|&&v| v).count() >= k as usize,
            Connective::Xor => vals.iter().filter(|&&v| v).count() % 2 == 1,
            Connective::Not => !vals[0],
            Connective::Nand => !vals.iter().all(|&v| v),
            Connective::Nor => !vals.iter().any(|&v| v),
            Connective::Null => vals[0],
            Connective::Imply => !vals[0] || vals[1],
            Connective::Iff => vals[0] == vals[1],
            Connective::Constant(b) => b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_event_model(connective: Connective) -> Model {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let b = model.add_basic_event("b", Expression::Constant(0.2));
        let top = model.add_gate("top", connective, vec![Arg::basic(a), Arg::basic(b)]);
        model.set_top(top);
        model
    }

    #[test]
    fn test_validate_ok() {
        assert!(two_event_model(Connective::And).validate(1.0).is_ok());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut model = Model::new();
        let a = model.add_basic_event("x", Expression::Constant(0.1));
        model.add_basic_event("x", Expression::Constant(0.2));
        let top = model.add_gate("top", Connective::Or, vec![Arg::basic(a)]);
        model.set_top(top);
        assert!(matches!(model.validate(1.0), Err(Error::Validity { .. })));
    }

    #[test]
    fn test_atleast_bounds_rejected() {
        let mut model = two_event_model(Connective::AtLeast(3));
        model.gates[0].connective = Connective::AtLeast(3);
        assert!(model.validate(1.0).is_err());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let g1 = model.add_gate("g1", Connective::Or, vec![Arg::basic(a)]);
        let g2 = model.add_gate("g2", Connective::And, vec![Arg::gate(g1), Arg::basic(a)]);
        model.gates[g1].args.push(Arg::gate(g2));
        model.set_top(g2);
        assert!(matches!(model.validate(1.0), Err(Error::Validity { .. })));
    }

    #[test]
    fn test_eval_connectives() {
        for (conn, expect) in [
            (Connective::And, [false, false, false, true]),
            (Connective::Or, [false, true, true, true]),
            (Connective::Xor, [false, true, true, false]),
            (Connective::Nand, [true, true, true, false]),
            (Connective::Nor, [true, false, false, false]),
            (Connective::Imply, [true, true, false, true]),
            (Connective::Iff, [true, false, false, true]),
        ] {
            let model = two_event_model(conn);
            for (i, (a, b)) in [(false, false), (false, true), (true, false), (true, true)]
                .into_iter()
                .enumerate()
            {
                assert_eq!(model.eval_gate(0, &[a, b]), expect[i], "{conn:?} on ({a}, {b})");
            }
        }
    }

    #[test]
    fn test_eval_negated_arg() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let top = model.add_gate("top", Connective::Null, vec![Arg::basic(a).negate()]);
        model.set_top(top);
        assert!(model.eval_gate(top, &[false]));
        assert!(!model.eval_gate(top, &[true]));
    }
}
