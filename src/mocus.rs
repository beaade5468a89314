//! MOCUS-style top-down expansion of the PDAG into a ZBDD of products.
//!
//! Works directly on the preprocessed graph, where negation survives only
//! on literals: OR gates become unions, AND gates set products, ATLEAST
//! gates expand k-out-of-n. The intermediate family is minimized after
//! every gate, and the product-size limit applies on every product step,
//! so the result is the minimal family (an under-approximation when the
//! limit truncates).

use std::collections::HashMap;

use log::debug;

use crate::error::{Error, Result};
use crate::guard::Guard;
use crate::order::VariableOrder;
use crate::pdag::{GateType, Pdag};
use crate::reference::Ref;
use crate::zbdd::{literal, Zbdd};

pub fn analyze(
    zbdd: &Zbdd,
    pdag: &Pdag,
    order: &VariableOrder,
    limit: u32,
    guard: &Guard,
) -> Result<Ref> {
    let leaf = |arg: Ref| -> Result<Option<Ref>> {
        let index = arg.index();
        if pdag.is_constant(index) {
            Ok(Some(if arg.is_complement() { zbdd.empty() } else { zbdd.base() }))
        } else if pdag.is_variable(index) {
            let position = order
                .position(index)
                .ok_or_else(|| Error::Logic(format!("unordered variable {index}")))?;
            Ok(Some(zbdd.product_of([literal(position, arg.is_complement())])))
        } else {
            Ok(None)
        }
    };

    let mut gates: HashMap<u32, Ref> = HashMap::new();
    for gate_index in pdag.topological_order() {
        guard.check()?;
        let gate = pdag.gate(gate_index);
        let mut args = Vec::with_capacity(gate.args.len());
        for &arg in &gate.args {
            let family = match leaf(arg)? {
                Some(family) => family,
                None => {
                    if arg.is_complement() {
                        return Err(Error::Logic(format!(
                            "gate-level complement on {arg} reached the expansion"
                        )));
                    }
                    gates[&arg.index()]
                }
            };
            args.push(family);
        }

        let expanded = match gate.connective {
            GateType::Or => args.iter().fold(zbdd.empty(), |acc, &a| zbdd.union(acc, a)),
            GateType::And => args.iter().fold(zbdd.base(), |acc, &a| zbdd.product(acc, a, limit)),
            GateType::AtLeast(k) => zbdd.atleast_of(&args, k as usize, limit),
            GateType::Xor => {
                return Err(Error::Logic("XOR survived preprocessing".into()));
            }
        };
        let minimal = zbdd.minimize(expanded);
        debug!(
            "expanded gate {gate_index}: {} products, {} nodes",
            zbdd.count(minimal),
            zbdd.size(minimal)
        );
        gates.insert(gate_index, minimal);
    }

    let root = pdag.root();
    match leaf(root)? {
        Some(family) => Ok(family),
        None => {
            if root.is_complement() {
                return Err(Error::Logic("complemented root reached the expansion".into()));
            }
            Ok(gates[&root.index()])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::model::{Arg, Connective, Model};
    use crate::preprocess::{preprocess, PreprocessOptions};
    use crate::zbdd::NO_LIMIT;

    fn run(model: &Model, limit: u32) -> (Zbdd, Pdag, VariableOrder, Ref) {
        let mut pdag = Pdag::from_model(model).unwrap();
        preprocess(&mut pdag, &PreprocessOptions::default(), &Guard::new()).unwrap();
        let order = VariableOrder::from_pdag(&pdag);
        let zbdd = Zbdd::default();
        let root = analyze(&zbdd, &pdag, &order, limit, &Guard::new()).unwrap();
        (zbdd, pdag, order, root)
    }

    fn products(zbdd: &Zbdd, root: Ref) -> Vec<Vec<u32>> {
        let mut all: Vec<Vec<u32>> = zbdd.products(root).collect();
        all.sort();
        all
    }

    #[test]
    fn test_and_gate() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let b = model.add_basic_event("b", Expression::Constant(0.1));
        let top = model.add_gate("top", Connective::And, vec![Arg::basic(a), Arg::basic(b)]);
        model.set_top(top);
        let (zbdd, _, _, root) = run(&model, NO_LIMIT);
        assert_eq!(zbdd.count(root), 1);
        assert_eq!(products(&zbdd, root)[0].len(), 2);
    }

    #[test]
    fn test_or_of_ands_minimal() {
        // (a & b) | a == a
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let b = model.add_basic_event("b", Expression::Constant(0.1));
        let inner = model.add_gate("inner", Connective::And, vec![Arg::basic(a), Arg::basic(b)]);
        let top = model.add_gate("top", Connective::Or, vec![Arg::gate(inner), Arg::basic(a)]);
        model.set_top(top);
        let (zbdd, _, _, root) = run(&model, NO_LIMIT);
        assert_eq!(zbdd.count(root), 1);
        assert_eq!(products(&zbdd, root)[0].len(), 1);
    }

    #[test]
    fn test_atleast_two_of_three() {
        let mut model = Model::new();
        let ids: Vec<_> =
            (0..3).map(|i| model.add_basic_event(format!("e{i}"), Expression::Constant(0.1))).collect();
        let top = model.add_gate(
            "top",
            Connective::AtLeast(2),
            ids.iter().map(|&i| Arg::basic(i)).collect(),
        );
        model.set_top(top);
        let (zbdd, _, _, root) = run(&model, NO_LIMIT);
        assert_eq!(zbdd.count(root), 3);
        assert!(products(&zbdd, root).iter().all(|p| p.len() == 2));
    }

    #[test]
    fn test_limit_order_truncates() {
        let mut model = Model::new();
        let ids: Vec<_> =
            (0..3).map(|i| model.add_basic_event(format!("e{i}"), Expression::Constant(0.1))).collect();
        let and = model.add_gate(
            "and",
            Connective::And,
            ids.iter().map(|&i| Arg::basic(i)).collect(),
        );
        let solo = model.add_basic_event("solo", Expression::Constant(0.1));
        let top = model.add_gate("top", Connective::Or, vec![Arg::gate(and), Arg::basic(solo)]);
        model.set_top(top);
        let (zbdd, _, _, root) = run(&model, 2);
        // The 3-literal product is cut; the singleton survives.
        assert_eq!(zbdd.count(root), 1);
        assert!(zbdd.was_truncated());
    }

    #[test]
    fn test_negated_literal_product() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.3));
        let b = model.add_basic_event("b", Expression::Constant(0.2));
        let top =
            model.add_gate("top", Connective::And, vec![Arg::basic(a).negate(), Arg::basic(b)]);
        model.set_top(top);
        let (zbdd, _, _, root) = run(&model, NO_LIMIT);
        let all = products(&zbdd, root);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].len(), 2);
        // One positive and one negative literal.
        let negs = all[0].iter().filter(|&&v| v % 2 == 1).count();
        assert_eq!(negs, 1);
    }

    #[test]
    fn test_cancellation() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let top = model.add_gate("top", Connective::Null, vec![Arg::basic(a)]);
        model.set_top(top);
        let mut pdag = Pdag::from_model(&model).unwrap();
        preprocess(&mut pdag, &PreprocessOptions::default(), &Guard::new()).unwrap();
        let order = VariableOrder::from_pdag(&pdag);
        let zbdd = Zbdd::default();
        let guard = Guard::new();
        guard.cancel();
        // A literal root never polls the guard, so use a gate-bearing model.
        let mut model2 = Model::new();
        let x = model2.add_basic_event("x", Expression::Constant(0.1));
        let y = model2.add_basic_event("y", Expression::Constant(0.1));
        let top2 = model2.add_gate("top", Connective::And, vec![Arg::basic(x), Arg::basic(y)]);
        model2.set_top(top2);
        let mut pdag2 = Pdag::from_model(&model2).unwrap();
        preprocess(&mut pdag2, &PreprocessOptions::default(), &Guard::new()).unwrap();
        let order2 = VariableOrder::from_pdag(&pdag2);
        assert!(matches!(
            analyze(&zbdd, &pdag2, &order2, NO_LIMIT, &guard),
            Err(Error::Cancelled)
        ));
        // The single-literal tree is immune, by construction.
        let _ = analyze(&zbdd, &pdag, &order, NO_LIMIT, &Guard::new()).unwrap();
    }
}
