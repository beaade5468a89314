//! Semantics-preserving rewrite passes over the PDAG.
//!
//! The passes run in a fixpoint loop: constant propagation, literal
//! sinking (De Morgan), coalescing, Boolean optimization, structural
//! hashing, then one bounded distribution round and module detection.
//! Every pass reports whether it changed the graph; the loop stops when
//! nothing fires or the root collapses to a constant. Cancellation is
//! polled between passes.

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::error::Result;
use crate::guard::Guard;
use crate::pdag::{GateType, Pdag};
use crate::reference::Ref;

/// Knobs for the heuristic passes; defaults match the test expectations.
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    /// Skip distribution on gates with more arguments than this.
    pub distribution_bound: usize,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self { distribution_bound: 8 }
    }
}

/// Runs all passes to fixpoint and freezes the graph.
pub fn preprocess(pdag: &mut Pdag, options: &PreprocessOptions, guard: &Guard) -> Result<()> {
    const MAX_ROUNDS: usize = 8;

    for round in 0..MAX_ROUNDS {
        let mut changed = false;
        changed |= propagate_constants(pdag);
        guard.check()?;
        if root_is_constant(pdag) {
            break;
        }
        changed |= sink_literals(pdag);
        guard.check()?;
        changed |= coalesce(pdag);
        guard.check()?;
        changed |= optimize(pdag);
        guard.check()?;
        changed |= structural_hash(pdag);
        guard.check()?;
        debug!("preprocessing round {round}: changed = {changed}");
        if !changed {
            break;
        }
    }

    if !root_is_constant(pdag) {
        if distribute(pdag, options.distribution_bound) {
            // Factoring exposes new sharing; one cleanup round.
            propagate_constants(pdag);
            coalesce(pdag);
            optimize(pdag);
            structural_hash(pdag);
        }
        guard.check()?;
        detect_modules(pdag);
    }

    pdag.freeze()?;
    info!(
        "preprocessed PDAG: {} gates, {} variables in support, coherent = {}",
        pdag.topological_order().len(),
        pdag.support(pdag.root()).len(),
        pdag.is_coherent()
    );
    Ok(())
}

fn root_is_constant(pdag: &Pdag) -> bool {
    pdag.is_constant(pdag.root().index())
}

/// Resolves an argument through an index-rewrite map, preserving the sign.
fn resolve(map: &HashMap<u32, Ref>, arg: Ref) -> Ref {
    let base = map.get(&arg.index()).copied().unwrap_or_else(|| arg.regular());
    if arg.is_complement() {
        -base
    } else {
        base
    }
}

/// Folds constant arguments per connective identity, bottom-up.
fn propagate_constants(pdag: &mut Pdag) -> bool {
    let order = pdag.topological_order();
    let mut map: HashMap<u32, Ref> = HashMap::new();
    let mut changed = false;

    for index in order {
        let gate = pdag.gate(index).clone();
        let args: Vec<Ref> = gate.args.iter().map(|&a| resolve(&map, a)).collect();

        let result = match gate.connective {
            GateType::And | GateType::Or => {
                // For OR, dualize: drop the neutral element, fold on the
                // absorbing one.
                let (neutral, absorbing) = match gate.connective {
                    GateType::And => (pdag.true_ref(), pdag.false_ref()),
                    _ => (pdag.false_ref(), pdag.true_ref()),
                };
                if args.contains(&absorbing) {
                    absorbing
                } else {
                    let kept: Vec<Ref> = args.iter().copied().filter(|&a| a != neutral).collect();
                    match kept.len() {
                        0 => neutral,
                        1 => kept[0],
                        _ if kept.len() == gate.args.len()
                            && kept.iter().zip(&gate.args).all(|(a, b)| a == b) =>
                        {
                            Ref::positive(index)
                        }
                        _ => pdag.new_gate(gate.connective, kept),
                    }
                }
            }
            GateType::AtLeast(original_k) => {
                let mut k = original_k as i64;
                let mut kept = Vec::with_capacity(args.len());
                for a in args {
                    if a == pdag.true_ref() {
                        k -= 1;
                    } else if a != pdag.false_ref() {
                        kept.push(a);
                    }
                }
                if k <= 0 {
                    pdag.true_ref()
                } else if k as usize > kept.len() {
                    pdag.false_ref()
                } else if kept.len() == 1 {
                    kept[0]
                } else if k == 1 {
                    pdag.new_gate(GateType::Or, kept)
                } else if k as usize == kept.len() {
                    pdag.new_gate(GateType::And, kept)
                } else if k == original_k as i64
                    && kept.len() == gate.args.len()
                    && kept.iter().zip(&gate.args).all(|(a, b)| a == b)
                {
                    Ref::positive(index)
                } else {
                    pdag.new_gate(GateType::AtLeast(k as u32), kept)
                }
            }
            GateType::Xor => {
                let (a, b) = (args[0], args[1]);
                if a == pdag.true_ref() {
                    -b
                } else if a == pdag.false_ref() {
                    b
                } else if b == pdag.true_ref() {
                    -a
                } else if b == pdag.false_ref() {
                    a
                } else if a == b {
                    pdag.false_ref()
                } else if a == -b {
                    pdag.true_ref()
                } else if args == gate.args {
                    Ref::positive(index)
                } else {
                    pdag.new_gate(GateType::Xor, args)
                }
            }
        };

        if result != Ref::positive(index) {
            changed = true;
        }
        map.insert(index, result);
    }

    let new_root = resolve(&map, pdag.root());
    if new_root != pdag.root() {
        pdag.set_root(new_root);
        changed = true;
    }
    changed
}

/// Pushes complements down to the literals via De Morgan and expands XOR,
/// so interior gates are AND/OR/ATLEAST referenced positively.
fn sink_literals(pdag: &mut Pdag) -> bool {
    let order = pdag.topological_order();

    // Fast path: nothing to sink.
    let needs_work = order.iter().any(|&i| {
        let gate = pdag.gate(i);
        gate.connective == GateType::Xor
            || gate.args.iter().any(|a| a.is_complement() && pdag.is_gate(a.index()))
    }) || (pdag.root().is_complement() && pdag.is_gate(pdag.root().index()));
    if !needs_work {
        return false;
    }

    // Which polarities each gate is demanded in, parents first.
    let root = pdag.root();
    let mut needed: HashSet<(u32, bool)> = HashSet::new();
    if pdag.is_gate(root.index()) {
        needed.insert((root.index(), root.is_complement()));
    }
    for &index in order.iter().rev() {
        for polarity in [false, true] {
            if !needed.contains(&(index, polarity)) {
                continue;
            }
            let gate = pdag.gate(index);
            for arg in &gate.args {
                if !pdag.is_gate(arg.index()) {
                    continue;
                }
                match gate.connective {
                    // De Morgan: a negated gate negates every argument.
                    GateType::And | GateType::Or | GateType::AtLeast(_) => {
                        needed.insert((arg.index(), arg.is_complement() ^ polarity));
                    }
                    // XOR expands into (a & ~b) | (~a & b): both
                    // polarities of both arguments are demanded.
                    GateType::Xor => {
                        needed.insert((arg.index(), false));
                        needed.insert((arg.index(), true));
                    }
                }
            }
        }
    }

    // Rebuild bottom-up, one new gate per demanded polarity.
    let mut map: HashMap<(u32, bool), Ref> = HashMap::new();
    for &index in &order {
        for polarity in [false, true] {
            if !needed.contains(&(index, polarity)) {
                continue;
            }
            let gate = pdag.gate(index).clone();
            let n = gate.args.len() as u32;

            let arg_of = |pdag: &Pdag, map: &HashMap<(u32, bool), Ref>, arg: Ref, negate: bool| {
                let wanted = arg.is_complement() ^ negate;
                if pdag.is_gate(arg.index()) {
                    map[&(arg.index(), wanted)]
                } else if wanted {
                    -arg.regular()
                } else {
                    arg.regular()
                }
            };

            let built = match (gate.connective, polarity) {
                (GateType::And, false) | (GateType::Or, true) => {
                    let args: Vec<Ref> =
                        gate.args.iter().map(|&a| arg_of(pdag, &map, a, polarity)).collect();
                    pdag.new_gate(GateType::And, args)
                }
                (GateType::Or, false) | (GateType::And, true) => {
                    let args: Vec<Ref> =
                        gate.args.iter().map(|&a| arg_of(pdag, &map, a, polarity)).collect();
                    pdag.new_gate(GateType::Or, args)
                }
                (GateType::AtLeast(k), false) => {
                    let args: Vec<Ref> =
                        gate.args.iter().map(|&a| arg_of(pdag, &map, a, false)).collect();
                    pdag.new_gate(GateType::AtLeast(k), args)
                }
                // ~ATLEAST(k; xs) == ATLEAST(n - k + 1; ~xs)
                (GateType::AtLeast(k), true) => {
                    let args: Vec<Ref> =
                        gate.args.iter().map(|&a| arg_of(pdag, &map, a, true)).collect();
                    pdag.new_gate(GateType::AtLeast(n - k + 1), args)
                }
                // a ^ b == (a & ~b) | (~a & b), complement folded into a.
                (GateType::Xor, neg) => {
                    let a = |p: &mut Pdag, m: &HashMap<(u32, bool), Ref>, flip: bool| {
                        arg_of(p, m, gate.args[0], flip ^ neg)
                    };
                    let b = |p: &mut Pdag, m: &HashMap<(u32, bool), Ref>, flip: bool| {
                        arg_of(p, m, gate.args[1], flip)
                    };
                    let a0 = a(pdag, &map, false);
                    let b1 = b(pdag, &map, true);
                    let left = pdag.new_gate(GateType::And, vec![a0, b1]);
                    let a1 = a(pdag, &map, true);
                    let b0 = b(pdag, &map, false);
                    let right = pdag.new_gate(GateType::And, vec![a1, b0]);
                    pdag.new_gate(GateType::Or, vec![left, right])
                }
            };
            map.insert((index, polarity), built);
        }
    }

    let new_root = if pdag.is_gate(root.index()) {
        map[&(root.index(), root.is_complement())]
    } else {
        root
    };
    pdag.set_root(new_root);
    true
}

/// Flattens chains of the same connective: AND of AND, OR of OR.
fn coalesce(pdag: &mut Pdag) -> bool {
    let order = pdag.topological_order();
    let mut map: HashMap<u32, Ref> = HashMap::new();
    let mut changed = false;

    for index in order {
        let gate = pdag.gate(index).clone();
        let mut args = Vec::with_capacity(gate.args.len());
        let mut flattened = false;
        for &raw in &gate.args {
            let arg = resolve(&map, raw);
            let splice = !arg.is_complement()
                && pdag.is_gate(arg.index())
                && matches!(gate.connective, GateType::And | GateType::Or)
                && pdag.gate(arg.index()).connective == gate.connective;
            if splice {
                args.extend(pdag.gate(arg.index()).args.iter().copied());
                flattened = true;
            } else {
                args.push(arg);
            }
        }
        let result = if flattened || args != gate.args {
            changed = true;
            pdag.new_gate(gate.connective, args)
        } else {
            Ref::positive(index)
        };
        map.insert(index, result);
    }

    let new_root = resolve(&map, pdag.root());
    if new_root != pdag.root() {
        pdag.set_root(new_root);
        changed = true;
    }
    changed
}

/// Idempotence, complement detection, and absorption on AND/OR gates.
fn optimize(pdag: &mut Pdag) -> bool {
    let order = pdag.topological_order();
    let mut map: HashMap<u32, Ref> = HashMap::new();
    let mut changed = false;

    for index in order {
        let gate = pdag.gate(index).clone();
        let args: Vec<Ref> = gate.args.iter().map(|&a| resolve(&map, a)).collect();

        let result = match gate.connective {
            GateType::And | GateType::Or => {
                let mut kept: Vec<Ref> = Vec::with_capacity(args.len());
                let mut seen = HashSet::new();
                let mut contradiction = false;
                for a in args {
                    if seen.contains(&-a) {
                        contradiction = true;
                        break;
                    }
                    if seen.insert(a) {
                        kept.push(a);
                    }
                }
                if contradiction {
                    // x & ~x == 0; x | ~x == 1.
                    match gate.connective {
                        GateType::And => pdag.false_ref(),
                        _ => pdag.true_ref(),
                    }
                } else {
                    // Absorption: A & (A | X) == A, and its dual.
                    let members: HashSet<Ref> = kept.iter().copied().collect();
                    let dual = match gate.connective {
                        GateType::And => GateType::Or,
                        _ => GateType::And,
                    };
                    let absorbed: Vec<Ref> = kept
                        .iter()
                        .copied()
                        .filter(|&a| {
                            let is_dual_gate = !a.is_complement()
                                && pdag.is_gate(a.index())
                                && pdag.gate(a.index()).connective == dual;
                            !(is_dual_gate
                                && pdag
                                    .gate(a.index())
                                    .args
                                    .iter()
                                    .any(|inner| members.contains(inner) && *inner != a))
                        })
                        .collect();
                    if absorbed.len() == gate.args.len()
                        && absorbed.iter().zip(&gate.args).all(|(a, b)| a == b)
                    {
                        Ref::positive(index)
                    } else {
                        match absorbed.len() {
                            0 => match gate.connective {
                                GateType::And => pdag.true_ref(),
                                _ => pdag.false_ref(),
                            },
                            1 => absorbed[0],
                            _ => pdag.new_gate(gate.connective, absorbed),
                        }
                    }
                }
            }
            _ => {
                if args == gate.args {
                    Ref::positive(index)
                } else {
                    pdag.new_gate(gate.connective, args)
                }
            }
        };

        if result != Ref::positive(index) {
            changed = true;
        }
        map.insert(index, result);
    }

    let new_root = resolve(&map, pdag.root());
    if new_root != pdag.root() {
        pdag.set_root(new_root);
        changed = true;
    }
    changed
}

/// Hash-consing over `(connective, sorted signed args)`: structurally
/// equivalent subgraphs collapse to one node.
fn structural_hash(pdag: &mut Pdag) -> bool {
    let order = pdag.topological_order();
    let mut map: HashMap<u32, Ref> = HashMap::new();
    let mut table: HashMap<(GateType, Vec<Ref>), Ref> = HashMap::new();
    let mut changed = false;

    for index in order {
        let gate = pdag.gate(index).clone();
        let mut args: Vec<Ref> = gate.args.iter().map(|&a| resolve(&map, a)).collect();
        args.sort();
        let key = (gate.connective, args);

        let result = if let Some(&existing) = table.get(&key) {
            changed = true;
            existing
        } else {
            let reuse = key.1.len() == gate.args.len()
                && {
                    let mut sorted_old = gate.args.clone();
                    sorted_old.sort();
                    sorted_old == key.1
                };
            let r = if reuse {
                Ref::positive(index)
            } else {
                changed = true;
                pdag.new_gate(gate.connective, key.1.clone())
            };
            table.insert(key, r);
            r
        };
        map.insert(index, result);
    }

    let new_root = resolve(&map, pdag.root());
    if new_root != pdag.root() {
        pdag.set_root(new_root);
        changed = true;
    }
    changed
}

/// Bounded factoring to expose common substructure:
/// `OR(AND(a, X), AND(a, Y), rest)` becomes `OR(AND(a, OR(X, Y)), rest)`,
/// and dually. Applies only the single most-shared factor per gate.
fn distribute(pdag: &mut Pdag, bound: usize) -> bool {
    let order = pdag.topological_order();
    let mut map: HashMap<u32, Ref> = HashMap::new();
    let mut changed = false;

    for index in order {
        let gate = pdag.gate(index).clone();
        let args: Vec<Ref> = gate.args.iter().map(|&a| resolve(&map, a)).collect();

        let dual = match gate.connective {
            GateType::Or => GateType::And,
            GateType::And => GateType::Or,
            _ => {
                let r = if args == gate.args {
                    Ref::positive(index)
                } else {
                    pdag.new_gate(gate.connective, args)
                };
                map.insert(index, r);
                continue;
            }
        };

        let mut result = None;
        if args.len() <= bound {
            // Frequency of inner refs across dual-gate children.
            let mut counts: HashMap<Ref, usize> = HashMap::new();
            for &a in &args {
                if !a.is_complement()
                    && pdag.is_gate(a.index())
                    && pdag.gate(a.index()).connective == dual
                    && pdag.gate(a.index()).args.len() >= 2
                {
                    for &inner in &pdag.gate(a.index()).args {
                        *counts.entry(inner).or_default() += 1;
                    }
                }
            }
            if let Some((&factor, &count)) = counts.iter().max_by_key(|&(r, &c)| (c, r.bits())) {
                if count >= 2 {
                    let mut with_factor = Vec::new();
                    let mut rest = Vec::new();
                    for &a in &args {
                        let has = !a.is_complement()
                            && pdag.is_gate(a.index())
                            && pdag.gate(a.index()).connective == dual
                            && pdag.gate(a.index()).args.len() >= 2
                            && pdag.gate(a.index()).args.contains(&factor);
                        if has {
                            with_factor.push(a);
                        } else {
                            rest.push(a);
                        }
                    }
                    if with_factor.len() >= 2 {
                        let residues: Vec<Ref> = with_factor
                            .iter()
                            .map(|&a| {
                                let inner: Vec<Ref> = pdag
                                    .gate(a.index())
                                    .args
                                    .iter()
                                    .copied()
                                    .filter(|&r| r != factor)
                                    .collect();
                                if inner.len() == 1 {
                                    inner[0]
                                } else {
                                    pdag.new_gate(dual, inner)
                                }
                            })
                            .collect();
                        let residue_gate = pdag.new_gate(gate.connective, residues);
                        let factored = pdag.new_gate(dual, vec![factor, residue_gate]);
                        rest.push(factored);
                        let r = if rest.len() == 1 {
                            rest[0]
                        } else {
                            pdag.new_gate(gate.connective, rest)
                        };
                        changed = true;
                        result = Some(r);
                    }
                }
            }
        }

        let result = result.unwrap_or_else(|| {
            if args == gate.args {
                Ref::positive(index)
            } else {
                pdag.new_gate(gate.connective, args)
            }
        });
        map.insert(index, result);
    }

    let new_root = resolve(&map, pdag.root());
    if new_root != pdag.root() {
        pdag.set_root(new_root);
        changed = true;
    }
    changed
}

/// Marks gates whose variable support is disjoint from the rest of the
/// graph. Uses DFS enter/exit timestamps: a gate is a module when every
/// visit to every descendant falls inside the gate's own time window.
fn detect_modules(pdag: &mut Pdag) {
    let root = pdag.root();
    if !pdag.is_gate(root.index()) {
        return;
    }

    let order = pdag.topological_order();
    let mut enter: HashMap<u32, u64> = HashMap::new();
    let mut exit: HashMap<u32, u64> = HashMap::new();
    // Min/max time any handle to the node was touched.
    let mut touched: HashMap<u32, (u64, u64)> = HashMap::new();
    let mut clock: u64 = 0;

    let mut touch = |touched: &mut HashMap<u32, (u64, u64)>, index: u32, t: u64| {
        let entry = touched.entry(index).or_insert((t, t));
        entry.0 = entry.0.min(t);
        entry.1 = entry.1.max(t);
    };

    // Iterative DFS over gates; every encounter of a node, visited or
    // not, stamps the clock.
    let mut stack = vec![(root.index(), false)];
    let mut visited = HashSet::new();
    while let Some((index, exiting)) = stack.pop() {
        clock += 1;
        if exiting {
            exit.insert(index, clock);
            touch(&mut touched, index, clock);
            continue;
        }
        touch(&mut touched, index, clock);
        if !visited.insert(index) {
            continue;
        }
        enter.insert(index, clock);
        stack.push((index, true));
        for arg in &pdag.gate(index).args {
            let child = arg.index();
            if pdag.is_gate(child) {
                stack.push((child, false));
            } else {
                clock += 1;
                touch(&mut touched, child, clock);
            }
        }
    }

    // Bottom-up combined time ranges of each gate's descendants.
    let mut range: HashMap<u32, (u64, u64)> = HashMap::new();
    for &index in &order {
        let mut lo = u64::MAX;
        let mut hi = 0u64;
        for arg in &pdag.gate(index).args {
            let child = arg.index();
            let (mut clo, mut chi) = touched[&child];
            if let Some(&(rlo, rhi)) = range.get(&child) {
                clo = clo.min(rlo);
                chi = chi.max(rhi);
            }
            lo = lo.min(clo);
            hi = hi.max(chi);
        }
        range.insert(index, (lo, hi));
        let is_module = lo > enter[&index] && hi < exit[&index];
        pdag.gate_mut(index).module = is_module;
    }
    // The root subsumes the whole graph.
    pdag.gate_mut(root.index()).module = true;

    let modules = order.iter().filter(|&&i| pdag.gate(i).module).count();
    debug!("module detection: {modules} of {} gates", order.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::model::{Arg, Connective, Model};

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn preprocessed(model: &Model) -> Pdag {
        let mut pdag = Pdag::from_model(model).unwrap();
        preprocess(&mut pdag, &PreprocessOptions::default(), &Guard::new()).unwrap();
        pdag
    }

    /// A random DAG-shaped model over `n` basic events.
    fn random_model(rng: &mut ChaCha8Rng, n: usize, gates: usize) -> Model {
        let mut model = Model::new();
        for i in 0..n {
            model.add_basic_event(format!("e{i}"), Expression::Constant(0.1));
        }
        for g in 0..gates {
            let arity = rng.gen_range(2..=4);
            let mut args = Vec::new();
            for _ in 0..arity {
                let mut arg = if g > 0 && rng.gen_bool(0.3) {
                    Arg::gate(rng.gen_range(0..g))
                } else {
                    Arg::basic(rng.gen_range(0..n))
                };
                if rng.gen_bool(0.25) {
                    arg = arg.negate();
                }
                args.push(arg);
            }
            let connective = match rng.gen_range(0..6) {
                0 => Connective::And,
                1 => Connective::Or,
                2 => Connective::AtLeast(2),
                3 => Connective::Nand,
                4 => Connective::Nor,
                _ => Connective::Or,
            };
            model.add_gate(format!("g{g}"), connective, args);
        }
        model.set_top(gates - 1);
        model
    }

    #[test]
    fn test_semantic_preservation_on_random_models() {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        for _ in 0..30 {
            let n = rng.gen_range(3..7);
            let n_gates = rng.gen_range(2..6);
            let model = random_model(&mut rng, n, n_gates);
            let original = Pdag::from_model(&model).unwrap();
            let processed = preprocessed(&model);
            for mask in 0..(1u32 << n) {
                let assignment: Vec<bool> = (0..n).map(|i| mask & (1 << i) != 0).collect();
                assert_eq!(
                    original.eval(original.root(), &assignment),
                    processed.eval(processed.root(), &assignment),
                    "assignment {assignment:?}"
                );
            }
        }
    }

    #[test]
    fn test_constant_folding_collapses_top() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let h = model.add_house_event("h", true);
        let top = model.add_gate("top", Connective::Or, vec![Arg::basic(a), Arg::house(h)]);
        model.set_top(top);
        let pdag = preprocessed(&model);
        assert_eq!(pdag.root(), pdag.true_ref());
    }

    #[test]
    fn test_negation_sinks_to_literals() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let b = model.add_basic_event("b", Expression::Constant(0.1));
        let inner = model.add_gate("inner", Connective::And, vec![Arg::basic(a), Arg::basic(b)]);
        let top = model.add_gate("top", Connective::Nor, vec![Arg::gate(inner), Arg::basic(a)]);
        model.set_top(top);
        let pdag = preprocessed(&model);
        for index in pdag.topological_order() {
            for arg in &pdag.gate(index).args {
                assert!(
                    !(arg.is_complement() && pdag.is_gate(arg.index())),
                    "gate-level complement survived"
                );
            }
            assert_ne!(pdag.gate(index).connective, GateType::Xor);
        }
        assert!(!pdag.root().is_complement() || !pdag.is_gate(pdag.root().index()));
    }

    #[test]
    fn test_coalescing_flattens_chains() {
        let mut model = Model::new();
        let ids: Vec<_> =
            (0..4).map(|i| model.add_basic_event(format!("e{i}"), Expression::Constant(0.1))).collect();
        let inner = model.add_gate(
            "inner",
            Connective::And,
            vec![Arg::basic(ids[0]), Arg::basic(ids[1])],
        );
        let top = model.add_gate(
            "top",
            Connective::And,
            vec![Arg::gate(inner), Arg::basic(ids[2]), Arg::basic(ids[3])],
        );
        model.set_top(top);
        let pdag = preprocessed(&model);
        let order = pdag.topological_order();
        assert_eq!(order.len(), 1, "AND of AND should flatten into one gate");
        assert_eq!(pdag.gate(order[0]).args.len(), 4);
    }

    #[test]
    fn test_idempotence_and_contradiction() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let top =
            model.add_gate("top", Connective::And, vec![Arg::basic(a), Arg::basic(a).negate()]);
        model.set_top(top);
        let pdag = preprocessed(&model);
        assert_eq!(pdag.root(), pdag.false_ref());
    }

    #[test]
    fn test_absorption() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let b = model.add_basic_event("b", Expression::Constant(0.1));
        let inner = model.add_gate("inner", Connective::Or, vec![Arg::basic(a), Arg::basic(b)]);
        let top = model.add_gate("top", Connective::And, vec![Arg::basic(a), Arg::gate(inner)]);
        model.set_top(top);
        let pdag = preprocessed(&model);
        // A & (A | B) == A
        assert_eq!(pdag.root(), pdag.variable(a as u32));
    }

    #[test]
    fn test_structural_hashing_merges_duplicates() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let b = model.add_basic_event("b", Expression::Constant(0.1));
        let c = model.add_basic_event("c", Expression::Constant(0.1));
        let g1 = model.add_gate("g1", Connective::And, vec![Arg::basic(a), Arg::basic(b)]);
        let g2 = model.add_gate("g2", Connective::And, vec![Arg::basic(b), Arg::basic(a)]);
        let top = model.add_gate(
            "top",
            Connective::Or,
            vec![Arg::gate(g1), Arg::gate(g2), Arg::basic(c)],
        );
        model.set_top(top);
        let pdag = preprocessed(&model);
        // The two AND gates are the same canonical node; the OR also
        // dedups the repeated argument.
        let order = pdag.topological_order();
        assert_eq!(order.len(), 2);
        let root_gate = pdag.gate(pdag.root().index());
        assert_eq!(root_gate.args.len(), 2);
    }

    #[test]
    fn test_module_detection() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let b = model.add_basic_event("b", Expression::Constant(0.1));
        let c = model.add_basic_event("c", Expression::Constant(0.1));
        let d = model.add_basic_event("d", Expression::Constant(0.1));
        let e = model.add_basic_event("e", Expression::Constant(0.1));
        // (a & b) is a module: {a, b} occur nowhere else. The two gates
        // sharing d are not.
        let m = model.add_gate("m", Connective::And, vec![Arg::basic(a), Arg::basic(b)]);
        let s1 = model.add_gate("s1", Connective::And, vec![Arg::basic(c), Arg::basic(d)]);
        let s2 = model.add_gate("s2", Connective::And, vec![Arg::basic(d), Arg::basic(e)]);
        let top = model.add_gate(
            "top",
            Connective::Or,
            vec![Arg::gate(m), Arg::gate(s1), Arg::gate(s2)],
        );
        model.set_top(top);

        let mut pdag = Pdag::from_model(&model).unwrap();
        // Distribution would factor out the shared d; keep it off so the
        // sharing survives to module detection.
        let options = PreprocessOptions { distribution_bound: 0 };
        preprocess(&mut pdag, &options, &Guard::new()).unwrap();

        let order = pdag.topological_order();
        assert_eq!(order.len(), 4);
        let support_of = |index: u32| pdag.support(Ref::positive(index));
        for &index in &order {
            let gate = pdag.gate(index);
            if index == pdag.root().index() {
                assert!(gate.module);
            } else if support_of(index).contains(&pdag.variable(d as u32).index()) {
                assert!(!gate.module, "shared-support subtree is not a module");
            } else {
                assert!(gate.module, "independent subtree should be a module");
            }
        }
    }
}
