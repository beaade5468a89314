//! Reduced ordered BDD with complement edges.
//!
//! Manager-centric: all nodes live in the manager's unique table, so two
//! handles are semantically equal iff they are equal as handles. The
//! complement bit may not survive on a node's low edge; `mk_node` restores
//! that form, which makes the representation canonical for a fixed
//! variable order. Terminal 1 is node 1; 0 is its complement.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use log::debug;

use crate::cache::Cache;
use crate::node::Node;
use crate::order::VariableOrder;
use crate::pdag::{GateType, Pdag};
use crate::reference::Ref;
use crate::storage::Storage;

pub struct Bdd {
    storage: RefCell<Storage<Node>>,
    ite_cache: RefCell<Cache<(Ref, Ref, Ref), Ref>>,
    probability_cache: RefCell<HashMap<u32, f64>>,
    one: Ref,
}

impl Bdd {
    pub fn new(cache_bits: usize) -> Self {
        let mut storage = Storage::new(cache_bits.min(20));
        // Terminal node 1; its children are never followed.
        let terminal = storage.add(Node::new(0, Ref::positive(1), Ref::positive(1)));
        assert_eq!(terminal, 1);

        Self {
            storage: RefCell::new(storage),
            ite_cache: RefCell::new(Cache::new(cache_bits)),
            probability_cache: RefCell::new(HashMap::new()),
            one: Ref::positive(1),
        }
    }

    pub fn one(&self) -> Ref {
        self.one
    }

    pub fn zero(&self) -> Ref {
        -self.one
    }

    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one()
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero()
    }

    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == 1
    }

    /// Order position of the node's decision variable; 0 for terminals.
    pub fn variable(&self, index: u32) -> u32 {
        self.storage.borrow().value(index).variable
    }

    pub fn low(&self, index: u32) -> Ref {
        self.storage.borrow().value(index).low
    }

    pub fn high(&self, index: u32) -> Ref {
        self.storage.borrow().value(index).high
    }

    /// Number of live nodes in the unique table.
    pub fn table_size(&self) -> usize {
        self.storage.borrow().size()
    }

    /// Find-or-create a node, restoring the canonical form.
    pub fn mk_node(&self, variable: u32, low: Ref, high: Ref) -> Ref {
        debug_assert_ne!(variable, 0, "variable must not be zero");

        if low == high {
            return low;
        }
        // The complement bit may not live on the low edge.
        if low.is_complement() {
            return -self.mk_node(variable, -low, -high);
        }

        let index = self.storage.borrow_mut().put(Node::new(variable, low, high));
        Ref::positive(index)
    }

    /// The decision variable at order position `position`.
    pub fn mk_var(&self, position: u32) -> Ref {
        self.mk_node(position, self.zero(), self.one())
    }

    /// Shannon cofactors with respect to the top variable `v`.
    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        debug_assert_ne!(v, 0);

        let index = node.index();
        if self.is_terminal(node) || v < self.variable(index) {
            return (node, node);
        }
        debug_assert_eq!(v, self.variable(index));
        if node.is_complement() {
            (-self.low(index), -self.high(index))
        } else {
            (self.low(index), self.high(index))
        }
    }

    /// Apply the ITE operation: `ite(f, g, h) = (f & g) | (~f & h)`.
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Terminal cases.
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples.
        let (mut f, mut g, mut h) = (f, g, h);
        if g == f {
            g = self.one();
        } else if g == -f {
            g = self.zero();
        }
        if h == f {
            h = self.zero();
        } else if h == -f {
            h = self.one();
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }
        if g == h {
            return g;
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let k = self.variable(h.index());

        // Equivalent pairs: commutative forms pick the lowest top
        // variable as the controlling argument.
        if self.is_one(g) && k != 0 && k < i {
            // f | h == h | f
            std::mem::swap(&mut f, &mut h);
        } else if self.is_zero(h) && j != 0 && j < i {
            // f & g == g & f
            std::mem::swap(&mut f, &mut g);
        } else if self.is_one(h) && j != 0 && j < i {
            // f -> g == ~g -> ~f
            let nf = -f;
            f = -g;
            g = nf;
        } else if self.is_zero(g) && k != 0 && k < i {
            // ~f & h == ~h & f  (as ite(h, 0, ~f) after the flip below)
            let nf = -f;
            f = -h;
            h = nf;
        }

        // Canonicalize for the cache: f and g regular.
        if f.is_complement() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        let mut negate_result = false;
        if g.is_complement() {
            negate_result = true;
            g = -g;
            h = -h;
        }
        let (f, g, h) = (f, g, h);

        if let Some(result) = self.ite_cache.borrow().get(&(f, g, h)) {
            return if negate_result { -result } else { result };
        }

        // Top variable of the triple.
        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let k = self.variable(h.index());
        let mut m = i;
        if j != 0 {
            m = m.min(j);
        }
        if k != 0 {
            m = m.min(k);
        }
        debug_assert_ne!(m, 0);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let low = self.apply_ite(f0, g0, h0);
        let high = self.apply_ite(f1, g1, h1);
        let result = self.mk_node(m, low, high);

        self.ite_cache.borrow_mut().insert((f, g, h), result);
        debug!("ite({f}, {g}, {h}) -> {result}");
        if negate_result {
            -result
        } else {
            result
        }
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero())
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one(), v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    /// `u & ~v`, used by the importance cofactor path.
    pub fn apply_and_not(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, self.zero())
    }

    /// Cofactor by one variable: `f` with the variable at order position
    /// `v` fixed to `value`.
    pub fn restrict(&self, f: Ref, v: u32, value: bool) -> Ref {
        let mut memo = HashMap::new();
        self.restrict_rec(f, v, value, &mut memo)
    }

    fn restrict_rec(&self, f: Ref, v: u32, value: bool, memo: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        let var = self.variable(f.index());
        if var > v {
            // The variable cannot appear below this level.
            return f;
        }
        if let Some(&r) = memo.get(&f) {
            return r;
        }
        let (f0, f1) = self.top_cofactors(f, var);
        let result = if var == v {
            if value {
                f1
            } else {
                f0
            }
        } else {
            let low = self.restrict_rec(f0, v, value, memo);
            let high = self.restrict_rec(f1, v, value, memo);
            self.mk_node(var, low, high)
        };
        memo.insert(f, result);
        result
    }

    /// Exact probability of the function under the probability vector,
    /// indexed by order position (entry 0 unused).
    ///
    /// `P(1) = 1`, `P(0) = 0`,
    /// `P(node) = p(x) * P(high) + (1 - p(x)) * P(low)`, with the
    /// complement flip on reads. Linear in the live node count.
    pub fn probability(&self, f: Ref, p: &[f64]) -> f64 {
        let regular = self.probability_regular(f.regular(), p);
        if f.is_complement() {
            1.0 - regular
        } else {
            regular
        }
    }

    fn probability_regular(&self, f: Ref, p: &[f64]) -> f64 {
        debug_assert!(!f.is_complement());
        if self.is_one(f) {
            return 1.0;
        }
        let index = f.index();
        if let Some(&cached) = self.probability_cache.borrow().get(&index) {
            return cached;
        }
        let v = self.variable(index);
        let ph = self.probability(self.high(index), p);
        let pl = self.probability(self.low(index), p);
        let result = p[v as usize] * ph + (1.0 - p[v as usize]) * pl;
        self.probability_cache.borrow_mut().insert(index, result);
        result
    }

    /// Drops probability results; must run whenever the vector changes.
    pub fn clear_probability_cache(&self) {
        self.probability_cache.borrow_mut().clear();
    }

    /// Node indices reachable from the roots, terminal included.
    pub fn descendants(&self, roots: impl IntoIterator<Item = Ref>) -> HashSet<u32> {
        let mut seen = HashSet::new();
        let mut stack: Vec<u32> = roots.into_iter().map(|r| r.index()).collect();
        while let Some(index) = stack.pop() {
            if !seen.insert(index) {
                continue;
            }
            if index != 1 {
                stack.push(self.low(index).index());
                stack.push(self.high(index).index());
            }
        }
        seen
    }

    /// Live node count of one function.
    pub fn size(&self, f: Ref) -> usize {
        self.descendants([f]).len()
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(16)
    }
}

impl std::fmt::Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bdd")
            .field("nodes", &self.table_size())
            .field("ite_hits", &self.ite_cache.borrow().hits())
            .field("ite_misses", &self.ite_cache.borrow().misses())
            .finish()
    }
}

/// Compiles a preprocessed PDAG into a BDD function.
///
/// Gates fold bottom-up in topological order; ATLEAST builds through the
/// recursion `atleast(k, x:xs) = ite(x, atleast(k-1, xs), atleast(k, xs))`.
pub fn from_pdag(bdd: &Bdd, pdag: &Pdag, order: &VariableOrder) -> Ref {
    let leaf = |arg: Ref| -> Option<Ref> {
        let index = arg.index();
        if pdag.is_constant(index) {
            Some(if arg.is_complement() { bdd.zero() } else { bdd.one() })
        } else if pdag.is_variable(index) {
            let position = order
                .position(index)
                .expect("variable in the frozen graph must be ordered");
            let var = bdd.mk_var(position);
            Some(if arg.is_complement() { -var } else { var })
        } else {
            None
        }
    };

    let mut gates: HashMap<u32, Ref> = HashMap::new();
    for gate_index in pdag.topological_order() {
        let gate = pdag.gate(gate_index);
        let args: Vec<Ref> = gate
            .args
            .iter()
            .map(|&arg| {
                leaf(arg).unwrap_or_else(|| {
                    let sub = gates[&arg.index()];
                    if arg.is_complement() {
                        -sub
                    } else {
                        sub
                    }
                })
            })
            .collect();

        let result = match gate.connective {
            GateType::And => args.iter().fold(bdd.one(), |acc, &a| bdd.apply_and(acc, a)),
            GateType::Or => args.iter().fold(bdd.zero(), |acc, &a| bdd.apply_or(acc, a)),
            GateType::Xor => {
                debug_assert_eq!(args.len(), 2);
                bdd.apply_xor(args[0], args[1])
            }
            GateType::AtLeast(k) => {
                let mut memo = HashMap::new();
                atleast(bdd, &args, k as usize, 0, &mut memo)
            }
        };
        gates.insert(gate_index, result);
    }

    let root = pdag.root();
    let result = leaf(root).unwrap_or_else(|| {
        let sub = gates[&root.index()];
        if root.is_complement() {
            -sub
        } else {
            sub
        }
    });
    debug!("compiled PDAG into BDD with {} nodes", bdd.size(result));
    result
}

fn atleast(
    bdd: &Bdd,
    args: &[Ref],
    k: usize,
    from: usize,
    memo: &mut HashMap<(usize, usize), Ref>,
) -> Ref {
    if k == 0 {
        return bdd.one();
    }
    if k > args.len() - from {
        return bdd.zero();
    }
    if let Some(&r) = memo.get(&(k, from)) {
        return r;
    }
    let high = atleast(bdd, args, k - 1, from + 1, memo);
    let low = atleast(bdd, args, k, from + 1, memo);
    let result = bdd.apply_ite(args[from], high, low);
    memo.insert((k, from), result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminals() {
        let bdd = Bdd::default();
        assert!(bdd.is_one(bdd.one()));
        assert!(bdd.is_zero(bdd.zero()));
        assert_eq!(bdd.zero(), -bdd.one());
    }

    #[test]
    fn test_mk_node_canonicity() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(2);
        // Same triple twice: same handle.
        let a = bdd.mk_node(1, x, bdd.one());
        let b = bdd.mk_node(1, x, bdd.one());
        assert_eq!(a, b);
        // A complemented low edge gets rewritten, never stored.
        assert!(!bdd.low(a.index()).is_complement());
        assert!(!bdd.low(x.index()).is_complement());
    }

    #[test]
    fn test_apply_commutative_canonicity() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        assert_eq!(bdd.apply_and(x, y), bdd.apply_and(y, x));
        assert_eq!(bdd.apply_or(x, y), bdd.apply_or(y, x));
        assert_eq!(bdd.apply_xor(x, y), bdd.apply_xor(y, x));
    }

    #[test]
    fn test_ite_base_cases() {
        let bdd = Bdd::default();
        let g = bdd.mk_var(2);
        let h = bdd.mk_var(3);
        assert_eq!(bdd.apply_ite(bdd.one(), g, h), g);
        assert_eq!(bdd.apply_ite(bdd.zero(), g, h), h);
        assert_eq!(bdd.apply_ite(g, g, h), bdd.apply_or(g, h));
        assert_eq!(bdd.apply_ite(g, h, g), bdd.apply_and(g, h));
        let f = bdd.mk_var(1);
        assert_eq!(bdd.apply_ite(f, g, g), g);
        assert_eq!(bdd.apply_ite(f, bdd.one(), bdd.zero()), f);
        assert_eq!(bdd.apply_ite(f, bdd.zero(), bdd.one()), -f);
    }

    #[test]
    fn test_de_morgan() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        assert_eq!(-bdd.apply_and(x, y), bdd.apply_or(-x, -y));
    }

    #[test]
    fn test_and_not() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let diff = bdd.apply_and_not(x, y);
        assert_eq!(diff, bdd.apply_and(x, -y));
    }

    #[test]
    fn test_restrict() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_and(x, y);
        assert_eq!(bdd.restrict(f, 1, true), y);
        assert_eq!(bdd.restrict(f, 1, false), bdd.zero());
        assert_eq!(bdd.restrict(f, 2, true), x);
        let g = bdd.apply_or(x, y);
        assert_eq!(bdd.restrict(g, 1, true), bdd.one());
        assert_eq!(bdd.restrict(g, 1, false), y);
    }

    #[test]
    fn test_probability_basic() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let p = [0.0, 0.1, 0.2];

        let and = bdd.apply_and(x, y);
        assert!((bdd.probability(and, &p) - 0.02).abs() < 1e-12);

        bdd.clear_probability_cache();
        let or = bdd.apply_or(x, y);
        assert!((bdd.probability(or, &p) - (0.1 + 0.2 - 0.02)).abs() < 1e-12);

        bdd.clear_probability_cache();
        assert!((bdd.probability(-x, &p) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_probability_cache_invalidation() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let p1 = [0.0, 0.25];
        assert!((bdd.probability(x, &p1) - 0.25).abs() < 1e-12);
        let p2 = [0.0, 0.75];
        bdd.clear_probability_cache();
        assert!((bdd.probability(x, &p2) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_atleast_two_of_three() {
        let bdd = Bdd::default();
        let args: Vec<Ref> = (1..=3).map(|i| bdd.mk_var(i)).collect();
        let mut memo = HashMap::new();
        let f = atleast(&bdd, &args, 2, 0, &mut memo);
        // Majority of three with p = 0.5 each has probability 0.5.
        let p = [0.0, 0.5, 0.5, 0.5];
        assert!((bdd.probability(f, &p) - 0.5).abs() < 1e-12);
        // Equivalent to the explicit pairwise expansion.
        let ab = bdd.apply_and(args[0], args[1]);
        let ac = bdd.apply_and(args[0], args[2]);
        let bc = bdd.apply_and(args[1], args[2]);
        let pairwise = bdd.apply_or(bdd.apply_or(ab, ac), bc);
        assert_eq!(f, pairwise);
    }
}
