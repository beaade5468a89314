//! Zero-suppressed BDD: families of products over signed literals.
//!
//! The manager shares the node layout and unique table with the BDD but
//! carries no complement edges; instead, a signed basic-event literal maps
//! to its own ZBDD variable (`2 * position` positive, `2 * position + 1`
//! negative), so non-coherent products are ordinary sets. Terminals are
//! Empty (no products) and Base (the empty product). The zero-suppression
//! rule erases nodes whose then-branch is Empty.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use log::debug;

use crate::bdd::Bdd;
use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::guard::Guard;
use crate::node::Node;
use crate::order::VariableOrder;
use crate::pdag::{GateType, Pdag};
use crate::reference::Ref;
use crate::storage::Storage;
use crate::utils::{pairing3, MyHash};

/// Unlimited product size.
pub const NO_LIMIT: u32 = u32::MAX;

/// ZBDD variable for the literal at order `position` with the given sign.
pub fn literal(position: u32, negated: bool) -> u32 {
    2 * position + negated as u32
}

/// Inverse of [`literal`]: `(order position, negated)`.
pub fn decode_literal(var: u32) -> (u32, bool) {
    (var / 2, var % 2 == 1)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum OpKey {
    Union(Ref, Ref),
    Intersect(Ref, Ref),
    Diff(Ref, Ref),
    Product(Ref, Ref, u32),
    Subsume(Ref, Ref),
    Minimize(Ref),
    Truncate(Ref, u32),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        let (tag, a, b) = match *self {
            OpKey::Union(x, y) => (1, x.bits(), y.bits()),
            OpKey::Intersect(x, y) => (2, x.bits(), y.bits()),
            OpKey::Diff(x, y) => (3, x.bits(), y.bits()),
            OpKey::Product(x, y, limit) => return pairing3(4, pairing3(0, x.bits() as u64, y.bits() as u64), limit as u64),
            OpKey::Subsume(x, y) => (5, x.bits(), y.bits()),
            OpKey::Minimize(x) => (6, x.bits(), 0),
            OpKey::Truncate(x, limit) => (7, x.bits(), limit),
        };
        pairing3(tag, a as u64, b as u64)
    }
}

pub struct Zbdd {
    storage: RefCell<Storage<Node>>,
    cache: RefCell<Cache<OpKey, Ref>>,
    count_cache: RefCell<HashMap<Ref, u64>>,
    /// Sticky flag: some product path was cut off by a size limit.
    truncated: Cell<bool>,
    empty: Ref,
    base: Ref,
}

impl Zbdd {
    pub fn new(cache_bits: usize) -> Self {
        let mut storage = Storage::new(cache_bits.min(20));
        let empty = storage.add(Node::new(0, Ref::positive(1), Ref::positive(1)));
        let base = storage.add(Node::new(0, Ref::positive(2), Ref::positive(2)));
        assert_eq!((empty, base), (1, 2));

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(cache_bits)),
            count_cache: RefCell::new(HashMap::new()),
            truncated: Cell::new(false),
            empty: Ref::positive(1),
            base: Ref::positive(2),
        }
    }

    pub fn empty(&self) -> Ref {
        self.empty
    }

    pub fn base(&self) -> Ref {
        self.base
    }

    pub fn is_empty_set(&self, f: Ref) -> bool {
        f == self.empty
    }

    pub fn is_base(&self, f: Ref) -> bool {
        f == self.base
    }

    pub fn is_terminal(&self, f: Ref) -> bool {
        f.index() <= 2
    }

    /// Whether any product path was truncated since the last reset.
    pub fn was_truncated(&self) -> bool {
        self.truncated.get()
    }

    pub fn reset_truncated(&self) {
        self.truncated.set(false);
    }

    pub fn variable(&self, index: u32) -> u32 {
        self.storage.borrow().value(index).variable
    }

    pub fn low(&self, index: u32) -> Ref {
        self.storage.borrow().value(index).low
    }

    pub fn high(&self, index: u32) -> Ref {
        self.storage.borrow().value(index).high
    }

    /// Find-or-create with the zero-suppression rule.
    pub fn mk_node(&self, variable: u32, low: Ref, high: Ref) -> Ref {
        debug_assert_ne!(variable, 0);
        debug_assert!(!low.is_complement() && !high.is_complement());

        if self.is_empty_set(high) {
            return low;
        }
        let index = self.storage.borrow_mut().put(Node::new(variable, low, high));
        Ref::positive(index)
    }

    /// The family with one product made of the given literals.
    pub fn product_of(&self, literals: impl IntoIterator<Item = u32>) -> Ref {
        let mut vars: Vec<u32> = literals.into_iter().collect();
        vars.sort_unstable();
        vars.dedup();
        let mut current = self.base();
        for var in vars.into_iter().rev() {
            current = self.mk_node(var, self.empty(), current);
        }
        current
    }

    fn cached(&self, key: OpKey) -> Option<Ref> {
        self.cache.borrow().get(&key)
    }

    fn remember(&self, key: OpKey, value: Ref) -> Ref {
        self.cache.borrow_mut().insert(key, value);
        value
    }

    pub fn union(&self, f: Ref, g: Ref) -> Ref {
        if self.is_empty_set(f) {
            return g;
        }
        if self.is_empty_set(g) || f == g {
            return f;
        }
        if self.is_base(f) {
            return self.attach_base(g);
        }
        if self.is_base(g) {
            return self.attach_base(f);
        }

        let (f, g) = if f.bits() <= g.bits() { (f, g) } else { (g, f) };
        let key = OpKey::Union(f, g);
        if let Some(r) = self.cached(key) {
            return r;
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let result = if i < j {
            let low = self.union(self.low(f.index()), g);
            self.mk_node(i, low, self.high(f.index()))
        } else if i > j {
            let low = self.union(f, self.low(g.index()));
            self.mk_node(j, low, self.high(g.index()))
        } else {
            let low = self.union(self.low(f.index()), self.low(g.index()));
            let high = self.union(self.high(f.index()), self.high(g.index()));
            self.mk_node(i, low, high)
        };
        self.remember(key, result)
    }

    /// Adds the empty product to the family.
    fn attach_base(&self, f: Ref) -> Ref {
        if self.is_empty_set(f) {
            return self.base();
        }
        if self.is_base(f) {
            return f;
        }
        let index = f.index();
        let low = self.attach_base(self.low(index));
        self.mk_node(self.variable(index), low, self.high(index))
    }

    pub fn intersect(&self, f: Ref, g: Ref) -> Ref {
        if self.is_empty_set(f) || self.is_empty_set(g) {
            return self.empty();
        }
        if f == g {
            return f;
        }
        if self.is_base(f) {
            return if self.contains_base(g) { self.base() } else { self.empty() };
        }
        if self.is_base(g) {
            return if self.contains_base(f) { self.base() } else { self.empty() };
        }

        let (f, g) = if f.bits() <= g.bits() { (f, g) } else { (g, f) };
        let key = OpKey::Intersect(f, g);
        if let Some(r) = self.cached(key) {
            return r;
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let result = if i < j {
            self.intersect(self.low(f.index()), g)
        } else if i > j {
            self.intersect(f, self.low(g.index()))
        } else {
            let low = self.intersect(self.low(f.index()), self.low(g.index()));
            let high = self.intersect(self.high(f.index()), self.high(g.index()));
            self.mk_node(i, low, high)
        };
        self.remember(key, result)
    }

    pub fn diff(&self, f: Ref, g: Ref) -> Ref {
        if self.is_empty_set(f) || f == g {
            return self.empty();
        }
        if self.is_empty_set(g) {
            return f;
        }
        if self.is_base(f) {
            return if self.contains_base(g) { self.empty() } else { f };
        }

        let key = OpKey::Diff(f, g);
        if let Some(r) = self.cached(key) {
            return r;
        }

        if self.is_base(g) {
            // Only the empty product is removed.
            let index = f.index();
            let low = self.diff(self.low(index), g);
            let result = self.mk_node(self.variable(index), low, self.high(index));
            return self.remember(key, result);
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let result = if i < j {
            let low = self.diff(self.low(f.index()), g);
            self.mk_node(i, low, self.high(f.index()))
        } else if i > j {
            self.diff(f, self.low(g.index()))
        } else {
            let low = self.diff(self.low(f.index()), self.low(g.index()));
            let high = self.diff(self.high(f.index()), self.high(g.index()));
            self.mk_node(i, low, high)
        };
        self.remember(key, result)
    }

    /// Whether the family contains the empty product.
    pub fn contains_base(&self, f: Ref) -> bool {
        let mut f = f;
        while !self.is_terminal(f) {
            f = self.low(f.index());
        }
        self.is_base(f)
    }

    /// Set product: every union of a product from `f` with one from `g`,
    /// pruned to at most `limit` literals per product.
    ///
    /// Pruned paths raise the sticky truncation flag; the result is then a
    /// conservative under-approximation of the full family.
    pub fn product(&self, f: Ref, g: Ref, limit: u32) -> Ref {
        if self.is_empty_set(f) || self.is_empty_set(g) {
            return self.empty();
        }
        if self.is_base(f) {
            return self.truncate(g, limit);
        }
        if self.is_base(g) {
            return self.truncate(f, limit);
        }

        let (f, g) = if f.bits() <= g.bits() { (f, g) } else { (g, f) };
        let key = OpKey::Product(f, g, limit);
        if let Some(r) = self.cached(key) {
            return r;
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let top = i.min(j);
        let (f1, f0) = if i == top {
            (self.high(f.index()), self.low(f.index()))
        } else {
            (self.empty(), f)
        };
        let (g1, g0) = if j == top {
            (self.high(g.index()), self.low(g.index()))
        } else {
            (self.empty(), g)
        };

        let low = self.product(f0, g0, limit);
        let result = if limit == 0 {
            if !self.is_empty_set(f1) || !self.is_empty_set(g1) {
                self.truncated.set(true);
            }
            low
        } else {
            let inner = if limit == NO_LIMIT { NO_LIMIT } else { limit - 1 };
            let a = self.product(f1, g1, inner);
            let b = self.product(f1, g0, inner);
            let c = self.product(f0, g1, inner);
            let high = self.union(self.union(a, b), c);
            self.mk_node(top, low, high)
        };
        self.remember(key, result)
    }

    /// Removes products longer than `limit` literals.
    pub fn truncate(&self, f: Ref, limit: u32) -> Ref {
        if self.is_terminal(f) || limit == NO_LIMIT {
            return f;
        }
        if limit == 0 {
            self.truncated.set(true);
            return if self.contains_base(f) { self.base() } else { self.empty() };
        }

        let key = OpKey::Truncate(f, limit);
        if let Some(r) = self.cached(key) {
            return r;
        }

        let index = f.index();
        let low = self.truncate(self.low(index), limit);
        let high = self.truncate(self.high(index), limit - 1);
        let result = self.mk_node(self.variable(index), low, high);
        self.remember(key, result)
    }

    /// Removes from `f` every product that is a (non-strict) superset of
    /// some product in `g`.
    pub fn subsume(&self, f: Ref, g: Ref) -> Ref {
        if self.is_empty_set(f) || self.is_empty_set(g) {
            return f;
        }
        if self.contains_base(g) {
            // Everything is a superset of the empty product.
            return self.empty();
        }
        if self.is_base(f) {
            return f;
        }

        let key = OpKey::Subsume(f, g);
        if let Some(r) = self.cached(key) {
            return r;
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let result = if j < i {
            // Products of g holding j cannot dominate products without it.
            self.subsume(f, self.low(g.index()))
        } else if i < j {
            let low = self.subsume(self.low(f.index()), g);
            let high = self.subsume(self.high(f.index()), g);
            self.mk_node(i, low, high)
        } else {
            let low = self.subsume(self.low(f.index()), self.low(g.index()));
            let partial = self.subsume(self.high(f.index()), self.high(g.index()));
            let high = self.subsume(partial, self.low(g.index()));
            self.mk_node(i, low, high)
        };
        self.remember(key, result)
    }

    /// Classical subset-elimination: keeps only the minimal products.
    pub fn minimize(&self, f: Ref) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        let key = OpKey::Minimize(f);
        if let Some(r) = self.cached(key) {
            return r;
        }

        let index = f.index();
        let low = self.minimize(self.low(index));
        let high = self.minimize(self.high(index));
        let high = self.subsume(high, low);
        let result = self.mk_node(self.variable(index), low, high);
        debug!("minimize({f}) -> {result}");
        self.remember(key, result)
    }

    /// Family of at-least-k-of-n over argument families:
    /// `atleast(k; x:xs) = (x * atleast(k-1; xs)) | atleast(k; xs)`.
    pub fn atleast_of(&self, args: &[Ref], k: usize, limit: u32) -> Ref {
        let mut memo = HashMap::new();
        self.atleast_rec(args, k, 0, limit, &mut memo)
    }

    fn atleast_rec(
        &self,
        args: &[Ref],
        k: usize,
        from: usize,
        limit: u32,
        memo: &mut HashMap<(usize, usize), Ref>,
    ) -> Ref {
        if k == 0 {
            return self.base();
        }
        if k > args.len() - from {
            return self.empty();
        }
        if let Some(&r) = memo.get(&(k, from)) {
            return r;
        }
        let with = self.atleast_rec(args, k - 1, from + 1, limit, memo);
        let with = self.product(args[from], with, limit);
        let without = self.atleast_rec(args, k, from + 1, limit, memo);
        let result = self.union(with, without);
        memo.insert((k, from), result);
        result
    }

    /// Number of products in the family.
    pub fn count(&self, f: Ref) -> u64 {
        if self.is_empty_set(f) {
            return 0;
        }
        if self.is_base(f) {
            return 1;
        }
        if let Some(&r) = self.count_cache.borrow().get(&f) {
            return r;
        }
        let index = f.index();
        let result = self.count(self.low(index)) + self.count(self.high(index));
        self.count_cache.borrow_mut().insert(f, result);
        result
    }

    /// Number of nodes in the family's graph.
    pub fn size(&self, f: Ref) -> usize {
        let mut seen = HashSet::new();
        let mut stack = vec![f.index()];
        while let Some(index) = stack.pop() {
            if !seen.insert(index) || index <= 2 {
                continue;
            }
            stack.push(self.low(index).index());
            stack.push(self.high(index).index());
        }
        seen.len()
    }

    /// Iterator over the products as sorted literal-code vectors.
    pub fn products(&self, f: Ref) -> Products<'_> {
        Products { zbdd: self, stack: vec![(f, Vec::new())] }
    }
}

impl Default for Zbdd {
    fn default() -> Self {
        Zbdd::new(16)
    }
}

impl std::fmt::Debug for Zbdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zbdd")
            .field("nodes", &self.storage.borrow().size())
            .field("truncated", &self.truncated.get())
            .finish()
    }
}

pub struct Products<'a> {
    zbdd: &'a Zbdd,
    stack: Vec<(Ref, Vec<u32>)>,
}

impl Iterator for Products<'_> {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, product)) = self.stack.pop() {
            if self.zbdd.is_empty_set(node) {
                continue;
            }
            if self.zbdd.is_base(node) {
                return Some(product);
            }
            let index = node.index();
            let variable = self.zbdd.variable(index);
            self.stack.push((self.zbdd.low(index), product.clone()));
            let mut with = product;
            with.push(variable);
            self.stack.push((self.zbdd.high(index), with));
        }
        None
    }
}

/// Compiles a preprocessed PDAG directly into its product family,
/// without going through a BDD.
///
/// Gates evaluate bottom-up as set operations: OR is union, AND is the
/// set product under the size limit, ATLEAST expands k-out-of-n. The
/// sinking pass guarantees negation only on literals. The family is
/// minimized once at the end; the top-down expansion engine differs by
/// minimizing after every gate.
pub fn from_pdag(
    zbdd: &Zbdd,
    pdag: &Pdag,
    order: &VariableOrder,
    limit: u32,
    guard: &Guard,
) -> Result<Ref> {
    let family_of = |arg: Ref, gates: &HashMap<u32, Ref>| -> Result<Ref> {
        let index = arg.index();
        if pdag.is_constant(index) {
            Ok(if arg.is_complement() { zbdd.empty() } else { zbdd.base() })
        } else if pdag.is_variable(index) {
            let position = order
                .position(index)
                .ok_or_else(|| Error::Logic(format!("unordered variable {index}")))?;
            Ok(zbdd.product_of([literal(position, arg.is_complement())]))
        } else if arg.is_complement() {
            Err(Error::Logic(format!("gate-level complement on {arg} reached the set engine")))
        } else {
            Ok(gates[&index])
        }
    };

    let mut gates: HashMap<u32, Ref> = HashMap::new();
    for gate_index in pdag.topological_order() {
        guard.check()?;
        let gate = pdag.gate(gate_index);
        let args = gate
            .args
            .iter()
            .map(|&arg| family_of(arg, &gates))
            .collect::<Result<Vec<Ref>>>()?;
        let family = match gate.connective {
            GateType::Or => args.iter().fold(zbdd.empty(), |acc, &a| zbdd.union(acc, a)),
            GateType::And => args.iter().fold(zbdd.base(), |acc, &a| zbdd.product(acc, a, limit)),
            GateType::AtLeast(k) => zbdd.atleast_of(&args, k as usize, limit),
            GateType::Xor => {
                return Err(Error::Logic("XOR survived preprocessing".into()));
            }
        };
        gates.insert(gate_index, family);
    }

    let root = family_of(pdag.root(), &gates)?;
    let minimal = zbdd.minimize(root);
    debug!(
        "set engine: {} minimal products, {} nodes",
        zbdd.count(minimal),
        zbdd.size(minimal)
    );
    Ok(minimal)
}

/// Extracts the product family of a BDD function.
///
/// For coherent functions this is the minimal-solutions recursion, exact
/// and minimal by construction. For non-coherent functions the else
/// branch contributes negated literals and the caller should minimize;
/// the result is a family of implicants minimal under subsumption.
pub fn from_bdd(zbdd: &Zbdd, bdd: &Bdd, root: Ref, coherent: bool, limit: u32) -> Ref {
    let mut memo = HashMap::new();
    let result = convert(zbdd, bdd, root, coherent, limit, &mut memo);
    zbdd.minimize(result)
}

fn convert(
    zbdd: &Zbdd,
    bdd: &Bdd,
    f: Ref,
    coherent: bool,
    limit: u32,
    memo: &mut HashMap<Ref, Ref>,
) -> Ref {
    if bdd.is_one(f) {
        return zbdd.base();
    }
    if bdd.is_zero(f) {
        return zbdd.empty();
    }
    if let Some(&r) = memo.get(&f) {
        return r;
    }

    let index = f.index();
    let position = bdd.variable(index);
    let (mut high, mut low) = (bdd.high(index), bdd.low(index));
    if f.is_complement() {
        high = -high;
        low = -low;
    }
    let zh = convert(zbdd, bdd, high, coherent, limit, memo);
    let zl = convert(zbdd, bdd, low, coherent, limit, memo);

    let result = if coherent {
        let zh = zbdd.subsume(zh, zl);
        let node = zbdd.mk_node(literal(position, false), zl, zh);
        zbdd.truncate(node, limit)
    } else {
        let pos = zbdd.mk_node(literal(position, false), zbdd.empty(), zh);
        let neg = zbdd.mk_node(literal(position, true), zbdd.empty(), zl);
        let node = zbdd.union(pos, neg);
        zbdd.truncate(node, limit)
    };
    memo.insert(f, result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(zbdd: &Zbdd, f: Ref) -> Vec<Vec<u32>> {
        let mut all: Vec<Vec<u32>> = zbdd.products(f).collect();
        all.sort();
        all
    }

    #[test]
    fn test_terminals() {
        let zbdd = Zbdd::default();
        assert_eq!(zbdd.count(zbdd.empty()), 0);
        assert_eq!(zbdd.count(zbdd.base()), 1);
    }

    #[test]
    fn test_product_of_and_count() {
        let zbdd = Zbdd::default();
        let ab = zbdd.product_of([2, 4]);
        assert_eq!(zbdd.count(ab), 1);
        assert_eq!(family(&zbdd, ab), vec![vec![2, 4]]);
    }

    #[test]
    fn test_union_intersect_diff() {
        let zbdd = Zbdd::default();
        let a = zbdd.product_of([2]);
        let b = zbdd.product_of([4]);
        let ab = zbdd.product_of([2, 4]);

        let u = zbdd.union(zbdd.union(a, b), ab);
        assert_eq!(zbdd.count(u), 3);

        let i = zbdd.intersect(u, zbdd.union(a, ab));
        assert_eq!(family(&zbdd, i), vec![vec![2], vec![2, 4]]);

        let d = zbdd.diff(u, ab);
        assert_eq!(family(&zbdd, d), vec![vec![2], vec![4]]);
    }

    #[test]
    fn test_union_is_canonical() {
        let zbdd = Zbdd::default();
        let a = zbdd.product_of([2]);
        let b = zbdd.product_of([4]);
        assert_eq!(zbdd.union(a, b), zbdd.union(b, a));
    }

    #[test]
    fn test_set_product() {
        let zbdd = Zbdd::default();
        let left = zbdd.union(zbdd.product_of([2]), zbdd.product_of([4]));
        let right = zbdd.union(zbdd.product_of([6]), zbdd.product_of([8]));
        let prod = zbdd.product(left, right, NO_LIMIT);
        assert_eq!(
            family(&zbdd, prod),
            vec![vec![2, 6], vec![2, 8], vec![4, 6], vec![4, 8]]
        );
        assert!(!zbdd.was_truncated());
    }

    #[test]
    fn test_product_idempotent_literal() {
        let zbdd = Zbdd::default();
        let a = zbdd.product_of([2]);
        let prod = zbdd.product(a, a, NO_LIMIT);
        assert_eq!(family(&zbdd, prod), vec![vec![2]]);
    }

    #[test]
    fn test_product_size_cutoff() {
        let zbdd = Zbdd::default();
        let ab = zbdd.product_of([2, 4]);
        let cd = zbdd.product_of([6, 8]);
        let capped = zbdd.product(ab, cd, 3);
        assert!(zbdd.is_empty_set(capped));
        assert!(zbdd.was_truncated());

        zbdd.reset_truncated();
        let fits = zbdd.product(ab, cd, 4);
        assert_eq!(family(&zbdd, fits), vec![vec![2, 4, 6, 8]]);
        assert!(!zbdd.was_truncated());
    }

    #[test]
    fn test_truncate_keeps_short_products() {
        let zbdd = Zbdd::default();
        let f = zbdd.union(zbdd.product_of([2]), zbdd.product_of([4, 6, 8]));
        let t = zbdd.truncate(f, 2);
        assert_eq!(family(&zbdd, t), vec![vec![2]]);
        assert!(zbdd.was_truncated());
    }

    #[test]
    fn test_subsume_removes_supersets() {
        let zbdd = Zbdd::default();
        let f = zbdd.union(zbdd.product_of([2, 4]), zbdd.product_of([6]));
        let g = zbdd.product_of([2]);
        let s = zbdd.subsume(f, g);
        // {2,4} is a superset of {2}; {6} is not.
        assert_eq!(family(&zbdd, s), vec![vec![6]]);
    }

    #[test]
    fn test_minimize() {
        let zbdd = Zbdd::default();
        let f = zbdd.union(
            zbdd.union(zbdd.product_of([2]), zbdd.product_of([2, 4])),
            zbdd.product_of([4, 6]),
        );
        let m = zbdd.minimize(f);
        assert_eq!(family(&zbdd, m), vec![vec![2], vec![4, 6]]);
        // A minimal family is a fixpoint.
        assert_eq!(zbdd.minimize(m), m);
    }

    #[test]
    fn test_minimize_with_base() {
        let zbdd = Zbdd::default();
        let f = zbdd.union(zbdd.base(), zbdd.product_of([2]));
        assert_eq!(zbdd.minimize(f), zbdd.base());
    }

    #[test]
    fn test_from_bdd_coherent() {
        let bdd = Bdd::default();
        let zbdd = Zbdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);

        let and = bdd.apply_and(x, y);
        let z = from_bdd(&zbdd, &bdd, and, true, NO_LIMIT);
        assert_eq!(family(&zbdd, z), vec![vec![literal(1, false), literal(2, false)]]);

        let or = bdd.apply_or(x, y);
        let z = from_bdd(&zbdd, &bdd, or, true, NO_LIMIT);
        assert_eq!(
            family(&zbdd, z),
            vec![vec![literal(1, false)], vec![literal(2, false)]]
        );
    }

    #[test]
    fn test_from_bdd_negated_literal() {
        let bdd = Bdd::default();
        let zbdd = Zbdd::default();
        let x = bdd.mk_var(1);
        let z = from_bdd(&zbdd, &bdd, -x, false, NO_LIMIT);
        assert_eq!(family(&zbdd, z), vec![vec![literal(1, true)]]);
    }

    #[test]
    fn test_from_bdd_minimality() {
        // (a & b) | a == a: conversion must not leak the dominated {a, b}.
        let bdd = Bdd::default();
        let zbdd = Zbdd::default();
        let a = bdd.mk_var(1);
        let b = bdd.mk_var(2);
        let f = bdd.apply_or(bdd.apply_and(a, b), a);
        let z = from_bdd(&zbdd, &bdd, f, true, NO_LIMIT);
        assert_eq!(family(&zbdd, z), vec![vec![literal(1, false)]]);
    }

    #[test]
    fn test_atleast_of() {
        let zbdd = Zbdd::default();
        let args: Vec<Ref> = [2, 4, 6].map(|v| zbdd.product_of([v])).to_vec();
        let two_of_three = zbdd.atleast_of(&args, 2, NO_LIMIT);
        assert_eq!(
            family(&zbdd, two_of_three),
            vec![vec![2, 4], vec![2, 6], vec![4, 6]]
        );
    }

    #[test]
    fn test_from_pdag_matches_from_bdd() {
        use crate::expression::Expression;
        use crate::model::{Arg, Connective, Model};
        use crate::preprocess::{preprocess, PreprocessOptions};

        // (a & b) | (b & c): shared b exercises the set product.
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let b = model.add_basic_event("b", Expression::Constant(0.1));
        let c = model.add_basic_event("c", Expression::Constant(0.1));
        let left = model.add_gate("left", Connective::And, vec![Arg::basic(a), Arg::basic(b)]);
        let right = model.add_gate("right", Connective::And, vec![Arg::basic(b), Arg::basic(c)]);
        let top = model.add_gate("top", Connective::Or, vec![Arg::gate(left), Arg::gate(right)]);
        model.set_top(top);

        let mut pdag = Pdag::from_model(&model).unwrap();
        preprocess(&mut pdag, &PreprocessOptions::default(), &Guard::new()).unwrap();
        let order = VariableOrder::from_pdag(&pdag);

        let zbdd = Zbdd::default();
        let direct = from_pdag(&zbdd, &pdag, &order, NO_LIMIT, &Guard::new()).unwrap();

        let bdd = Bdd::default();
        let root = crate::bdd::from_pdag(&bdd, &pdag, &order);
        let converted = from_bdd(&zbdd, &bdd, root, true, NO_LIMIT);

        assert_eq!(family(&zbdd, direct), family(&zbdd, converted));
        assert_eq!(zbdd.count(direct), 2);
    }

    #[test]
    fn test_from_pdag_cutoff_flags_truncation() {
        use crate::expression::Expression;
        use crate::model::{Arg, Connective, Model};
        use crate::preprocess::{preprocess, PreprocessOptions};

        let mut model = Model::new();
        let ids: Vec<_> = (0..3)
            .map(|i| model.add_basic_event(format!("e{i}"), Expression::Constant(0.1)))
            .collect();
        let top = model.add_gate(
            "top",
            Connective::And,
            ids.iter().map(|&i| Arg::basic(i)).collect(),
        );
        model.set_top(top);

        let mut pdag = Pdag::from_model(&model).unwrap();
        preprocess(&mut pdag, &PreprocessOptions::default(), &Guard::new()).unwrap();
        let order = VariableOrder::from_pdag(&pdag);

        let zbdd = Zbdd::default();
        let capped = from_pdag(&zbdd, &pdag, &order, 2, &Guard::new()).unwrap();
        assert!(zbdd.is_empty_set(capped));
        assert!(zbdd.was_truncated());
    }
}
