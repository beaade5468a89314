//! Probability quantification over engine output.
//!
//! A product is a sorted vector of signed 1-based basic-event indices; a
//! positive literal contributes `p`, a negative one `1 - p`. The exact
//! path evaluates the BDD; the approximations work off the product
//! family: rare-event sums (clamped to 1 with a warning), MCUB multiplies
//! out survival probabilities.

use crate::bdd::Bdd;
use crate::error::Warning;
use crate::expression::Expression;
use crate::reference::Ref;

/// Sorted signed 1-based basic-event indices.
pub type Product = Vec<i32>;

/// Probability of one product under the per-event vector (0-based).
pub fn product_probability(product: &[i32], p: &[f64]) -> f64 {
    product
        .iter()
        .map(|&lit| {
            let q = p[(lit.unsigned_abs() - 1) as usize];
            if lit > 0 {
                q
            } else {
                1.0 - q
            }
        })
        .product()
}

/// Rare-event approximation: the sum of product probabilities.
///
/// Conservative for coherent trees; clamps to 1 and reports a warning
/// when the sum overflows the unit interval.
pub fn rare_event(products: &[Product], p: &[f64], warnings: &mut Vec<Warning>) -> f64 {
    let sum: f64 = products.iter().map(|product| product_probability(product, p)).sum();
    if sum > 1.0 {
        warnings.push(Warning::ProbabilityClamped);
        1.0
    } else {
        sum
    }
}

/// Min-cut upper bound: `1 - prod(1 - P(product))`.
///
/// Never exceeds 1 but is not conservative for non-coherent trees; the
/// caller raises [`Warning::NonCoherentMcub`] in that case.
pub fn mcub(products: &[Product], p: &[f64]) -> f64 {
    1.0 - products
        .iter()
        .map(|product| 1.0 - product_probability(product, p))
        .product::<f64>()
}

/// Builds the per-position probability vector for the BDD at time `t`.
///
/// `events[position]` maps an order position (1-based) to the 0-based
/// basic-event index; entry 0 of the result is unused.
pub fn position_vector(events: &[usize], expressions: &[Expression], t: f64) -> Vec<f64> {
    let mut p = vec![0.0; events.len()];
    for (position, &event) in events.iter().enumerate().skip(1) {
        p[position] = expressions[event].value(t);
    }
    p
}

/// Lazy, restartable series of `(t, P(t))` over `[0, mission_time]`.
///
/// Evaluates the probability expressions at `points + 1` equally spaced
/// sample times and the BDD at each; deterministic and finite.
pub struct TimeSeries<'a> {
    bdd: &'a Bdd,
    root: Ref,
    events: Vec<usize>,
    expressions: Vec<Expression>,
    mission_time: f64,
    points: usize,
    next: usize,
}

impl<'a> TimeSeries<'a> {
    pub fn new(
        bdd: &'a Bdd,
        root: Ref,
        events: Vec<usize>,
        expressions: Vec<Expression>,
        mission_time: f64,
        points: usize,
    ) -> Self {
        Self { bdd, root, events, expressions, mission_time, points: points.max(1), next: 0 }
    }
}

impl Iterator for TimeSeries<'_> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.points {
            return None;
        }
        let t = self.mission_time * self.next as f64 / self.points as f64;
        self.next += 1;
        let p = position_vector(&self.events, &self.expressions, t);
        self.bdd.clear_probability_cache();
        Some((t, self.bdd.probability(self.root, &p)))
    }
}
