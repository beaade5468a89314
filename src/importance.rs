//! Importance measures per basic event.
//!
//! The BDD path computes the conditionals `P(top | b)` by memoized
//! restriction; node probabilities depend only on the subgraph, so the
//! probability cache stays valid across restrictions under one vector.
//! The approximate path recomputes the product-family probability with
//! the event forced to 0 or 1.

use crate::bdd::Bdd;
use crate::probability::{product_probability, Product};
use crate::reference::Ref;
use crate::settings::Approximation;

/// The classical importance measures for one basic event.
#[derive(Debug, Clone, PartialEq)]
pub struct Importance {
    /// Marginal (Birnbaum): `P(top | b=1) - P(top | b=0)`.
    pub mif: f64,
    /// Critical: `MIF * q / P(top)`.
    pub cif: f64,
    /// Diagnosis / Fussell-Vesely: `P(top & b) / P(top)`.
    pub dif: f64,
    /// Risk achievement worth: `P(top | b=1) / P(top)`.
    pub raw: f64,
    /// Risk reduction worth: `P(top) / P(top | b=0)`.
    pub rrw: f64,
}

fn measures(p1: f64, p0: f64, q: f64, p_total: f64) -> Importance {
    let mif = p1 - p0;
    if p_total <= 0.0 {
        return Importance { mif, cif: 0.0, dif: 0.0, raw: 0.0, rrw: 1.0 };
    }
    Importance {
        mif,
        cif: mif * q / p_total,
        dif: q * p1 / p_total,
        raw: p1 / p_total,
        rrw: if p0 > 0.0 { p_total / p0 } else { f64::INFINITY },
    }
}

/// Exact measures from the BDD.
///
/// `events[position]` maps order positions to 0-based event indices;
/// `p` is indexed by position. Returns `(event, importance)` pairs.
pub fn from_bdd(
    bdd: &Bdd,
    root: Ref,
    events: &[usize],
    p: &[f64],
    p_total: f64,
) -> Vec<(usize, Importance)> {
    events
        .iter()
        .enumerate()
        .skip(1)
        .map(|(position, &event)| {
            let position = position as u32;
            let p1 = bdd.probability(bdd.restrict(root, position, true), p);
            let p0 = bdd.probability(bdd.restrict(root, position, false), p);
            (event, measures(p1, p0, p[position as usize], p_total))
        })
        .collect()
}

/// Approximate measures from the product family.
///
/// The conditionals come from re-evaluating the chosen approximation
/// with the event's probability forced to 1 or 0; Fussell-Vesely is the
/// share of products containing the event.
pub fn from_products(
    products: &[Product],
    p: &[f64],
    p_total: f64,
    approximation: Approximation,
) -> Vec<(usize, Importance)> {
    let evaluate = |p: &[f64]| -> f64 {
        match approximation {
            Approximation::Mcub => crate::probability::mcub(products, p),
            _ => products
                .iter()
                .map(|product| product_probability(product, p))
                .sum::<f64>()
                .min(1.0),
        }
    };

    let mut touched: Vec<usize> = products
        .iter()
        .flat_map(|product| product.iter().map(|lit| (lit.unsigned_abs() - 1) as usize))
        .collect();
    touched.sort_unstable();
    touched.dedup();

    touched
        .into_iter()
        .map(|event| {
            let mut modified = p.to_vec();
            modified[event] = 1.0;
            let p1 = evaluate(&modified);
            modified[event] = 0.0;
            let p0 = evaluate(&modified);
            let mut importance = measures(p1, p0, p[event], p_total);
            // Fussell-Vesely directly from the containing products.
            if p_total > 0.0 {
                importance.dif = products
                    .iter()
                    .filter(|product| product.iter().any(|lit| (lit.unsigned_abs() - 1) as usize == event))
                    .map(|product| product_probability(product, p))
                    .sum::<f64>()
                    / p_total;
            }
            (event, importance)
        })
        .collect()
}
