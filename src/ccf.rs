//! Common-cause failure group expansion.
//!
//! A CCF group couples a set of basic events through a parametric model.
//! Expansion rewrites the fault tree *before* PDAG construction: every
//! member becomes an OR over freshly generated basic events, one per
//! member subset with non-zero failure probability, so the downstream
//! engines see an ordinary independent-event tree.

use log::info;

use crate::error::{Error, Result};
use crate::expression::Expression;
use crate::model::{Arg, ArgKind, Connective, EventId, Model};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CcfModel {
    /// Single factor beta: either one member alone or the whole group.
    BetaFactor,
    /// Multiple Greek letters, factors rho_2 .. rho_n.
    Mgl,
    /// Alpha factors alpha_1 .. alpha_n over failure multiplicities.
    AlphaFactor,
    /// Direct per-multiplicity fractions phi_1 .. phi_n.
    PhiFactor,
}

#[derive(Debug, Clone)]
pub struct CcfGroup {
    pub name: String,
    pub model: CcfModel,
    pub members: Vec<EventId>,
    pub factors: Vec<f64>,
    /// Total failure probability of one member, shared across the group.
    pub expression: Expression,
}

impl CcfGroup {
    /// Probability weight of one specific subset of size `k`, as a factor
    /// applied to the group's total expression.
    fn subset_factor(&self, k: usize) -> Result<f64> {
        let n = self.members.len();
        debug_assert!(k >= 1 && k <= n);
        let factor = match self.model {
            CcfModel::BetaFactor => {
                let beta = self.factors[0];
                if k == 1 {
                    1.0 - beta
                } else if k == n {
                    beta
                } else {
                    0.0
                }
            }
            CcfModel::Mgl => {
                // m_1 = 1, m_i = rho_i for 2 <= i <= n, m_{n+1} = 0.
                let m = |i: usize| -> f64 {
                    if i <= 1 {
                        1.0
                    } else if i <= n {
                        self.factors[i - 2]
                    } else {
                        0.0
                    }
                };
                let prod: f64 = (1..=k).map(m).product();
                prod * (1.0 - m(k + 1)) / binomial(n - 1, k - 1)
            }
            CcfModel::AlphaFactor => {
                let denom: f64 = self.factors.iter().enumerate().map(|(i, a)| (i + 1) as f64 * a).sum();
                if denom <= 0.0 {
                    return Err(Error::validity_at("alpha factors sum to zero", &self.name));
                }
                k as f64 * self.factors[k - 1] / (binomial(n - 1, k - 1) * denom)
            }
            CcfModel::PhiFactor => self.factors[k - 1] / binomial(n - 1, k - 1),
        };
        if !(0.0..=1.0).contains(&factor) {
            return Err(Error::validity_at(
                format!("subset factor {factor} for multiplicity {k} outside [0, 1]"),
                &self.name,
            ));
        }
        Ok(factor)
    }

    fn validate(&self, model: &Model) -> Result<()> {
        let n = self.members.len();
        if n < 2 {
            return Err(Error::validity_at("CCF group needs at least 2 members", &self.name));
        }
        for &m in &self.members {
            if m >= model.basic_events.len() {
                return Err(Error::validity_at(format!("dangling member #{m}"), &self.name));
            }
        }
        let expected = match self.model {
            CcfModel::BetaFactor => 1,
            CcfModel::Mgl => n - 1,
            CcfModel::AlphaFactor | CcfModel::PhiFactor => n,
        };
        if self.factors.len() != expected {
            return Err(Error::validity_at(
                format!("{:?} over {n} members needs {expected} factors, got {}", self.model, self.factors.len()),
                &self.name,
            ));
        }
        if self.factors.iter().any(|f| !(0.0..=1.0).contains(f)) {
            return Err(Error::validity_at("factors must lie in [0, 1]", &self.name));
        }
        self.expression.validate()?;
        Ok(())
    }
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    let mut result = 1.0;
    for i in 0..k {
        result = result * (n - i) as f64 / (i + 1) as f64;
    }
    result
}

/// Expands every CCF group in place, rewriting member references.
///
/// Each member reference in a gate becomes a reference to an OR gate over
/// the generated subset events containing that member. The original member
/// events stay in the event list but are no longer referenced.
pub fn expand(model: &mut Model) -> Result<()> {
    let groups = std::mem::take(&mut model.ccf_groups);
    for group in &groups {
        group.validate(model)?;
        expand_group(model, group)?;
    }
    Ok(())
}

fn expand_group(model: &mut Model, group: &CcfGroup) -> Result<()> {
    let n = group.members.len();

    // One event per member subset with non-zero weight, enumerated as
    // bitmasks over the member list.
    let mut member_events: Vec<Vec<Arg>> = vec![Vec::new(); n];
    let mut generated = 0usize;
    for mask in 1u64..(1 << n) {
        let k = mask.count_ones() as usize;
        let factor = group.subset_factor(k)?;
        if factor == 0.0 {
            continue;
        }
        let names: Vec<&str> = (0..n)
            .filter(|i| mask & (1 << i) != 0)
            .map(|i| model.basic_events[group.members[i]].name.as_str())
            .collect();
        let event = model.add_basic_event(
            format!("CCF({}) {}", group.name, names.join(" ")),
            Expression::Scaled { factor, base: Box::new(group.expression.clone()) },
        );
        generated += 1;
        for i in 0..n {
            if mask & (1 << i) != 0 {
                member_events[i].push(Arg::basic(event));
            }
        }
    }

    // Each member becomes an OR over the subset events containing it.
    let mut replacement = Vec::with_capacity(n);
    for (i, &member) in group.members.iter().enumerate() {
        let name = format!("{}.ccf", model.basic_events[member].name);
        let gate = model.add_gate(name, Connective::Or, member_events[i].clone());
        replacement.push((member, gate));
    }
    for gate in &mut model.gates {
        for arg in &mut gate.args {
            if arg.kind == ArgKind::Basic {
                if let Some(&(_, g)) = replacement.iter().find(|&&(m, _)| m == arg.index) {
                    *arg = Arg { kind: ArgKind::Gate, index: g, complement: arg.complement };
                }
            }
        }
    }

    info!(
        "CCF group '{}' ({:?}, {} members) expanded into {} events",
        group.name, group.model, n, generated
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GateId;

    fn beta_model() -> (Model, GateId) {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.01));
        let b = model.add_basic_event("b", Expression::Constant(0.01));
        let c = model.add_basic_event("c", Expression::Constant(0.01));
        let top = model.add_gate(
            "top",
            Connective::And,
            vec![Arg::basic(a), Arg::basic(b), Arg::basic(c)],
        );
        model.set_top(top);
        model.ccf_groups.push(CcfGroup {
            name: "pumps".into(),
            model: CcfModel::BetaFactor,
            members: vec![a, b, c],
            factors: vec![0.1],
            expression: Expression::Constant(0.01),
        });
        (model, top)
    }

    #[test]
    fn test_beta_factor_events() {
        let (mut model, _) = beta_model();
        expand(&mut model).unwrap();
        // 3 singletons + 1 full-group event.
        assert_eq!(model.basic_events.len(), 3 + 4);
        let singles: Vec<f64> = model.basic_events[3..6].iter().map(|e| e.expression.value(0.0)).collect();
        for q in singles {
            assert!((q - 0.009).abs() < 1e-12);
        }
        assert!((model.basic_events[6].expression.value(0.0) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_beta_factor_replaces_references() {
        let (mut model, top) = beta_model();
        expand(&mut model).unwrap();
        for arg in &model.gates[top].args {
            assert_eq!(arg.kind, ArgKind::Gate);
            assert_eq!(model.gates[arg.index].connective, Connective::Or);
            assert_eq!(model.gates[arg.index].args.len(), 2);
        }
    }

    #[test]
    fn test_mgl_weights_sum_to_total() {
        // Sum over all subsets of q_k must reproduce Q_total for one member:
        // sum_k C(n-1, k-1) * q_k = Q.
        let group = CcfGroup {
            name: "g".into(),
            model: CcfModel::Mgl,
            members: vec![0, 1, 2],
            factors: vec![0.2, 0.5],
            expression: Expression::Constant(1.0),
        };
        let n = 3;
        let total: f64 = (1..=n)
            .map(|k| binomial(n - 1, k - 1) * group.subset_factor(k).unwrap())
            .sum();
        assert!((total - 1.0).abs() < 1e-12, "got {total}");
    }

    #[test]
    fn test_alpha_weights_sum_to_total() {
        let group = CcfGroup {
            name: "g".into(),
            model: CcfModel::AlphaFactor,
            members: vec![0, 1, 2, 3],
            factors: vec![0.85, 0.08, 0.05, 0.02],
            expression: Expression::Constant(1.0),
        };
        let n = 4;
        let total: f64 = (1..=n)
            .map(|k| binomial(n - 1, k - 1) * group.subset_factor(k).unwrap())
            .sum();
        assert!((total - 1.0).abs() < 1e-12, "got {total}");
    }

    #[test]
    fn test_factor_count_validation() {
        let (mut model, _) = beta_model();
        model.ccf_groups[0].factors = vec![0.1, 0.2];
        assert!(expand(&mut model).is_err());
    }
}
