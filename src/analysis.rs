//! Analysis lifecycle: `Built -> Preprocessed -> Compiled -> Analyzed`.
//!
//! One [`Analysis`] owns all per-run state: the expanded model, the PDAG,
//! the diagram managers and their caches. Transitions are one-way;
//! re-analysis means a fresh engine. A cutoff exhausted during
//! compilation degrades to a warning instead of aborting; cancellation
//! and deadlines are polled at pass, expansion and trial granularity.

use log::info;

use crate::bdd::{self, Bdd};
use crate::ccf;
use crate::error::{Error, Result, Warning};
use crate::expression::Expression;
use crate::guard::Guard;
use crate::importance::{self, Importance};
use crate::mocus;
use crate::model::Model;
use crate::order::VariableOrder;
use crate::pdag::Pdag;
use crate::preprocess::{preprocess, PreprocessOptions};
use crate::probability::{self, Product, TimeSeries};
use crate::reference::Ref;
use crate::settings::{Approximation, Engine, Settings};
use crate::uncertainty::{self, SilResult, UncertaintyResult};
use crate::zbdd::{self, Zbdd, NO_LIMIT};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Built,
    Preprocessed,
    Compiled,
    Analyzed,
    Reported,
    Cancelled,
}

/// One product with its quantification.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    /// Signed 1-based basic-event indices, sorted by magnitude.
    pub literals: Product,
    pub probability: f64,
    /// Share of the total probability (rare-event sense).
    pub contribution: f64,
}

#[derive(Debug, Clone)]
pub struct ImportanceRecord {
    pub event: String,
    pub probability: f64,
    pub measures: Importance,
}

/// Everything the report sink consumes.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub p_total: f64,
    pub products: Vec<ProductRecord>,
    pub importance: Vec<ImportanceRecord>,
    pub uncertainty: Option<UncertaintyResult>,
    pub sil: Option<SilResult>,
    pub warnings: Vec<Warning>,
}

pub struct Analysis {
    model: Model,
    settings: Settings,
    guard: Guard,
    state: State,
    warnings: Vec<Warning>,
    pdag: Option<Pdag>,
    order: Option<VariableOrder>,
    bdd: Option<Bdd>,
    bdd_root: Option<Ref>,
    products: Vec<Product>,
    /// Order position -> 0-based event index; entry 0 unused.
    position_events: Vec<usize>,
}

impl Analysis {
    /// Validates the model, expands CCF groups, and enters `Built`.
    pub fn new(model: Model, settings: Settings) -> Result<Self> {
        Self::with_guard(model, settings, Guard::new())
    }

    pub fn with_guard(mut model: Model, settings: Settings, guard: Guard) -> Result<Self> {
        model.validate(settings.mission_time)?;
        ccf::expand(&mut model)?;
        Ok(Self {
            model,
            settings,
            guard,
            state: State::Built,
            warnings: Vec::new(),
            pdag: None,
            order: None,
            bdd: None,
            bdd_root: None,
            products: Vec::new(),
            position_events: Vec::new(),
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn guard(&self) -> Guard {
        self.guard.clone()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn pdag(&self) -> Option<&Pdag> {
        self.pdag.as_ref()
    }

    fn expect_state(&self, expected: State) -> Result<()> {
        if self.state != expected {
            return Err(Error::Logic(format!(
                "lifecycle violation: expected {expected:?}, currently {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn observe<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(Error::Cancelled)) {
            self.state = State::Cancelled;
        }
        result
    }

    fn top_constant(&self) -> Option<bool> {
        let pdag = self.pdag.as_ref()?;
        if pdag.is_constant(pdag.root().index()) {
            Some(!pdag.root().is_complement())
        } else {
            None
        }
    }

    /// Builds and rewrites the PDAG, computes the variable order.
    pub fn preprocess(&mut self) -> Result<()> {
        self.expect_state(State::Built)?;
        let mut pdag = Pdag::from_model(&self.model)?;
        let options = PreprocessOptions { distribution_bound: self.settings.distribution_bound };
        let guard = self.guard.clone();
        let result = preprocess(&mut pdag, &options, &guard);
        self.observe(result)?;

        if pdag.is_constant(pdag.root().index()) {
            self.warnings.push(Warning::TopConstant(!pdag.root().is_complement()));
        }

        let order = VariableOrder::from_pdag(&pdag);
        let mut position_events = vec![usize::MAX];
        for &variable in order.variables() {
            position_events.push(pdag.event_of(variable) as usize);
        }

        self.pdag = Some(pdag);
        self.order = Some(order);
        self.position_events = position_events;
        self.state = State::Preprocessed;
        Ok(())
    }

    /// Runs the chosen engine; cutoff exhaustion degrades to a warning.
    pub fn compile(&mut self) -> Result<()> {
        self.expect_state(State::Preprocessed)?;
        if self.top_constant().is_some() {
            self.state = State::Compiled;
            return Ok(());
        }

        let limit = self.settings.limit_order.map(|l| l as u32).unwrap_or(NO_LIMIT);
        let coherent = self.pdag.as_ref().expect("preprocessed").is_coherent();
        // The set-based engines produce products on their own; a BDD is
        // still needed whenever exact quantification is requested.
        let need_bdd = self.settings.engine == Engine::Bdd
            || self.settings.approximation == Approximation::Exact;
        let zbdd = Zbdd::default();

        let direct_root = match self.settings.engine {
            Engine::Bdd => None,
            Engine::Zbdd => {
                let guard = self.guard.clone();
                let result = {
                    let pdag = self.pdag.as_ref().expect("preprocessed");
                    let order = self.order.as_ref().expect("preprocessed");
                    zbdd::from_pdag(&zbdd, pdag, order, limit, &guard)
                };
                Some(self.observe(result)?)
            }
            Engine::Mocus => {
                let guard = self.guard.clone();
                let result = {
                    let pdag = self.pdag.as_ref().expect("preprocessed");
                    let order = self.order.as_ref().expect("preprocessed");
                    mocus::analyze(&zbdd, pdag, order, limit, &guard)
                };
                Some(self.observe(result)?)
            }
        };

        if need_bdd {
            let manager = Bdd::default();
            let root = {
                let pdag = self.pdag.as_ref().expect("preprocessed");
                let order = self.order.as_ref().expect("preprocessed");
                bdd::from_pdag(&manager, pdag, order)
            };
            info!("BDD compiled: {} nodes", manager.size(root));
            self.bdd = Some(manager);
            self.bdd_root = Some(root);
        }

        let zbdd_root = match direct_root {
            Some(root) => root,
            None => {
                let manager = self.bdd.as_ref().expect("BDD built for conversion");
                let root = self.bdd_root.expect("BDD built for conversion");
                zbdd::from_bdd(&zbdd, manager, root, coherent, limit)
            }
        };
        let truncated = zbdd.was_truncated();

        let mut products: Vec<Product> = {
            let pdag = self.pdag.as_ref().expect("preprocessed");
            let order = self.order.as_ref().expect("preprocessed");
            zbdd.products(zbdd_root)
                .map(|codes| {
                    let mut product: Product = codes
                        .into_iter()
                        .map(|code| {
                            let (position, negated) = zbdd::decode_literal(code);
                            let event = pdag.event_of(order.variable(position)) as i32 + 1;
                            if negated {
                                -event
                            } else {
                                event
                            }
                        })
                        .collect();
                    product.sort_by_key(|lit| lit.abs());
                    product
                })
                .collect()
        };
        // A product holding a literal and its complement is unsatisfiable;
        // the set algebra cannot cancel it, so drop it here. Sorting by
        // magnitude puts such a pair side by side.
        products.retain(|product| !product.windows(2).any(|w| w[0].abs() == w[1].abs()));
        products.sort();

        if truncated {
            self.warnings.push(Warning::ProductsTruncated);
        }

        // Probability cutoff: drop negligible products from the listing.
        if let Some(cut_off) = self.settings.cut_off {
            let p = self.event_probabilities(self.settings.mission_time);
            let before = products.len();
            products.retain(|product| probability::product_probability(product, &p) >= cut_off);
            if products.len() < before {
                self.warnings.push(Warning::ProductsTruncated);
            }
        }

        info!("{} minimal products", products.len());
        self.products = products;
        self.state = State::Compiled;
        Ok(())
    }

    /// Quantifies probability, importance, uncertainty and SIL.
    pub fn analyze(&mut self) -> Result<Outcome> {
        self.expect_state(State::Compiled)?;
        let mut warnings = std::mem::take(&mut self.warnings);
        let t = self.settings.mission_time;
        let p_events = self.event_probabilities(t);

        let p_total = match self.top_constant() {
            Some(true) => 1.0,
            Some(false) => 0.0,
            None => match self.settings.approximation {
                Approximation::Exact => {
                    let manager = self
                        .bdd
                        .as_ref()
                        .ok_or_else(|| Error::Logic("exact approximation without a BDD".into()))?;
                    let root = self.bdd_root.expect("compiled");
                    manager.clear_probability_cache();
                    manager.probability(root, &self.position_vector(&p_events))
                }
                Approximation::RareEvent => {
                    probability::rare_event(&self.products, &p_events, &mut warnings)
                }
                Approximation::Mcub => {
                    if !self.pdag.as_ref().expect("compiled").is_coherent() {
                        warnings.push(Warning::NonCoherentMcub);
                    }
                    probability::mcub(&self.products, &p_events)
                }
            },
        };

        let products: Vec<ProductRecord> = self
            .products
            .iter()
            .map(|literals| {
                let p = probability::product_probability(literals, &p_events);
                ProductRecord {
                    literals: literals.clone(),
                    probability: p,
                    contribution: if p_total > 0.0 { p / p_total } else { 0.0 },
                }
            })
            .collect();

        let importance = if self.settings.analyze_importance && self.top_constant().is_none() {
            self.importance(&p_events, p_total)
        } else {
            Vec::new()
        };

        let uncertainty = if self.settings.analyze_uncertainty && self.top_constant().is_none() {
            let result = self.uncertainty();
            Some(self.observe(result)?)
        } else {
            None
        };

        let sil = if self.settings.analyze_sil && self.top_constant().is_none() {
            Some(self.sil(&mut warnings)?)
        } else {
            None
        };

        self.state = State::Analyzed;
        Ok(Outcome { p_total, products, importance, uncertainty, sil, warnings })
    }

    /// One-shot driver through the whole lifecycle.
    pub fn run(&mut self) -> Result<Outcome> {
        self.preprocess()?;
        self.compile()?;
        self.analyze()
    }

    /// Marks the outcome as delivered; the engine is spent afterwards.
    pub fn mark_reported(&mut self) -> Result<()> {
        self.expect_state(State::Analyzed)?;
        self.state = State::Reported;
        Ok(())
    }

    /// Lazy `(t, P(t))` series on the exact path, when a BDD exists.
    pub fn probability_series(&self) -> Option<TimeSeries<'_>> {
        let manager = self.bdd.as_ref()?;
        let root = self.bdd_root?;
        Some(TimeSeries::new(
            manager,
            root,
            self.position_events.clone(),
            self.expressions(),
            self.settings.mission_time,
            self.settings.num_time_points,
        ))
    }

    fn expressions(&self) -> Vec<Expression> {
        self.model.basic_events.iter().map(|e| e.expression.clone()).collect()
    }

    fn event_probabilities(&self, t: f64) -> Vec<f64> {
        self.model.basic_events.iter().map(|e| e.expression.value(t)).collect()
    }

    fn position_vector(&self, p_events: &[f64]) -> Vec<f64> {
        let mut p = vec![0.0; self.position_events.len()];
        for (position, &event) in self.position_events.iter().enumerate().skip(1) {
            p[position] = p_events[event];
        }
        p
    }

    /// Top probability from the product family under an event vector.
    fn approximate(&self, p_events: &[f64]) -> f64 {
        match self.settings.approximation {
            Approximation::Mcub => probability::mcub(&self.products, p_events),
            _ => self
                .products
                .iter()
                .map(|product| probability::product_probability(product, p_events))
                .sum::<f64>()
                .min(1.0),
        }
    }

    fn importance(&self, p_events: &[f64], p_total: f64) -> Vec<ImportanceRecord> {
        let measures = match (&self.bdd, self.settings.approximation) {
            (Some(manager), Approximation::Exact) => {
                let root = self.bdd_root.expect("compiled");
                importance::from_bdd(
                    manager,
                    root,
                    &self.position_events,
                    &self.position_vector(p_events),
                    p_total,
                )
            }
            _ => importance::from_products(
                &self.products,
                p_events,
                p_total,
                self.settings.approximation,
            ),
        };
        measures
            .into_iter()
            .map(|(event, measures)| ImportanceRecord {
                event: self.model.basic_events[event].name.clone(),
                probability: p_events[event],
                measures,
            })
            .collect()
    }

    fn uncertainty(&self) -> Result<UncertaintyResult> {
        let expressions = self.expressions();
        let t = self.settings.mission_time;
        let exact = matches!(
            (&self.bdd, self.settings.approximation),
            (Some(_), Approximation::Exact)
        );
        uncertainty::monte_carlo(
            &expressions,
            t,
            self.settings.num_trials,
            self.settings.seed,
            &self.guard,
            |p_events| {
                if exact {
                    let manager = self.bdd.as_ref().expect("compiled");
                    let root = self.bdd_root.expect("compiled");
                    manager.clear_probability_cache();
                    manager.probability(root, &self.position_vector(p_events))
                } else {
                    self.approximate(p_events)
                }
            },
        )
    }

    fn sil(&self, warnings: &mut Vec<Warning>) -> Result<SilResult> {
        let expressions = self.expressions();
        let exact = matches!(
            (&self.bdd, self.settings.approximation),
            (Some(_), Approximation::Exact)
        );
        uncertainty::sil(self.settings.mission_time, self.settings.num_buckets, warnings, |t| {
            let p_events: Vec<f64> = expressions.iter().map(|e| e.value(t)).collect();
            if exact {
                let manager = self.bdd.as_ref().expect("compiled");
                let root = self.bdd_root.expect("compiled");
                manager.clear_probability_cache();
                manager.probability(root, &self.position_vector(&p_events))
            } else {
                self.approximate(&p_events)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Arg, Connective};

    fn two_event_or(q: f64) -> Model {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(q));
        let b = model.add_basic_event("b", Expression::Constant(q));
        let top = model.add_gate("top", Connective::Or, vec![Arg::basic(a), Arg::basic(b)]);
        model.set_top(top);
        model
    }

    #[test]
    fn test_lifecycle_one_way() {
        let mut analysis = Analysis::new(two_event_or(0.1), Settings::default()).unwrap();
        assert_eq!(analysis.state(), State::Built);
        analysis.preprocess().unwrap();
        assert_eq!(analysis.state(), State::Preprocessed);
        // Preprocessing twice violates the one-way machine.
        assert!(matches!(analysis.preprocess(), Err(Error::Logic(_))));
        analysis.compile().unwrap();
        let _ = analysis.analyze().unwrap();
        assert_eq!(analysis.state(), State::Analyzed);
        analysis.mark_reported().unwrap();
        assert_eq!(analysis.state(), State::Reported);
    }

    #[test]
    fn test_or_exact() {
        let mut analysis = Analysis::new(two_event_or(0.1), Settings::default()).unwrap();
        let outcome = analysis.run().unwrap();
        assert!((outcome.p_total - 0.19).abs() < 1e-12);
        assert_eq!(outcome.products.len(), 2);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_constant_top_short_circuits() {
        let mut model = Model::new();
        let a = model.add_basic_event("a", Expression::Constant(0.1));
        let h = model.add_house_event("h", true);
        let top = model.add_gate("top", Connective::Or, vec![Arg::basic(a), Arg::house(h)]);
        model.set_top(top);
        let mut analysis = Analysis::new(model, Settings::default()).unwrap();
        let outcome = analysis.run().unwrap();
        assert_eq!(outcome.p_total, 1.0);
        assert!(outcome.products.is_empty());
        assert_eq!(outcome.warnings, vec![Warning::TopConstant(true)]);
    }

    #[test]
    fn test_cancellation_is_terminal() {
        let model = two_event_or(0.1);
        let guard = Guard::new();
        guard.cancel();
        let mut analysis = Analysis::with_guard(model, Settings::default(), guard).unwrap();
        assert!(matches!(analysis.preprocess(), Err(Error::Cancelled)));
        assert_eq!(analysis.state(), State::Cancelled);
    }

    #[test]
    fn test_engines_agree_on_products() {
        for engine in [Engine::Bdd, Engine::Zbdd, Engine::Mocus] {
            for approximation in [Approximation::Exact, Approximation::RareEvent] {
                let mut analysis = Analysis::new(
                    two_event_or(0.1),
                    Settings::default().with_engine(engine).with_approximation(approximation),
                )
                .unwrap();
                let outcome = analysis.run().unwrap();
                assert_eq!(outcome.products.len(), 2, "{engine:?}/{approximation:?}");
                assert!(outcome.products.iter().all(|p| p.literals.len() == 1));
            }
        }
    }

    #[test]
    fn test_set_engines_skip_the_bdd() {
        // With an approximate quantification, the set-based engines must
        // not build a BDD at all: no probability series is available.
        for engine in [Engine::Zbdd, Engine::Mocus] {
            let settings = Settings::default()
                .with_engine(engine)
                .with_approximation(Approximation::RareEvent);
            let mut analysis = Analysis::new(two_event_or(0.1), settings).unwrap();
            analysis.preprocess().unwrap();
            analysis.compile().unwrap();
            assert!(analysis.probability_series().is_none(), "{engine:?}");
            let outcome = analysis.analyze().unwrap();
            assert!((outcome.p_total - 0.2).abs() < 1e-12);
        }
        // The BDD engine keeps the exact path alive.
        let mut analysis = Analysis::new(two_event_or(0.1), Settings::default()).unwrap();
        analysis.preprocess().unwrap();
        analysis.compile().unwrap();
        assert!(analysis.probability_series().is_some());
        analysis.analyze().unwrap();
    }
}
