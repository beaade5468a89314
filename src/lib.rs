//! # fta-rs: fault tree analysis in Rust
//!
//! **`fta-rs`** is a manager-centric engine for probabilistic risk and
//! safety analysis on fault trees: Boolean gates over basic events with
//! probability expressions.
//!
//! Given a model, it computes:
//!
//! - the family of **minimal cut sets** (minimal combinations of failures
//!   causing the top event),
//! - the **exact or approximate probability** of the top event,
//! - **importance measures** per basic event,
//! - **uncertainty distributions** via seeded Monte Carlo,
//! - **Safety Integrity Level** histograms over the mission time.
//!
//! ## Architecture
//!
//! The model first becomes a [`pdag::Pdag`], a normalized Boolean DAG with
//! negation on edges. The [`preprocess`] passes rewrite it to a fixpoint
//! (constant folding, De Morgan sinking, coalescing, absorption,
//! structural hashing, module detection). The rewritten graph compiles
//! into a [`bdd::Bdd`] with complement edges for exact quantification,
//! and into a [`zbdd::Zbdd`] (by conversion or by the [`mocus`] top-down
//! expansion) for the product family. The calculators in [`probability`],
//! [`importance`] and [`uncertainty`] run on top of those diagrams, and
//! [`analysis::Analysis`] drives the whole lifecycle.
//!
//! ## Quick Start
//!
//! ```rust
//! use fta_rs::analysis::Analysis;
//! use fta_rs::expression::Expression;
//! use fta_rs::model::{Arg, Connective, Model};
//! use fta_rs::settings::Settings;
//!
//! // top = a AND b with p(a) = p(b) = 0.1
//! let mut model = Model::new();
//! let a = model.add_basic_event("a", Expression::Constant(0.1));
//! let b = model.add_basic_event("b", Expression::Constant(0.1));
//! let top = model.add_gate("top", Connective::And, vec![Arg::basic(a), Arg::basic(b)]);
//! model.set_top(top);
//!
//! let mut analysis = Analysis::new(model, Settings::default()).unwrap();
//! let outcome = analysis.run().unwrap();
//! assert!((outcome.p_total - 0.01).abs() < 1e-12);
//! assert_eq!(outcome.products.len(), 1);
//! ```

pub mod analysis;
pub mod bdd;
pub mod cache;
pub mod ccf;
pub mod dot;
pub mod error;
pub mod expression;
pub mod guard;
pub mod importance;
pub mod input;
pub mod mocus;
pub mod model;
pub mod node;
pub mod order;
pub mod pdag;
pub mod preprocess;
pub mod probability;
pub mod reference;
pub mod report;
pub mod settings;
pub mod storage;
pub mod uncertainty;
pub mod utils;
pub mod zbdd;
