/// Which engine produces the product family.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Engine {
    /// BDD first, products by conversion. Exact probability available.
    #[default]
    Bdd,
    /// Direct ZBDD construction from the PDAG; no BDD is built unless
    /// exact quantification is also requested.
    Zbdd,
    /// Top-down MOCUS expansion over ZBDD, minimizing after every gate.
    Mocus,
}

/// Probability quantification policy.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Approximation {
    /// Exact evaluation on the BDD.
    #[default]
    Exact,
    /// Sum of product probabilities, clamped to 1.
    RareEvent,
    /// Min-cut upper bound: `1 - prod(1 - P(product))`.
    Mcub,
}

/// Per-analysis configuration, consumed by every engine.
///
/// Built with chained setters the way the diagram managers take their
/// configs; defaults match the benchmark expectations of the test suite.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mission_time: f64,
    pub approximation: Approximation,
    pub engine: Engine,
    /// Maximum number of literals per product. `None` means unbounded.
    pub limit_order: Option<usize>,
    /// Products with probability below this bound may be pruned.
    pub cut_off: Option<f64>,
    pub num_trials: usize,
    pub seed: u64,
    /// Number of equal time buckets for the SIL histogram.
    pub num_buckets: usize,
    /// Sample points for the time-dependent probability series.
    pub num_time_points: usize,
    /// Upper bound on argument count for the distribution pass.
    pub distribution_bound: usize,
    pub analyze_importance: bool,
    pub analyze_uncertainty: bool,
    pub analyze_sil: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mission_time: 8760.0,
            approximation: Approximation::default(),
            engine: Engine::default(),
            limit_order: None,
            cut_off: None,
            num_trials: 1000,
            seed: 0,
            num_buckets: 20,
            num_time_points: 20,
            distribution_bound: 8,
            analyze_importance: false,
            analyze_uncertainty: false,
            analyze_sil: false,
        }
    }
}

impl Settings {
    pub fn with_mission_time(mut self, t: f64) -> Self {
        self.mission_time = t;
        self
    }

    pub fn with_approximation(mut self, approximation: Approximation) -> Self {
        self.approximation = approximation;
        self
    }

    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_limit_order(mut self, limit: usize) -> Self {
        self.limit_order = Some(limit);
        self
    }

    pub fn with_cut_off(mut self, cut_off: f64) -> Self {
        self.cut_off = Some(cut_off);
        self
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.num_trials = trials;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_buckets(mut self, buckets: usize) -> Self {
        self.num_buckets = buckets;
        self
    }

    pub fn with_importance(mut self) -> Self {
        self.analyze_importance = true;
        self
    }

    pub fn with_uncertainty(mut self) -> Self {
        self.analyze_uncertainty = true;
        self
    }

    pub fn with_sil(mut self) -> Self {
        self.analyze_sil = true;
        self
    }
}
