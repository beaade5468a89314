use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use fta_rs::analysis::Analysis;
use fta_rs::dot;
use fta_rs::error::Error;
use fta_rs::input;
use fta_rs::pdag::Pdag;
use fta_rs::report;
use fta_rs::settings::{Approximation, Engine, Settings};

#[derive(Parser)]
#[command(author, version, about = "Fault tree analysis: minimal cut sets, probability, importance")]
struct Cli {
    /// Input model file (Open-PSA subset)
    input: PathBuf,

    /// Configuration file with key=value lines; flags override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use the BDD engine (default)
    #[arg(long)]
    bdd: bool,

    /// Use the ZBDD engine
    #[arg(long)]
    zbdd: bool,

    /// Use the MOCUS engine
    #[arg(long)]
    mocus: bool,

    /// Rare-event approximation
    #[arg(long = "rare-event")]
    rare_event: bool,

    /// Min-cut upper bound approximation
    #[arg(long)]
    mcub: bool,

    /// Maximum number of literals per product
    #[arg(long = "limit-order", value_name = "N")]
    limit_order: Option<usize>,

    /// Probability cutoff for the product listing
    #[arg(long = "cut-off", value_name = "P")]
    cut_off: Option<f64>,

    /// Quantify the top-event probability (always on; kept for symmetry)
    #[arg(long)]
    probability: bool,

    /// Compute importance measures
    #[arg(long)]
    importance: bool,

    /// Run Monte Carlo uncertainty analysis
    #[arg(long)]
    uncertainty: bool,

    /// Compute the SIL histogram
    #[arg(long)]
    sil: bool,

    /// Monte Carlo trial count
    #[arg(long = "num-trials", value_name = "N")]
    num_trials: Option<usize>,

    /// Monte Carlo seed
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Mission time
    #[arg(long = "mission-time", value_name = "T")]
    mission_time: Option<f64>,

    /// SIL time bucket count
    #[arg(long = "num-buckets", value_name = "B")]
    num_buckets: Option<usize>,

    /// Report output path (stdout when absent)
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Emit the fault tree as DOT instead of analyzing
    #[arg(long)]
    dot: bool,

    /// Verbose engine logging
    #[arg(short, long)]
    verbose: bool,
}

fn settings_from(cli: &Cli) -> Result<Settings, Error> {
    let mut settings = Settings::default();

    if let Some(path) = &cli.config {
        settings = apply_config(settings, path)?;
    }

    if cli.zbdd {
        settings.engine = Engine::Zbdd;
    } else if cli.mocus {
        settings.engine = Engine::Mocus;
    } else if cli.bdd {
        settings.engine = Engine::Bdd;
    }
    if cli.rare_event {
        settings.approximation = Approximation::RareEvent;
    } else if cli.mcub {
        settings.approximation = Approximation::Mcub;
    }
    if let Some(limit) = cli.limit_order {
        settings.limit_order = Some(limit);
    }
    if let Some(cut_off) = cli.cut_off {
        settings.cut_off = Some(cut_off);
    }
    if let Some(trials) = cli.num_trials {
        settings.num_trials = trials;
    }
    if let Some(seed) = cli.seed {
        settings.seed = seed;
    }
    if let Some(t) = cli.mission_time {
        settings.mission_time = t;
    }
    if let Some(buckets) = cli.num_buckets {
        settings.num_buckets = buckets;
    }
    // Probability quantification always runs; the flag exists so scripts
    // can spell out what they ask for.
    let _ = cli.probability;
    settings.analyze_importance |= cli.importance;
    settings.analyze_uncertainty |= cli.uncertainty;
    settings.analyze_sil |= cli.sil;
    Ok(settings)
}

fn apply_config(mut settings: Settings, path: &PathBuf) -> Result<Settings, Error> {
    let text = std::fs::read_to_string(path)?;
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::validity_at("expected key=value", format!("{}:{}", path.display(), number + 1))
        })?;
        let bad = |what: &str| {
            Error::validity_at(
                format!("bad {what}: {value}"),
                format!("{}:{}", path.display(), number + 1),
            )
        };
        match key.trim() {
            "engine" => {
                settings.engine = match value.trim() {
                    "bdd" => Engine::Bdd,
                    "zbdd" => Engine::Zbdd,
                    "mocus" => Engine::Mocus,
                    _ => return Err(bad("engine")),
                }
            }
            "approximation" => {
                settings.approximation = match value.trim() {
                    "exact" => Approximation::Exact,
                    "rare-event" => Approximation::RareEvent,
                    "mcub" => Approximation::Mcub,
                    _ => return Err(bad("approximation")),
                }
            }
            "mission-time" => {
                settings.mission_time = value.trim().parse().map_err(|_| bad("mission time"))?
            }
            "limit-order" => {
                settings.limit_order =
                    Some(value.trim().parse().map_err(|_| bad("limit order"))?)
            }
            "num-trials" => {
                settings.num_trials = value.trim().parse().map_err(|_| bad("trial count"))?
            }
            "seed" => settings.seed = value.trim().parse().map_err(|_| bad("seed"))?,
            "num-buckets" => {
                settings.num_buckets = value.trim().parse().map_err(|_| bad("bucket count"))?
            }
            other => {
                return Err(Error::validity_at(
                    format!("unknown setting `{other}`"),
                    format!("{}:{}", path.display(), number + 1),
                ))
            }
        }
    }
    Ok(settings)
}

fn run(cli: &Cli) -> Result<(), Error> {
    let settings = settings_from(cli)?;
    let model = input::parse_model(&cli.input)?;

    if cli.dot {
        let pdag = Pdag::from_model(&model)?;
        let document = dot::to_dot(&pdag, &model)
            .map_err(|e| Error::Logic(format!("DOT formatting failed: {e}")))?;
        match &cli.output {
            Some(path) => std::fs::write(path, document)?,
            None => print!("{document}"),
        }
        return Ok(());
    }

    let mut analysis = Analysis::new(model, settings.clone())?;
    let outcome = analysis.run()?;
    info!(
        "analysis finished: P(top) = {:.6e}, {} products, {} warnings",
        outcome.p_total,
        outcome.products.len(),
        outcome.warnings.len()
    );

    match &cli.output {
        Some(path) => report::write_report(&outcome, analysis.model(), &settings, File::create(path)?)?,
        None => {
            let stdout = std::io::stdout();
            report::write_report(&outcome, analysis.model(), &settings, stdout.lock())?;
            println!();
        }
    }
    analysis.mark_reported()?;
    Ok(())
}

fn main() -> ExitCode {
    if let Err(error) = color_eyre::install() {
        eprintln!("fta: {error}");
        return ExitCode::from(3);
    }

    let cli = Cli::parse();

    let level = if cli.verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Warn
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("fta: {error}");
            let code = match error {
                Error::Validity { .. } | Error::Io(_) | Error::Xml(_) => 1,
                Error::Analysis(_) | Error::Cancelled => 2,
                Error::Logic(_) => 3,
            };
            ExitCode::from(code)
        }
    }
}
