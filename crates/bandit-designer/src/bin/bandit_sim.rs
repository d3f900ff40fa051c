use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bandit_designer::{DesignerConfig, UcbPeDesigner};
use bandit_types::{
    ActiveTrials, CompletedTrials, Measurement, MetricInformation, ObjectiveDirection,
    ParameterValue, ProblemStatement, SearchSpace, Trial,
};

const OPTIMUM: [f64; 3] = [0.7, -1.2, 2.5];

/// Negated shifted sphere; maximum 0 at `OPTIMUM`.
fn shifted_sphere(trial: &Trial) -> f64 {
    let distance: f64 = ["x0", "x1", "x2"]
        .iter()
        .zip(OPTIMUM)
        .map(|(name, center)| match trial.parameters.get(*name) {
            Some(ParameterValue::Float(v)) => (v - center).powi(2),
            _ => f64::INFINITY,
        })
        .sum();
    -distance
}

fn env_usize(name: &str, default: usize) -> anyhow::Result<usize> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("BANDIT_SIM_CONFIG") {
        Ok(path) => DesignerConfig::from_file(&path)
            .with_context(|| format!("loading designer config from {path}"))?,
        Err(_) => DesignerConfig::default().with_num_seed_trials(6).with_ensemble_size(2),
    };
    let rounds = env_usize("BANDIT_SIM_ROUNDS", 8)?;
    let batch_size = env_usize("BANDIT_SIM_BATCH", 4)?;

    let space = SearchSpace::new()
        .add_float("x0", -5.0, 5.0)
        .add_float("x1", -5.0, 5.0)
        .add_float("x2", -5.0, 5.0);
    let problem = ProblemStatement::new(space)
        .with_metric(MetricInformation::new("objective", ObjectiveDirection::Maximize));
    let mut designer = UcbPeDesigner::new(problem, config)?;

    info!("Running {} rounds with batches of {}", rounds, batch_size);
    let mut next_id = 1;
    let mut in_flight: Vec<Trial> = Vec::new();
    for round in 0..rounds {
        let suggestions = designer.suggest(batch_size)?;
        for suggestion in &suggestions {
            in_flight.push(suggestion.to_trial(next_id));
            next_id += 1;
        }

        // the oldest batch reports back one round late
        let mut completed = Vec::new();
        if round > 0 {
            let ready = batch_size.min(in_flight.len());
            for trial in in_flight.drain(..ready) {
                let value = shifted_sphere(&trial);
                completed.push(trial.complete(Measurement::new().with_metric("objective", value)));
            }
        }
        designer.update(CompletedTrials::new(completed), ActiveTrials::new(in_flight.clone()))?;

        if let Some(best) = designer.best_trial() {
            info!(
                "Round {}: {} completed, best trial {} = {:.4}",
                round,
                designer.num_completed(),
                best.id,
                best.objective("objective").unwrap_or(f64::NAN)
            );
        }
    }

    let best = designer.best_trial().context("no trial completed")?;
    println!("{}", serde_json::to_string_pretty(best)?);
    Ok(())
}
