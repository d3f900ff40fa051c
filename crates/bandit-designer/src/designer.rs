//! The batch GP-UCB-PE designer.

use std::sync::Arc;

use tracing::{debug, info};

use bandit_types::{
    acquisition_error, config_error, seeding_error, ActiveTrials, BanditError, BanditResult,
    CompletedTrials, Metadata, ModelFitError, ProblemStatement, Suggestion, Trial,
};

use crate::ard::{ArdOptimizer, RandomRestartArd};
use crate::config::DesignerConfig;
use crate::controller::{BatchStrategy, BatchSuggestionController};
use crate::converter::{FeatureConverter, LabelWarper};
use crate::ensemble::SurrogateEnsemble;
use crate::ledger::TrialLedger;
use crate::optimizer::{AcquisitionOptimizer, EvolutionaryOptimizer};
use crate::padding::{PaddingPolicy, TrainingData};
use crate::rng::RngKey;
use crate::seeding::{QuasiRandomSeeder, SeedStrategy};

/// Batch designer alternating between UCB exploitation and pure exploration.
///
/// Callers alternate [`suggest`](Self::suggest) and [`update`](Self::update).
/// Until `num_seed_trials` trials (completed plus active) are known, batches
/// come from the seed strategy. Afterwards every batch is chosen by
/// acquisition optimization over a GP ensemble and each suggestion carries a
/// [`DecisionMetadata`](crate::DecisionMetadata) record.
pub struct UcbPeDesigner {
    problem: ProblemStatement,
    config: DesignerConfig,
    converter: FeatureConverter,
    warper: LabelWarper,
    ledger: TrialLedger,
    seeder: Box<dyn SeedStrategy>,
    ard: Box<dyn ArdOptimizer>,
    acquisition_optimizer: Box<dyn AcquisitionOptimizer>,
    padding: Arc<dyn PaddingPolicy>,
    ensemble: Option<SurrogateEnsemble>,
    key: RngKey,
}

impl std::fmt::Debug for UcbPeDesigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UcbPeDesigner")
            .field("config", &self.config)
            .field("seeder", &self.seeder.name())
            .field("acquisition_optimizer", &self.acquisition_optimizer.name())
            .field("num_completed", &self.ledger.num_completed())
            .field("num_active", &self.ledger.num_active())
            .field("fitted", &self.ensemble.is_some())
            .finish()
    }
}

impl UcbPeDesigner {
    pub fn new(problem: ProblemStatement, config: DesignerConfig) -> BanditResult<Self> {
        config.validate()?;
        let metric = problem.objective()?.clone();
        let converter = FeatureConverter::new(&problem.search_space)?;
        let (key, seed_key) = RngKey::new(config.seed).split();

        info!(
            "Creating GP-UCB-PE designer over {} parameters ({} features), metric {}",
            problem.search_space.parameters.len(),
            converter.dimension(),
            metric.name
        );

        Ok(Self {
            seeder: Box::new(QuasiRandomSeeder::new(problem.search_space.clone(), seed_key)),
            ard: Box::new(RandomRestartArd::new(config.ard_restarts)),
            acquisition_optimizer: Box::new(
                EvolutionaryOptimizer::default().with_max_evaluations(config.acquisition_evaluations),
            ),
            padding: Arc::new(config.padding),
            warper: LabelWarper::new(metric),
            converter,
            problem,
            config,
            ledger: TrialLedger::new(),
            ensemble: None,
            key,
        })
    }

    pub fn with_seed_strategy(mut self, seeder: impl SeedStrategy + 'static) -> Self {
        self.seeder = Box::new(seeder);
        self
    }

    pub fn with_ard_optimizer(mut self, ard: impl ArdOptimizer + 'static) -> Self {
        self.ard = Box::new(ard);
        self.ensemble = None;
        self
    }

    pub fn with_acquisition_optimizer(mut self, optimizer: impl AcquisitionOptimizer + 'static) -> Self {
        self.acquisition_optimizer = Box::new(optimizer);
        self
    }

    pub fn with_padding_policy(mut self, padding: Arc<dyn PaddingPolicy>) -> Self {
        self.padding = padding;
        self.ensemble = None;
        self
    }

    pub fn problem(&self) -> &ProblemStatement {
        &self.problem
    }

    pub fn config(&self) -> &DesignerConfig {
        &self.config
    }

    pub fn num_completed(&self) -> usize {
        self.ledger.num_completed()
    }

    pub fn num_active(&self) -> usize {
        self.ledger.num_active()
    }

    /// Best feasible completed trial so far.
    pub fn best_trial(&self) -> Option<&Trial> {
        self.ledger.best_trial()
    }

    fn in_seeding_phase(&self) -> bool {
        self.ledger.num_seen() < self.config.num_seed_trials
    }

    fn next_key(&mut self) -> RngKey {
        let (keep, consume) = self.key.split();
        self.key = keep;
        consume
    }

    /// Accumulate newly completed trials, replace the active set and refit
    /// the ensemble once the seeding phase is over.
    pub fn update(&mut self, completed: CompletedTrials, active: ActiveTrials) -> BanditResult<()> {
        for trial in completed.trials.iter().chain(&active.trials) {
            self.problem
                .search_space
                .assert_contains(&trial.parameters)
                .map_err(|e| BanditError::InvalidTrial {
                    trial_id: trial.id,
                    message: e.to_string(),
                })?;
        }

        let added = self.ledger.record(completed, active, self.warper.metric())?;
        info!(
            "Update: {} new completed trials ({} total), {} active",
            added,
            self.ledger.num_completed(),
            self.ledger.num_active()
        );

        self.ensemble = None;
        if !self.in_seeding_phase() {
            self.refit()?;
        }
        Ok(())
    }

    fn features_of<'t>(&self, trials: impl IntoIterator<Item = &'t Trial>) -> BanditResult<Vec<Vec<f64>>> {
        trials
            .into_iter()
            .map(|t| self.converter.to_features(&t.parameters).map_err(BanditError::from))
            .collect()
    }

    fn refit(&mut self) -> BanditResult<()> {
        let features = self.features_of(self.ledger.completed())?;
        let labels = self.warper.warp(self.ledger.completed());
        let pending = self.features_of(self.ledger.active())?;
        let key = self.next_key();

        let ensemble = SurrogateEnsemble::fit(
            TrainingData::new(features, labels, self.converter.dimension()),
            pending,
            self.config.ensemble_size,
            self.ard.as_ref(),
            self.padding.clone(),
            key,
        )?;
        debug!("Refitted ensemble of {} members", ensemble.len());
        self.ensemble = Some(ensemble);
        Ok(())
    }

    /// Produce exactly `count` suggestions.
    pub fn suggest(&mut self, count: usize) -> BanditResult<Vec<Suggestion>> {
        if count == 0 {
            return Err(config_error!("suggest called with a batch size of 0"));
        }
        if self.in_seeding_phase() {
            return self.suggest_seeds(count);
        }

        if self.ensemble.is_none() {
            self.refit()?;
        }
        let Some(fitted) = self.ensemble.as_ref() else {
            return Err(ModelFitError::EmptyEnsemble {
                attempted: self.config.ensemble_size,
            }
            .into());
        };
        // pending additions belong to this batch only
        let mut ensemble = fitted.clone();

        let strategy_key = self.next_key();
        let run_key = self.next_key();
        let ucb_pe = &self.config.ucb_pe;
        let strategy = BatchStrategy::draw(ucb_pe, strategy_key);
        let plan = strategy.plan(
            count,
            self.ledger.has_unseen_completions(),
            ucb_pe.optimize_set_acquisition_for_exploration,
        );
        debug!("Batch strategy {:?}, plan {:?}", strategy, plan);

        let controller =
            BatchSuggestionController::new(ucb_pe, self.acquisition_optimizer.as_ref(), &self.converter);
        let slots = controller.run(&mut ensemble, &plan, run_key)?;

        let mut suggestions = Vec::with_capacity(slots.len());
        for slot in slots {
            let parameters = self.converter.to_parameters(&slot.features);
            self.problem.search_space.assert_contains(&parameters)?;
            let mut metadata = Metadata::new();
            slot.decision.write_to(&mut metadata, &self.config.metadata_ns);
            suggestions.push(Suggestion {
                parameters,
                metadata,
            });
        }
        if suggestions.len() != count {
            return Err(acquisition_error!(
                "controller produced {} suggestions for a batch of {}",
                suggestions.len(),
                count
            ));
        }
        self.ledger.mark_seen();

        info!("Suggested {} trials with strategy {:?}", count, strategy);
        Ok(suggestions)
    }

    fn suggest_seeds(&mut self, count: usize) -> BanditResult<Vec<Suggestion>> {
        let key = self.next_key();
        let seeds = self.seeder.suggest(count, key);
        if seeds.len() != count {
            return Err(seeding_error!(
                "{} seeder produced {} of {} requested points",
                self.seeder.name(),
                seeds.len(),
                count
            ));
        }
        for seed in &seeds {
            self.problem
                .search_space
                .assert_contains(seed)
                .map_err(|e| seeding_error!("{} seeder left the search space: {}", self.seeder.name(), e))?;
        }
        info!(
            "Suggested {} seed trials from {} ({} of {} seen)",
            count,
            self.seeder.name(),
            self.ledger.num_seen(),
            self.config.num_seed_trials
        );
        Ok(seeds.into_iter().map(Suggestion::new).collect())
    }
}
