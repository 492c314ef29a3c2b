//! Public API for the dungeon assembler.
//!
//! `GeneratorBuilder` collects the flow, settings and every external
//! collaborator, and produces a `DungeonGenerator` that can be stepped under
//! a CPU budget or run to completion.

use crate::collision::{CollisionBroadphase, SpatialHashBroadphase};
use crate::flow::{DungeonFlow, FlowError};
use crate::injection::{gather_requests, TileInjector};
use crate::materialize::{Materializer, NullMaterializer, PostProcessStep};
use crate::pipeline::branches::BranchPhase;
use crate::pipeline::finalize::{connect_overlapping_doorways, run_post_process_steps, InstantiatePhase};
use crate::pipeline::main_path::MainPathPhase;
use crate::pipeline::{Environment, PhaseResult, RestartReason, Workspace};
use crate::proxy::ProxyGraph;
use crate::pruning::prune_branches;
use crate::report::{FailureReport, GenerationStats};
use crate::rules::{ConnectionRule, ConnectionRules};
use crate::settings::{default_settings, GeneratorSettings};
use log::*;
use std::time::Instant;
use thiserror::Error;

// Re-export key types for convenience
pub use crate::pipeline::finalize::Dungeon;
pub use crate::pipeline::{CancelHandle, CpuBudget, GenerationEvent, GenerationStatus, StepResult};

/// Terminal outcomes of a blocking run other than success.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("{0}")]
    Failed(FailureReport),
    #[error("generation was cancelled")]
    Cancelled,
}

type Observer = Box<dyn FnMut(&GenerationEvent)>;

/// Builder for a single generation run.
pub struct GeneratorBuilder {
    flow: DungeonFlow,
    settings: GeneratorSettings,
    seed: u64,
    rules: Vec<Box<dyn ConnectionRule>>,
    injectors: Vec<Box<dyn TileInjector>>,
    observers: Vec<Observer>,
    broadphase: Option<Box<dyn CollisionBroadphase>>,
    materializer: Option<Box<dyn Materializer>>,
    post_process: Vec<Box<dyn PostProcessStep>>,
}

impl GeneratorBuilder {
    /// Start from the process-wide default settings and seed 0.
    pub fn new(flow: DungeonFlow) -> Self {
        GeneratorBuilder {
            flow,
            settings: default_settings().clone(),
            seed: 0,
            rules: Vec::new(),
            injectors: Vec::new(),
            observers: Vec::new(),
            broadphase: None,
            materializer: None,
            post_process: Vec::new(),
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn settings(mut self, settings: GeneratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn connection_rule(mut self, rule: impl ConnectionRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn injector(mut self, injector: impl TileInjector + 'static) -> Self {
        self.injectors.push(Box::new(injector));
        self
    }

    pub fn observer(mut self, observer: impl FnMut(&GenerationEvent) + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Replace the default spatial hash.
    pub fn broadphase(mut self, broadphase: impl CollisionBroadphase + 'static) -> Self {
        self.broadphase = Some(Box::new(broadphase));
        self
    }

    pub fn materializer(mut self, materializer: impl Materializer + 'static) -> Self {
        self.materializer = Some(Box::new(materializer));
        self
    }

    pub fn post_process(mut self, step: impl PostProcessStep + 'static) -> Self {
        self.post_process.push(Box::new(step));
        self
    }

    pub fn build(self) -> Result<DungeonGenerator, FlowError> {
        self.flow.validate()?;
        if self.settings.up_axis.length_squared() == 0.0 {
            return Err(FlowError::ZeroUpAxis);
        }

        let broadphase = self
            .broadphase
            .unwrap_or_else(|| Box::new(SpatialHashBroadphase::default()));
        let rules = ConnectionRules::new(self.flow.connection.clone(), self.rules);

        Ok(DungeonGenerator {
            flow: self.flow,
            settings: self.settings,
            rules,
            injectors: self.injectors,
            observers: self.observers,
            materializer: self.materializer.unwrap_or_else(|| Box::new(NullMaterializer)),
            post_process: self.post_process,
            cancel: CancelHandle::new(),
            seed: self.seed,
            status: GenerationStatus::NotStarted,
            attempt: 0,
            ws: Workspace::new(self.seed, broadphase),
            phase: Phase::Idle,
            dungeon: None,
            report: None,
        })
    }
}

/// Per-phase cursor, carried between steps.
enum Phase {
    Idle,
    MainPath(MainPathPhase),
    Branching(BranchPhase),
    Instantiating(InstantiatePhase),
}

/// What one unit of work asks the state machine to do next.
enum Advance {
    Continue,
    Enter(GenerationStatus),
    Restart(RestartReason),
    Instantiated(usize, usize),
    Finished,
}

pub struct DungeonGenerator {
    flow: DungeonFlow,
    settings: GeneratorSettings,
    rules: ConnectionRules,
    injectors: Vec<Box<dyn TileInjector>>,
    observers: Vec<Observer>,
    materializer: Box<dyn Materializer>,
    post_process: Vec<Box<dyn PostProcessStep>>,
    cancel: CancelHandle,
    seed: u64,
    status: GenerationStatus,
    attempt: u32,
    ws: Workspace,
    phase: Phase,
    dungeon: Option<Dungeon>,
    report: Option<FailureReport>,
}

impl DungeonGenerator {
    pub fn status(&self) -> GenerationStatus {
        self.status
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Attempts started so far, including the current one.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// A handle that can cancel this run from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The proxy graph as of the last checkpoint.
    pub fn graph(&self) -> &ProxyGraph {
        match &self.dungeon {
            Some(dungeon) => &dungeon.graph,
            None => &self.ws.graph,
        }
    }

    pub fn stats(&self) -> &GenerationStats {
        &self.ws.stats
    }

    pub fn dungeon(&self) -> Option<&Dungeon> {
        self.dungeon.as_ref()
    }

    pub fn take_dungeon(&mut self) -> Option<Dungeon> {
        self.dungeon.take()
    }

    pub fn report(&self) -> Option<&FailureReport> {
        self.report.as_ref()
    }

    /// Run to completion in one call.
    pub fn generate(&mut self) -> Result<&Dungeon, GenerateError> {
        self.step(&CpuBudget::unlimited());
        match self.status {
            GenerationStatus::Complete => self
                .dungeon
                .as_ref()
                .ok_or(GenerateError::Cancelled),
            GenerationStatus::Failed => Err(GenerateError::Failed(
                self.report
                    .clone()
                    .unwrap_or_else(|| FailureReport::from_counts(self.seed, self.attempt, std::iter::empty())),
            )),
            _ => Err(GenerateError::Cancelled),
        }
    }

    /// Step until the budget runs out or the run ends.
    pub fn step(&mut self, budget: &CpuBudget) -> StepResult {
        loop {
            if !self.status.is_terminal() && !budget.has_budget() {
                return StepResult::Yielded;
            }
            if let StepResult::Done(status) = self.step_once() {
                return StepResult::Done(status);
            }
        }
    }

    /// Process exactly one checkpoint: a phase transition, one main-path
    /// slot, one branch tile or one instantiated tile.
    pub fn step_once(&mut self) -> StepResult {
        if self.status.is_terminal() {
            return StepResult::Done(self.status);
        }
        if self.cancel.is_cancelled() {
            self.teardown();
            return StepResult::Done(self.status);
        }

        let status = self.status;
        let started = Instant::now();
        let advance = self.advance();
        self.ws.stats.add_phase_time(status, started.elapsed());

        match advance {
            Advance::Continue => {}
            Advance::Enter(next) => self.set_status(next),
            Advance::Restart(reason) => self.restart(reason),
            Advance::Instantiated(done, total) => self.emit(GenerationEvent::TileInstantiated { done, total }),
            Advance::Finished => self.finish(),
        }

        if self.status.is_terminal() {
            StepResult::Done(self.status)
        } else {
            StepResult::StillRunning
        }
    }

    fn advance(&mut self) -> Advance {
        let DungeonGenerator {
            flow,
            settings,
            rules,
            injectors,
            materializer,
            post_process,
            status,
            attempt,
            ws,
            phase,
            ..
        } = self;
        let env = Environment { flow, settings, rules };

        match *status {
            GenerationStatus::NotStarted => {
                *attempt = 1;
                ws.stats.attempts = 1;
                Advance::Enter(GenerationStatus::TileInjection)
            }
            GenerationStatus::TileInjection => {
                let requests = gather_requests(env.flow, &mut ws.rng, injectors);
                debug!("Gathered {} injection request(s)", requests.len());
                ws.set_injections(requests);
                Advance::Enter(GenerationStatus::PreProcessing)
            }
            GenerationStatus::PreProcessing => {
                *phase = Phase::MainPath(MainPathPhase::new(&env, ws));
                Advance::Enter(GenerationStatus::MainPath)
            }
            GenerationStatus::MainPath => {
                let result = match phase {
                    Phase::MainPath(p) => p.tick(&env, ws),
                    _ => PhaseResult::Complete(Err(RestartReason::MainPathBlocked)),
                };
                match result {
                    PhaseResult::Running => Advance::Continue,
                    PhaseResult::Complete(Ok(())) => {
                        *phase = Phase::Branching(BranchPhase::new(&env, ws));
                        Advance::Enter(GenerationStatus::Branching)
                    }
                    PhaseResult::Complete(Err(reason)) => Advance::Restart(reason),
                }
            }
            GenerationStatus::Branching => {
                let result = match phase {
                    Phase::Branching(p) => p.tick(&env, ws),
                    _ => PhaseResult::Complete(Ok(())),
                };
                match result {
                    PhaseResult::Running => Advance::Continue,
                    PhaseResult::Complete(Ok(())) => {
                        *phase = Phase::Idle;
                        Advance::Enter(GenerationStatus::BranchPruning)
                    }
                    PhaseResult::Complete(Err(reason)) => Advance::Restart(reason),
                }
            }
            GenerationStatus::BranchPruning => {
                if let Some(rule) = &env.flow.branch_prune {
                    let removed = prune_branches(&mut ws.graph, rule);
                    ws.stats.tiles_pruned += removed.len() as u64;
                    for node in removed {
                        if let Some(id) = node.id() {
                            ws.broadphase.remove(id);
                        }
                        ws.pool.release(node);
                    }
                }
                if let Err(err) = ws.graph.validate() {
                    warn!("Proxy graph failed validation: {}", err);
                }
                *phase = Phase::Instantiating(InstantiatePhase::new(&ws.graph));
                Advance::Enter(GenerationStatus::InstantiatingTiles)
            }
            GenerationStatus::InstantiatingTiles => {
                let result = match phase {
                    Phase::Instantiating(p) => match p.tick(&env, ws, &mut **materializer) {
                        PhaseResult::Running => {
                            let (done, total) = p.progress();
                            Some((done, total))
                        }
                        PhaseResult::Complete(()) => None,
                    },
                    _ => None,
                };
                match result {
                    Some((done, total)) => Advance::Instantiated(done, total),
                    None => {
                        *phase = Phase::Idle;
                        Advance::Enter(GenerationStatus::PostProcessing)
                    }
                }
            }
            GenerationStatus::PostProcessing => {
                connect_overlapping_doorways(&env, ws);
                run_post_process_steps(ws, post_process);
                Advance::Finished
            }
            GenerationStatus::Complete | GenerationStatus::Failed | GenerationStatus::Cancelled => {
                Advance::Continue
            }
        }
    }

    fn emit(&mut self, event: GenerationEvent) {
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
    }

    fn set_status(&mut self, next: GenerationStatus) {
        let from = self.status;
        if from == next {
            return;
        }
        trace!("Generation status {:?} -> {:?}", from, next);
        self.status = next;
        if from == GenerationStatus::NotStarted && !next.is_terminal() {
            let seed = self.ws.rng.seed();
            self.emit(GenerationEvent::AttemptStarted { attempt: self.attempt, seed });
        }
        self.emit(GenerationEvent::StatusChanged { from, to: next });
    }

    fn restart(&mut self, reason: RestartReason) {
        debug!("Attempt {} abandoned: {:?}", self.attempt, reason);
        self.phase = Phase::Idle;
        self.ws.clear();

        if self.attempt >= self.settings.max_attempts.max(1) {
            let counts = self.ws.failures.iter().map(|(kind, n)| (*kind, *n));
            let report = FailureReport::from_counts(self.seed, self.attempt, counts);
            warn!("{}", report);
            self.report = Some(report.clone());
            self.set_status(GenerationStatus::Failed);
            self.emit(GenerationEvent::Failed(report));
            return;
        }

        self.ws.rng = self.ws.rng.reseeded();
        self.attempt += 1;
        self.ws.stats.attempts = self.attempt;
        let seed = self.ws.rng.seed();
        self.emit(GenerationEvent::AttemptStarted {
            attempt: self.attempt,
            seed,
        });
        self.set_status(GenerationStatus::TileInjection);
    }

    fn finish(&mut self) {
        let graph = std::mem::take(&mut self.ws.graph);
        let tiles = graph.tile_count();
        info!(
            "Generated {} tile(s) in {} attempt(s), seed {}",
            tiles, self.attempt, self.seed
        );
        self.dungeon = Some(Dungeon {
            seed: self.seed,
            attempts: self.attempt,
            graph,
            stats: self.ws.stats.clone(),
        });
        self.set_status(GenerationStatus::Complete);
        self.emit(GenerationEvent::Completed {
            tiles,
            attempts: self.attempt,
        });
    }

    fn teardown(&mut self) {
        debug!("Generation cancelled during {:?}", self.status);
        self.phase = Phase::Idle;
        self.ws.clear();
        self.materializer.discard();
        self.set_status(GenerationStatus::Cancelled);
    }
}
