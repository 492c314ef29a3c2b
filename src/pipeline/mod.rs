pub(crate) mod branches;
pub mod finalize;
pub(crate) mod main_path;

use crate::collision::CollisionBroadphase;
use crate::flow::DungeonFlow;
use crate::injection::InjectedTileRequest;
use crate::placement::{OutcomeKind, PlacementOutcome};
use crate::proxy::{ProxyGraph, TileId, TilePlacement, TilePool};
use crate::random::RandomStream;
use crate::report::{FailureReport, GenerationStats};
use crate::rules::ConnectionRules;
use crate::settings::GeneratorSettings;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Caller-supplied gate consulted before every generation checkpoint.
/// Generation yields as soon as the gate closes.
pub struct CpuBudget {
    should_continue: Box<dyn Fn() -> bool>,
}

impl CpuBudget {
    pub fn new<F: Fn() -> bool + 'static>(should_continue: F) -> Self {
        CpuBudget {
            should_continue: Box::new(should_continue),
        }
    }

    /// A budget that allows `steps` checkpoints over its lifetime.
    pub fn steps(steps: usize) -> Self {
        let used = std::cell::Cell::new(0usize);
        CpuBudget::new(move || {
            let n = used.get();
            used.set(n + 1);
            n < steps
        })
    }

    pub fn has_budget(&self) -> bool {
        (self.should_continue)()
    }

    /// Never closes. `DungeonGenerator::generate` steps with this.
    pub fn unlimited() -> Self {
        CpuBudget::new(|| true)
    }
}

/// What a phase cursor reports after placing (or failing) one tile.
pub enum PhaseResult<T> {
    Running,
    /// The phase is over; `T` says whether the attempt survives it.
    Complete(T),
}

/// Where a generation run is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationStatus {
    NotStarted,
    TileInjection,
    PreProcessing,
    MainPath,
    Branching,
    BranchPruning,
    InstantiatingTiles,
    PostProcessing,
    Complete,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GenerationStatus::Complete | GenerationStatus::Failed | GenerationStatus::Cancelled
        )
    }
}

/// Control value returned by the stepping API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepResult {
    /// One checkpoint was processed and more work remains.
    StillRunning,
    /// The budget ran out before the run finished.
    Yielded,
    /// The run reached a terminal status.
    Done(GenerationStatus),
}

/// Notifications delivered synchronously to observers.
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationEvent {
    StatusChanged {
        from: GenerationStatus,
        to: GenerationStatus,
    },
    AttemptStarted {
        attempt: u32,
        seed: u64,
    },
    TileInstantiated {
        done: usize,
        total: usize,
    },
    Completed {
        tiles: usize,
        attempts: u32,
    },
    Failed(FailureReport),
}

/// Why an attempt was abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartReason {
    MainPathBlocked,
    RequiredInjectionUnplaced,
}

/// Shared flag for cooperative cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read-only inputs shared by every phase.
pub(crate) struct Environment<'a> {
    pub flow: &'a DungeonFlow,
    pub settings: &'a GeneratorSettings,
    pub rules: &'a ConnectionRules,
}

/// Mutable state owned by one run. Everything here is cleared on restart
/// except the failure log and the statistics.
pub(crate) struct Workspace {
    pub graph: ProxyGraph,
    pub pool: TilePool,
    pub broadphase: Box<dyn CollisionBroadphase>,
    pub rng: RandomStream,
    pub injections: Vec<InjectedTileRequest>,
    /// Indices into `injections` still waiting to be placed, in request order.
    pub pending: Vec<usize>,
    /// Rejections per outcome kind, over every attempt.
    pub failures: FnvHashMap<OutcomeKind, usize>,
    pub stats: GenerationStats,
}

impl Workspace {
    pub fn new(seed: u64, broadphase: Box<dyn CollisionBroadphase>) -> Self {
        Workspace {
            graph: ProxyGraph::new(),
            pool: TilePool::new(),
            broadphase,
            rng: RandomStream::new(seed),
            injections: Vec::new(),
            pending: Vec::new(),
            failures: FnvHashMap::default(),
            stats: GenerationStats::default(),
        }
    }

    pub fn record_failure(&mut self, outcome: &PlacementOutcome) {
        if !outcome.is_success() {
            *self.failures.entry(outcome.kind()).or_insert(0) += 1;
        }
    }

    /// Drop a committed tile from the graph and the broadphase and return it
    /// to the pool, handing back its placement metadata.
    pub fn remove_tile(&mut self, id: TileId) -> Option<TilePlacement> {
        let node = self.graph.remove_tile(id)?;
        self.broadphase.remove(id);
        let placement = node.placement.clone();
        self.pool.release(node);
        Some(placement)
    }

    /// Clear all committed state, keeping pooled tiles for reuse.
    pub fn clear(&mut self) {
        let nodes = self.graph.clear();
        self.pool.release_all(nodes);
        self.broadphase.clear();
        self.injections.clear();
        self.pending.clear();
    }

    pub fn set_injections(&mut self, requests: Vec<InjectedTileRequest>) {
        self.pending = (0..requests.len()).collect();
        self.injections = requests;
    }

    /// First pending request whose depth window has been reached.
    pub fn due_injection(&self, on_main_path: bool, path_depth: f32, branch_depth: f32) -> Option<usize> {
        self.pending
            .iter()
            .copied()
            .find(|i| self.injections[*i].should_inject_at(on_main_path, path_depth, branch_depth))
    }

    pub fn consume_injection(&mut self, index: usize) {
        self.pending.retain(|i| *i != index);
    }

    /// Put a request back after its tile was removed, keeping request order.
    pub fn return_injection(&mut self, index: usize) {
        if !self.pending.contains(&index) {
            self.pending.push(index);
            self.pending.sort_unstable();
        }
    }

    /// First required request of the given path kind that was never placed.
    pub fn unplaced_required(&self, on_main_path: bool) -> Option<usize> {
        self.pending.iter().copied().find(|i| {
            let request = &self.injections[*i];
            request.is_required && request.is_on_main_path == on_main_path
        })
    }
}
