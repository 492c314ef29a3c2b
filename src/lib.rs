pub mod branching;
pub mod collision;
pub mod constants;
pub mod flow;
pub mod generator;
pub mod geometry;
pub mod injection;
pub mod materialize;
pub mod pairing;
pub mod pipeline;
pub mod placement;
pub mod proxy;
pub mod pruning;
pub mod random;
pub mod report;
pub mod rules;
pub mod settings;
pub mod template;
pub mod weights;

pub use flow::*;
pub use generator::*;
pub use geometry::Bounds;
pub use injection::{InjectedTileRequest, TileInjectionRule, TileInjector};
pub use materialize::{Materializer, NullMaterializer, PostProcessStep};
pub use placement::{OutcomeKind, PlacementOutcome};
pub use proxy::{Connection, ConnectionId, DoorwayRef, DoorwaySlot, ProxyGraph, TileId, TileNode, TilePlacement};
pub use random::RandomStream;
pub use report::{FailureCount, FailureReport, GenerationStats};
pub use rules::*;
pub use settings::*;
pub use template::*;
pub use weights::*;
