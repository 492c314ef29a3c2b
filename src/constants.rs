/// Angular tolerance, in degrees, for treating a doorway as facing a given direction.
pub const DOORWAY_ANGLE_TOLERANCE_DEGREES: f32 = 1.0;

/// Angular tolerance, in degrees, for a candidate to count as continuing a straight path.
pub const STRAIGHT_PATH_TOLERANCE_DEGREES: f32 = 0.1;

/// Distance under which two world-space doorways are considered coincident.
pub const DOORWAY_OVERLAP_EPSILON: f32 = 0.01;

/// Default number of full generation attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Main-path tiles that must already be placed before a local backtrack is allowed.
pub const DEFAULT_BACKTRACK_MIN_PLACED: usize = 5;

/// Consecutive local backtracks allowed before the main path gives up.
pub const DEFAULT_MAX_LOCAL_RETRIES: u32 = 5;

/// Local backtracks allowed across the whole main-path phase.
pub const DEFAULT_MAX_TOTAL_LOCAL_RETRIES: u32 = 20;

/// Default shrink applied to tile bounds before overlap tests, so tiles that
/// touch at a doorway do not collide.
pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.01;

/// Edge length of a spatial hash cell used by the default broadphase.
pub const DEFAULT_BROADPHASE_CELL_SIZE: f32 = 16.0;
