//! Runtime configuration for the pathfinding and mover subsystems.
//!
//! Every flag toggles exactly one behavior; the defaults match how the
//! simulation ships. [`NavConfig::TESTING`] turns off the two sources of
//! nondeterminism (staggered updates and randomized cooldowns) so tests
//! can step the world and assert exact outcomes.

/// Which algorithm a path query runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PathAlgorithm {
    /// Full-grid A*, z-aware. The correctness baseline.
    AStar,
    /// Hierarchical A* over the chunk entrance graph, refined per hop.
    #[default]
    Hpa,
    /// Jump-point search. Uniform-cost, single z-level.
    Jps,
    /// JPS with precomputed per-cell jump distances. Uniform-cost, single
    /// z-level.
    JpsPlus,
}

/// Behavior switches for the mover runtime and the default path algorithm.
///
/// ```
/// use navgrid::{NavConfig, PathAlgorithm};
///
/// let config = NavConfig::default();
/// assert_eq!(config.mover_path_algorithm, PathAlgorithm::Hpa);
/// assert!(config.use_8_dir);
/// assert!(!NavConfig::TESTING.use_randomized_cooldowns);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavConfig {
    /// 8-directional movement and search everywhere (`false` = cardinal only).
    pub use_8_dir: bool,
    /// Post-process fresh paths with string pulling.
    pub use_string_pulling: bool,
    /// Neighbor repulsion between movers.
    pub use_mover_avoidance: bool,
    /// Repulsion away from blocked cells in the surrounding 3×3.
    pub use_wall_repulsion: bool,
    /// Scalar applied to the wall repulsion vector.
    pub wall_repulsion_strength: f32,
    /// Slide along walls instead of stopping when a step is blocked.
    pub use_wall_sliding: bool,
    /// Zero avoidance components that push toward cells without clearance.
    pub use_directional_avoidance: bool,
    /// Avoidance scalar in open areas.
    pub avoid_strength_open: f32,
    /// Avoidance scalar in confined areas (only used when directional
    /// avoidance is off).
    pub avoid_strength_closed: f32,
    /// Enlarged waypoint arrival radius with snap suppression, preventing
    /// orbiting around contested waypoints.
    pub use_knot_fix: bool,
    /// Jitter repath cooldowns into `[TICK_RATE, 2·TICK_RATE)` so failed
    /// movers do not all retry on the same tick.
    pub use_randomized_cooldowns: bool,
    /// Spread LOS and avoidance work across frames
    /// (`tick % 3 == mover % 3`).
    pub use_staggered_updates: bool,
    /// Idle movers pick a fresh random goal instead of deactivating.
    pub endless_mover_mode: bool,
    /// Let avoidance push movers into air (they fall); off means avoidance
    /// components toward non-walkable cells are zeroed.
    pub allow_falling_from_avoidance: bool,
    /// Endless-mode goals prefer a different z-level when vertical links
    /// exist.
    pub prefer_different_z: bool,
    /// Algorithm used by mover repaths and endless-mode goal assignment.
    pub mover_path_algorithm: PathAlgorithm,
}

impl NavConfig {
    /// Deterministic preset for tests: no stagger, no cooldown jitter, no
    /// string pulling, avoidance and sliding still on.
    pub const TESTING: NavConfig = NavConfig {
        use_8_dir: true,
        use_string_pulling: false,
        use_mover_avoidance: true,
        use_wall_repulsion: true,
        wall_repulsion_strength: 0.5,
        use_wall_sliding: true,
        use_directional_avoidance: true,
        avoid_strength_open: 0.5,
        avoid_strength_closed: 0.0,
        use_knot_fix: true,
        use_randomized_cooldowns: false,
        use_staggered_updates: false,
        endless_mover_mode: false,
        allow_falling_from_avoidance: false,
        prefer_different_z: true,
        mover_path_algorithm: PathAlgorithm::Hpa,
    };

    const DEFAULT: NavConfig = NavConfig {
        use_8_dir: true,
        use_string_pulling: true,
        use_mover_avoidance: true,
        use_wall_repulsion: true,
        wall_repulsion_strength: 0.5,
        use_wall_sliding: true,
        use_directional_avoidance: true,
        avoid_strength_open: 0.5,
        avoid_strength_closed: 0.0,
        use_knot_fix: true,
        use_randomized_cooldowns: true,
        use_staggered_updates: true,
        endless_mover_mode: false,
        allow_falling_from_avoidance: false,
        prefer_different_z: true,
        mover_path_algorithm: PathAlgorithm::Hpa,
    };
}

impl Default for NavConfig {
    fn default() -> NavConfig {
        NavConfig::DEFAULT
    }
}
