#![deny(
    missing_docs,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

//! Incremental hierarchical pathfinding and mover simulation on mutable
//! 2.5D tile grids.
//!
//! ## Introduction
//! This crate is the movement core of a colony simulation: a tile world of
//! several z-levels joined by ladders and ramps, hundreds to thousands of
//! agents walking it at once, and terrain that changes constantly as walls
//! go up and rock gets mined out. Everything lives in one [`World`] value:
//! the grid, the HPA* abstract graph kept consistent with edits through
//! per-chunk dirty tracking, the mover array, and the spatial index that
//! avoidance queries run against.
//!
//! Pathfinding offers four algorithms behind one call: plain A* (z-aware,
//! the correctness baseline), HPA* (the default; scales to large worlds by
//! searching a graph of chunk entrances and refining each hop), and the
//! JPS / JPS+ jump-point variants for uniform-cost single-level grids.
//! Paths come back goal-first: `path[len - 1]` is the start, `path[0]` the
//! goal, and followers walk the index down.
//!
//! The mover runtime steps with a fixed timestep. Per tick it validates
//! line of sight to each mover's waypoint (staggered over three frames),
//! precomputes avoidance vectors (also staggered), integrates movement
//! with wall sliding and ladder/ramp z-transitions, detects stuck movers,
//! and serves a bounded number of repath requests so one wall edit cannot
//! stall a frame.
//!
//! ## Example
//! ```
//! use navgrid::{NavConfig, Point, World};
//!
//! let mut world = World::from_ascii(
//!     "..........\n\
//!      ..####....\n\
//!      ..........",
//!     0,
//!     0,
//! )
//! .unwrap();
//! world.config = NavConfig::TESTING;
//!
//! let goal = Point::new(9, 2, 0);
//! let mover = world
//!     .spawn_mover_at_cell(Point::new(0, 0, 0), goal, 100.0)
//!     .unwrap();
//!
//! world.run_ticks(600);
//! assert_eq!(world.mover(mover).unwrap().cell(), goal);
//! ```
//!
//! ## Editing the world
//! All terrain mutation goes through `World` setters ([`World::set_cell`],
//! [`World::place_ladder`], ...). Each setter marks the enclosing chunk
//! dirty; the abstract graph is lazily brought up to date before the next
//! hierarchical query, rebuilding only the dirty chunks and their
//! neighbors.

mod cell;
mod config;
mod graph;
mod grid;
mod hpa;
mod jps;
mod los;
mod mover;
mod path;
mod search;
mod stats;
mod world;

pub use cell::{CellKind, COST_INF};
pub use config::{NavConfig, PathAlgorithm};
pub use graph::{
    AbstractGraph, EdgeKind, Entrance, GraphEdge, LADDER_LINK_COST, MAX_EDGES, MAX_EDGES_PER_NODE,
    MAX_ENTRANCES, MAX_ENTRANCE_WIDTH, RAMP_LINK_COST,
};
pub use grid::{
    AsciiMapError, WorldGrid, CELL_FLAG_STOCKPILE, CELL_FLAG_WORKSHOP_BLOCK, DEFAULT_CHUNK_SIZE,
    MAX_GRID_DEPTH, MAX_GRID_HEIGHT, MAX_GRID_WIDTH,
};
pub use mover::{
    Mover, MoverHooks, MoverSpatialGrid, NoHooks, QueryCaps, AVOID_MAX_NEIGHBORS, AVOID_MAX_SCAN,
    CELL_SIZE, KNOT_FIX_ARRIVAL_RADIUS, KNOT_NEAR_RADIUS, MAX_MOVERS, MAX_MOVER_PATH,
    MAX_REPATHS_PER_FRAME, MOVER_AVOID_RADIUS, MOVER_GRID_CELL_SIZE, MOVER_SPEED,
    REPATH_COOLDOWN_FRAMES, STUCK_MIN_DISTANCE, STUCK_REPATH_TIME, TICK_DT, TICK_RATE,
    WALL_REPULSION_RADIUS,
};
pub use path::{line_cost, path_segment_cost, string_pull_path, truncate_keep_start};
pub use search::{ChunkWindow, SearchScratch};
pub use stats::PathStats;
pub use world::World;

/// Search cost in tenths of a step: `10` per cardinal step, `14` per
/// diagonal, terrain-scaled. [`COST_INF`] marks the impassable.
pub type Cost = i32;

/// A tile coordinate, z-level included.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Z-level (0 is the lowest).
    pub z: i32,
}

impl Point {
    /// Construct a point.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Point {
        Point { x, y, z }
    }
}

/// The prelude: the types almost every user touches.
pub mod prelude {
    pub use crate::{CellKind, MoverHooks, NavConfig, PathAlgorithm, Point, World, WorldGrid};
}
