//! The mover runtime: autonomous agents following paths across the grid
//! with local avoidance, wall sliding, z-transitions and stuck recovery.
//!
//! Movers live in a flat array owned by the [`World`](crate::World);
//! deactivated slots are never recycled, so an index stays valid for the
//! lifetime of the world (the spatial grid and host-side references rely
//! on that). Each mover owns its path buffer.

mod avoid;
mod repath;
mod spatial;
mod update;

pub use spatial::{MoverSpatialGrid, QueryCaps};

pub(crate) use avoid::{compute_mover_avoidance, compute_wall_repulsion, filter_avoidance_by_walls};

use crate::Point;

/// Edge length of a tile in pixels; mover positions are sub-cell pixels.
pub const CELL_SIZE: f32 = 32.0;
/// Upper bound on movers in one world.
pub const MAX_MOVERS: usize = 10_000;
/// Longest path a mover keeps; longer paths are truncated from the goal end.
pub const MAX_MOVER_PATH: usize = 1024;
/// Default mover speed in pixels per second.
pub const MOVER_SPEED: f32 = 100.0;
/// Path queries the repath scheduler may run per tick.
pub const MAX_REPATHS_PER_FRAME: usize = 10;
/// Ticks a mover waits after a repath before the next one.
pub const REPATH_COOLDOWN_FRAMES: i32 = 30;

/// Simulation ticks per second.
pub const TICK_RATE: i32 = 60;
/// Fixed timestep in seconds.
pub const TICK_DT: f32 = 1.0 / TICK_RATE as f32;

/// Radius in pixels within which movers repel each other.
pub const MOVER_AVOID_RADIUS: f32 = 40.0;
/// Spatial grid cell size; about twice the avoidance radius keeps the cell
/// count manageable on large worlds.
pub const MOVER_GRID_CELL_SIZE: f32 = MOVER_AVOID_RADIUS * 2.0;
/// Movers examined per avoidance query before giving up.
pub const AVOID_MAX_SCAN: usize = 256;
/// Neighbors contributing to one avoidance vector.
pub const AVOID_MAX_NEIGHBORS: usize = 16;
/// Radius in pixels within which blocked cells repel movers.
pub const WALL_REPULSION_RADIUS: f32 = 24.0;

/// Enlarged waypoint arrival radius used by the knot fix, in pixels.
pub const KNOT_FIX_ARRIVAL_RADIUS: f32 = 8.0;
/// Radius for the "hovering near waypoint" debug timer.
pub const KNOT_NEAR_RADIUS: f32 = 16.0;
/// Squared-progress floor per tick; less than this counts as not moving.
pub const STUCK_MIN_DISTANCE: f32 = 1.0;
/// Seconds without progress before a stuck mover requests a repath.
pub const STUCK_REPATH_TIME: f32 = 1.0;

/// One autonomous agent.
///
/// Positions are sub-cell pixels on x/y plus an integer z-level. The path
/// is stored goal-first; `path_index` walks from `path.len() - 1` down to
/// `0`, with `-1` meaning "no current waypoint".
#[derive(Clone, Debug)]
pub struct Mover {
    /// Pixel x position.
    pub x: f32,
    /// Pixel y position.
    pub y: f32,
    /// Current z-level.
    pub z: i32,
    /// Where this mover is headed.
    pub goal: Point,
    /// Waypoints, goal-first (`path[0]` is the goal).
    pub path: Vec<Point>,
    /// Index of the next waypoint; `-1` when the path is exhausted.
    pub path_index: i32,
    /// Deactivated movers are skipped by every phase and never revived.
    pub active: bool,
    /// The mover wants a fresh path; it does not walk while this is set.
    pub needs_repath: bool,
    /// Ticks until the repath scheduler will serve this mover again.
    pub repath_cooldown: i32,
    /// Speed in pixels per second.
    pub speed: f32,
    /// Host-assigned job id. Movers with a job are exempt from endless-mode
    /// goal reseeding; goal loss is the host's call.
    pub job: Option<u32>,

    /// Seconds of accumulated no-progress time (drives stuck repaths).
    pub time_without_progress: f32,
    /// Seconds spent hovering near the current waypoint.
    pub time_near_waypoint: f32,
    /// Counts down after a fall resolves; hosts read it for feedback.
    pub fall_timer: f32,

    pub(crate) last_x: f32,
    pub(crate) last_y: f32,
    pub(crate) avoid_x: f32,
    pub(crate) avoid_y: f32,
}

impl Mover {
    pub(crate) fn new(x: f32, y: f32, z: i32, goal: Point, speed: f32) -> Mover {
        Mover {
            x,
            y,
            z,
            goal,
            path: Vec::new(),
            path_index: -1,
            active: true,
            needs_repath: false,
            repath_cooldown: 0,
            speed,
            job: None,
            time_without_progress: 0.0,
            time_near_waypoint: 0.0,
            fall_timer: 0.0,
            last_x: x,
            last_y: y,
            avoid_x: 0.0,
            avoid_y: 0.0,
        }
    }

    /// The grid cell this mover currently stands in.
    #[inline]
    pub fn cell(&self) -> Point {
        Point::new(
            (self.x / CELL_SIZE) as i32,
            (self.y / CELL_SIZE) as i32,
            self.z,
        )
    }

    /// The waypoint the mover is walking toward, if any.
    #[inline]
    pub fn current_waypoint(&self) -> Option<Point> {
        if self.path_index >= 0 {
            self.path.get(self.path_index as usize).copied()
        } else {
            None
        }
    }

    /// Replace the path (goal-first order expected) and reset the follow
    /// index to the start end.
    pub(crate) fn set_path(&mut self, path: Vec<Point>) {
        self.path = path;
        self.path_index = self.path.len() as i32 - 1;
    }
}

/// Host integration points invoked from inside the tick.
///
/// All methods have empty defaults; hosts implement what they care about.
/// The trampling hook fires every movement tick with the cell the mover
/// stands on (ground wear, dirt tracking); the deactivation hook is the
/// message sink for movers lost to trapping.
pub trait MoverHooks {
    /// A mover stands on `cell` this tick.
    fn cell_visited(&mut self, mover: usize, cell: Point) {
        let _ = (mover, cell);
    }

    /// A mover was deactivated after being trapped with no escape.
    fn mover_deactivated(&mut self, mover: usize, cell: Point) {
        let _ = (mover, cell);
    }
}

/// The do-nothing hook set used by [`World::tick`](crate::World::tick).
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl MoverHooks for NoHooks {}
