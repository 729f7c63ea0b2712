//! The `World` aggregate: one value owning the grid, the abstract graph,
//! the mover array, the spatial index, the search scratch, the RNG and the
//! tick counter. Every operation the host performs goes through `&mut
//! World`; nothing in the core reaches for globals.
//!
//! Tick order is fixed: lazy graph update (when the runtime algorithm needs
//! it), spatial index rebuild, bounded repaths, mover update, stats roll,
//! tick increment. All movers observe the same grid and index snapshot
//! within a phase.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::cell::CellKind;
use crate::config::{NavConfig, PathAlgorithm};
use crate::graph::AbstractGraph;
use crate::grid::{AsciiMapError, WorldGrid};
use crate::hpa::find_path_hpa;
use crate::jps::{find_path_jps, find_path_jps_plus, JpsPlusTables};
use crate::los;
use crate::mover::{
    Mover, MoverHooks, MoverSpatialGrid, NoHooks, CELL_SIZE, MAX_MOVERS, MAX_MOVER_PATH, TICK_DT,
};
use crate::path::truncate_keep_start;
use crate::search::{a_star, SearchScratch};
use crate::stats::PathStats;
use crate::Point;

const DEFAULT_RNG_SEED: u64 = 0x5eed_1234;

/// The whole pathing + movement runtime as one owned value.
#[derive(Debug)]
pub struct World {
    pub(crate) grid: WorldGrid,
    pub(crate) graph: AbstractGraph,
    pub(crate) scratch: SearchScratch,
    pub(crate) jps_tables: JpsPlusTables,
    pub(crate) movers: Vec<Mover>,
    pub(crate) spatial: MoverSpatialGrid,
    /// Behavior flags; hosts may change them between ticks.
    pub config: NavConfig,
    pub(crate) rng: Pcg32,
    pub(crate) current_tick: u64,
    pub(crate) stats: PathStats,
}

impl World {
    /// A world of `width × height` cells with the default chunk size, all
    /// walkable ground.
    pub fn new(width: i32, height: i32) -> World {
        World::from_grid(WorldGrid::new(width, height))
    }

    /// A world with an explicit chunk size.
    pub fn with_chunk_size(width: i32, height: i32, chunk_w: i32, chunk_h: i32) -> World {
        World::from_grid(WorldGrid::with_chunk_size(width, height, chunk_w, chunk_h))
    }

    /// Parse an ASCII map (see [`WorldGrid::from_ascii`]) into a world.
    pub fn from_ascii(ascii: &str, chunk_w: i32, chunk_h: i32) -> Result<World, AsciiMapError> {
        Ok(World::from_grid(WorldGrid::from_ascii(ascii, chunk_w, chunk_h)?))
    }

    fn from_grid(grid: WorldGrid) -> World {
        let scratch = SearchScratch::for_grid(&grid);
        let jps_tables = JpsPlusTables::new(grid.depth());
        let spatial = MoverSpatialGrid::new(
            grid.width() as f32 * CELL_SIZE,
            grid.height() as f32 * CELL_SIZE,
        );
        World {
            grid,
            graph: AbstractGraph::new(),
            scratch,
            jps_tables,
            movers: Vec::new(),
            spatial,
            config: NavConfig::default(),
            rng: Pcg32::seed_from_u64(DEFAULT_RNG_SEED),
            current_tick: 0,
            stats: PathStats::new(),
        }
    }

    /// Read-only view of the grid. All mutation goes through the `World`
    /// setters below so chunk dirty tracking cannot be bypassed.
    #[inline]
    pub fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    /// Pathfinding timing buckets.
    #[inline]
    pub fn stats(&self) -> &PathStats {
        &self.stats
    }

    /// Drop the timing buckets (e.g. after switching algorithms).
    pub fn reset_path_stats(&mut self) {
        self.stats.reset();
    }

    /// Ticks simulated so far.
    #[inline]
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    // --- world edits ------------------------------------------------------

    /// Set a cell kind; marks the chunk dirty.
    pub fn set_cell(&mut self, x: i32, y: i32, z: i32, kind: CellKind) {
        self.grid.set_kind(x, y, z, kind);
    }

    /// Place a ladder, reshaping the shaft column.
    pub fn place_ladder(&mut self, x: i32, y: i32, z: i32) {
        self.grid.place_ladder(x, y, z);
    }

    /// Erase a ladder, reshaping the remaining shaft fragments.
    pub fn erase_ladder(&mut self, x: i32, y: i32, z: i32) {
        self.grid.erase_ladder(x, y, z);
    }

    /// Place a directional ramp.
    pub fn place_ramp(&mut self, x: i32, y: i32, z: i32, kind: CellKind) {
        self.grid.place_ramp(x, y, z, kind);
    }

    /// Set per-cell flag bits (workshop footprints and the like).
    pub fn set_cell_flags(&mut self, x: i32, y: i32, z: i32, flags: u8) {
        self.grid.set_cell_flags(x, y, z, flags);
    }

    /// Clear per-cell flag bits.
    pub fn clear_cell_flags(&mut self, x: i32, y: i32, z: i32, flags: u8) {
        self.grid.clear_cell_flags(x, y, z, flags);
    }

    /// Set the wall material id of a cell.
    pub fn set_wall_material(&mut self, x: i32, y: i32, z: i32, material: u8) {
        self.grid.set_wall_material(x, y, z, material);
    }

    /// Set the floor material id of a cell.
    pub fn set_floor_material(&mut self, x: i32, y: i32, z: i32, material: u8) {
        self.grid.set_floor_material(x, y, z, material);
    }

    // --- pathfinding API --------------------------------------------------

    /// Make the abstract graph consistent with the grid. Called lazily by
    /// HPA* queries and at the top of each tick when the runtime algorithm
    /// is HPA*.
    pub fn update_dirty_chunks(&mut self) {
        if self.grid.hpa_needs_rebuild {
            self.graph
                .update_dirty_chunks(&mut self.grid, &mut self.scratch, self.config.use_8_dir);
        }
    }

    /// Full entrance rebuild (most callers want the lazy
    /// [`update_dirty_chunks`](Self::update_dirty_chunks) instead).
    pub fn build_entrances(&mut self) {
        self.graph.build_entrances(&self.grid);
    }

    /// Full edge rebuild over existing entrances.
    pub fn build_graph(&mut self) {
        self.graph
            .build_graph(&self.grid, &mut self.scratch, self.config.use_8_dir);
        self.grid.clear_dirty();
    }

    /// The abstract graph (for inspection and tests).
    #[inline]
    pub fn abstract_graph(&self) -> &AbstractGraph {
        &self.graph
    }

    /// Find a path with the selected algorithm. The returned waypoints are
    /// goal-first (`path[len - 1]` is `start`); an empty vector means no
    /// path.
    ///
    /// ```
    /// use navgrid::{PathAlgorithm, Point, World};
    ///
    /// let mut world = World::new(32, 32);
    /// let path = world.find_path(
    ///     PathAlgorithm::Hpa,
    ///     Point::new(1, 1, 0),
    ///     Point::new(30, 30, 0),
    /// );
    /// assert_eq!(path[0], Point::new(30, 30, 0));
    /// assert_eq!(path[path.len() - 1], Point::new(1, 1, 0));
    /// ```
    pub fn find_path(&mut self, algo: PathAlgorithm, start: Point, goal: Point) -> Vec<Point> {
        let started = std::time::Instant::now();

        let path = match algo {
            PathAlgorithm::AStar => {
                let p = a_star(&self.grid, &mut self.scratch, start, goal, self.config.use_8_dir);
                self.stats.nodes_explored = self.scratch.nodes_explored;
                p
            }
            PathAlgorithm::Hpa => {
                self.update_dirty_chunks();
                find_path_hpa(
                    &self.grid,
                    &self.graph,
                    &mut self.scratch,
                    &mut self.stats,
                    start,
                    goal,
                    self.config.use_8_dir,
                )
            }
            PathAlgorithm::Jps => find_path_jps(&self.grid, start, goal),
            PathAlgorithm::JpsPlus => {
                if self.grid.jps_needs_rebuild {
                    self.jps_tables.invalidate();
                    self.grid.jps_needs_rebuild = false;
                }
                find_path_jps_plus(&self.grid, &mut self.jps_tables, start, goal)
            }
        };

        let ms = started.elapsed().as_secs_f64() * 1000.0;
        self.stats.record_path(ms);
        if ms > 50.0 {
            log::warn!(
                "slow path query: {:.1}ms, {:?} {:?} -> {:?}, len {}",
                ms,
                algo,
                start,
                goal,
                path.len()
            );
        }
        path
    }

    /// Is the cell standable?
    #[inline]
    pub fn is_cell_walkable_at(&self, x: i32, y: i32, z: i32) -> bool {
        self.grid.is_walkable_at(x, y, z)
    }

    /// Bresenham line-of-sight between two cells on one level.
    #[inline]
    pub fn has_line_of_sight(&self, x0: i32, y0: i32, x1: i32, y1: i32, z: i32) -> bool {
        los::has_line_of_sight(&self.grid, x0, y0, x1, y1, z)
    }

    // --- movers -----------------------------------------------------------

    /// Spawn a mover at a pixel position. Returns its index, or `None`
    /// when the mover limit is reached (logged).
    pub fn spawn_mover(&mut self, x: f32, y: f32, z: i32, goal: Point, speed: f32) -> Option<usize> {
        if self.movers.len() >= MAX_MOVERS {
            log::warn!("mover limit {} reached, spawn dropped", MAX_MOVERS);
            return None;
        }
        let mut m = Mover::new(x, y, z, goal, speed);
        m.needs_repath = true;
        self.movers.push(m);
        Some(self.movers.len() - 1)
    }

    /// Spawn a mover centered on a cell.
    pub fn spawn_mover_at_cell(&mut self, cell: Point, goal: Point, speed: f32) -> Option<usize> {
        self.spawn_mover(
            cell.x as f32 * CELL_SIZE + CELL_SIZE * 0.5,
            cell.y as f32 * CELL_SIZE + CELL_SIZE * 0.5,
            cell.z,
            goal,
            speed,
        )
    }

    /// Spawn a mover with a precomputed path (goal-first order; truncated
    /// to [`MAX_MOVER_PATH`] keeping the start end).
    pub fn spawn_mover_with_path(
        &mut self,
        x: f32,
        y: f32,
        z: i32,
        goal: Point,
        speed: f32,
        mut path: Vec<Point>,
    ) -> Option<usize> {
        let idx = self.spawn_mover(x, y, z, goal, speed)?;
        truncate_keep_start(&mut path, MAX_MOVER_PATH);
        self.movers[idx].set_path(path);
        self.movers[idx].needs_repath = false;
        Some(idx)
    }

    /// Drop every mover and reset the tick counter. The spatial index is
    /// re-initialized for the current grid size.
    pub fn clear_movers(&mut self) {
        self.movers.clear();
        self.current_tick = 0;
        self.spatial = MoverSpatialGrid::new(
            self.grid.width() as f32 * CELL_SIZE,
            self.grid.height() as f32 * CELL_SIZE,
        );
    }

    /// All movers, active and not.
    #[inline]
    pub fn movers(&self) -> &[Mover] {
        &self.movers
    }

    /// One mover by index.
    #[inline]
    pub fn mover(&self, idx: usize) -> Option<&Mover> {
        self.movers.get(idx)
    }

    /// Movers still active.
    pub fn active_mover_count(&self) -> usize {
        self.movers.iter().filter(|m| m.active).count()
    }

    /// Point a mover at a new goal; it will repath on a following tick.
    /// An explicit redirect clears any pending cooldown.
    pub fn set_mover_goal(&mut self, idx: usize, goal: Point) {
        if let Some(m) = self.movers.get_mut(idx) {
            m.goal = goal;
            m.path.clear();
            m.path_index = -1;
            m.needs_repath = true;
            m.repath_cooldown = 0;
        }
    }

    /// Drop a mover's path without touching its goal.
    pub fn clear_mover_path(&mut self, idx: usize) {
        if let Some(m) = self.movers.get_mut(idx) {
            m.path.clear();
            m.path_index = -1;
        }
    }

    /// Attach or detach a host job id.
    pub fn set_mover_job(&mut self, idx: usize, job: Option<u32>) {
        if let Some(m) = self.movers.get_mut(idx) {
            m.job = job;
        }
    }

    /// Shove movers standing in `(x, y, z)` to an adjacent walkable cell
    /// and flag them for repath. Hosts call this after building a wall
    /// under someone's feet.
    pub fn push_movers_out_of_cell(&mut self, x: i32, y: i32, z: i32) {
        const DX: [i32; 4] = [0, 0, -1, 1];
        const DY: [i32; 4] = [-1, 1, 0, 0];
        for m in &mut self.movers {
            if !m.active {
                continue;
            }
            let cell = m.cell();
            if cell.x != x || cell.y != y || cell.z != z {
                continue;
            }
            for d in 0..4 {
                let (nx, ny) = (x + DX[d], y + DY[d]);
                if self.grid.is_walkable_at(nx, ny, z) {
                    m.x = nx as f32 * CELL_SIZE + CELL_SIZE * 0.5;
                    m.y = ny as f32 * CELL_SIZE + CELL_SIZE * 0.5;
                    m.needs_repath = true;
                    break;
                }
            }
        }
    }

    /// Flag every mover whose remaining waypoints pass through the cell.
    pub fn invalidate_paths_through_cell(&mut self, x: i32, y: i32, z: i32) {
        for m in &mut self.movers {
            if !m.active || m.path.is_empty() || m.path_index < 0 {
                continue;
            }
            let remaining = &m.path[..=(m.path_index as usize)];
            if remaining.iter().any(|p| p.x == x && p.y == y && p.z == z) {
                m.needs_repath = true;
            }
        }
    }

    // --- randomness -------------------------------------------------------

    /// Reseed the deterministic RNG used for goals and cooldown jitter.
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = Pcg32::seed_from_u64(seed);
    }

    /// A random walkable cell anywhere in the world.
    pub fn random_walkable_cell(&mut self) -> Option<Point> {
        for _ in 0..4096 {
            let x = self.rng.gen_range(0..self.grid.width());
            let y = self.rng.gen_range(0..self.grid.height());
            let z = self.rng.gen_range(0..self.grid.depth());
            if self.grid.is_walkable_at(x, y, z) {
                return Some(Point::new(x, y, z));
            }
        }
        self.scan_any_walkable(|_| true)
    }

    /// A random walkable cell on the given level.
    pub fn random_walkable_cell_on(&mut self, z: i32) -> Option<Point> {
        for _ in 0..4096 {
            let x = self.rng.gen_range(0..self.grid.width());
            let y = self.rng.gen_range(0..self.grid.height());
            if self.grid.is_walkable_at(x, y, z) {
                return Some(Point::new(x, y, z));
            }
        }
        self.scan_any_walkable(|p| p.z == z)
    }

    /// A random walkable cell on any level except `exclude_z`.
    pub fn random_walkable_cell_different_z(&mut self, exclude_z: i32) -> Option<Point> {
        if self.grid.depth() < 2 {
            return None;
        }
        for _ in 0..4096 {
            let x = self.rng.gen_range(0..self.grid.width());
            let y = self.rng.gen_range(0..self.grid.height());
            let z = self.rng.gen_range(0..self.grid.depth());
            if z != exclude_z && self.grid.is_walkable_at(x, y, z) {
                return Some(Point::new(x, y, z));
            }
        }
        self.scan_any_walkable(|p| p.z != exclude_z)
    }

    /// Deterministic fallback when random probing keeps missing (nearly
    /// full worlds): first walkable cell in scan order.
    fn scan_any_walkable(&self, accept: impl Fn(Point) -> bool) -> Option<Point> {
        for z in 0..self.grid.depth() {
            for y in 0..self.grid.height() {
                for x in 0..self.grid.width() {
                    let p = Point::new(x, y, z);
                    if accept(p) && self.grid.is_walkable_at(x, y, z) {
                        return Some(p);
                    }
                }
            }
        }
        None
    }

    // --- tick loop --------------------------------------------------------

    /// Run one fixed-timestep tick.
    pub fn tick(&mut self) {
        self.tick_with_dt_and_hooks(TICK_DT, &mut NoHooks);
    }

    /// Run one tick with a variable timestep.
    pub fn tick_with_dt(&mut self, dt: f32) {
        self.tick_with_dt_and_hooks(dt, &mut NoHooks);
    }

    /// Run one fixed-timestep tick with host hooks.
    pub fn tick_with_hooks(&mut self, hooks: &mut impl MoverHooks) {
        self.tick_with_dt_and_hooks(TICK_DT, hooks);
    }

    /// The full per-tick sequence; see the module docs for the phase order.
    pub fn tick_with_dt_and_hooks(&mut self, dt: f32, hooks: &mut impl MoverHooks) {
        if self.config.mover_path_algorithm == PathAlgorithm::Hpa && self.grid.hpa_needs_rebuild {
            self.update_dirty_chunks();
        }

        self.spatial.build(&self.movers);
        self.process_mover_repaths();
        self.update_movers(dt, hooks);

        self.stats.update();
        self.current_tick += 1;
    }

    /// Convenience for tests: `n` fixed-timestep ticks.
    pub fn run_ticks(&mut self, n: u32) {
        for _ in 0..n {
            self.tick();
        }
    }

    // --- persistence hook -------------------------------------------------

    /// Fix up transient state after the host deserialized a save: rebuild
    /// the spatial index, schedule a graph rebuild, and flag every mover
    /// for repath so no one walks a path from a different world.
    pub fn after_load(&mut self) {
        self.spatial = MoverSpatialGrid::new(
            self.grid.width() as f32 * CELL_SIZE,
            self.grid.height() as f32 * CELL_SIZE,
        );
        self.spatial.build(&self.movers);
        for z in 0..self.grid.depth() {
            for cy in 0..self.grid.chunks_y() {
                for cx in 0..self.grid.chunks_x() {
                    self.grid
                        .mark_chunk_dirty(cx * self.grid.chunk_w(), cy * self.grid.chunk_h(), z);
                }
            }
        }
        self.jps_tables.invalidate();
        for m in &mut self.movers {
            if m.active {
                m.needs_repath = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_path_dispatches_all_algorithms() {
        let mut world = World::new(48, 48);
        let start = Point::new(2, 2, 0);
        let goal = Point::new(40, 40, 0);
        for algo in [
            PathAlgorithm::AStar,
            PathAlgorithm::Hpa,
            PathAlgorithm::Jps,
            PathAlgorithm::JpsPlus,
        ] {
            let path = world.find_path(algo, start, goal);
            assert!(!path.is_empty(), "{:?}", algo);
            assert_eq!(path[0], goal, "{:?}", algo);
            assert_eq!(*path.last().unwrap(), start, "{:?}", algo);
        }
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let mut a = World::new(32, 32);
        let mut b = World::new(32, 32);
        a.seed_rng(7);
        b.seed_rng(7);
        for _ in 0..10 {
            assert_eq!(a.random_walkable_cell(), b.random_walkable_cell());
        }
    }

    #[test]
    fn after_load_flags_everything() {
        let mut world = World::new(32, 32);
        world.config = NavConfig::TESTING;
        let goal = Point::new(20, 20, 0);
        let idx = world.spawn_mover_at_cell(Point::new(1, 1, 0), goal, 100.0).unwrap();
        world.run_ticks(3);
        world.after_load();
        assert!(world.grid().hpa_needs_rebuild);
        assert!(world.mover(idx).unwrap().needs_repath);
    }

    #[test]
    fn push_movers_out_relocates() {
        let mut world = World::new(16, 16);
        world.config = NavConfig::TESTING;
        let idx = world
            .spawn_mover_at_cell(Point::new(5, 5, 0), Point::new(10, 10, 0), 100.0)
            .unwrap();
        world.set_cell(5, 5, 0, CellKind::Wall);
        world.push_movers_out_of_cell(5, 5, 0);
        let cell = world.mover(idx).unwrap().cell();
        assert_ne!((cell.x, cell.y), (5, 5));
        assert!(world.is_cell_walkable_at(cell.x, cell.y, cell.z));
    }
}
