//! The per-tick mover phases: staggered line-of-sight validation, staggered
//! avoidance precompute, then movement with wall sliding, z-transitions,
//! fall resolution and stuck detection.
//!
//! Phase order is fixed and all movers see the same grid and spatial-index
//! snapshot within a phase. Avoidance reads the previous tick's positions
//! through the cached per-mover vector when staggering is on; at default
//! speeds an agent moves well under a cell per frame, so the staleness is
//! invisible.

use super::avoid::is_in_open_area;
use super::{
    Mover, MoverHooks, CELL_SIZE, KNOT_FIX_ARRIVAL_RADIUS, KNOT_NEAR_RADIUS, STUCK_MIN_DISTANCE,
    STUCK_REPATH_TIME, TICK_RATE,
};
use crate::los::has_line_of_sight_lenient;
use crate::mover::{compute_mover_avoidance, compute_wall_repulsion, filter_avoidance_by_walls};
use crate::world::World;
use crate::Point;

const DX4: [i32; 4] = [0, 0, -1, 1];
const DY4: [i32; 4] = [-1, 1, 0, 0];

/// Drop the mover to the first walkable cell below, stopping at solid
/// ground. If nothing is straight below, the four adjacent columns are
/// tried (a faller hugging a channel edge lands beside it). Clears the
/// path; the mover asks for a new one at its landing site.
fn try_fall_to_ground(grid: &crate::grid::WorldGrid, m: &mut Mover) -> bool {
    let cell = m.cell();
    for z in (0..cell.z).rev() {
        if grid.is_walkable_at(cell.x, cell.y, z) {
            m.z = z;
            m.fall_timer = 1.0;
            m.path.clear();
            m.path_index = -1;
            return true;
        }
        if grid.kind_at(cell.x, cell.y, z).blocks_movement() {
            break;
        }
    }
    for z in (0..cell.z).rev() {
        for d in 0..4 {
            let (ax, ay) = (cell.x + DX4[d], cell.y + DY4[d]);
            if grid.is_walkable_at(ax, ay, z) {
                m.z = z;
                m.x = ax as f32 * CELL_SIZE + CELL_SIZE * 0.5;
                m.y = ay as f32 * CELL_SIZE + CELL_SIZE * 0.5;
                m.fall_timer = 1.0;
                m.path.clear();
                m.path_index = -1;
                return true;
            }
        }
    }
    false
}

impl World {
    /// Phases 1–3 of the tick for every mover.
    pub(crate) fn update_movers(&mut self, dt: f32, hooks: &mut impl MoverHooks) {
        let mut movers = std::mem::take(&mut self.movers);

        self.phase_los(&mut movers);
        self.phase_avoidance(&mut movers);
        self.phase_movement(&mut movers, dt, hooks);

        self.movers = movers;
    }

    /// Phase 1: verify line of sight to the current waypoint, staggered
    /// over three frames. Losing sight of a same-level waypoint means a
    /// wall went up across the path; the mover stops and asks for a new
    /// one. Cross-level waypoints are validated on arrival instead.
    fn phase_los(&self, movers: &mut [Mover]) {
        for (i, m) in movers.iter_mut().enumerate() {
            if self.config.use_staggered_updates && self.current_tick % 3 != i as u64 % 3 {
                continue;
            }
            if !m.active || m.needs_repath || m.path_index < 0 || m.path.is_empty() {
                continue;
            }
            let cell = m.cell();
            if !self.grid.is_walkable_at(cell.x, cell.y, cell.z) {
                // Handled by the movement phase.
                continue;
            }
            let target = m.path[m.path_index as usize];
            if target.z == cell.z
                && !has_line_of_sight_lenient(&self.grid, cell.x, cell.y, target.x, target.y, cell.z)
            {
                m.needs_repath = true;
            }
        }
    }

    /// Phase 2: recompute the avoidance vector for a third of the movers
    /// per frame and cache it on the mover; everyone else steers by their
    /// cached vector.
    fn phase_avoidance(&self, movers: &mut [Mover]) {
        if !self.config.use_mover_avoidance && !self.config.use_wall_repulsion {
            return;
        }
        for i in 0..movers.len() {
            {
                let m = &mut movers[i];
                if !m.active || m.needs_repath || m.path_index < 0 || m.path.is_empty() {
                    m.avoid_x = 0.0;
                    m.avoid_y = 0.0;
                    continue;
                }
            }
            if self.config.use_staggered_updates && self.current_tick % 3 != i as u64 % 3 {
                continue;
            }
            let (mx, my, mz) = (movers[i].x, movers[i].y, movers[i].z);
            let mut avoid = (0.0f32, 0.0f32);
            if self.config.use_mover_avoidance {
                avoid = compute_mover_avoidance(&movers, &self.spatial, i);
                if self.config.use_directional_avoidance {
                    avoid = filter_avoidance_by_walls(&self.grid, &self.config, mx, my, mz, avoid);
                }
            }
            if self.config.use_wall_repulsion {
                let (wx, wy) = compute_wall_repulsion(&self.grid, mx, my, mz);
                avoid.0 += wx * self.config.wall_repulsion_strength;
                avoid.1 += wy * self.config.wall_repulsion_strength;
            }
            movers[i].avoid_x = avoid.0;
            movers[i].avoid_y = avoid.1;
        }
    }

    /// Phase 3: everything that actually moves a mover.
    fn phase_movement(&mut self, movers: &mut Vec<Mover>, dt: f32, hooks: &mut impl MoverHooks) {
        for i in 0..movers.len() {
            let m = &mut movers[i];
            if !m.active {
                continue;
            }
            if m.fall_timer > 0.0 {
                m.fall_timer -= dt;
            }

            let mut cell = m.cell();

            // 3a: standing somewhere unwalkable.
            if !self.grid.is_walkable_at(cell.x, cell.y, cell.z) {
                if !self.handle_unwalkable_footing(m, i, cell, hooks) {
                    continue;
                }
                // A ramp ascent may have shifted the level.
                cell = m.cell();
            }

            // Waiting movers do not walk stale paths, but job stuck
            // detection keeps accumulating.
            if m.needs_repath {
                if m.job.is_some() && m.path.is_empty() {
                    m.time_without_progress += dt;
                }
                continue;
            }

            // A stuck jobless mover with a path it cannot follow drops it.
            if m.job.is_none() && !m.path.is_empty() && m.time_without_progress > STUCK_REPATH_TIME
            {
                m.path.clear();
                m.path_index = -1;
                m.time_without_progress = 0.0;
            }

            // Path exhausted: new goal, deactivation, or idle.
            if m.path_index < 0 || m.path.is_empty() {
                if m.job.is_some() {
                    m.time_without_progress += dt;
                    if m.time_without_progress > STUCK_REPATH_TIME
                        && m.time_without_progress % STUCK_REPATH_TIME < dt
                    {
                        m.needs_repath = true;
                    }
                    continue;
                }
                if self.config.endless_mover_mode {
                    if m.repath_cooldown > 0 {
                        m.repath_cooldown -= 1;
                        continue;
                    }
                    self.assign_new_goal(m);
                    if m.path.is_empty() {
                        m.repath_cooldown = self.failed_goal_cooldown();
                    }
                } else {
                    m.active = false;
                }
                continue;
            }

            let target = m.path[m.path_index as usize];
            let tx = target.x as f32 * CELL_SIZE + CELL_SIZE * 0.5;
            let ty = target.y as f32 * CELL_SIZE + CELL_SIZE * 0.5;
            let dxf = tx - m.x;
            let dyf = ty - m.y;
            let dist = (dxf * dxf + dyf * dyf).sqrt();

            // Arrival: snap at the tight radius, or advance without the
            // snap inside the knot-fix radius (snapping there teleports
            // visibly when movers contest a waypoint).
            let mut arrival = m.speed * dt;
            let mut snap = true;
            if self.config.use_knot_fix && dist < KNOT_FIX_ARRIVAL_RADIUS {
                arrival = KNOT_FIX_ARRIVAL_RADIUS;
                snap = false;
            }

            if dist < arrival {
                if snap {
                    m.x = tx;
                    m.y = ty;
                }
                if target.z != m.z {
                    self.arrive_z_transition(m, cell, target);
                }
                m.path_index -= 1;
                m.time_near_waypoint = 0.0;
            } else {
                if dist < KNOT_NEAR_RADIUS {
                    m.time_near_waypoint += dt;
                } else {
                    m.time_near_waypoint = 0.0;
                }

                self.integrate_velocity(m, cell, target, dxf, dyf, dist, dt);

                let stand = m.cell();
                hooks.cell_visited(i, stand);

                // Stuck detection on squared progress since the last
                // checkpoint.
                let ddx = m.x - m.last_x;
                let ddy = m.y - m.last_y;
                if ddx * ddx + ddy * ddy >= STUCK_MIN_DISTANCE * STUCK_MIN_DISTANCE {
                    m.time_without_progress = 0.0;
                    m.last_x = m.x;
                    m.last_y = m.y;
                } else {
                    m.time_without_progress += dt;
                    if m.time_without_progress > STUCK_REPATH_TIME
                        && m.time_without_progress % STUCK_REPATH_TIME < dt
                    {
                        // Periodic retrigger while stuck; the timer keeps
                        // running so hosts can watch it grow.
                        m.needs_repath = true;
                        m.last_x = m.x;
                        m.last_y = m.y;
                    }
                }
            }
        }
    }

    /// Resolve a mover standing on an unwalkable cell: ramp descent, fall,
    /// ramp ascent out of a high-side column, push to a neighbor, or
    /// deactivation. Returns whether normal processing may continue.
    fn handle_unwalkable_footing(
        &mut self,
        m: &mut Mover,
        index: usize,
        cell: Point,
        hooks: &mut impl MoverHooks,
    ) -> bool {
        if !self.grid.is_blocked_at(cell.x, cell.y, cell.z) {
            // Air-like cell. Descending onto a ramp below is a z-transition,
            // not a fall.
            let above_ramp = cell.z > 0
                && self
                    .grid
                    .kind_at(cell.x, cell.y, cell.z - 1)
                    .is_directional_ramp();
            if above_ramp {
                m.z = cell.z - 1;
                m.needs_repath = true;
                return false;
            }
            if !try_fall_to_ground(&self.grid, m) {
                // Nowhere to fall; climb out if the cell above is open.
                if self.grid.is_walkable_at(cell.x, cell.y, cell.z + 1) {
                    m.z = cell.z + 1;
                    m.needs_repath = true;
                }
            }
            return false;
        }

        // Blocked structure. A ramp below pointing at this column means the
        // mover is mid-ascent and belongs one level up.
        if self.grid.is_walkable_at(cell.x, cell.y, cell.z + 1)
            && self.grid.has_ramp_pointing_to(cell.x, cell.y, cell.z)
        {
            m.z = cell.z + 1;
            return true;
        }

        for d in 0..4 {
            let (nx, ny) = (cell.x + DX4[d], cell.y + DY4[d]);
            if self.grid.is_walkable_at(nx, ny, cell.z) {
                m.x = nx as f32 * CELL_SIZE + CELL_SIZE * 0.5;
                m.y = ny as f32 * CELL_SIZE + CELL_SIZE * 0.5;
                m.needs_repath = true;
                return false;
            }
        }

        m.active = false;
        m.needs_repath = true;
        log::warn!(
            "mover {} deactivated: trapped at ({}, {}, {}) with no escape",
            index,
            cell.x,
            cell.y,
            cell.z
        );
        hooks.mover_deactivated(index, cell);
        false
    }

    /// Accept or refuse a z-change on waypoint arrival. Legal transitions:
    /// a ladder pair in the target column, a ramp pointing at the target
    /// exit while the mover stands on the ramp or the exit column, or a
    /// descent onto a directional ramp. Stale paths fail the check and the
    /// mover keeps its level.
    fn arrive_z_transition(&self, m: &mut Mover, cell: Point, target: Point) {
        let ladder_ok = self
            .grid
            .is_ladder_pair(Point::new(target.x, target.y, m.z), target);

        let mut ramp_ok = false;
        if target.z > m.z {
            if let Some((rx, ry)) = self.grid.find_ramp_pointing_to(target.x, target.y, m.z) {
                if (cell.x == rx && cell.y == ry) || (cell.x == target.x && cell.y == target.y) {
                    ramp_ok = true;
                }
            }
        } else if self
            .grid
            .kind_at(target.x, target.y, target.z)
            .is_directional_ramp()
        {
            ramp_ok = true;
        }

        if ladder_ok || ramp_ok {
            m.z = target.z;
            m.x = target.x as f32 * CELL_SIZE + CELL_SIZE * 0.5;
            m.y = target.y as f32 * CELL_SIZE + CELL_SIZE * 0.5;
        }
    }

    /// Velocity integration with terrain scaling, cached avoidance, and
    /// wall sliding.
    #[allow(clippy::too_many_arguments)]
    fn integrate_velocity(
        &self,
        m: &mut Mover,
        cell: Point,
        target: Point,
        dxf: f32,
        dyf: f32,
        dist: f32,
        dt: f32,
    ) {
        let inv_dist = 1.0 / dist;

        // Terrain speed from the single cost source: cost 10 walks at 1.0x,
        // floor (8) at 1.25x, tall grass (12) at 0.83x.
        let terrain_cost = self.grid.move_cost_at(cell.x, cell.y, cell.z).max(1);
        let effective_speed = m.speed * (10.0 / terrain_cost as f32);

        let mut vx = dxf * inv_dist * effective_speed;
        let mut vy = dyf * inv_dist * effective_speed;

        if self.config.use_mover_avoidance || self.config.use_wall_repulsion {
            let strength = if self.config.use_directional_avoidance {
                self.config.avoid_strength_open
            } else if is_in_open_area(&self.grid, m.x, m.y, m.z) {
                self.config.avoid_strength_open
            } else {
                self.config.avoid_strength_closed
            };
            let mut avoid_scale = m.speed * strength;

            // Near the waypoint, avoidance fades out quadratically so the
            // mover can actually arrive.
            if self.config.use_knot_fix && dist < KNOT_FIX_ARRIVAL_RADIUS * 2.0 {
                let t = dist / (KNOT_FIX_ARRIVAL_RADIUS * 2.0);
                avoid_scale *= t * t;
            }

            vx += m.avoid_x * avoid_scale;
            vy += m.avoid_y * avoid_scale;
        }

        let new_x = m.x + vx * dt;
        let new_y = m.y + vy * dt;

        if !self.config.use_wall_sliding {
            m.x = new_x;
            m.y = new_y;
            return;
        }

        let ncx = (new_x / CELL_SIZE) as i32;
        let ncy = (new_y / CELL_SIZE) as i32;
        let to_other_level = target.z != m.z;

        let mut can_move = self.grid.is_walkable_at(ncx, ncy, m.z);
        if !can_move && to_other_level {
            can_move = self.step_allowed_for_transition(m, cell, target, ncx, ncy);
        }

        if can_move {
            m.x = new_x;
            m.y = new_y;
            // Descending onto a ramp transitions immediately.
            if to_other_level && target.z < m.z && m.z > 0 {
                if self.grid.kind_at(ncx, ncy, m.z - 1).is_directional_ramp() {
                    m.z -= 1;
                }
            }
        } else if !self.grid.is_blocked_at(ncx, ncy, m.z)
            && !self.grid.is_walkable_at(ncx, ncy, m.z)
        {
            // Stepping into air: ramp descent when one is underneath,
            // otherwise a real fall.
            m.x = new_x;
            m.y = new_y;
            if m.z > 0 && self.grid.kind_at(ncx, ncy, m.z - 1).is_directional_ramp() {
                m.z -= 1;
                m.needs_repath = true;
            } else {
                try_fall_to_ground(&self.grid, m);
            }
        } else {
            // Blocked: slide along whichever single axis stays walkable,
            // preferring the one the velocity leans into.
            let x_only_cy = (m.y / CELL_SIZE) as i32;
            let y_only_cx = (m.x / CELL_SIZE) as i32;
            let x_ok = self.grid.is_walkable_at(ncx, x_only_cy, m.z);
            let y_ok = self.grid.is_walkable_at(y_only_cx, ncy, m.z);
            if x_ok && y_ok {
                if vx.abs() > vy.abs() {
                    m.x = new_x;
                } else {
                    m.y = new_y;
                }
            } else if x_ok {
                m.x = new_x;
            } else if y_ok {
                m.y = new_y;
            }
        }
    }

    /// May a mover heading for a cross-level waypoint step onto `(ncx,
    /// ncy)` at its current level even though that cell is not walkable
    /// there? True around ladder columns and ramp high-side exits.
    fn step_allowed_for_transition(
        &self,
        m: &Mover,
        cell: Point,
        target: Point,
        ncx: i32,
        ncy: i32,
    ) -> bool {
        if self.grid.kind_at(ncx, ncy, target.z).is_ladder() {
            return true;
        }
        if target.z > m.z {
            let here = self.grid.kind_at(cell.x, cell.y, m.z);
            if let Some((dx, dy)) = here.ramp_high_side_offset() {
                if ncx == cell.x + dx && ncy == cell.y + dy {
                    return true;
                }
            }
            if self.grid.has_ramp_pointing_to(ncx, ncy, m.z) {
                return true;
            }
            if let Some((rx, ry)) = self.grid.find_ramp_pointing_to(target.x, target.y, m.z) {
                if (cell.x == rx && cell.y == ry) || (ncx == rx && ncy == ry) {
                    return true;
                }
            }
            false
        } else {
            let ramp_at_target = self.grid.kind_at(ncx, ncy, target.z).is_directional_ramp();
            let ramp_below = m.z > 0 && self.grid.kind_at(ncx, ncy, m.z - 1).is_directional_ramp();
            ramp_at_target || ramp_below
        }
    }

    /// Cooldown after a failed goal assignment: a second, jittered when
    /// randomized cooldowns are on so a crowd of idle movers does not
    /// hammer the pathfinder in lockstep.
    pub(crate) fn failed_goal_cooldown(&mut self) -> i32 {
        use rand::Rng;
        if self.config.use_randomized_cooldowns {
            TICK_RATE + self.rng.gen_range(0..TICK_RATE)
        } else {
            TICK_RATE
        }
    }
}
