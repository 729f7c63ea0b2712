//! Local steering forces: mover-mover repulsion with quadratic falloff,
//! wall repulsion from the surrounding 3×3, and the directional clearance
//! filter that keeps avoidance from shoving movers into walls (or off
//! ledges, unless falling from avoidance is allowed).

use super::{
    Mover, MoverSpatialGrid, QueryCaps, CELL_SIZE, MOVER_AVOID_RADIUS, WALL_REPULSION_RADIUS,
};
use crate::config::NavConfig;
use crate::grid::WorldGrid;

/// Sum of repulsion vectors from movers within [`MOVER_AVOID_RADIUS`].
/// Weight is `(1 - d/r)²` per neighbor, applied along the separating
/// direction; work is capped by the default [`QueryCaps`].
pub(crate) fn compute_mover_avoidance(
    movers: &[Mover],
    spatial: &MoverSpatialGrid,
    index: usize,
) -> (f32, f32) {
    let m = &movers[index];
    if !m.active {
        return (0.0, 0.0);
    }

    let radius = MOVER_AVOID_RADIUS;
    let inv_radius = 1.0 / radius;
    let (mx, my) = (m.x, m.y);

    let mut ax = 0.0f32;
    let mut ay = 0.0f32;
    spatial.query_neighbors(
        movers,
        mx,
        my,
        radius,
        Some(index),
        QueryCaps::default(),
        |j, dist_sq| {
            if dist_sq < 1e-10 {
                return;
            }
            let dx = mx - movers[j].x;
            let dy = my - movers[j].y;
            let dist = dist_sq.sqrt();
            let u = 1.0 - dist * inv_radius;
            let strength = u * u;
            let k = strength / dist;
            ax += dx * k;
            ay += dy * k;
        },
    );

    (ax, ay)
}

/// Is the 3×3 around the position fully walkable? Used to pick the open
/// vs. confined avoidance scalar when directional avoidance is off.
pub(crate) fn is_in_open_area(grid: &WorldGrid, x: f32, y: f32, z: i32) -> bool {
    let cell_x = (x / CELL_SIZE) as i32;
    let cell_y = (y / CELL_SIZE) as i32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            if !grid.is_walkable_at(cell_x + dx, cell_y + dy, z) {
                return false;
            }
        }
    }
    true
}

/// Clearance probe: the three cells fronting `dir` (0 up, 1 right, 2 down,
/// 3 left) from the mover's cell must all be walkable.
pub(crate) fn has_clearance_in_direction(grid: &WorldGrid, x: f32, y: f32, z: i32, dir: usize) -> bool {
    let cell_x = (x / CELL_SIZE) as i32;
    let cell_y = (y / CELL_SIZE) as i32;

    const FDX: [i32; 4] = [0, 1, 0, -1];
    const FDY: [i32; 4] = [-1, 0, 1, 0];
    const PDX: [i32; 4] = [1, 0, 1, 0];
    const PDY: [i32; 4] = [0, 1, 0, 1];

    for p in -1..=1 {
        let cx = cell_x + FDX[dir] + p * PDX[dir];
        let cy = cell_y + FDY[dir] + p * PDY[dir];
        if !grid.is_walkable_at(cx, cy, z) {
            return false;
        }
    }
    true
}

/// Repulsion away from blocked cells (walls and workshop footprints, not
/// air) in the surrounding 3×3, quadratic falloff within
/// [`WALL_REPULSION_RADIUS`].
pub(crate) fn compute_wall_repulsion(grid: &WorldGrid, x: f32, y: f32, z: i32) -> (f32, f32) {
    let cell_x = (x / CELL_SIZE) as i32;
    let cell_y = (y / CELL_SIZE) as i32;

    let mut rx = 0.0f32;
    let mut ry = 0.0f32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let (cx, cy) = (cell_x + dx, cell_y + dy);
            if !grid.in_bounds(cx, cy, z) || !grid.is_blocked_at(cx, cy, z) {
                continue;
            }
            let wall_x = cx as f32 * CELL_SIZE + CELL_SIZE * 0.5;
            let wall_y = cy as f32 * CELL_SIZE + CELL_SIZE * 0.5;
            let dir_x = x - wall_x;
            let dir_y = y - wall_y;
            let dist_sq = dir_x * dir_x + dir_y * dir_y;
            if dist_sq < 1e-10 || dist_sq >= WALL_REPULSION_RADIUS * WALL_REPULSION_RADIUS {
                continue;
            }
            let dist = dist_sq.sqrt();
            let t = 1.0 - dist / WALL_REPULSION_RADIUS;
            let strength = t * t;
            rx += dir_x / dist * strength;
            ry += dir_y / dist * strength;
        }
    }
    (rx, ry)
}

/// Zero the avoidance components that push toward directions without
/// clearance. When the config allows falling from avoidance, the vector
/// passes through untouched and the fall resolver picks up the pieces.
pub(crate) fn filter_avoidance_by_walls(
    grid: &WorldGrid,
    config: &NavConfig,
    x: f32,
    y: f32,
    z: i32,
    avoid: (f32, f32),
) -> (f32, f32) {
    if config.allow_falling_from_avoidance {
        return avoid;
    }

    let (mut ax, mut ay) = avoid;
    if ax > 0.01 && !has_clearance_in_direction(grid, x, y, z, 1) {
        ax = 0.0;
    } else if ax < -0.01 && !has_clearance_in_direction(grid, x, y, z, 3) {
        ax = 0.0;
    }
    if ay > 0.01 && !has_clearance_in_direction(grid, x, y, z, 2) {
        ay = 0.0;
    } else if ay < -0.01 && !has_clearance_in_direction(grid, x, y, z, 0) {
        ay = 0.0;
    }
    (ax, ay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellKind;
    use crate::Point;

    #[test]
    fn movers_repel_apart() {
        let movers = vec![
            Mover::new(100.0, 100.0, 0, Point::new(0, 0, 0), 100.0),
            Mover::new(110.0, 100.0, 0, Point::new(0, 0, 0), 100.0),
        ];
        let mut spatial = MoverSpatialGrid::new(512.0, 512.0);
        spatial.build(&movers);

        let (ax, _) = compute_mover_avoidance(&movers, &spatial, 0);
        let (bx, _) = compute_mover_avoidance(&movers, &spatial, 1);
        assert!(ax < 0.0, "left mover pushed further left, got {}", ax);
        assert!(bx > 0.0, "right mover pushed further right, got {}", bx);
    }

    #[test]
    fn distant_movers_ignore_each_other() {
        let movers = vec![
            Mover::new(100.0, 100.0, 0, Point::new(0, 0, 0), 100.0),
            Mover::new(400.0, 400.0, 0, Point::new(0, 0, 0), 100.0),
        ];
        let mut spatial = MoverSpatialGrid::new(512.0, 512.0);
        spatial.build(&movers);
        assert_eq!(compute_mover_avoidance(&movers, &spatial, 0), (0.0, 0.0));
    }

    #[test]
    fn walls_push_back() {
        let mut grid = WorldGrid::new(8, 8);
        grid.set_kind(3, 2, 0, CellKind::Wall);
        // Stand just south of the wall cell, within repulsion radius.
        let (rx, ry) = compute_wall_repulsion(&grid, 3.5 * CELL_SIZE, 3.2 * CELL_SIZE, 0);
        assert_eq!(rx, 0.0);
        assert!(ry > 0.0, "wall above pushes down, got {}", ry);
    }

    #[test]
    fn filter_zeroes_blocked_direction() {
        let mut grid = WorldGrid::new(8, 8);
        for y in 0..=3 {
            grid.set_kind(4, y, 0, CellKind::Wall);
        }
        let config = NavConfig::TESTING;
        // Mover at cell (3, 3); pushing right would shove it into the wall
        // column.
        let (ax, ay) =
            filter_avoidance_by_walls(&grid, &config, 3.5 * CELL_SIZE, 3.5 * CELL_SIZE, 0, (1.0, 0.5));
        assert_eq!(ax, 0.0);
        assert!(ay > 0.0);
    }

    #[test]
    fn open_area_check() {
        let mut grid = WorldGrid::new(8, 8);
        assert!(is_in_open_area(&grid, 3.5 * CELL_SIZE, 3.5 * CELL_SIZE, 0));
        grid.set_kind(4, 4, 0, CellKind::Wall);
        assert!(!is_in_open_area(&grid, 3.5 * CELL_SIZE, 3.5 * CELL_SIZE, 0));
    }
}
