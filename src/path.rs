//! Helpers for the crate's path convention and post-path smoothing.
//!
//! Paths are stored goal-to-start: `path[len - 1]` is the start cell,
//! `path[0]` is the goal, and a follower advances by decrementing its index
//! toward 0. Truncating keeps the start-end suffix so a mover always walks
//! the first stretch of an over-long path.

use crate::grid::WorldGrid;
use crate::los::has_clear_corridor;
use crate::{Cost, Point};

/// Cap a goal-first path at `cap` waypoints, keeping the start end (the
/// high indices). The element that becomes `path[0]` is then the farthest
/// waypoint the follower will reach before asking for a fresh path.
pub fn truncate_keep_start(path: &mut Vec<Point>, cap: usize) {
    if path.len() > cap {
        path.drain(..path.len() - cap);
    }
}

/// Summed `move_cost` along a Bresenham line, tracing the same cells the
/// LOS check visits.
pub fn line_cost(grid: &WorldGrid, x0: i32, y0: i32, x1: i32, y1: i32, z: i32) -> Cost {
    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx - dy;
    let (mut x, mut y) = (x0, y0);
    let mut cost = 0;
    loop {
        cost += grid.move_cost_at(x, y, z);
        if x == x1 && y == y1 {
            return cost;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
}

/// Summed `move_cost` over the waypoints `from..=to` of a path (either
/// index order).
pub fn path_segment_cost(grid: &WorldGrid, path: &[Point], from: usize, to: usize) -> Cost {
    let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
    path[lo..=hi]
        .iter()
        .map(|p| grid.move_cost_at(p.x, p.y, p.z))
        .sum()
}

/// Does the straight shortcut between two waypoints cost no more than 10%
/// over the path segment it would replace? Keeps string pulling from
/// dragging paths across slow terrain just because it is clear.
fn corridor_cost_not_worse(grid: &WorldGrid, path: &[Point], from: usize, to: usize) -> bool {
    let line = line_cost(
        grid,
        path[from].x,
        path[from].y,
        path[to].x,
        path[to].y,
        path[from].z,
    );
    let along = path_segment_cost(grid, path, from, to);
    line <= along * 11 / 10
}

/// Greedy string pulling over a goal-first path: from the start end, jump to
/// the farthest earlier waypoint whose corridor is clear and whose
/// straight-line cost is within tolerance. Never shortcuts across a z
/// change, so ladder and ramp waypoints survive.
pub fn string_pull_path(grid: &WorldGrid, path: &mut Vec<Point>) {
    if path.len() <= 2 {
        return;
    }

    let mut result = Vec::with_capacity(path.len());
    let mut current = path.len() - 1;
    result.push(path[current]);

    while current > 0 {
        let mut furthest = current - 1;
        // Indices below `current` are closer to the goal; the lowest index
        // with a clear, affordable corridor is the longest valid shortcut.
        for i in 0..current {
            if path[current].z != path[i].z {
                continue;
            }
            if has_clear_corridor(
                grid,
                path[current].x,
                path[current].y,
                path[i].x,
                path[i].y,
                path[current].z,
            ) && corridor_cost_not_worse(grid, path, current, i)
            {
                furthest = i;
                break;
            }
        }
        result.push(path[furthest]);
        current = furthest;
    }

    result.reverse();
    *path = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_start_suffix() {
        let mut path: Vec<Point> = (0..10).map(|i| Point::new(i, 0, 0)).collect();
        truncate_keep_start(&mut path, 4);
        assert_eq!(path.len(), 4);
        // Start (x = 9) survives; the goal end was dropped.
        assert_eq!(path[3], Point::new(9, 0, 0));
        assert_eq!(path[0], Point::new(6, 0, 0));
    }

    #[test]
    fn string_pull_collapses_open_dogleg() {
        let grid = WorldGrid::from_ascii(".....\n.....\n.....", 0, 0).unwrap();
        // Goal-first dogleg from (0,0) via (4,0) to (4,2).
        let mut path = vec![
            Point::new(4, 2, 0),
            Point::new(4, 1, 0),
            Point::new(4, 0, 0),
            Point::new(3, 0, 0),
            Point::new(2, 0, 0),
            Point::new(1, 0, 0),
            Point::new(0, 0, 0),
        ];
        string_pull_path(&grid, &mut path);
        assert_eq!(path.len(), 2);
        assert_eq!(path[0], Point::new(4, 2, 0));
        assert_eq!(path[1], Point::new(0, 0, 0));
    }

    #[test]
    fn string_pull_keeps_wall_corner() {
        let grid = WorldGrid::from_ascii("...\n##.\n...", 0, 0).unwrap();
        let mut path = vec![
            Point::new(0, 2, 0),
            Point::new(1, 2, 0),
            Point::new(2, 2, 0),
            Point::new(2, 1, 0),
            Point::new(2, 0, 0),
            Point::new(1, 0, 0),
            Point::new(0, 0, 0),
        ];
        let before = path.clone();
        string_pull_path(&grid, &mut path);
        // No straight line exists around the wall; endpoints must survive
        // and every kept waypoint is one of the originals.
        assert_eq!(path[0], before[0]);
        assert_eq!(*path.last().unwrap(), *before.last().unwrap());
        assert!(path.iter().all(|p| before.contains(p)));
        assert!(path.len() > 2);
    }

    #[test]
    fn string_pull_never_skips_z_changes() {
        let map = "floor:0\n....\n....\nfloor:1\n....\n....";
        let mut grid = WorldGrid::from_ascii(map, 0, 0).unwrap();
        grid.place_ladder(1, 0, 0);
        grid.place_ladder(1, 0, 1);
        let mut path = vec![
            Point::new(3, 0, 1),
            Point::new(2, 0, 1),
            Point::new(1, 0, 1),
            Point::new(1, 0, 0),
            Point::new(0, 0, 0),
        ];
        string_pull_path(&grid, &mut path);
        assert!(path.contains(&Point::new(1, 0, 0)));
        assert!(path.contains(&Point::new(1, 0, 1)));
    }
}
