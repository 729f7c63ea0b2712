//! Low-level grid A*: the full 3D search used for direct queries, the
//! window-confined variant used for intra-chunk refinement and graph
//! building, and a multi-target flood used to connect one entrance to all
//! others of a chunk in a single sweep.
//!
//! Per-cell bookkeeping (g, parent coordinates, closed bit) lives in a
//! [`SearchScratch`] owned by the world and reused across queries; a
//! generation stamp makes "reset" free. Parent links are stored as plain
//! coordinates per cell, never as references between nodes.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::cell::COST_INF;
use crate::grid::WorldGrid;
use crate::{Cost, Point};

pub(crate) const DX4: [i32; 4] = [0, 1, 0, -1];
pub(crate) const DY4: [i32; 4] = [-1, 0, 1, 0];
pub(crate) const DX8: [i32; 8] = [0, 1, 1, 1, 0, -1, -1, -1];
pub(crate) const DY8: [i32; 8] = [-1, -1, 0, 1, 1, 1, 0, -1];

/// 4-directional heuristic: Manhattan distance in cost units.
#[inline]
pub(crate) fn heuristic4(dx: i32, dy: i32) -> Cost {
    (dx.abs() + dy.abs()) * 10
}

/// 8-directional heuristic: octile distance, `10·max + 4·min`.
#[inline]
pub(crate) fn heuristic8(dx: i32, dy: i32) -> Cost {
    let dx = dx.abs();
    let dy = dy.abs();
    10 * dx.max(dy) + 4 * dx.min(dy)
}

#[inline]
fn planar_heuristic(dx: i32, dy: i32, use_8_dir: bool) -> Cost {
    if use_8_dir {
        heuristic8(dx, dy)
    } else {
        heuristic4(dx, dy)
    }
}

/// Step cost onto a destination cell; diagonal steps scale by 14/10.
#[inline]
fn step_cost(base: Cost, diagonal: bool) -> Cost {
    if diagonal {
        base * 14 / 10
    } else {
        base
    }
}

/// Axis-aligned half-open window `[min_x, max_x) × [min_y, max_y)` that
/// confines a chunk search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkWindow {
    /// Inclusive lower x bound.
    pub min_x: i32,
    /// Inclusive lower y bound.
    pub min_y: i32,
    /// Exclusive upper x bound.
    pub max_x: i32,
    /// Exclusive upper y bound.
    pub max_y: i32,
}

impl ChunkWindow {
    /// The window of chunk `(cx, cy)` plus the one-cell band on the far
    /// sides that makes cells on the next border reachable.
    pub fn chunk_with_border(grid: &WorldGrid, cx: i32, cy: i32) -> ChunkWindow {
        ChunkWindow {
            min_x: cx * grid.chunk_w(),
            min_y: cy * grid.chunk_h(),
            max_x: ((cx + 1) * grid.chunk_w() + 1).min(grid.width()),
            max_y: ((cy + 1) * grid.chunk_h() + 1).min(grid.height()),
        }
    }

    /// Smallest window containing both inputs.
    pub fn union(self, other: ChunkWindow) -> ChunkWindow {
        ChunkWindow {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow by `margin` cells on every side, clamped to the grid.
    pub fn expanded(self, margin: i32, grid: &WorldGrid) -> ChunkWindow {
        ChunkWindow {
            min_x: (self.min_x - margin).max(0),
            min_y: (self.min_y - margin).max(0),
            max_x: (self.max_x + margin).min(grid.width()),
            max_y: (self.max_y + margin).min(grid.height()),
        }
    }

    /// Is `(x, y)` inside the window?
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }
}

/// Open-set entry. The heap is a max-heap, so `Ord` is inverted: smaller
/// `f` wins, ties prefer smaller `g`, then earlier insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OpenNode {
    f: Cost,
    g: Cost,
    seq: u32,
    pos: Point,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.g.cmp(&self.g))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reusable per-cell search state, generation-stamped so clearing between
/// queries costs nothing.
#[derive(Clone, Debug, Default)]
pub struct SearchScratch {
    width: i32,
    height: i32,
    depth: i32,
    stamp: Vec<u32>,
    generation: u32,
    g: Vec<Cost>,
    closed: Vec<bool>,
    parent: Vec<Point>,
    heap: BinaryHeap<OpenNode>,
    seq: u32,
    /// Cells popped from the open set in the most recent search.
    pub nodes_explored: usize,
}

impl SearchScratch {
    /// Scratch sized for `grid`. Must be re-created when the grid is
    /// re-initialized with different dimensions.
    pub fn for_grid(grid: &WorldGrid) -> SearchScratch {
        let n = (grid.width() * grid.height() * grid.depth()) as usize;
        SearchScratch {
            width: grid.width(),
            height: grid.height(),
            depth: grid.depth(),
            stamp: vec![0; n],
            generation: 0,
            g: vec![COST_INF; n],
            closed: vec![false; n],
            parent: vec![Point::new(-1, -1, -1); n],
            heap: BinaryHeap::new(),
            seq: 0,
            nodes_explored: 0,
        }
    }

    fn begin(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            // Stamp wrap: do one real clear so stale stamps cannot collide.
            self.stamp.iter_mut().for_each(|s| *s = 0);
            self.generation = 1;
        }
        self.heap.clear();
        self.seq = 0;
        self.nodes_explored = 0;
    }

    #[inline]
    fn index(&self, x: i32, y: i32, z: i32) -> usize {
        ((z * self.height + y) * self.width + x) as usize
    }

    #[inline]
    fn touch(&mut self, idx: usize) {
        if self.stamp[idx] != self.generation {
            self.stamp[idx] = self.generation;
            self.g[idx] = COST_INF;
            self.closed[idx] = false;
            self.parent[idx] = Point::new(-1, -1, -1);
        }
    }

    #[inline]
    fn push(&mut self, pos: Point, g: Cost, f: Cost) {
        self.heap.push(OpenNode {
            f,
            g,
            seq: self.seq,
            pos,
        });
        self.seq += 1;
    }

    fn reconstruct(&self, start: Point, goal: Point) -> Vec<Point> {
        // Walking parent links from the goal yields the path directly in
        // the goal-to-start order the crate stores paths in.
        let mut path = Vec::new();
        let mut current = goal;
        loop {
            path.push(current);
            if current == start {
                break;
            }
            current = self.parent[self.index(current.x, current.y, current.z)];
        }
        path
    }
}

/// Full-grid A* between two cells, z-aware: planar steps in 4 or 8
/// directions plus ladder climbs (cost 10) and ramp transitions (cost 14).
///
/// Returns the path in goal-to-start order, or an empty vector when no path
/// exists or either endpoint is not walkable.
pub fn a_star(
    grid: &WorldGrid,
    scratch: &mut SearchScratch,
    start: Point,
    goal: Point,
    use_8_dir: bool,
) -> Vec<Point> {
    if !grid.is_walkable_at(start.x, start.y, start.z)
        || !grid.is_walkable_at(goal.x, goal.y, goal.z)
    {
        return Vec::new();
    }
    if start == goal {
        return vec![start];
    }

    scratch.begin();
    let h0 = heuristic_3d(start, goal, use_8_dir);
    let start_idx = scratch.index(start.x, start.y, start.z);
    scratch.touch(start_idx);
    scratch.g[start_idx] = 0;
    scratch.push(start, 0, h0);

    let dirs = if use_8_dir { 8 } else { 4 };

    while let Some(node) = scratch.heap.pop() {
        let pos = node.pos;
        let idx = scratch.index(pos.x, pos.y, pos.z);
        scratch.touch(idx);
        if scratch.closed[idx] || node.g > scratch.g[idx] {
            continue;
        }
        scratch.closed[idx] = true;
        scratch.nodes_explored += 1;

        if pos == goal {
            return scratch.reconstruct(start, goal);
        }

        let g = scratch.g[idx];

        // Planar neighbors.
        for d in 0..dirs {
            let (dx, dy) = if use_8_dir {
                (DX8[d], DY8[d])
            } else {
                (DX4[d], DY4[d])
            };
            let (nx, ny) = (pos.x + dx, pos.y + dy);
            if !grid.is_walkable_at(nx, ny, pos.z) {
                continue;
            }
            let diagonal = dx != 0 && dy != 0;
            if diagonal
                && (!grid.is_walkable_at(pos.x + dx, pos.y, pos.z)
                    || !grid.is_walkable_at(pos.x, pos.y + dy, pos.z))
            {
                continue;
            }
            let base = grid.move_cost_at(nx, ny, pos.z);
            if base >= COST_INF {
                continue;
            }
            relax(
                scratch,
                Point::new(nx, ny, pos.z),
                pos,
                g + step_cost(base, diagonal),
                goal,
                use_8_dir,
            );
        }

        // Ladder climbs.
        let kind = grid.kind_at(pos.x, pos.y, pos.z);
        if kind.can_climb_up() && grid.kind_at(pos.x, pos.y, pos.z + 1).can_climb_down() {
            relax(
                scratch,
                Point::new(pos.x, pos.y, pos.z + 1),
                pos,
                g + 10,
                goal,
                use_8_dir,
            );
        }
        if kind.can_climb_down() && grid.kind_at(pos.x, pos.y, pos.z - 1).can_climb_up() {
            relax(
                scratch,
                Point::new(pos.x, pos.y, pos.z - 1),
                pos,
                g + 10,
                goal,
                use_8_dir,
            );
        }

        // Ramp up: standing on the ramp, step onto its high side one level up.
        if let Some((dx, dy)) = kind.ramp_high_side_offset() {
            let (hx, hy) = (pos.x + dx, pos.y + dy);
            if grid.is_walkable_at(hx, hy, pos.z + 1) {
                relax(
                    scratch,
                    Point::new(hx, hy, pos.z + 1),
                    pos,
                    g + 14,
                    goal,
                    use_8_dir,
                );
            }
        }
        // Ramp down: a ramp one level below pointing at this cell.
        if let Some((rx, ry)) = grid.find_ramp_pointing_to(pos.x, pos.y, pos.z - 1) {
            if grid.is_walkable_at(rx, ry, pos.z - 1) {
                relax(
                    scratch,
                    Point::new(rx, ry, pos.z - 1),
                    pos,
                    g + 14,
                    goal,
                    use_8_dir,
                );
            }
        }
    }

    Vec::new()
}

#[inline]
fn heuristic_3d(p: Point, goal: Point, use_8_dir: bool) -> Cost {
    // Ramps cover one planar step and one z step for 14, so the planar and
    // vertical components must not be summed; the max of the two stays
    // admissible for ladders and ramps alike.
    let planar = planar_heuristic(goal.x - p.x, goal.y - p.y, use_8_dir);
    planar.max((goal.z - p.z).abs() * 10)
}

#[inline]
fn relax(
    scratch: &mut SearchScratch,
    next: Point,
    from: Point,
    ng: Cost,
    goal: Point,
    use_8_dir: bool,
) {
    let idx = scratch.index(next.x, next.y, next.z);
    scratch.touch(idx);
    if scratch.closed[idx] || ng >= scratch.g[idx] {
        return;
    }
    scratch.g[idx] = ng;
    scratch.parent[idx] = from;
    let f = ng + heuristic_3d(next, goal, use_8_dir);
    scratch.push(next, ng, f);
}

/// A* confined to a window on a single z-level. Returns the path cost and
/// the path in goal-to-start order.
pub fn a_star_chunk(
    grid: &WorldGrid,
    scratch: &mut SearchScratch,
    start: Point,
    gx: i32,
    gy: i32,
    window: ChunkWindow,
    use_8_dir: bool,
) -> Option<(Cost, Vec<Point>)> {
    let z = start.z;
    let goal = Point::new(gx, gy, z);
    if !window.contains(start.x, start.y) || !window.contains(gx, gy) {
        return None;
    }
    if !grid.is_walkable_at(start.x, start.y, z) || !grid.is_walkable_at(gx, gy, z) {
        return None;
    }
    if start.x == gx && start.y == gy {
        return Some((0, vec![start]));
    }

    scratch.begin();
    let start_idx = scratch.index(start.x, start.y, z);
    scratch.touch(start_idx);
    scratch.g[start_idx] = 0;
    scratch.push(start, 0, planar_heuristic(gx - start.x, gy - start.y, use_8_dir));

    let dirs = if use_8_dir { 8 } else { 4 };

    while let Some(node) = scratch.heap.pop() {
        let pos = node.pos;
        let idx = scratch.index(pos.x, pos.y, z);
        scratch.touch(idx);
        if scratch.closed[idx] || node.g > scratch.g[idx] {
            continue;
        }
        scratch.closed[idx] = true;
        scratch.nodes_explored += 1;

        if pos.x == gx && pos.y == gy {
            let cost = scratch.g[idx];
            return Some((cost, scratch.reconstruct(start, goal)));
        }

        let g = scratch.g[idx];
        for d in 0..dirs {
            let (dx, dy) = if use_8_dir {
                (DX8[d], DY8[d])
            } else {
                (DX4[d], DY4[d])
            };
            let (nx, ny) = (pos.x + dx, pos.y + dy);
            if !window.contains(nx, ny) || !grid.is_walkable_at(nx, ny, z) {
                continue;
            }
            let diagonal = dx != 0 && dy != 0;
            if diagonal
                && (!grid.is_walkable_at(pos.x + dx, pos.y, z)
                    || !grid.is_walkable_at(pos.x, pos.y + dy, z))
            {
                continue;
            }
            let base = grid.move_cost_at(nx, ny, z);
            if base >= COST_INF {
                continue;
            }
            let ng = g + step_cost(base, diagonal);
            let nidx = scratch.index(nx, ny, z);
            scratch.touch(nidx);
            if scratch.closed[nidx] || ng >= scratch.g[nidx] {
                continue;
            }
            scratch.g[nidx] = ng;
            scratch.parent[nidx] = pos;
            let f = ng + planar_heuristic(gx - nx, gy - ny, use_8_dir);
            scratch.push(Point::new(nx, ny, z), ng, f);
        }
    }

    None
}

/// Dijkstra flood from `start` to every target inside the window, on one
/// z-level. Returns one cost per target, [`COST_INF`] where unreachable.
/// Used by graph building so one entrance reaches all its peers in a single
/// sweep.
pub fn a_star_chunk_multi(
    grid: &WorldGrid,
    scratch: &mut SearchScratch,
    start: Point,
    targets: &[(i32, i32)],
    window: ChunkWindow,
    use_8_dir: bool,
) -> Vec<Cost> {
    let z = start.z;
    let mut costs = vec![COST_INF; targets.len()];
    if !window.contains(start.x, start.y) || !grid.is_walkable_at(start.x, start.y, z) {
        return costs;
    }

    let mut remaining: usize = targets
        .iter()
        .filter(|&&(tx, ty)| window.contains(tx, ty) && grid.is_walkable_at(tx, ty, z))
        .count();
    if remaining == 0 {
        return costs;
    }

    scratch.begin();
    let start_idx = scratch.index(start.x, start.y, z);
    scratch.touch(start_idx);
    scratch.g[start_idx] = 0;
    scratch.push(start, 0, 0);

    let dirs = if use_8_dir { 8 } else { 4 };

    while let Some(node) = scratch.heap.pop() {
        let pos = node.pos;
        let idx = scratch.index(pos.x, pos.y, z);
        scratch.touch(idx);
        if scratch.closed[idx] || node.g > scratch.g[idx] {
            continue;
        }
        scratch.closed[idx] = true;
        scratch.nodes_explored += 1;
        let g = scratch.g[idx];

        for (i, &(tx, ty)) in targets.iter().enumerate() {
            if costs[i] == COST_INF && pos.x == tx && pos.y == ty {
                costs[i] = g;
                remaining -= 1;
            }
        }
        if remaining == 0 {
            break;
        }

        for d in 0..dirs {
            let (dx, dy) = if use_8_dir {
                (DX8[d], DY8[d])
            } else {
                (DX4[d], DY4[d])
            };
            let (nx, ny) = (pos.x + dx, pos.y + dy);
            if !window.contains(nx, ny) || !grid.is_walkable_at(nx, ny, z) {
                continue;
            }
            let diagonal = dx != 0 && dy != 0;
            if diagonal
                && (!grid.is_walkable_at(pos.x + dx, pos.y, z)
                    || !grid.is_walkable_at(pos.x, pos.y + dy, z))
            {
                continue;
            }
            let base = grid.move_cost_at(nx, ny, z);
            if base >= COST_INF {
                continue;
            }
            let ng = g + step_cost(base, diagonal);
            let nidx = scratch.index(nx, ny, z);
            scratch.touch(nidx);
            if scratch.closed[nidx] || ng >= scratch.g[nidx] {
                continue;
            }
            scratch.g[nidx] = ng;
            scratch.parent[nidx] = pos;
            scratch.push(Point::new(nx, ny, z), ng, ng);
        }
    }

    costs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_for(grid: &WorldGrid) -> SearchScratch {
        SearchScratch::for_grid(grid)
    }

    #[test]
    fn straight_path_4_dir() {
        let grid = WorldGrid::from_ascii(".....\n.....\n.....", 0, 0).unwrap();
        let mut scratch = scratch_for(&grid);
        let path = a_star(
            &grid,
            &mut scratch,
            Point::new(0, 0, 0),
            Point::new(4, 0, 0),
            false,
        );
        assert_eq!(path.len(), 5);
        assert_eq!(path[0], Point::new(4, 0, 0));
        assert_eq!(path[4], Point::new(0, 0, 0));
    }

    #[test]
    fn diagonal_shortens_8_dir() {
        let grid = WorldGrid::from_ascii(".....\n.....\n.....\n.....\n.....", 0, 0).unwrap();
        let mut scratch = scratch_for(&grid);
        let path = a_star(
            &grid,
            &mut scratch,
            Point::new(0, 0, 0),
            Point::new(4, 4, 0),
            true,
        );
        assert_eq!(path.len(), 5);
    }

    #[test]
    fn wall_forces_detour() {
        let grid = WorldGrid::from_ascii("...\n##.\n...", 0, 0).unwrap();
        let mut scratch = scratch_for(&grid);
        let path = a_star(
            &grid,
            &mut scratch,
            Point::new(0, 0, 0),
            Point::new(0, 2, 0),
            false,
        );
        assert!(path.len() > 3);
        assert_eq!(path[0], Point::new(0, 2, 0));
        assert_eq!(*path.last().unwrap(), Point::new(0, 0, 0));
    }

    #[test]
    fn no_path_into_sealed_box() {
        let grid = WorldGrid::from_ascii(".....\n.###.\n.#.#.\n.###.\n.....", 0, 0).unwrap();
        let mut scratch = scratch_for(&grid);
        let path = a_star(
            &grid,
            &mut scratch,
            Point::new(0, 0, 0),
            Point::new(2, 2, 0),
            true,
        );
        assert!(path.is_empty());
    }

    #[test]
    fn ladder_climb_crosses_levels() {
        let map = "floor:0\n...\n.L.\n...\nfloor:1\n...\n.L.\n...";
        let mut grid = WorldGrid::from_ascii(map, 0, 0).unwrap();
        grid.recalculate_ladder_column(1, 1);
        let mut scratch = scratch_for(&grid);
        let path = a_star(
            &grid,
            &mut scratch,
            Point::new(0, 0, 0),
            Point::new(2, 2, 1),
            false,
        );
        assert!(!path.is_empty());
        assert!(path.contains(&Point::new(1, 1, 0)));
        assert!(path.contains(&Point::new(1, 1, 1)));
    }

    #[test]
    fn chunk_window_confines_search() {
        let grid = WorldGrid::from_ascii("........\n........\n........\n........", 0, 0).unwrap();
        let mut scratch = scratch_for(&grid);
        let window = ChunkWindow {
            min_x: 0,
            min_y: 0,
            max_x: 4,
            max_y: 4,
        };
        // Goal outside the window: not found even though the grid is open.
        assert!(a_star_chunk(&grid, &mut scratch, Point::new(0, 0, 0), 6, 0, window, false).is_none());
        let (cost, path) =
            a_star_chunk(&grid, &mut scratch, Point::new(0, 0, 0), 3, 3, window, false).unwrap();
        assert_eq!(cost, 60);
        assert_eq!(path.len(), 7);
    }

    #[test]
    fn multi_target_costs_match_single() {
        let grid = WorldGrid::from_ascii("......\n.##...\n......", 0, 0).unwrap();
        let mut scratch = scratch_for(&grid);
        let window = ChunkWindow {
            min_x: 0,
            min_y: 0,
            max_x: 6,
            max_y: 3,
        };
        let start = Point::new(0, 0, 0);
        let targets = [(5, 0), (5, 2), (0, 2)];
        let costs = a_star_chunk_multi(&grid, &mut scratch, start, &targets, window, false);
        for (i, &(tx, ty)) in targets.iter().enumerate() {
            let (single, _) =
                a_star_chunk(&grid, &mut scratch, start, tx, ty, window, false).unwrap();
            assert_eq!(costs[i], single, "target {}", i);
        }
    }
}
