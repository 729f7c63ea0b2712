//! Jump-point search variants for uniform-cost grids.
//!
//! JPS runs the standard recursive jump with forced-neighbor rules; JPS+
//! additionally precomputes per-cell jump distances in all eight directions
//! so the runtime search touches no intermediate cells at all. Both emit
//! sparse waypoints and interpolate the straight segments back into full
//! cell paths.
//!
//! Limitations, by design: both variants assume every walkable cell costs
//! the same (they skip cells without looking at their costs, so variable
//! terrain would make them wrong, not just suboptimal), they are
//! 8-directional, and they work within a single z-level. Cross-level
//! queries return empty; movers wanting ladders use HPA* or plain A*.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::HashMap;

use crate::grid::WorldGrid;
use crate::{Cost, Point};

const DIRS: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

#[inline]
fn octile(dx: i32, dy: i32) -> Cost {
    let dx = dx.abs();
    let dy = dy.abs();
    10 * (dx.max(dy) - dx.min(dy)) + 14 * dx.min(dy)
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct JumpOpen {
    f: Cost,
    g: Cost,
    seq: u32,
    pos: (i32, i32),
}

impl Ord for JumpOpen {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.g.cmp(&self.g))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for JumpOpen {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Expand the sparse waypoint chain (start-first) into the full cell path
/// in goal-to-start order. Segments between jump points are straight, so
/// interpolation is a fixed sign step.
fn fill_segments(waypoints: &[(i32, i32)], z: i32) -> Vec<Point> {
    let mut full: Vec<Point> = Vec::new();
    for (i, &(x, y)) in waypoints.iter().enumerate() {
        if i == 0 {
            full.push(Point::new(x, y, z));
            continue;
        }
        let (px, py) = waypoints[i - 1];
        let sx = (x - px).signum();
        let sy = (y - py).signum();
        let (mut cx, mut cy) = (px, py);
        while (cx, cy) != (x, y) {
            cx += sx;
            cy += sy;
            full.push(Point::new(cx, cy, z));
        }
    }
    full.reverse();
    full
}

fn reconstruct(
    parents: &HashMap<(i32, i32), (i32, i32)>,
    start: (i32, i32),
    goal: (i32, i32),
    z: i32,
) -> Vec<Point> {
    let mut waypoints = vec![goal];
    let mut cur = goal;
    while cur != start {
        cur = parents[&cur];
        waypoints.push(cur);
    }
    waypoints.reverse();
    fill_segments(&waypoints, z)
}

/// Has `(x, y)` a forced neighbor when arriving with travel direction
/// `(dx, dy)`? Because diagonal movement may not cut corners, the turn
/// becomes possible one cell *past* the obstruction: the side cell is open
/// here but was blocked beside the previous cell. Cardinal travel only;
/// diagonal rays detect their jump points through component probes.
fn forced_cardinal(grid: &WorldGrid, x: i32, y: i32, dx: i32, dy: i32, z: i32) -> bool {
    let w = |x, y| grid.is_walkable_at(x, y, z);
    if dx != 0 {
        (w(x, y + 1) && !w(x - dx, y + 1)) || (w(x, y - 1) && !w(x - dx, y - 1))
    } else {
        (w(x + 1, y) && !w(x + 1, y - dy)) || (w(x - 1, y) && !w(x - 1, y - dy))
    }
}

/// Recursive jump from `(x, y)` in `(dx, dy)`. Returns the next jump point
/// or `None` when the ray dies in a wall or leaves the grid.
fn jump(
    grid: &WorldGrid,
    x: i32,
    y: i32,
    dx: i32,
    dy: i32,
    goal: (i32, i32),
    z: i32,
) -> Option<(i32, i32)> {
    let (nx, ny) = (x + dx, y + dy);
    if !grid.is_walkable_at(nx, ny, z) {
        return None;
    }
    // Diagonal steps obey the same corner-cut rule as A*.
    if dx != 0 && dy != 0 && (!grid.is_walkable_at(x + dx, y, z) || !grid.is_walkable_at(x, y + dy, z))
    {
        return None;
    }
    if (nx, ny) == goal {
        return Some((nx, ny));
    }

    if dx != 0 && dy != 0 {
        // A straight jump branching off makes a diagonal cell a jump point.
        // (Classic diagonal forced neighbors would require the corner-cut
        // the movement rules forbid, so they cannot occur here.)
        if jump(grid, nx, ny, dx, 0, goal, z).is_some()
            || jump(grid, nx, ny, 0, dy, goal, z).is_some()
        {
            return Some((nx, ny));
        }
    } else if forced_cardinal(grid, nx, ny, dx, dy, z) {
        return Some((nx, ny));
    }

    jump(grid, nx, ny, dx, dy, goal, z)
}

/// Jump-point search between two cells on one z-level. Empty when the
/// levels differ or no path exists.
///
/// Every popped node explores all eight directions. Direction pruning by
/// parent would be faster but needs per-direction turn bookkeeping in the
/// no-corner-cut movement model; exploring the superset keeps the search
/// correct and jump() still skips the bulk of the grid.
pub fn find_path_jps(grid: &WorldGrid, start: Point, goal: Point) -> Vec<Point> {
    if start.z != goal.z {
        return Vec::new();
    }
    let z = start.z;
    if !grid.is_walkable_at(start.x, start.y, z) || !grid.is_walkable_at(goal.x, goal.y, z) {
        return Vec::new();
    }
    let s = (start.x, start.y);
    let t = (goal.x, goal.y);
    if s == t {
        return vec![start];
    }

    let mut g: HashMap<(i32, i32), Cost> = HashMap::new();
    let mut parents: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
    let mut closed: HashMap<(i32, i32), bool> = HashMap::new();
    let mut heap = BinaryHeap::new();
    let mut seq = 0u32;

    g.insert(s, 0);
    heap.push(JumpOpen {
        f: octile(t.0 - s.0, t.1 - s.1),
        g: 0,
        seq,
        pos: s,
    });
    seq += 1;

    while let Some(node) = heap.pop() {
        let pos = node.pos;
        if *closed.get(&pos).unwrap_or(&false) || node.g > g[&pos] {
            continue;
        }
        closed.insert(pos, true);
        if pos == t {
            return reconstruct(&parents, s, t, z);
        }

        for &(dx, dy) in &DIRS {
            if let Some(jp) = jump(grid, pos.0, pos.1, dx, dy, t, z) {
                let ng = node.g + octile(jp.0 - pos.0, jp.1 - pos.1);
                let better = g.get(&jp).map_or(true, |&old| ng < old);
                if better && !closed.get(&jp).unwrap_or(&false) {
                    g.insert(jp, ng);
                    parents.insert(jp, pos);
                    heap.push(JumpOpen {
                        f: ng + octile(t.0 - jp.0, t.1 - jp.1),
                        g: ng,
                        seq,
                        pos: jp,
                    });
                    seq += 1;
                }
            }
        }
    }

    Vec::new()
}

/// Per-cell jump distances for one z-level: positive = distance to the next
/// jump point in that direction, negative = distance to the wall or grid
/// edge. Indexed by [`DIRS`] order.
#[derive(Clone, Debug)]
pub struct JpsPlusLevel {
    width: i32,
    height: i32,
    dist: Vec<[i16; 8]>,
}

/// Lazily built JPS+ tables, one per z-level, invalidated wholesale on any
/// grid edit.
#[derive(Clone, Debug, Default)]
pub struct JpsPlusTables {
    levels: Vec<Option<JpsPlusLevel>>,
}

impl JpsPlusTables {
    /// Empty table set sized for `depth` levels.
    pub fn new(depth: i32) -> JpsPlusTables {
        JpsPlusTables {
            levels: (0..depth).map(|_| None).collect(),
        }
    }

    /// Throw every level away (the grid changed).
    pub fn invalidate(&mut self) {
        for level in &mut self.levels {
            *level = None;
        }
    }

    /// Get or build the table for `z`.
    pub fn level(&mut self, grid: &WorldGrid, z: i32) -> Option<&JpsPlusLevel> {
        if z < 0 || z as usize >= self.levels.len() {
            return None;
        }
        let slot = &mut self.levels[z as usize];
        if slot.is_none() {
            *slot = Some(JpsPlusLevel::build(grid, z));
        }
        slot.as_ref()
    }
}

impl JpsPlusLevel {
    #[inline]
    fn idx(&self, x: i32, y: i32) -> usize {
        (y * self.width + x) as usize
    }

    #[inline]
    fn dir_index(dx: i32, dy: i32) -> usize {
        DIRS.iter()
            .position(|&d| d == (dx, dy))
            .unwrap_or_default()
    }

    /// Precompute jump distances: cardinal sweeps first (each cell learns
    /// how far its ray travels before a primary jump point or a wall), then
    /// diagonal recurrences in dependency order.
    pub fn build(grid: &WorldGrid, z: i32) -> JpsPlusLevel {
        let (w, h) = (grid.width(), grid.height());
        let mut level = JpsPlusLevel {
            width: w,
            height: h,
            dist: vec![[0; 8]; (w * h) as usize],
        };
        let walk = |x: i32, y: i32| grid.is_walkable_at(x, y, z);

        // Cardinal sweeps. For travel direction d, scan in the opposite
        // order so the cell behind is already resolved.
        let cardinal = [(-1, 0), (1, 0), (0, -1), (0, 1)];
        for (dx, dy) in cardinal {
            let di = Self::dir_index(dx, dy);
            let xs: Vec<i32> = if dx > 0 { (0..w).rev().collect() } else { (0..w).collect() };
            let ys: Vec<i32> = if dy > 0 { (0..h).rev().collect() } else { (0..h).collect() };
            for &y in &ys {
                for &x in &xs {
                    if !walk(x, y) {
                        continue;
                    }
                    let (px, py) = (x + dx, y + dy);
                    let d = if !walk(px, py) {
                        0
                    } else if forced_cardinal(grid, px, py, dx, dy, z) {
                        1
                    } else {
                        let prev = level.dist[level.idx(px, py)][di];
                        if prev > 0 {
                            prev + 1
                        } else {
                            prev - 1
                        }
                    };
                    let idx = level.idx(x, y);
                    level.dist[idx][di] = d;
                }
            }
        }

        // Diagonal recurrences, scanned so the diagonal predecessor is done.
        let diagonals = [(-1, -1), (1, -1), (-1, 1), (1, 1)];
        for (dx, dy) in diagonals {
            let di = Self::dir_index(dx, dy);
            let hx = Self::dir_index(dx, 0);
            let vy = Self::dir_index(0, dy);
            let xs: Vec<i32> = if dx > 0 { (0..w).rev().collect() } else { (0..w).collect() };
            let ys: Vec<i32> = if dy > 0 { (0..h).rev().collect() } else { (0..h).collect() };
            for &y in &ys {
                for &x in &xs {
                    if !walk(x, y) {
                        continue;
                    }
                    let (nx, ny) = (x + dx, y + dy);
                    let d = if !walk(nx, ny) || !walk(x + dx, y) || !walk(x, y + dy) {
                        0
                    } else {
                        let nidx = level.idx(nx, ny);
                        if level.dist[nidx][hx] > 0 || level.dist[nidx][vy] > 0 {
                            1
                        } else {
                            let prev = level.dist[nidx][di];
                            if prev > 0 {
                                prev + 1
                            } else {
                                prev - 1
                            }
                        }
                    };
                    let idx = level.idx(x, y);
                    level.dist[idx][di] = d;
                }
            }
        }

        level
    }
}

/// JPS+ search using the precomputed tables. Same contract and limitations
/// as [`find_path_jps`].
pub fn find_path_jps_plus(
    grid: &WorldGrid,
    tables: &mut JpsPlusTables,
    start: Point,
    goal: Point,
) -> Vec<Point> {
    if start.z != goal.z {
        return Vec::new();
    }
    let z = start.z;
    if !grid.is_walkable_at(start.x, start.y, z) || !grid.is_walkable_at(goal.x, goal.y, z) {
        return Vec::new();
    }
    let Some(level) = tables.level(grid, z) else {
        return Vec::new();
    };
    let s = (start.x, start.y);
    let t = (goal.x, goal.y);
    if s == t {
        return vec![start];
    }

    let mut g: HashMap<(i32, i32), Cost> = HashMap::new();
    let mut parents: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
    let mut closed: HashMap<(i32, i32), bool> = HashMap::new();
    let mut heap = BinaryHeap::new();
    let mut seq = 0u32;

    g.insert(s, 0);
    heap.push(JumpOpen {
        f: octile(t.0 - s.0, t.1 - s.1),
        g: 0,
        seq,
        pos: s,
    });
    seq += 1;

    while let Some(node) = heap.pop() {
        let pos = node.pos;
        if *closed.get(&pos).unwrap_or(&false) || node.g > g[&pos] {
            continue;
        }
        closed.insert(pos, true);
        if pos == t {
            return reconstruct(&parents, s, t, z);
        }

        let cell = level.dist[level.idx(pos.0, pos.1)];
        for (di, &(dx, dy)) in DIRS.iter().enumerate() {
            let d = cell[di];
            let reach = d.unsigned_abs() as i32;

            // Can this ray hit the goal before it ends? For cardinal rays
            // the goal must be exactly aligned; for diagonal rays a "target
            // jump" happens where the goal's row or column is crossed.
            let (gdx, gdy) = (t.0 - pos.0, t.1 - pos.1);
            let target_steps = if dx != 0 && dy != 0 {
                if gdx.signum() == dx && gdy.signum() == dy {
                    Some(gdx.abs().min(gdy.abs()))
                } else {
                    None
                }
            } else if dx != 0 {
                (gdy == 0 && gdx.signum() == dx).then(|| gdx.abs())
            } else {
                (gdx == 0 && gdy.signum() == dy).then(|| gdy.abs())
            };

            let jp = match target_steps {
                Some(steps) if steps <= reach && steps > 0 => {
                    Some((pos.0 + dx * steps, pos.1 + dy * steps))
                }
                _ if d > 0 => Some((pos.0 + dx * reach, pos.1 + dy * reach)),
                _ => None,
            };

            if let Some(jp) = jp {
                let ng = node.g + octile(jp.0 - pos.0, jp.1 - pos.1);
                let better = g.get(&jp).map_or(true, |&old| ng < old);
                if better && !closed.get(&jp).unwrap_or(&false) {
                    g.insert(jp, ng);
                    parents.insert(jp, pos);
                    heap.push(JumpOpen {
                        f: ng + octile(t.0 - jp.0, t.1 - jp.1),
                        g: ng,
                        seq,
                        pos: jp,
                    });
                    seq += 1;
                }
            }
        }
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(w: i32, h: i32) -> WorldGrid {
        WorldGrid::with_chunk_size(w, h, 16, 16)
    }

    #[test]
    fn jps_straight_line() {
        let grid = open(16, 16);
        let path = find_path_jps(&grid, Point::new(0, 0, 0), Point::new(10, 0, 0));
        assert_eq!(path.len(), 11);
        assert_eq!(path[0], Point::new(10, 0, 0));
        assert_eq!(path[10], Point::new(0, 0, 0));
    }

    #[test]
    fn jps_routes_around_wall() {
        let grid = WorldGrid::from_ascii("........\n.######.\n........", 0, 0).unwrap();
        let path = find_path_jps(&grid, Point::new(2, 0, 0), Point::new(2, 2, 0));
        assert!(!path.is_empty());
        // Every consecutive pair is an 8-neighbor step.
        for w in path.windows(2) {
            assert!((w[0].x - w[1].x).abs() <= 1 && (w[0].y - w[1].y).abs() <= 1);
        }
        assert!(!path.iter().any(|p| grid.kind_at(p.x, p.y, 0).blocks_movement()));
    }

    #[test]
    fn jps_refuses_cross_level() {
        let grid = open(8, 8);
        assert!(find_path_jps(&grid, Point::new(0, 0, 0), Point::new(3, 3, 1)).is_empty());
    }

    #[test]
    fn jps_no_path_when_sealed() {
        let grid = WorldGrid::from_ascii(".....\n.###.\n.#.#.\n.###.\n.....", 0, 0).unwrap();
        assert!(find_path_jps(&grid, Point::new(0, 0, 0), Point::new(2, 2, 0)).is_empty());
    }

    #[test]
    fn jps_plus_matches_jps_cost() {
        let grid = WorldGrid::from_ascii(
            "..........\n..##...#..\n.......#..\n..#####...\n..........\n.#...###..\n..........",
            0,
            0,
        )
        .unwrap();
        let mut tables = JpsPlusTables::new(grid.depth());
        let cases = [
            ((0, 0), (9, 6)),
            ((0, 6), (9, 0)),
            ((4, 2), (3, 6)),
            ((0, 3), (9, 4)),
        ];
        for ((sx, sy), (gx, gy)) in cases {
            let start = Point::new(sx, sy, 0);
            let goal = Point::new(gx, gy, 0);
            let a = find_path_jps(&grid, start, goal);
            let b = find_path_jps_plus(&grid, &mut tables, start, goal);
            assert_eq!(a.is_empty(), b.is_empty(), "{:?} -> {:?}", start, goal);
            if !a.is_empty() {
                // Optimal cost is unique even when the path shape differs.
                let cost = |p: &[Point]| -> Cost {
                    p.windows(2)
                        .map(|w| octile(w[0].x - w[1].x, w[0].y - w[1].y))
                        .sum()
                };
                assert_eq!(cost(&a), cost(&b), "{:?} -> {:?}", start, goal);
            }
        }
    }

    #[test]
    fn tables_rebuild_after_invalidate() {
        let mut grid = open(16, 16);
        let mut tables = JpsPlusTables::new(grid.depth());
        let before = find_path_jps_plus(
            &grid,
            &mut tables,
            Point::new(0, 0, 0),
            Point::new(15, 0, 0),
        );
        assert_eq!(before.len(), 16);

        for y in 0..16 {
            if y != 15 {
                grid.set_kind(8, y, 0, crate::cell::CellKind::Wall);
            }
        }
        tables.invalidate();
        let after = find_path_jps_plus(
            &grid,
            &mut tables,
            Point::new(0, 0, 0),
            Point::new(15, 0, 0),
        );
        assert!(after.len() > 16);
    }
}
