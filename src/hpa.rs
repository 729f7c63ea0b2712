//! Hierarchical search: insert virtual start/goal nodes into the abstract
//! graph, search it with a binary-heap A*, then refine each abstract hop
//! with a window-confined grid A* and stitch the pieces together.
//!
//! A failed refinement fails the whole query. The source experimented with
//! falling back to full-grid A* at that point and disabled it after it
//! burned whole seconds confirming unreachable goals; callers get an empty
//! path and retry after their cooldown instead.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::cell::COST_INF;
use crate::graph::AbstractGraph;
use crate::grid::WorldGrid;
use crate::search::{a_star_chunk, a_star_chunk_multi, ChunkWindow, SearchScratch};
use crate::stats::PathStats;
use crate::{Cost, Point};

/// Abstract open-set entry; `f` first, then `g`, then insertion order.
#[derive(Clone, Copy, PartialEq, Eq)]
struct AbstractOpen {
    f: Cost,
    g: Cost,
    seq: u32,
    id: u32,
}

impl Ord for AbstractOpen {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.g.cmp(&self.g))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for AbstractOpen {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn abstract_heuristic(p: Point, goal: Point) -> Cost {
    ((p.x - goal.x).abs() + (p.y - goal.y).abs() + (p.z - goal.z).abs()) * 10
}

/// HPA* query. Returns the refined path in goal-to-start order, empty on
/// failure. `update_dirty_chunks` must have run since the last grid edit;
/// the [`World`](crate::World) wrapper takes care of that.
pub fn find_path_hpa(
    grid: &WorldGrid,
    graph: &AbstractGraph,
    scratch: &mut SearchScratch,
    stats: &mut PathStats,
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

    let (scx, scy) = grid.chunk_of(start.x, start.y);
    let (gcx, gcy) = grid.chunk_of(goal.x, goal.y);

    // Same chunk, same level: refine directly, no abstract hop needed.
    if start.z == goal.z && (scx, scy) == (gcx, gcy) {
        let window = ChunkWindow::chunk_with_border(grid, scx, scy);
        if let Some((_, path)) =
            a_star_chunk(grid, scratch, start, goal.x, goal.y, window, use_8_dir)
        {
            return path;
        }
        // The direct window may be too tight; fall through to the abstract
        // graph, which can route out of the chunk and back.
    }

    let abstract_started = Instant::now();

    let start_chunk = grid.chunk_id_of(start.x, start.y);
    let goal_chunk = grid.chunk_id_of(goal.x, goal.y);

    // Temporary edges from the virtual start node to the start chunk's
    // entrances, and from the goal chunk's entrances to the virtual goal.
    let s_entrances = graph.entrances_touching(start_chunk, start.z);
    let g_entrances = graph.entrances_touching(goal_chunk, goal.z);
    if s_entrances.is_empty() || g_entrances.is_empty() {
        return Vec::new();
    }

    let s_window = ChunkWindow::chunk_with_border(grid, scx, scy);
    let s_targets: Vec<(i32, i32)> = s_entrances
        .iter()
        .map(|&i| {
            let p = graph.entrances()[i as usize].pos;
            (p.x, p.y)
        })
        .collect();
    let s_costs = a_star_chunk_multi(grid, scratch, start, &s_targets, s_window, use_8_dir);
    let mut explored = scratch.nodes_explored;

    let g_window = ChunkWindow::chunk_with_border(grid, gcx, gcy);
    let g_targets: Vec<(i32, i32)> = g_entrances
        .iter()
        .map(|&i| {
            let p = graph.entrances()[i as usize].pos;
            (p.x, p.y)
        })
        .collect();
    let g_costs = a_star_chunk_multi(grid, scratch, goal, &g_targets, g_window, use_8_dir);
    explored += scratch.nodes_explored;

    let s_edges: Vec<(u32, Cost)> = s_entrances
        .iter()
        .zip(&s_costs)
        .filter(|(_, &c)| c < COST_INF)
        .map(|(&i, &c)| (i, c))
        .collect();
    let mut goal_edge_cost: Vec<Cost> = vec![COST_INF; graph.entrances().len()];
    let mut any_goal_edge = false;
    for (&i, &c) in g_entrances.iter().zip(&g_costs) {
        if c < COST_INF {
            goal_edge_cost[i as usize] = c;
            any_goal_edge = true;
        }
    }
    if s_edges.is_empty() || !any_goal_edge {
        return Vec::new();
    }

    // Abstract A* over entrance ids; `n` is the virtual start, `n + 1` the
    // virtual goal.
    let n = graph.entrances().len();
    let s_id = n as u32;
    let g_id = n as u32 + 1;

    let mut g_cost = vec![COST_INF; n + 2];
    let mut parent = vec![u32::MAX; n + 2];
    let mut closed = vec![false; n + 2];
    let mut heap = BinaryHeap::new();
    let mut seq = 0u32;

    let pos_of = |id: u32| -> Point {
        if id == s_id {
            start
        } else if id == g_id {
            goal
        } else {
            graph.entrances()[id as usize].pos
        }
    };

    g_cost[s_id as usize] = 0;
    heap.push(AbstractOpen {
        f: abstract_heuristic(start, goal),
        g: 0,
        seq,
        id: s_id,
    });
    seq += 1;

    let mut found = false;
    while let Some(node) = heap.pop() {
        let id = node.id as usize;
        if closed[id] || node.g > g_cost[id] {
            continue;
        }
        closed[id] = true;
        explored += 1;
        if node.id == g_id {
            found = true;
            break;
        }

        let g_here = g_cost[id];
        let mut relax = |next: u32, cost: Cost, heap: &mut BinaryHeap<AbstractOpen>,
                         g_cost: &mut Vec<Cost>,
                         parent: &mut Vec<u32>,
                         seq: &mut u32| {
            let ng = g_here + cost;
            if ng < g_cost[next as usize] && !closed[next as usize] {
                g_cost[next as usize] = ng;
                parent[next as usize] = node.id;
                heap.push(AbstractOpen {
                    f: ng + abstract_heuristic(pos_of(next), goal),
                    g: ng,
                    seq: *seq,
                    id: next,
                });
                *seq += 1;
            }
        };

        if node.id == s_id {
            for &(e, c) in &s_edges {
                relax(e, c, &mut heap, &mut g_cost, &mut parent, &mut seq);
            }
        } else {
            for (other, cost, _) in graph.neighbors(node.id) {
                relax(other, cost, &mut heap, &mut g_cost, &mut parent, &mut seq);
            }
            if goal_edge_cost[id] < COST_INF {
                relax(g_id, goal_edge_cost[id], &mut heap, &mut g_cost, &mut parent, &mut seq);
            }
        }
    }

    stats.hpa_abstract_ms = abstract_started.elapsed().as_secs_f64() * 1000.0;

    if !found {
        stats.nodes_explored = explored;
        return Vec::new();
    }

    // Backtrack into the waypoint sequence start, e0, ..., ek, goal.
    let mut ids = Vec::new();
    let mut cur = g_id;
    while cur != u32::MAX {
        ids.push(cur);
        if cur == s_id {
            break;
        }
        cur = parent[cur as usize];
    }
    ids.reverse();

    // Refinement: grid A* between each consecutive pair, stitched start to
    // goal, dropping the duplicated joining cell. Ladder/ramp hops emit
    // their exact transition cells.
    let refine_started = Instant::now();
    let margin = grid.chunk_w().min(grid.chunk_h()) / 2;
    let mut full: Vec<Point> = vec![start];

    for pair in ids.windows(2) {
        let a = pos_of(pair[0]);
        let b = pos_of(pair[1]);
        if a == b {
            continue;
        }
        if a.z != b.z {
            // Abstract vertical hop: the graph only links directly
            // traversable ladder/ramp cell pairs, so the refined step is
            // the pair itself.
            full.push(b);
            continue;
        }
        let (acx, acy) = grid.chunk_of(a.x, a.y);
        let (bcx, bcy) = grid.chunk_of(b.x, b.y);
        let window = ChunkWindow::chunk_with_border(grid, acx, acy)
            .union(ChunkWindow::chunk_with_border(grid, bcx, bcy))
            .expanded(margin, grid);
        let Some((_, seg)) = a_star_chunk(grid, scratch, a, b.x, b.y, window, use_8_dir) else {
            stats.hpa_refine_ms = refine_started.elapsed().as_secs_f64() * 1000.0;
            stats.nodes_explored = explored;
            return Vec::new();
        };
        explored += scratch.nodes_explored;
        // `seg` is goal-first; append it start-first, skipping the join.
        full.extend(seg.iter().rev().skip(1));
    }

    stats.hpa_refine_ms = refine_started.elapsed().as_secs_f64() * 1000.0;
    stats.nodes_explored = explored;

    full.reverse();
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellKind;

    struct Fixture {
        grid: WorldGrid,
        graph: AbstractGraph,
        scratch: SearchScratch,
        stats: PathStats,
    }

    impl Fixture {
        fn new(grid: WorldGrid) -> Fixture {
            let mut graph = AbstractGraph::new();
            let mut scratch = SearchScratch::for_grid(&grid);
            graph.build_entrances(&grid);
            graph.build_graph(&grid, &mut scratch, true);
            Fixture {
                grid,
                graph,
                scratch,
                stats: PathStats::new(),
            }
        }

        fn find(&mut self, start: Point, goal: Point) -> Vec<Point> {
            find_path_hpa(
                &self.grid,
                &self.graph,
                &mut self.scratch,
                &mut self.stats,
                start,
                goal,
                true,
            )
        }
    }

    #[test]
    fn same_chunk_path_is_direct() {
        let mut f = Fixture::new(WorldGrid::with_chunk_size(16, 16, 16, 16));
        let path = f.find(Point::new(1, 1, 0), Point::new(14, 14, 0));
        assert!(!path.is_empty());
        assert_eq!(path[path.len() - 1], Point::new(1, 1, 0));
        assert_eq!(path[0], Point::new(14, 14, 0));
        // 8-dir: the diagonal walk is 13 steps, 14 cells.
        assert!(path.len() <= 28);
    }

    #[test]
    fn cross_chunk_path_exists() {
        let mut f = Fixture::new(WorldGrid::with_chunk_size(64, 64, 16, 16));
        let path = f.find(Point::new(2, 2, 0), Point::new(60, 60, 0));
        assert!(!path.is_empty());
        assert_eq!(*path.last().unwrap(), Point::new(2, 2, 0));
        assert_eq!(path[0], Point::new(60, 60, 0));
        // Consecutive cells are 8-neighbors.
        for w in path.windows(2) {
            let (a, b) = (w[0], w[1]);
            assert!((a.x - b.x).abs() <= 1 && (a.y - b.y).abs() <= 1 && a.z == b.z);
        }
    }

    #[test]
    fn walled_goal_fails() {
        let mut grid = WorldGrid::with_chunk_size(64, 64, 16, 16);
        for x in 38..43 {
            for y in 38..43 {
                if x == 38 || x == 42 || y == 38 || y == 42 {
                    grid.set_kind(x, y, 0, CellKind::Wall);
                }
            }
        }
        let mut f = Fixture::new(grid);
        let path = f.find(Point::new(2, 2, 0), Point::new(40, 40, 0));
        assert!(path.is_empty());
    }

    #[test]
    fn ladder_route_emits_transition_cells() {
        let mut grid = WorldGrid::with_chunk_size(32, 32, 16, 16);
        grid.place_ladder(8, 8, 0);
        grid.place_ladder(8, 8, 1);
        let mut f = Fixture::new(grid);
        let path = f.find(Point::new(1, 1, 0), Point::new(20, 20, 1));
        assert!(!path.is_empty());
        assert!(path.contains(&Point::new(8, 8, 0)));
        assert!(path.contains(&Point::new(8, 8, 1)));
    }

    #[test]
    fn sealed_chunk_routes_out_and_back() {
        // A wall splits the start chunk top to bottom, spanning the whole
        // direct search window; the only route between the halves runs
        // through the chunk below.
        let mut grid = WorldGrid::with_chunk_size(32, 32, 16, 16);
        for y in 0..=16 {
            grid.set_kind(8, y, 0, CellKind::Wall);
        }
        let mut f = Fixture::new(grid);
        let path = f.find(Point::new(4, 2, 0), Point::new(12, 2, 0));
        assert!(!path.is_empty());
        // Must dip into the neighbor chunk.
        assert!(path.iter().any(|p| p.y >= 16));
    }
}
