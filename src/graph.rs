//! The HPA* abstract graph: entrances on chunk borders, intra-chunk edges
//! weighted by window-confined A* costs, and vertical ladder/ramp links.
//!
//! The graph supports two rebuild paths with the same result: a full
//! rebuild ([`AbstractGraph::build_entrances`] + [`AbstractGraph::build_graph`])
//! and an incremental one ([`AbstractGraph::update_dirty_chunks`]) that only
//! touches dirty chunks and their cardinal neighbors. After either, the
//! edge multiset is identical up to entrance renumbering, which is what the
//! incremental-consistency tests pin down.

use hashbrown::{HashMap, HashSet};
use slab::Slab;

use crate::cell::COST_INF;
use crate::grid::WorldGrid;
use crate::search::{a_star_chunk_multi, ChunkWindow, SearchScratch};
use crate::{Cost, Point};

/// Longest run of mutually walkable border cells served by one entrance;
/// longer runs are segmented.
pub const MAX_ENTRANCE_WIDTH: i32 = 6;
/// Upper bound on entrances; inserts beyond it are dropped and logged.
pub const MAX_ENTRANCES: usize = 16_384;
/// Upper bound on graph edges; inserts beyond it are dropped and logged.
pub const MAX_EDGES: usize = 262_144;
/// Per-entrance adjacency fan-out bound.
pub const MAX_EDGES_PER_NODE: usize = 64;

/// Climbing one ladder step costs the same as one cardinal walk step.
pub const LADDER_LINK_COST: Cost = 10;
/// Walking a ramp costs the same as one diagonal step.
pub const RAMP_LINK_COST: Cost = 14;

/// A node of the abstract graph: a walkable cell on a chunk border (or a
/// ladder/ramp cell), tagged with the two chunks it straddles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entrance {
    /// Cell position, z included.
    pub pos: Point,
    /// Flat id of one owning chunk.
    pub chunk1: i32,
    /// Flat id of the other owning chunk; equal to `chunk1` for ladder and
    /// ramp nodes, which sit inside a chunk rather than on a border.
    pub chunk2: i32,
}

/// What kind of travel an abstract edge represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// Intra-chunk walking; cost comes from window-confined A*.
    Walk,
    /// A one-level ladder climb.
    Ladder,
    /// A one-level ramp transition.
    Ramp,
}

/// An undirected abstract edge. Both endpoints list it in their adjacency,
/// so traversal works in either direction.
#[derive(Clone, Copy, Debug)]
pub struct GraphEdge {
    /// One endpoint (entrance index).
    pub a: u32,
    /// The other endpoint.
    pub b: u32,
    /// Travel cost between the endpoints.
    pub cost: Cost,
    /// Walk, ladder or ramp.
    pub kind: EdgeKind,
    /// `(chunk id, z)` the edge was built in; vertical links carry both
    /// levels. Incremental updates drop an edge when an owner is affected.
    owner_a: (i32, i32),
    owner_b: (i32, i32),
}

/// The abstract graph plus its adjacency index.
#[derive(Clone, Debug, Default)]
pub struct AbstractGraph {
    entrances: Vec<Entrance>,
    edges: Slab<GraphEdge>,
    adjacency: Vec<Vec<usize>>,
    vertical_links: usize,
}

impl AbstractGraph {
    /// An empty graph; call [`build_entrances`](Self::build_entrances) and
    /// [`build_graph`](Self::build_graph) to populate it.
    pub fn new() -> AbstractGraph {
        AbstractGraph::default()
    }

    /// All entrances, indexable by the ids edges refer to.
    #[inline]
    pub fn entrances(&self) -> &[Entrance] {
        &self.entrances
    }

    /// Number of edges currently in the graph.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterate all edges (unordered).
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().map(|(_, e)| e)
    }

    /// Does the graph contain any ladder or ramp link? Endless-mode goal
    /// selection only aims at other z-levels when this holds.
    #[inline]
    pub fn has_vertical_links(&self) -> bool {
        self.vertical_links > 0
    }

    /// Neighbors of entrance `idx` as `(other, cost, kind)`.
    pub fn neighbors(&self, idx: u32) -> impl Iterator<Item = (u32, Cost, EdgeKind)> + '_ {
        self.adjacency
            .get(idx as usize)
            .into_iter()
            .flatten()
            .map(move |&key| {
                let e = &self.edges[key];
                let other = if e.a == idx { e.b } else { e.a };
                (other, e.cost, e.kind)
            })
    }

    /// Indices of every entrance touching `chunk` at level `z`.
    pub fn entrances_touching(&self, chunk: i32, z: i32) -> Vec<u32> {
        self.entrances
            .iter()
            .enumerate()
            .filter(|(_, e)| e.pos.z == z && (e.chunk1 == chunk || e.chunk2 == chunk))
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Index of the entrance exactly at `pos`, if any.
    pub fn entrance_at(&self, pos: Point) -> Option<u32> {
        self.entrances
            .iter()
            .position(|e| e.pos == pos)
            .map(|i| i as u32)
    }

    fn add_entrance(&mut self, pos: Point, chunk1: i32, chunk2: i32) -> Option<u32> {
        if self.entrances.len() >= MAX_ENTRANCES {
            log::warn!("entrance limit {} reached, dropping {:?}", MAX_ENTRANCES, pos);
            return None;
        }
        self.entrances.push(Entrance { pos, chunk1, chunk2 });
        self.adjacency.push(Vec::new());
        Some(self.entrances.len() as u32 - 1)
    }

    fn ensure_entrance(&mut self, grid: &WorldGrid, pos: Point) -> Option<u32> {
        if let Some(idx) = self.entrance_at(pos) {
            return Some(idx);
        }
        let chunk = grid.chunk_id_of(pos.x, pos.y);
        self.add_entrance(pos, chunk, chunk)
    }

    fn has_edge_between(&self, a: u32, b: u32) -> bool {
        self.adjacency
            .get(a as usize)
            .map(|adj| {
                adj.iter().any(|&key| {
                    let e = &self.edges[key];
                    (e.a == a && e.b == b) || (e.a == b && e.b == a)
                })
            })
            .unwrap_or(false)
    }

    fn add_edge(
        &mut self,
        a: u32,
        b: u32,
        cost: Cost,
        kind: EdgeKind,
        owner_a: (i32, i32),
        owner_b: (i32, i32),
    ) {
        if a == b || self.has_edge_between(a, b) {
            return;
        }
        if self.edges.len() >= MAX_EDGES {
            log::warn!("edge limit {} reached, dropping edge", MAX_EDGES);
            return;
        }
        if self.adjacency[a as usize].len() >= MAX_EDGES_PER_NODE
            || self.adjacency[b as usize].len() >= MAX_EDGES_PER_NODE
        {
            log::warn!("adjacency fan-out limit reached at entrance {} or {}", a, b);
            return;
        }
        let key = self.edges.insert(GraphEdge {
            a,
            b,
            cost,
            kind,
            owner_a,
            owner_b,
        });
        self.adjacency[a as usize].push(key);
        self.adjacency[b as usize].push(key);
        if kind != EdgeKind::Walk {
            self.vertical_links += 1;
        }
    }

    /// Full entrance rebuild: scan every chunk border on every z-level,
    /// emit one entrance per walkable run (segmented at
    /// [`MAX_ENTRANCE_WIDTH`]), then add ladder and ramp nodes.
    pub fn build_entrances(&mut self, grid: &WorldGrid) {
        self.entrances.clear();
        self.adjacency.clear();
        self.edges.clear();
        self.vertical_links = 0;

        for z in 0..grid.depth() {
            self.scan_horizontal_borders(grid, z, None);
            self.scan_vertical_borders(grid, z, None);
        }
        self.add_vertical_nodes(grid, None);
    }

    fn scan_horizontal_borders(&mut self, grid: &WorldGrid, z: i32, only_cx_cy: Option<(i32, i32)>) {
        let (cw, _ch) = (grid.chunk_w(), grid.chunk_h());
        for cy in 0..grid.chunks_y() - 1 {
            for cx in 0..grid.chunks_x() {
                if let Some((ocx, ocy)) = only_cx_cy {
                    // `ocy` names the lower chunk row of the border.
                    if cx != ocx || cy + 1 != ocy {
                        continue;
                    }
                }
                let border_y = (cy + 1) * grid.chunk_h();
                let start_x = cx * cw;
                let chunk1 = cy * grid.chunks_x() + cx;
                let chunk2 = (cy + 1) * grid.chunks_x() + cx;

                let mut run_start = -1;
                let mut i = 0;
                while i < cw && start_x + i < grid.width() {
                    let x = start_x + i;
                    let open = grid.is_walkable_at(x, border_y - 1, z)
                        && grid.is_walkable_at(x, border_y, z);
                    if open && run_start < 0 {
                        run_start = i;
                    } else if !open && run_start >= 0 {
                        self.add_run(start_x + run_start, border_y, i - run_start, true, chunk1, chunk2, z);
                        run_start = -1;
                    }
                    i += 1;
                }
                if run_start >= 0 {
                    self.add_run(start_x + run_start, border_y, i - run_start, true, chunk1, chunk2, z);
                }
            }
        }
    }

    fn scan_vertical_borders(&mut self, grid: &WorldGrid, z: i32, only_cx_cy: Option<(i32, i32)>) {
        let (_cw, ch) = (grid.chunk_w(), grid.chunk_h());
        for cy in 0..grid.chunks_y() {
            for cx in 0..grid.chunks_x() - 1 {
                if let Some((ocx, ocy)) = only_cx_cy {
                    // `ocx` names the right chunk column of the border.
                    if cx + 1 != ocx || cy != ocy {
                        continue;
                    }
                }
                let border_x = (cx + 1) * grid.chunk_w();
                let start_y = cy * ch;
                let chunk1 = cy * grid.chunks_x() + cx;
                let chunk2 = cy * grid.chunks_x() + cx + 1;

                let mut run_start = -1;
                let mut i = 0;
                while i < ch && start_y + i < grid.height() {
                    let y = start_y + i;
                    let open = grid.is_walkable_at(border_x - 1, y, z)
                        && grid.is_walkable_at(border_x, y, z);
                    if open && run_start < 0 {
                        run_start = i;
                    } else if !open && run_start >= 0 {
                        self.add_run(border_x, start_y + run_start, i - run_start, false, chunk1, chunk2, z);
                        run_start = -1;
                    }
                    i += 1;
                }
                if run_start >= 0 {
                    self.add_run(border_x, start_y + run_start, i - run_start, false, chunk1, chunk2, z);
                }
            }
        }
    }

    /// Emit entrances for one maximal walkable run: the midpoint of each
    /// segment of at most [`MAX_ENTRANCE_WIDTH`] cells.
    fn add_run(
        &mut self,
        start_x: i32,
        start_y: i32,
        length: i32,
        horizontal: bool,
        chunk1: i32,
        chunk2: i32,
        z: i32,
    ) {
        let mut remaining = length;
        let mut pos = 0;
        while remaining > 0 {
            let seg_len = remaining.min(MAX_ENTRANCE_WIDTH);
            let mid = pos + seg_len / 2;
            let (ex, ey) = if horizontal {
                (start_x + mid, start_y)
            } else {
                (start_x, start_y + mid)
            };
            self.add_entrance(Point::new(ex, ey, z), chunk1, chunk2);
            pos += seg_len;
            remaining -= seg_len;
        }
    }

    /// Add entrance nodes on every ladder connection and ramp transition.
    /// With `only_chunks`, restricted to connections touching those
    /// `(chunk, z)` windows (used by the incremental update).
    fn add_vertical_nodes(&mut self, grid: &WorldGrid, only_chunks: Option<&HashSet<(i32, i32)>>) {
        for z in 0..grid.depth() - 1 {
            for y in 0..grid.height() {
                for x in 0..grid.width() {
                    let chunk = grid.chunk_id_of(x, y);
                    let kind = grid.kind_at(x, y, z);

                    // Ladder connection z -> z + 1.
                    if kind.can_climb_up() && grid.kind_at(x, y, z + 1).can_climb_down() {
                        let relevant = only_chunks.map_or(true, |set| {
                            set.contains(&(chunk, z)) || set.contains(&(chunk, z + 1))
                        });
                        if relevant {
                            self.ensure_entrance(grid, Point::new(x, y, z));
                            self.ensure_entrance(grid, Point::new(x, y, z + 1));
                        }
                    }

                    // Ramp transition from this cell's high side.
                    if let Some((dx, dy)) = kind.ramp_high_side_offset() {
                        let (hx, hy) = (x + dx, y + dy);
                        if grid.is_walkable_at(hx, hy, z + 1) {
                            let high_chunk = grid.chunk_id_of(hx, hy);
                            let relevant = only_chunks.map_or(true, |set| {
                                set.contains(&(chunk, z)) || set.contains(&(high_chunk, z + 1))
                            });
                            if relevant {
                                self.ensure_entrance(grid, Point::new(x, y, z));
                                self.ensure_entrance(grid, Point::new(hx, hy, z + 1));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Vertical edge pass, mirroring [`add_vertical_nodes`](Self::add_vertical_nodes).
    fn add_vertical_links(&mut self, grid: &WorldGrid, only_chunks: Option<&HashSet<(i32, i32)>>) {
        for z in 0..grid.depth() - 1 {
            for y in 0..grid.height() {
                for x in 0..grid.width() {
                    let chunk = grid.chunk_id_of(x, y);
                    let kind = grid.kind_at(x, y, z);

                    if kind.can_climb_up() && grid.kind_at(x, y, z + 1).can_climb_down() {
                        let relevant = only_chunks.map_or(true, |set| {
                            set.contains(&(chunk, z)) || set.contains(&(chunk, z + 1))
                        });
                        if relevant {
                            if let (Some(lo), Some(hi)) = (
                                self.entrance_at(Point::new(x, y, z)),
                                self.entrance_at(Point::new(x, y, z + 1)),
                            ) {
                                self.add_edge(
                                    lo,
                                    hi,
                                    LADDER_LINK_COST,
                                    EdgeKind::Ladder,
                                    (chunk, z),
                                    (chunk, z + 1),
                                );
                            }
                        }
                    }

                    if let Some((dx, dy)) = kind.ramp_high_side_offset() {
                        let (hx, hy) = (x + dx, y + dy);
                        if grid.is_walkable_at(hx, hy, z + 1) {
                            let high_chunk = grid.chunk_id_of(hx, hy);
                            let relevant = only_chunks.map_or(true, |set| {
                                set.contains(&(chunk, z)) || set.contains(&(high_chunk, z + 1))
                            });
                            if relevant {
                                if let (Some(lo), Some(hi)) = (
                                    self.entrance_at(Point::new(x, y, z)),
                                    self.entrance_at(Point::new(hx, hy, z + 1)),
                                ) {
                                    self.add_edge(
                                        lo,
                                        hi,
                                        RAMP_LINK_COST,
                                        EdgeKind::Ramp,
                                        (chunk, z),
                                        (high_chunk, z + 1),
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Full edge rebuild: per chunk, connect every pair of entrances that
    /// can reach each other inside the chunk window (one multi-target flood
    /// per entrance), then add ladder/ramp links.
    pub fn build_graph(&mut self, grid: &WorldGrid, scratch: &mut SearchScratch, use_8_dir: bool) {
        self.edges.clear();
        self.vertical_links = 0;
        for adj in &mut self.adjacency {
            adj.clear();
        }

        let chunk_map = self.chunk_entrance_map();
        for z in 0..grid.depth() {
            for cy in 0..grid.chunks_y() {
                for cx in 0..grid.chunks_x() {
                    let chunk = cy * grid.chunks_x() + cx;
                    self.build_chunk_edges(grid, scratch, use_8_dir, chunk, cx, cy, z, &chunk_map);
                }
            }
        }

        self.add_vertical_links(grid, None);
    }

    /// Map `(chunk, z)` to the entrances touching it.
    fn chunk_entrance_map(&self) -> HashMap<(i32, i32), Vec<u32>> {
        let mut map: HashMap<(i32, i32), Vec<u32>> = HashMap::new();
        for (i, e) in self.entrances.iter().enumerate() {
            map.entry((e.chunk1, e.pos.z)).or_default().push(i as u32);
            if e.chunk2 != e.chunk1 {
                map.entry((e.chunk2, e.pos.z)).or_default().push(i as u32);
            }
        }
        map
    }

    #[allow(clippy::too_many_arguments)]
    fn build_chunk_edges(
        &mut self,
        grid: &WorldGrid,
        scratch: &mut SearchScratch,
        use_8_dir: bool,
        chunk: i32,
        cx: i32,
        cy: i32,
        z: i32,
        chunk_map: &HashMap<(i32, i32), Vec<u32>>,
    ) {
        let Some(ents) = chunk_map.get(&(chunk, z)) else {
            return;
        };
        if ents.len() < 2 {
            return;
        }
        let window = ChunkWindow::chunk_with_border(grid, cx, cy);

        for i in 0..ents.len() - 1 {
            let from = ents[i];
            let targets: Vec<(i32, i32)> = ents[i + 1..]
                .iter()
                .map(|&j| {
                    let p = self.entrances[j as usize].pos;
                    (p.x, p.y)
                })
                .collect();
            let start = self.entrances[from as usize].pos;
            let costs = a_star_chunk_multi(grid, scratch, start, &targets, window, use_8_dir);
            for (k, cost) in costs.into_iter().enumerate() {
                if cost < COST_INF {
                    self.add_edge(from, ents[i + 1 + k], cost, EdgeKind::Walk, (chunk, z), (chunk, z));
                }
            }
        }
    }

    /// Incremental rebuild covering every dirty chunk and its cardinal
    /// neighbors. Equivalent to a full rebuild, up to entrance renumbering.
    ///
    /// Steps: compact surviving entrances (remembering the index map), drop
    /// edges owned by affected chunks or referencing removed entrances,
    /// re-scan borders and vertical connections around dirty chunks, then
    /// rebuild edges for all affected chunks in canonical chunk order.
    /// Finishes by clearing the grid's dirty bits and `hpa_needs_rebuild`.
    pub fn update_dirty_chunks(
        &mut self,
        grid: &mut WorldGrid,
        scratch: &mut SearchScratch,
        use_8_dir: bool,
    ) {
        let dirty_list = grid.dirty_chunks();
        if dirty_list.is_empty() {
            grid.clear_dirty();
            return;
        }

        let started = std::time::Instant::now();

        // `dirty`: chunks whose cells changed. `dirty_v` widens that to the
        // adjacent z-levels of the chunk and of its cardinal neighbors,
        // because ladder partners sit one level up or down in the same
        // column and ramp partners one level up in an adjacent column:
        // vertical nodes there can appear or vanish without any cell at
        // their own level changing. `affected` is the edge-rebuild set:
        // everything in `dirty_v` plus the cardinal neighbors at the edited
        // level (edges cross borders).
        let mut dirty: HashSet<(i32, i32)> = HashSet::new();
        let mut dirty_v: HashSet<(i32, i32)> = HashSet::new();
        let mut affected: HashSet<(i32, i32)> = HashSet::new();
        for &(cx, cy, z) in &dirty_list {
            let chunk = cy * grid.chunks_x() + cx;
            dirty.insert((chunk, z));
            for dz in [-1, 0, 1] {
                let nz = z + dz;
                if nz < 0 || nz >= grid.depth() {
                    continue;
                }
                dirty_v.insert((chunk, nz));
                affected.insert((chunk, nz));
                if dz != 0 {
                    for (dx, dy) in [(0, -1), (1, 0), (0, 1), (-1, 0)] {
                        let (nx, ny) = (cx + dx, cy + dy);
                        if nx >= 0 && nx < grid.chunks_x() && ny >= 0 && ny < grid.chunks_y() {
                            let n = ny * grid.chunks_x() + nx;
                            dirty_v.insert((n, nz));
                            affected.insert((n, nz));
                        }
                    }
                }
            }
            for (dx, dy) in [(0, -1), (1, 0), (0, 1), (-1, 0)] {
                let (nx, ny) = (cx + dx, cy + dy);
                if nx >= 0 && nx < grid.chunks_x() && ny >= 0 && ny < grid.chunks_y() {
                    affected.insert((ny * grid.chunks_x() + nx, z));
                }
            }
        }

        // 1. Compact entrances: border entrances survive when neither
        // owning chunk is dirty; ladder/ramp nodes additionally vanish when
        // an adjacent level of their chunk is dirty, since their partner
        // cell may have died there.
        let mut remap: Vec<Option<u32>> = vec![None; self.entrances.len()];
        let mut kept = Vec::with_capacity(self.entrances.len());
        for (i, e) in self.entrances.iter().enumerate() {
            let z = e.pos.z;
            let is_vertical_node = e.chunk1 == e.chunk2;
            let removed = if is_vertical_node {
                dirty_v.contains(&(e.chunk1, z))
            } else {
                dirty.contains(&(e.chunk1, z)) || dirty.contains(&(e.chunk2, z))
            };
            if !removed {
                remap[i] = Some(kept.len() as u32);
                kept.push(*e);
            }
        }
        self.entrances = kept;

        // 2. Drop and remap edges.
        let mut survivors: Vec<GraphEdge> = Vec::with_capacity(self.edges.len());
        for (_, e) in self.edges.iter() {
            if affected.contains(&e.owner_a) || affected.contains(&e.owner_b) {
                continue;
            }
            if let (Some(a), Some(b)) = (remap[e.a as usize], remap[e.b as usize]) {
                let mut edge = *e;
                edge.a = a;
                edge.b = b;
                survivors.push(edge);
            }
        }
        self.edges.clear();
        self.vertical_links = 0;
        self.adjacency = vec![Vec::new(); self.entrances.len()];
        for edge in survivors {
            let (a, b) = (edge.a, edge.b);
            if edge.kind != EdgeKind::Walk {
                self.vertical_links += 1;
            }
            let key = self.edges.insert(edge);
            self.adjacency[a as usize].push(key);
            self.adjacency[b as usize].push(key);
        }

        // 3. Re-scan borders that touch a dirty chunk. An entrance on such a
        // border always had a dirty owner, so nothing here duplicates a
        // kept entrance.
        let mut h_borders: HashSet<(i32, i32, i32)> = HashSet::new();
        let mut v_borders: HashSet<(i32, i32, i32)> = HashSet::new();
        for &(cx, cy, z) in &dirty_list {
            if cy > 0 {
                h_borders.insert((cx, cy, z));
            }
            if cy + 1 < grid.chunks_y() {
                h_borders.insert((cx, cy + 1, z));
            }
            if cx > 0 {
                v_borders.insert((cx, cy, z));
            }
            if cx + 1 < grid.chunks_x() {
                v_borders.insert((cx + 1, cy, z));
            }
        }
        for &(cx, cy, z) in &h_borders {
            self.scan_horizontal_borders(grid, z, Some((cx, cy)));
        }
        for &(cx, cy, z) in &v_borders {
            self.scan_vertical_borders(grid, z, Some((cx, cy)));
        }

        // 4. Re-add ladder/ramp nodes around everything affected (kept
        // partners on other levels are found again by position).
        self.add_vertical_nodes(grid, Some(&affected));

        // 5. Rebuild edges for affected chunks in canonical order so costs
        // land exactly as a full rebuild would produce them.
        let chunk_map = self.chunk_entrance_map();
        let mut order: Vec<(i32, i32)> = affected.iter().copied().collect();
        order.sort_by_key(|&(chunk, z)| (z, chunk));
        for (chunk, z) in order {
            let cx = chunk % grid.chunks_x();
            let cy = chunk / grid.chunks_x();
            self.build_chunk_edges(grid, scratch, use_8_dir, chunk, cx, cy, z, &chunk_map);
        }
        self.add_vertical_links(grid, Some(&affected));

        grid.clear_dirty();
        log::debug!(
            "incremental graph update: {} dirty chunks, {} entrances, {} edges, {:.2}ms",
            dirty_list.len(),
            self.entrances.len(),
            self.edges.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
    }
}
