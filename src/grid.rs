//! The world grid: a runtime-sized `width × height × depth` array of
//! [`CellKind`]s with parallel material/flag grids, partitioned into chunks
//! whose per-z dirty bits drive the incremental abstract-graph rebuild.
//!
//! Mutating a cell through any setter here marks the enclosing chunk dirty
//! and raises the global rebuild flags; readers never see a half-updated
//! abstract graph because the graph is only rebuilt between queries.

use crate::cell::CellKind;
use crate::{Cost, Point};

/// Hard upper bound on grid width, clamped at init.
pub const MAX_GRID_WIDTH: i32 = 512;
/// Hard upper bound on grid height, clamped at init.
pub const MAX_GRID_HEIGHT: i32 = 512;
/// Hard upper bound on z-levels.
pub const MAX_GRID_DEPTH: i32 = 16;
/// Chunk edge length used when none is given.
pub const DEFAULT_CHUNK_SIZE: i32 = 16;

/// Per-cell flag: the cell is covered by a workshop footprint and blocks
/// movement even though its kind is walkable.
pub const CELL_FLAG_WORKSHOP_BLOCK: u8 = 1 << 0;
/// Per-cell flag: the cell is reserved by a stockpile.
pub const CELL_FLAG_STOCKPILE: u8 = 1 << 1;

/// Errors from the ASCII map parser.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AsciiMapError {
    /// The string contained no cells.
    #[error("ascii map is empty")]
    EmptyMap,
    /// A `floor:N` marker exceeded the supported depth.
    #[error("floor {found} out of range (max {max})")]
    FloorOutOfRange {
        /// The floor number that was requested.
        found: i32,
        /// Highest supported floor index.
        max: i32,
    },
}

/// The shared tile substrate all other systems observe.
///
/// Cells are stored in a flat `Vec` indexed `z → y → x`. Out-of-bounds reads
/// answer as [`CellKind::Bedrock`] (solid, impassable), out-of-bounds writes
/// are no-ops; callers never need their own bounds checks.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldGrid {
    width: i32,
    height: i32,
    depth: i32,
    chunk_w: i32,
    chunk_h: i32,
    chunks_x: i32,
    chunks_y: i32,

    cells: Vec<CellKind>,
    wall_material: Vec<u8>,
    floor_material: Vec<u8>,
    cell_flags: Vec<u8>,

    /// One dirty bit per chunk per z-level, indexed `z → cy → cx`.
    chunk_dirty: Vec<bool>,
    /// Raised by every cell edit; cleared by the incremental graph update.
    pub hpa_needs_rebuild: bool,
    /// Raised by every cell edit; cleared when JPS+ tables are recomputed.
    pub jps_needs_rebuild: bool,
}

impl WorldGrid {
    /// Create a grid filled with default walkable ground, using
    /// [`DEFAULT_CHUNK_SIZE`] chunks.
    pub fn new(width: i32, height: i32) -> WorldGrid {
        WorldGrid::with_chunk_size(width, height, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_SIZE)
    }

    /// Create a grid filled with default walkable ground and an explicit
    /// chunk size. Dimensions are clamped to the compile-time maxima; a
    /// chunk size of zero or less means one chunk spanning the whole grid.
    pub fn with_chunk_size(width: i32, height: i32, chunk_w: i32, chunk_h: i32) -> WorldGrid {
        let width = width.clamp(1, MAX_GRID_WIDTH);
        let height = height.clamp(1, MAX_GRID_HEIGHT);
        let depth = MAX_GRID_DEPTH;

        let chunk_w = if chunk_w < 1 { width } else { chunk_w.min(width) };
        let chunk_h = if chunk_h < 1 { height } else { chunk_h.min(height) };

        let chunks_x = (width + chunk_w - 1) / chunk_w;
        let chunks_y = (height + chunk_h - 1) / chunk_h;

        let cell_count = (width * height * depth) as usize;
        WorldGrid {
            width,
            height,
            depth,
            chunk_w,
            chunk_h,
            chunks_x,
            chunks_y,
            cells: vec![CellKind::Ground; cell_count],
            wall_material: vec![0; cell_count],
            floor_material: vec![0; cell_count],
            cell_flags: vec![0; cell_count],
            // Everything starts dirty so the first lazy graph update is a
            // full build.
            chunk_dirty: vec![true; (chunks_x * chunks_y * depth) as usize],
            hpa_needs_rebuild: true,
            jps_needs_rebuild: true,
        }
    }

    /// Parse an ASCII map. `#` wall, `L`/`X` ladder, `<` ladder-up, `>`
    /// ladder-down, `B` bedrock, `_` air, anything else walkable ground.
    /// Multiple z-levels are introduced by `floor:N` lines; without them the
    /// map describes z = 0.
    ///
    /// ```
    /// use navgrid::WorldGrid;
    ///
    /// let grid = WorldGrid::from_ascii("....\n.##.\n....", 0, 0).unwrap();
    /// assert!(grid.is_walkable_at(0, 0, 0));
    /// assert!(!grid.is_walkable_at(1, 1, 0));
    /// ```
    pub fn from_ascii(ascii: &str, chunk_w: i32, chunk_h: i32) -> Result<WorldGrid, AsciiMapError> {
        let mut width = 0i32;
        let mut height = 0i32;
        let mut max_floor = 0i32;
        let mut saw_floor_marker = false;

        // First pass: dimensions and floor count.
        let mut current_height = 0i32;
        for line in ascii.lines() {
            if let Some(rest) = line.strip_prefix("floor:") {
                let floor: i32 = rest.trim().parse().unwrap_or(0);
                if floor >= MAX_GRID_DEPTH {
                    return Err(AsciiMapError::FloorOutOfRange {
                        found: floor,
                        max: MAX_GRID_DEPTH - 1,
                    });
                }
                saw_floor_marker = true;
                max_floor = max_floor.max(floor);
                height = height.max(current_height);
                current_height = 0;
                continue;
            }
            if !line.is_empty() {
                width = width.max(line.chars().count() as i32);
                current_height += 1;
            }
        }
        height = height.max(current_height);

        if width == 0 || height == 0 {
            return Err(AsciiMapError::EmptyMap);
        }

        let mut grid = WorldGrid::with_chunk_size(width, height, chunk_w, chunk_h);
        if saw_floor_marker {
            grid.depth = max_floor + 1;
            grid.chunk_dirty
                .truncate((grid.chunks_x * grid.chunks_y * grid.depth) as usize);
        }

        // Second pass: fill. Cells are written directly (the grid is fresh,
        // everything is dirty anyway).
        let mut z = 0i32;
        let mut y = 0i32;
        for line in ascii.lines() {
            if let Some(rest) = line.strip_prefix("floor:") {
                z = rest.trim().parse().unwrap_or(0);
                y = 0;
                continue;
            }
            if line.is_empty() {
                continue;
            }
            for (x, c) in line.chars().enumerate() {
                let x = x as i32;
                if x < grid.width && y < grid.height && z < grid.depth {
                    let idx = grid.index(x, y, z);
                    grid.cells[idx] = CellKind::from_ascii(c);
                }
            }
            y += 1;
        }

        Ok(grid)
    }

    /// Serialize back to the ASCII format. Emits `floor:N` sections for each
    /// level up to the highest one holding anything other than default
    /// ground; a grid whose content lives entirely on z = 0 serializes as a
    /// bare single-level map.
    pub fn to_ascii(&self) -> String {
        let top = (0..self.depth)
            .rev()
            .find(|&z| {
                (0..self.height).any(|y| {
                    (0..self.width).any(|x| self.kind_at(x, y, z) != CellKind::Ground)
                })
            })
            .unwrap_or(0);

        let mut out = String::new();
        for z in 0..=top {
            if top > 0 {
                out.push_str(&format!("floor:{}\n", z));
            }
            for y in 0..self.height {
                for x in 0..self.width {
                    out.push(self.kind_at(x, y, z).to_ascii());
                }
                out.push('\n');
            }
        }
        // Drop the trailing newline so parse(serialize(parse(s))) is stable.
        out.pop();
        out
    }

    /// Grid width in cells.
    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }
    /// Grid height in cells.
    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }
    /// Number of z-levels.
    #[inline]
    pub fn depth(&self) -> i32 {
        self.depth
    }
    /// Chunk width in cells.
    #[inline]
    pub fn chunk_w(&self) -> i32 {
        self.chunk_w
    }
    /// Chunk height in cells.
    #[inline]
    pub fn chunk_h(&self) -> i32 {
        self.chunk_h
    }
    /// Number of chunk columns.
    #[inline]
    pub fn chunks_x(&self) -> i32 {
        self.chunks_x
    }
    /// Number of chunk rows.
    #[inline]
    pub fn chunks_y(&self) -> i32 {
        self.chunks_y
    }

    #[inline]
    pub(crate) fn in_bounds(&self, x: i32, y: i32, z: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height && z >= 0 && z < self.depth
    }

    #[inline]
    fn index(&self, x: i32, y: i32, z: i32) -> usize {
        ((z * self.height + y) * self.width + x) as usize
    }

    /// The kind at `(x, y, z)`; [`CellKind::Bedrock`] outside the grid.
    #[inline]
    pub fn kind_at(&self, x: i32, y: i32, z: i32) -> CellKind {
        if self.in_bounds(x, y, z) {
            self.cells[self.index(x, y, z)]
        } else {
            CellKind::Bedrock
        }
    }

    /// Is the cell standable? False outside the grid.
    #[inline]
    pub fn is_walkable_at(&self, x: i32, y: i32, z: i32) -> bool {
        self.kind_at(x, y, z).is_walkable_on()
    }

    /// Does the cell block movement, counting workshop footprints on top of
    /// the kind itself?
    #[inline]
    pub fn is_blocked_at(&self, x: i32, y: i32, z: i32) -> bool {
        self.kind_at(x, y, z).blocks_movement()
            || self.cell_flags_at(x, y, z) & CELL_FLAG_WORKSHOP_BLOCK != 0
    }

    /// Movement cost of stepping onto the cell; [`crate::COST_INF`] when
    /// impassable or out of bounds.
    #[inline]
    pub fn move_cost_at(&self, x: i32, y: i32, z: i32) -> Cost {
        self.kind_at(x, y, z).move_cost()
    }

    /// Write a cell kind. No-op outside the grid; marks the chunk dirty.
    pub fn set_kind(&mut self, x: i32, y: i32, z: i32, kind: CellKind) {
        if !self.in_bounds(x, y, z) {
            return;
        }
        let idx = self.index(x, y, z);
        if self.cells[idx] != kind {
            self.cells[idx] = kind;
            self.mark_chunk_dirty(x, y, z);
        }
    }

    /// Chunk coordinates of a cell.
    #[inline]
    pub fn chunk_of(&self, x: i32, y: i32) -> (i32, i32) {
        (x / self.chunk_w, y / self.chunk_h)
    }

    /// Flat chunk id (`cy * chunks_x + cx`) of a cell.
    #[inline]
    pub fn chunk_id_of(&self, x: i32, y: i32) -> i32 {
        let (cx, cy) = self.chunk_of(x, y);
        cy * self.chunks_x + cx
    }

    #[inline]
    fn chunk_index(&self, cx: i32, cy: i32, z: i32) -> usize {
        ((z * self.chunks_y + cy) * self.chunks_x + cx) as usize
    }

    /// Mark the chunk containing `(x, y, z)` dirty and raise both rebuild
    /// flags. Every setter calls this; hosts editing through the setters
    /// never need to.
    pub fn mark_chunk_dirty(&mut self, x: i32, y: i32, z: i32) {
        if !self.in_bounds(x, y, z) {
            return;
        }
        let (cx, cy) = self.chunk_of(x, y);
        let idx = self.chunk_index(cx, cy, z);
        self.chunk_dirty[idx] = true;
        self.hpa_needs_rebuild = true;
        self.jps_needs_rebuild = true;
    }

    /// Is the chunk `(cx, cy)` at `z` dirty?
    #[inline]
    pub fn is_chunk_dirty(&self, cx: i32, cy: i32, z: i32) -> bool {
        if cx < 0 || cx >= self.chunks_x || cy < 0 || cy >= self.chunks_y || z < 0 || z >= self.depth
        {
            return false;
        }
        self.chunk_dirty[self.chunk_index(cx, cy, z)]
    }

    /// Clear every chunk dirty bit and lower `hpa_needs_rebuild`. Called by
    /// the graph when a rebuild finishes.
    pub(crate) fn clear_dirty(&mut self) {
        self.chunk_dirty.iter_mut().for_each(|d| *d = false);
        self.hpa_needs_rebuild = false;
    }

    /// All `(cx, cy, z)` triples currently dirty.
    pub(crate) fn dirty_chunks(&self) -> Vec<(i32, i32, i32)> {
        let mut out = Vec::new();
        for z in 0..self.depth {
            for cy in 0..self.chunks_y {
                for cx in 0..self.chunks_x {
                    if self.chunk_dirty[self.chunk_index(cx, cy, z)] {
                        out.push((cx, cy, z));
                    }
                }
            }
        }
        out
    }

    // --- parallel grids ---------------------------------------------------

    /// Wall material id at a cell (0 outside the grid).
    #[inline]
    pub fn wall_material_at(&self, x: i32, y: i32, z: i32) -> u8 {
        if self.in_bounds(x, y, z) {
            self.wall_material[self.index(x, y, z)]
        } else {
            0
        }
    }

    /// Set the wall material id. Materials do not affect pathing, so this
    /// does not dirty the chunk.
    pub fn set_wall_material(&mut self, x: i32, y: i32, z: i32, material: u8) {
        if self.in_bounds(x, y, z) {
            let idx = self.index(x, y, z);
            self.wall_material[idx] = material;
        }
    }

    /// Floor material id at a cell (0 outside the grid).
    #[inline]
    pub fn floor_material_at(&self, x: i32, y: i32, z: i32) -> u8 {
        if self.in_bounds(x, y, z) {
            self.floor_material[self.index(x, y, z)]
        } else {
            0
        }
    }

    /// Set the floor material id. Does not dirty the chunk.
    pub fn set_floor_material(&mut self, x: i32, y: i32, z: i32, material: u8) {
        if self.in_bounds(x, y, z) {
            let idx = self.index(x, y, z);
            self.floor_material[idx] = material;
        }
    }

    /// Raw flag byte at a cell.
    #[inline]
    pub fn cell_flags_at(&self, x: i32, y: i32, z: i32) -> u8 {
        if self.in_bounds(x, y, z) {
            self.cell_flags[self.index(x, y, z)]
        } else {
            0
        }
    }

    /// Set flag bits. Flags can change blocking (workshops), so the chunk
    /// is dirtied when the byte actually changes.
    pub fn set_cell_flags(&mut self, x: i32, y: i32, z: i32, flags: u8) {
        if !self.in_bounds(x, y, z) {
            return;
        }
        let idx = self.index(x, y, z);
        let new = self.cell_flags[idx] | flags;
        if new != self.cell_flags[idx] {
            self.cell_flags[idx] = new;
            self.mark_chunk_dirty(x, y, z);
        }
    }

    /// Clear flag bits; dirties the chunk when the byte changes.
    pub fn clear_cell_flags(&mut self, x: i32, y: i32, z: i32, flags: u8) {
        if !self.in_bounds(x, y, z) {
            return;
        }
        let idx = self.index(x, y, z);
        let new = self.cell_flags[idx] & !flags;
        if new != self.cell_flags[idx] {
            self.cell_flags[idx] = new;
            self.mark_chunk_dirty(x, y, z);
        }
    }

    // --- ladder shaping ---------------------------------------------------

    /// Place a ladder at `(x, y, z)` and re-derive the shaft roles of the
    /// whole column so the bottom climbs up, the top climbs down, and the
    /// interior does both.
    pub fn place_ladder(&mut self, x: i32, y: i32, z: i32) {
        if !self.in_bounds(x, y, z) {
            return;
        }
        self.set_kind(x, y, z, CellKind::LadderBoth);
        self.recalculate_ladder_column(x, y);
    }

    /// Remove the ladder at `(x, y, z)` (back to ground) and re-derive the
    /// roles of whatever shaft fragments remain above and below.
    pub fn erase_ladder(&mut self, x: i32, y: i32, z: i32) {
        if !self.in_bounds(x, y, z) || !self.kind_at(x, y, z).is_ladder() {
            return;
        }
        self.set_kind(x, y, z, CellKind::Ground);
        self.recalculate_ladder_column(x, y);
    }

    /// Walk the column at `(x, y)` and assign ladder roles per contiguous
    /// run: bottom `LadderUp`, top `LadderDown`, interior `LadderBoth`. A
    /// run of one cell stays `LadderBoth` (it connects nothing either way).
    pub fn recalculate_ladder_column(&mut self, x: i32, y: i32) {
        let mut z = 0;
        while z < self.depth {
            if !self.kind_at(x, y, z).is_ladder() {
                z += 1;
                continue;
            }
            let bottom = z;
            while z < self.depth && self.kind_at(x, y, z).is_ladder() {
                z += 1;
            }
            let top = z - 1;
            for zz in bottom..=top {
                let role = if bottom == top {
                    CellKind::LadderBoth
                } else if zz == bottom {
                    CellKind::LadderUp
                } else if zz == top {
                    CellKind::LadderDown
                } else {
                    CellKind::LadderBoth
                };
                self.set_kind(x, y, zz, role);
            }
        }
    }

    // --- ramps ------------------------------------------------------------

    /// Place a directional ramp. `kind` must be one of the ramp kinds;
    /// anything else is ignored.
    pub fn place_ramp(&mut self, x: i32, y: i32, z: i32, kind: CellKind) {
        if kind.is_ramp() {
            self.set_kind(x, y, z, kind);
        }
    }

    /// Find a directional ramp at level `z` whose high side exits onto
    /// `(x, y)` at `z + 1`. When several ramps point at the same exit the
    /// smallest `(dy, dx)` offset wins, which keeps the choice deterministic.
    pub fn find_ramp_pointing_to(&self, x: i32, y: i32, z: i32) -> Option<(i32, i32)> {
        const OFFSETS: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
        for (dx, dy) in OFFSETS {
            let (rx, ry) = (x - dx, y - dy);
            if self.kind_at(rx, ry, z).ramp_high_side_offset() == Some((dx, dy)) {
                return Some((rx, ry));
            }
        }
        None
    }

    /// Does any directional ramp at level `z` exit onto `(x, y)` at `z + 1`?
    #[inline]
    pub fn has_ramp_pointing_to(&self, x: i32, y: i32, z: i32) -> bool {
        self.find_ramp_pointing_to(x, y, z).is_some()
    }

    /// Is `(from, to)` a legal single-step ladder climb (`|dz| == 1`, same
    /// column, both cells carrying the matching shaft roles)?
    pub fn is_ladder_pair(&self, from: Point, to: Point) -> bool {
        if from.x != to.x || from.y != to.y {
            return false;
        }
        let a = self.kind_at(from.x, from.y, from.z);
        let b = self.kind_at(to.x, to.y, to.z);
        if to.z == from.z + 1 {
            a.can_climb_up() && b.can_climb_down()
        } else if to.z == from.z - 1 {
            a.can_climb_down() && b.can_climb_up()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_all_walkable_and_dirty() {
        let grid = WorldGrid::new(64, 64);
        assert_eq!(grid.chunks_x(), 4);
        assert_eq!(grid.chunks_y(), 4);
        assert!(grid.hpa_needs_rebuild);
        for y in 0..64 {
            for x in 0..64 {
                assert!(grid.is_walkable_at(x, y, 0));
            }
        }
    }

    #[test]
    fn set_kind_marks_chunk_dirty() {
        let mut grid = WorldGrid::new(64, 64);
        grid.clear_dirty();
        grid.set_kind(10, 10, 0, CellKind::Wall);
        assert!(grid.is_chunk_dirty(0, 0, 0));
        assert!(grid.hpa_needs_rebuild);
        assert!(!grid.is_chunk_dirty(1, 1, 0));
    }

    #[test]
    fn out_of_bounds_reads_are_bedrock() {
        let grid = WorldGrid::new(8, 8);
        assert_eq!(grid.kind_at(-1, 0, 0), CellKind::Bedrock);
        assert!(!grid.is_walkable_at(8, 0, 0));
        assert_eq!(grid.move_cost_at(0, 0, 99), crate::COST_INF);
    }

    #[test]
    fn ascii_round_trip_single_floor() {
        let map = "....\n.##.\n.L..\n....";
        let grid = WorldGrid::from_ascii(map, 0, 0).unwrap();
        assert_eq!(grid.to_ascii(), map);
    }

    #[test]
    fn ascii_multi_floor() {
        let map = "floor:0\n..#\n...\nfloor:1\n#..\n..L";
        let grid = WorldGrid::from_ascii(map, 0, 0).unwrap();
        assert_eq!(grid.depth(), 2);
        assert_eq!(grid.kind_at(2, 0, 0), CellKind::Wall);
        assert_eq!(grid.kind_at(0, 0, 1), CellKind::Wall);
        assert_eq!(grid.kind_at(2, 1, 1), CellKind::LadderBoth);
    }

    #[test]
    fn ascii_rejects_empty() {
        assert_eq!(WorldGrid::from_ascii("", 0, 0), Err(AsciiMapError::EmptyMap));
    }

    #[test]
    fn ladder_shaft_roles() {
        let mut grid = WorldGrid::new(8, 8);
        grid.place_ladder(3, 3, 0);
        grid.place_ladder(3, 3, 1);
        grid.place_ladder(3, 3, 2);
        assert_eq!(grid.kind_at(3, 3, 0), CellKind::LadderUp);
        assert_eq!(grid.kind_at(3, 3, 1), CellKind::LadderBoth);
        assert_eq!(grid.kind_at(3, 3, 2), CellKind::LadderDown);

        // Erasing the middle splits the shaft into two one-cell runs.
        grid.erase_ladder(3, 3, 1);
        assert_eq!(grid.kind_at(3, 3, 0), CellKind::LadderBoth);
        assert_eq!(grid.kind_at(3, 3, 1), CellKind::Ground);
        assert_eq!(grid.kind_at(3, 3, 2), CellKind::LadderBoth);
    }

    #[test]
    fn place_then_erase_restores_column() {
        let mut grid = WorldGrid::new(8, 8);
        grid.place_ladder(2, 2, 0);
        grid.place_ladder(2, 2, 1);
        let before: Vec<_> = (0..grid.depth()).map(|z| grid.kind_at(2, 2, z)).collect();
        grid.place_ladder(2, 2, 2);
        grid.erase_ladder(2, 2, 2);
        let after: Vec<_> = (0..grid.depth()).map(|z| grid.kind_at(2, 2, z)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn ramp_lookup_prefers_smallest_offset() {
        let mut grid = WorldGrid::new(8, 8);
        // Two ramps pointing at (3, 3): one from the north side, one from the west.
        grid.place_ramp(3, 2, 0, CellKind::RampSouth); // offset (0, 1)
        grid.place_ramp(2, 3, 0, CellKind::RampEast); // offset (1, 0)
        assert_eq!(grid.find_ramp_pointing_to(3, 3, 0), Some((2, 3)));
    }
}
