//! Uniform spatial grid over mover positions, rebuilt from scratch every
//! tick with the classic count / prefix-sum / scatter passes over flat
//! arrays. Avoidance and host-side neighbor queries both go through it.

use super::{Mover, AVOID_MAX_NEIGHBORS, AVOID_MAX_SCAN, MOVER_GRID_CELL_SIZE};

/// Work bounds for one neighbor query.
#[derive(Clone, Copy, Debug)]
pub struct QueryCaps {
    /// Movers examined before the query gives up.
    pub scan: usize,
    /// Movers reported before the query stops.
    pub neighbors: usize,
}

impl QueryCaps {
    /// No limits; equivalence tests against the naive scan use this.
    pub const UNBOUNDED: QueryCaps = QueryCaps {
        scan: usize::MAX,
        neighbors: usize::MAX,
    };
}

impl Default for QueryCaps {
    fn default() -> QueryCaps {
        QueryCaps {
            scan: AVOID_MAX_SCAN,
            neighbors: AVOID_MAX_NEIGHBORS,
        }
    }
}

/// The per-tick spatial index: per-cell counts, a prefix sum, and a flat
/// bucket array of mover indices.
#[derive(Clone, Debug, Default)]
pub struct MoverSpatialGrid {
    cell_counts: Vec<u32>,
    cell_starts: Vec<u32>,
    mover_indices: Vec<u32>,
    grid_w: i32,
    grid_h: i32,
    inv_cell_size: f32,
    /// Milliseconds the last rebuild took.
    pub build_time_ms: f64,
}

impl MoverSpatialGrid {
    /// Index sized for a world of the given pixel dimensions.
    pub fn new(world_pixel_width: f32, world_pixel_height: f32) -> MoverSpatialGrid {
        let inv = 1.0 / MOVER_GRID_CELL_SIZE;
        let grid_w = (world_pixel_width * inv).ceil().max(1.0) as i32;
        let grid_h = (world_pixel_height * inv).ceil().max(1.0) as i32;
        let cells = (grid_w * grid_h) as usize;
        MoverSpatialGrid {
            cell_counts: vec![0; cells],
            cell_starts: vec![0; cells + 1],
            mover_indices: Vec::new(),
            grid_w,
            grid_h,
            inv_cell_size: inv,
            build_time_ms: 0.0,
        }
    }

    #[inline]
    fn cell_of(&self, x: f32, y: f32) -> (i32, i32) {
        let cx = ((x * self.inv_cell_size) as i32).clamp(0, self.grid_w - 1);
        let cy = ((y * self.inv_cell_size) as i32).clamp(0, self.grid_h - 1);
        (cx, cy)
    }

    /// Rebuild from the mover array: count actives per cell, prefix-sum,
    /// then scatter indices into the buckets.
    pub fn build(&mut self, movers: &[Mover]) {
        let started = std::time::Instant::now();

        self.cell_counts.iter_mut().for_each(|c| *c = 0);
        for m in movers.iter().filter(|m| m.active) {
            let (cx, cy) = self.cell_of(m.x, m.y);
            self.cell_counts[(cy * self.grid_w + cx) as usize] += 1;
        }

        self.cell_starts[0] = 0;
        for c in 0..self.cell_counts.len() {
            self.cell_starts[c + 1] = self.cell_starts[c] + self.cell_counts[c];
        }

        // Reuse the counts as write cursors during the scatter.
        let cells = self.cell_counts.len();
        self.cell_counts.copy_from_slice(&self.cell_starts[..cells]);
        self.mover_indices.resize(movers.len(), 0);
        for (i, m) in movers.iter().enumerate() {
            if !m.active {
                continue;
            }
            let (cx, cy) = self.cell_of(m.x, m.y);
            let cell = (cy * self.grid_w + cx) as usize;
            self.mover_indices[self.cell_counts[cell] as usize] = i as u32;
            self.cell_counts[cell] += 1;
        }

        self.build_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    }

    /// Visit every mover within `radius` pixels of `(x, y)`, excluding
    /// `exclude`, as `(mover index, squared distance)`. Returns the number
    /// reported. Work is bounded by `caps`.
    pub fn query_neighbors(
        &self,
        movers: &[Mover],
        x: f32,
        y: f32,
        radius: f32,
        exclude: Option<usize>,
        caps: QueryCaps,
        mut visit: impl FnMut(usize, f32),
    ) -> usize {
        let radius_sq = radius * radius;
        let rad_cells = (radius * self.inv_cell_size).ceil() as i32;
        let (cx, cy) = self.cell_of(x, y);

        let min_cx = (cx - rad_cells).max(0);
        let max_cx = (cx + rad_cells).min(self.grid_w - 1);
        let min_cy = (cy - rad_cells).max(0);
        let max_cy = (cy + rad_cells).min(self.grid_h - 1);

        let mut found = 0;
        let mut scanned = 0;
        for gy in min_cy..=max_cy {
            for gx in min_cx..=max_cx {
                let cell = (gy * self.grid_w + gx) as usize;
                let start = self.cell_starts[cell] as usize;
                let end = self.cell_starts[cell + 1] as usize;
                for &idx in &self.mover_indices[start..end] {
                    let idx = idx as usize;
                    if Some(idx) == exclude {
                        continue;
                    }
                    scanned += 1;
                    if scanned > caps.scan {
                        return found;
                    }
                    let dx = movers[idx].x - x;
                    let dy = movers[idx].y - y;
                    let dist_sq = dx * dx + dy * dy;
                    if dist_sq < radius_sq {
                        visit(idx, dist_sq);
                        found += 1;
                        if found >= caps.neighbors {
                            return found;
                        }
                    }
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    fn mover_at(x: f32, y: f32) -> Mover {
        Mover::new(x, y, 0, Point::new(0, 0, 0), 100.0)
    }

    #[test]
    fn every_active_mover_lands_in_exactly_one_bucket() {
        let mut movers: Vec<Mover> = (0..50)
            .map(|i| mover_at(10.0 * i as f32, 5.0 * i as f32))
            .collect();
        movers[7].active = false;
        let mut grid = MoverSpatialGrid::new(512.0, 512.0);
        grid.build(&movers);

        let mut seen = vec![0usize; movers.len()];
        for cell in 0..grid.cell_starts.len() - 1 {
            let (s, e) = (grid.cell_starts[cell] as usize, grid.cell_starts[cell + 1] as usize);
            for &idx in &grid.mover_indices[s..e] {
                seen[idx as usize] += 1;
            }
        }
        for (i, &count) in seen.iter().enumerate() {
            assert_eq!(count, usize::from(movers[i].active), "mover {}", i);
        }
    }

    #[test]
    fn query_matches_naive_scan() {
        let movers: Vec<Mover> = (0..100)
            .map(|i| mover_at((i % 13) as f32 * 37.0, (i % 7) as f32 * 53.0))
            .collect();
        let mut grid = MoverSpatialGrid::new(1024.0, 1024.0);
        grid.build(&movers);

        let (qx, qy, r) = (200.0, 150.0, 90.0);
        let mut reported = Vec::new();
        grid.query_neighbors(&movers, qx, qy, r, Some(3), QueryCaps::UNBOUNDED, |i, _| {
            reported.push(i)
        });
        reported.sort_unstable();

        let mut naive: Vec<usize> = movers
            .iter()
            .enumerate()
            .filter(|(i, m)| {
                *i != 3 && {
                    let (dx, dy) = (m.x - qx, m.y - qy);
                    dx * dx + dy * dy < r * r
                }
            })
            .map(|(i, _)| i)
            .collect();
        naive.sort_unstable();
        assert_eq!(reported, naive);
    }

    #[test]
    fn neighbor_cap_stops_early() {
        let movers: Vec<Mover> = (0..40).map(|_| mover_at(100.0, 100.0)).collect();
        let mut grid = MoverSpatialGrid::new(512.0, 512.0);
        grid.build(&movers);
        let caps = QueryCaps {
            scan: usize::MAX,
            neighbors: 5,
        };
        let n = grid.query_neighbors(&movers, 100.0, 100.0, 50.0, None, caps, |_, _| {});
        assert_eq!(n, 5);
    }
}
