//! The repath scheduler: at most [`MAX_REPATHS_PER_FRAME`] path queries per
//! tick, served in mover order, with per-mover cooldowns so a blocked
//! colony does not stampede the pathfinder.

use rand::Rng;

use super::{Mover, MAX_MOVER_PATH, MAX_REPATHS_PER_FRAME, REPATH_COOLDOWN_FRAMES, TICK_RATE};
use crate::path::{string_pull_path, truncate_keep_start};
use crate::world::World;

impl World {
    /// Serve queued repath requests within this tick's budget. Movers whose
    /// cooldown is still running get it counted down instead of a query.
    pub(crate) fn process_mover_repaths(&mut self) {
        let mut movers = std::mem::take(&mut self.movers);
        let mut repaths = 0usize;

        for i in 0..movers.len() {
            if repaths >= MAX_REPATHS_PER_FRAME {
                break;
            }
            let m = &mut movers[i];
            if !m.active || !m.needs_repath {
                continue;
            }
            if m.repath_cooldown > 0 {
                m.repath_cooldown -= 1;
                continue;
            }

            let start = m.cell();
            let mut path = self.find_path(self.config.mover_path_algorithm, start, m.goal);
            truncate_keep_start(&mut path, MAX_MOVER_PATH);
            repaths += 1;

            if path.is_empty() {
                // The goal cell may have been built over. Jobless movers
                // get a fresh random goal; movers with a job stay put and
                // let the job system sort it out.
                if !self.grid.is_walkable_at(m.goal.x, m.goal.y, m.goal.z) && m.job.is_none() {
                    self.assign_new_goal(m);
                    if !m.path.is_empty() {
                        continue;
                    }
                }
                // Still nothing: keep asking, but wait out a longer
                // cooldown first.
                m.path.clear();
                m.path_index = -1;
                m.needs_repath = true;
                m.repath_cooldown = self.failed_goal_cooldown();
                continue;
            }

            if self.config.use_string_pulling && path.len() > 2 {
                string_pull_path(&self.grid, &mut path);
            }
            m.set_path(path);
            m.needs_repath = false;
            m.repath_cooldown = self.fresh_repath_cooldown();
        }

        self.movers = movers;
    }

    /// Cooldown after a successful repath.
    fn fresh_repath_cooldown(&mut self) -> i32 {
        if self.config.use_randomized_cooldowns {
            TICK_RATE + self.rng.gen_range(0..TICK_RATE)
        } else {
            REPATH_COOLDOWN_FRAMES
        }
    }

    /// Pick a random goal for an idle mover and path to it immediately.
    /// Prefers another z-level when the graph actually links levels.
    pub(crate) fn assign_new_goal(&mut self, m: &mut Mover) {
        let goal = if self.config.prefer_different_z
            && self.grid.depth() > 1
            && self.graph.has_vertical_links()
        {
            self.random_walkable_cell_different_z(m.z)
        } else {
            self.random_walkable_cell_on(m.z)
        };
        let Some(goal) = goal else {
            m.path.clear();
            m.path_index = -1;
            return;
        };

        m.goal = goal;
        let start = m.cell();
        let mut path = self.find_path(self.config.mover_path_algorithm, start, goal);
        truncate_keep_start(&mut path, MAX_MOVER_PATH);
        if self.config.use_string_pulling && path.len() > 2 {
            string_pull_path(&self.grid, &mut path);
        }
        m.set_path(path);
        m.needs_repath = false;
    }
}
