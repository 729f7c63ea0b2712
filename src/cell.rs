//! The cell model: every tile kind the grid can hold, and the predicates
//! that all movement and pathfinding code consults.
//!
//! No search loop in this crate matches on a specific [`CellKind`] literal;
//! everything goes through [`CellKind::blocks_movement`],
//! [`CellKind::is_walkable_on`], [`CellKind::move_cost`] and friends, so new
//! kinds only need an entry here.

use crate::Cost;

/// Cost value marking a tile as impassable for the search algorithms.
pub const COST_INF: Cost = 999_999;

/// The kind of a single grid cell.
///
/// Variants cover the ground/wall/floor basics, vertical movement (ladders
/// in three shaft roles, directional ramps), and the decorated vegetation /
/// track kinds the simulation layers on top.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// Open air. Not walkable; movers in it fall.
    Air,
    /// Natural walkable ground.
    #[default]
    Ground,
    /// Constructed floor. Slightly faster to walk on than ground.
    Floor,
    /// Built or natural wall. Solid, blocks movement and sight.
    Wall,
    /// Unmineable world boundary. Solid.
    Bedrock,
    /// A door. Walkable, does not block sight when standing open (the core
    /// does not model door state; closed doors are the host's concern).
    Door,
    /// An in-level stair step, walkable.
    Stair,
    /// Ramp whose high side faces -y.
    RampNorth,
    /// Ramp whose high side faces +y.
    RampSouth,
    /// Ramp whose high side faces +x.
    RampEast,
    /// Ramp whose high side faces -x.
    RampWest,
    /// Ramp without a carved direction yet. Walkable, but it links nothing
    /// until it is shaped into one of the directional kinds.
    RampAuto,
    /// Bottom of a ladder shaft: can climb up from here.
    LadderUp,
    /// Top of a ladder shaft: can climb down from here.
    LadderDown,
    /// Interior of a ladder shaft: both directions.
    LadderBoth,
    /// Living tree trunk. Solid and path-opaque.
    TreeTrunk,
    /// A planted sapling. Walkable (movers step around it).
    Sapling,
    /// Tall grass. Walkable but slow.
    TallGrass,
    /// Laid track. Walkable and fast.
    Track,
}

impl CellKind {
    /// Does this kind stop movement outright (as opposed to merely not being
    /// standable, like [`Air`](CellKind::Air))?
    #[inline]
    pub fn blocks_movement(self) -> bool {
        matches!(self, CellKind::Wall | CellKind::Bedrock | CellKind::TreeTrunk)
    }

    /// Does this kind block line of sight?
    #[inline]
    pub fn is_solid(self) -> bool {
        matches!(self, CellKind::Wall | CellKind::Bedrock | CellKind::TreeTrunk)
    }

    /// Can a mover stand on and walk over this kind?
    #[inline]
    pub fn is_walkable_on(self) -> bool {
        matches!(
            self,
            CellKind::Ground
                | CellKind::Floor
                | CellKind::Door
                | CellKind::Stair
                | CellKind::RampNorth
                | CellKind::RampSouth
                | CellKind::RampEast
                | CellKind::RampWest
                | CellKind::RampAuto
                | CellKind::LadderUp
                | CellKind::LadderDown
                | CellKind::LadderBoth
                | CellKind::Sapling
                | CellKind::TallGrass
                | CellKind::Track
        )
    }

    /// Any of the three ladder roles.
    #[inline]
    pub fn is_ladder(self) -> bool {
        matches!(
            self,
            CellKind::LadderUp | CellKind::LadderDown | CellKind::LadderBoth
        )
    }

    /// Any ramp kind, directional or not.
    #[inline]
    pub fn is_ramp(self) -> bool {
        self.is_directional_ramp() || self == CellKind::RampAuto
    }

    /// A ramp with a carved high side.
    #[inline]
    pub fn is_directional_ramp(self) -> bool {
        matches!(
            self,
            CellKind::RampNorth | CellKind::RampSouth | CellKind::RampEast | CellKind::RampWest
        )
    }

    /// `(dx, dy)` offset from the ramp cell to the cell its high side leans
    /// against (one z-level up). `None` for everything that is not a
    /// directional ramp.
    #[inline]
    pub fn ramp_high_side_offset(self) -> Option<(i32, i32)> {
        match self {
            CellKind::RampNorth => Some((0, -1)),
            CellKind::RampSouth => Some((0, 1)),
            CellKind::RampEast => Some((1, 0)),
            CellKind::RampWest => Some((-1, 0)),
            _ => None,
        }
    }

    /// Climbing up is possible from the bottom and the interior of a shaft.
    #[inline]
    pub fn can_climb_up(self) -> bool {
        matches!(self, CellKind::LadderUp | CellKind::LadderBoth)
    }

    /// Climbing down is possible from the top and the interior of a shaft.
    #[inline]
    pub fn can_climb_down(self) -> bool {
        matches!(self, CellKind::LadderDown | CellKind::LadderBoth)
    }

    /// Cost of stepping onto this kind. `10` is the baseline; floors and
    /// track are faster, tall grass is slower. Diagonal steps scale the
    /// destination cost by 14/10. [`COST_INF`] means impassable.
    #[inline]
    pub fn move_cost(self) -> Cost {
        match self {
            CellKind::Floor | CellKind::Track => 8,
            CellKind::TallGrass => 12,
            k if k.is_walkable_on() => 10,
            _ => COST_INF,
        }
    }

    /// The glyph used by the ASCII map format. Inverse of [`CellKind::from_ascii`]
    /// for every glyph that format distinguishes; all other walkable kinds
    /// collapse to `'.'`.
    pub fn to_ascii(self) -> char {
        match self {
            CellKind::Wall => '#',
            CellKind::Bedrock => 'B',
            CellKind::Air => '_',
            CellKind::LadderUp => '<',
            CellKind::LadderDown => '>',
            CellKind::LadderBoth => 'L',
            _ => '.',
        }
    }

    /// Parse one ASCII map glyph. Unknown glyphs are walkable ground.
    pub fn from_ascii(c: char) -> CellKind {
        match c {
            '#' => CellKind::Wall,
            'B' => CellKind::Bedrock,
            '_' => CellKind::Air,
            '<' => CellKind::LadderUp,
            '>' => CellKind::LadderDown,
            'L' | 'X' => CellKind::LadderBoth,
            _ => CellKind::Ground,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walls_block_everything() {
        for kind in [CellKind::Wall, CellKind::Bedrock, CellKind::TreeTrunk] {
            assert!(kind.blocks_movement());
            assert!(kind.is_solid());
            assert!(!kind.is_walkable_on());
            assert_eq!(kind.move_cost(), COST_INF);
        }
    }

    #[test]
    fn air_is_passable_to_sight_but_not_feet() {
        assert!(!CellKind::Air.blocks_movement());
        assert!(!CellKind::Air.is_solid());
        assert!(!CellKind::Air.is_walkable_on());
        assert_eq!(CellKind::Air.move_cost(), COST_INF);
    }

    #[test]
    fn ramp_offsets() {
        assert_eq!(CellKind::RampNorth.ramp_high_side_offset(), Some((0, -1)));
        assert_eq!(CellKind::RampEast.ramp_high_side_offset(), Some((1, 0)));
        assert_eq!(CellKind::RampAuto.ramp_high_side_offset(), None);
        assert!(CellKind::RampAuto.is_ramp());
        assert!(!CellKind::RampAuto.is_directional_ramp());
    }

    #[test]
    fn ladder_roles() {
        assert!(CellKind::LadderUp.can_climb_up());
        assert!(!CellKind::LadderUp.can_climb_down());
        assert!(CellKind::LadderDown.can_climb_down());
        assert!(CellKind::LadderBoth.can_climb_up() && CellKind::LadderBoth.can_climb_down());
    }

    #[test]
    fn ascii_glyphs_round_trip() {
        for kind in [
            CellKind::Wall,
            CellKind::Air,
            CellKind::LadderUp,
            CellKind::LadderDown,
            CellKind::LadderBoth,
            CellKind::Ground,
        ] {
            assert_eq!(CellKind::from_ascii(kind.to_ascii()), kind);
        }
    }
}
