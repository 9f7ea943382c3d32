use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Set of leg indices. Leg 0 is the right leg, numbering continues
    /// counterclockwise around the hexagon.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LegSet: u8 {
        const LEG_0 = 0b00000001;
        const LEG_1 = 0b00000010;
        const LEG_2 = 0b00000100;
        const LEG_3 = 0b00001000;
        const LEG_4 = 0b00010000;
        const LEG_5 = 0b00100000;
        const TRIPOD_A = Self::LEG_0.bits() | Self::LEG_2.bits() | Self::LEG_4.bits();
        const TRIPOD_B = Self::LEG_1.bits() | Self::LEG_3.bits() | Self::LEG_5.bits();
        const ALL = 0b00111111;
    }
}

impl LegSet {
    pub fn single(leg_index: usize) -> LegSet {
        LegSet::from_bits_truncate(1 << leg_index)
    }

    pub fn indices(self) -> impl Iterator<Item = usize> {
        (0..6).filter(move |index| self.contains(LegSet::single(*index)))
    }

    pub fn len(self) -> usize {
        self.bits().count_ones() as usize
    }
}

/// One node in a gait's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GaitPhase {
    TripodA,
    TripodB,
    Wave1,
    Wave2,
    Wave3,
    Wave4,
    Wave5,
    Wave6,
}

impl GaitPhase {
    /// Legs lifted during this phase. The stance set is the complement.
    pub fn swing_legs(self) -> LegSet {
        match self {
            GaitPhase::TripodA => LegSet::TRIPOD_A,
            GaitPhase::TripodB => LegSet::TRIPOD_B,
            GaitPhase::Wave1 => LegSet::LEG_0,
            GaitPhase::Wave2 => LegSet::LEG_1,
            GaitPhase::Wave3 => LegSet::LEG_2,
            GaitPhase::Wave4 => LegSet::LEG_3,
            GaitPhase::Wave5 => LegSet::LEG_4,
            GaitPhase::Wave6 => LegSet::LEG_5,
        }
    }

    pub fn stance_legs(self) -> LegSet {
        LegSet::ALL - self.swing_legs()
    }

    /// Successor list in the gait graph. The list form leaves room for
    /// branching gaits, current gaits always take the first entry.
    pub fn successors(self) -> &'static [GaitPhase] {
        match self {
            GaitPhase::TripodA => &[GaitPhase::TripodB],
            GaitPhase::TripodB => &[GaitPhase::TripodA],
            GaitPhase::Wave1 => &[GaitPhase::Wave2],
            GaitPhase::Wave2 => &[GaitPhase::Wave3],
            GaitPhase::Wave3 => &[GaitPhase::Wave4],
            GaitPhase::Wave4 => &[GaitPhase::Wave5],
            GaitPhase::Wave5 => &[GaitPhase::Wave6],
            GaitPhase::Wave6 => &[GaitPhase::Wave1],
        }
    }

    pub fn successor(self) -> GaitPhase {
        self.successors()[0]
    }
}

/// Walking pattern selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaitKind {
    /// Two alternating groups of three. Most efficient, three legs always
    /// supporting.
    Tripod,
    /// One leg at a time in mounting order. Slowest, five legs supporting.
    Wave,
}

impl GaitKind {
    pub fn phases(self) -> &'static [GaitPhase] {
        match self {
            GaitKind::Tripod => &[GaitPhase::TripodA, GaitPhase::TripodB],
            GaitKind::Wave => &[
                GaitPhase::Wave1,
                GaitPhase::Wave2,
                GaitPhase::Wave3,
                GaitPhase::Wave4,
                GaitPhase::Wave5,
                GaitPhase::Wave6,
            ],
        }
    }

    /// Phase every cycle starts from.
    pub fn canonical_phase(self) -> GaitPhase {
        self.phases()[0]
    }

    pub fn phases_per_cycle(self) -> usize {
        self.phases().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swing_and_stance_partition_all_legs() {
        for kind in [GaitKind::Tripod, GaitKind::Wave] {
            for phase in kind.phases() {
                let swing = phase.swing_legs();
                let stance = phase.stance_legs();
                assert_eq!(swing | stance, LegSet::ALL);
                assert!((swing & stance).is_empty());
            }
        }
    }

    #[test]
    fn gait_graphs_are_total_and_closed() {
        for kind in [GaitKind::Tripod, GaitKind::Wave] {
            for phase in kind.phases() {
                let successors = phase.successors();
                assert!(!successors.is_empty());
                for successor in successors {
                    assert!(kind.phases().contains(successor));
                }
            }
        }
    }

    #[test]
    fn tripod_covers_every_leg_exactly_once_as_swing() {
        let mut covered = LegSet::empty();
        for phase in GaitKind::Tripod.phases() {
            assert!((covered & phase.swing_legs()).is_empty());
            covered |= phase.swing_legs();
        }
        assert_eq!(covered, LegSet::ALL);
    }

    #[test]
    fn wave_swings_one_leg_per_phase_in_mounting_order() {
        let phases = GaitKind::Wave.phases();
        assert_eq!(phases.len(), 6);
        for (index, phase) in phases.iter().enumerate() {
            assert_eq!(phase.swing_legs(), LegSet::single(index));
            assert_eq!(phase.stance_legs().len(), 5);
        }
    }

    #[test]
    fn wave_graph_is_a_cycle() {
        let mut phase = GaitKind::Wave.canonical_phase();
        for _ in 0..6 {
            phase = phase.successor();
        }
        assert_eq!(phase, GaitPhase::Wave1);
    }

    #[test]
    fn leg_set_indices_iterate_in_order() {
        let set = LegSet::TRIPOD_B;
        assert_eq!(set.indices().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(set.len(), 3);
    }
}
