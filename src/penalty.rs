use serde::{Deserialize, Serialize};

/// Reputation deduction schedule for repeat offenders. The first
/// `grace_offenses` violations cost nothing, the next one costs
/// `base_points`, and every violation after that doubles. All escalation
/// arithmetic in the crate lives here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltySchedule {
    pub grace_offenses: u32,
    pub base_points: u32,
}

impl Default for PenaltySchedule {
    fn default() -> Self {
        Self {
            grace_offenses: 1,
            base_points: 2,
        }
    }
}

impl PenaltySchedule {
    /// Reputation points to deduct once a sender reaches `violations` total
    /// violations. Monotonic non-decreasing, saturating for absurd counts.
    pub fn deduction(&self, violations: u64) -> u32 {
        let grace = u64::from(self.grace_offenses);
        if violations <= grace {
            return 0;
        }
        let step = violations - grace - 1;
        if step >= 32 {
            return u32::MAX;
        }
        match 1u32.checked_shl(step as u32) {
            Some(multiplier) => self.base_points.saturating_mul(multiplier),
            None => u32::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_table() {
        let schedule = PenaltySchedule::default();
        assert_eq!(schedule.deduction(0), 0);
        assert_eq!(schedule.deduction(1), 0);
        assert_eq!(schedule.deduction(2), 2);
        assert_eq!(schedule.deduction(3), 4);
        assert_eq!(schedule.deduction(4), 8);
        assert_eq!(schedule.deduction(5), 16);
        assert_eq!(schedule.deduction(6), 32);
    }

    #[test]
    fn test_monotonic_non_decreasing() {
        let schedule = PenaltySchedule::default();
        let mut previous = 0;
        for violations in 0..64 {
            let points = schedule.deduction(violations);
            assert!(points >= previous, "deduction dropped at {violations}");
            previous = points;
        }
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        let schedule = PenaltySchedule::default();
        assert_eq!(schedule.deduction(40), u32::MAX);
        assert_eq!(schedule.deduction(u64::MAX), u32::MAX);
    }

    #[test]
    fn test_custom_grace_window() {
        let schedule = PenaltySchedule {
            grace_offenses: 3,
            base_points: 5,
        };
        assert_eq!(schedule.deduction(3), 0);
        assert_eq!(schedule.deduction(4), 5);
        assert_eq!(schedule.deduction(5), 10);
        assert_eq!(schedule.deduction(6), 20);
    }
}
