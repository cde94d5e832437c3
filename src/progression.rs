//! The staged onboarding state machine: four graded stages, then a terminal
//! completed state. Persisted as an integer `level` on the user row; this
//! module owns the mapping between that integer and stage semantics.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    One,
    Two,
    Three,
    Four,
    Completed,
}

impl Stage {
    /// Maps a persisted level to a stage. Anything outside 1..=4 (zero,
    /// negative, or past the last stage) is treated as Completed: there is no
    /// rubric for an undefined stage, so grading stops instead of guessing.
    pub fn from_level(level: i64) -> Self {
        match level {
            1 => Stage::One,
            2 => Stage::Two,
            3 => Stage::Three,
            4 => Stage::Four,
            _ => Stage::Completed,
        }
    }

    pub fn number(self) -> Option<i64> {
        match self {
            Stage::One => Some(1),
            Stage::Two => Some(2),
            Stage::Three => Some(3),
            Stage::Four => Some(4),
            Stage::Completed => None,
        }
    }

    pub fn next(self) -> Stage {
        match self {
            Stage::One => Stage::Two,
            Stage::Two => Stage::Three,
            Stage::Three => Stage::Four,
            Stage::Four | Stage::Completed => Stage::Completed,
        }
    }

    /// What the user has to submit at this stage, phrased for the user.
    pub fn task_description(self) -> &'static str {
        match self {
            Stage::One => "send a screenshot of today's screen-time report",
            Stage::Two => "write a short journal reflection about yesterday",
            Stage::Three => "send a short list of tasks you completed today",
            Stage::Four => "send a photo of your tidied workspace",
            Stage::Completed => "nothing left, you are done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_stages() {
        assert_eq!(Stage::from_level(1), Stage::One);
        assert_eq!(Stage::from_level(2), Stage::Two);
        assert_eq!(Stage::from_level(3), Stage::Three);
        assert_eq!(Stage::from_level(4), Stage::Four);
    }

    #[test]
    fn out_of_range_levels_are_completed() {
        assert_eq!(Stage::from_level(5), Stage::Completed);
        assert_eq!(Stage::from_level(0), Stage::Completed);
        assert_eq!(Stage::from_level(-3), Stage::Completed);
        assert_eq!(Stage::from_level(i64::MAX), Stage::Completed);
    }

    #[test]
    fn next_advances_by_one_and_terminates() {
        assert_eq!(Stage::One.next(), Stage::Two);
        assert_eq!(Stage::Four.next(), Stage::Completed);
        assert_eq!(Stage::Completed.next(), Stage::Completed);
    }
}
