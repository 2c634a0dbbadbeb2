//! Points awarded per round. Streaks are tracked for display only and never
//! change the value returned here.

use crate::state::game::ResponseMode;

/// Points for a correct free-text answer.
pub const FREE_TEXT_POINTS: u32 = 5;
/// Points for a correct four-choice answer.
pub const FOUR_CHOICE_POINTS: u32 = 3;
/// Points for a correct two-choice answer.
pub const TWO_CHOICE_POINTS: u32 = 1;

/// Points awarded for a single round answer.
pub fn points(mode: ResponseMode, correct: bool) -> u32 {
    if !correct {
        return 0;
    }
    points_per_correct(mode)
}

/// Value of one correct answer in `mode`.
pub fn points_per_correct(mode: ResponseMode) -> u32 {
    match mode {
        ResponseMode::FreeText => FREE_TEXT_POINTS,
        ResponseMode::FourChoice => FOUR_CHOICE_POINTS,
        ResponseMode::TwoChoice => TWO_CHOICE_POINTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_MODES: [ResponseMode; 3] = [
        ResponseMode::FreeText,
        ResponseMode::FourChoice,
        ResponseMode::TwoChoice,
    ];

    #[test]
    fn incorrect_answers_score_zero_in_every_mode() {
        for mode in ALL_MODES {
            assert_eq!(points(mode, false), 0, "{mode:?}");
        }
    }

    #[test]
    fn correct_answers_are_strictly_ordered_by_mode() {
        let free = points(ResponseMode::FreeText, true);
        let four = points(ResponseMode::FourChoice, true);
        let two = points(ResponseMode::TwoChoice, true);
        assert!(free > four);
        assert!(four > two);
        assert!(two > 0);
    }
}
