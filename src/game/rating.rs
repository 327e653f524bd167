//! Elo rating update (spec.md §4.9).

pub const K_FACTOR: f64 = 32.0;
pub const RATING_FLOOR: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl Outcome {
    fn actual_score(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Loss => 0.0,
            Outcome::Draw => 0.5,
        }
    }

    pub fn opponent(self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Loss => Outcome::Win,
            Outcome::Draw => Outcome::Draw,
        }
    }
}

/// Expected score for `rating_a` against `rating_b`.
pub fn expected_score(rating_a: i32, rating_b: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) as f64 / 400.0))
}

/// New rating for a player given their current rating, the opponent's
/// rating, and the outcome, floored at [`RATING_FLOOR`].
pub fn update_rating(rating: i32, opponent_rating: i32, outcome: Outcome) -> i32 {
    let expected = expected_score(rating, opponent_rating);
    let delta = K_FACTOR * (outcome.actual_score() - expected);
    let new_rating = rating as f64 + delta;
    (new_rating.round() as i32).max(RATING_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_draw_is_a_no_op() {
        assert_eq!(update_rating(1200, 1200, Outcome::Draw), 1200);
    }

    #[test]
    fn deltas_sum_to_zero_for_decisive_result() {
        let winner = update_rating(1200, 1200, Outcome::Win);
        let loser = update_rating(1200, 1200, Outcome::Loss);
        assert_eq!((winner - 1200) + (loser - 1200), 0);
    }

    #[test]
    fn rating_never_drops_below_floor() {
        assert_eq!(update_rating(110, 2400, Outcome::Loss), RATING_FLOOR);
    }

    #[test]
    fn underdog_win_gains_more_than_expected_favorite() {
        let underdog_gain = update_rating(1000, 1400, Outcome::Win) - 1000;
        let favorite_gain = update_rating(1400, 1000, Outcome::Win) - 1400;
        assert!(underdog_gain > favorite_gain);
    }
}
