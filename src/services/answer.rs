//! Free-text answer evaluation: normalization plus a Levenshtein tolerance for
//! typos on long enough titles.

use strsim::levenshtein;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Accepted answers shorter than this (after normalization) require an exact match.
pub const FUZZY_MIN_LENGTH: usize = 4;
/// Maximum edit distance, in percent of the accepted answer's length.
const FUZZY_MAX_DISTANCE_PERCENT: usize = 20;

/// Case-fold, strip diacritics and drop every non-alphanumeric character.
///
/// ```ignore
/// assert_eq!(normalize("Pokémon: The Movie!"), "pokemonthemovie");
/// ```
pub fn normalize(raw: &str) -> String {
    raw.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Return whether `guess` matches any of the `accepted` answers.
///
/// A missing or blank guess is always incorrect.
pub fn is_correct<S: AsRef<str>>(guess: Option<&str>, accepted: &[S]) -> bool {
    let Some(guess) = guess.map(normalize).filter(|g| !g.is_empty()) else {
        return false;
    };

    accepted
        .iter()
        .map(|answer| normalize(answer.as_ref()))
        .filter(|answer| !answer.is_empty())
        .any(|answer| matches_normalized(&guess, &answer))
}

fn matches_normalized(guess: &str, accepted: &str) -> bool {
    if guess == accepted {
        return true;
    }

    let length = accepted.chars().count();
    if length < FUZZY_MIN_LENGTH {
        return false;
    }

    levenshtein(guess, accepted) * 100 <= length * FUZZY_MAX_DISTANCE_PERCENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_strips_punctuation() {
        assert_eq!(normalize("Hello, World!"), "helloworld");
        assert_eq!(normalize("  Re:Zero  "), "rezero");
    }

    #[test]
    fn normalize_strips_diacritics() {
        assert_eq!(normalize("Pokémon"), "pokemon");
        assert_eq!(normalize("Ça va über"), "cavauber");
    }

    #[test]
    fn exact_normalized_match_is_correct() {
        let accepted = ["Fullmetal Alchemist: Brotherhood"];
        assert!(is_correct(Some("fullmetal alchemist brotherhood"), &accepted));
        assert!(is_correct(Some("FULLMETAL-ALCHEMIST-BROTHERHOOD"), &accepted));
    }

    #[test]
    fn small_typos_are_tolerated_on_long_titles() {
        let accepted = ["Cowboy Bebop"];
        // "cowboybebop" has 11 chars, two edits allowed.
        assert!(is_correct(Some("cowboy bebp"), &accepted));
        assert!(is_correct(Some("cowbo bebp"), &accepted));
        assert!(!is_correct(Some("cow bep"), &accepted));
    }

    #[test]
    fn short_answers_require_exact_match() {
        let accepted = ["K-On"];
        assert!(is_correct(Some("k on"), &accepted));
        assert!(!is_correct(Some("kon!x"), &accepted));

        let accepted = ["Air"];
        assert!(!is_correct(Some("aïr x"), &accepted));
        assert!(is_correct(Some("AÏR"), &accepted));
    }

    #[test]
    fn single_edit_needs_at_least_five_characters() {
        // 4 chars * 20% = 0.8 edits, so a single edit is already too much.
        let accepted = ["Bleach"];
        assert!(is_correct(Some("bleech"), &accepted));
        let accepted = ["Nana"];
        assert!(!is_correct(Some("nina"), &accepted));
    }

    #[test]
    fn any_accepted_alias_counts() {
        let accepted = ["Shingeki no Kyojin", "Attack on Titan"];
        assert!(is_correct(Some("attack on titan"), &accepted));
        assert!(is_correct(Some("shingeki no kyojin"), &accepted));
    }

    #[test]
    fn missing_or_blank_guess_is_incorrect() {
        let accepted = ["Naruto"];
        assert!(!is_correct(None, &accepted));
        assert!(!is_correct(Some(""), &accepted));
        assert!(!is_correct(Some("  ?! "), &accepted));
    }

    #[test]
    fn unrelated_guess_is_incorrect() {
        let accepted = ["Neon Genesis Evangelion"];
        assert!(!is_correct(Some("Sailor Moon"), &accepted));
    }
}
