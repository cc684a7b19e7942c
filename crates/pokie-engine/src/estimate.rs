//! Final estimate for a revealed story.

/// Numeric value of a card, or `None` for the unsure marker, blanks and
/// anything else that is not a plain run of decimal digits. Signs and
/// fractions don't count.
pub fn numeric_value(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Median of the numeric votes.
///
/// Non-numeric and missing values are ignored. With an even count the two
/// middle values are averaged and floored, so `[5, 8]` gives 6 rather than
/// rounding to 7. No numeric votes gives `None`.
pub fn median_estimate<'a, I>(values: I) -> Option<i64>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut numbers: Vec<i64> = values
        .into_iter()
        .flatten()
        .filter_map(numeric_value)
        .collect();

    if numbers.is_empty() {
        return None;
    }
    numbers.sort_unstable();

    let mid = numbers.len() / 2;
    if numbers.len() % 2 == 1 {
        Some(numbers[mid])
    } else {
        // i128 so two large cards can't overflow the sum
        let sum = i128::from(numbers[mid - 1]) + i128::from(numbers[mid]);
        Some(sum.div_euclid(2) as i64)
    }
}

#[cfg(test)]
mod tests {
    use pokie_types::models::UNSURE;

    use super::*;

    fn median(values: &[&str]) -> Option<i64> {
        median_estimate(values.iter().map(|v| Some(*v)))
    }

    #[test]
    fn odd_count_takes_middle() {
        assert_eq!(median(&["1", "2", "3"]), Some(2));
        assert_eq!(median(&["13", "1", "5"]), Some(5));
    }

    #[test]
    fn even_count_floors_mean_of_middle_pair() {
        assert_eq!(median(&["1", "2", "3", "4"]), Some(2));
        assert_eq!(median(&["5", "8"]), Some(6));
        assert_eq!(median(&["0", "3"]), Some(1));
    }

    #[test]
    fn empty_or_non_numeric_gives_none() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[UNSURE, "coffee", ""]), None);
        assert_eq!(median_estimate([None, None]), None);
    }

    #[test]
    fn non_numeric_votes_are_excluded() {
        assert_eq!(median(&[UNSURE, "3", "coffee", "5", "8"]), Some(5));
        assert_eq!(median_estimate([Some("2"), None, Some(" 4 ")]), Some(3));
    }

    #[test]
    fn fractional_and_signed_cards_are_not_numeric() {
        assert_eq!(numeric_value("0.5"), None);
        assert_eq!(numeric_value("-3"), None);
        assert_eq!(numeric_value("+5"), None);
        assert_eq!(numeric_value(UNSURE), None);
        assert_eq!(numeric_value(" 21 "), Some(21));
        assert_eq!(median(&["-3", "+5", "8"]), Some(8));
    }
}
