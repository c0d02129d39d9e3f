//! Effective selection in a changing list.
//!
//! The selection shown to a reviewer is derived from the current collection
//! and the last explicit choice every time, rather than stored and corrected
//! when a filter or tab change removes the chosen item.

/// The last choice if it is still present, otherwise the first item.
pub fn effective_selection<'a, T, K, F>(
    items: &'a [T],
    last_choice: Option<&K>,
    key: F,
) -> Option<&'a K>
where
    K: PartialEq + ?Sized,
    F: Fn(&'a T) -> &'a K,
{
    let mut keys = items.iter().map(key);
    let first = keys.next()?;
    match last_choice {
        Some(choice) if first == choice => Some(first),
        Some(choice) => keys.find(|k| *k == choice).or(Some(first)),
        None => Some(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick<'a>(items: &'a [&'a str], last: Option<&str>) -> Option<&'a str> {
        effective_selection(items, last, |s| *s)
    }

    #[test]
    fn test_keeps_choice_that_is_still_visible() {
        assert_eq!(pick(&["a", "b", "c"], Some("b")), Some("b"));
    }

    #[test]
    fn test_falls_back_to_first_when_choice_filtered_out() {
        assert_eq!(pick(&["a", "c"], Some("b")), Some("a"));
    }

    #[test]
    fn test_no_choice_selects_first() {
        assert_eq!(pick(&["x", "y"], None), Some("x"));
    }

    #[test]
    fn test_empty_collection_selects_nothing() {
        assert_eq!(pick(&[], Some("b")), None);
        assert_eq!(pick(&[], None), None);
    }
}
