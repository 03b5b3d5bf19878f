//! Origin number selection

use rand::seq::SliceRandom;

/// Picks the origin number for an outbound call
pub trait NumberSelector: Send + Sync {
    fn select<'a>(&self, numbers: &'a [String]) -> Option<&'a str>;
}

/// Uniform random choice, spreading load across the configured numbers
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomNumberSelector;

impl NumberSelector for RandomNumberSelector {
    fn select<'a>(&self, numbers: &'a [String]) -> Option<&'a str> {
        numbers
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }
}

/// Always the first configured number
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstNumberSelector;

impl NumberSelector for FirstNumberSelector {
    fn select<'a>(&self, numbers: &'a [String]) -> Option<&'a str> {
        numbers.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_selector_stays_in_set() {
        let numbers = vec!["+910000000001".to_string(), "+910000000002".to_string()];
        for _ in 0..50 {
            let picked = RandomNumberSelector.select(&numbers).unwrap();
            assert!(numbers.iter().any(|n| n == picked));
        }
    }

    #[test]
    fn test_empty_set() {
        assert!(RandomNumberSelector.select(&[]).is_none());
        assert!(FirstNumberSelector.select(&[]).is_none());
    }

    #[test]
    fn test_first_selector() {
        let numbers = vec!["a".to_string(), "b".to_string()];
        assert_eq!(FirstNumberSelector.select(&numbers), Some("a"));
    }
}
