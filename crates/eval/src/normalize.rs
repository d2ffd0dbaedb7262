use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Input is already lower-cased when these run.
re!(re_currency_or_unit, r"₹|\brs\.|\brs\b|\binr\b|kwh\b|\bunits?\b");
re!(re_digit_comma, r"(\d),(\d)");
re!(re_digit_separator, r"(\d)[/.](\d)");

/// Optional comparison rules layered on top of the base normalization
/// (trim, lower-case, collapse whitespace). Both are off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationPolicy {
    /// Drop `₹`, `Rs`/`Rs.`, `INR`, `kWh` and `unit(s)` tokens.
    pub strip_currency_and_units: bool,
    /// Drop digit-group commas; `/` and `.` between digits become `-`.
    pub unify_separators: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    policy: NormalizationPolicy,
}

impl Normalizer {
    pub fn new(policy: NormalizationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    /// Comparison form of `value`. Idempotent: the rules are applied until
    /// nothing changes.
    pub fn normalize(&self, value: &str) -> String {
        let mut current = self.step(value);
        loop {
            let next = self.step(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// Equal after normalization; blank on both sides counts as equal.
    pub fn matches(&self, expected: &str, extracted: &str) -> bool {
        self.normalize(expected) == self.normalize(extracted)
    }

    fn step(&self, value: &str) -> String {
        let mut s = value.to_lowercase();
        if self.policy.strip_currency_and_units {
            s = re_currency_or_unit().replace_all(&s, " ").into_owned();
        }
        if self.policy.unify_separators {
            s = re_digit_comma().replace_all(&s, "${1}${2}").into_owned();
            s = re_digit_separator().replace_all(&s, "${1}-${2}").into_owned();
        }
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
