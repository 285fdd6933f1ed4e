//! Entity extraction from free-text customer messages.
//!
//! Keyword and pattern matching rather than LLM classification — extraction
//! must be deterministic and resistant to prompt injection, since the output
//! gates retrieval and drives the conversation state machine.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Makes the parser recognises. Closed vocabulary.
const MAKES: &[&str] = &[
    "toyota",
    "honda",
    "ford",
    "chevrolet",
    "bmw",
    "mercedes",
    "audi",
    "lexus",
    "nissan",
    "mazda",
    "hyundai",
    "kia",
    "subaru",
    "volkswagen",
    "jeep",
    "ram",
    "gmc",
    "tesla",
];

/// Body types the parser recognises. Closed vocabulary.
const BODY_TYPES: &[&str] = &[
    "sedan",
    "suv",
    "truck",
    "coupe",
    "hatchback",
    "convertible",
    "minivan",
    "wagon",
    "van",
    "crossover",
];

/// (model, make) pairs for model-name recognition.
const MODELS: &[(&str, &str)] = &[
    ("camry", "toyota"),
    ("corolla", "toyota"),
    ("rav4", "toyota"),
    ("highlander", "toyota"),
    ("tacoma", "toyota"),
    ("civic", "honda"),
    ("accord", "honda"),
    ("cr-v", "honda"),
    ("pilot", "honda"),
    ("f-150", "ford"),
    ("escape", "ford"),
    ("explorer", "ford"),
    ("mustang", "ford"),
    ("silverado", "chevrolet"),
    ("equinox", "chevrolet"),
    ("malibu", "chevrolet"),
    ("altima", "nissan"),
    ("rogue", "nissan"),
    ("sentra", "nissan"),
    ("cx-5", "mazda"),
    ("elantra", "hyundai"),
    ("sonata", "hyundai"),
    ("tucson", "hyundai"),
    ("sportage", "kia"),
    ("sorento", "kia"),
    ("outback", "subaru"),
    ("forester", "subaru"),
    ("wrangler", "jeep"),
    ("grand cherokee", "jeep"),
];

/// Feature keywords worth carrying into retrieval.
const FEATURES: &[&str] = &[
    "leather",
    "sunroof",
    "moonroof",
    "awd",
    "4wd",
    "apple carplay",
    "android auto",
    "navigation",
    "heated seats",
    "backup camera",
    "third row",
    "tow package",
];

/// Structured query extracted from one customer message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleQuery {
    /// Single budget figure, in dollars.
    pub budget: Option<f64>,
    /// Explicit price range `(lo, hi)`, in dollars.
    pub price_range: Option<(f64, f64)>,
    /// Recognised model name.
    pub model: Option<String>,
    /// Recognised make.
    pub make: Option<String>,
    /// Four-digit model year.
    pub year: Option<i32>,
    /// Recognised body type.
    pub body_type: Option<String>,
    /// Feature keywords found in the message.
    pub features: Vec<String>,
    /// True when at least one of model / year / budget / body type was found.
    pub has_strong_signals: bool,
}

fn money_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // $25,000 / $25000.50 / 25k / $25k / "around $25" / "price range of $25"
        Regex::new(r"(?i)\$\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)\s*(k)?|\b([0-9]{1,3})\s*k\b")
            .expect("money regex compiles")
    })
}

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)between\s+\$?([0-9][0-9,]*)\s*(k)?\s+and\s+\$?([0-9][0-9,]*)\s*(k)?",
        )
        .expect("range regex compiles")
    })
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19[9][0-9]|20[0-2][0-9]|2030)\b").expect("year regex compiles"))
}

/// Parse one free-text message into a [`VehicleQuery`].
pub fn parse_message(text: &str) -> VehicleQuery {
    let lower = text.to_lowercase();

    let mut query = VehicleQuery {
        budget: extract_budget(&lower),
        price_range: extract_price_range(&lower),
        model: None,
        make: None,
        year: extract_year(&lower),
        body_type: BODY_TYPES
            .iter()
            .find(|b| lower.contains(*b))
            .map(|b| (*b).to_owned()),
        features: FEATURES
            .iter()
            .filter(|f| lower.contains(*f))
            .map(|f| (*f).to_owned())
            .collect(),
        has_strong_signals: false,
    };

    // Model first: a model implies its make.
    if let Some((model, make)) = MODELS.iter().find(|(m, _)| lower.contains(m)) {
        query.model = Some((*model).to_owned());
        query.make = Some((*make).to_owned());
    } else {
        query.make = MAKES
            .iter()
            .find(|m| lower.contains(*m))
            .map(|m| (*m).to_owned());
    }

    // "under $25k" style caps become a range with an open floor.
    if query.price_range.is_none() {
        if let Some(budget) = query.budget {
            if lower.contains("under") || lower.contains("below") || lower.contains("less than") {
                query.price_range = Some((0.0, budget));
            } else if lower.contains("over") || lower.contains("above") {
                query.price_range = Some((budget, f64::MAX));
            }
        }
    }

    query.has_strong_signals = query.model.is_some()
        || query.year.is_some()
        || query.budget.is_some()
        || query.body_type.is_some();
    query
}

/// Extract a single budget figure. `k` suffix multiplies by 1000.
fn extract_budget(lower: &str) -> Option<f64> {
    let caps = money_re().captures(lower)?;
    if let Some(amount) = caps.get(1) {
        let cleaned = amount.as_str().replace(',', "");
        let value: f64 = cleaned.parse().ok()?;
        let multiplier = if caps.get(2).is_some() { 1000.0 } else { 1.0 };
        return Some(value * multiplier);
    }
    if let Some(amount) = caps.get(3) {
        let value: f64 = amount.as_str().parse().ok()?;
        return Some(value * 1000.0);
    }
    None
}

/// Extract an explicit "between X and Y" price range.
fn extract_price_range(lower: &str) -> Option<(f64, f64)> {
    let caps = range_re().captures(lower)?;
    let lo_raw = caps.get(1)?.as_str().replace(',', "");
    let hi_raw = caps.get(3)?.as_str().replace(',', "");
    let mut lo: f64 = lo_raw.parse().ok()?;
    let mut hi: f64 = hi_raw.parse().ok()?;
    if caps.get(2).is_some() {
        lo *= 1000.0;
    }
    if caps.get(4).is_some() {
        hi *= 1000.0;
    }
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    Some((lo, hi))
}

/// Extract a four-digit model year in 1990..=2030.
fn extract_year(lower: &str) -> Option<i32> {
    year_re()
        .captures(lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_amount_with_commas() {
        let q = parse_message("looking to spend $25,000 on a sedan");
        assert_eq!(q.budget, Some(25_000.0));
        assert_eq!(q.body_type.as_deref(), Some("sedan"));
        assert!(q.has_strong_signals);
    }

    #[test]
    fn k_suffix_multiplies() {
        assert_eq!(parse_message("my budget is 25k").budget, Some(25_000.0));
        assert_eq!(parse_message("around $30k max").budget, Some(30_000.0));
    }

    #[test]
    fn price_range_of_phrase() {
        let q = parse_message("in the price range of $20,000");
        assert_eq!(q.budget, Some(20_000.0));
    }

    #[test]
    fn under_budget_becomes_capped_range() {
        let q = parse_message("2021 camry under $25k");
        assert_eq!(q.price_range, Some((0.0, 25_000.0)));
        assert_eq!(q.model.as_deref(), Some("camry"));
        assert_eq!(q.make.as_deref(), Some("toyota"));
        assert_eq!(q.year, Some(2021));
    }

    #[test]
    fn between_range() {
        let q = parse_message("something between $20k and $30k");
        assert_eq!(q.price_range, Some((20_000.0, 30_000.0)));
    }

    #[test]
    fn model_implies_make() {
        let q = parse_message("do you have a civic?");
        assert_eq!(q.model.as_deref(), Some("civic"));
        assert_eq!(q.make.as_deref(), Some("honda"));
    }

    #[test]
    fn make_without_model() {
        let q = parse_message("any toyotas on the lot");
        assert_eq!(q.make.as_deref(), Some("toyota"));
        assert!(q.model.is_none());
    }

    #[test]
    fn features_collected() {
        let q = parse_message("needs leather and a sunroof");
        assert_eq!(q.features, vec!["leather".to_owned(), "sunroof".to_owned()]);
    }

    #[test]
    fn vague_message_has_no_strong_signals() {
        let q = parse_message("hey, just looking around");
        assert!(!q.has_strong_signals);
        assert!(q.budget.is_none());
        assert!(q.model.is_none());
    }

    #[test]
    fn year_bounds() {
        assert_eq!(parse_message("a 2021 model").year, Some(2021));
        assert_eq!(parse_message("call me at 1985").year, None);
    }
}
