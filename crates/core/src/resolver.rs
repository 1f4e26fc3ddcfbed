//! Order identity extraction from inbound message text.
//!
//! Patterns are tried in an explicit priority order and the first match
//! wins. Multiple distinct numbers in one message are not disambiguated;
//! the highest-priority pattern decides. This is a documented limitation,
//! kept visible here rather than hidden in fallthrough logic.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::order::OrderLookupResult;

struct ExtractionPattern {
    name: &'static str,
    regex: Regex,
}

// Priority order: explicit #12345 marker, then an "order 12345" phrase,
// then any bare 4-6 digit run. Compiled once; the patterns are static.
static PATTERNS: LazyLock<Vec<ExtractionPattern>> = LazyLock::new(|| {
    [
        ("hash_marker", r"#(\d+)"),
        ("order_phrase", r"(?i)order[:\s]*#?(\d+)"),
        ("bare_number", r"\b(\d{4,6})\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| ExtractionPattern {
        name,
        regex: Regex::new(pattern).unwrap_or_else(|error| {
            panic!("static extraction pattern `{name}` failed to compile: {error}")
        }),
    })
    .collect()
});

pub struct OrderIdentityResolver;

impl OrderIdentityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve an order identity from a message. A miss on every pattern is
    /// not an error: it signals that enrichment should fall back to the
    /// sender's order history.
    pub fn resolve(&self, subject: &str, body: &str) -> OrderLookupResult {
        let haystack = format!("{subject}\n{body}");

        for pattern in PATTERNS.iter() {
            if let Some(captures) = pattern.regex.captures(&haystack) {
                if let Some(number) = captures.get(1) {
                    tracing::debug!(
                        event_name = "resolver.pattern_matched",
                        pattern = pattern.name,
                        "order number extracted from message text"
                    );
                    return OrderLookupResult::extracted(number.as_str());
                }
            }
        }

        OrderLookupResult::customer_lookup()
    }
}

impl Default for OrderIdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}
