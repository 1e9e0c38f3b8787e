//! Demo override table (spec §4.F "Demo override"): a static mapping from
//! normalized queries to deterministic scores, used to give predictable
//! demo-mode results without engaging the broker/agents.

#[derive(Debug, Clone, Copy)]
pub struct DemoOverride {
    pub bot: f64,
    pub authenticity: u8,
}

const TABLE: &[(&str, DemoOverride)] = &[
    ("stanley cup", DemoOverride { bot: 62.0, authenticity: 34 }),
    ("$buzz", DemoOverride { bot: 87.0, authenticity: 12 }),
    ("prime energy", DemoOverride { bot: 71.0, authenticity: 29 }),
];

/// Match a normalized query against the demo table. Queries are matched by
/// substring rather than exact equality — spec §8 scenario S1 submits
/// "Stanley Cup tumbler" and expects it to hit the "stanley cup" entry.
pub fn lookup(normalized_query: &str) -> Option<DemoOverride> {
    let q = normalized_query.to_lowercase();
    TABLE
        .iter()
        .find(|(key, _)| q.contains(key))
        .map(|(_, ov)| *ov)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_queries() {
        assert!(lookup("stanley cup").is_some());
        assert!(lookup("Stanley Cup").is_some());
        assert!(lookup("$buzz").is_some());
        assert!(lookup("prime energy").is_some());
    }

    #[test]
    fn matches_query_containing_a_known_key() {
        // spec §8 S1: "Stanley Cup tumbler" must still hit "stanley cup".
        let ov = lookup("Stanley Cup tumbler").expect("should match");
        assert_eq!(ov.bot, 62.0);
        assert_eq!(ov.authenticity, 34);
    }

    #[test]
    fn unknown_query_has_no_override() {
        assert!(lookup("some random product").is_none());
    }
}
