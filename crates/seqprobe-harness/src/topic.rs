//! MQTT topic filter matching.

/// Whether `topic` matches the subscription `filter`.
///
/// `+` matches exactly one level, `#` matches the remaining levels (including
/// none). Anything else must match the level literally.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) | (None, None) => return true,
            (Some("+"), Some(_)) => {},
            (Some(f), Some(t)) if f == t => {},
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_filters() {
        assert!(topic_matches("probe/1", "probe/1"));
        assert!(!topic_matches("probe/1", "probe/10"));
        assert!(!topic_matches("probe/1", "probe/1/x"));
        assert!(!topic_matches("probe/1/x", "probe/1"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(topic_matches("probe/+", "probe/7"));
        assert!(topic_matches("+/7", "probe/7"));
        assert!(!topic_matches("probe/+", "probe/7/x"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(topic_matches("#", "anything/at/all"));
        assert!(topic_matches("probe/#", "probe/1/2"));
        assert!(topic_matches("probe/#", "probe"));
        assert!(!topic_matches("probe/#", "other/1"));
    }

    #[test]
    fn prefix_without_separator() {
        // Publisher topics are `prefix + id`, so a prefix without a trailing
        // slash yields single-level topics.
        assert!(topic_matches("sensor1", "sensor1"));
        assert!(!topic_matches("sensor1", "sensor12"));
    }
}
