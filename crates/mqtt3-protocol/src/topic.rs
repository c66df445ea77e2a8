//! Topic name and topic filter validation, plus the flat filter matcher.
//!
//! Levels are `/`-separated and compared byte-for-byte. `+` stands for
//! exactly one level, `#` for zero or more trailing levels and may only
//! appear as the final level. Topics beginning with `$` are never matched by
//! a filter whose first level is a wildcard.

use crate::error::{MqttError, Result};

/// Validates a concrete topic name: non-empty, no wildcards, no NUL.
pub fn validate_topic_name(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(MqttError::InvalidTopicName("empty topic".to_string()));
    }
    if topic.contains(['+', '#', '\0']) {
        return Err(MqttError::InvalidTopicName(topic.to_string()));
    }
    Ok(())
}

/// Validates a topic filter: non-empty, no NUL, `+` alone in its level, `#`
/// alone in the final level.
pub fn validate_topic_filter(filter: &str) -> Result<()> {
    if filter.is_empty() {
        return Err(MqttError::InvalidTopicFilter("empty filter".to_string()));
    }
    if filter.contains('\0') {
        return Err(MqttError::InvalidTopicFilter(filter.to_string()));
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        match *level {
            "+" => {}
            "#" => {
                if i != levels.len() - 1 {
                    return Err(MqttError::InvalidTopicFilter(filter.to_string()));
                }
            }
            other => {
                if other.contains(['+', '#']) {
                    return Err(MqttError::InvalidTopicFilter(filter.to_string()));
                }
            }
        }
    }
    Ok(())
}

/// Whether a concrete topic matches a filter under the wildcard rules above.
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let topic_levels: Vec<&str> = topic.split('/').collect();
    let filter_levels: Vec<&str> = filter.split('/').collect();

    for (i, level) in filter_levels.iter().enumerate() {
        match *level {
            "#" => return true,
            "+" => {
                if i >= topic_levels.len() {
                    return false;
                }
            }
            literal => {
                if topic_levels.get(i) != Some(&literal) {
                    return false;
                }
            }
        }
    }

    topic_levels.len() == filter_levels.len()
}
