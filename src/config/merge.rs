use super::{Config, ConfigLayer};

pub const ENV_LIST_CHANGES_ONLY: &str = "LIVEFILTER_LIST_CHANGES_ONLY";
pub const ENV_MAX_SUBSCRIBERS: &str = "LIVEFILTER_MAX_SUBSCRIBERS";
pub const ENV_SUBSCRIBER_QUEUE: &str = "LIVEFILTER_SUBSCRIBER_QUEUE";

pub fn merge_layers(user: Option<ConfigLayer>, project: Option<ConfigLayer>) -> Config {
    let mut config = Config::default();
    if let Some(layer) = user {
        layer.apply_to(&mut config);
    }
    if let Some(layer) = project {
        layer.apply_to(&mut config);
    }
    config
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_env_overrides_with(config, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and
/// ignored.
pub fn apply_env_overrides_with(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(raw) = lookup(ENV_LIST_CHANGES_ONLY) {
        match parse_flag(&raw) {
            Some(enabled) => config.defaults.list_changes_only = enabled,
            None => tracing::warn!("invalid {ENV_LIST_CHANGES_ONLY}, ignoring: {raw:?}"),
        }
    }

    if let Some(value) = parse_count(&lookup, ENV_MAX_SUBSCRIBERS) {
        config.limits.max_view_subscribers = value;
    }

    if let Some(value) = parse_count(&lookup, ENV_SUBSCRIBER_QUEUE) {
        config.limits.subscriber_queue_events = value;
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_count(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<usize>() {
        Ok(0) => {
            tracing::warn!("invalid {key}, ignoring: must be > 0");
            None
        }
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("invalid {key}, ignoring: {err}");
            None
        }
    }
}
