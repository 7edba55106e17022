use pawflow_models::core::ActionConfig;

pub(crate) fn str_param<'a>(config: &'a ActionConfig, key: &str) -> Option<&'a str> {
    config.get(key).and_then(|value| value.as_str())
}

pub(crate) fn bool_param(config: &ActionConfig, key: &str, default: bool) -> bool {
    config
        .get(key)
        .and_then(|value| value.as_bool())
        .unwrap_or(default)
}

pub(crate) fn u64_param(config: &ActionConfig, key: &str, default: u64) -> u64 {
    config
        .get(key)
        .and_then(|value| value.as_u64())
        .unwrap_or(default)
}

pub(crate) fn require_str(config: &ActionConfig, key: &str) -> Result<(), String> {
    match str_param(config, key) {
        Some(value) if !value.is_empty() => Ok(()),
        _ => Err(format!("{key} is required")),
    }
}
