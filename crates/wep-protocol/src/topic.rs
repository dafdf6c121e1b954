//! Bus topic construction and inbound topic parsing
//!
//! All topics live under the `wepower_iot/` prefix. Device-addressed topics
//! use the device slug: the device path with every non-alphanumeric
//! character folded to `_` and leading underscores trimmed, so
//! `/dev/ttyUSB0` becomes `dev_ttyUSB0`.

/// Root of the topic namespace
pub const TOPIC_PREFIX: &str = "wepower_iot";

/// Derive the filesystem-safe slug for a device path
pub fn device_slug(device_path: &str) -> String {
    let slug: String = device_path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

/// `wepower_iot/discovery/{fingerprint}`
pub fn discovery(fingerprint: &str) -> String {
    format!("{TOPIC_PREFIX}/discovery/{fingerprint}")
}

/// `wepower_iot/{device_id}/data`
pub fn data(device_id: &str) -> String {
    format!("{TOPIC_PREFIX}/{device_id}/data")
}

/// `wepower_iot/{device_id}/status`
pub fn status(device_id: &str) -> String {
    format!("{TOPIC_PREFIX}/{device_id}/status")
}

/// `wepower_iot/{device_id}/heartbeat`
pub fn heartbeat(device_id: &str) -> String {
    format!("{TOPIC_PREFIX}/{device_id}/heartbeat")
}

/// `wepower_iot/{device_id}/identification`
pub fn identification(device_id: &str) -> String {
    format!("{TOPIC_PREFIX}/{device_id}/identification")
}

/// `wepower_iot/registry/summary`
pub fn registry_summary() -> String {
    format!("{TOPIC_PREFIX}/registry/summary")
}

/// `wepower_iot/registry/devices/{device_slug}/status`
pub fn registry_device_status(device_slug: &str) -> String {
    format!("{TOPIC_PREFIX}/registry/devices/{device_slug}/status")
}

/// Wildcard subscription for inbound commands
pub fn command_subscription() -> String {
    format!("{TOPIC_PREFIX}/+/command")
}

/// Wildcard subscription for inbound device configuration
pub fn config_subscription() -> String {
    format!("{TOPIC_PREFIX}/+/config")
}

/// A recognized inbound topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTopic {
    /// `wepower_iot/{device_id}/command`
    Command { device_id: String },
    /// `wepower_iot/{device_id}/config`
    Config { device_id: String },
}

/// Parse an inbound topic into its addressed form
///
/// Returns None for topics outside the inbound contract, including the
/// daemon's own outbound topics echoed back by the broker.
pub fn parse_inbound(topic: &str) -> Option<InboundTopic> {
    let mut parts = topic.split('/');
    if parts.next()? != TOPIC_PREFIX {
        return None;
    }
    let device_id = parts.next()?;
    let kind = parts.next()?;
    if parts.next().is_some() || device_id.is_empty() {
        return None;
    }
    // Reserved segments are never device ids
    if device_id == "discovery" || device_id == "registry" {
        return None;
    }
    match kind {
        "command" => Some(InboundTopic::Command {
            device_id: device_id.to_string(),
        }),
        "config" => Some(InboundTopic::Config {
            device_id: device_id.to_string(),
        }),
        _ => None,
    }
}
