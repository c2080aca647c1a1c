//! Device Discovery
//!
//! Finds the glove by its advertised name within a bounded scan window. An
//! empty scan is a normal outcome; callers fall back to the configured
//! static address.

use crate::domain::settings::GloveSettings;
use crate::error::GloveError;
use crate::infrastructure::bluetooth::transport::{DeviceIdentity, Transport};
use std::time::Duration;
use tracing::{info, warn};

/// Scan for a device advertising `name`.
pub async fn discover_by_name<T: Transport>(
    transport: &T,
    name: &str,
    timeout: Duration,
) -> Result<Option<DeviceIdentity>, GloveError> {
    info!("scanning for {:?} ({} s window)", name, timeout.as_secs());
    let found = transport.scan(name, timeout).await?;
    match &found {
        Some(identity) => info!("found {:?} at {}", name, identity),
        None => warn!(
            "no device named {:?} found within {} s",
            name,
            timeout.as_secs()
        ),
    }
    Ok(found)
}

/// Discover by the configured name, falling back to the static address when
/// the scan window expires without a match.
pub async fn discover_or_fallback<T: Transport>(
    transport: &T,
    settings: &GloveSettings,
) -> Result<DeviceIdentity, GloveError> {
    let timeout = Duration::from_secs(settings.scan_timeout_secs);
    if let Some(identity) = discover_by_name(transport, &settings.device_name, timeout).await? {
        return Ok(identity);
    }
    info!(
        "falling back to configured address {}",
        settings.fallback_address
    );
    Ok(DeviceIdentity::new(settings.fallback_address.clone()))
}
