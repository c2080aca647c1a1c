//! Endpoint Resolution
//!
//! Locates the write (and optional read) characteristic inside a discovered
//! service list. Identifiers compare case-insensitively, and a 4-hex-digit
//! short identifier also matches its expansion into the canonical Bluetooth
//! base UUID.

use crate::error::GloveError;
use crate::infrastructure::bluetooth::transport::{CharacteristicRef, ServiceDescriptor};
use tracing::{debug, warn};

/// The resolved communication endpoint for one session. Created only by
/// [`resolve_endpoint`] and invalidated on disconnect.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub write: CharacteristicRef,
    pub read: Option<CharacteristicRef>,
}

/// Resolve the configured identifiers against a service snapshot.
///
/// The first matching service wins. Within it, the write characteristic is
/// the first identifier match for `write_id` and the read characteristic the
/// first for `read_id`; the two may be the same characteristic. A missing
/// service or write match is fatal; a missing read match degrades to a
/// write-only endpoint.
pub fn resolve_endpoint(
    services: &[ServiceDescriptor],
    service_id: &str,
    write_id: &str,
    read_id: &str,
) -> Result<Endpoint, GloveError> {
    let service = services
        .iter()
        .find(|s| identifier_matches(&s.uuid, service_id))
        .ok_or_else(|| GloveError::ResolutionFailure {
            missing: format!("service {}", service_id),
        })?;
    debug!("matched service {} for target {}", service.uuid, service_id);

    let write = service
        .characteristics
        .iter()
        .find(|c| identifier_matches(&c.uuid, write_id))
        .ok_or_else(|| GloveError::ResolutionFailure {
            missing: format!("write characteristic {} in service {}", write_id, service.uuid),
        })?;
    if !write.supports_write && !write.supports_write_without_response {
        warn!(
            "characteristic {} does not advertise write support, using it anyway",
            write.uuid
        );
    }

    let read = service
        .characteristics
        .iter()
        .find(|c| identifier_matches(&c.uuid, read_id));
    match read {
        Some(read) if !read.supports_read && !read.supports_notify => {
            warn!(
                "characteristic {} does not advertise read support, using it anyway",
                read.uuid
            );
        }
        Some(_) => {}
        None => warn!(
            "read characteristic {} not found in service {}; responses unavailable",
            read_id, service.uuid
        ),
    }

    Ok(Endpoint {
        write: CharacteristicRef {
            uuid: write.uuid.clone(),
        },
        read: read.map(|c| CharacteristicRef {
            uuid: c.uuid.clone(),
        }),
    })
}

/// True when `candidate` equals `target` case-insensitively, or when a
/// 4-hex-digit `target` expands to `candidate` under the Bluetooth base UUID.
fn identifier_matches(candidate: &str, target: &str) -> bool {
    if candidate.eq_ignore_ascii_case(target) {
        return true;
    }
    if target.len() == 4 && target.chars().all(|c| c.is_ascii_hexdigit()) {
        return candidate.eq_ignore_ascii_case(&expand_short_uuid(target));
    }
    false
}

/// Embed a 16-bit short identifier into the canonical Bluetooth base UUID.
fn expand_short_uuid(short: &str) -> String {
    format!("0000{}-0000-1000-8000-00805F9B34FB", short)
}
