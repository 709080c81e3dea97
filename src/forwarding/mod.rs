//! Forwarding header subsystem.
//!
//! # Responsibilities
//! - Parse and emit RFC 7239 `Forwarded` hops
//! - Emit the legacy `X-Forwarded-For/Host/Port/Proto/Prefix` headers
//! - Gate everything on a trusted-proxy pattern
//!
//! # Data Flow
//! ```text
//! inbound headers + peer address + original URI
//!     → trusted.rs (is the peer / an existing hop trusted?)
//!     → forwarded.rs (parse existing hops, build the new hop)
//!     → x_forwarded.rs (append/overwrite, prefix inference)
//!     → upstream request headers
//! ```
//!
//! # Design Decisions
//! - No trust pattern configured means no forwarding filters at all; an
//!   empty pattern is a configuration error, never "trust everyone"
//! - Untrusted hops are dropped rather than passed through
//! - The filters run last before dispatch so they see rewritten paths

pub mod filter;
pub mod forwarded;
pub mod trusted;
pub mod x_forwarded;

use std::sync::Arc;

use crate::config::{ConfigError, ForwardedConfig};
use crate::filter::GatewayFilter;

pub use filter::{ForwardedHeadersFilter, XForwardedHeadersFilter, HEADERS_FILTER_ORDER};
pub use forwarded::{parse_forwarded, Forwarded};
pub use trusted::TrustedProxies;

/// Build the global forwarding filters described by `config`.
pub fn build_filters(config: &ForwardedConfig) -> Result<Vec<Arc<dyn GatewayFilter>>, ConfigError> {
    let Some(pattern) = config.trusted_proxies.as_deref() else {
        tracing::info!("forwarded.trusted_proxies not set, forwarding headers disabled");
        return Ok(Vec::new());
    };
    let trusted = TrustedProxies::from_pattern(pattern)?;

    let mut filters: Vec<Arc<dyn GatewayFilter>> = Vec::new();
    if config.forwarded_enabled {
        filters.push(Arc::new(ForwardedHeadersFilter::new(trusted.clone(), config.by_enabled)));
    }
    if config.x_forwarded.enabled {
        filters.push(Arc::new(XForwardedHeadersFilter::new(trusted, config.x_forwarded.clone())));
    }
    Ok(filters)
}
