//! Runtime-configurable options for scatter plans and the local mesh.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `VECSCATTER_`) or by constructing a custom `ScatterConfig`.

use crate::types::TransportKind;
use std::time::Duration;

/// Options applied when a scatter plan is built.
#[derive(Debug, Clone)]
pub struct ScatterConfig {
    /// Communication strategy. Fixed for the lifetime of a plan.
    pub transport: TransportKind,

    /// In `begin`, issue remote sends before the local copy instead of
    /// after it.
    pub send_first: bool,

    /// Wait for receives in peer-rank order instead of arrival order, so
    /// `Add` results are bitwise reproducible across runs.
    pub reproduce: bool,

    /// Stable-sort each outgoing segment (and the local plan) by source
    /// offset during planning.
    pub local_reorder: bool,

    /// Timeout for individual send/recv operations.
    pub collective_timeout: Duration,

    /// Timeout for barriers (ready-receiver setup and window fences).
    pub barrier_timeout: Duration,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::PointToPoint,
            send_first: false,
            reproduce: false,
            local_reorder: true,
            collective_timeout: Duration::from_secs(30),
            barrier_timeout: Duration::from_secs(30),
        }
    }
}

impl ScatterConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `VECSCATTER_TRANSPORT` (`point-to-point`, `ready-receiver`, `alltoallv`, `window`)
    /// - `VECSCATTER_SENDFIRST`
    /// - `VECSCATTER_REPRODUCE`
    /// - `VECSCATTER_LOCAL_REORDER`
    /// - `VECSCATTER_COLLECTIVE_TIMEOUT_SECS`
    /// - `VECSCATTER_BARRIER_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("VECSCATTER_TRANSPORT") {
            match v.parse::<TransportKind>() {
                Ok(t) => cfg.transport = t,
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring VECSCATTER_TRANSPORT"),
            }
        }
        if let Some(b) = lookup("VECSCATTER_SENDFIRST").and_then(|v| parse_flag(&v)) {
            cfg.send_first = b;
        }
        if let Some(b) = lookup("VECSCATTER_REPRODUCE").and_then(|v| parse_flag(&v)) {
            cfg.reproduce = b;
        }
        if let Some(b) = lookup("VECSCATTER_LOCAL_REORDER").and_then(|v| parse_flag(&v)) {
            cfg.local_reorder = b;
        }
        if let Some(d) = lookup("VECSCATTER_COLLECTIVE_TIMEOUT_SECS").and_then(|v| parse_secs(&v)) {
            cfg.collective_timeout = d;
        }
        if let Some(d) = lookup("VECSCATTER_BARRIER_TIMEOUT_SECS").and_then(|v| parse_secs(&v)) {
            cfg.barrier_timeout = d;
        }

        cfg
    }

    /// Builder-style transport override.
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(value = %v, "ignoring unparseable boolean option");
            None
        }
    }
}

fn parse_secs(v: &str) -> Option<Duration> {
    match v.trim().parse::<u64>() {
        Ok(s) => Some(Duration::from_secs(s)),
        Err(e) => {
            tracing::warn!(value = %v, error = %e, "ignoring unparseable timeout option");
            None
        }
    }
}
