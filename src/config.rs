use std::{fmt, net::IpAddr, path::PathBuf, time::Duration};

use crate::constants::{
    DEFAULT_COUNT, DEFAULT_INTERVAL, DEFAULT_PAYLOAD_SIZE, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_TTL,
    MAX_PAYLOAD_SIZE,
};
use crate::error::{Error, Result};

/// Address family a host name must resolve to.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum ProtocolPreference {
    #[default]
    Any,
    V4,
    V6,
}

impl ProtocolPreference {
    pub fn matches(self, address: &IpAddr) -> bool {
        match self {
            ProtocolPreference::Any => true,
            ProtocolPreference::V4 => address.is_ipv4(),
            ProtocolPreference::V6 => address.is_ipv6(),
        }
    }
}

impl fmt::Display for ProtocolPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolPreference::Any => "any",
            ProtocolPreference::V4 => "IPv4",
            ProtocolPreference::V6 => "IPv6",
        };
        f.write_str(name)
    }
}

/// Settings shared read-only by the controller and every probe task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub payload_size: usize,
    /// Echo requests per destination; ignored when `endless` is set.
    pub count: u64,
    pub endless: bool,
    /// Delay between two consecutive echo requests to one destination.
    pub interval: Duration,
    pub response_timeout: Duration,
    pub ttl: u8,
    pub dont_fragment: bool,
    pub protocol: ProtocolPreference,
    /// Suppresses the per-probe console lines, not the summary.
    pub quiet: bool,
    pub log_dir: Option<PathBuf>,
}

impl ProbeConfig {
    /// Whether another echo request is due after `sent` requests.
    pub fn wants_more(&self, sent: u64) -> bool {
        self.endless || sent < self.count
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            payload_size: DEFAULT_PAYLOAD_SIZE,
            count: DEFAULT_COUNT,
            endless: false,
            interval: DEFAULT_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            ttl: DEFAULT_TTL,
            dont_fragment: false,
            protocol: ProtocolPreference::Any,
            quiet: false,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProbeConfigBuilder {
    config: ProbeConfig,
}

impl ProbeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload_size(mut self, payload_size: usize) -> Self {
        self.config.payload_size = payload_size;
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.config.count = count;
        self
    }

    pub fn with_endless(mut self, endless: bool) -> Self {
        self.config.endless = endless;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.config.ttl = ttl;
        self
    }

    pub fn with_dont_fragment(mut self, dont_fragment: bool) -> Self {
        self.config.dont_fragment = dont_fragment;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolPreference) -> Self {
        self.config.protocol = protocol;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.config.quiet = quiet;
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = Some(log_dir.into());
        self
    }

    /// Validates the collected settings.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when the payload exceeds 65527 bytes, the TTL is zero
    /// or a bounded run would send no request at all.
    pub fn build(self) -> Result<ProbeConfig> {
        let config = self.config;
        if config.payload_size > MAX_PAYLOAD_SIZE {
            return Err(Error::Config(format!(
                "payload size {} exceeds the maximum of {} bytes",
                config.payload_size, MAX_PAYLOAD_SIZE
            )));
        }
        if config.ttl == 0 {
            return Err(Error::Config("TTL must be at least 1".into()));
        }
        if !config.endless && config.count == 0 {
            return Err(Error::Config("request count must be at least 1".into()));
        }
        Ok(config)
    }
}
