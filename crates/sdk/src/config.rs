//! SDK options.
//!
//! Options are built through [`RtgsSdkOptions::builder`] or loaded from TOML
//! with [`RtgsSdkOptions::from_toml_str`]; both paths validate.
//!
//! ```toml
//! rtgs-global-id = "RTGS:GB177550GB"
//! remote-host-address = "https://rtgs.example:4430"
//! wait-for-acknowledgement-ms = 5000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

/// Default bound on a publisher's wait for an acknowledgement.
pub const DEFAULT_WAIT_FOR_ACKNOWLEDGEMENT: Duration = Duration::from_secs(10);

/// Smallest accepted acknowledgement wait.
pub const MIN_WAIT_FOR_ACKNOWLEDGEMENT: Duration = Duration::from_secs(1);

/// Largest accepted acknowledgement wait.
pub const MAX_WAIT_FOR_ACKNOWLEDGEMENT: Duration = Duration::from_secs(30);

/// Default interval between HTTP/2 keep-alive pings.
pub const DEFAULT_KEEP_ALIVE_PING_DELAY: Duration = Duration::from_secs(30);

/// Default time to wait for a keep-alive ping response.
pub const DEFAULT_KEEP_ALIVE_PING_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on establishing the hub connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Smallest accepted connect timeout.
pub const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Smallest accepted keep-alive delay and timeout.
pub const MIN_KEEP_ALIVE: Duration = Duration::from_secs(1);

/// Default capacity of a stream's write-side channel.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 16;

/// Invalid SDK options.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rtgs global id must not be empty")]
    MissingRtgsGlobalId,

    #[error("invalid remote host address {address:?}: {reason}")]
    InvalidRemoteHostAddress { address: String, reason: String },

    #[error("wait for acknowledgement duration must be between 1s and 30s, got {0:?}")]
    WaitForAcknowledgementOutOfRange(Duration),

    #[error("{name} must be at least 1s, got {actual:?}")]
    KeepAliveTooShort { name: &'static str, actual: Duration },

    #[error("connect timeout must be at least 1s, got {0:?}")]
    ConnectTimeoutTooShort(Duration),

    #[error("outbound buffer must hold at least one frame")]
    ZeroOutboundBuffer,

    #[error("failed to parse options: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_wait_for_acknowledgement() -> Duration {
    DEFAULT_WAIT_FOR_ACKNOWLEDGEMENT
}

fn default_keep_alive_ping_delay() -> Duration {
    DEFAULT_KEEP_ALIVE_PING_DELAY
}

fn default_keep_alive_ping_timeout() -> Duration {
    DEFAULT_KEEP_ALIVE_PING_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_outbound_buffer() -> usize {
    DEFAULT_OUTBOUND_BUFFER
}

/// Options consumed by the publisher, subscriber and gRPC connector.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RtgsSdkOptions {
    /// Identifier of the institution, sent with every stream.
    rtgs_global_id: String,

    /// Address of the hub, e.g. `https://rtgs.example:4430`.
    remote_host_address: String,

    /// Bound on a publisher's wait for an acknowledgement.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(
        rename = "wait-for-acknowledgement-ms",
        default = "default_wait_for_acknowledgement"
    )]
    wait_for_acknowledgement_duration: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(
        rename = "keep-alive-ping-delay-ms",
        default = "default_keep_alive_ping_delay"
    )]
    keep_alive_ping_delay: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(
        rename = "keep-alive-ping-timeout-ms",
        default = "default_keep_alive_ping_timeout"
    )]
    keep_alive_ping_timeout: Duration,

    /// Bound on establishing the connection to the hub.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "connect-timeout-ms", default = "default_connect_timeout")]
    connect_timeout: Duration,

    /// Send the institution id as `bankdid` instead of `rtgs-global-id`.
    #[serde(default)]
    use_legacy_bank_did_header: bool,

    #[serde(default = "default_outbound_buffer")]
    outbound_buffer: usize,
}

impl RtgsSdkOptions {
    /// Start building options for an institution and hub address.
    pub fn builder(
        rtgs_global_id: impl Into<String>,
        remote_host_address: impl Into<String>,
    ) -> RtgsSdkOptionsBuilder {
        RtgsSdkOptionsBuilder {
            options: Self {
                rtgs_global_id: rtgs_global_id.into(),
                remote_host_address: remote_host_address.into(),
                wait_for_acknowledgement_duration: DEFAULT_WAIT_FOR_ACKNOWLEDGEMENT,
                keep_alive_ping_delay: DEFAULT_KEEP_ALIVE_PING_DELAY,
                keep_alive_ping_timeout: DEFAULT_KEEP_ALIVE_PING_TIMEOUT,
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                use_legacy_bank_did_header: false,
                outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            },
        }
    }

    /// Parse and validate options from a TOML document.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(document)?;
        options.validate()?;
        Ok(options)
    }

    pub fn rtgs_global_id(&self) -> &str {
        &self.rtgs_global_id
    }

    pub fn remote_host_address(&self) -> &str {
        &self.remote_host_address
    }

    pub fn wait_for_acknowledgement_duration(&self) -> Duration {
        self.wait_for_acknowledgement_duration
    }

    pub fn keep_alive_ping_delay(&self) -> Duration {
        self.keep_alive_ping_delay
    }

    pub fn keep_alive_ping_timeout(&self) -> Duration {
        self.keep_alive_ping_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn use_legacy_bank_did_header(&self) -> bool {
        self.use_legacy_bank_did_header
    }

    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rtgs_global_id.trim().is_empty() {
            return Err(ConfigError::MissingRtgsGlobalId);
        }

        let invalid_address = |reason: String| ConfigError::InvalidRemoteHostAddress {
            address: self.remote_host_address.clone(),
            reason,
        };
        let uri: http::Uri = self
            .remote_host_address
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid_address(e.to_string()))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => return Err(invalid_address("scheme must be http or https".into())),
        }
        if uri.host().is_none() {
            return Err(invalid_address("missing host".into()));
        }

        if !(MIN_WAIT_FOR_ACKNOWLEDGEMENT..=MAX_WAIT_FOR_ACKNOWLEDGEMENT)
            .contains(&self.wait_for_acknowledgement_duration)
        {
            return Err(ConfigError::WaitForAcknowledgementOutOfRange(
                self.wait_for_acknowledgement_duration,
            ));
        }
        if self.keep_alive_ping_delay < MIN_KEEP_ALIVE {
            return Err(ConfigError::KeepAliveTooShort {
                name: "keep alive ping delay",
                actual: self.keep_alive_ping_delay,
            });
        }
        if self.keep_alive_ping_timeout < MIN_KEEP_ALIVE {
            return Err(ConfigError::KeepAliveTooShort {
                name: "keep alive ping timeout",
                actual: self.keep_alive_ping_timeout,
            });
        }
        if self.connect_timeout < MIN_CONNECT_TIMEOUT {
            return Err(ConfigError::ConnectTimeoutTooShort(self.connect_timeout));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::ZeroOutboundBuffer);
        }

        Ok(())
    }
}

/// Builder for [`RtgsSdkOptions`].
#[derive(Debug, Clone)]
pub struct RtgsSdkOptionsBuilder {
    options: RtgsSdkOptions,
}

impl RtgsSdkOptionsBuilder {
    /// Bound on a publisher's wait for an acknowledgement (1s to 30s).
    pub fn wait_for_acknowledgement_duration(mut self, duration: Duration) -> Self {
        self.options.wait_for_acknowledgement_duration = duration;
        self
    }

    pub fn keep_alive_ping_delay(mut self, delay: Duration) -> Self {
        self.options.keep_alive_ping_delay = delay;
        self
    }

    pub fn keep_alive_ping_timeout(mut self, timeout: Duration) -> Self {
        self.options.keep_alive_ping_timeout = timeout;
        self
    }

    /// Bound on establishing the hub connection (at least 1s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Identify the institution with the legacy `bankdid` header.
    pub fn use_legacy_bank_did_header(mut self, enabled: bool) -> Self {
        self.options.use_legacy_bank_did_header = enabled;
        self
    }

    pub fn outbound_buffer(mut self, capacity: usize) -> Self {
        self.options.outbound_buffer = capacity;
        self
    }

    /// Validate and return the options.
    pub fn build(self) -> Result<RtgsSdkOptions, ConfigError> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUB: &str = "https://rtgs.example:4430";

    #[test]
    fn test_builder_defaults() {
        let options = RtgsSdkOptions::builder("RTGS:GB177550GB", HUB).build().unwrap();
        assert_eq!(
            options.wait_for_acknowledgement_duration(),
            DEFAULT_WAIT_FOR_ACKNOWLEDGEMENT
        );
        assert_eq!(options.keep_alive_ping_delay(), DEFAULT_KEEP_ALIVE_PING_DELAY);
        assert!(!options.use_legacy_bank_did_header());
        assert_eq!(options.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(options.outbound_buffer(), DEFAULT_OUTBOUND_BUFFER);
    }

    #[test]
    fn test_wait_bounds_are_inclusive() {
        for wait in [MIN_WAIT_FOR_ACKNOWLEDGEMENT, MAX_WAIT_FOR_ACKNOWLEDGEMENT] {
            assert!(
                RtgsSdkOptions::builder("id", HUB)
                    .wait_for_acknowledgement_duration(wait)
                    .build()
                    .is_ok()
            );
        }
        for wait in [Duration::from_millis(999), Duration::from_millis(30_001)] {
            assert!(matches!(
                RtgsSdkOptions::builder("id", HUB)
                    .wait_for_acknowledgement_duration(wait)
                    .build(),
                Err(ConfigError::WaitForAcknowledgementOutOfRange(d)) if d == wait
            ));
        }
    }

    #[test]
    fn test_rejects_bad_identity_and_address() {
        assert!(matches!(
            RtgsSdkOptions::builder("  ", HUB).build(),
            Err(ConfigError::MissingRtgsGlobalId)
        ));
        assert!(matches!(
            RtgsSdkOptions::builder("id", "ftp://rtgs.example").build(),
            Err(ConfigError::InvalidRemoteHostAddress { .. })
        ));
        assert!(matches!(
            RtgsSdkOptions::builder("id", "not a uri").build(),
            Err(ConfigError::InvalidRemoteHostAddress { .. })
        ));
    }

    #[test]
    fn test_rejects_short_keep_alive() {
        let result = RtgsSdkOptions::builder("id", HUB)
            .keep_alive_ping_timeout(Duration::from_millis(10))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::KeepAliveTooShort { name: "keep alive ping timeout", .. })
        ));
    }

    #[test]
    fn test_connect_timeout_bound() {
        assert!(matches!(
            RtgsSdkOptions::builder("id", HUB)
                .connect_timeout(Duration::from_millis(500))
                .build(),
            Err(ConfigError::ConnectTimeoutTooShort(d)) if d == Duration::from_millis(500)
        ));

        let options = RtgsSdkOptions::from_toml_str(
            r#"
            rtgs-global-id = "RTGS:GB177550GB"
            remote-host-address = "https://rtgs.example:4430"
            connect-timeout-ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(options.connect_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_from_toml() {
        let options = RtgsSdkOptions::from_toml_str(
            r#"
            rtgs-global-id = "RTGS:GB177550GB"
            remote-host-address = "https://rtgs.example:4430"
            wait-for-acknowledgement-ms = 5000
            use-legacy-bank-did-header = true
            "#,
        )
        .unwrap();

        assert_eq!(
            options.wait_for_acknowledgement_duration(),
            Duration::from_secs(5)
        );
        assert_eq!(options.keep_alive_ping_timeout(), DEFAULT_KEEP_ALIVE_PING_TIMEOUT);
        assert!(options.use_legacy_bank_did_header());
    }

    #[test]
    fn test_from_toml_validates() {
        let result = RtgsSdkOptions::from_toml_str(
            r#"
            rtgs-global-id = "RTGS:GB177550GB"
            remote-host-address = "https://rtgs.example:4430"
            wait-for-acknowledgement-ms = 60000
            "#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::WaitForAcknowledgementOutOfRange(_))
        ));

        assert!(matches!(
            RtgsSdkOptions::from_toml_str("rtgs-global-id = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
