// canconsole/src/config.rs
//
// Implements the console configuration.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Console configuration.

use crate::{
    codec::Charset, display::PayloadView, heartbeat::HeartbeatSpec, queue::OverflowPolicy,
    ConfigError,
};
use embedded_can::StandardId;
use std::{path::PathBuf, time::Duration};

/// The default CAN interface
pub const DEFAULT_IFACE: &str = "can0";

/// The default bus bit rate
pub const DEFAULT_BITRATE: u32 = 500_000;

/// The default identifier of operator commands (0x07B)
pub const DEFAULT_TX_ID: u16 = 0x07B;

/// The default diagnostic log file
pub const DEFAULT_DIAG_LOG: &str = "diagnostics.log";

/// Everything the console needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// The CAN interface, like "can0"
    pub iface: String,
    /// The bit rate the interface runs at
    pub bitrate: u32,
    /// The identifier of frames sent by the operator
    pub tx_id: StandardId,
    /// The frame that signals the device is alive
    pub heartbeat: HeartbeatSpec,
    /// How long one receive call waits for a frame
    pub receive_timeout: Duration,
    /// The period of the queue drain
    pub dispatch_period: Duration,
    /// The period of the heartbeat monitor
    pub heartbeat_period: Duration,
    /// How long shutdown waits for the ingress thread
    pub shutdown_grace: Duration,
    /// The ingress queue capacity, in frames
    pub queue_capacity: usize,
    /// What a full ingress queue drops
    pub overflow: OverflowPolicy,
    /// The maximum number of display lines
    pub display_ceiling: usize,
    /// The character set of command text
    pub charset: Charset,
    /// How received payloads are shown
    pub payload_view: PayloadView,
    /// Where faults are persisted
    pub diag_log: PathBuf,
}

impl Config {
    /// Checks that the settings can work together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("receive_timeout", self.receive_timeout),
            ("dispatch_period", self.dispatch_period),
            ("heartbeat_period", self.heartbeat_period),
            ("shutdown_grace", self.shutdown_grace),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroDuration(*name));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("queue_capacity"));
        }
        if self.display_ceiling == 0 {
            return Err(ConfigError::ZeroCapacity("display_ceiling"));
        }

        if self.dispatch_period >= self.heartbeat_period {
            return Err(ConfigError::DispatchTooSlow {
                dispatch: self.dispatch_period,
                heartbeat: self.heartbeat_period,
            });
        }
        if self.receive_timeout > self.shutdown_grace {
            return Err(ConfigError::GraceTooShort {
                timeout: self.receive_timeout,
                grace: self.shutdown_grace,
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            iface: DEFAULT_IFACE.into(),
            bitrate: DEFAULT_BITRATE,
            tx_id: StandardId::new(DEFAULT_TX_ID).unwrap_or(StandardId::ZERO),
            heartbeat: HeartbeatSpec::default(),
            receive_timeout: Duration::from_millis(100),
            dispatch_period: Duration::from_millis(100),
            heartbeat_period: Duration::from_millis(600),
            shutdown_grace: Duration::from_millis(500),
            queue_capacity: 256,
            overflow: OverflowPolicy::default(),
            display_ceiling: 200,
            charset: Charset::default(),
            payload_view: PayloadView::default(),
            diag_log: DEFAULT_DIAG_LOG.into(),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!("can0", cfg.iface);
        assert_eq!(500_000, cfg.bitrate);
        assert_eq!(0x07B, cfg.tx_id.as_raw());
        assert_eq!(HeartbeatSpec::default(), cfg.heartbeat);
        assert_eq!(200, cfg.display_ceiling);
        assert_eq!(OverflowPolicy::DropOldest, cfg.overflow);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let cfg = Config {
            heartbeat_period: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(Err(ConfigError::ZeroDuration("heartbeat_period")), cfg.validate());

        let cfg = Config {
            queue_capacity: 0,
            ..Config::default()
        };
        assert_eq!(Err(ConfigError::ZeroCapacity("queue_capacity")), cfg.validate());

        let cfg = Config {
            display_ceiling: 0,
            ..Config::default()
        };
        assert_eq!(Err(ConfigError::ZeroCapacity("display_ceiling")), cfg.validate());
    }

    #[test]
    fn test_period_order() {
        let cfg = Config {
            dispatch_period: Duration::from_millis(600),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::DispatchTooSlow { .. })));

        let cfg = Config {
            receive_timeout: Duration::from_secs(1),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::GraceTooShort { .. })));
    }
}
