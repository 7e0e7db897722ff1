//! Client configuration and controller capability model.

use crate::error::{DriverError, DriverResult};
use crate::protocol::frame::area::MemoryArea;
use serde::{Deserialize, Serialize};

/// Default FINS port for both transports.
pub const DEFAULT_PORT: u16 = 9600;

/// Transport carrying FINS frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transport {
    /// FINS wrapped in the 16-byte TCP envelope with node negotiation.
    Tcp,
    /// Raw FINS datagrams.
    #[default]
    Udp,
}

/// Detected controller family.
///
/// Derived from the model string returned by a controller data read and fixed
/// for the lifetime of the session. The per-model limits below mirror the
/// published area sizes and frame capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlcType {
    Nj101,
    Nj301,
    Nj501,
    Nx1p2,
    Nx102,
    Nx701,
    Ny512,
    Ny532,
    /// NJ/NX/NY family controller without a more specific match.
    NjNxNySeries,
    Cj2,
    Cp1,
    /// C-family controller without a more specific match.
    CSeries,
    Unknown,
}

impl PlcType {
    /// Classify a controller model string by its ASCII prefix.
    pub fn classify(model: &str) -> Self {
        let m = model.trim().to_ascii_uppercase();
        const PREFIXES: &[(&str, PlcType)] = &[
            ("NJ101", PlcType::Nj101),
            ("NJ301", PlcType::Nj301),
            ("NJ501", PlcType::Nj501),
            ("NX1P2", PlcType::Nx1p2),
            ("NX102", PlcType::Nx102),
            ("NX701", PlcType::Nx701),
            ("NY512", PlcType::Ny512),
            ("NY532", PlcType::Ny532),
            ("NJ", PlcType::NjNxNySeries),
            ("NX", PlcType::NjNxNySeries),
            ("NY", PlcType::NjNxNySeries),
            ("CJ2", PlcType::Cj2),
            ("CP1", PlcType::Cp1),
            ("C", PlcType::CSeries),
        ];
        for (prefix, plc) in PREFIXES {
            if m.starts_with(prefix) {
                return *plc;
            }
        }
        PlcType::Unknown
    }

    /// Maximum word count for a single memory area read.
    pub fn max_read_words(self) -> u16 {
        match self {
            PlcType::Cp1 => 499,
            _ => 999,
        }
    }

    /// Maximum word count for a single memory area write.
    pub fn max_write_words(self) -> u16 {
        match self {
            PlcType::Cp1 => 496,
            _ => 996,
        }
    }

    /// Whether single bits in data memory can be addressed.
    pub fn supports_bit_data_memory(self) -> bool {
        !matches!(self, PlcType::Cp1)
    }

    /// Whether the auxiliary area exists on this controller.
    pub fn supports_auxiliary(self) -> bool {
        matches!(self, PlcType::CSeries | PlcType::Cp1 | PlcType::Cj2)
    }

    /// First invalid word index for an area, `None` when the area does not
    /// exist on this controller.
    pub fn area_ceiling(self, area: MemoryArea) -> Option<u32> {
        match area {
            MemoryArea::DataMemory => Some(match self {
                PlcType::Nx1p2 => 16_000,
                _ => 32_768,
            }),
            MemoryArea::CommonIo => Some(6_144),
            MemoryArea::Work => Some(512),
            MemoryArea::Holding => Some(1_536),
            MemoryArea::Auxiliary => {
                if !self.supports_auxiliary() {
                    return None;
                }
                Some(match self {
                    PlcType::Cj2 => 11_536,
                    _ => 960,
                })
            }
        }
    }

    /// Whether the cycle time read service is available.
    ///
    /// NX and NY controllers reject it; the generic NJ/NX/NY classification
    /// cannot be told apart by prefix, so it is rejected there as well.
    pub fn supports_cycle_time(self) -> bool {
        matches!(
            self,
            PlcType::Nj101
                | PlcType::Nj301
                | PlcType::Nj501
                | PlcType::Cj2
                | PlcType::Cp1
                | PlcType::CSeries
        )
    }
}

/// Connection parameters, immutable once the client is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinsClientConfig {
    /// PLC host name or address.
    pub host: String,
    /// PLC port.
    #[serde(default = "FinsClientConfig::default_port")]
    pub port: u16,
    /// Source FINS node id, 1 to 254.
    pub local_node_id: u8,
    /// Destination FINS node id, 1 to 254, distinct from the local id.
    pub remote_node_id: u8,
    /// Transport selection.
    #[serde(default)]
    pub transport: Transport,
    /// Per-request deadline in milliseconds.
    #[serde(default = "FinsClientConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Additional attempts beyond the first on transient failure.
    #[serde(default = "FinsClientConfig::default_retries")]
    pub retries: u32,
    /// Sleep between poll cycles in milliseconds.
    #[serde(default = "FinsClientConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Channel establishment deadline in milliseconds.
    #[serde(default = "FinsClientConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl FinsClientConfig {
    fn default_port() -> u16 {
        DEFAULT_PORT
    }

    fn default_timeout_ms() -> u64 {
        2_000
    }

    fn default_retries() -> u32 {
        1
    }

    fn default_poll_interval_ms() -> u64 {
        100
    }

    fn default_connect_timeout_ms() -> u64 {
        5_000
    }

    /// Create a configuration with defaults for everything but the endpoint
    /// and node addressing.
    pub fn new(host: impl Into<String>, local_node_id: u8, remote_node_id: u8) -> Self {
        Self {
            host: host.into(),
            port: Self::default_port(),
            local_node_id,
            remote_node_id,
            transport: Transport::default(),
            timeout_ms: Self::default_timeout_ms(),
            retries: Self::default_retries(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_connect_timeout_ms(mut self, connect_timeout_ms: u64) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self
    }

    /// Validate node addressing and timings before any socket is touched.
    pub fn validate(&self) -> DriverResult<()> {
        for (name, id) in [
            ("localNodeId", self.local_node_id),
            ("remoteNodeId", self.remote_node_id),
        ] {
            if id == 0 || id == 255 {
                return Err(DriverError::ConfigInvalid(format!(
                    "{name} must be in 1..=254, got {id}"
                )));
            }
        }
        if self.local_node_id == self.remote_node_id {
            return Err(DriverError::ConfigInvalid(format!(
                "localNodeId and remoteNodeId must differ, both are {}",
                self.local_node_id
            )));
        }
        if self.host.trim().is_empty() {
            return Err(DriverError::ConfigInvalid("host must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(DriverError::ConfigInvalid(
                "timeoutMs must be positive".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(DriverError::ConfigInvalid(
                "pollIntervalMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_by_prefix() {
        assert_eq!(PlcType::classify("NJ501-1300"), PlcType::Nj501);
        assert_eq!(PlcType::classify("NX1P2-9024DT"), PlcType::Nx1p2);
        assert_eq!(PlcType::classify("NX102-1200"), PlcType::Nx102);
        assert_eq!(PlcType::classify("NY512-1300"), PlcType::Ny512);
        assert_eq!(PlcType::classify("NX502"), PlcType::NjNxNySeries);
        assert_eq!(PlcType::classify("CJ2M-CPU33"), PlcType::Cj2);
        assert_eq!(PlcType::classify("CP1H-X40DR-A"), PlcType::Cp1);
        assert_eq!(PlcType::classify("CS1G-CPU44H"), PlcType::CSeries);
        assert_eq!(PlcType::classify("SYSMAC-XYZ"), PlcType::Unknown);
        assert_eq!(PlcType::classify("nj301-1100"), PlcType::Nj301);
    }

    #[test]
    fn read_write_limits() {
        assert_eq!(PlcType::Cp1.max_read_words(), 499);
        assert_eq!(PlcType::Cp1.max_write_words(), 496);
        assert_eq!(PlcType::Cj2.max_read_words(), 999);
        assert_eq!(PlcType::Nj501.max_write_words(), 996);
    }

    #[test]
    fn bit_data_memory_support() {
        assert!(!PlcType::Cp1.supports_bit_data_memory());
        assert!(PlcType::Cj2.supports_bit_data_memory());
        assert!(PlcType::Nj501.supports_bit_data_memory());
    }

    #[test]
    fn auxiliary_support_and_ceiling() {
        assert_eq!(
            PlcType::Cj2.area_ceiling(MemoryArea::Auxiliary),
            Some(11_536)
        );
        assert_eq!(PlcType::Cp1.area_ceiling(MemoryArea::Auxiliary), Some(960));
        assert_eq!(PlcType::Nj501.area_ceiling(MemoryArea::Auxiliary), None);
    }

    #[test]
    fn data_memory_ceiling() {
        assert_eq!(
            PlcType::Nx1p2.area_ceiling(MemoryArea::DataMemory),
            Some(16_000)
        );
        assert_eq!(
            PlcType::Cj2.area_ceiling(MemoryArea::DataMemory),
            Some(32_768)
        );
    }

    #[test]
    fn fixed_area_ceilings() {
        assert_eq!(PlcType::Unknown.area_ceiling(MemoryArea::CommonIo), Some(6_144));
        assert_eq!(PlcType::Unknown.area_ceiling(MemoryArea::Work), Some(512));
        assert_eq!(PlcType::Unknown.area_ceiling(MemoryArea::Holding), Some(1_536));
    }

    #[test]
    fn cycle_time_support() {
        assert!(PlcType::Nj501.supports_cycle_time());
        assert!(PlcType::Cj2.supports_cycle_time());
        assert!(PlcType::Cp1.supports_cycle_time());
        assert!(!PlcType::Nx701.supports_cycle_time());
        assert!(!PlcType::Ny532.supports_cycle_time());
        assert!(!PlcType::NjNxNySeries.supports_cycle_time());
    }

    #[test]
    fn config_defaults() {
        let cfg = FinsClientConfig::new("192.168.250.1", 1, 2);
        assert_eq!(cfg.port, 9600);
        assert_eq!(cfg.timeout_ms, 2_000);
        assert_eq!(cfg.retries, 1);
        assert_eq!(cfg.poll_interval_ms, 100);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_node_validation() {
        assert!(FinsClientConfig::new("h", 0, 2).validate().is_err());
        assert!(FinsClientConfig::new("h", 255, 2).validate().is_err());
        assert!(FinsClientConfig::new("h", 2, 0).validate().is_err());
        assert!(FinsClientConfig::new("h", 7, 7).validate().is_err());
        assert!(FinsClientConfig::new("h", 1, 254).validate().is_ok());
        assert!(FinsClientConfig::new("", 1, 2).validate().is_err());
    }
}
