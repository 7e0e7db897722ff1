use std::{io, result::Result as StdResult};
use thiserror::Error as ThisError;

/// Unified FINS protocol result type.
///
/// Protocol layers (frame/codec/transport/session) return this type instead of
/// bare `io::Error` so that callers can distinguish transport, framing and
/// PLC-reported failures.
pub type Result<T> = StdResult<T, Error>;

/// Which echoed header field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoField {
    /// Function code (first command byte).
    Function,
    /// Sub-function code (second command byte).
    SubFunction,
    /// Service id correlator.
    ServiceId,
}

impl std::fmt::Display for EchoField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EchoField::Function => write!(f, "function"),
            EchoField::SubFunction => write!(f, "sub-function"),
            EchoField::ServiceId => write!(f, "service id"),
        }
    }
}

/// FINS protocol error type.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Underlying I/O error from the transport.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Operation did not complete within the configured deadline.
    #[error("request timed out")]
    Timeout,

    /// Underlying socket was closed or disposed while the operation ran.
    #[error("channel closed")]
    ChannelClosed,

    /// Frame-level validation failed (magic, length, header start byte).
    #[error("framing error: {context}")]
    Framing { context: &'static str },

    /// An echoed response field did not match the originating request.
    #[error("response echo mismatch on {field}: expected {expected:#04x}, got {actual:#04x}")]
    Echo {
        field: EchoField,
        expected: u8,
        actual: u8,
    },

    /// Bit 7 of the first end-code byte signalled a network relay error.
    #[error("network relay error reported in response code")]
    NetworkRelay,

    /// Non-zero FINS end code returned by the PLC.
    #[error("FINS end code {main:#04x}/{sub:#04x}: {}", end_code_description(*.main, *.sub))]
    EndCode { main: u8, sub: u8 },

    /// BCD conversion over an out-of-range byte width.
    #[error("BCD width must be 1 to 4 bytes, got {len}")]
    BadBcdWidth { len: usize },

    /// TCP node-address negotiation failed.
    #[error("node address handshake failed: {context}")]
    Handshake { context: &'static str },
}

impl Error {
    /// True for failures that warrant a channel rebuild and retry.
    ///
    /// PLC-reported and echo failures are deliberately excluded: they describe
    /// a semantic problem, not transient I/O.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Timeout | Error::ChannelClosed | Error::Handshake { .. }
        )
    }

    /// True when the response carried a foreign service id. The channel buffer
    /// must be purged before the error is surfaced.
    pub fn is_service_id_mismatch(&self) -> bool {
        matches!(
            self,
            Error::Echo {
                field: EchoField::ServiceId,
                ..
            }
        )
    }
}

/// Canonical message for a FINS end code pair.
///
/// Main codes group failures by origin; sub codes refine them. Codes not in
/// the published table fall back to a per-group message, then to a generic
/// one, so every pair renders something meaningful.
pub fn end_code_description(main: u8, sub: u8) -> &'static str {
    match (main, sub) {
        (0x00, 0x01) => "service was canceled",

        // 0x01: local node errors
        (0x01, 0x01) => "local node not in network",
        (0x01, 0x02) => "token timeout",
        (0x01, 0x03) => "number of retries exceeded",
        (0x01, 0x04) => "maximum number of frames exceeded",
        (0x01, 0x05) => "node address range error",
        (0x01, 0x06) => "node address duplication",
        (0x01, _) => "local node error",

        // 0x02: destination node errors
        (0x02, 0x01) => "destination node not in network",
        (0x02, 0x02) => "unit missing at destination node",
        (0x02, 0x03) => "third node missing",
        (0x02, 0x04) => "destination node busy",
        (0x02, 0x05) => "response timeout at destination node",
        (0x02, _) => "destination node error",

        // 0x03: controller errors
        (0x03, 0x01) => "communications controller error",
        (0x03, 0x02) => "CPU unit error at destination node",
        (0x03, 0x03) => "controller board error",
        (0x03, 0x04) => "unit number error",
        (0x03, _) => "controller error",

        // 0x04: service unsupported
        (0x04, 0x01) => "undefined command",
        (0x04, 0x02) => "not supported by unit model or version",
        (0x04, _) => "service unsupported",

        // 0x05: routing table errors
        (0x05, 0x01) => "destination address setting error",
        (0x05, 0x02) => "no routing tables",
        (0x05, 0x03) => "routing table error",
        (0x05, 0x04) => "too many relays",
        (0x05, _) => "routing error",

        // 0x10: command format errors
        (0x10, 0x01) => "command too long",
        (0x10, 0x02) => "command too short",
        (0x10, 0x03) => "elements and data do not match",
        (0x10, 0x04) => "command format error",
        (0x10, 0x05) => "header error",
        (0x10, _) => "command format error",

        // 0x11: parameter errors
        (0x11, 0x01) => "area classification missing or invalid",
        (0x11, 0x02) => "access size error",
        (0x11, 0x03) => "address range error",
        (0x11, 0x04) => "address range exceeded",
        (0x11, 0x06) => "program missing",
        (0x11, 0x09) => "relational error",
        (0x11, 0x0A) => "duplicate data access",
        (0x11, 0x0B) => "response too long",
        (0x11, 0x0C) => "parameter error",
        (0x11, _) => "parameter error",

        // 0x20: read not possible
        (0x20, 0x02) => "read not possible, data protected",
        (0x20, 0x03) => "read not possible, table missing",
        (0x20, 0x04) => "read not possible, data missing",
        (0x20, 0x05) => "read not possible, program missing",
        (0x20, 0x06) => "read not possible, file missing",
        (0x20, 0x07) => "read not possible, data mismatch",
        (0x20, _) => "read not possible",

        // 0x21: write not possible
        (0x21, 0x01) => "write not possible, area read only",
        (0x21, 0x02) => "write not possible, data protected",
        (0x21, 0x03) => "write not possible, cannot register",
        (0x21, 0x05) => "write not possible, program missing",
        (0x21, 0x06) => "write not possible, file missing",
        (0x21, 0x07) => "write not possible, file name already exists",
        (0x21, 0x08) => "write not possible, cannot change",
        (0x21, _) => "write not possible",

        // 0x22: operating mode conflicts
        (0x22, 0x01) => "not possible during execution",
        (0x22, 0x02) => "not possible while running",
        (0x22, 0x03) => "wrong PLC mode, PROGRAM",
        (0x22, 0x04) => "wrong PLC mode, DEBUG",
        (0x22, 0x05) => "wrong PLC mode, MONITOR",
        (0x22, 0x06) => "wrong PLC mode, RUN",
        (0x22, 0x07) => "specified node is not the polling node",
        (0x22, 0x08) => "step cannot be executed",
        (0x22, _) => "operating mode conflict",

        // 0x23: device errors
        (0x23, 0x01) => "file device missing",
        (0x23, 0x02) => "memory missing",
        (0x23, 0x03) => "clock missing",
        (0x23, _) => "no such device",

        // 0x24: data link errors
        (0x24, 0x01) => "table missing, cannot start or stop",
        (0x24, _) => "cannot start or stop",

        _ => "unknown FINS end code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_code_known_pairs() {
        assert_eq!(end_code_description(0x11, 0x04), "address range exceeded");
        assert_eq!(end_code_description(0x23, 0x03), "clock missing");
        assert_eq!(end_code_description(0x22, 0x06), "wrong PLC mode, RUN");
    }

    #[test]
    fn end_code_group_fallback() {
        assert_eq!(end_code_description(0x11, 0x3F), "parameter error");
        assert_eq!(end_code_description(0x20, 0x3F), "read not possible");
    }

    #[test]
    fn end_code_generic_fallback() {
        assert_eq!(end_code_description(0x7E, 0x01), "unknown FINS end code");
    }

    #[test]
    fn transient_classification() {
        assert!(Error::Timeout.is_transient());
        assert!(Error::ChannelClosed.is_transient());
        assert!(!Error::NetworkRelay.is_transient());
        assert!(!Error::EndCode { main: 1, sub: 1 }.is_transient());
        assert!(!Error::Framing { context: "x" }.is_transient());
    }

    #[test]
    fn sid_mismatch_detection() {
        let e = Error::Echo {
            field: EchoField::ServiceId,
            expected: 1,
            actual: 2,
        };
        assert!(e.is_service_id_mismatch());
        let e = Error::Echo {
            field: EchoField::Function,
            expected: 1,
            actual: 2,
        };
        assert!(!e.is_service_id_mismatch());
    }

    #[test]
    fn display_contains_end_code_message() {
        let e = Error::EndCode {
            main: 0x11,
            sub: 0x04,
        };
        assert!(e.to_string().contains("address range exceeded"));
    }
}
