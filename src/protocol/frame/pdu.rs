//! FINS response parsing and payload extraction.
//!
//! A response mirrors the request frame with a two-byte end code wedged
//! between the command echo and the payload. Parsing validates the echoed
//! function, sub-function and service id, the network relay bit and the end
//! code before any payload is handed out, so a successfully parsed
//! [`FinsResponse`] always represents a completed operation.

use super::{command::FinsCommandKind, header::FinsHeader, FinsRequest};
use crate::protocol::bcd::{bcd_to_binary, bcd_to_u32};
use crate::protocol::error::{EchoField, Error, Result};
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};

/// Minimum response length: header, command echo, end code.
pub const MIN_RESPONSE_SIZE: usize = 14;

/// A validated FINS response.
#[derive(Debug, Clone)]
pub struct FinsResponse {
    /// Echoed header with source and destination swapped by the PLC.
    pub header: FinsHeader,
    /// Command kind confirmed against the originating request.
    pub kind: FinsCommandKind,
    /// Payload bytes following the end code.
    pub payload: Bytes,
}

/// Validate a raw response frame against its originating request.
pub fn parse_response(raw: &Bytes, request: &FinsRequest) -> Result<FinsResponse> {
    if raw.len() < MIN_RESPONSE_SIZE {
        return Err(Error::Framing {
            context: "response shorter than 14 bytes",
        });
    }

    let header = FinsHeader::from_bytes(raw)?;
    if !header.is_response() {
        return Err(Error::Framing {
            context: "response ICF is not a response frame",
        });
    }

    let [expected_fn, expected_sub] = request.command.code();
    let echoed_fn = raw[10];
    let echoed_sub = raw[11];
    if echoed_fn != expected_fn {
        return Err(Error::Echo {
            field: EchoField::Function,
            expected: expected_fn,
            actual: echoed_fn,
        });
    }
    if echoed_sub != expected_sub || FinsCommandKind::from_code(echoed_fn, echoed_sub).is_none() {
        return Err(Error::Echo {
            field: EchoField::SubFunction,
            expected: expected_sub,
            actual: echoed_sub,
        });
    }
    if header.sid != request.header.sid {
        return Err(Error::Echo {
            field: EchoField::ServiceId,
            expected: request.header.sid,
            actual: header.sid,
        });
    }

    let code_main = raw[12];
    let code_sub = raw[13];
    if code_main & 0x80 != 0 {
        return Err(Error::NetworkRelay);
    }
    let main = code_main & 0x7F;
    let sub = code_sub & 0x3F;
    if (main, sub) != (0, 0) {
        return Err(Error::EndCode { main, sub });
    }

    Ok(FinsResponse {
        header,
        kind: request.command,
        payload: raw.slice(MIN_RESPONSE_SIZE..),
    })
}

/// Clock state as reported by the PLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    /// Local PLC time.
    pub clock: NaiveDateTime,
    /// Day of week, 0 = Sunday.
    pub day_of_week: u8,
}

/// Controller identification strings from a controller data read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerData {
    /// Controller model, NUL-trimmed ASCII.
    pub model: String,
    /// Controller version, NUL-trimmed ASCII.
    pub version: String,
}

/// Cycle time statistics in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleTimeReading {
    pub average_ms: f64,
    pub max_ms: f64,
    pub min_ms: f64,
}

impl FinsResponse {
    /// Deserialize the payload as big-endian 16-bit words.
    pub fn words(&self) -> Result<Vec<u16>> {
        if self.payload.len() % 2 != 0 {
            return Err(Error::Framing {
                context: "word payload has odd length",
            });
        }
        Ok(self
            .payload
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect())
    }

    /// Deserialize the payload as bit flags, one byte per bit.
    pub fn bits(&self) -> Vec<bool> {
        self.payload.iter().map(|b| *b != 0).collect()
    }

    /// Decode a clock read payload: seven BCD bytes, two-digit year.
    ///
    /// Years below 70 land in the 2000s, 70 to 99 in the 1900s. Anything a
    /// two-digit BCD year cannot express is a malformed frame.
    pub fn clock(&self) -> Result<ClockReading> {
        if self.payload.len() < 7 {
            return Err(Error::Framing {
                context: "clock payload shorter than 7 bytes",
            });
        }
        let field = |i: usize| bcd_to_binary(&self.payload[i..=i]).map(|v| v as u32);
        let yy = field(0)?;
        let year: i32 = if yy < 70 {
            2000 + yy as i32
        } else if yy < 100 {
            1900 + yy as i32
        } else {
            return Err(Error::Framing {
                context: "clock year outside two-digit BCD range",
            });
        };
        let month = field(1)?;
        let day = field(2)?;
        let hour = field(3)?;
        let minute = field(4)?;
        let second = field(5)?;
        let day_of_week = field(6)? as u8;

        let clock = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .ok_or(Error::Framing {
                context: "clock fields do not form a valid datetime",
            })?;
        Ok(ClockReading { clock, day_of_week })
    }

    /// Decode a controller data read payload.
    ///
    /// Layout: 20 bytes model, 20 bytes version, both NUL-terminated ASCII,
    /// followed by 40 bytes for system use and 12 bytes of area data that are
    /// not interpreted here.
    pub fn controller_data(&self) -> Result<ControllerData> {
        if self.payload.len() < 40 {
            return Err(Error::Framing {
                context: "controller data payload shorter than 40 bytes",
            });
        }
        Ok(ControllerData {
            model: ascii_until_nul(&self.payload[0..20]),
            version: ascii_until_nul(&self.payload[20..40]),
        })
    }

    /// Decode a cycle time read payload: three 4-byte BCD groups holding the
    /// average, maximum and minimum scan time in 0.1 ms units.
    pub fn cycle_time(&self) -> Result<CycleTimeReading> {
        if self.payload.len() < 12 {
            return Err(Error::Framing {
                context: "cycle time payload shorter than 12 bytes",
            });
        }
        let group = |i: usize| bcd_to_u32(&self.payload[i..i + 4]).map(|v| v as f64 / 10.0);
        Ok(CycleTimeReading {
            average_ms: group(0)?,
            max_ms: group(4)?,
            min_ms: group(8)?,
        })
    }
}

fn ascii_until_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}
