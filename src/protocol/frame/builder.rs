//! Request builders for the FINS operations this driver issues.
//!
//! Each builder assembles the command payload from logical parameters and
//! pairs it with a caller-provided header, so the session stays in charge of
//! node addressing and service-id rotation.

use super::{area::MemoryArea, command::FinsCommandKind, header::FinsHeader, FinsRequest};
use crate::protocol::bcd::u8_to_bcd;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};

/// Memory area read, word units.
///
/// Payload: area code, two address bytes, zero bit byte, two length bytes.
pub fn build_read_words(header: FinsHeader, area: MemoryArea, addr: u16, len: u16) -> FinsRequest {
    let mut payload = BytesMut::with_capacity(6);
    payload.put_u8(area.word_code());
    payload.put_u16(addr);
    payload.put_u8(0x00);
    payload.put_u16(len);
    FinsRequest {
        header,
        command: FinsCommandKind::MemoryAreaRead,
        payload: payload.freeze(),
    }
}

/// Memory area read, bit units starting at `bit` within `addr`.
pub fn build_read_bits(
    header: FinsHeader,
    area: MemoryArea,
    addr: u16,
    bit: u8,
    len: u16,
) -> FinsRequest {
    let mut payload = BytesMut::with_capacity(6);
    payload.put_u8(area.bit_code());
    payload.put_u16(addr);
    payload.put_u8(bit);
    payload.put_u16(len);
    FinsRequest {
        header,
        command: FinsCommandKind::MemoryAreaRead,
        payload: payload.freeze(),
    }
}

/// Memory area write, word units. Values follow big-endian, one pair each.
pub fn build_write_words(
    header: FinsHeader,
    area: MemoryArea,
    addr: u16,
    values: &[u16],
) -> FinsRequest {
    let mut payload = BytesMut::with_capacity(6 + values.len() * 2);
    payload.put_u8(area.word_code());
    payload.put_u16(addr);
    payload.put_u8(0x00);
    payload.put_u16(values.len() as u16);
    for v in values {
        payload.put_u16(*v);
    }
    FinsRequest {
        header,
        command: FinsCommandKind::MemoryAreaWrite,
        payload: payload.freeze(),
    }
}

/// Memory area write, bit units. One byte per bit, 0x00 or 0x01.
pub fn build_write_bits(
    header: FinsHeader,
    area: MemoryArea,
    addr: u16,
    bit: u8,
    values: &[bool],
) -> FinsRequest {
    let mut payload = BytesMut::with_capacity(6 + values.len());
    payload.put_u8(area.bit_code());
    payload.put_u16(addr);
    payload.put_u8(bit);
    payload.put_u16(values.len() as u16);
    for v in values {
        payload.put_u8(u8::from(*v));
    }
    FinsRequest {
        header,
        command: FinsCommandKind::MemoryAreaWrite,
        payload: payload.freeze(),
    }
}

/// Controller data read. The single zero byte selects the full data block.
pub fn build_cpu_unit_data_read(header: FinsHeader) -> FinsRequest {
    FinsRequest {
        header,
        command: FinsCommandKind::CpuUnitDataRead,
        payload: Bytes::from_static(&[0x00]),
    }
}

/// Clock read carries no payload.
pub fn build_clock_read(header: FinsHeader) -> FinsRequest {
    FinsRequest {
        header,
        command: FinsCommandKind::ClockRead,
        payload: Bytes::new(),
    }
}

/// Clock write: seven BCD bytes, year modulo 100 first, day-of-week last.
pub fn build_clock_write(header: FinsHeader, datetime: NaiveDateTime, day_of_week: u8) -> FinsRequest {
    let payload = Bytes::from(vec![
        u8_to_bcd((datetime.year() % 100) as u8),
        u8_to_bcd(datetime.month() as u8),
        u8_to_bcd(datetime.day() as u8),
        u8_to_bcd(datetime.hour() as u8),
        u8_to_bcd(datetime.minute() as u8),
        u8_to_bcd(datetime.second() as u8),
        u8_to_bcd(day_of_week),
    ]);
    FinsRequest {
        header,
        command: FinsCommandKind::ClockWrite,
        payload,
    }
}

/// Cycle time read with the measure-and-report selector byte.
pub fn build_cycle_time_read(header: FinsHeader) -> FinsRequest {
    FinsRequest {
        header,
        command: FinsCommandKind::CycleTimeRead,
        payload: Bytes::from_static(&[0x01]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn header() -> FinsHeader {
        FinsHeader::command(1, 11, 0x00)
    }

    #[test]
    fn read_one_word_from_dm100() {
        let req = build_read_words(header(), MemoryArea::DataMemory, 100, 1);
        assert_eq!(&req.payload[..], &[0x82, 0x00, 0x64, 0x00, 0x00, 0x01]);
        assert_eq!(req.command.code(), [0x01, 0x01]);
    }

    #[test]
    fn read_bit_d10_3() {
        let req = build_read_bits(header(), MemoryArea::DataMemory, 10, 3, 1);
        assert_eq!(&req.payload[..], &[0x02, 0x00, 0x0A, 0x03, 0x00, 0x01]);
    }

    #[test]
    fn write_two_words_to_d200() {
        let req = build_write_words(header(), MemoryArea::DataMemory, 200, &[0x1122, 0x3344]);
        assert_eq!(
            &req.payload[..],
            &[0x82, 0x00, 0xC8, 0x00, 0x00, 0x02, 0x11, 0x22, 0x33, 0x44]
        );
        assert_eq!(req.wire_len(), 22);
    }

    #[test]
    fn write_string_words_to_d300() {
        let req = build_write_words(header(), MemoryArea::DataMemory, 300, &[0x4142, 0x0000]);
        assert_eq!(
            &req.payload[..],
            &[0x82, 0x01, 0x2C, 0x00, 0x00, 0x02, 0x41, 0x42, 0x00, 0x00]
        );
    }

    #[test]
    fn write_bits_payload() {
        let req = build_write_bits(
            header(),
            MemoryArea::CommonIo,
            20,
            4,
            &[true, false, true],
        );
        assert_eq!(
            &req.payload[..],
            &[0x30, 0x00, 0x14, 0x04, 0x00, 0x03, 0x01, 0x00, 0x01]
        );
    }

    #[test]
    fn controller_and_status_payloads() {
        assert_eq!(&build_cpu_unit_data_read(header()).payload[..], &[0x00]);
        assert!(build_clock_read(header()).payload.is_empty());
        assert_eq!(&build_cycle_time_read(header()).payload[..], &[0x01]);
    }

    #[test]
    fn clock_write_bcd_payload() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let req = build_clock_write(header(), dt, 2);
        assert_eq!(
            &req.payload[..],
            &[0x24, 0x01, 0x02, 0x03, 0x04, 0x05, 0x02]
        );
    }
}
