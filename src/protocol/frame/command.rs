use serde::{Deserialize, Serialize};

/// Semantic FINS command kind covering every function group the protocol
/// defines, expressed as one closed enumeration.
///
/// Only the memory-area, machine-configuration, status and time-data commands
/// are ever issued by this driver; the remaining variants exist so that
/// response headers can be validated against the full published command set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FinsCommandKind {
    // 0x01: memory area access
    MemoryAreaRead,
    MemoryAreaWrite,
    MemoryAreaFill,
    MemoryAreaMultipleRead,
    MemoryAreaTransfer,

    // 0x02: parameter area access
    ParameterAreaRead,
    ParameterAreaWrite,
    ParameterAreaFill,

    // 0x03: program area access
    ProgramAreaRead,
    ProgramAreaWrite,
    ProgramAreaClear,

    // 0x04: operating mode control
    OperatingModeRun,
    OperatingModeStop,

    // 0x05: machine configuration
    CpuUnitDataRead,
    ConnectionDataRead,

    // 0x06: status
    CpuUnitStatusRead,
    CycleTimeRead,

    // 0x07: time data
    ClockRead,
    ClockWrite,

    // 0x09: message display
    MessageRead,

    // 0x0C: access rights
    AccessRightAcquire,
    AccessRightForcedAcquire,
    AccessRightRelease,

    // 0x21: error log and FINS write access log share the function code
    ErrorClear,
    ErrorLogRead,
    ErrorLogClear,
    FinsWriteAccessLogRead,
    FinsWriteAccessLogClear,

    // 0x22: file memory
    FileNameRead,
    FileRead,
    FileWrite,
    MemoryCardFormat,
    FileDelete,
    FileCopy,
    FileRename,
    MemoryAreaFileTransfer,
    ParameterAreaFileTransfer,
    ProgramAreaFileTransfer,
    DirectoryCreateDelete,

    // 0x23: debugging
    ForcedSetReset,
    ForcedSetResetCancel,

    // 0x28: serial gateway conversion
    ConvertToCompoWayF,
    ConvertToModbusRtu,
    ConvertToModbusAscii,
}

impl FinsCommandKind {
    /// Wire-level command bytes: function code followed by sub-function code.
    pub fn code(self) -> [u8; 2] {
        match self {
            FinsCommandKind::MemoryAreaRead => [0x01, 0x01],
            FinsCommandKind::MemoryAreaWrite => [0x01, 0x02],
            FinsCommandKind::MemoryAreaFill => [0x01, 0x03],
            FinsCommandKind::MemoryAreaMultipleRead => [0x01, 0x04],
            FinsCommandKind::MemoryAreaTransfer => [0x01, 0x05],

            FinsCommandKind::ParameterAreaRead => [0x02, 0x01],
            FinsCommandKind::ParameterAreaWrite => [0x02, 0x02],
            FinsCommandKind::ParameterAreaFill => [0x02, 0x03],

            FinsCommandKind::ProgramAreaRead => [0x03, 0x06],
            FinsCommandKind::ProgramAreaWrite => [0x03, 0x07],
            FinsCommandKind::ProgramAreaClear => [0x03, 0x08],

            FinsCommandKind::OperatingModeRun => [0x04, 0x01],
            FinsCommandKind::OperatingModeStop => [0x04, 0x02],

            FinsCommandKind::CpuUnitDataRead => [0x05, 0x01],
            FinsCommandKind::ConnectionDataRead => [0x05, 0x02],

            FinsCommandKind::CpuUnitStatusRead => [0x06, 0x01],
            FinsCommandKind::CycleTimeRead => [0x06, 0x20],

            FinsCommandKind::ClockRead => [0x07, 0x01],
            FinsCommandKind::ClockWrite => [0x07, 0x02],

            FinsCommandKind::MessageRead => [0x09, 0x20],

            FinsCommandKind::AccessRightAcquire => [0x0C, 0x01],
            FinsCommandKind::AccessRightForcedAcquire => [0x0C, 0x02],
            FinsCommandKind::AccessRightRelease => [0x0C, 0x03],

            FinsCommandKind::ErrorClear => [0x21, 0x01],
            FinsCommandKind::ErrorLogRead => [0x21, 0x02],
            FinsCommandKind::ErrorLogClear => [0x21, 0x03],
            FinsCommandKind::FinsWriteAccessLogRead => [0x21, 0x40],
            FinsCommandKind::FinsWriteAccessLogClear => [0x21, 0x41],

            FinsCommandKind::FileNameRead => [0x22, 0x01],
            FinsCommandKind::FileRead => [0x22, 0x02],
            FinsCommandKind::FileWrite => [0x22, 0x03],
            FinsCommandKind::MemoryCardFormat => [0x22, 0x04],
            FinsCommandKind::FileDelete => [0x22, 0x05],
            FinsCommandKind::FileCopy => [0x22, 0x07],
            FinsCommandKind::FileRename => [0x22, 0x08],
            FinsCommandKind::MemoryAreaFileTransfer => [0x22, 0x0A],
            FinsCommandKind::ParameterAreaFileTransfer => [0x22, 0x0B],
            FinsCommandKind::ProgramAreaFileTransfer => [0x22, 0x0C],
            FinsCommandKind::DirectoryCreateDelete => [0x22, 0x15],

            FinsCommandKind::ForcedSetReset => [0x23, 0x01],
            FinsCommandKind::ForcedSetResetCancel => [0x23, 0x02],

            FinsCommandKind::ConvertToCompoWayF => [0x28, 0x03],
            FinsCommandKind::ConvertToModbusRtu => [0x28, 0x04],
            FinsCommandKind::ConvertToModbusAscii => [0x28, 0x05],
        }
    }

    /// Map wire-level command bytes back to a semantic kind.
    ///
    /// Function code `0x21` is overloaded between the error log and the FINS
    /// write access log; both sub-function sets are accepted. Unknown pairs
    /// return `None` so that response validation can reject them.
    pub fn from_code(function: u8, sub: u8) -> Option<Self> {
        let kind = match (function, sub) {
            (0x01, 0x01) => FinsCommandKind::MemoryAreaRead,
            (0x01, 0x02) => FinsCommandKind::MemoryAreaWrite,
            (0x01, 0x03) => FinsCommandKind::MemoryAreaFill,
            (0x01, 0x04) => FinsCommandKind::MemoryAreaMultipleRead,
            (0x01, 0x05) => FinsCommandKind::MemoryAreaTransfer,

            (0x02, 0x01) => FinsCommandKind::ParameterAreaRead,
            (0x02, 0x02) => FinsCommandKind::ParameterAreaWrite,
            (0x02, 0x03) => FinsCommandKind::ParameterAreaFill,

            (0x03, 0x06) => FinsCommandKind::ProgramAreaRead,
            (0x03, 0x07) => FinsCommandKind::ProgramAreaWrite,
            (0x03, 0x08) => FinsCommandKind::ProgramAreaClear,

            (0x04, 0x01) => FinsCommandKind::OperatingModeRun,
            (0x04, 0x02) => FinsCommandKind::OperatingModeStop,

            (0x05, 0x01) => FinsCommandKind::CpuUnitDataRead,
            (0x05, 0x02) => FinsCommandKind::ConnectionDataRead,

            (0x06, 0x01) => FinsCommandKind::CpuUnitStatusRead,
            (0x06, 0x20) => FinsCommandKind::CycleTimeRead,

            (0x07, 0x01) => FinsCommandKind::ClockRead,
            (0x07, 0x02) => FinsCommandKind::ClockWrite,

            (0x09, 0x20) => FinsCommandKind::MessageRead,

            (0x0C, 0x01) => FinsCommandKind::AccessRightAcquire,
            (0x0C, 0x02) => FinsCommandKind::AccessRightForcedAcquire,
            (0x0C, 0x03) => FinsCommandKind::AccessRightRelease,

            (0x21, 0x01) => FinsCommandKind::ErrorClear,
            (0x21, 0x02) => FinsCommandKind::ErrorLogRead,
            (0x21, 0x03) => FinsCommandKind::ErrorLogClear,
            (0x21, 0x40) => FinsCommandKind::FinsWriteAccessLogRead,
            (0x21, 0x41) => FinsCommandKind::FinsWriteAccessLogClear,

            (0x22, 0x01) => FinsCommandKind::FileNameRead,
            (0x22, 0x02) => FinsCommandKind::FileRead,
            (0x22, 0x03) => FinsCommandKind::FileWrite,
            (0x22, 0x04) => FinsCommandKind::MemoryCardFormat,
            (0x22, 0x05) => FinsCommandKind::FileDelete,
            (0x22, 0x07) => FinsCommandKind::FileCopy,
            (0x22, 0x08) => FinsCommandKind::FileRename,
            (0x22, 0x0A) => FinsCommandKind::MemoryAreaFileTransfer,
            (0x22, 0x0B) => FinsCommandKind::ParameterAreaFileTransfer,
            (0x22, 0x0C) => FinsCommandKind::ProgramAreaFileTransfer,
            (0x22, 0x15) => FinsCommandKind::DirectoryCreateDelete,

            (0x23, 0x01) => FinsCommandKind::ForcedSetReset,
            (0x23, 0x02) => FinsCommandKind::ForcedSetResetCancel,

            (0x28, 0x03) => FinsCommandKind::ConvertToCompoWayF,
            (0x28, 0x04) => FinsCommandKind::ConvertToModbusRtu,
            (0x28, 0x05) => FinsCommandKind::ConvertToModbusAscii,

            _ => return None,
        };
        Some(kind)
    }
}
