#![allow(clippy::verbose_bit_mask)]
#![allow(clippy::cognitive_complexity)]

#[cfg(test)]
extern crate pretty_assertions;

pub mod cpu;
pub mod dos;
pub mod format;
pub mod machine;
pub mod memory;
pub mod tools;

use thiserror::Error;

use crate::cpu::SR;
use crate::memory::MemoryAddress;

pub type Result<T> = std::result::Result<T, EmuError>;

/// All the ways a run can fail. Every variant is fatal: the
/// interpreter loop does not recover, it surfaces the error from the
/// entry point.
#[derive(Debug, Error)]
pub enum EmuError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad MZ signature {0:02X?}")]
    BadSignature([u8; 2]),

    #[error("truncated image: failed to read bytes {0} of header")]
    TruncatedHeader(&'static str),

    #[error("header size of {0} paragraphs is smaller than the fixed header fields")]
    HeaderTooSmall(u16),

    #[error("unknown opcode 0x{opcode:02X} at {at}")]
    UnknownOpcode { opcode: u8, at: MemoryAddress },

    #[error("unsupported mod/reg/rm encoding 0x{modrm:02X} for opcode 0x{opcode:02X} at {at}")]
    UnsupportedModRm { opcode: u8, modrm: u8, at: MemoryAddress },

    #[error("instruction truncated at {0}")]
    TruncatedInstruction(MemoryAddress),

    #[error("illegal address 0x{0:05X}")]
    IllegalAddress(u32),

    #[error("segment register {0} is reserved")]
    ReservedSegment(SR),

    #[error("unhandled interrupt 0x{0:02X}")]
    UnhandledInterrupt(u8),

    #[error("no INT 21h service for AH=0x{0:02X}")]
    UnknownService(u8),
}
