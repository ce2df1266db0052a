// these modules are re-exported as a single module

pub use self::decoder::*;
mod decoder;

pub use self::instruction::*;
mod instruction;

pub use self::segment::*;
mod segment;

pub use self::register::*;
mod register;

pub use self::flag::*;
mod flag;

pub use self::parameter::*;
mod parameter;

pub use self::op::*;
mod op;

use crate::memory::{MemoryAddress, MMU};
use crate::{EmuError, Result};

/// prints diagnostics of stack usage (push / pop)
const DEBUG_STACK: bool = false;

pub struct CPU {
    pub instruction_count: usize,

    /// general purpose registers, segment registers, ip, flags
    pub regs: RegisterState,

    pub decoder: Decoder,

    /// set by the INT 21h exit service; stops the interpreter loop
    pub should_exit: bool,
    pub exit_code: u8,
}

impl CPU {
    pub fn default() -> Self {
        CPU {
            instruction_count: 0,
            regs: RegisterState::default(),
            decoder: Decoder::default(),
            should_exit: false,
            exit_code: 0,
        }
    }

    pub fn get_r8(&self, r: R8) -> u8 {
        self.regs.get_r8(r)
    }

    pub fn set_r8(&mut self, r: R8, val: u8) {
        self.regs.set_r8(r, val);
    }

    pub fn get_r16(&self, r: R16) -> u16 {
        self.regs.get_r16(r)
    }

    pub fn set_r16(&mut self, r: R16, val: u16) {
        self.regs.set_r16(r, val);
    }

    pub fn get_sr(&self, r: SR) -> u16 {
        self.regs.get_sr(r)
    }

    pub fn set_sr(&mut self, r: SR, val: u16) -> Result<()> {
        self.regs.set_sr(r, val)
    }

    /// returns the address of CS:IP
    pub fn get_memory_address(&self) -> MemoryAddress {
        MemoryAddress::real(self.get_sr(SR::CS), self.regs.ip)
    }

    pub fn push16(&mut self, mmu: &mut MMU, data: u16) -> Result<()> {
        let sp = self.get_r16(R16::SP).wrapping_sub(2);
        self.set_r16(R16::SP, sp);
        let ss = self.get_sr(SR::SS);
        if DEBUG_STACK {
            println!("[{}] push16 {:04X} to {:04X}:{:04X}", self.get_memory_address(), data, ss, sp);
        }
        mmu.write_u16(ss, sp, data)
    }

    pub fn pop16(&mut self, mmu: &MMU) -> Result<u16> {
        let ss = self.get_sr(SR::SS);
        let sp = self.get_r16(R16::SP);
        let data = mmu.read_u16(ss, sp)?;
        if DEBUG_STACK {
            println!("[{}] pop16 {:04X} from {:04X}:{:04X}", self.get_memory_address(), data, ss, sp);
        }
        self.set_r16(R16::SP, sp.wrapping_add(2));
        Ok(data)
    }

    /// returns the value of the segment register a prefix resolves to
    /// for a moffs operand; DS unless overridden
    fn moffs_segment(&self, seg: Segment) -> u16 {
        match seg {
            Segment::Default => self.get_sr(SR::DS),
            _ => self.get_sr(seg.as_sr()),
        }
    }

    /// returns the value of the segment register a prefix resolves to
    /// for a based operand; DS unless the base is BP (then SS) or an
    /// override is active
    fn amode_segment(&self, seg: Segment, amode: AMode) -> u16 {
        match seg {
            Segment::Default => match amode {
                AMode::BP => self.get_sr(SR::SS),
                _ => self.get_sr(SR::DS),
            },
            _ => self.get_sr(seg.as_sr()),
        }
    }

    /// effective offset of a based operand: base register plus
    /// sign-extended displacement, with 16-bit wrap
    fn amode_offset(&self, amode: AMode, disp: i8) -> u16 {
        let base = match amode {
            AMode::SI => self.get_r16(R16::SI),
            AMode::DI => self.get_r16(R16::DI),
            AMode::BP => self.get_r16(R16::BP),
            AMode::BX => self.get_r16(R16::BX),
        };
        base.wrapping_add(disp as u16)
    }

    /// returns the effective offset of a memory operand, used by lea
    pub fn read_parameter_address(&self, p: &Parameter) -> u16 {
        match *p {
            Parameter::Ptr16(_, imm) => imm,
            Parameter::Ptr16AmodeS8(_, amode, disp) => self.amode_offset(amode, disp),
            _ => panic!("read_parameter_address: unhandled parameter {:?}", p),
        }
    }

    pub fn read_parameter_value(&self, mmu: &MMU, p: &Parameter) -> Result<usize> {
        match *p {
            Parameter::Imm8(imm) => Ok(imm as usize),
            Parameter::Imm16(imm) => Ok(imm as usize),
            Parameter::ImmS8(imm) => Ok(imm as usize),
            Parameter::ImmS16(imm) => Ok(imm as usize),
            Parameter::Reg8(r) => Ok(self.get_r8(r) as usize),
            Parameter::Reg16(r) => Ok(self.get_r16(r) as usize),
            Parameter::SReg16(sr) => match sr {
                SR::FS | SR::GS => Err(EmuError::ReservedSegment(sr)),
                _ => Ok(self.get_sr(sr) as usize),
            },
            Parameter::Ptr8(seg, imm) => {
                Ok(mmu.read_u8(self.moffs_segment(seg), imm)? as usize)
            }
            Parameter::Ptr16(seg, imm) => {
                Ok(mmu.read_u16(self.moffs_segment(seg), imm)? as usize)
            }
            Parameter::Ptr8AmodeS8(seg, amode, disp) => {
                let seg = self.amode_segment(seg, amode);
                let imm = self.amode_offset(amode, disp);
                Ok(mmu.read_u8(seg, imm)? as usize)
            }
            Parameter::Ptr16AmodeS8(seg, amode, disp) => {
                let seg = self.amode_segment(seg, amode);
                let imm = self.amode_offset(amode, disp);
                Ok(mmu.read_u16(seg, imm)? as usize)
            }
            Parameter::None => panic!("read_parameter_value: unhandled parameter {:?}", p),
        }
    }

    pub fn write_parameter_u8(&mut self, mmu: &mut MMU, p: &Parameter, data: u8) -> Result<()> {
        match *p {
            Parameter::Reg8(r) => {
                self.set_r8(r, data);
                Ok(())
            }
            Parameter::Ptr8(seg, imm) => mmu.write_u8(self.moffs_segment(seg), imm, data),
            Parameter::Ptr8AmodeS8(seg, amode, disp) => {
                let seg = self.amode_segment(seg, amode);
                let imm = self.amode_offset(amode, disp);
                mmu.write_u8(seg, imm, data)
            }
            _ => panic!("write_parameter_u8: unhandled parameter {:?}", p),
        }
    }

    pub fn write_parameter_u16(&mut self, mmu: &mut MMU, p: &Parameter, data: u16) -> Result<()> {
        match *p {
            Parameter::Reg16(r) => {
                self.set_r16(r, data);
                Ok(())
            }
            Parameter::SReg16(sr) => self.set_sr(sr, data),
            Parameter::Ptr16(seg, imm) => mmu.write_u16(self.moffs_segment(seg), imm, data),
            Parameter::Ptr16AmodeS8(seg, amode, disp) => {
                let seg = self.amode_segment(seg, amode);
                let imm = self.amode_offset(amode, disp);
                mmu.write_u16(seg, imm, data)
            }
            _ => panic!("write_parameter_u16: unhandled parameter {:?}", p),
        }
    }
}
