use crate::cpu::instruction::{Instruction, RepeatMode};
use crate::cpu::op::Op;
use crate::cpu::parameter::{ModRegRm, Parameter};
use crate::cpu::register::{r16, r8, sr, AMode, R16, R8, SR};
use crate::cpu::segment::Segment;
use crate::memory::{MemoryAddress, MMU};
use crate::{EmuError, Result};

/// if enabled, prints decoded instructions each time they are being decoded
const DEBUG_DECODER: bool = false;

#[cfg(test)]
#[path = "./decoder_test.rs"]
mod decoder_test;

#[derive(Clone, Default)]
pub struct Decoder {
    current_seg: u16,

    /// starting instruction decoding offset
    start_offset: u16,

    current_offset: u16,
}

impl Decoder {
    /// decodes the instruction at seg:offset; the returned length is
    /// the exact number of bytes consumed, prefixes included
    pub fn get_instruction(&mut self, mmu: &MMU, segment: u16, offset: u16) -> Result<Instruction> {
        self.current_seg = segment;
        self.start_offset = offset;
        self.current_offset = offset;
        let mut op = self.decode(mmu)?;
        op.length = self.current_offset.wrapping_sub(self.start_offset) as u8;
        if DEBUG_DECODER {
            println!("decoded {} at {}", op, self.start_address());
        }
        Ok(op)
    }

    fn start_address(&self) -> MemoryAddress {
        MemoryAddress::real(self.current_seg, self.start_offset)
    }

    fn unsupported_modrm(&self, opcode: u8, x: &ModRegRm) -> EmuError {
        EmuError::UnsupportedModRm {
            opcode,
            modrm: x.u8(),
            at: self.start_address(),
        }
    }

    fn decode(&mut self, mmu: &MMU) -> Result<Instruction> {
        let b = self.read_u8(mmu)?;

        let op = match b {
            0x03 => {
                // add r16, r/m16
                let x = self.read_mod_reg_rm(mmu)?;
                let src = self.rm16(mmu, b, &x)?;
                Instruction::new2(Op::Add16, Parameter::Reg16(r16(x.reg)), src)
            }
            0x1E => {
                // push ds
                Instruction::new1(Op::Push16, Parameter::SReg16(SR::DS))
            }
            0x1F => {
                // pop ds
                Instruction::new1(Op::Pop16, Parameter::SReg16(SR::DS))
            }
            0x20 => {
                // and r/m8, r8
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm8(mmu, b, &x)?;
                Instruction::new2(Op::And8, dst, Parameter::Reg8(r8(x.reg)))
            }
            0x26 => {
                // es segment override prefix: applies to every
                // ds-defaulted memory operand of the next instruction
                let mut op = self.decode(mmu)?;
                op.segment_prefix = Segment::ES;
                op.params.dst = op.params.dst.with_segment(Segment::ES);
                op.params.src = op.params.src.with_segment(Segment::ES);
                op
            }
            0x2A => {
                // sub r8, r/m8
                let x = self.read_mod_reg_rm(mmu)?;
                let src = self.rm8(mmu, b, &x)?;
                Instruction::new2(Op::Sub8, Parameter::Reg8(r8(x.reg)), src)
            }
            0x2B => {
                // sub r16, r/m16
                let x = self.read_mod_reg_rm(mmu)?;
                let src = self.rm16(mmu, b, &x)?;
                Instruction::new2(Op::Sub16, Parameter::Reg16(r16(x.reg)), src)
            }
            0x33 => {
                // xor r16, r/m16
                let x = self.read_mod_reg_rm(mmu)?;
                let src = self.rm16(mmu, b, &x)?;
                Instruction::new2(Op::Xor16, Parameter::Reg16(r16(x.reg)), src)
            }
            0x3B => {
                // cmp r16, r/m16
                let x = self.read_mod_reg_rm(mmu)?;
                let src = self.rm16(mmu, b, &x)?;
                Instruction::new2(Op::Cmp16, Parameter::Reg16(r16(x.reg)), src)
            }
            0x3C => {
                // cmp AL, imm8
                let imm = Parameter::Imm8(self.read_u8(mmu)?);
                Instruction::new2(Op::Cmp8, Parameter::Reg8(R8::AL), imm)
            }
            0x40..=0x47 => {
                // inc r16
                Instruction::new1(Op::Inc16, Parameter::Reg16(r16(b & 7)))
            }
            0x48..=0x4F => {
                // dec r16
                Instruction::new1(Op::Dec16, Parameter::Reg16(r16(b & 7)))
            }
            0x50..=0x57 => {
                // push r16
                Instruction::new1(Op::Push16, Parameter::Reg16(r16(b & 7)))
            }
            0x58..=0x5F => {
                // pop r16
                Instruction::new1(Op::Pop16, Parameter::Reg16(r16(b & 7)))
            }
            0x72 => {
                // jb rel8
                Instruction::new1(Op::Jc, Parameter::ImmS8(self.read_s8(mmu)?))
            }
            0x73 => {
                // jae rel8
                Instruction::new1(Op::Jnc, Parameter::ImmS8(self.read_s8(mmu)?))
            }
            0x74 => {
                // je rel8
                Instruction::new1(Op::Jz, Parameter::ImmS8(self.read_s8(mmu)?))
            }
            0x75 => {
                // jne rel8
                Instruction::new1(Op::Jnz, Parameter::ImmS8(self.read_s8(mmu)?))
            }
            0x80 => {
                // and r/m8, imm8 (/4)
                // cmp r/m8, imm8 (/7)
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm8(mmu, b, &x)?;
                let src = Parameter::Imm8(self.read_u8(mmu)?);
                let cmd = match x.reg {
                    4 => Op::And8,
                    7 => Op::Cmp8,
                    _ => return Err(self.unsupported_modrm(b, &x)),
                };
                Instruction::new2(cmd, dst, src)
            }
            0x81 => {
                // sub r/m16, imm16 (/5)
                // cmp r/m16, imm16 (/7)
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm16(mmu, b, &x)?;
                let src = Parameter::Imm16(self.read_u16(mmu)?);
                let cmd = match x.reg {
                    5 => Op::Sub16,
                    7 => Op::Cmp16,
                    _ => return Err(self.unsupported_modrm(b, &x)),
                };
                Instruction::new2(cmd, dst, src)
            }
            0x83 => {
                // add r/m16, imm8 (/0)
                // sub r/m16, imm8 (/5)
                // cmp r/m16, imm8 (/7)
                // the immediate is sign-extended to 16 bits
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm16(mmu, b, &x)?;
                let src = Parameter::ImmS8(self.read_s8(mmu)?);
                let cmd = match x.reg {
                    0 => Op::Add16,
                    5 => Op::Sub16,
                    7 => Op::Cmp16,
                    _ => return Err(self.unsupported_modrm(b, &x)),
                };
                Instruction::new2(cmd, dst, src)
            }
            0x88 => {
                // mov r/m8, r8
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm8(mmu, b, &x)?;
                Instruction::new2(Op::Mov8, dst, Parameter::Reg8(r8(x.reg)))
            }
            0x89 => {
                // mov r/m16, r16
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm16(mmu, b, &x)?;
                Instruction::new2(Op::Mov16, dst, Parameter::Reg16(r16(x.reg)))
            }
            0x8A => {
                // mov r8, r/m8
                let x = self.read_mod_reg_rm(mmu)?;
                let src = self.rm8(mmu, b, &x)?;
                Instruction::new2(Op::Mov8, Parameter::Reg8(r8(x.reg)), src)
            }
            0x8B => {
                // mov r16, r/m16
                let x = self.read_mod_reg_rm(mmu)?;
                let src = self.rm16(mmu, b, &x)?;
                Instruction::new2(Op::Mov16, Parameter::Reg16(r16(x.reg)), src)
            }
            0x8C => {
                // mov r/m16, Sreg
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm16(mmu, b, &x)?;
                match sr(x.reg) {
                    Some(seg) => Instruction::new2(Op::Mov16, dst, Parameter::SReg16(seg)),
                    None => return Err(self.unsupported_modrm(b, &x)),
                }
            }
            0x8D => {
                // lea r16, m
                let x = self.read_mod_reg_rm(mmu)?;
                let src = self.rm16(mmu, b, &x)?;
                if !src.is_ptr() {
                    return Err(self.unsupported_modrm(b, &x));
                }
                Instruction::new2(Op::Lea16, Parameter::Reg16(r16(x.reg)), src)
            }
            0x8E => {
                // mov Sreg, r/m16
                let x = self.read_mod_reg_rm(mmu)?;
                let src = self.rm16(mmu, b, &x)?;
                match sr(x.reg) {
                    Some(seg) => Instruction::new2(Op::Mov16, Parameter::SReg16(seg), src),
                    None => return Err(self.unsupported_modrm(b, &x)),
                }
            }
            0xA1 => {
                // mov AX, moffs16
                let offset = self.read_u16(mmu)?;
                Instruction::new2(
                    Op::Mov16,
                    Parameter::Reg16(R16::AX),
                    Parameter::Ptr16(Segment::Default, offset),
                )
            }
            0xA2 => {
                // mov moffs8, AL
                let offset = self.read_u16(mmu)?;
                Instruction::new2(
                    Op::Mov8,
                    Parameter::Ptr8(Segment::Default, offset),
                    Parameter::Reg8(R8::AL),
                )
            }
            0xA3 => {
                // mov moffs16, AX
                let offset = self.read_u16(mmu)?;
                Instruction::new2(
                    Op::Mov16,
                    Parameter::Ptr16(Segment::Default, offset),
                    Parameter::Reg16(R16::AX),
                )
            }
            0xAA => {
                // stosb
                Instruction::new(Op::Stosb)
            }
            0xB0..=0xB7 => {
                // mov r8, imm8
                let imm = Parameter::Imm8(self.read_u8(mmu)?);
                Instruction::new2(Op::Mov8, Parameter::Reg8(r8(b & 7)), imm)
            }
            0xB8..=0xBF => {
                // mov r16, imm16
                let imm = Parameter::Imm16(self.read_u16(mmu)?);
                Instruction::new2(Op::Mov16, Parameter::Reg16(r16(b & 7)), imm)
            }
            0xC1 => {
                // shl r/m16, imm8 (/4)
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm16(mmu, b, &x)?;
                let src = Parameter::Imm8(self.read_u8(mmu)?);
                if x.reg != 4 {
                    return Err(self.unsupported_modrm(b, &x));
                }
                Instruction::new2(Op::Shl16, dst, src)
            }
            0xC3 => {
                // ret (near)
                Instruction::new(Op::Retn)
            }
            0xC7 => {
                // mov r/m16, imm16 (/0)
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm16(mmu, b, &x)?;
                let src = Parameter::Imm16(self.read_u16(mmu)?);
                if x.reg != 0 {
                    return Err(self.unsupported_modrm(b, &x));
                }
                Instruction::new2(Op::Mov16, dst, src)
            }
            0xCD => {
                // int imm8
                Instruction::new1(Op::Int, Parameter::Imm8(self.read_u8(mmu)?))
            }
            0xD1 => {
                // shl r/m16, 1 (/4)
                // shr r/m16, 1 (/5)
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm16(mmu, b, &x)?;
                let cmd = match x.reg {
                    4 => Op::Shl16,
                    5 => Op::Shr16,
                    _ => return Err(self.unsupported_modrm(b, &x)),
                };
                Instruction::new2(cmd, dst, Parameter::Imm8(1))
            }
            0xE8 => {
                // call rel16
                Instruction::new1(Op::CallNear, Parameter::ImmS16(self.read_s16(mmu)?))
            }
            0xE9 => {
                // jmp rel16
                Instruction::new1(Op::JmpNear, Parameter::ImmS16(self.read_s16(mmu)?))
            }
            0xEB => {
                // jmp rel8
                Instruction::new1(Op::JmpShort, Parameter::ImmS8(self.read_s8(mmu)?))
            }
            0xF3 => {
                // rep/repe prefix composites with the one-byte string
                // op that follows
                let b2 = self.read_u8(mmu)?;
                let (cmd, repeat) = match b2 {
                    0xA4 => (Op::Movsb, RepeatMode::Rep),
                    0xAA => (Op::Stosb, RepeatMode::Rep),
                    0xAE => (Op::Scasb, RepeatMode::Repe),
                    0xAF => (Op::Scasw, RepeatMode::Repe),
                    _ => {
                        return Err(EmuError::UnknownOpcode {
                            opcode: b2,
                            at: self.start_address(),
                        })
                    }
                };
                let mut op = Instruction::new(cmd);
                op.repeat = repeat;
                op
            }
            0xFB => {
                // sti
                Instruction::new(Op::Sti)
            }
            0xFC => {
                // cld
                Instruction::new(Op::Cld)
            }
            0xFF => {
                // call m16 (/2), absolute indirect; the register form
                // is not part of this machine
                let x = self.read_mod_reg_rm(mmu)?;
                let dst = self.rm16(mmu, b, &x)?;
                if x.reg != 2 || !dst.is_ptr() {
                    return Err(self.unsupported_modrm(b, &x));
                }
                Instruction::new1(Op::CallNear, dst)
            }
            _ => {
                return Err(EmuError::UnknownOpcode {
                    opcode: b,
                    at: self.start_address(),
                })
            }
        };
        Ok(op)
    }

    /// decodes an 8-bit r/m operand
    fn rm8(&mut self, mmu: &MMU, opcode: u8, x: &ModRegRm) -> Result<Parameter> {
        match x.md {
            0 if x.rm == 6 => Ok(Parameter::Ptr8(Segment::Default, self.read_u16(mmu)?)),
            1 if x.rm >= 4 => {
                let amode = amode(x.rm);
                Ok(Parameter::Ptr8AmodeS8(Segment::Default, amode, self.read_s8(mmu)?))
            }
            3 => Ok(Parameter::Reg8(r8(x.rm))),
            _ => Err(self.unsupported_modrm(opcode, x)),
        }
    }

    /// decodes a 16-bit r/m operand
    fn rm16(&mut self, mmu: &MMU, opcode: u8, x: &ModRegRm) -> Result<Parameter> {
        match x.md {
            0 if x.rm == 6 => Ok(Parameter::Ptr16(Segment::Default, self.read_u16(mmu)?)),
            1 if x.rm >= 4 => {
                let amode = amode(x.rm);
                Ok(Parameter::Ptr16AmodeS8(Segment::Default, amode, self.read_s8(mmu)?))
            }
            3 => Ok(Parameter::Reg16(r16(x.rm))),
            _ => Err(self.unsupported_modrm(opcode, x)),
        }
    }

    fn read_mod_reg_rm(&mut self, mmu: &MMU) -> Result<ModRegRm> {
        Ok(ModRegRm::from_u8(self.read_u8(mmu)?))
    }

    fn read_u8(&mut self, mmu: &MMU) -> Result<u8> {
        let b = mmu
            .read_u8(self.current_seg, self.current_offset)
            .map_err(|_| EmuError::TruncatedInstruction(self.start_address()))?;
        self.current_offset = self.current_offset.wrapping_add(1);
        Ok(b)
    }

    fn read_u16(&mut self, mmu: &MMU) -> Result<u16> {
        let lo = self.read_u8(mmu)?;
        let hi = self.read_u8(mmu)?;
        Ok(u16::from(hi) << 8 | u16::from(lo))
    }

    fn read_s8(&mut self, mmu: &MMU) -> Result<i8> {
        Ok(self.read_u8(mmu)? as i8)
    }

    fn read_s16(&mut self, mmu: &MMU) -> Result<i16> {
        Ok(self.read_u16(mmu)? as i16)
    }
}

/// base register for the mod=01 addressing forms this machine
/// supports: rm 4..7 select SI, DI, BP, BX
fn amode(rm: u8) -> AMode {
    match rm {
        4 => AMode::SI,
        5 => AMode::DI,
        6 => AMode::BP,
        _ => AMode::BX,
    }
}
