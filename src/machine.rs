use std::io::{self, Read, Write};

use crate::cpu::{Instruction, Op, Parameter, RepeatMode, R16, R8, SR, CPU};
use crate::dos::IntHandlers;
use crate::format::Exe;
use crate::memory::{MemoryAddress, MMU};
use crate::{EmuError, Result};

#[cfg(test)]
#[path = "./machine_test.rs"]
mod machine_test;

/// prints each instruction as they are executed
const DEBUG_EXEC: bool = false;

pub struct Machine {
    pub cpu: CPU,
    pub mmu: MMU,

    /// INT 21h services, dispatched on AH
    handlers: IntHandlers,

    /// host sink for the DOS string output services
    output: Box<dyn Write>,
}

impl Machine {
    pub fn default() -> Self {
        Machine::new(IntHandlers::new(), Box::new(io::stdout()))
    }

    /// builds a machine with user interrupt handlers taking priority
    /// over the defaults, and the given host output sink
    pub fn new(handlers: IntHandlers, output: Box<dyn Write>) -> Self {
        Machine {
            cpu: CPU::default(),
            mmu: MMU::new(0),
            handlers: handlers.with_defaults(),
            output,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.cpu.exit_code
    }

    /// places the load module at the bottom of a fresh memory buffer
    /// sized for the image plus the initial stack extent, and seeds
    /// CS:IP and SS:SP from the header
    pub fn load_exe(&mut self, exe: &Exe) -> Result<()> {
        let stack_top = MemoryAddress::real(exe.header.ss, exe.header.sp).value() as usize;
        self.mmu = MMU::new(exe.load_module.len() + stack_top);
        if !exe.load_module.is_empty() {
            self.mmu.write(0, 0, &exe.load_module)?;
        }

        self.cpu.set_sr(SR::SS, exe.header.ss)?;
        self.cpu.set_sr(SR::CS, exe.header.cs)?;
        self.cpu.set_r16(R16::SP, exe.header.sp);
        self.cpu.regs.ip = exe.header.ip;
        Ok(())
    }

    /// the fetch-decode-execute loop. stops when a handler raises the
    /// termination flag, or when CS:IP reaches the end of the buffer
    /// at an instruction boundary.
    pub fn run(&mut self) -> Result<()> {
        while !self.cpu.should_exit {
            let at = self.cpu.get_memory_address();
            if at.value() as usize >= self.mmu.size() {
                break;
            }
            self.execute_instruction()?;
        }
        Ok(())
    }

    /// decodes and executes a single instruction. IP is advanced past
    /// the instruction before execution, so relative jumps and the
    /// return address pushed by call see the post-advance value.
    pub fn execute_instruction(&mut self) -> Result<()> {
        let cs = self.cpu.get_sr(SR::CS);
        let ip = self.cpu.regs.ip;
        let op = self.cpu.decoder.get_instruction(&self.mmu, cs, ip)?;
        if DEBUG_EXEC {
            println!("[{}] {}", MemoryAddress::real(cs, ip), op);
        }
        self.cpu.regs.ip = ip.wrapping_add(u16::from(op.length));
        self.execute(&op)?;
        self.cpu.instruction_count += 1;
        Ok(())
    }

    fn execute(&mut self, op: &Instruction) -> Result<()> {
        match op.command {
            Op::Add16 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u16;
                let src = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u16;
                self.cpu
                    .write_parameter_u16(&mut self.mmu, &op.params.dst, dst.wrapping_add(src))?;
            }
            Op::And8 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u8;
                let src = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u8;
                self.cpu.write_parameter_u8(&mut self.mmu, &op.params.dst, dst & src)?;
            }
            Op::CallNear => {
                let ip = self.cpu.regs.ip;
                self.cpu.push16(&mut self.mmu, ip)?;
                match op.params.dst {
                    Parameter::ImmS16(rel) => {
                        self.cpu.regs.ip = ip.wrapping_add(rel as u16);
                    }
                    _ => {
                        // absolute indirect: the target offset is read
                        // through the operand
                        let target =
                            self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u16;
                        self.cpu.regs.ip = target;
                    }
                }
            }
            Op::Cld => {
                self.cpu.regs.flags.set_direction(false);
            }
            Op::Cmp8 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u8;
                let src = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u8;
                self.cpu.regs.flags.set_zero(dst == src);
                self.cpu.regs.flags.set_carry(dst < src);
            }
            Op::Cmp16 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u16;
                let src = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u16;
                self.cpu.regs.flags.set_zero(dst == src);
                self.cpu.regs.flags.set_carry(dst < src);
            }
            Op::Dec16 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u16;
                self.cpu
                    .write_parameter_u16(&mut self.mmu, &op.params.dst, dst.wrapping_sub(1))?;
            }
            Op::Inc16 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u16;
                self.cpu
                    .write_parameter_u16(&mut self.mmu, &op.params.dst, dst.wrapping_add(1))?;
            }
            Op::Int => {
                let int = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u8;
                self.interrupt(int)?;
            }
            Op::Jc => {
                if self.cpu.regs.flags.carry() {
                    self.jump_rel(&op.params.dst)?;
                }
            }
            Op::Jnc => {
                if !self.cpu.regs.flags.carry() {
                    self.jump_rel(&op.params.dst)?;
                }
            }
            Op::Jz => {
                if self.cpu.regs.flags.zero() {
                    self.jump_rel(&op.params.dst)?;
                }
            }
            Op::Jnz => {
                if !self.cpu.regs.flags.zero() {
                    self.jump_rel(&op.params.dst)?;
                }
            }
            Op::JmpNear | Op::JmpShort => {
                self.jump_rel(&op.params.dst)?;
            }
            Op::Lea16 => {
                let offset = self.cpu.read_parameter_address(&op.params.src);
                self.cpu.write_parameter_u16(&mut self.mmu, &op.params.dst, offset)?;
            }
            Op::Mov8 => {
                let src = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u8;
                self.cpu.write_parameter_u8(&mut self.mmu, &op.params.dst, src)?;
            }
            Op::Mov16 => {
                let src = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u16;
                self.cpu.write_parameter_u16(&mut self.mmu, &op.params.dst, src)?;
            }
            Op::Movsb => match op.repeat {
                RepeatMode::Rep => {
                    let mut count = self.cpu.get_r16(R16::CX);
                    while count > 0 {
                        self.movsb()?;
                        count -= 1;
                    }
                    self.cpu.set_r16(R16::CX, count);
                }
                _ => self.movsb()?,
            },
            Op::Pop16 => {
                let data = self.cpu.pop16(&self.mmu)?;
                self.cpu.write_parameter_u16(&mut self.mmu, &op.params.dst, data)?;
            }
            Op::Push16 => {
                let data = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u16;
                self.cpu.push16(&mut self.mmu, data)?;
            }
            Op::Retn => {
                let ip = self.cpu.pop16(&self.mmu)?;
                self.cpu.regs.ip = ip;
            }
            Op::Scasb => match op.repeat {
                RepeatMode::Repe => {
                    let mut count = self.cpu.get_r16(R16::CX);
                    while count > 0 && self.cpu.regs.flags.zero() {
                        self.scasb()?;
                        count -= 1;
                    }
                    self.cpu.set_r16(R16::CX, count);
                }
                _ => self.scasb()?,
            },
            Op::Scasw => match op.repeat {
                RepeatMode::Repe => {
                    let mut count = self.cpu.get_r16(R16::CX);
                    while count > 0 && self.cpu.regs.flags.zero() {
                        self.scasw()?;
                        count -= 1;
                    }
                    self.cpu.set_r16(R16::CX, count);
                }
                _ => self.scasw()?,
            },
            Op::Shl16 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u16;
                let count = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u32;
                let res = dst.checked_shl(count).unwrap_or(0);
                self.cpu.write_parameter_u16(&mut self.mmu, &op.params.dst, res)?;
            }
            Op::Shr16 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u16;
                let count = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u32;
                let res = dst.checked_shr(count).unwrap_or(0);
                self.cpu.write_parameter_u16(&mut self.mmu, &op.params.dst, res)?;
            }
            Op::Sti => {
                // interrupts are always serviced inline, nothing to do
            }
            Op::Stosb => match op.repeat {
                RepeatMode::Rep => {
                    let mut count = self.cpu.get_r16(R16::CX);
                    while count > 0 {
                        self.stosb()?;
                        count -= 1;
                    }
                    self.cpu.set_r16(R16::CX, count);
                }
                _ => self.stosb()?,
            },
            Op::Sub8 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u8;
                let src = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u8;
                self.cpu
                    .write_parameter_u8(&mut self.mmu, &op.params.dst, dst.wrapping_sub(src))?;
            }
            Op::Sub16 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u16;
                let src = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u16;
                self.cpu
                    .write_parameter_u16(&mut self.mmu, &op.params.dst, dst.wrapping_sub(src))?;
            }
            Op::Xor16 => {
                let dst = self.cpu.read_parameter_value(&self.mmu, &op.params.dst)? as u16;
                let src = self.cpu.read_parameter_value(&self.mmu, &op.params.src)? as u16;
                self.cpu.write_parameter_u16(&mut self.mmu, &op.params.dst, dst ^ src)?;
            }
        }
        Ok(())
    }

    /// relative jump; the operand is sign-extended and added to the
    /// already-advanced IP, wrapping at 16 bits
    fn jump_rel(&mut self, p: &Parameter) -> Result<()> {
        let rel = self.cpu.read_parameter_value(&self.mmu, p)? as u16;
        self.cpu.regs.ip = self.cpu.regs.ip.wrapping_add(rel);
        Ok(())
    }

    fn interrupt(&mut self, int: u8) -> Result<()> {
        if int != 0x21 {
            return Err(EmuError::UnhandledInterrupt(int));
        }
        let ah = self.cpu.get_r8(R8::AH);
        self.handlers.handle(ah, &mut self.cpu, &mut self.mmu, &mut *self.output)
    }

    /// DI adjustment for string primitives: forward when DF=0,
    /// backward when DF=1
    fn string_step(&self, size: u16) -> u16 {
        if self.cpu.regs.flags.direction() {
            0u16.wrapping_sub(size)
        } else {
            size
        }
    }

    /// copy byte DS:SI -> ES:DI, advancing SI and DI
    fn movsb(&mut self) -> Result<()> {
        let ds = self.cpu.get_sr(SR::DS);
        let es = self.cpu.get_sr(SR::ES);
        let si = self.cpu.get_r16(R16::SI);
        let di = self.cpu.get_r16(R16::DI);
        let b = self.mmu.read_u8(ds, si)?;
        self.mmu.write_u8(es, di, b)?;
        let step = self.string_step(1);
        self.cpu.set_r16(R16::SI, si.wrapping_add(step));
        self.cpu.set_r16(R16::DI, di.wrapping_add(step));
        Ok(())
    }

    /// store AL at ES:DI, advancing DI
    fn stosb(&mut self) -> Result<()> {
        let es = self.cpu.get_sr(SR::ES);
        let di = self.cpu.get_r16(R16::DI);
        let al = self.cpu.get_r8(R8::AL);
        self.mmu.write_u8(es, di, al)?;
        let step = self.string_step(1);
        self.cpu.set_r16(R16::DI, di.wrapping_add(step));
        Ok(())
    }

    /// compare AL with the byte at ES:DI, advancing DI; only ZF moves
    fn scasb(&mut self) -> Result<()> {
        let es = self.cpu.get_sr(SR::ES);
        let di = self.cpu.get_r16(R16::DI);
        let al = self.cpu.get_r8(R8::AL);
        let b = self.mmu.read_u8(es, di)?;
        self.cpu.regs.flags.set_zero(al == b);
        let step = self.string_step(1);
        self.cpu.set_r16(R16::DI, di.wrapping_add(step));
        Ok(())
    }

    /// compare AX with the word at ES:DI, advancing DI by two
    fn scasw(&mut self) -> Result<()> {
        let es = self.cpu.get_sr(SR::ES);
        let di = self.cpu.get_r16(R16::DI);
        let ax = self.cpu.get_r16(R16::AX);
        let w = self.mmu.read_u16(es, di)?;
        self.cpu.regs.flags.set_zero(ax == w);
        let step = self.string_step(2);
        self.cpu.set_r16(R16::DI, di.wrapping_add(step));
        Ok(())
    }
}

/// loads and runs an MZ image with the default DOS services, writing
/// INT 21h/09h output to standard out. returns the terminated machine
/// with its exit code and final register state.
pub fn run_exe<R: Read>(input: R) -> Result<Machine> {
    run_exe_with_handlers(input, IntHandlers::new(), Box::new(io::stdout()))
}

/// same as `run_exe`, with user interrupt handlers taking priority
/// over the defaults for the keys they claim, and the string services
/// writing to the given sink
pub fn run_exe_with_handlers<R: Read>(
    mut input: R,
    handlers: IntHandlers,
    output: Box<dyn Write>,
) -> Result<Machine> {
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;
    let exe = Exe::parse(&data)?;
    let mut machine = Machine::new(handlers, output);
    machine.load_exe(&exe)?;
    machine.run()?;
    Ok(machine)
}
