use std::collections::HashMap;
use std::io::Write;

use crate::cpu::{R16, R8, SR, CPU};
use crate::memory::MMU;
use crate::{EmuError, Result};

#[cfg(test)]
#[path = "./int21_test.rs"]
mod int21_test;

/// a DOS service routine. handlers run inline on the interpreter
/// thread and may mutate registers, flags and memory; the sink is the
/// host output stream used by the string services.
pub type IntHandler = Box<dyn FnMut(&mut CPU, &mut MMU, &mut dyn Write) -> Result<()>>;

/// INT 21h service registry, keyed by the AH value at dispatch time.
/// user-supplied handlers take priority over the built-in defaults.
pub struct IntHandlers {
    handlers: HashMap<u8, IntHandler>,
}

impl IntHandlers {
    pub fn new() -> Self {
        IntHandlers { handlers: HashMap::new() }
    }

    pub fn insert(&mut self, ah: u8, handler: IntHandler) {
        self.handlers.insert(ah, handler);
    }

    /// fills in the default services for any key the user has not
    /// claimed
    pub fn with_defaults(mut self) -> Self {
        self.handlers.entry(0x09).or_insert_with(|| Box::new(print_string));
        self.handlers.entry(0x30).or_insert_with(|| Box::new(noop));
        self.handlers.entry(0x4A).or_insert_with(|| Box::new(noop));
        self.handlers.entry(0x4C).or_insert_with(|| Box::new(terminate));
        self
    }

    pub fn handle(
        &mut self,
        ah: u8,
        cpu: &mut CPU,
        mmu: &mut MMU,
        output: &mut dyn Write,
    ) -> Result<()> {
        match self.handlers.get_mut(&ah) {
            Some(handler) => handler(cpu, mmu, output),
            None => Err(EmuError::UnknownService(ah)),
        }
    }
}

impl Default for IntHandlers {
    fn default() -> Self {
        IntHandlers::new()
    }
}

/// AH=09h: write the $-terminated string at DS:DX to the output sink.
/// the terminator itself is not emitted.
fn print_string(cpu: &mut CPU, mmu: &mut MMU, output: &mut dyn Write) -> Result<()> {
    let s = mmu.read_asciid(cpu.get_sr(SR::DS), cpu.get_r16(R16::DX))?;
    output.write_all(&s)?;
    Ok(())
}

/// AH=4Ch: terminate with the exit code in AL
fn terminate(cpu: &mut CPU, _mmu: &mut MMU, _output: &mut dyn Write) -> Result<()> {
    cpu.exit_code = cpu.get_r8(R8::AL);
    cpu.should_exit = true;
    Ok(())
}

/// AH=30h (get DOS version) and AH=4Ah (resize memory block) are
/// tolerated but do nothing
fn noop(_cpu: &mut CPU, _mmu: &mut MMU, _output: &mut dyn Write) -> Result<()> {
    Ok(())
}
