use std::fmt;

use crate::cpu::op::Op;
use crate::cpu::parameter::{Parameter, ParameterSet};
use crate::cpu::segment::Segment;

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub command: Op,
    pub params: ParameterSet,

    /// total bytes consumed from the fetch point, including any
    /// prefix, immediate and displacement
    pub length: u8,

    // op prefixes
    pub segment_prefix: Segment, // segment prefix opcode
    pub repeat: RepeatMode,      // REPcc prefix
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rep = self.repeat.as_str();
        if !rep.is_empty() {
            write!(f, "{} ", rep)?;
        }
        match self.params.dst {
            Parameter::None => write!(f, "{}", self.command),
            _ => match self.params.src {
                Parameter::None => write!(f, "{} {}", self.command, self.params.dst),
                _ => write!(f, "{} {}, {}", self.command, self.params.dst, self.params.src),
            },
        }
    }
}

impl Instruction {
    pub fn new(op: Op) -> Self {
        Instruction::new2(op, Parameter::None, Parameter::None)
    }

    pub fn new1(op: Op, dst: Parameter) -> Self {
        Instruction::new2(op, dst, Parameter::None)
    }

    pub fn new2(op: Op, dst: Parameter, src: Parameter) -> Self {
        Instruction {
            command: op,
            params: ParameterSet { dst, src },
            length: 0,
            segment_prefix: Segment::Default,
            repeat: RepeatMode::None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RepeatMode {
    None,
    Rep,
    Repe, // alias repz
}

impl RepeatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RepeatMode::None => "",
            RepeatMode::Rep => "rep",
            RepeatMode::Repe => "repe",
        }
    }
}
