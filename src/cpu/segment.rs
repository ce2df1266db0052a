use std::fmt;

use crate::cpu::register::SR;

/// segment a memory operand resolves through; `Default` is DS, or SS
/// when the base register is BP
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Segment {
    Default,
    ES,
    CS,
    SS,
    DS,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Segment {
    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Default | Segment::DS => "ds",
            Segment::ES => "es",
            Segment::CS => "cs",
            Segment::SS => "ss",
        }
    }

    pub fn as_sr(self) -> SR {
        match self {
            Segment::Default | Segment::DS => SR::DS,
            Segment::ES => SR::ES,
            Segment::CS => SR::CS,
            Segment::SS => SR::SS,
        }
    }
}
