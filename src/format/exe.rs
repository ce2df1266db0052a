use crate::{EmuError, Result};

#[cfg(test)]
#[path = "./exe_test.rs"]
mod exe_test;

const PARAGRAPH_SIZE: usize = 16;

/// http://www.delorie.com/djgpp/doc/exe/
#[derive(Clone, Debug, PartialEq)]
pub struct ExeHeader {
    /// magic number "MZ"
    pub signature: [u8; 2],

    /// number of 4-byte entries in the relocation table
    pub relocation_items: u16,

    /// header size in paragraphs
    pub header_paragraphs: u16,

    /// initial SS relative to start of executable
    pub ss: u16,

    /// initial SP
    pub sp: u16,

    /// initial value of the IP register
    pub ip: u16,

    /// initial value of the CS register
    pub cs: u16,

    /// offset within the file of the relocation table
    pub reloc_table_offset: u16,
}

/// a parsed MZ image: the header plus the load module that follows
/// the header area
#[derive(Clone, Debug, PartialEq)]
pub struct Exe {
    pub header: ExeHeader,
    pub load_module: Vec<u8>,
}

impl Exe {
    /// parses an MZ image. the relocation table (if any) sits inside
    /// the reserved header area and is skipped over; fix-ups are not
    /// applied.
    pub fn parse(data: &[u8]) -> Result<Exe> {
        if data.len() < 2 {
            return Err(EmuError::TruncatedHeader("0-1"));
        }
        let signature = [data[0], data[1]];
        if signature != *b"MZ" {
            return Err(EmuError::BadSignature(signature));
        }

        let relocation_items = word_at(data, 6, "6-7")?;
        let header_paragraphs = word_at(data, 8, "8-9")?;
        let ss = word_at(data, 14, "14-15")?;
        let sp = word_at(data, 16, "16-17")?;
        let ip = word_at(data, 20, "20-21")?;
        let cs = word_at(data, 22, "22-23")?;
        let reloc_table_offset = word_at(data, 24, "24-25")?;
        // bytes 2-5, 10-13, 18-19 and 26-31 are present but unused
        word_at(data, 30, "26-31")?;

        let header_len = header_paragraphs as usize * PARAGRAPH_SIZE;
        if header_len < 32 {
            return Err(EmuError::HeaderTooSmall(header_paragraphs));
        }
        if data.len() < header_len {
            return Err(EmuError::TruncatedHeader("32-"));
        }

        Ok(Exe {
            header: ExeHeader {
                signature,
                relocation_items,
                header_paragraphs,
                ss,
                sp,
                ip,
                cs,
                reloc_table_offset,
            },
            load_module: data[header_len..].to_vec(),
        })
    }
}

/// little-endian 16-bit field at a fixed header offset
fn word_at(data: &[u8], offset: usize, range: &'static str) -> Result<u16> {
    if offset + 1 >= data.len() {
        return Err(EmuError::TruncatedHeader(range));
    }
    Ok(u16::from(data[offset + 1]) << 8 | u16::from(data[offset]))
}
