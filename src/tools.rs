use std::fs::File;
use std::io;
use std::io::Read;

/// reads a binary file into a Vec
pub fn read_binary(filename: &str) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut f = File::open(filename)?;
    f.read_to_end(&mut buf)?;
    Ok(buf)
}
