use std::io::{self, Read};
use std::process;

use clap::{App, Arg};

use mzbox::machine::run_exe;
use mzbox::tools;

fn main() {
    let matches = App::new("mzbox")
        .version("0.1")
        .about("runs real-mode 16-bit MZ executables")
        .arg(Arg::with_name("INPUT")
            .help("MZ executable to run, or - for standard input")
            .required(true)
            .index(1))
        .get_matches();

    let filename = matches.value_of("INPUT").unwrap();

    let data = if filename == "-" {
        let mut buf = Vec::new();
        match io::stdin().read_to_end(&mut buf) {
            Ok(_) => buf,
            Err(why) => {
                eprintln!("mzbox: error reading standard input: {}", why);
                process::exit(1);
            }
        }
    } else {
        match tools::read_binary(filename) {
            Ok(data) => data,
            Err(why) => {
                eprintln!("mzbox: error reading {}: {}", filename, why);
                process::exit(1);
            }
        }
    };

    match run_exe(&data[..]) {
        Ok(machine) => {
            eprintln!("{}", machine.cpu.regs);
            process::exit(i32::from(machine.exit_code()));
        }
        Err(why) => {
            eprintln!("mzbox: {}", why);
            process::exit(1);
        }
    }
}
