//! Decode a PPC3 configuration stream into readable register operations.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use tas3251::protocol::microprogram::{Opcode, Reader};

#[derive(Parser, Debug)]
#[clap(version = env!("CARGO_PKG_VERSION"), about)]
struct Opts {
    /// Configuration stream to decode (.bin)
    file: PathBuf,

    /// Also print the embedded text markers
    #[clap(short, long)]
    text: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let data = fs::read(&opts.file)
        .with_context(|| format!("reading {}", opts.file.display()))?;
    let mut reader = Reader::new(Bytes::from(data))?;

    let mut page = 0u8;
    let mut writes = 0usize;
    while let Some(op) = reader.next_opcode()? {
        match op {
            Opcode::Write { reg: 0, value } => {
                page = value;
                println!("page {:#04x}", value);
            }
            Opcode::Write { reg, value } => {
                writes += 1;
                println!("  [{:#04x}] {:#04x} = {:#04x}", page, reg, value);
            }
            Opcode::Burst { base, values } => {
                writes += values.len();
                println!(
                    "  [{:#04x}] burst {:#04x}..{:#04x} ({} bytes)",
                    page,
                    base,
                    base.wrapping_add(values.len().saturating_sub(1) as u8),
                    values.len()
                );
                for chunk in values.chunks(16) {
                    let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
                    println!("    {}", hex.join(" "));
                }
            }
            Opcode::Delay { ms } => println!("delay {} ms", ms),
            Opcode::SkipText { len } => {
                if opts.text {
                    println!("text marker, {} bytes", len);
                }
            }
        }
    }

    println!("{} register writes total", writes);
    Ok(())
}
