use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use librc522::delay::StdDelay;
use librc522::rc522::backend::{I2cBackend, RegisterBackend, UartBackend};
use librc522::rc522::protocol::RequestCode;
use librc522::rc522::session::{is_sector_trailer, sector_of};
use librc522::rc522::BLOCK_SIZE;
use librc522::{Card, Config, Ft4232h, I2cFtBitbang, Key, KeyType, Rc522, RxGain, Status};

/// Blocks on a MIFARE Classic 1K card
const CARD_BLOCKS: u8 = 64;

type Reader = Rc522<Box<dyn RegisterBackend>, StdDelay>;

#[derive(Parser)]
#[command(name = "rc522_cli", version = "1.0")]
struct Args {
    #[command(flatten)]
    transport: Transport,

    /// Baud rate of the serial link
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// 7-bit I2C address of the reader
    #[arg(long, default_value = "0x3F", value_parser = parse_u8)]
    i2c_addr: u8,

    /// Receiver gain in dB (18..48)
    #[arg(long, default_value_t = 48)]
    gain: u8,

    /// Wake halted cards too (WUPA instead of REQA)
    #[arg(long)]
    wake_all: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Command to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct Transport {
    /// Serial port of a UART-wired reader
    #[arg(long)]
    serial: Option<String>,

    /// Description of the FT4232H channel bit-banging I2C to the reader
    #[arg(long)]
    ftdi: Option<String>,
}

#[derive(clap::Args)]
struct KeyArgs {
    /// Sector key as 12 hex digits
    #[arg(long, default_value = "FFFFFFFFFFFF", value_parser = parse_key)]
    key: Key,

    /// Authenticate with key B instead of key A
    #[arg(long)]
    key_b: bool,
}

impl KeyArgs {
    fn key_type(&self) -> KeyType {
        if self.key_b { KeyType::B } else { KeyType::A }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the chip version
    Version,
    /// Dump the chip's register file
    Registers,
    /// Print type and UID of the card in the field
    Uid,
    /// Read one block
    Read {
        block: u8,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Write hex data to the start of a block, keeping the rest
    Write {
        block: u8,
        /// Up to 16 bytes as hex
        data: String,
        #[command(flatten)]
        key: KeyArgs,
        /// Allow writing sector trailers (keys and access bits)
        #[arg(long)]
        force: bool,
    },
    /// Read every block of a 1K card
    Dump {
        #[command(flatten)]
        key: KeyArgs,
        /// Write the raw image here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

fn parse_key(s: &str) -> Result<Key, String> {
    let mut key = [0u8; 6];
    hex::decode_to_slice(s, &mut key).map_err(|e| format!("invalid key: {e}"))?;
    Ok(Key(key))
}

fn open_backend(args: &Args) -> Result<Box<dyn RegisterBackend>> {
    if let Some(port) = &args.transport.serial {
        let port = serialport::new(port, args.baud)
            .timeout(Duration::from_millis(100))
            .open()?;
        return Ok(Box::new(UartBackend::new(port)));
    }

    if let Some(description) = &args.transport.ftdi {
        let device = Ft4232h::with_description(description)?;
        let bus = I2cFtBitbang::new(device);
        return Ok(Box::new(I2cBackend::with_address(bus, args.i2c_addr)));
    }

    Err(anyhow!("No transport selected"))
}

fn activate(reader: &mut Reader, code: RequestCode) -> Result<Card> {
    match reader.detect(code) {
        Ok(card) => Ok(card),
        Err(e) if e.status() == Status::NoTag => Err(anyhow!("No card in the field")),
        Err(e) => Err(e.into()),
    }
}

fn print_block(block: u8, data: &[u8; BLOCK_SIZE]) {
    println!("{block:>3}: {}", hex::encode_upper(data));
}

fn dump(reader: &mut Reader, code: RequestCode, key: &KeyArgs, output: Option<PathBuf>) -> Result<()> {
    let mut card = activate(reader, code)?;
    println!("[+] {} {}", card.card_type(), card.uid);

    let progress = ProgressBar::new(CARD_BLOCKS as u64).with_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {msg} {bar:40.cyan/blue} {pos} / {len} blocks")?,
    );
    progress.set_message("Reading");

    let mut image = vec![0u8; CARD_BLOCKS as usize * BLOCK_SIZE];
    let mut unreadable = vec![];
    let mut sector_ok = false;

    for block in 0..CARD_BLOCKS {
        if block % 4 == 0 {
            sector_ok = match reader.authenticate(key.key_type(), block, &key.key, card.uid) {
                Ok(()) => true,
                Err(e) => {
                    log::info!("sector {}: {e}", sector_of(block));
                    unreadable.push(sector_of(block));
                    // failed authentication drops the card back to IDLE
                    card = activate(reader, RequestCode::All)?;
                    false
                }
            };
        }

        if sector_ok {
            let data = reader.read_block(block)?;
            let offset = block as usize * BLOCK_SIZE;
            image[offset..offset + BLOCK_SIZE].copy_from_slice(&data);
        }
        progress.inc(1);
    }
    progress.finish_and_clear();
    reader.halt()?;

    match output {
        Some(path) => {
            let mut file = File::create(&path)?;
            file.write_all(&image)?;
            println!("[*] Wrote {} bytes to {}", image.len(), path.display());
        }
        None => {
            for (block, chunk) in image.chunks_exact(BLOCK_SIZE).enumerate() {
                let mut data = [0u8; BLOCK_SIZE];
                data.copy_from_slice(chunk);
                print_block(block as u8, &data);
            }
        }
    }

    if !unreadable.is_empty() {
        eprintln!("[!] Sectors not readable with this key: {unreadable:?}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::Level::Warn,
        1 => log::Level::Info,
        2 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    simple_logger::init_with_level(level)?;

    let code = if args.wake_all { RequestCode::All } else { RequestCode::Idle };
    let config = Config::default().with_rx_gain(RxGain::from_db(args.gain));
    let backend = open_backend(&args)?;
    let mut reader = Rc522::with_config(backend, StdDelay, config);
    reader.init()?;

    match args.command {
        Command::Version => {
            println!("[+] Chip version: {:?}", reader.version()?);
        }
        Command::Registers => {
            for (register, value) in reader.dump_registers()? {
                println!("{:#04X} {register:<16?} {value:#04X}", register.address());
            }
        }
        Command::Uid => {
            let card = activate(&mut reader, code)?;
            println!("[+] Card type: {}", card.card_type());
            println!("[+] UID: {}", card.uid);
            println!("[+] SAK: {:#04X}", card.sak.0);
            reader.halt()?;
        }
        Command::Read { block, key } => {
            let card = activate(&mut reader, code)?;
            reader.authenticate(key.key_type(), block, &key.key, card.uid)?;
            print_block(block, &reader.read_block(block)?);
            reader.halt()?;
        }
        Command::Write { block, data, key, force } => {
            let bytes = hex::decode(&data)?;
            if bytes.len() > BLOCK_SIZE {
                return Err(anyhow!("At most {BLOCK_SIZE} bytes fit a block, got {}", bytes.len()));
            }
            if is_sector_trailer(block) && !force {
                return Err(anyhow!("Block {block} is a sector trailer, pass --force to overwrite keys"));
            }

            let card = activate(&mut reader, code)?;
            reader.authenticate(key.key_type(), block, &key.key, card.uid)?;
            let mut contents = reader.read_block(block)?;
            print_block(block, &contents);
            contents[..bytes.len()].copy_from_slice(&bytes);
            reader.write_block(block, &contents)?;
            print_block(block, &reader.read_block(block)?);
            reader.halt()?;
            println!("[*] Done");
        }
        Command::Dump { key, output } => {
            dump(&mut reader, code, &key, output)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u8() {
        assert_eq!(parse_u8("0x3F"), Ok(0x3F));
        assert_eq!(parse_u8("40"), Ok(40));
        assert!(parse_u8("0x100").is_err());
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("A0A1A2A3A4A5").unwrap(), Key([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]));
        assert!(parse_key("FFFF").is_err());
    }

    #[test]
    fn test_args_require_one_transport() {
        assert!(Args::try_parse_from(["rc522_cli", "uid"]).is_err());
        assert!(Args::try_parse_from(["rc522_cli", "--serial", "a", "--ftdi", "b", "uid"]).is_err());
        let args = Args::try_parse_from(["rc522_cli", "--serial", "/dev/ttyUSB0", "read", "8"]).unwrap();
        assert!(matches!(args.command, Command::Read { block: 8, .. }));
    }
}
