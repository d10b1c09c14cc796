//! Command line access to a Nexus client behind a JTAG cable.
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use nexus_api::cable::{self, Cable};
use nexus_api::jtag::{JtagConfig, JtagHal, NEXUS_ACCESS};
use nexus_api::sim::SimTarget;
use nexus_api::statemachine::JtagSM;
use nexus_api::taps::{TapInfo, Taps};
use nexus_api::{AccessSize, CtrlData, Endian, Handle, LogSink, ReceivedEvent, TargetSpec};

type JtagHandle = Handle<JtagHal<Box<dyn Cable>>>;

#[derive(Parser, Debug)]
#[command(name = "nxscan", version, about = "Talk to a Nexus debug client over JTAG")]
struct Cli {
    /// Cable to use: sim, jtagkey, jtagkey-b or jlink
    #[arg(short, long, default_value = "sim")]
    cable: String,

    /// TCK frequency in hertz
    #[arg(long, default_value_t = 1_000_000)]
    clock: u32,

    /// Position of the Nexus TAP in the chain, 0 being nearest TDO
    #[arg(long, default_value_t = 0)]
    tap: usize,

    /// IR length of every TAP, nearest TDO first.  Detected when left out.
    #[arg(long = "ir-len", value_delimiter = ',')]
    ir_len: Vec<usize>,

    /// NEXUS-ACCESS instruction opcode
    #[arg(long = "nexus-ir", value_parser = parse_u32, default_value_t = NEXUS_ACCESS)]
    nexus_ir: u32,

    /// Log more; repeat for more still
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the scan chain and what the target can do
    Info,
    /// Dump target memory
    Read {
        #[arg(value_parser = parse_u64)]
        addr: u64,
        #[arg(default_value_t = 64)]
        len: usize,
        /// Access size in bytes
        #[arg(long, default_value_t = 4)]
        size: usize,
        #[arg(long, default_value_t = 0)]
        map: u32,
    },
    /// Write values to target memory, one access each
    Write {
        #[arg(value_parser = parse_u64)]
        addr: u64,
        #[arg(value_parser = parse_u64, required = true)]
        values: Vec<u64>,
        /// Access size in bytes
        #[arg(long, default_value_t = 4)]
        size: usize,
        #[arg(long, default_value_t = 0)]
        map: u32,
    },
    /// Stop the target and show its registers
    Halt {
        /// Reset the target first
        #[arg(long)]
        reset: bool,
    },
    /// Print events as the target produces them
    Events {
        /// Stop after this many
        #[arg(long)]
        count: Option<usize>,
    },
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{:?}: {}", s, e))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| format!("{:#x} does not fit in 32 bits", value))
}

fn open_cable(cli: &Cli) -> Result<Box<dyn Cable>> {
    if cli.cable == "sim" {
        let target = SimTarget::default();
        return Ok(Box::new(target.tap()));
    }
    cable::new_from_string(&cli.cable, cli.clock).with_context(|| format!("opening {} cable", cli.cable))
}

fn open(cli: &Cli) -> Result<(JtagHandle, Vec<TapInfo>)> {
    let sm = JtagSM::new(open_cable(cli)?)?;
    let mut taps = Taps::new(sm);
    let chain = if cli.ir_len.is_empty() {
        taps.detect().context("detecting the scan chain")?
    } else {
        for len in &cli.ir_len {
            taps.add_tap(*len);
        }
        Vec::new()
    };

    let config = JtagConfig {
        tap: cli.tap,
        ir_lengths: cli.ir_len.clone(),
        nexus_access: cli.nexus_ir,
        ..JtagConfig::default()
    };
    let hal = JtagHal::new(taps, config);
    let handle = Handle::open(TargetSpec::jtag(Endian::Unknown), hal, LogSink).context("opening the target")?;
    Ok((handle, chain))
}

fn access_size(bytes: usize) -> Result<AccessSize> {
    AccessSize::from_bytes(bytes).ok_or_else(|| anyhow!("no {}-byte access size", bytes))
}

fn dump(addr: u64, data: &[u8]) {
    for (i, line) in data.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{:08x}: {}", addr + (i * 16) as u64, hex.join(" "));
    }
}

fn print_event(event: &ReceivedEvent) {
    match event {
        ReceivedEvent::Message(msg) => {
            let packets: Vec<String> = msg
                .packets()
                .iter()
                .map(|p| match p.value() {
                    Some(v) => format!("{:#x}/{}", v, p.bits()),
                    None => format!("{:02x?}/{}", p.data(), p.bits()),
                })
                .collect();
            println!("message tcode {:?}: {}", msg.tcode(), packets.join(" "));
        }
        ReceivedEvent::BreakStep(regs) => {
            println!("stopped");
            for (n, r) in regs.int_regs.iter().enumerate() {
                print!("r{:<2} {:016x}{}", n, r, if n % 4 == 3 { "\n" } else { "  " });
            }
        }
        ReceivedEvent::InputPin { level } => println!("input pin {}", if *level { "high" } else { "low" }),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let (mut handle, chain) = open(cli)?;
    match &cli.command {
        Command::Info => {
            for (i, tap) in chain.iter().enumerate() {
                match tap.idcode {
                    Some(id) => println!("tap {}: idcode {:#010x}, IR {} bits", i, id, tap.irlen),
                    None => println!("tap {}: bypass, IR {} bits", i, tap.irlen),
                }
            }
            let cap = handle.capability();
            println!("api:        {}", cap.api_version);
            println!("hal:        {}", cap.hal_info);
            println!("device id:  {:#010x}", cap.device_id);
            println!("endian:     {:?}", cap.target_endian);
            println!("memory:     {} maps, {} priorities, {}-bit accesses", cap.max_mem_map, cap.max_mem_access_priority, cap.max_access_size);
            println!("breakpoint: {}..{}", cap.breakpoint.min, cap.breakpoint.max);
            println!("watchpoint: {}..{}", cap.watch.min, cap.watch.max);
            println!("btm/dtm/otm/subst: {} {} {} {}", cap.btm.min, cap.dtm.min, cap.otm.min, cap.substitution.min);
        }
        Command::Read { addr, len, size, map } => {
            let data = handle.read_mem(*map, 0, *addr, *len, access_size(*size)?)?;
            dump(*addr, &data);
        }
        Command::Write { addr, values, size, map } => {
            let endian = handle.capability().target_endian;
            let mut data = Vec::with_capacity(values.len() * size);
            for v in values {
                let bytes = endian
                    .word_to_bytes(*v, *size)
                    .ok_or_else(|| anyhow!("cannot lay out {}-byte values on a {:?} endian target", size, endian))?;
                data.extend(bytes);
            }
            handle.write_mem(*map, 0, *addr, access_size(*size)?, &data)?;
        }
        Command::Halt { reset } => {
            handle.control(&CtrlData::ResetOrHalt { perform_reset_sequence: *reset, halt: true })?;
            match handle.get_event(usize::MAX, false)? {
                Some(event) => print_event(&event),
                None => bail!("target did not stop"),
            }
        }
        Command::Events { count } => {
            let mut seen = 0;
            while count.map_or(true, |c| seen < c) {
                if let Some(event) = handle.get_event(usize::MAX, true)? {
                    print_event(&event);
                    seen += 1;
                }
            }
        }
    }
    handle.close()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _logger = flexi_logger::Logger::try_with_env_or_str(level)?.start()?;
    run(&cli)
}
