//! Standalone command-line tool: opens a master on one network interface, optionally loads
//! device-description defaults from an environment directory, and enumerates slaves with their
//! identity and lifecycle state.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use fieldring::config::MasterConfig;
use fieldring::device::DatalinkDevice;
use fieldring::device_description;
use fieldring::master::Master;
use fieldring::master::MasterRegistry;
use fieldring::slave::Identity;

#[derive(Debug, Parser)]
#[command(name = "fieldring-cli", about = "Inspect and drive a fieldring master")]
struct Opt {
    #[command(subcommand)]
    action: Action,

    /// Which of the host's master instances to attach to.
    #[arg(short = 'm', long, global = true, default_value_t = 0)]
    master: usize,

    /// Restrict output to these ring positions (comma-separated); default is all slaves.
    #[arg(short = 's', long, global = true)]
    slaves: Option<String>,

    /// Suppress everything but warnings and errors.
    #[arg(short = 'q', long, global = true, conflicts_with_all = ["verbose", "debug"])]
    quiet: bool,

    /// Increase logging verbosity (info).
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Full debug logging.
    #[arg(short = 'd', long, global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Enumerate slaves with their identity and lifecycle state.
    #[command(alias = "ls", alias = "slaves")]
    List {
        /// Network interface the master owns.
        #[arg(long)]
        interface: String,

        /// Directory of device-description files.
        #[arg(long)]
        environment: Option<PathBuf>,

        /// How many ticks to run before printing the table, letting lifecycle FSMs settle.
        #[arg(long, default_value_t = 5)]
        ticks: u32,

        /// Slaves to register before ticking, as `ring_position:vendor_id:product_code`.
        #[arg(long = "expect")]
        expect: Vec<String>,
    },
}

fn main() -> ExitCode {
    let opt = match Opt::try_parse() {
        Ok(opt) => opt,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    let level = if opt.quiet {
        log::LevelFilter::Warn
    } else if opt.debug {
        log::LevelFilter::Debug
    } else if opt.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Error
    };
    env_logger::Builder::new().filter_level(level).init();

    let selector = match opt.slaves.as_deref().map(parse_ring_positions).transpose() {
        Ok(selector) => selector,
        Err(message) => {
            eprintln!("invalid -s/--slaves selector: {message}");
            return ExitCode::from(1);
        }
    };

    let result = match opt.action {
        Action::List {
            interface,
            environment,
            ticks,
            expect,
        } => run_list(opt.master, selector.as_deref(), &interface, environment, ticks, &expect),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("fieldring-cli: {message}");
            ExitCode::from(1)
        }
    }
}

fn run_list(
    master_index: usize,
    selector: Option<&[u16]>,
    interface: &str,
    environment: Option<PathBuf>,
    ticks: u32,
    expect: &[String],
) -> Result<(), String> {
    let mut registry: MasterRegistry<4> = MasterRegistry::new();
    let _lease = registry
        .request(master_index)
        .map_err(|e| format!("master {master_index}: {e}"))?;

    if let Some(dir) = environment {
        let descriptions = device_description::load_directory(&dir);
        log::info!("loaded {} device description(s) from {:?}", descriptions.len(), dir);
    }

    let config = MasterConfig::builder()
        .interface_name(interface)
        .build()
        .map_err(|e| e.to_string())?;

    let mut master: Master<32> = Master::new(config);
    for entry in expect {
        let (ring_position, identity) = parse_expected_slave(entry)?;
        master
            .register_slave(usize::from(ring_position), identity.vendor_id, identity.product_code, identity)
            .map_err(|e| format!("registering slave at {ring_position}: {e}"))?;
    }

    let mut device = DatalinkDevice::open(interface).map_err(|e| format!("opening {interface}: {e}"))?;
    for _ in 0..ticks {
        master.tick(&mut device).map_err(|e| e.to_string())?;
    }

    println!("{:<6} {:<10} {:<10} {:<10} {:<8} {:<8}", "RING", "VENDOR", "PRODUCT", "REVISION", "SERIAL", "STATE");
    for slave in master.slaves() {
        if let Some(selector) = selector {
            if !selector.contains(&slave.ring_position) {
                continue;
            }
        }
        println!(
            "{:<6} {:<#10x} {:<#10x} {:<#10x} {:<#8x} {:<8?}",
            slave.ring_position,
            slave.identity.vendor_id,
            slave.identity.product_code,
            slave.identity.revision,
            slave.identity.serial,
            slave.current_state,
        );
    }

    Ok(())
}

fn parse_ring_positions(s: &str) -> Result<Vec<u16>, String> {
    s.split(',')
        .map(|part| part.trim().parse::<u16>().map_err(|_| format!("'{part}' is not a ring position")))
        .collect()
}

fn parse_expected_slave(entry: &str) -> Result<(u16, Identity), String> {
    let mut fields = entry.split(':');
    let ring_position = fields
        .next()
        .ok_or_else(|| format!("'{entry}' is missing a ring position"))?
        .parse::<u16>()
        .map_err(|_| format!("'{entry}' has an invalid ring position"))?;
    let vendor_id = parse_hex_or_decimal(fields.next().ok_or_else(|| format!("'{entry}' is missing a vendor id"))?)?;
    let product_code = parse_hex_or_decimal(fields.next().ok_or_else(|| format!("'{entry}' is missing a product code"))?)?;

    Ok((
        ring_position,
        Identity {
            vendor_id,
            product_code,
            revision: 0,
            serial: 0,
        },
    ))
}

fn parse_hex_or_decimal(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).map_err(|_| format!("'{s}' is not a valid hex number"))
    } else {
        s.parse::<u32>().map_err(|_| format!("'{s}' is not a valid number"))
    }
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Opt::command().debug_assert()
}
