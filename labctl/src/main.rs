use std::fmt::Display;
use std::path::PathBuf;
use std::process::exit;

use anyhow::{anyhow, Context};
use clap::{crate_authors, crate_version, Arg, ArgMatches, Command};
use env_logger::Env;
use serde::Serialize;

use labctl::visa::loopback::{Loopback, DEFAULT_IDN};
use labctl::visa::{ResourceManager, Visa, VisaOptions};
use labctl::{Awg, Instrument, InstrumentOptions, PowerSupply, Validation};

fn address_arg() -> Arg<'static> {
    Arg::new("address")
        .required(true)
        .help("Instrument address, e.g. GPIB:7 or IP:10.1.1.1")
}

fn cli() -> Command<'static> {
    Command::new("labctl")
        .author(crate_authors!())
        .version(crate_version!())
        .about("Identify and control lab instruments over VISA")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new("verbose").long("verbose").short('v').help("Log verbose output"))
        .arg(Arg::new("json").long("json").help("Print results as JSON"))
        .arg(
            Arg::new("visa-lib")
                .long("visa-lib")
                .takes_value(true)
                .value_name("PATH")
                .env("LABCTL_VISA_LIB")
                .help("Path to the VISA shared library."),
        )
        .arg(
            Arg::new("no-validate")
                .long("no-validate")
                .help("Open addresses which are not listed by the resource manager."),
        )
        .arg(
            Arg::new("loopback")
                .long("loopback")
                .takes_value(true)
                .multiple_occurrences(true)
                .value_name("RESOURCE")
                .help("Use simulated instruments at the given VISA resources instead of VISA."),
        )
        .subcommand(Command::new("list").about("List all resources visible to VISA"))
        .subcommand(
            Command::new("idn")
                .about("Identify an instrument")
                .arg(address_arg()),
        )
        .subcommand(
            Command::new("awg")
                .about("Arbitrary waveform generator")
                .subcommand_required(true)
                .arg(address_arg())
                .subcommand(Command::new("idn").about("Identify the generator"))
                .subcommand(Command::new("supported").about("Check whether the model is supported")),
        )
        .subcommand(
            Command::new("ps")
                .about("Power supply")
                .subcommand_required(true)
                .arg(address_arg())
                .subcommand(Command::new("on").about("Enable the output"))
                .subcommand(Command::new("off").about("Disable the output"))
                .subcommand(
                    Command::new("set")
                        .about("Select channel, then program voltage and current")
                        .arg(Arg::new("voltage").long("voltage").takes_value(true))
                        .arg(Arg::new("current").long("current").takes_value(true))
                        .arg(Arg::new("channel").long("channel").takes_value(true)),
                )
                .subcommand(
                    Command::new("get")
                        .about("Read voltage, current and channel, or a single one of them")
                        .arg(Arg::new("field").help("voltage, current or channel")),
                ),
        )
}

fn main() {
    let matches = cli().get_matches();

    if matches.is_present("verbose") {
        env_logger::Builder::from_env(Env::default().default_filter_or("labctl=debug")).init();
    } else {
        env_logger::init();
    }

    if let Err(err) = run(&matches) {
        eprintln!("Error: {:#}", err);
        exit(1);
    }
}

fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(rm) = loopback(matches) {
        dispatch(rm, matches)
    } else {
        let visa_options = VisaOptions {
            library: matches.value_of("visa-lib").map(PathBuf::from),
        };
        let rm = Visa::with_options(&visa_options)
            .context("Cannot open the VISA resource manager")?;
        dispatch(rm, matches)
    }
}

/// Simulated instruments requested with `--loopback`, if any.
fn loopback(matches: &ArgMatches) -> Option<Loopback> {
    matches.values_of("loopback").map(|resources| {
        resources.fold(Loopback::new(), |rm, resource| {
            rm.with_instrument(resource, DEFAULT_IDN)
        })
    })
}

fn instrument_options(matches: &ArgMatches) -> InstrumentOptions {
    let validation = if matches.is_present("no-validate") {
        Validation::Unchecked
    } else {
        Validation::Listed
    };
    InstrumentOptions { validation }
}

fn dispatch<R: ResourceManager>(rm: R, matches: &ArgMatches) -> anyhow::Result<()> {
    let options = instrument_options(matches);
    let json = matches.is_present("json");
    match matches.subcommand() {
        Some(("list", _)) => {
            let resources = Instrument::with_options(rm, options).list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resources)?);
            } else {
                for resource in resources {
                    println!("{}", resource);
                }
            }
        }
        Some(("idn", sub)) => {
            let mut instr = Instrument::with_options(rm, options);
            connect(|addr| instr.connect(addr), sub)?;
            print(json, &instr.identify()?)?;
            instr.disconnect()?;
        }
        Some(("awg", sub)) => {
            let mut awg = Awg::with_options(rm, options);
            connect(|addr| awg.connect(addr), sub)?;
            match sub.subcommand() {
                Some(("idn", _)) => print(json, &awg.identify()?)?,
                Some(("supported", _)) => print(json, &awg.is_support()?)?,
                _ => return Err(anyhow!("Missing awg command")),
            }
            awg.disconnect()?;
        }
        Some(("ps", sub)) => {
            let mut ps = PowerSupply::with_options(rm, options);
            connect(|addr| ps.connect(addr), sub)?;
            match sub.subcommand() {
                Some(("on", _)) => ps.on()?,
                Some(("off", _)) => ps.off()?,
                Some(("set", args)) => {
                    let voltage = number_arg(args, "voltage")?;
                    let current = number_arg(args, "current")?;
                    ps.set(voltage, current, args.value_of("channel"))?;
                }
                Some(("get", args)) => print(json, &ps.get(args.value_of("field"))?)?,
                _ => return Err(anyhow!("Missing ps command")),
            }
            ps.disconnect()?;
        }
        _ => return Err(anyhow!("Missing command")),
    }
    Ok(())
}

fn connect<F>(connect: F, matches: &ArgMatches) -> anyhow::Result<()>
where
    F: FnOnce(&str) -> labctl::Result<()>,
{
    let addr = matches
        .value_of("address")
        .ok_or_else(|| anyhow!("Missing address"))?;
    connect(addr).with_context(|| format!("Cannot connect to `{}`", addr))
}

fn number_arg(matches: &ArgMatches, name: &str) -> anyhow::Result<Option<f64>> {
    matches
        .value_of(name)
        .map(|x| {
            x.parse::<f64>()
                .with_context(|| format!("Invalid {} `{}`", name, x))
        })
        .transpose()
}

fn print<T: Serialize + Display>(json: bool, value: &T) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        cli().debug_assert();
    }

    const PS: &str = "GPIB0::7::INSTR";

    fn ps_set(args: &[&'static str]) -> (Loopback, anyhow::Result<()>) {
        let mut argv = vec!["labctl", "--loopback", PS, "ps", "GPIB:7", "set"];
        argv.extend_from_slice(args);
        let matches = cli().get_matches_from(argv);
        let rm = loopback(&matches).unwrap();
        let ret = dispatch(rm.clone(), &matches);
        (rm, ret)
    }

    #[test]
    fn ps_set_against_loopback() {
        let (rm, ret) = ps_set(&["--voltage", "5", "--channel", "P25V"]);
        ret.unwrap();
        assert_eq!(rm.commands(PS), vec!["INST P25V", "VOLT 5"]);
    }

    #[test]
    fn ps_set_rejects_non_finite() {
        let (rm, ret) = ps_set(&["--voltage", "nan", "--channel", "P25V"]);
        assert!(ret.is_err());
        let (rm2, ret2) = ps_set(&["--current", "inf"]);
        assert!(ret2.is_err());
        assert!(rm.commands(PS).is_empty());
        assert!(rm2.commands(PS).is_empty());
    }

    #[test]
    fn no_validate_option() {
        let matches = cli().get_matches_from(vec!["labctl", "--no-validate", "list"]);
        assert_eq!(instrument_options(&matches).validation, Validation::Unchecked);
        let matches = cli().get_matches_from(vec!["labctl", "list"]);
        assert_eq!(instrument_options(&matches).validation, Validation::Listed);
        assert!(loopback(&matches).is_none());
    }

    #[test]
    fn unknown_address_fails() {
        let matches = cli().get_matches_from(vec![
            "labctl",
            "--loopback",
            "GPIB0::7::INSTR",
            "idn",
            "GPIB:8",
        ]);
        assert!(run(&matches).is_err());
    }
}
