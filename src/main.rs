use std::process;

use anyhow::{Context, Result};
use clap::{App, Arg, ArgGroup, ArgMatches};

use gwatch::{Config, Tracer, Variable};

const EXIT_USAGE: i32 = 1;
const EXIT_FAILURE: i32 = 2;

fn app() -> App<'static, 'static> {
    App::new("gwatch")
        .about("Reports every read and write of a global variable of a program")
        .arg(
            Arg::with_name("var")
                .long("var")
                .value_name("SYMBOL")
                .help("Watch an unsigned variable")
                .requires("exec"),
        )
        .arg(
            Arg::with_name("svar")
                .long("svar")
                .value_name("SYMBOL")
                .help("Watch a signed variable")
                .requires("exec"),
        )
        .group(ArgGroup::with_name("variable").args(&["var", "svar"]))
        .arg(
            Arg::with_name("exec")
                .long("exec")
                .value_name("PATH")
                .help("Program to launch")
                .requires("variable"),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .short("c")
                .value_name("FILE")
                .help("Read the session from a TOML file"),
        )
        .group(ArgGroup::with_name("target").args(&["exec", "config"]).required(true))
        .arg(
            Arg::with_name("no-aslr")
                .long("no-aslr")
                .help("Disable address space randomisation in the program"),
        )
        .arg(
            Arg::with_name("args")
                .value_name("ARGS")
                .help("Arguments passed to the program")
                .multiple(true)
                .last(true),
        )
}

fn tracer(matches: &ArgMatches) -> Result<Tracer> {
    let mut tracer = if let Some(path) = matches.value_of_os("config") {
        Tracer::from_config(Config::load(path)?)
    } else {
        let variable = match (matches.value_of("var"), matches.value_of("svar")) {
            (_, Some(name)) => Variable::signed(name),
            (Some(name), None) => Variable::unsigned(name),
            (None, None) => anyhow::bail!("one of --var or --svar is required"),
        };
        let program = matches.value_of_os("exec").context("--exec is required")?;
        let args = matches.values_of_os("args").into_iter().flatten();

        Tracer::new(program, args, variable)
    };

    if matches.is_present("no-aslr") {
        tracer.command_mut().disable_aslr();
    }

    tracer.on_read(|var| println!("{}\tread:\t{}", var.name(), var));
    tracer.on_write(|previous, var| println!("{}\twrite:\t{} -> {}", var.name(), previous, var));

    Ok(tracer)
}

fn main() {
    env_logger::init();

    let matches = app().get_matches_safe().unwrap_or_else(|e| e.exit());

    let mut tracer = tracer(&matches).unwrap_or_else(|e| {
        eprintln!("{:#}", e);
        process::exit(EXIT_USAGE)
    });

    if let Err(e) = tracer.run() {
        eprintln!("{:#}", anyhow::Error::from(e));
        process::exit(EXIT_FAILURE)
    }
}
