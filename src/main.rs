use std::fs::File;
use std::io::{self, BufReader, IsTerminal};

use anyhow::Context;
use clap::{crate_version, App, Arg};
use tracing_subscriber::filter::LevelFilter;

use athanor::driver::{Driver, Outcome};
use athanor::input::{LineSource, PromptSource, ReaderSource};

fn main() -> anyhow::Result<()> {
    let matches = App::new("athanor")
        .version(crate_version!())
        .about("compile-and-execute REPL for a small numeric expression language")
        .arg(
            Arg::with_name("script")
                .help("script file to run instead of an interactive session")
                .index(1),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .help("increase log verbosity (-v debug, -vv trace)"),
        )
        .get_matches();

    init_logging(matches.occurrences_of("verbose"));

    let source: Box<dyn LineSource> = match matches.value_of("script") {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("failed to open script '{}'", path))?;
            Box::new(ReaderSource::new(BufReader::new(file)))
        }
        None if io::stdin().is_terminal() => Box::new(
            PromptSource::new("ready> ").context("failed to start the line editor")?,
        ),
        None => Box::new(ReaderSource::new(BufReader::new(io::stdin()))),
    };

    run(Driver::new(source));
    Ok(())
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn run(mut driver: Driver<Box<dyn LineSource>>) {
    while let Some(step) = driver.step() {
        match step {
            Ok(Outcome::Evaluated(value)) => println!("Evaluated to {}", value),
            Ok(Outcome::Defined(name)) => eprintln!("Defined function '{}'", name),
            Ok(Outcome::Declared(name)) => eprintln!("Declared extern '{}'", name),
            Err(err) => eprintln!("error: {}", err),
        }
    }
}
