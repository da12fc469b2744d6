use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};

use ofsm_core::Tick;
use ofsm_fsm::DelayBase;
use ofsm_posix::HostPlatform;
use ofsm_sched::{LatchPlatform, SchedulerConfig};
use ofsm_sim::{Machine, Simulator, WakeMode};

#[derive(Parser, Debug)]
#[command(author, version, about = "Script and interactive simulator for OFSM")]
struct Opts {
    /// Script file; commands are read from stdin when absent
    #[arg(value_name = "SCRIPT")]
    script: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Machine::Test)]
    machine: Machine,

    /// When the scheduler runs in synchronous mode
    #[arg(long, value_enum, default_value_t = WakeMode::Auto)]
    wake: WakeMode,

    /// Run the scheduler on its own thread with a heartbeat ticker
    #[arg(long)]
    threaded: bool,

    #[arg(long = "tick-ms", default_value_t = 1000, value_name = "MS")]
    tick_ms: u64,

    #[arg(long = "queue-size", value_name = "SLOTS")]
    queue_size: Option<usize>,

    #[arg(long = "default-delay", value_name = "TICKS")]
    default_delay: Option<Tick>,

    /// Measure transition delays from before or after the handler
    #[arg(long = "delay-base", value_enum, default_value_t = Base::Pre)]
    delay_base: Base,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Base {
    Pre,
    Post,
}

impl From<Base> for DelayBase {
    fn from(base: Base) -> Self {
        match base {
            Base::Pre => DelayBase::BeforeHandler,
            Base::Post => DelayBase::AfterHandler,
        }
    }
}

/// Coloured log lines on stderr, keeping stdout for script output.
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR".red().bold(),
            Level::Warn => "WARN".yellow(),
            Level::Info => "INFO".green(),
            Level::Debug => "DEBUG".blue(),
            Level::Trace => "TRACE".dimmed(),
        };
        eprintln!("{level} {}", record.args());
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) -> Result<()> {
    log::set_logger(&LOGGER).map_err(|err| anyhow!("{err}"))?;
    log::set_max_level(match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });
    Ok(())
}

fn main() -> Result<ExitCode> {
    let opts = Opts::parse();
    init_logging(opts.verbose)?;

    let machine = opts.machine;
    let config = SchedulerConfig::builder()
        .name("ofsm-sim")
        .default_delay(opts.default_delay.unwrap_or(machine.default_delay()))
        .delay_base(opts.delay_base.into())
        .build();
    let queue_size = opts.queue_size.unwrap_or(machine.default_queue_size());
    let startup = machine.startup_event();
    let out = io::stdout().lock();

    let failures = if opts.threaded {
        let orchestrator = machine
            .build(config, queue_size, None, HostPlatform::new())
            .context("invalid machine configuration")?;
        let tick = Duration::from_millis(opts.tick_ms);
        let mut simulator = Simulator::threaded(orchestrator, tick, startup, out)
            .context("failed to start the host simulation")?;
        run(&mut simulator, opts.script.as_deref())?
    } else {
        let orchestrator = machine
            .build(config, queue_size, None, LatchPlatform::new())
            .context("invalid machine configuration")?;
        let mut simulator = Simulator::script(orchestrator, opts.wake, startup, out);
        run(&mut simulator, opts.script.as_deref())?
    };

    Ok(ExitCode::from(u8::try_from(failures).unwrap_or(u8::MAX)))
}

fn run<W: Write>(simulator: &mut Simulator<W>, script: Option<&Path>) -> Result<usize> {
    let failures = match script {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("cannot open script {}", path.display()))?;
            simulator.run_script(BufReader::new(file))?
        }
        None => simulator.run_script(io::stdin().lock())?,
    };
    Ok(failures)
}
