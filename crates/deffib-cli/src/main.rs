use anyhow::Context;
use clap::Parser;
use deffib_cli::CliConfig;
use deffib_pin::PinMode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "deffib",
    about = "Dispatch a deferred Fibonacci fill into a shared page, wait for it and verify the result."
)]
struct Args {
    /// Number of fills to dispatch, one after another, into the same page
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    runs: u32,

    /// Region size in bytes (power of two; defaults to the host page size)
    #[arg(long, value_name = "BYTES")]
    region_size: Option<usize>,

    /// How the worker keeps the page resident: `lock` (mlock) or `reference`
    #[arg(long, value_name = "MODE")]
    pin_mode: Option<PinMode>,

    /// Do not yield the worker thread between values
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_yield: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, value_name = "FILTER", default_value = "info")]
    log_level: String,

    /// Suppress the success line on stdout
    #[arg(long, action = clap::ArgAction::SetTrue)]
    quiet: bool,
}

impl Args {
    fn apply(&self, cfg: &mut CliConfig) {
        if let Some(size) = self.region_size {
            cfg.region_size = Some(size);
        }
        if let Some(mode) = self.pin_mode {
            cfg.pin_mode = mode;
        }
        if self.no_yield {
            cfg.yield_between_steps = false;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .with_context(|| format!("invalid --log-level {}", args.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = CliConfig::from_env()?;
    args.apply(&mut cfg);
    run(&args, &cfg)
}

#[cfg(target_os = "linux")]
fn run(args: &Args, cfg: &CliConfig) -> anyhow::Result<()> {
    use deffib_cli::Session;

    let session = Session::open(cfg)?;
    let mut page = session.alloc_page()?;
    tracing::info!(
        device = session.name(),
        region_size = session.region_size(),
        capacity = deffib_layout::capacity(session.region_size()),
        runs = args.runs,
        "starting"
    );

    for run in 1..=args.runs {
        let outcome = session
            .fill_once(&mut page)
            .with_context(|| format!("run {run} of {} failed", args.runs))?;
        tracing::info!(
            run,
            capacity = outcome.capacity,
            waits = outcome.waits,
            elapsed = ?outcome.elapsed,
            "page verified"
        );
    }

    if !args.quiet {
        println!("Success!");
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run(_args: &Args, _cfg: &CliConfig) -> anyhow::Result<()> {
    anyhow::bail!("deffib requires Linux (/proc/self/maps and mlock)")
}
