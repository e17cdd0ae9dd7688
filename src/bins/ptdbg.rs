use std::ffi::CString;
use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, error, Level};

use ptdbg::dbginfo::ElfDebugInfo;
use ptdbg::debugger::{Debugger, DebuggerConfig, ShutdownPolicy};
use ptdbg::errors::DebuggerError;
use ptdbg::target::{PtraceTarget, Target};
use ptdbg::ui::cli::CliUi;

/// Debug a program at the source level
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The program to launch as debuggee
    #[clap(short, long)]
    run: PathBuf,

    /// Arguments passed to the debuggee
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Lines of source shown above and below the current line
    #[clap(short, long, default_value_t = 2)]
    context: usize,

    /// Detach from the debuggee on exit instead of killing it
    #[clap(long)]
    detach_on_exit: bool,

    /// Maximum level of log messages
    #[clap(long, default_value = "info")]
    log_level: Level,
}

fn main() -> Result<(), DebuggerError> {
    human_panic::setup_panic!();
    let args = Args::parse();

    setup_logger(args.log_level);
    debug!("set up the logger");

    let debuggee_args = args
        .args
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<Result<Vec<_>, _>>()?;
    let config = DebuggerConfig {
        context_lines: args.context,
        on_exit: if args.detach_on_exit {
            ShutdownPolicy::Detach
        } else {
            ShutdownPolicy::Kill
        },
    };

    let ui = CliUi::build()?;

    let mut target = PtraceTarget::launch(&args.run, &debuggee_args)?;
    let exe = target.executable().unwrap_or(args.run.as_path()).to_owned();
    let info = match ElfDebugInfo::load(&exe) {
        Ok(info) => info,
        Err(e) => {
            error!("could not load the debug information of {}: {e}", exe.display());
            target.kill()?;
            return Err(e);
        }
    };

    // on failure, attach has already killed or detached the target
    let mut debugger = Debugger::attach(target, info, ui, config)?;
    let res = debugger.run_debugger();
    debugger.cleanup()?;
    res
}

fn setup_logger(level: Level) {
    // construct a subscriber that prints formatted traces to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    // use that subscriber to process traces emitted after this point
    tracing::subscriber::set_global_default(subscriber).expect("could not setup logger");
}
