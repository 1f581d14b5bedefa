use std::path::PathBuf;

use clap::Parser;
use miadapter::{
    spawn_debugger, BreakpointOptions, DebugEvent, DebugSession, DebuggerKind, LaunchConfig,
    ResumeOptions, StackFramesOptions, StartOptions,
};
use tokio::sync::broadcast::error::RecvError;

/// Run a program under an MI debugger and print its events as JSON lines
#[derive(Parser, Debug)]
#[command(name = "midbg", version)]
struct Args {
    /// Program to debug
    program: PathBuf,

    /// Arguments for the program
    #[arg(last = true)]
    program_args: Vec<String>,

    /// Debugger flavor: lldb or gdb
    #[arg(long)]
    debugger: Option<DebuggerKind>,

    /// Debugger binary to run instead of the default one
    #[arg(long)]
    debugger_path: Option<PathBuf>,

    /// Breakpoint location (file:line, function or *address), may be repeated
    #[arg(short, long = "break")]
    breakpoints: Vec<String>,

    /// JSON launch configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Give up on a debugger command after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the stack at every stop
    #[arg(long)]
    backtrace: bool,

    /// Log protocol traffic
    #[arg(short, long)]
    verbose: bool,
}

type BoxError = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize the logger first
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level(
            "miadapter",
            if args.verbose {
                log::LevelFilter::Trace
            } else {
                log::LevelFilter::Warn
            },
        )
        .init()
        .unwrap();

    log::info!("midbg starting...");

    let exit_code = match run(args).await {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{e}");
            1
        }
    };

    log::info!("midbg exited with code: {exit_code}");
    std::process::exit(exit_code);
}

fn launch_config(args: &Args) -> Result<LaunchConfig, BoxError> {
    let mut config = match &args.config {
        Some(path) => LaunchConfig::from_file(path)?,
        None => LaunchConfig::default(),
    };

    if let Some(debugger) = args.debugger {
        config.debugger = debugger;
    }
    if let Some(path) = &args.debugger_path {
        config.path = Some(path.clone());
    }
    if let Some(timeout) = args.timeout_ms {
        config.session.command_timeout_ms = Some(timeout);
    }

    Ok(config)
}

async fn run(args: Args) -> Result<(), BoxError> {
    let config = launch_config(&args)?;
    let session = spawn_debugger(&config).await?;
    let mut events = session.subscribe();

    session
        .set_executable_file(&args.program.to_string_lossy())
        .await?;

    if !args.program_args.is_empty() {
        session
            .set_inferior_arguments(&args.program_args.join(" "))
            .await?;
    }

    let options = BreakpointOptions {
        is_pending: true,
        ..Default::default()
    };
    for location in &args.breakpoints {
        let breakpoint = session.add_breakpoint(location, &options).await?;
        log::info!("Breakpoint {} set at {}", breakpoint.id, location);
    }

    session.start_inferior(&StartOptions::default()).await?;

    loop {
        let received = tokio::select! {
            received = events.recv() => received,
            _ = session.closed() => {
                log::warn!("Debugger went away");
                break;
            }
        };

        let event = match received {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                log::warn!("Missed {} events", missed);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        println!("{}", serde_json::to_string(&event)?);

        if let DebugEvent::TargetStopped(stop) = &event {
            if stop.reason.is_exit() {
                break;
            }

            if args.backtrace {
                print_backtrace(&session, stop.thread_id).await?;
            }
            session.resume_inferior(&ResumeOptions::default()).await?;
        }
    }

    session.end(true).await?;
    Ok(())
}

async fn print_backtrace(session: &DebugSession, thread_id: Option<u32>) -> Result<(), BoxError> {
    let frames = session
        .get_stack_frames(&StackFramesOptions {
            thread_id,
            ..Default::default()
        })
        .await?;

    let line = serde_json::json!({ "event": "backtrace", "data": frames });
    println!("{line}");
    Ok(())
}
