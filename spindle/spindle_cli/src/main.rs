use clap::{Parser, Subcommand};
use spindle_threads::sys;

/// Spindle command line tools
///
/// Thin shells over the spindle OS inspection helpers: process liveness,
/// per-process thread listings, the boot identifier, and vDSO detection.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether processes are running
    ///
    /// Exits 0 when the processes are running, 1 otherwise.
    #[clap(name = "is-running")]
    IsRunning {
        /// Succeed only if every given process is running (default)
        #[clap(long = "and", conflicts_with = "or")]
        and: bool,

        /// Succeed if at least one given process is running
        #[clap(long = "or")]
        or: bool,

        /// Process identifiers to check
        #[clap(required = true)]
        pids: Vec<i32>,
    },

    /// Print the thread identifiers of the given processes
    #[clap(name = "show-threads")]
    ShowThreads {
        /// Process identifiers to inspect; the current process if none
        pids: Vec<i32>,
    },

    /// Print the boot identifier of this system
    #[clap(name = "boot-id")]
    BootId,

    /// Check whether this process runs with the vDSO mapped
    ///
    /// Exits 0 when the vDSO is present, 1 otherwise.
    #[clap(name = "has-vdso")]
    HasVdso {
        /// Print the answer
        #[clap(short, long, conflicts_with = "quiet")]
        verbose: bool,

        /// Print nothing, only set the exit code
        #[clap(short, long)]
        quiet: bool,
    },
}

fn is_running(all: bool, pids: &[i32]) -> i32 {
    let running = if all {
        pids.iter().all(|pid| sys::is_process_running(*pid))
    } else {
        pids.iter().any(|pid| sys::is_process_running(*pid))
    };
    if running {
        0
    } else {
        1
    }
}

fn show_threads(pids: &[i32]) -> i32 {
    let mut status = 0;

    let pids: Vec<Option<i32>> = if pids.is_empty() {
        vec![None]
    } else {
        pids.iter().map(|pid| Some(*pid)).collect()
    };

    for pid in pids {
        let ids = sys::thread_ids(pid);
        if ids.is_empty() {
            if let Some(pid) = pid {
                eprintln!("error: no such process: {}", pid);
            }
            status = 1;
            continue;
        }
        let formatted: Vec<String> = ids.iter().map(i32::to_string).collect();
        println!("{}", formatted.join(" "));
    }

    status
}

fn boot_id() -> i32 {
    let id = sys::boot_id();
    if id.is_empty() {
        eprintln!("error: this system has no boot identifier");
        return 1;
    }
    println!("{}", id);
    0
}

fn has_vdso(verbose: bool, quiet: bool) -> i32 {
    let present = sys::has_vdso();
    if verbose && present {
        println!("this process uses the vDSO");
    } else if !quiet {
        println!("{}", if present { "yes" } else { "no" });
    }
    if present {
        0
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    let status = match cli.command {
        // all-mode unless --or asks for any-mode; --and only states the default
        Commands::IsRunning { and: _, or, pids } => is_running(!or, &pids),
        Commands::ShowThreads { pids } => show_threads(&pids),
        Commands::BootId => boot_id(),
        Commands::HasVdso { verbose, quiet } => has_vdso(verbose, quiet),
    };

    std::process::exit(status);
}
