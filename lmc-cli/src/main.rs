//! # lmc CLI
//!
//! Command-line interface for assembling, running and debugging Little Man
//! Computer programs.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lmc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Workspace directory holding programs, states and breakpoints
    #[arg(long, env = "LMC_WORKSPACE", default_value = ".lmc")]
    workspace: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a source file and store it as a program
    Assemble {
        /// Assembly source file
        source: PathBuf,

        /// Name to store under (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the mailboxes of a program
    Disassemble {
        /// Program name or path
        program: String,
    },

    /// Run a program
    Run {
        /// Program name or path
        program: String,

        #[command(flatten)]
        run: RunArgs,

        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Additional breakpoint addresses (comma separated)
        #[arg(long = "break", value_delimiter = ',', allow_negative_numbers = true)]
        breakpoints: Vec<i64>,

        /// Save the final state under this name
        #[arg(long)]
        save_state: Option<String>,

        /// Write every engine event to this file as JSON lines
        #[arg(long)]
        log: Option<PathBuf>,

        /// Print each engine event as it happens
        #[arg(long)]
        trace: bool,

        /// Print the machine state after every cycle
        #[arg(long)]
        live: bool,
    },

    /// Execute a few cycles, saving the state between invocations
    Step {
        /// Program name or path
        program: String,

        /// State to continue from and save to
        #[arg(long, default_value = "session")]
        session: String,

        /// Number of cycles to execute
        #[arg(long, default_value_t = 1)]
        count: u64,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run until the counter reaches an address
    Until {
        /// Program name or path
        program: String,

        /// Mailbox address to stop at
        #[arg(allow_negative_numbers = true)]
        address: i64,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Manage stored programs
    Programs {
        #[command(subcommand)]
        command: StoreCommands,
    },

    /// Manage stored machine states
    States {
        #[command(subcommand)]
        command: StoreCommands,
    },

    /// Export a program as a portable bundle
    Export {
        /// Stored program name
        name: String,

        /// Include the state saved under the same name
        #[arg(long)]
        with_state: bool,

        /// Free-text description recorded in the bundle
        #[arg(long)]
        description: Option<String>,

        /// Output file (defaults to stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Import a bundle produced by `export`
    Import {
        /// Bundle file
        bundle: PathBuf,

        /// Store under this name instead of the original one
        #[arg(long)]
        name: Option<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Manage persisted breakpoints
    Breakpoint {
        #[command(subcommand)]
        command: BreakpointCommands,
    },
}

/// Options shared by `run`, `step` and `until`.
#[derive(clap::Args, Clone)]
pub struct RunArgs {
    /// Inbox values (comma separated)
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    input: Vec<i32>,

    /// Cycles per second (defaults to as fast as possible)
    #[arg(long)]
    speed: Option<f64>,

    /// Continue from a stored state
    #[arg(long)]
    state: Option<String>,

    /// Ignore breakpoints persisted for this program
    #[arg(long)]
    no_auto_breakpoints: bool,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
pub enum StoreCommands {
    /// List stored entries
    List {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Remove entries by name
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum BreakpointCommands {
    /// Add breakpoints to a program
    Add {
        /// Program name or path
        program: String,
        #[arg(required = true, allow_negative_numbers = true)]
        addresses: Vec<i64>,
    },
    /// Remove breakpoints from a program
    Remove {
        /// Program name or path
        program: String,
        #[arg(required = true, allow_negative_numbers = true)]
        addresses: Vec<i64>,
    },
    /// Remove every breakpoint of a program
    Clear {
        /// Program name or path
        program: String,
    },
    /// Show the breakpoints of a program
    List {
        /// Program name or path
        program: String,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show breakpoints for every program
    ListAll {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::WARN.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let workspace = commands::open_workspace(&cli.workspace)?;

    match cli.command {
        Commands::Assemble { source, name, json } => {
            commands::assemble_program(&workspace, &source, name.as_deref(), json)
        }
        Commands::Disassemble { program } => commands::disassemble_program(&workspace, &program),
        Commands::Run {
            program,
            run,
            max_cycles,
            breakpoints,
            save_state,
            log,
            trace,
            live,
        } => {
            let opts = commands::RunOptions {
                max_cycles,
                breakpoints,
                save_state,
                log,
                trace,
                live,
            };
            commands::run_program(&workspace, &program, run.into(), opts).await
        }
        Commands::Step {
            program,
            session,
            count,
            run,
        } => commands::step_program(&workspace, &program, &session, count, run.into()).await,
        Commands::Until {
            program,
            address,
            run,
        } => commands::run_until(&workspace, &program, address, run.into()).await,
        Commands::Programs { command } => match command {
            StoreCommands::List { json } => commands::list_programs(&workspace, json),
            StoreCommands::Remove { names } => commands::remove_programs(&workspace, &names),
        },
        Commands::States { command } => match command {
            StoreCommands::List { json } => commands::list_states(&workspace, json),
            StoreCommands::Remove { names } => commands::remove_states(&workspace, &names),
        },
        Commands::Export {
            name,
            with_state,
            description,
            output,
        } => commands::export_bundle(&workspace, &name, with_state, description, output.as_deref()),
        Commands::Import { bundle, name, json } => {
            commands::import_bundle(&workspace, &bundle, name.as_deref(), json)
        }
        Commands::Breakpoint { command } => match command {
            BreakpointCommands::Add { program, addresses } => {
                commands::add_breakpoints(&workspace, &program, &addresses)
            }
            BreakpointCommands::Remove { program, addresses } => {
                commands::remove_breakpoints(&workspace, &program, &addresses)
            }
            BreakpointCommands::Clear { program } => commands::clear_breakpoints(&workspace, &program),
            BreakpointCommands::List { program, json } => {
                commands::list_breakpoints(&workspace, &program, json)
            }
            BreakpointCommands::ListAll { json } => commands::list_all_breakpoints(&workspace, json),
        },
    }
}

impl From<RunArgs> for commands::RunInputs {
    fn from(args: RunArgs) -> Self {
        commands::RunInputs {
            inputs: args.input,
            speed: args.speed,
            state: args.state,
            no_auto_breakpoints: args.no_auto_breakpoints,
            json: args.json,
        }
    }
}
