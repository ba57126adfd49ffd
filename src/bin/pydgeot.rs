use clap::Parser;
use pydgeot::{error::Result, init_logging, App, AppPaths};
use std::path::PathBuf;

/// Incremental static content build engine.
#[derive(Parser)]
#[command(name = "pydgeot", version)]
struct Cli {
    /// App directory to operate on.
    #[arg(short = 'a', long = "app", default_value = ".")]
    app: PathBuf,

    /// Command to run; `commands` lists what is available.
    command: String,

    /// Arguments passed to the command.
    args: Vec<String>,
}

fn run(cli: Cli) -> Result<()> {
    // `create` targets a directory that is not an app yet.
    if cli.command == "create" {
        let [path] = cli.args.as_slice() else {
            return Err(pydgeot::error::AppError::CommandUsage("create".to_string()));
        };
        let app = App::create(path)?;
        println!("Created app directory at {}", app.paths().root.display());
        return Ok(());
    }

    let paths = AppPaths::new(&cli.app);
    let _guard = paths.is_valid().then(|| init_logging(&paths.log_root)).transpose()?;

    let mut app = App::open(&cli.app)?;
    app.run_command(&cli.command, &cli.args)
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{}: {err}", err.category());
        std::process::exit(1);
    }
}
