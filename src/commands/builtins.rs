//! Built-in commands.

use super::Command;
use crate::{
    error::{AppError, Result},
    generator::Generator,
    observer::Observer,
    App,
};
use std::{io::Write, path::PathBuf, time::Duration};

pub(super) fn all() -> Vec<Command> {
    vec![
        Command {
            name: "create",
            help_args: "PATH",
            help: "Create a new app directory",
            run: create,
        },
        Command { name: "build", help_args: "", help: "Build static content", run: build },
        Command {
            name: "watch",
            help_args: "[EVENT_DELAY [CHANGED_TIMEOUT]]",
            help: "Continuously build static content",
            run: watch,
        },
        Command { name: "reset", help_args: "", help: "Delete all built content", run: reset },
        Command {
            name: "clean",
            help_args: "PATH [PATH]...",
            help: "Clean built content for specific directories",
            run: clean,
        },
        Command {
            name: "commands",
            help_args: "",
            help: "List available commands",
            run: list_commands,
        },
        Command {
            name: "processors",
            help_args: "",
            help: "List available processors",
            run: list_processors,
        },
        Command {
            name: "plugins",
            help_args: "",
            help: "List available plugins",
            run: list_plugins,
        },
        Command {
            name: "depdot",
            help_args: "[forward|backward|both]",
            help: "Output DOT file showing source dependencies",
            run: depdot,
        },
    ]
}

fn no_args(name: &str, args: &[String]) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(AppError::CommandUsage(name.to_string()))
    }
}

fn create(_app: &mut App, args: &[String]) -> Result<()> {
    let [path] = args else { return Err(AppError::CommandUsage("create".to_string())) };
    let root = PathBuf::from(path);
    if root.exists() {
        return Err(command_error!("target directory '{path}' already exists"));
    }
    match root.parent() {
        Some(parent) if parent.as_os_str().is_empty() || parent.is_dir() => {}
        _ => return Err(command_error!("parent directory of '{path}' does not exist")),
    }
    let app = App::create(root)?;
    println!("Created app directory at {}", app.paths().root.display());
    Ok(())
}

fn build(app: &mut App, args: &[String]) -> Result<()> {
    no_args("build", args)?;
    Generator::new(app).generate()
}

fn watch(app: &mut App, args: &[String]) -> Result<()> {
    if args.len() > 2 {
        return Err(AppError::CommandUsage("watch".to_string()));
    }
    let parse = |arg: &String| {
        arg.parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| AppError::CommandUsage("watch".to_string()))
    };

    let generator = Generator::new(app);
    generator.generate()?;

    let mut observer = Observer::new(&app.paths().source_root);
    if let Some(arg) = args.first() {
        observer.set_event_timeout(parse(arg)?);
    }
    if let Some(arg) = args.get(1) {
        observer.set_changed_timeout(parse(arg)?);
    }

    println!("Watching {}", app.paths().source_root.display());
    let app = &*app;
    observer.run(move |path| {
        let root = path.parent().unwrap_or(&app.paths().source_root).to_path_buf();
        let generator = Generator::new(app);
        let result = generator
            .collect_changes_in(&root)
            .and_then(|changes| generator.process_changes(changes));
        if let Err(err) = result {
            error!("build cycle failed: {err}");
        }
    })
}

fn reset(app: &mut App, args: &[String]) -> Result<()> {
    no_args("reset", args)?;
    app.reset()
}

fn clean(app: &mut App, args: &[String]) -> Result<()> {
    if args.is_empty() {
        app.clean(None)
    } else {
        let paths: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
        app.clean(Some(&paths))
    }
}

fn list_commands(app: &mut App, args: &[String]) -> Result<()> {
    no_args("commands", args)?;
    let commands: Vec<&Command> = app.commands().collect();
    let align = commands
        .iter()
        .map(|c| c.name.len() + c.help_args.len() + 1)
        .max()
        .unwrap_or(0)
        .max(14)
        + 4;
    for command in commands {
        let mut disp = command.name.to_string();
        if !command.help_args.is_empty() {
            disp.push(' ');
            disp.push_str(command.help_args);
        }
        println!("{disp:>align$}    {}", command.help);
    }
    Ok(())
}

fn list_processors(app: &mut App, args: &[String]) -> Result<()> {
    no_args("processors", args)?;
    let align = app
        .processors()
        .iter()
        .map(|p| p.name().len())
        .max()
        .unwrap_or(0)
        .max(14)
        + 4;
    for processor in app.processors() {
        println!("{:>align$}    priority {}", processor.name(), processor.priority());
    }
    Ok(())
}

fn list_plugins(app: &mut App, args: &[String]) -> Result<()> {
    no_args("plugins", args)?;
    let enabled: Vec<String> = app
        .enabled_plugins()
        .iter()
        .map(|name| name.strip_prefix("builtins.").unwrap_or(name).to_string())
        .collect();
    let mut names = app.registry().names();
    names.sort_unstable();
    let align = names.iter().map(|n| n.len() + 1).max().unwrap_or(0).max(14);
    for name in names {
        let marker = if enabled.iter().any(|e| e == name) { "*" } else { " " };
        println!("{:>align$}", format!("{marker}{name}"));
    }
    Ok(())
}

fn depdot(app: &mut App, args: &[String]) -> Result<()> {
    let mut forward = args.iter().any(|a| a == "forward");
    let mut backward = args.iter().any(|a| a == "backward");
    if args.iter().any(|a| a == "both") || (!forward && !backward) {
        forward = true;
        backward = true;
    }

    let path = app.paths().store_root.join("deps.dot");
    let mut out = std::fs::File::create(&path).map_err(|err| AppError::io(err, &path))?;
    let catalog = app.catalog();

    writeln!(out, "graph Dependencies {{").map_err(|err| AppError::io(err, &path))?;
    let mut write = |line: String| {
        writeln!(out, "  {line}").map_err(|err| AppError::io(err, &path))
    };

    for source in catalog.get_sources(&app.paths().source_root, true)? {
        let rel = app.paths().to_relative(&source.path);
        write(format!("\"{rel}\";"))?;
        if forward {
            for dep in catalog.get_dependencies(&source.path, false, false)? {
                let dep_rel = app.paths().to_relative(&dep.path);
                write(format!("\"{rel}\" -- \"{dep_rel}\" [dir=back, color=\"#880000\"];"))?;
            }
            let names: Vec<String> =
                catalog.get_context_var_dep_names(&source.path, false)?.into_iter().collect();
            for producer in catalog.get_context_var_dep_sources(&source.path, false, false)? {
                let dep_rel = app.paths().to_relative(&producer.path);
                write(format!(
                    "\"{rel}\" -- \"{dep_rel}\" [dir=back, color=\"#000088\", label=\"{}\"];",
                    names.join(",")
                ))?;
            }
        }
        if backward {
            for dep in catalog.get_dependencies(&source.path, true, false)? {
                let dep_rel = app.paths().to_relative(&dep.path);
                write(format!("\"{rel}\" -- \"{dep_rel}\" [dir=back, color=\"#BB6666\"];"))?;
            }
        }
    }
    writeln!(out, "}}").map_err(|err| AppError::io(err, &path))?;

    println!("Wrote {}", path.display());
    Ok(())
}
