use clap::{CommandFactory, Parser, Subcommand};
use notemon::{
    display::DeviceList,
    logger,
    midi::{HostedMidiInput, NoteEvent},
    monitor::{AccessState, InputMonitor},
};
use std::{cell::RefCell, rc::Rc};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log verbosity level
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Path to a log file to write to
    #[arg(long)]
    log: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the available MIDI input devices
    List,
    /// Print note events from a MIDI input device
    Monitor(MonitorOptions),
    /// `notemon completions --generate=zsh > notemon.zsh`
    Completions(Completions),
}

#[derive(Debug, clap::Args)]
struct MonitorOptions {
    /// Device id or name to monitor, defaults to the first available input
    #[arg(long)]
    device: Option<String>,
}

#[derive(Debug, Parser)]
#[command(arg_required_else_help(true))]
struct Completions {
    /// shell to generate the completion script for
    #[arg(long = "generate", value_enum)]
    shell: Option<clap_complete::Shell>,
}

impl Completions {
    fn generate(&self) -> anyhow::Result<()> {
        let Some(shell) = self.shell else {
            anyhow::bail!("no shell specified for autocompletion generation");
        };

        use std::io::Write;
        std::io::stdout().flush()?;

        let mut cli = Cli::command();
        clap_complete::generate(shell, &mut cli, "notemon", &mut std::io::stdout());

        Ok(())
    }
}

fn initialized_monitor() -> anyhow::Result<(InputMonitor, Rc<RefCell<DeviceList>>)> {
    let mut monitor = InputMonitor::new(Box::<HostedMidiInput>::default());
    let display = Rc::new(RefCell::new(DeviceList::new("select a midi input")));
    monitor.initialize(display.clone());

    if monitor.access_state() != AccessState::AccessGranted {
        anyhow::bail!("midi access was not granted");
    }

    Ok((monitor, display))
}

fn run_list() -> anyhow::Result<()> {
    let (_monitor, display) = initialized_monitor()?;
    let display = display.borrow();

    println!("{}", display.placeholder());
    for option in display.options() {
        println!("  {} : {}", option.id, option.label);
    }

    Ok(())
}

fn run_monitor(opts: MonitorOptions) -> anyhow::Result<()> {
    use colored::*;

    let (mut monitor, _display) = initialized_monitor()?;

    let device_id = {
        let inputs = monitor.list_inputs()?;
        let device = match &opts.device {
            Some(wanted) => inputs
                .iter()
                .find(|d| &d.id == wanted || &d.name == wanted)
                .ok_or_else(|| anyhow::anyhow!("no midi input matching {wanted}"))?,
            None => inputs
                .first()
                .ok_or_else(|| anyhow::anyhow!("no midi inputs available"))?,
        };
        device.id.clone()
    };

    monitor.select_input(&device_id)?;
    println!("monitoring {}", device_id.bold());

    monitor.subscribe(|event| match *event {
        NoteEvent::NoteOn { note, velocity } => {
            println!("{} : note = {note} | vel = {velocity}", "NoteOn ".green())
        }
        NoteEvent::NoteOff { note, velocity } => {
            println!("{} : note = {note} | vel = {velocity}", "NoteOff".cyan())
        }
    });

    loop {
        monitor.process_events();
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    if let Commands::Completions(ref c) = args.command {
        return c.generate();
    }

    if args.log.is_some() || args.verbose {
        logger::start("notemon", args.log.as_deref(), args.verbose)?;
    }

    let app_result = match args.command {
        Commands::List => run_list(),
        Commands::Monitor(opts) => run_monitor(opts),
        Commands::Completions(_) => Ok(()),
    };

    if let Err(e) = app_result {
        if logger::is_active() {
            log::error!("{e}");
        } else {
            use colored::*;
            eprintln!("{} {}", "Error:".red().bold(), format!("{e}").bold());
        }
    }

    Ok(())
}
