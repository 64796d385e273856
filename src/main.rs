use clap::Parser;
use coffeebreak::beverage::BeverageKind;
use coffeebreak::configuration::config::Config;
use coffeebreak::controller::{Command, Controller, Snapshot};
use coffeebreak::session_management::chat::format_duration;
use coffeebreak::session_management::SessionState;
use log::{error, info};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

#[derive(Parser)]
#[command(name = "coffeebreak")]
#[command(version = "0.1.0")]
#[command(about = "A shared coffee-break timer with a chatty barista")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the counter record and channel registrations
    #[arg(long)]
    storage_path: Option<PathBuf>,

    /// Broadcast channel name shared by cooperating instances
    #[arg(long)]
    channel: Option<String>,

    /// Break length in seconds for the first session
    #[arg(short, long)]
    duration: Option<u32>,

    /// Barista API key
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

/// One line typed on stdin.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(Command),
    Stats,
    Help,
}

const HELP: &str = "\
commands:
  start <iced_coffee|double_double|cappuccino>
  sip | exit | restart
  duration <seconds>
  say <message>
  stats | help | quit";

fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "start" => rest
            .parse::<BeverageKind>()
            .map(|kind| Input::Send(Command::Start(kind)))
            .map_err(|e| e.to_string()),
        "sip" | "s" => Ok(Input::Send(Command::Sip)),
        "exit" => Ok(Input::Send(Command::Exit)),
        "restart" => Ok(Input::Send(Command::Restart)),
        "duration" => rest
            .parse::<u32>()
            .map(|secs| Input::Send(Command::SetDuration(secs)))
            .map_err(|_| format!("not a number of seconds: {:?}", rest)),
        "say" => Ok(Input::Send(Command::Chat(rest.to_string()))),
        "stats" => Ok(Input::Stats),
        "help" | "?" => Ok(Input::Help),
        "quit" | "q" => Ok(Input::Send(Command::Shutdown)),
        other => Err(format!("unknown command {:?}, try `help`", other)),
    }
}

fn print_stats(snapshot: &Snapshot) {
    let stats = &snapshot.stats;
    println!("online: {}", stats.online_count);
    for kind in BeverageKind::ALL {
        println!("  {:<14} {}", kind.display_name(), stats.count(kind));
    }
}

/// Prints what changed between two snapshots.
fn render(previous: &Snapshot, current: &Snapshot) {
    let session = &current.session;
    if session.state != previous.session.state || session.epoch != previous.session.epoch {
        match (session.state, session.beverage_kind) {
            (SessionState::Active, Some(kind)) => println!(
                "{} served, {} on the clock. {}",
                kind.display_name(),
                format_duration(session.remaining_secs),
                kind.description()
            ),
            (SessionState::Ended, _) => {
                if let Some(summary) = &current.summary {
                    println!(
                        "{} {} ({}% of the cup)",
                        summary.headline(),
                        summary.message(),
                        summary.percent_consumed
                    );
                }
            }
            _ => println!("Menu. Break length {}", format_duration(current.selected_duration)),
        }
    } else if session.state == SessionState::Active {
        if session.sips_taken != previous.session.sips_taken {
            println!("sip {}/{}", session.sips_taken, current.max_sips);
        }
        if session.remaining_secs != previous.session.remaining_secs && session.remaining_secs % 30 == 0 {
            println!("{} left", format_duration(session.remaining_secs));
        }
    } else if current.selected_duration != previous.selected_duration {
        println!("Break length {}", format_duration(current.selected_duration));
    }

    let seen = if current.session.epoch == previous.session.epoch {
        previous.transcript.len().min(current.transcript.len())
    } else {
        0
    };
    for message in &current.transcript[seen..] {
        if !message.is_user {
            println!("{}: {}", message.sender.as_deref().unwrap_or("?"), message.text);
        }
    }

    if current.stats.online_count != previous.stats.online_count {
        println!("{} online", current.stats.online_count);
    }
    if current.stats.counts != previous.stats.counts {
        println!("lifetime cups: {}", current.stats.total_cups());
    }
}

async fn watch_snapshots(mut snapshots: watch::Receiver<Snapshot>) {
    let mut previous = snapshots.borrow_and_update().clone();
    while snapshots.changed().await.is_ok() {
        let current = snapshots.borrow_and_update().clone();
        render(&previous, &current);
        previous = current;
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Unable to import configuration from {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(storage_path) = args.storage_path {
        config.storage_path = storage_path;
    }
    if let Some(channel) = args.channel {
        config.channel_name = channel;
    }
    if let Some(duration) = args.duration {
        config.session.default_duration_secs = config.session.normalize_duration(duration);
    }
    if args.api_key.is_some() {
        config.assistant.api_key = args.api_key;
    }

    let mut controller = match Controller::new(config).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };
    info!("Instance {} ready, type `help` for commands", controller.id());

    let snapshots = controller.subscribe();
    let (commands, commands_rx) = mpsc::channel(32);
    let renderer = tokio::spawn(watch_snapshots(snapshots.clone()));
    let running = tokio::spawn(async move { controller.run(commands_rx).await });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Unable to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_input(&line) {
            Ok(Input::Send(command)) => {
                let quitting = command == Command::Shutdown;
                if commands.send(command).await.is_err() || quitting {
                    break;
                }
            }
            Ok(Input::Stats) => print_stats(&snapshots.borrow()),
            Ok(Input::Help) => println!("{}", HELP),
            Err(e) => println!("{}", e),
        }
    }

    let _ = commands.send(Command::Shutdown).await;
    match running.await {
        Ok(Ok(())) => info!("Bye"),
        Ok(Err(e)) => error!("Controller stopped with an error: {}", e),
        Err(e) => error!("Error joining at the end of execution: {:?}", e),
    }
    renderer.abort();
}
