// Audio Scheduler - console front end
// Reads one command per line from stdin and drives the scheduler

use anyhow::{bail, Context, Result};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use audio_scheduler::{
    audio::DefaultBackend,
    license::{BaserowClient, LicenseEvent, LicenseManager, LicenseMonitor},
    status::StatusTicker,
    AppError, Config, LicenseError, MoveDirection, PlaylistStore, SchedulerApp, StopOutcome,
};
use chrono::Local;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
Commands:
  add <minutes> <path>      add an audio with its interval
  remove <n>                remove item n
  edit <n> <minutes>        change the interval of item n
  up <n> | down <n>         move item n
  start | stop              run or stop the sequence
  play <n>                  play item n now
  test                      test audio output
  alert on|off              toggle the alert sound
  volume <0-100>            set the volume
  device [name]             list devices or select one
  schedule off | on <HH:MM> <HH:MM>
  list | status | quit";

enum Flow {
    Continue,
    Quit,
}

/// Everything the main loop reacts to, in arrival order
enum Input {
    Line(io::Result<String>),
    License(LicenseEvent),
    Closed,
}

impl From<LicenseEvent> for Input {
    fn from(event: LicenseEvent) -> Self {
        Input::License(event)
    }
}

fn main() -> Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        Config::default()
    });

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Audio Scheduler");

    let (inputs, input_rx) = mpsc::channel();
    let _monitor = if config.license.enabled {
        Some(license_gate(&config, inputs.clone())?)
    } else {
        None
    };

    let store = PlaylistStore::new(&config.state_file);
    let saved = store.load_or_default();
    let backend = DefaultBackend::open(
        saved.settings.selected_device.as_deref(),
        config.cache_capacity,
    )
    .context("Failed to open audio output")?;

    let app = Arc::new(SchedulerApp::from_state(
        Arc::new(backend),
        store,
        config.scheduler_settings(),
        saved,
    ));

    let ticker_app = Arc::clone(&app);
    let mut last_countdown = String::new();
    let ticker = StatusTicker::spawn(Arc::clone(&app), config.status_cadence(), move |report| {
        if report.running && report.countdown != last_countdown {
            info!(next = %report.next_line, countdown = %report.countdown, "Status");
        }
        last_countdown.clone_from(&report.countdown);
        ticker_app.log_metrics();
    })
    .context("Failed to start status ticker")?;

    spawn_stdin_reader(inputs).context("Failed to start stdin reader")?;

    println!("{}", HELP);
    for input in &input_rx {
        match input {
            Input::Line(line) => {
                let line = line.context("Failed to read command")?;
                match run_command(&app, line.trim()) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => println!("Error: {}", e),
                }
            }
            Input::License(event) => {
                if !handle_license_event(event) {
                    println!("License is no longer valid, shutting down");
                    ticker.stop();
                    app.shutdown();
                    bail!("License is no longer valid");
                }
            }
            Input::Closed => break,
        }
    }

    ticker.stop();
    if app.shutdown() == StopOutcome::TimedOut {
        warn!("Exiting with playback worker still running");
    }
    Ok(())
}

/// Forward stdin lines so the main loop never blocks on the terminal
fn spawn_stdin_reader(inputs: mpsc::Sender<Input>) -> io::Result<()> {
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if inputs.send(Input::Line(line)).is_err() {
                    return;
                }
            }
            let _ = inputs.send(Input::Closed);
        })?;
    Ok(())
}

/// Verify or activate the license before anything else starts
fn license_gate(config: &Config, events: mpsc::Sender<Input>) -> Result<LicenseMonitor> {
    let client = BaserowClient::from_config(&config.license)
        .context("License check enabled but server is not configured")?;
    let license_file = if config.license.license_file.is_absolute() {
        config.license.license_file.clone()
    } else {
        Config::config_dir()?.join(&config.license.license_file)
    };

    let manager = Arc::new(LicenseManager::new(
        Arc::new(client),
        license_file,
        config.license.check_interval(),
    ));

    match manager.verify(Local::now().naive_local()) {
        Ok(verification) => info!(?verification, "License valid"),
        Err(LicenseError::NotActivated) | Err(LicenseError::Expired(_)) => {
            println!("Software not activated. Enter activation code:");
            let mut code = String::new();
            io::stdin()
                .lock()
                .read_line(&mut code)
                .context("Failed to read activation code")?;
            let expiry = manager.activate(&code, Local::now().naive_local())?;
            println!("Software activated until {}", expiry);
        }
        Err(e) => return Err(e).context("License verification failed"),
    }

    Ok(LicenseMonitor::start(
        manager,
        env!("CARGO_PKG_VERSION").to_string(),
        events,
    )?)
}

/// Returns whether the application may keep running
fn handle_license_event(event: LicenseEvent) -> bool {
    match event {
        LicenseEvent::Verified(verification) => {
            info!(?verification, "License re-verified");
            true
        }
        LicenseEvent::UpdateAvailable(update) => {
            println!(
                "New version {} available (current {}): {}",
                update.version,
                env!("CARGO_PKG_VERSION"),
                update.link
            );
            true
        }
        LicenseEvent::Invalid(e) => {
            error!(error = %e, "License check failed");
            false
        }
    }
}

fn parse_index(arg: Option<&str>) -> Result<usize> {
    let n: usize = arg
        .context("missing item number")?
        .parse()
        .context("item number must be a positive integer")?;
    n.checked_sub(1).context("item numbers start at 1")
}

fn parse_minutes(arg: Option<&str>) -> Result<u32> {
    arg.context("missing interval")?
        .parse()
        .context("interval must be a whole number of minutes")
}

fn run_command(app: &SchedulerApp, line: &str) -> Result<Flow> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(Flow::Continue);
    };

    match command {
        "add" => {
            let minutes = parse_minutes(words.next())?;
            let path: Vec<&str> = words.collect();
            if path.is_empty() {
                bail!("missing path");
            }
            let index = app.add_item(PathBuf::from(path.join(" ")), minutes)?;
            println!("Added item {}", index + 1);
        }
        "remove" => {
            let removed = app.remove_item(parse_index(words.next())?)?;
            println!("Removed {}", removed.display_name());
        }
        "edit" => {
            let index = parse_index(words.next())?;
            app.edit_interval(index, parse_minutes(words.next())?)?;
        }
        "up" | "down" => {
            let direction = if command == "up" {
                MoveDirection::Up
            } else {
                MoveDirection::Down
            };
            app.move_item(parse_index(words.next())?, direction)?;
            print_playlist(app);
        }
        "start" => match app.start() {
            Ok(index) => println!("Started at item {}", index + 1),
            Err(AppError::Scheduler(e)) => println!("{}", e),
            Err(e) => return Err(e.into()),
        },
        "stop" => match app.stop() {
            StopOutcome::Stopped => println!("Stopped"),
            StopOutcome::AlreadyStopped => println!("Already stopped"),
            StopOutcome::TimedOut => println!("Stop requested, worker still finishing"),
        },
        "play" => {
            let index = app.jump_to(parse_index(words.next())?)?;
            println!("Playing item {}", index + 1);
        }
        "test" => app.test_playback()?,
        "alert" => match words.next() {
            Some("on") => app.set_alert_enabled(true),
            Some("off") => app.set_alert_enabled(false),
            _ => bail!("usage: alert on|off"),
        },
        "volume" => {
            let percent: f32 = words
                .next()
                .context("missing volume")?
                .parse()
                .context("volume must be a number")?;
            let applied = app.set_volume(percent / 100.0);
            println!("Volume {:.0}%", applied * 100.0);
        }
        "device" => {
            let name: Vec<&str> = words.collect();
            if name.is_empty() {
                let selected = app.selected_device();
                for device in app.output_devices() {
                    let marker = if device == selected { "*" } else { " " };
                    println!("{} {}", marker, device);
                }
            } else {
                app.select_device(&name.join(" "))?;
            }
        }
        "schedule" => match words.next() {
            Some("off") => {
                let window = app.schedule_window();
                app.configure_schedule(false, &window.start_string(), &window.stop_string())?;
            }
            Some("on") => {
                let start = words.next().unwrap_or("");
                let stop = words.next().unwrap_or("");
                app.configure_schedule(true, start, stop)?;
            }
            _ => bail!("usage: schedule off | on <HH:MM> <HH:MM>"),
        },
        "list" => print_playlist(app),
        "status" => {
            let report = audio_scheduler::status::render(
                &app.status(),
                Local::now(),
                app.playlist().len(),
            );
            println!("{}  {}  {}", report.status_line, report.next_line, report.countdown);
        }
        "help" => println!("{}", HELP),
        "quit" | "exit" => return Ok(Flow::Quit),
        other => println!("Unknown command '{}', type 'help'", other),
    }

    Ok(Flow::Continue)
}

fn print_playlist(app: &SchedulerApp) {
    let status = app.status();
    let playlist = app.playlist();
    if playlist.is_empty() {
        println!("Playlist is empty");
        return;
    }

    for (index, item) in playlist.iter().enumerate() {
        let current = status.running && status.current_index == Some(index);
        let marker = if current { ">" } else { " " };
        let missing = if item.is_playable() { "" } else { " (missing)" };
        println!(
            "{} {:>2}. {} - every {} min{}",
            marker,
            index + 1,
            item.display_name(),
            item.interval,
            missing
        );
    }
}
