//! Cubetimer - speedcubing timer with Stackmat support
//!
//! Entry point for the terminal front end.

use anyhow::Result;
use crossbeam_channel::{select, Receiver};
use cubetimer::audio::packet::Status;
use cubetimer::audio::reader::StackmatReader;
use cubetimer::audio::signal::{SignalSource, StackmatSignal};
use cubetimer::config::AppConfig;
use cubetimer::stats::format::format_time;
use cubetimer::stats::history::{
    JsonLinesSink, NullSink, ScrambleQueue, SolutionRecorder, SolutionSink, UserMessage,
};
use cubetimer::timer::keyboard::KeyboardTimer;
use cubetimer::timer::stackmat::StackmatTimer;
use cubetimer::{AudioEngine, Packet, Penalty, Session, TimerEvent, TimerId, TimerManager};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Command line options, layered over the persisted config
#[derive(Debug, Default)]
struct Options {
    device: Option<String>,
    sample_rate: Option<u32>,
    inspection: bool,
    keyboard: bool,
    simulate: bool,
    category: Option<String>,
    ephemeral: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cubetimer=info".parse()?)
                .add_directive("cubetimer_core=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut options = Options::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--list" | "-l" => {
                list_devices();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("cubetimer {} ({})", cubetimer::VERSION, cubetimer_core::BUILD_DATE);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--device" | "-d" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --device requires a device name");
                    return Ok(());
                }
                options.device = Some(args[i + 1].clone());
                i += 2;
                continue;
            }
            "--sample-rate" | "-r" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --sample-rate requires a value");
                    return Ok(());
                }
                options.sample_rate = args[i + 1].parse().ok();
                if options.sample_rate.is_none() {
                    eprintln!("Error: Invalid sample rate: {}", args[i + 1]);
                    return Ok(());
                }
                i += 2;
                continue;
            }
            "--category" | "-c" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --category requires a name");
                    return Ok(());
                }
                options.category = Some(args[i + 1].clone());
                i += 2;
                continue;
            }
            "--inspection" | "-i" => options.inspection = true,
            "--keyboard" | "-k" => options.keyboard = true,
            "--simulate" | "-s" => options.simulate = true,
            "--no-save" => options.ephemeral = true,
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    run(options)
}

fn print_help() {
    println!("Usage: cubetimer [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -l, --list              List available line-in devices");
    println!("  -d, --device NAME       Read the Stackmat from the specified device");
    println!("  -r, --sample-rate RATE  Set line-in sample rate (default: 8000)");
    println!("  -k, --keyboard          Use the keyboard (Enter) instead of a Stackmat");
    println!("  -i, --inspection        Enable 15 second inspection");
    println!("  -c, --category NAME     Record solves under category (default: 3x3x3)");
    println!("  -s, --simulate          Replay a synthetic Stackmat solve");
    println!("      --no-save           Do not write solves or config to disk");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Commands while running (type and press Enter):");
    println!("  <Enter>   press and release the keyboard trigger");
    println!("  +2 / dnf / ok   set the penalty of the last solve");
    println!("  del       delete the last solve");
    println!("  i         toggle inspection");
    println!("  s         show statistics");
    println!("  q         quit");
}

fn list_devices() {
    println!("Scanning for line-in devices...");
    println!();

    match AudioEngine::list_devices() {
        Ok(devices) if devices.is_empty() => {
            println!("No input devices found.");
        }
        Ok(devices) => {
            println!("Found {} device(s):", devices.len());
            println!();
            for (i, device) in devices.iter().enumerate() {
                let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                println!("  {}. {}{}", i + 1, device.name, default_marker);
                println!("     Channels: {} in", device.input_channels);
                if !device.sample_rates.is_empty() {
                    println!("     Sample rates: {:?}", device.sample_rates);
                }
                println!();
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("Error: {}", e);
        }
    }
}

/// Packets of one scripted solve: zero, inspection touch, hands down,
/// about 4.5 seconds of running, stop
fn simulated_packets(solve_ms: i64) -> Vec<Packet> {
    let step = 119;
    let mut packets = Vec::new();
    packets.extend(std::iter::repeat_n(Packet::new(Status::Idle, 0), 8));
    packets.extend(std::iter::repeat_n(Packet::new(Status::LeftHand, 0), 4));
    packets.extend(std::iter::repeat_n(Packet::new(Status::Idle, 0), 8));
    packets.extend(std::iter::repeat_n(Packet::new(Status::BothHands, 0), 8));
    let mut elapsed = step;
    while elapsed < solve_ms {
        packets.push(Packet::new(Status::Idle, elapsed));
        elapsed += step;
    }
    packets.extend(std::iter::repeat_n(Packet::new(Status::Stopped, solve_ms), 8));
    packets
}

fn simulated_timer(sample_rate: u32) -> StackmatTimer {
    let signal = StackmatSignal::new(sample_rate).with_noise(6, 0x5eed);
    let samples = signal.stream(&simulated_packets(4520));
    let source = SignalSource::new(samples).paced(sample_rate);
    StackmatTimer::new(StackmatReader::new(sample_rate, Box::new(source)))
}

fn keyboard_for(trigger: TimerId) -> KeyboardTimer {
    match trigger {
        TimerId::KeyboardControl => KeyboardTimer::control(),
        _ => KeyboardTimer::space(),
    }
}

fn run(options: Options) -> Result<()> {
    let device_requested = options.device_requested();
    let mut config = AppConfig::load();
    if let Some(category) = options.category.clone() {
        config.category = category;
    }
    if let Some(device) = options.device.clone() {
        config.stackmat_device = Some(device);
    }
    if let Some(rate) = options.sample_rate {
        config.sample_rate = rate;
    }
    if options.inspection {
        config.inspection_enabled = true;
    }
    if options.keyboard && !config.timer_trigger.is_keyboard() {
        config.timer_trigger = TimerId::KeyboardSpace;
    }
    if options.simulate || device_requested {
        config.timer_trigger = TimerId::Stackmat;
    }

    println!("Cubetimer v{}", cubetimer::VERSION);
    println!("Category: {}", config.category);
    println!();

    let solutions_path = AppConfig::solutions_path();
    let session = if options.ephemeral {
        Session::new(config.category.clone())
    } else {
        let solutions = JsonLinesSink::load(&solutions_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load solutions, starting empty");
            Vec::new()
        });
        let solutions = solutions
            .into_iter()
            .filter(|s| s.category_id == config.category)
            .collect();
        Session::from_solutions(config.category.clone(), solutions)
    };
    info!(solves = session.len(), "Session loaded");

    let sink: Box<dyn SolutionSink> = if options.ephemeral {
        Box::new(NullSink)
    } else {
        Box::new(JsonLinesSink::new(solutions_path))
    };
    let (recorder, messages) =
        SolutionRecorder::new(session, sink, Box::new(ScrambleQueue::default()));

    let manager = TimerManager::new();
    recorder.attach(&manager);
    manager.set_inspection_enabled(config.inspection_enabled);

    // Non-tick events go through a channel, the latest tick is redrawn
    let (event_tx, events) = crossbeam_channel::unbounded();
    let display = Arc::new(Mutex::new(None::<TimerEvent>));
    let display_sink = Arc::clone(&display);
    manager.add_listener(move |event| {
        if event.is_tick() {
            if let Ok(mut display) = display_sink.lock() {
                *display = Some(event.clone());
            }
        } else {
            let _ = event_tx.send(event.clone());
        }
    });

    let keyboard = keyboard_for(config.timer_trigger);
    let stackmat_result = match config.timer_trigger {
        TimerId::Stackmat if options.simulate => Some(Ok(simulated_timer(config.sample_rate))),
        TimerId::Stackmat => {
            let mut engine = AudioEngine::new();
            engine.set_sample_rate(config.sample_rate);
            engine.select_device(config.stackmat_device.as_deref());
            Some(StackmatTimer::open(&engine))
        }
        _ => None,
    };
    match stackmat_result {
        Some(Ok(stackmat)) => {
            if let Err(e) = manager.set_timer(Box::new(stackmat)) {
                warn!(error = %e, "Stackmat timer failed to start, using keyboard");
                manager.set_timer(Box::new(keyboard.clone()))?;
            }
        }
        Some(Err(e)) => {
            warn!(error = %e, "Stackmat line unavailable, using keyboard");
            println!("Stackmat line unavailable ({}), falling back to keyboard.", e);
            manager.set_timer(Box::new(keyboard.clone()))?;
        }
        None => manager.set_timer(Box::new(keyboard.clone()))?,
    }

    let (shutdown_tx, shutdown) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .ok();

    let input = spawn_stdin_reader();

    println!("Timer: {}", manager.current_timer().map(|id| id.to_string()).unwrap_or_default());
    println!("Inspection: {}", if config.inspection_enabled { "on" } else { "off" });
    println!("Press Enter to start/stop, 'q' to quit, 'h' for help.");
    println!("────────────────────────────────────────");
    print_summary(&recorder);

    let redraw = crossbeam_channel::tick(Duration::from_millis(100));
    let mut last_line = String::new();
    let simulate = options.simulate;

    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(messages) -> message => match message {
                Ok(UserMessage::Info(text)) => println!("\r{}", text),
                Ok(UserMessage::Error(text)) => eprintln!("\r{}", text),
                Err(_) => break,
            },
            recv(events) -> event => {
                let Ok(event) = event else { break };
                if let Some(line) = describe(&event) {
                    println!("\r{:<40}", line);
                }
                if let TimerEvent::SolutionFinished { .. } = event {
                    print_summary(&recorder);
                    if simulate {
                        break;
                    }
                }
            },
            recv(input) -> line => {
                let Ok(line) = line else { break };
                match line.trim() {
                    "" => {
                        keyboard.key_pressed();
                        keyboard.key_released();
                    }
                    "q" | "quit" => break,
                    "h" | "help" => print_help(),
                    "s" | "stats" => print_summary(&recorder),
                    "i" => {
                        let enabled = !manager.is_inspection_enabled();
                        manager.set_inspection_enabled(enabled);
                        config.inspection_enabled = enabled;
                        println!("Inspection: {}", if enabled { "on" } else { "off" });
                    }
                    "+2" => set_last_penalty(&recorder, Penalty::PlusTwo),
                    "dnf" => set_last_penalty(&recorder, Penalty::Dnf),
                    "ok" => set_last_penalty(&recorder, Penalty::None),
                    "del" => {
                        let last = recorder.session().latest().map(|s| s.id);
                        match last.and_then(|id| recorder.remove(id)) {
                            Some(removed) => println!("Deleted {}", removed.real_time()),
                            None => println!("No solve to delete"),
                        }
                    }
                    other => println!("Unknown command: {}", other),
                }
            },
            recv(redraw) -> _ => {
                let line = display
                    .lock()
                    .ok()
                    .and_then(|mut d| d.take())
                    .and_then(|event| describe(&event));
                if let Some(line) = line {
                    if line != last_line {
                        print!("\r{:<40}", line);
                        io::stdout().flush().ok();
                        last_line = line;
                    }
                }
            },
        }
    }

    println!();
    println!("Stopping...");
    manager.shutdown();
    print_summary(&recorder);

    if !options.ephemeral {
        if let Err(e) = config.save(&AppConfig::path()) {
            warn!(error = %e, "Failed to save config");
        }
    }
    println!("Done.");
    Ok(())
}

impl Options {
    fn device_requested(&self) -> bool {
        self.device.is_some() && !self.keyboard
    }
}

/// Lines typed on stdin
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let spawned = std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        error!(error = %e, "Failed to spawn stdin reader");
    }
    rx
}

fn describe(event: &TimerEvent) -> Option<String> {
    match event {
        TimerEvent::TimerChanged(id) => Some(format!("Timer: {}", id)),
        TimerEvent::TimerReset => Some("Ready".to_string()),
        TimerEvent::InspectionStarted => Some("Inspection started".to_string()),
        TimerEvent::InspectionRunning { remaining_ms } => {
            Some(format!("Inspection {}", format_time((*remaining_ms + 999) / 1000 * 1000)))
        }
        TimerEvent::InspectionFinished => Some("Inspection finished".to_string()),
        TimerEvent::SolutionStarted => Some("Go!".to_string()),
        TimerEvent::SolutionRunning(timing) => Some(format_time(timing.elapsed_ms())),
        TimerEvent::SolutionFinished { timing, penalty } => Some(match penalty {
            Penalty::None => format_time(timing.elapsed_ms()),
            penalty => format!("{} ({})", format_time(timing.elapsed_ms()), penalty),
        }),
        _ => None,
    }
}

fn set_last_penalty(recorder: &SolutionRecorder, penalty: Penalty) {
    let last = recorder.session().latest().map(|s| s.id);
    match last.and_then(|id| recorder.set_penalty(id, penalty)) {
        Some(updated) => println!("Last solve: {}", updated.real_time()),
        None => println!("No solve to change"),
    }
}

fn print_summary(recorder: &SolutionRecorder) {
    let session = recorder.session();
    println!();
    println!("{} solve(s) in {}", session.len(), session.category_id());
    for row in recorder.summary() {
        if let Some(value) = row.value {
            let marker = if row.is_record() { " *" } else { "" };
            println!("  {:<24} {:>10}{}", row.description(), value.value, marker);
        }
    }
    println!();
}
