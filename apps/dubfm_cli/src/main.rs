//! dubfm - 命令行电台播放器
//!
//! 从标准输入读取命令，驱动播放核心；会话和通知输出到终端。

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use dubfm_core::catalog;
use dubfm_core::prefs::remember_stream;
use dubfm_core::{
    spawn_core, AudioFocusManager, Bitrate, Command, CoreConfig, CoreError,
    DefaultNotificationBuilder, FocusChange, ForegroundHost, JsonPreferences, KeyEvent,
    MediaEvent, Notification, PlaybackSnapshot, Platform, SessionSink, TrackMetadata,
};
use dubfm_player::StreamPlayer;

const DEFAULT_PREFS: &str = "dubfm-prefs.json";

struct Options {
    config: Option<PathBuf>,
    prefs: PathBuf,
    bitrate: Option<Bitrate>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut options = Options {
            config: None,
            prefs: PathBuf::from(DEFAULT_PREFS),
            bitrate: None,
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("Missing value for {}", name))
            };
            match arg.as_str() {
                "--config" => options.config = Some(PathBuf::from(value("--config")?)),
                "--prefs" => options.prefs = PathBuf::from(value("--prefs")?),
                "--bitrate" => {
                    let raw = value("--bitrate")?;
                    options.bitrate = Some(raw.parse().map_err(|e: CoreError| e.to_string())?);
                }
                other => return Err(format!("Unknown argument: {}", other)),
            }
        }

        Ok(options)
    }
}

/// 一行标准输入的含义
#[derive(Debug, PartialEq)]
enum Input {
    Event(MediaEvent),
    Key(KeyEvent),
    Bitrate(Bitrate),
    Status,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Result<Option<Input>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((head, rest)) = words.split_first() else {
        return Ok(None);
    };

    let input = match (*head, rest) {
        ("play", []) => Input::Event(MediaEvent::User(Command::Play)),
        ("pause", []) => Input::Event(MediaEvent::User(Command::Pause)),
        ("stop", []) => Input::Event(MediaEvent::User(Command::Stop)),
        ("toggle", []) => Input::Event(MediaEvent::User(Command::Toggle)),
        ("noisy", []) => Input::Event(MediaEvent::BecomingNoisy),
        ("key", [code]) | ("key", [code, "down"]) => Input::Key(KeyEvent::from_android(0, key_code(code)?)),
        ("key", [code, "up"]) => Input::Key(KeyEvent::from_android(1, key_code(code)?)),
        ("focus", [change]) => Input::Event(MediaEvent::FocusChanged(match *change {
            "gain" => FocusChange::Gain,
            "loss" => FocusChange::Loss,
            "transient" => FocusChange::LossTransient,
            "duck" => FocusChange::LossTransientCanDuck,
            other => return Err(format!("Unknown focus change: {}", other)),
        })),
        ("bitrate", [value]) => Input::Bitrate(value.parse().map_err(|e: CoreError| e.to_string())?),
        ("status", []) => Input::Status,
        ("help", []) => Input::Help,
        ("quit", []) | ("exit", []) => Input::Quit,
        _ => return Err(format!("Unknown command: {}", line.trim())),
    };

    Ok(Some(input))
}

fn key_code(raw: &str) -> Result<i32, String> {
    raw.parse()
        .map_err(|_| format!("Invalid key code: {}", raw))
}

fn print_help() {
    println!("Commands:");
    println!("  play | pause | stop | toggle");
    println!("  key <code> [up]      # 126 play, 127 pause, 85 play/pause, 86 stop, 79 headset");
    println!("  noisy                # headphones unplugged");
    println!("  focus <gain|loss|transient|duck>");
    println!("  bitrate <24|64|128|256>");
    println!("  status | help | quit");
}

fn usage(program: &str) {
    eprintln!("Usage:");
    eprintln!(
        "  {} [--config <file.json>] [--prefs <file.json>] [--bitrate <24|64|128|256>]",
        program
    );
}

/// 终端上的媒体会话
struct ConsoleSession;

impl SessionSink for ConsoleSession {
    fn set_playback_state(&mut self, snapshot: &PlaybackSnapshot) {
        match &snapshot.error_message {
            Some(message) => println!("[session] {:?}: {}", snapshot.state, message),
            None => println!("[session] {:?}", snapshot.state),
        }
    }

    fn set_metadata(&mut self, metadata: &TrackMetadata) {
        println!("[session] title: {}", metadata.title);
    }

    fn release(&mut self) -> Result<(), CoreError> {
        log::debug!("[Cli] session released");
        Ok(())
    }
}

/// 终端上的“前台通知”
struct ConsoleForeground;

impl ForegroundHost for ConsoleForeground {
    fn show_foreground(&mut self, notification: Notification) {
        println!("[notify] {} - {}", notification.title, notification.text);
    }

    fn hide_foreground(&mut self, notification: Option<Notification>) {
        match notification {
            Some(n) => println!("[notify] (dismissable) {} - {}", n.title, n.text),
            None => println!("[notify] hidden"),
        }
    }
}

/// 桌面上没有音频焦点，总是获准
struct ConsoleFocus;

impl AudioFocusManager for ConsoleFocus {
    fn request_focus(&mut self) -> bool {
        true
    }

    fn abandon_focus(&mut self) {}
}

fn run(options: Options) -> Result<(), CoreError> {
    let config = match &options.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };

    let mut prefs = JsonPreferences::open(&options.prefs)?;
    if let Some(bitrate) = options.bitrate {
        remember_stream(&mut prefs, catalog::stream(bitrate))?;
    }

    let platform = Platform {
        session: Box::new(ConsoleSession),
        foreground: Box::new(ConsoleForeground),
        focus: Box::new(ConsoleFocus),
        notifications: Box::new(DefaultNotificationBuilder::new(config.station_name.as_str())),
    };

    let engine_config = config.engine.clone();
    let core = spawn_core(config, &prefs, platform, |events| {
        Box::new(StreamPlayer::spawn(engine_config, Arc::new(events)))
    })?;

    let snapshot = core.snapshot();
    println!(
        "dubfm ready ({} kbps). Type 'help' for commands.",
        snapshot.bitrate
    );

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let input = match parse_input(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };

        match input {
            Input::Event(event) => {
                core.send(event);
            }
            Input::Key(key) => {
                if !core.media_key(key) {
                    println!("key not handled");
                }
            }
            Input::Bitrate(bitrate) => {
                remember_stream(&mut prefs, catalog::stream(bitrate))?;
                core.select_stream(bitrate);
            }
            Input::Status => {
                let snapshot = core.snapshot();
                println!(
                    "{} | {} kbps | {}",
                    snapshot.status, snapshot.bitrate, snapshot.title
                );
            }
            Input::Help => print_help(),
            Input::Quit => break,
        }
        io::stdout().flush()?;
    }

    core.destroy();
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let options = match Options::parse(&args[1..]) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message);
            usage(&args[0]);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(options) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
