//! REPL – interactive shell driving the display.
//!
//! Supported slash-commands:
//!   /help                      – show this list
//!   /status                    – mode, frame, link, stopwatch, timer
//!   /mode <name>               – switch content source
//!   /text <message>            – show free text (Text/Train modes)
//!   /stopwatch start|stop|reset
//!   /timer <seconds> | start | stop
//!   /scene demo|stop           – play the built-in demo scene / stop playback
//!   /quit | /exit              – gracefully exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use flapdeck_link::BrokerLink;
use flapdeck_runtime::ModeController;
use flapdeck_types::{Mode, SceneLine, SceneScript};

/// Entry point for the interactive shell.
///
/// `shutdown` is polled each iteration; when set the loop exits cleanly.
pub fn run(ctrl: Arc<ModeController>, link: Arc<BrokerLink>, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "flapdeck>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }

        let (head, rest) = split_command(cmd);
        match head {
            "/help" => cmd_help(),
            "/status" => cmd_status(&ctrl, &link),
            "/mode" => cmd_mode(&ctrl, rest),
            "/text" => cmd_text(&ctrl, rest),
            "/stopwatch" => cmd_stopwatch(&ctrl, rest),
            "/timer" => cmd_timer(&ctrl, rest),
            "/scene" => cmd_scene(&ctrl, rest),
            "/quit" | "/exit" => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Flapdeck Commands".bold().underline());
    println!("  {}               – mode, frame, link, stopwatch, timer", "/status".bold().cyan());
    println!("  {}          – switch content source", "/mode <name>".bold().cyan());
    println!("                          (text, train, sequence, clock, stopwatch, timer)");
    println!("  {}       – show free text", "/text <message>".bold().cyan());
    println!("  {} – drive the stopwatch", "/stopwatch start|stop|reset".bold().cyan());
    println!("  {} – arm or drive the countdown", "/timer <seconds>|start|stop".bold().cyan());
    println!("  {}      – play the demo scene / stop playback", "/scene demo|stop".bold().cyan());
    println!("  {}           – exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(ctrl: &ModeController, link: &BrokerLink) {
    let snap = ctrl.snapshot();
    let link_state = link.state();

    println!();
    println!("{}", "Status".bold().underline());
    println!("  Mode      : {}", snap.mode.to_string().yellow());
    println!("  Frame     : {}", format!("[{}]", snap.text).bold());
    let link_line = match link_state.status {
        flapdeck_types::ConnectionStatus::Connected => link_state.status.to_string().green(),
        flapdeck_types::ConnectionStatus::Errored => link_state.status.to_string().red(),
        _ => link_state.status.to_string().yellow(),
    };
    println!("  Link      : {}", link_line);
    if let Some(err) = &link_state.last_error {
        println!("              {}", err.dimmed());
    }
    println!(
        "  Stopwatch : {} ({})",
        format_millis(snap.stopwatch.elapsed_ms),
        running_label(snap.stopwatch.running)
    );
    println!(
        "  Timer     : {} ({})",
        format_millis(snap.timer.remaining_ms),
        running_label(snap.timer.running)
    );
    println!();
}

fn cmd_mode(ctrl: &ModeController, rest: &str) {
    match rest.parse::<Mode>() {
        Ok(mode) => {
            ctrl.set_mode(mode);
            println!("  {} {}", "✓ Mode set to".green(), mode.to_string().bold());
        }
        Err(_) => {
            println!(
                "{} '{}'. Valid modes: text, train, sequence, clock, stopwatch, timer",
                "Unknown mode:".red(),
                rest.yellow()
            );
        }
    }
}

fn cmd_text(ctrl: &ModeController, rest: &str) {
    if rest.is_empty() {
        println!("{}", "Usage: /text <message>".yellow());
        return;
    }
    // The wheels only carry uppercase letters.
    ctrl.set_text(&rest.to_uppercase());
}

fn cmd_stopwatch(ctrl: &ModeController, rest: &str) {
    match rest {
        "start" => ctrl.start_stopwatch(),
        "stop" => ctrl.stop_stopwatch(),
        "reset" => ctrl.reset_stopwatch(),
        _ => println!("{}", "Usage: /stopwatch start|stop|reset".yellow()),
    }
}

fn cmd_timer(ctrl: &ModeController, rest: &str) {
    match parse_timer_arg(rest) {
        Some(TimerCmd::Set(seconds)) => {
            ctrl.set_timer(seconds * 1000);
            println!("  {} {}s", "✓ Timer armed:".green(), seconds);
        }
        Some(TimerCmd::Start) => ctrl.start_timer(),
        Some(TimerCmd::Stop) => ctrl.stop_timer(),
        None => println!("{}", "Usage: /timer <seconds>|start|stop".yellow()),
    }
}

fn cmd_scene(ctrl: &ModeController, rest: &str) {
    match rest {
        "demo" => {
            ctrl.play_sequence(demo_scene());
            println!("  {} (type {} to end it)", "✓ Demo scene playing".green(), "/scene stop".bold());
        }
        "stop" => ctrl.stop_sequence(),
        _ => println!("{}", "Usage: /scene demo|stop".yellow()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

enum TimerCmd {
    Set(u64),
    Start,
    Stop,
}

/// Split a command line into the slash-command head and its argument tail.
fn split_command(cmd: &str) -> (&str, &str) {
    match cmd.split_once(' ') {
        Some((head, rest)) => (head, rest.trim()),
        None => (cmd, ""),
    }
}

fn parse_timer_arg(rest: &str) -> Option<TimerCmd> {
    match rest {
        "start" => Some(TimerCmd::Start),
        "stop" => Some(TimerCmd::Stop),
        _ => rest.parse::<u64>().ok().map(TimerCmd::Set),
    }
}

fn format_millis(ms: u64) -> String {
    let total = ms / 1000;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

fn running_label(running: bool) -> &'static str {
    if running { "running" } else { "stopped" }
}

/// Built-in looping scene used by `/scene demo`.
fn demo_scene() -> SceneScript {
    SceneScript {
        lines: vec![
            SceneLine::new("HELLO", 2500),
            SceneLine::new("THIS IS", 2000),
            SceneLine::new("FLAPDECK", 3000),
        ],
        loop_forever: true,
    }
}
