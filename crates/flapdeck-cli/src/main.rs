//! `flapdeck-cli` – the ignition switch for the split-flap display service.
//!
//! This binary:
//!
//! 1. Initialises structured logging (and optional OTLP export).
//! 2. Loads `~/.flapdeck/config.toml`, writing the default vault on first
//!    run; an empty broker URL is fatal.
//! 3. Wires the state bus, broker link, and mode controller together, with
//!    presence announcement and frame republish on every (re)connect.
//! 4. Intercepts **Ctrl-C** to publish a retained `offline` and disconnect
//!    cleanly before exit.
//! 5. Drops the user into an interactive shell driving the display
//!    (`/mode`, `/text`, `/stopwatch`, `/timer`, `/scene`, `/status`).

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use flapdeck_hal::FlapSequence;
use flapdeck_link::{
    BrokerLink, FrameTopicSink, Lane, LinkHandler, LinkMessage, StateBus,
};
use flapdeck_runtime::{ModeController, telemetry};
use flapdeck_types::{Availability, ConnectionStatus, Event, StatePayload};

/// Source tag used on bus events emitted by the wiring layer.
const SOURCE: &str = "flapdeck-cli";

fn main() {
    // Hold the guard for the entire process lifetime so pending spans flush
    // on exit.
    let _telemetry = telemetry::init_tracing("flapdeck");

    print_banner();

    // ── Configuration vault ───────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  First run – default config written to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Config error".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    debug!(?cfg, "effective configuration");

    // Fatal configuration error: retrying cannot conjure a broker URL.
    if cfg.broker_url.trim().is_empty() {
        eprintln!("{}", "broker_url is not set; refusing to start".red().bold());
        std::process::exit(1);
    }

    // ── Runtime & wiring ──────────────────────────────────────────────────
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start async runtime".red().bold());
            std::process::exit(1);
        }
    };
    let _enter = runtime.enter();

    let bus = Arc::new(StateBus::default());
    let link = Arc::new(BrokerLink::new(cfg.link_config(), Arc::clone(&bus)));
    let sink = Arc::new(FrameTopicSink::new(
        Arc::clone(&link),
        cfg.frame_topic.clone(),
    ));
    let ctrl = ModeController::new(
        cfg.controller_config(),
        FlapSequence::default(),
        sink,
        Arc::clone(&bus),
    );

    // On every (re)connect: announce presence (retained, so late joiners see
    // it) and re-send the current frame to the freshly attached broker.
    let handler: LinkHandler = {
        let link = Arc::clone(&link);
        let ctrl = Arc::clone(&ctrl);
        let bus = Arc::clone(&bus);
        let availability_topic = cfg.availability_topic.clone();
        Arc::new(move |msg| match msg {
            LinkMessage::Connected => {
                link.publish_retained(
                    &availability_topic,
                    Availability::Online.as_str().as_bytes(),
                );
                bus.publish(
                    Lane::Link,
                    Event::new(
                        SOURCE,
                        StatePayload::AvailabilityChanged(Availability::Online),
                    ),
                );
                ctrl.republish_frame();
            }
            LinkMessage::Inbound { topic, payload } => {
                debug!(topic, bytes = payload.len(), "inbound broker message");
            }
        })
    };

    if let Err(e) = link.connect(handler) {
        eprintln!("{}: {e}", "Broker configuration error".red().bold());
        std::process::exit(1);
    }
    info!(broker = %cfg.broker_url, "broker link started");

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let link = Arc::clone(&link);
        let shutdown = Arc::clone(&shutdown);
        let availability_topic = cfg.availability_topic.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
            link.publish_retained(
                &availability_topic,
                Availability::Offline.as_str().as_bytes(),
            );
            link.disconnect();
            println!("{}", "  ✓ Offline announced, link closed.".green());
            shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
        }
    }

    // ── Interactive shell ─────────────────────────────────────────────────
    repl::run(Arc::clone(&ctrl), Arc::clone(&link), Arc::clone(&shutdown));

    // `/quit` path: announce offline before dropping the connection.
    if link.state().status != ConnectionStatus::Disconnected {
        link.publish_retained(
            &cfg.availability_topic,
            Availability::Offline.as_str().as_bytes(),
        );
        link.disconnect();
    }
    info!("flapdeck exiting");
}

fn print_banner() {
    println!();
    println!("  {}", "▞▚ FLAPDECK".bold().cyan());
    println!("  {}", "split-flap display controller".dimmed());
    println!();
}
