//! follow_pilot - steer a follow-me robot from subject and gesture detections.
//!
//! Each tick:
//! 1. Polls the detection source (camera + detector, or a replay file)
//! 2. Decides a motion command (fist stops, otherwise steer toward the subject)
//! 3. Writes the command byte to the robot controller
//!
//! The robot receives a final STOP however the session ends.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use follow_pilot::channel::{open_dispatch_until_cancelled, ControllerEndpoint};
use follow_pilot::config::PilotConfig;
use follow_pilot::control::{ControlLoop, LoopSettings, QuitSignal};
use follow_pilot::snapshot::open_detection_source;
use follow_pilot::ui::{Ui, UiMode};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Follow a person and stop on a raised fist"
)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "FOLLOW_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Robot controller address (host:port).
    #[arg(long, value_name = "ADDR")]
    controller_addr: Option<String>,

    /// Detection source: stub://<name> or replay://<path>.
    #[arg(long, value_name = "URL")]
    source: Option<String>,

    /// Run without a robot; commands are logged only.
    #[arg(long)]
    local: bool,

    /// Transmit commands from a background sender thread.
    #[arg(long)]
    decoupled_send: bool,

    /// Do not flip detections horizontally (camera is not selfie-facing).
    #[arg(long)]
    no_mirror: bool,

    /// Stop after this many ticks.
    #[arg(long, value_name = "N")]
    max_ticks: Option<u64>,

    /// Progress output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::new(args.ui, std::io::stderr().is_terminal());

    let cfg = {
        let stage = ui.stage("Loading config");
        stage.finish(load_config(&args))?
    };
    log::info!(
        "controller={} local_only={} source={} fps={} mirror={} frame_width={} tolerance={} max_hands={} fist_threshold={}",
        cfg.controller.endpoint,
        cfg.controller.local_only,
        cfg.source.url,
        cfg.source.target_fps,
        cfg.source.mirror,
        cfg.geometry.frame_width(),
        cfg.geometry.center_tolerance(),
        cfg.gestures.max_hands,
        cfg.gestures.policy.closed_threshold()
    );

    let quit = QuitSignal::new();
    quit.install_ctrlc()?;
    if std::io::stdin().is_terminal() {
        quit.watch_stdin()?;
        log::info!("type q + Enter or press Ctrl-C to stop");
    }

    let connected = {
        let stage = ui.stage("Connecting to controller");
        stage.finish(open_dispatch_until_cancelled(
            &cfg.controller,
            &cfg.retry,
            || quit.is_raised(),
        ))
    };
    let dispatch = match connected {
        Ok(dispatch) => dispatch,
        Err(e) if quit.is_raised() => {
            log::info!("quit requested while connecting: {:#}", e);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    // Dropping `dispatch` on a failed source open still sends STOP.
    let source = {
        let stage = ui.stage("Opening detection source");
        stage.finish(open_detection_source(&cfg.source, cfg.gestures))?
    };

    let settings = LoopSettings {
        max_ticks: args.max_ticks,
        ..LoopSettings::paced(cfg.source.target_fps)
    };
    let report = ControlLoop::new(source, dispatch, cfg.geometry, quit)
        .with_settings(settings)
        .run();

    log::info!(
        "session finished: exit={} ticks={} skipped={} sent={} (w={} a={} d={} x={}) final_stop={}",
        report.exit,
        report.ticks,
        report.skipped_ticks,
        report.channel.commands.total(),
        report.channel.commands.get(follow_pilot::Command::Forward),
        report.channel.commands.get(follow_pilot::Command::Left),
        report.channel.commands.get(follow_pilot::Command::Right),
        report.channel.commands.get(follow_pilot::Command::Stop),
        report.channel.stopped_on_close
    );

    if report.exit.is_failure() {
        return Err(anyhow!("follow session failed: {}", report.exit));
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<PilotConfig> {
    let mut cfg = PilotConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = &args.controller_addr {
        cfg.controller.endpoint = ControllerEndpoint::parse(addr)?;
    }
    if let Some(url) = &args.source {
        cfg.source.url = url.clone();
    }
    if args.local {
        cfg.controller.local_only = true;
    }
    if args.decoupled_send {
        cfg.controller.decoupled_send = true;
    }
    if args.no_mirror {
        cfg.source.mirror = false;
    }
    cfg.validate()?;
    Ok(cfg)
}
