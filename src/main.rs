use chrono::{DateTime, Datelike, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use gimbal_o_mat::config::Config;
use gimbal_o_mat::gimbal::{GimbalController, RotctldLink, TickInput};
use gimbal_o_mat::predict::{checksum_ok, EquirectangularGrid, Geodetic, TleLoader};
use gimbal_o_mat::session::SatelliteTrackingSession;

#[derive(Parser)]
#[command(name = "gimbal-o-mat")]
#[command(about = "Satellite pass prediction and rotator tracking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the checksum of every element line in a TLE file
    CheckTle { file: PathBuf },
    /// Print the next pass of the configured satellite
    Pass {
        #[arg(long)]
        config: PathBuf,
        /// Satellite name, overriding `tle.satellite`
        #[arg(long)]
        satellite: Option<String>,
        /// Search start (RFC 3339), defaults to now
        #[arg(long, value_parser = parse_time)]
        at: Option<DateTime<Utc>>,
    },
    /// Print one orbit of ground track and footprints as JSON
    Path {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        satellite: Option<String>,
        /// Project onto a pixel grid of this width (height is half)
        #[arg(long)]
        width: Option<u32>,
    },
    /// Drive the rotator
    Track {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        satellite: Option<String>,
        /// Start in auto-track; implies --release
        #[arg(long)]
        auto: bool,
        /// Let the rotator move as soon as it is connected
        #[arg(long)]
        release: bool,
    },
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::CheckTle { file } => check_tle(&file),
        Commands::Pass {
            config,
            satellite,
            at,
        } => pass(&config, satellite, at.unwrap_or_else(Utc::now)),
        Commands::Path {
            config,
            satellite,
            width,
        } => path(&config, satellite, width),
        Commands::Track {
            config,
            satellite,
            auto,
            release,
        } => track(&config, satellite, auto, auto || release),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| e.to_string())
}

fn check_tle(file: &Path) -> Result<ExitCode, String> {
    let content = fs::read_to_string(file).map_err(|e| format!("reading {}: {}", file.display(), e))?;

    let mut checked = 0;
    let mut bad = 0;
    for (i, line) in content.lines().enumerate() {
        let line = line.trim_end();
        if !(line.starts_with("1 ") || line.starts_with("2 ")) {
            continue;
        }
        checked += 1;
        if !checksum_ok(line) {
            bad += 1;
            println!("  line {}: bad checksum: {}", i + 1, line);
        }
    }

    println!("{} element lines, {} bad", checked, bad);
    Ok(if bad == 0 && checked > 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Config, plus a session with the observer set and the satellite selected.
async fn open_session(
    config_path: &Path,
    satellite: Option<String>,
    now: DateTime<Utc>,
) -> Result<(Config, SatelliteTrackingSession), String> {
    let config = Config::from_file(config_path).map_err(|e| e.to_string())?;
    let params = config.search_params().map_err(|e| e.to_string())?;
    let station = config.station().map_err(|e| e.to_string())?;
    let backoff = config.fetch_backoff().map_err(|e| e.to_string())?;

    let mut session = SatelliteTrackingSession::new(params, config.tracking.max_path_points);
    session.set_observer(Some(station), now);

    if let Some(name) = satellite.or_else(|| config.tle.satellite.clone()) {
        let mut loader = TleLoader::new(config.tle.folder.clone());
        session
            .select_by_name(&mut loader, &name, config.tle.fetch_attempts, backoff, now)
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok((config, session))
}

fn pass(config: &Path, satellite: Option<String>, at: DateTime<Utc>) -> Result<ExitCode, String> {
    let (_, session) = runtime()?.block_on(open_session(config, satellite, at))?;
    let Some(body) = session.body() else {
        return Err("no satellite selected".to_string());
    };

    println!("{}", body.name());
    let rs = session.rise_set();
    match rs.rise_time {
        Some(t) => println!("  rise  {}  az {:.0}", t.format("%Y-%m-%d %H:%M:%S"), rs.rise_azimuth_deg),
        None => println!("  rise  -"),
    }
    match rs.set_time {
        Some(t) => println!("  set   {}  az {:.0}", t.format("%Y-%m-%d %H:%M:%S"), rs.set_azimuth_deg),
        None => println!("  set   -"),
    }

    let status = session.pass_status(at);
    match status.transition.and_then(|d| d.to_std().ok()) {
        Some(d) => {
            let d = std::time::Duration::from_secs(d.as_secs());
            println!("  state {} ({})", status.state, humantime::format_duration(d));
        }
        None => println!("  state {}", status.state),
    }

    if let Some(now) = session.satellite_now(at) {
        println!(
            "  now   az {:.1} el {:.1} range {:.0} km rate {:.2} km/s",
            now.azimuth_deg, now.elevation_deg, now.range_km, now.range_rate_km_s
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn path(config: &Path, satellite: Option<String>, width: Option<u32>) -> Result<ExitCode, String> {
    let now = Utc::now();
    let (_, session) = runtime()?.block_on(open_session(config, satellite, now))?;

    let json = match width {
        Some(width) => {
            let grid = EquirectangularGrid {
                width,
                height: (width / 2).max(1),
            };
            serde_json::to_string_pretty(&session.sample_path(now, &grid))
        }
        None => serde_json::to_string_pretty(&session.sample_path(now, &Geodetic)),
    }
    .map_err(|e| e.to_string())?;

    println!("{}", json);
    Ok(ExitCode::SUCCESS)
}

fn track(
    config: &Path,
    satellite: Option<String>,
    auto: bool,
    release: bool,
) -> Result<ExitCode, String> {
    runtime()?.block_on(run_tracker_loop(config, satellite, auto, release))
}

async fn run_tracker_loop(
    config: &Path,
    satellite: Option<String>,
    auto: bool,
    release: bool,
) -> Result<ExitCode, String> {
    let (config, mut session) = open_session(config, satellite, Utc::now()).await?;
    let tick = config.tick_interval().map_err(|e| e.to_string())?;
    let timeout = config.rotator_timeout().map_err(|e| e.to_string())?;
    let station = config.station().map_err(|e| e.to_string())?;
    let dx_bearing = config
        .dx()
        .map_err(|e| e.to_string())?
        .map(|dx| station.bearing_to(&dx));

    let link = RotctldLink::new(config.rotator.address.clone(), timeout);
    log::info!("Using rotator at {}", link.address());
    let mut gimbal = GimbalController::new(link, config.controller_settings());
    let auto = auto || config.tracking.auto;
    gimbal.set_auto(auto);
    let mut pending_release = release || auto;

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_state = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping rotator");
                if gimbal.state().visible {
                    if let Err(e) = gimbal.stop().await {
                        log::warn!("Stop on exit failed: {}", e);
                    }
                }
                return Ok(ExitCode::SUCCESS);
            }
        }

        let now = Utc::now();
        if let Err(e) = session.refresh(now) {
            log::error!("{}", e);
        }
        let input = TickInput {
            target: session.target_view(now),
            new_pass: session.take_new_pass(),
            // An unset clock starts at the epoch.
            clock_valid: now.year() >= 2020,
            dx_bearing_deg: dx_bearing,
        };

        if let Err(e) = gimbal.tick(&input).await {
            log::debug!("Tick failed: {}", e);
        }
        if pending_release {
            match gimbal.release().await {
                Ok(released) => pending_release = !released,
                Err(e) => log::warn!("Release failed: {}", e),
            }
        }

        let state = gimbal.state();
        if last_state.as_ref() == Some(&state) {
            continue;
        }
        match serde_json::to_string(&state) {
            Ok(json) => log::debug!("{}", json),
            Err(e) => log::warn!("Cannot serialize gimbal state: {}", e),
        }
        let previous_reason = last_state.as_ref().and_then(|s| s.no_target);
        if let Some(reason) = state.no_target.filter(|r| Some(*r) != previous_reason) {
            log::info!("No target: {}", reason);
        }
        last_state = Some(state);
    }
}
