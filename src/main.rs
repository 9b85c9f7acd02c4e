//! lpad-demo: ejecuta el escenario de referencia sobre el store en memoria o,
//! con `--pg`, sobre Postgres (¡borra las tablas de la LaunchPad!).

use std::process::ExitCode;
use std::sync::Arc;

use fireworks_rust::{open_launchpad_with_clock, reference_scenario, AppError, ScenarioReport};
use fw_core::constants::RESET_DATE_FORMAT;
use fw_core::{Clock, InMemoryStore, LaunchPad, LaunchPadConfig, MaintenanceSignal, ManualClock};
use log::{error, info};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).format_timestamp(None)
                                                                                   .init();
    match run(std::env::args().any(|a| a == "--pg")) {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => println!("{report:?} ({e})"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("lpad-demo failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(use_postgres: bool) -> Result<ScenarioReport, AppError> {
    let clock = Arc::new(ManualClock::starting_now());
    if use_postgres {
        let lp = open_launchpad_with_clock(clock.clone())?;
        let today = clock.now().format(RESET_DATE_FORMAT).to_string();
        lp.reset(&today)?;
        let report = reference_scenario(&lp, &clock)?;
        let tuneup = lp.tuneup()?;
        info!("tuneup: {tuneup:?}");
        Ok(report)
    } else {
        let lp = LaunchPad::with_clock(InMemoryStore::new(), LaunchPadConfig::default(), clock.clone());
        let report = reference_scenario(&lp, &clock)?;
        let maintenance = lp.maintain(false, lp.config().maintain_interval(), &MaintenanceSignal::new())?;
        info!("maintain: {maintenance:?}");
        Ok(report)
    }
}
