use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use geoshift_core::{
    Config, EngineOutput, JobSite, RegionEvent, RegionTransition, Schedule, SessionEngine,
    SessionEvent, TimeEvent,
};

use super::read_json;

#[derive(Subcommand)]
pub enum SimulateAction {
    /// Drive one session through a scripted sequence of steps
    Run {
        /// JSON scenario file (schedule, site, steps)
        scenario: PathBuf,
        /// Print only the emitted time events, not session notices
        #[arg(long)]
        events_only: bool,
    },
}

/// One scripted step: a timestamp plus what happens at it.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Step {
    /// Advance wall-clock time, firing due timers.
    Tick { at: DateTime<Utc> },
    Enter { at: DateTime<Utc> },
    Exit { at: DateTime<Utc> },
    StartBreak { at: DateTime<Utc> },
    EndBreak { at: DateTime<Utc> },
    ClockOut { at: DateTime<Utc> },
    ManualClockIn { at: DateTime<Utc> },
    ConfirmClockIn { at: DateTime<Utc> },
    Cancel { at: DateTime<Utc> },
}

impl Step {
    fn at(&self) -> DateTime<Utc> {
        match self {
            Step::Tick { at }
            | Step::Enter { at }
            | Step::Exit { at }
            | Step::StartBreak { at }
            | Step::EndBreak { at }
            | Step::ClockOut { at }
            | Step::ManualClockIn { at }
            | Step::ConfirmClockIn { at }
            | Step::Cancel { at } => *at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Scenario {
    schedule: Schedule,
    site: JobSite,
    steps: Vec<Step>,
}

#[derive(Debug, Serialize)]
struct Transcript {
    final_status: geoshift_core::SessionStatus,
    events: Vec<TimeEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    notices: Vec<SessionEvent>,
}

pub fn run(action: SimulateAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SimulateAction::Run {
            scenario,
            events_only,
        } => {
            let scenario: Scenario = read_json(&scenario)?;
            let config = Config::load()?;
            let region_id = scenario.site.site_id.clone();
            let mut engine = SessionEngine::new(
                scenario.schedule,
                scenario.site,
                config.tracking,
                config.policy,
            );

            let mut events = Vec::new();
            let mut notices = Vec::new();
            let mut collect = |out: EngineOutput| {
                events.extend(out.emitted);
                notices.extend(out.notices);
            };

            for step in &scenario.steps {
                let at = step.at();
                if engine.due_to_arm(at) {
                    collect(engine.arm(at));
                }
                match step {
                    Step::Tick { .. } => {}
                    Step::Enter { at } => collect(engine.handle_region(&RegionEvent {
                        region_id: region_id.clone(),
                        transition: RegionTransition::Enter,
                        timestamp: *at,
                    })),
                    Step::Exit { at } => collect(engine.handle_region(&RegionEvent {
                        region_id: region_id.clone(),
                        transition: RegionTransition::Exit,
                        timestamp: *at,
                    })),
                    Step::StartBreak { at } => collect(engine.start_break(*at)),
                    Step::EndBreak { at } => collect(engine.end_break(*at)),
                    Step::ClockOut { at } => collect(engine.request_clock_out(*at)),
                    Step::ManualClockIn { at } => collect(engine.manual_clock_in(*at)),
                    Step::ConfirmClockIn { at } => collect(engine.confirm_clock_in(*at)),
                    Step::Cancel { at } => collect(engine.cancel(*at)),
                }
                collect(engine.tick(at));
            }

            let transcript = Transcript {
                final_status: engine.status(),
                events,
                notices: if events_only { Vec::new() } else { notices },
            };
            println!("{}", serde_json::to_string_pretty(&transcript)?);
        }
    }
    Ok(())
}
