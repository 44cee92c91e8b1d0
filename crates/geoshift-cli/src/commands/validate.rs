use clap::Subcommand;
use std::path::PathBuf;

use geoshift_core::{validator, Config, ConflictSeverity, JobSite, Schedule};

use super::read_json;

#[derive(Subcommand)]
pub enum ValidateAction {
    /// Validate candidate schedules against an existing set
    Check {
        /// JSON file with the candidate schedules (array)
        #[arg(long)]
        candidates: PathBuf,
        /// JSON file with the existing schedules (array)
        #[arg(long)]
        existing: PathBuf,
        /// Optional JSON file with job sites, for capacity checks
        #[arg(long)]
        sites: Option<PathBuf>,
        /// Exit non-zero on warnings too, not only errors
        #[arg(long)]
        strict: bool,
    },
}

pub fn run(action: ValidateAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ValidateAction::Check {
            candidates,
            existing,
            sites,
            strict,
        } => {
            let candidates: Vec<Schedule> = read_json(&candidates)?;
            let existing: Vec<Schedule> = read_json(&existing)?;
            let sites: Vec<JobSite> = match sites {
                Some(path) => read_json(&path)?,
                None => Vec::new(),
            };
            let config = Config::load()?;

            let conflicts = validator::validate(&candidates, &existing, &sites, &config.policy);
            println!("{}", serde_json::to_string_pretty(&conflicts)?);

            let errors = conflicts
                .iter()
                .filter(|c| c.severity == ConflictSeverity::Error)
                .count();
            if errors > 0 || (strict && !conflicts.is_empty()) {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
