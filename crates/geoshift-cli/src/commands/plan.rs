use async_trait::async_trait;
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Mutex;

use geoshift_core::{
    planner, BatchOperation, Config, CoreError, ExecutionPolicy, JobSite, Schedule,
    ScheduleWriter,
};

use super::read_json;

#[derive(Subcommand)]
pub enum PlanAction {
    /// Preview a batch operation without touching the schedule file
    Preview {
        /// JSON file with the operation, e.g. {"op":"move","offset_minutes":60}
        #[arg(long)]
        operation: PathBuf,
        /// JSON file with the full schedule set
        #[arg(long)]
        schedules: PathBuf,
        /// Schedule ids the operation targets
        #[arg(long, required = true, num_args = 1..)]
        targets: Vec<String>,
        /// Optional JSON file with job sites, for capacity checks
        #[arg(long)]
        sites: Option<PathBuf>,
    },
    /// Preview and commit a batch operation back to the schedule file
    Apply {
        #[arg(long)]
        operation: PathBuf,
        #[arg(long)]
        schedules: PathBuf,
        #[arg(long, required = true, num_args = 1..)]
        targets: Vec<String>,
        #[arg(long)]
        sites: Option<PathBuf>,
        /// Commit warning-only items even when other items are blocked
        #[arg(long)]
        permissive: bool,
    },
}

pub fn run(action: PlanAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        PlanAction::Preview {
            operation,
            schedules,
            targets,
            sites,
        } => {
            let (preview, _) = build_preview(&operation, &schedules, &targets, sites.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
            if preview.blocked() {
                std::process::exit(1);
            }
        }
        PlanAction::Apply {
            operation,
            schedules,
            targets,
            sites,
            permissive,
        } => {
            let (preview, all) = build_preview(&operation, &schedules, &targets, sites.as_ref())?;
            let policy = if permissive {
                ExecutionPolicy::Permissive
            } else {
                ExecutionPolicy::Strict
            };

            let writer = InMemoryScheduleFile::new(all);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let results = runtime.block_on(planner::execute(&writer, &preview, policy))?;

            let content = serde_json::to_string_pretty(&writer.into_schedules())?;
            std::fs::write(&schedules, content)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }
    Ok(())
}

fn build_preview(
    operation: &PathBuf,
    schedules: &PathBuf,
    targets: &[String],
    sites: Option<&PathBuf>,
) -> Result<(planner::BatchPreview, Vec<Schedule>), Box<dyn std::error::Error>> {
    let operation: BatchOperation = read_json(operation)?;
    let all: Vec<Schedule> = read_json(schedules)?;
    let sites: Vec<JobSite> = match sites {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let config = Config::load()?;

    let selected: Vec<Schedule> = all
        .iter()
        .filter(|s| targets.contains(&s.schedule_id))
        .cloned()
        .collect();
    if selected.len() != targets.len() {
        let known: Vec<&str> = selected.iter().map(|s| s.schedule_id.as_str()).collect();
        let missing: Vec<&String> = targets
            .iter()
            .filter(|t| !known.contains(&t.as_str()))
            .collect();
        return Err(format!("unknown schedule ids: {missing:?}").into());
    }

    let preview = planner::preview(&operation, &selected, &all, &sites, &config.policy)?;
    Ok((preview, all))
}

/// Schedule store over the loaded JSON array; written back after execute.
struct InMemoryScheduleFile {
    schedules: Mutex<Vec<Schedule>>,
}

impl InMemoryScheduleFile {
    fn new(schedules: Vec<Schedule>) -> Self {
        Self {
            schedules: Mutex::new(schedules),
        }
    }

    fn into_schedules(self) -> Vec<Schedule> {
        self.schedules.into_inner().unwrap_or_default()
    }
}

#[async_trait]
impl ScheduleWriter for InMemoryScheduleFile {
    async fn upsert_schedule(&self, schedule: &Schedule) -> Result<(), CoreError> {
        let mut schedules = self
            .schedules
            .lock()
            .map_err(|_| CoreError::Custom("schedule store poisoned".to_string()))?;
        match schedules
            .iter_mut()
            .find(|s| s.schedule_id == schedule.schedule_id)
        {
            Some(slot) => *slot = schedule.clone(),
            None => schedules.push(schedule.clone()),
        }
        Ok(())
    }

    async fn delete_schedule(&self, schedule_id: &str) -> Result<(), CoreError> {
        let mut schedules = self
            .schedules
            .lock()
            .map_err(|_| CoreError::Custom("schedule store poisoned".to_string()))?;
        schedules.retain(|s| s.schedule_id != schedule_id);
        Ok(())
    }
}
