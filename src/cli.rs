use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use keepsake::archive::LocalArchive;
use keepsake::catalog::{MemoryCatalog, Selection};
use keepsake::config::{KeepsakeConfig, StepKind, WorkflowStepConfig};
use keepsake::error::KeepsakeError;
use keepsake::preservation::{PipelineSettings, PreservationMode, PreservationPipeline};
use keepsake::report::{RunReport, RunResult};
use keepsake::transform::MetsTransformer;
use keepsake::validation::{ValidationEngine, ValidationTier};
use keepsake::workflow::{StepJob, WorkflowTimer};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "keepsake", about = "Preservation and integrity validation pipeline")]
pub struct Cli {
    /// Path to the JSON configuration file. Defaults to the platform config directory.
    #[arg(long, global = true, env = "KEEPSAKE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for log files. Defaults to the platform data directory.
    #[arg(long, global = true, env = "KEEPSAKE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package catalog records into the archive
    Preserve {
        /// Catalog name whose records are preserved
        #[arg(short, long)]
        catalog: String,

        /// Re-send metadata of recently modified records instead of full packages
        #[arg(long)]
        update: bool,

        /// Only the record(s) whose GUID contains this id
        #[arg(long, conflicts_with = "subset")]
        uuid: Option<String>,

        /// Only master assets or only sub-assets
        #[arg(long, value_enum)]
        subset: Option<Subset>,
    },
    /// Validate records queued for a validation tier
    Validate {
        /// Catalog name whose queued records are validated
        #[arg(short, long)]
        catalog: String,

        /// Validation tier
        #[arg(long, value_enum, default_value = "simple")]
        tier: Tier,
    },
    /// Run every configured workflow step on its timer until Enter is pressed
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Subset {
    Masters,
    SubAssets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Tier {
    Simple,
    Full,
}

impl From<Tier> for ValidationTier {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Simple => Self::Simple,
            Tier::Full => Self::Full,
        }
    }
}

pub fn run_command(cli: Cli) -> Result<()> {
    let config = KeepsakeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate()?;

    match cli.command {
        Commands::Preserve {
            catalog,
            update,
            uuid,
            subset,
        } => {
            let mode = if update {
                PreservationMode::UpdateOnly
            } else {
                PreservationMode::Full
            };
            let selection = match (uuid, subset) {
                (Some(uuid), _) => Selection::SpecificUuid(uuid),
                (None, Some(Subset::Masters)) => Selection::MasterAssetSubset,
                (None, Some(Subset::SubAssets)) => Selection::SubAssetSubset,
                (None, None) => mode.default_selection(config.update_window_days),
            };
            let result = handle_preserve(&config, &catalog, &selection, mode)?;
            println!("{}", result.report.summary());
            Ok(())
        }
        Commands::Validate { catalog, tier } => {
            let result = handle_validate(&config, &catalog, tier.into())?;
            println!("{}", result.report.summary());
            Ok(())
        }
        Commands::Run => handle_run(&config),
    }
}

fn handle_preserve(
    config: &KeepsakeConfig,
    catalog_name: &str,
    selection: &Selection,
    mode: PreservationMode,
) -> Result<RunResult> {
    let catalog = MemoryCatalog::load(&config.catalog_path)?;
    let result = preserve_with(&catalog, config, catalog_name, selection, mode)?;
    catalog.save(&config.catalog_path)?;
    Ok(result)
}

fn preserve_with(
    catalog: &MemoryCatalog,
    config: &KeepsakeConfig,
    catalog_name: &str,
    selection: &Selection,
    mode: PreservationMode,
) -> keepsake::error::Result<RunResult> {
    let mut archive = LocalArchive::open(&config.archive_root, config.checksum_algorithm)?;
    let transformer = MetsTransformer::new();

    PreservationPipeline::new(catalog, &mut archive, &transformer, PipelineSettings::from(config))
        .preserve_selection(catalog_name, selection, mode)
}

fn handle_validate(config: &KeepsakeConfig, catalog_name: &str, tier: ValidationTier) -> Result<RunResult> {
    let catalog = MemoryCatalog::load(&config.catalog_path)?;
    let result = validate_with(&catalog, config, catalog_name, tier)?;
    catalog.save(&config.catalog_path)?;
    Ok(result)
}

fn validate_with(
    catalog: &MemoryCatalog,
    config: &KeepsakeConfig,
    catalog_name: &str,
    tier: ValidationTier,
) -> keepsake::error::Result<RunResult> {
    let archive = LocalArchive::open(&config.archive_root, config.checksum_algorithm)?;
    ValidationEngine::new(catalog, &archive, config.checksum_algorithm, config.scratch_dir())
        .validate_catalog(catalog_name, tier)
}

fn handle_run(config: &KeepsakeConfig) -> Result<()> {
    if config.workflows.is_empty() {
        println!("No workflow steps configured.");
        return Ok(());
    }

    let catalog = MemoryCatalog::load(&config.catalog_path)?;
    let save_lock = Arc::new(Mutex::new(()));
    let mut timer = WorkflowTimer::new();

    for step in &config.workflows {
        let job = step_job(step.clone(), config.clone(), catalog.clone(), Arc::clone(&save_lock));
        timer.schedule(step.name(), Duration::from_secs(step.interval_secs), job)?;
    }

    println!(
        "Running {} workflow step(s): {}. Press Enter to stop.",
        timer.step_names().len(),
        timer.step_names().join(", ")
    );
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;

    timer.shutdown();
    let guard = save_lock
        .lock()
        .map_err(|_poisoned| anyhow::anyhow!("catalog save lock poisoned"))?;
    catalog.save(&config.catalog_path)?;
    drop(guard);
    Ok(())
}

/// Job of one workflow step: run it, then persist the shared catalog.
fn step_job(
    step: WorkflowStepConfig,
    config: KeepsakeConfig,
    catalog: MemoryCatalog,
    save_lock: Arc<Mutex<()>>,
) -> StepJob {
    Box::new(move || {
        let result = match step.step {
            StepKind::Preserve => preserve_with(
                &catalog,
                &config,
                &step.catalog,
                &Selection::ReadyForArchival,
                PreservationMode::Full,
            ),
            StepKind::Update => preserve_with(
                &catalog,
                &config,
                &step.catalog,
                &PreservationMode::UpdateOnly.default_selection(config.update_window_days),
                PreservationMode::UpdateOnly,
            ),
            StepKind::SimpleValidation => validate_with(&catalog, &config, &step.catalog, ValidationTier::Simple),
            StepKind::FullValidation => validate_with(&catalog, &config, &step.catalog, ValidationTier::Full),
        }?;

        let _guard = save_lock
            .lock()
            .map_err(|_poisoned| KeepsakeError::Other("catalog save lock poisoned".to_owned()))?;
        catalog.save(&config.catalog_path)?;
        Ok::<RunReport, KeepsakeError>(result.report)
    })
}
