//! Stage runner.
//!
//! Runs the selected stages in order as child processes, skipping any
//! stage whose state record shows it is up to date, and saving the state
//! record after every stage that runs.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use vz_cli_utils::{MultiProgress, StageProgress};
use vz_config::{Config, DataPaths};

use crate::PipelineError;
use crate::stage::Stage;
use crate::state::{PipelineState, fingerprint};

/// Program name of the dataset builder in the default commands.
const CANON_PROGRAM: &str = "vz_canon";

/// What happened to one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Commands ran and succeeded.
    Ran,
    /// Recorded complete with unchanged inputs.
    UpToDate,
    /// No command configured.
    NotConfigured,
}

/// A configured pipeline for one city.
pub struct Pipeline<'a> {
    config: &'a Config,
    config_path: PathBuf,
    paths: DataPaths,
    force: bool,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(config: &'a Config, config_path: &Path, force: bool) -> Self {
        Self {
            config,
            config_path: config_path.to_path_buf(),
            paths: config.data_paths(),
            force,
        }
    }

    /// Resolved file locations for this run.
    #[must_use]
    pub const fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Runs `stages` in pipeline order.
    ///
    /// # Errors
    ///
    /// Returns the first error from hashing inputs, running a command, or
    /// saving the state record. Stages after a failure do not run.
    pub fn run(
        &self,
        stages: &[Stage],
        multi: &MultiProgress,
    ) -> Result<Vec<(Stage, StageOutcome)>, PipelineError> {
        let pipeline_start = Instant::now();
        let selected: Vec<Stage> = Stage::ALL
            .iter()
            .copied()
            .filter(|stage| stages.contains(stage))
            .collect();

        log::info!(
            "Starting pipeline for {} ({} stages)...",
            self.config.name,
            selected.len()
        );

        let state_path = &self.paths.pipeline_state;
        let mut state = PipelineState::load(state_path);
        let progress = StageProgress::new(multi, selected.len() as u64);
        let mut outcomes = Vec::with_capacity(selected.len());

        for stage in selected {
            let prefix = progress.start(stage.as_ref());
            let outcome = match self.run_stage(stage, &mut state, &prefix) {
                Ok(outcome) => outcome,
                Err(e) => {
                    progress.abandon();
                    return Err(e);
                }
            };
            if outcome == StageOutcome::Ran {
                state.save(state_path)?;
            }
            outcomes.push((stage, outcome));
            progress.advance();
        }

        let elapsed = pipeline_start.elapsed();
        progress.finish(format!("Pipeline complete in {:.1}s", elapsed.as_secs_f64()));
        log::info!("Pipeline complete in {:.1}s", elapsed.as_secs_f64());

        Ok(outcomes)
    }

    fn run_stage(
        &self,
        stage: Stage,
        state: &mut PipelineState,
        prefix: &str,
    ) -> Result<StageOutcome, PipelineError> {
        let commands = self.commands(stage);
        if commands.is_empty() {
            log::info!("{prefix} No command configured for {stage}; skipping");
            return Ok(StageOutcome::NotConfigured);
        }

        let inputs = stage.inputs(self.config, &self.config_path, &self.paths);
        let input_refs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
        let outputs = stage.outputs(self.config, &self.paths);
        let output_refs: Vec<&Path> = outputs.iter().map(PathBuf::as_path).collect();

        let current = fingerprint(&input_refs)?;
        if !state.needs_run(stage, &current, &output_refs, self.force) {
            log::info!("{prefix} {stage} is up to date; skipping");
            return Ok(StageOutcome::UpToDate);
        }

        log::info!("{prefix} Running {stage}...");
        for command in &commands {
            run_command(command)?;
        }

        state.record(stage, current);
        Ok(StageOutcome::Ran)
    }

    /// Full command lines for a stage, with stage arguments appended.
    /// Commands configured as empty lists are left out.
    #[must_use]
    pub fn commands(&self, stage: Stage) -> Vec<Vec<String>> {
        let commands = &self.config.commands;
        let config_file = self.config_path.display().to_string();
        let data_dir = self.paths.data_dir.display().to_string();
        let standard = [
            "-c".to_string(),
            config_file,
            "-d".to_string(),
            data_dir.clone(),
        ];

        let mut lines = Vec::new();
        match stage {
            Stage::Transformation => {
                let transform = [
                    "-d".to_string(),
                    self.config.name.clone(),
                    "-f".to_string(),
                    data_dir,
                ];
                lines.push(with_args(&commands.transform_crashes, &transform));
                if self.config.has_concerns() {
                    lines.push(with_args(&commands.transform_concerns, &transform));
                } else {
                    log::info!(
                        "No concern files configured for {}; skipping concern transformation",
                        self.config.name
                    );
                }
            }
            Stage::Generation => {
                lines.push(with_args(&commands.join, &standard));

                let mut generate = standard.to_vec();
                if let Some(start) = self.config.start_year {
                    generate.extend(["-s".to_string(), start.to_string()]);
                }
                if let Some(end) = self.config.end_year {
                    generate.extend(["-e".to_string(), end.to_string()]);
                }
                lines.push(with_args(&commands.generate, &generate));
            }
            Stage::Model => lines.push(with_args(&commands.model, &standard)),
            Stage::Visualization => lines.push(with_args(&commands.visualization, &standard)),
        }

        lines.retain(|line| !line.is_empty());
        for line in &mut lines {
            if line[0] == CANON_PROGRAM {
                line[0] = resolve_canon_program();
            }
        }
        lines
    }
}

/// Appends stage arguments to a configured base command. An empty base
/// stays empty.
fn with_args(base: &[String], args: &[String]) -> Vec<String> {
    if base.is_empty() {
        return Vec::new();
    }
    base.iter().chain(args).cloned().collect()
}

/// Prefers a `vz_canon` built next to this binary over one on `PATH`.
fn resolve_canon_program() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| {
            let name = format!("{CANON_PROGRAM}{}", std::env::consts::EXE_SUFFIX);
            let sibling = exe.with_file_name(name);
            sibling.is_file().then(|| sibling.display().to_string())
        })
        .unwrap_or_else(|| CANON_PROGRAM.to_string())
}

/// Runs one command to completion.
///
/// # Errors
///
/// Returns [`PipelineError::Spawn`] if the program cannot be started and
/// [`PipelineError::CommandFailed`] if it exits unsuccessfully.
pub fn run_command(command: &[String]) -> Result<(), PipelineError> {
    let display = command.join(" ");
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };

    log::debug!("Running {display}");
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| PipelineError::Spawn {
            command: display.clone(),
            source,
        })?;

    if !status.success() {
        return Err(PipelineError::CommandFailed {
            command: display,
            status: status.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use vz_cli_utils::ProgressDrawTarget;

    use super::*;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn config(dir: &Path, extra: &str) -> Config {
        let mut config = Config::parse(&format!(
            "name = \"testville\"\nstart_year = 2015\nend_year = 2018\n{extra}"
        ))
        .unwrap();
        config.base_dir = dir.to_path_buf();
        config
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vz_cli_pipeline_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn builds_stage_command_lines() {
        let dir = temp_dir("commands");
        let config = config(&dir, "");
        let pipeline = Pipeline::new(&config, Path::new("testville.toml"), false);
        let data_dir = pipeline.paths().data_dir.display().to_string();

        let transform = pipeline.commands(Stage::Transformation);
        assert_eq!(transform.len(), 1);
        assert_eq!(
            transform[0][3..],
            ["-d".to_string(), "testville".to_string(), "-f".to_string(), data_dir.clone()]
        );

        let generation = pipeline.commands(Stage::Generation);
        assert_eq!(generation.len(), 2);
        assert!(generation[0][0].ends_with("vz_canon") || generation[0][0].ends_with("vz_canon.exe"));
        assert_eq!(generation[0][1], "join");
        assert_eq!(
            generation[1][2..],
            [
                "-c".to_string(),
                "testville.toml".to_string(),
                "-d".to_string(),
                data_dir,
                "-s".to_string(),
                "2015".to_string(),
                "-e".to_string(),
                "2018".to_string(),
            ]
        );

        assert!(pipeline.commands(Stage::Visualization).is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn concern_transformation_runs_only_when_configured() {
        let dir = temp_dir("concerns");
        let config = config(&dir, "concern_files = [\"concerns.csv\"]");
        let pipeline = Pipeline::new(&config, Path::new("testville.toml"), false);
        assert_eq!(pipeline.commands(Stage::Transformation).len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn completed_stages_are_skipped_until_inputs_change() {
        let dir = temp_dir("skip");
        let config_path = dir.join("testville.toml");
        std::fs::write(&config_path, "name = \"testville\"").unwrap();
        let config = config(&dir, "[commands]\nmodel = [\"true\"]");
        let multi = hidden();

        let pipeline = Pipeline::new(&config, &config_path, false);
        let outcomes = pipeline.run(&[Stage::Model, Stage::Visualization], &multi).unwrap();
        assert_eq!(
            outcomes,
            vec![
                (Stage::Model, StageOutcome::Ran),
                (Stage::Visualization, StageOutcome::NotConfigured),
            ]
        );
        assert!(pipeline.paths().pipeline_state.exists());

        let outcomes = pipeline.run(&[Stage::Model], &multi).unwrap();
        assert_eq!(outcomes, vec![(Stage::Model, StageOutcome::UpToDate)]);

        std::fs::write(&config_path, "name = \"testville\"\nstart_year = 2016").unwrap();
        let outcomes = pipeline.run(&[Stage::Model], &multi).unwrap();
        assert_eq!(outcomes, vec![(Stage::Model, StageOutcome::Ran)]);

        let forced = Pipeline::new(&config, &config_path, true);
        let outcomes = forced.run(&[Stage::Model], &multi).unwrap();
        assert_eq!(outcomes, vec![(Stage::Model, StageOutcome::Ran)]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_aborts_the_run() {
        let dir = temp_dir("failure");
        let config = config(&dir, "[commands]\nmodel = [\"false\"]\nvisualization = [\"true\"]");
        let pipeline = Pipeline::new(&config, &dir.join("testville.toml"), false);

        let err = pipeline
            .run(&[Stage::Model, Stage::Visualization], &hidden())
            .unwrap_err();
        assert!(matches!(err, PipelineError::CommandFailed { ref command, .. } if command.starts_with("false")));
        assert!(!pipeline.paths().pipeline_state.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_command(&["vz-no-such-program-here".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::Spawn { .. }));
    }
}
