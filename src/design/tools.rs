//! The two callable design actions.
//!
//! Both actions follow the same sequence: turn the caller's input into a
//! FASTA file, snapshot the working root, run the external tool, snapshot
//! again and report what appeared. The single-design action additionally
//! resolves which directory holds its results.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{DesignError, DesignResult};
use super::fasta;
use super::outputs::OutputTracker;
use super::runner::{CommandExecutor, CommandOutput, SystemExecutor};
use super::staging::{InputStaging, StagedInput, StagingPolicy, FASTA_SUFFIX};
use super::workspace::Workspace;

/// Default marker a tool prints before the path of its output directory.
pub const DEFAULT_OUTPUT_MARKER: &str = "OUTPUT_FOLDER=";

/// How the single-design action finds its output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDetection {
    /// Use the last stdout line starting with `marker`, falling back to the
    /// newest directory named after the request when no such line exists.
    Reported {
        /// Line prefix preceding the reported path.
        marker: String,
    },
    /// Only use the newest directory named after the request.
    DirectoryDiff,
}

impl Default for OutputDetection {
    fn default() -> Self {
        Self::Reported {
            marker: DEFAULT_OUTPUT_MARKER.to_string(),
        }
    }
}

/// How the external tools are launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    /// Interpreter that runs the tool scripts.
    pub interpreter: String,
    /// Script for single-configuration designs.
    pub single_design_script: String,
    /// Script for batch designs.
    pub multi_design_script: String,
    /// Output directory resolution strategy.
    pub detection: OutputDetection,
    /// Lifecycle of staged input files.
    pub staging: StagingPolicy,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            single_design_script: "base_editing_guide_designs.py".to_string(),
            multi_design_script: "multiple_designs.py".to_string(),
            detection: OutputDetection::default(),
            staging: StagingPolicy::default(),
        }
    }
}

// ==================== Requests ====================

/// Arguments for a single-configuration guide design.
///
/// Exactly one of `input_text` and `input_file` must be given. When
/// `be_type` names an editor, the explicit PAM/window/length/edit parameters
/// are not passed to the tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesignRequest {
    /// Sequence or FASTA text to design against.
    #[serde(default)]
    pub input_text: Option<String>,
    /// Existing input file, passed to the tool unchanged.
    #[serde(default)]
    pub input_file: Option<String>,
    /// Input format understood by the tool.
    #[serde(default = "default_input_type")]
    pub input_type: String,
    /// Name the tool uses as the prefix of its output directory.
    pub output_name: String,
    /// Variant annotation file.
    #[serde(default = "default_variant_file")]
    pub variant_file: String,
    /// Named base editor shorthand.
    #[serde(default)]
    pub be_type: Option<String>,
    /// PAM pattern.
    #[serde(default = "default_pam")]
    pub pam: String,
    /// Editing window, e.g. `4-8`.
    #[serde(default = "default_edit_window")]
    pub edit_window: String,
    /// Protospacer length.
    #[serde(default = "default_sg_len")]
    pub sg_len: u32,
    /// Edit mode.
    #[serde(default = "default_edit")]
    pub edit: String,
    /// Bases of intron kept around each exon.
    #[serde(default = "default_intron_buffer")]
    pub intron_buffer: u32,
    /// Drop guides with extreme GC content.
    #[serde(default)]
    pub filter_gc: bool,
}

impl DesignRequest {
    /// A request for `input_text` with every other option at its default.
    #[must_use]
    pub fn from_text(input_text: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self {
            input_text: Some(input_text.into()),
            input_file: None,
            input_type: default_input_type(),
            output_name: output_name.into(),
            variant_file: default_variant_file(),
            be_type: None,
            pam: default_pam(),
            edit_window: default_edit_window(),
            sg_len: default_sg_len(),
            edit: default_edit(),
            intron_buffer: default_intron_buffer(),
            filter_gc: false,
        }
    }

    /// The editor configuration this request selects.
    #[must_use]
    pub fn editor(&self) -> EditorSpec<'_> {
        match self.be_type.as_deref().filter(|t| !t.is_empty()) {
            Some(name) => EditorSpec::Named(name),
            None => EditorSpec::Explicit {
                pam: &self.pam,
                edit_window: &self.edit_window,
                guide_length: self.sg_len,
                edit: &self.edit,
            },
        }
    }
}

/// Editor selection for a single design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorSpec<'a> {
    /// A base editor known to the tool by name.
    Named(&'a str),
    /// Fully specified editor parameters.
    Explicit {
        /// PAM pattern.
        pam: &'a str,
        /// Editing window.
        edit_window: &'a str,
        /// Protospacer length.
        guide_length: u32,
        /// Edit mode.
        edit: &'a str,
    },
}

impl EditorSpec<'_> {
    fn push_args(&self, argv: &mut Vec<String>) {
        match *self {
            Self::Named(name) => push_pairs(argv, &[("--be-type", name)]),
            Self::Explicit {
                pam,
                edit_window,
                guide_length,
                edit,
            } => {
                let guide_length = guide_length.to_string();
                push_pairs(
                    argv,
                    &[
                        ("--pam", pam),
                        ("--edit-window", edit_window),
                        ("--sg-len", guide_length.as_str()),
                        ("--edit", edit),
                    ],
                );
            }
        }
    }
}

/// Arguments for a batch design over several editor configurations.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchDesignRequest {
    /// Sequence or FASTA text to design against.
    #[serde(default)]
    pub input_text: Option<String>,
    /// Existing input file, passed to the tool unchanged.
    #[serde(default)]
    pub input_file: Option<String>,
    /// Input format understood by the tool.
    #[serde(default = "default_input_type")]
    pub input_type: String,
    /// Batch configuration file listing editors or parameter rows.
    pub be_file: String,
    /// Editor type selector within the batch file.
    pub be_type: String,
    /// Prefix for every output directory of the batch.
    pub output_prefix: String,
}

fn default_input_type() -> String {
    "fasta".to_string()
}

fn default_variant_file() -> String {
    "variant_summary.txt".to_string()
}

fn default_pam() -> String {
    "NGG".to_string()
}

fn default_edit_window() -> String {
    "4-8".to_string()
}

const fn default_sg_len() -> u32 {
    20
}

fn default_edit() -> String {
    "all".to_string()
}

const fn default_intron_buffer() -> u32 {
    30
}

// ==================== Responses ====================

/// Result of a single design run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesignOutcome {
    /// Whether the tool exited with code zero.
    pub ok: bool,
    /// Directory holding this run's results, if one could be identified.
    pub output_folder: Option<String>,
    /// Every directory that appeared in the working root during the run.
    pub new_output_dirs: Vec<String>,
    /// Tool stdout.
    pub stdout: String,
    /// Tool stderr.
    pub stderr: String,
    /// Tool exit code.
    pub returncode: i32,
}

/// Result of a batch design run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Whether the tool exited with code zero.
    pub ok: bool,
    /// Every directory that appeared in the working root during the run.
    pub new_output_dirs: Vec<String>,
    /// Tool stdout.
    pub stdout: String,
    /// Tool stderr.
    pub stderr: String,
    /// Tool exit code.
    pub returncode: i32,
}

// ==================== Actions ====================

/// Input handed to a tool: either staged by us or supplied by the caller.
enum ToolInput {
    Staged(StagedInput),
    Existing(String),
}

/// Runs the external design tools against a workspace.
pub struct DesignTools {
    workspace: Workspace,
    settings: ToolSettings,
    staging: InputStaging,
    tracker: OutputTracker,
    executor: Box<dyn CommandExecutor>,
}

impl std::fmt::Debug for DesignTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesignTools")
            .field("workspace", &self.workspace)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DesignTools {
    /// Creates design tools that launch real processes.
    #[must_use]
    pub fn new(workspace: Workspace, settings: ToolSettings) -> Self {
        Self::with_executor(workspace, settings, SystemExecutor)
    }

    /// Creates design tools with a custom command executor.
    #[must_use]
    pub fn with_executor(
        workspace: Workspace,
        settings: ToolSettings,
        executor: impl CommandExecutor + 'static,
    ) -> Self {
        Self {
            staging: InputStaging::new(&workspace, settings.staging),
            tracker: OutputTracker::new(&workspace),
            workspace,
            settings,
            executor: Box::new(executor),
        }
    }

    /// The workspace the tools run in.
    #[must_use]
    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Runs a single-configuration design.
    ///
    /// A non-zero exit from the tool is reported through
    /// [`DesignOutcome::ok`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or missing, the input cannot be
    /// staged, the working root cannot be listed, or the tool cannot start.
    pub fn design_guides(&self, request: &DesignRequest) -> DesignResult<DesignOutcome> {
        require_non_empty("output_name", &request.output_name)?;
        let input = self.prepare_input(request.input_text.as_deref(), request.input_file.as_deref())?;

        let argv = self.single_design_argv(&self.input_arg(&input), request);
        let (output, new_output_dirs) = self.run_tracked(&argv)?;
        let output_folder = self
            .resolve_output_folder(&output, &request.output_name)?
            .map(|p| p.to_string_lossy().into_owned());

        Ok(DesignOutcome {
            ok: output.success(),
            output_folder,
            new_output_dirs,
            stdout: output.stdout,
            stderr: output.stderr,
            returncode: output.returncode,
        })
    }

    /// Runs a batch design and reports every directory it created.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::design_guides`].
    pub fn design_guides_multiple(
        &self,
        request: &BatchDesignRequest,
    ) -> DesignResult<BatchOutcome> {
        require_non_empty("output_prefix", &request.output_prefix)?;
        let input = self.prepare_input(request.input_text.as_deref(), request.input_file.as_deref())?;

        let argv = self.multi_design_argv(&self.input_arg(&input), request);
        let (output, new_output_dirs) = self.run_tracked(&argv)?;

        Ok(BatchOutcome {
            ok: output.success(),
            new_output_dirs,
            stdout: output.stdout,
            stderr: output.stderr,
            returncode: output.returncode,
        })
    }

    /// Builds the argument vector for the single-design tool.
    #[must_use]
    pub fn single_design_argv(&self, input_file: &str, request: &DesignRequest) -> Vec<String> {
        let mut argv = vec![
            self.settings.interpreter.clone(),
            self.settings.single_design_script.clone(),
        ];
        let intron_buffer = request.intron_buffer.to_string();
        push_pairs(
            &mut argv,
            &[
                ("--input-file", input_file),
                ("--input-type", request.input_type.as_str()),
                ("--variant-file", request.variant_file.as_str()),
                ("--output-name", request.output_name.as_str()),
                ("--intron-buffer", intron_buffer.as_str()),
                ("--filter-gc", python_bool(request.filter_gc)),
            ],
        );
        request.editor().push_args(&mut argv);
        argv
    }

    /// Builds the argument vector for the batch tool.
    #[must_use]
    pub fn multi_design_argv(&self, input_file: &str, request: &BatchDesignRequest) -> Vec<String> {
        let mut argv = vec![
            self.settings.interpreter.clone(),
            self.settings.multi_design_script.clone(),
        ];
        push_pairs(
            &mut argv,
            &[
                ("--input-file", input_file),
                ("--ip-type", request.input_type.as_str()),
                ("--be-file", request.be_file.as_str()),
                ("--be-type", request.be_type.as_str()),
                ("--output-prefix", request.output_prefix.as_str()),
            ],
        );
        argv
    }

    fn prepare_input(&self, text: Option<&str>, file: Option<&str>) -> DesignResult<ToolInput> {
        match (text, file) {
            (Some(text), None) => {
                let fasta = fasta::normalize(text)?;
                Ok(ToolInput::Staged(self.staging.stage(&fasta, FASTA_SUFFIX)?))
            }
            (None, Some(file)) => {
                require_non_empty("input_file", file)?;
                Ok(ToolInput::Existing(file.to_string()))
            }
            (Some(_), Some(_)) => Err(DesignError::invalid_arguments(
                "provide only one of input_text or input_file",
            )),
            (None, None) => Err(DesignError::invalid_arguments(
                "one of input_text or input_file is required",
            )),
        }
    }

    /// Staged files are passed relative to the working root, which is the
    /// tool's current directory.
    fn input_arg(&self, input: &ToolInput) -> String {
        match input {
            ToolInput::Staged(staged) => staged
                .path()
                .strip_prefix(self.workspace.root())
                .unwrap_or_else(|_| staged.path())
                .to_string_lossy()
                .into_owned(),
            ToolInput::Existing(file) => file.clone(),
        }
    }

    fn run_tracked(&self, argv: &[String]) -> DesignResult<(CommandOutput, Vec<String>)> {
        let root = self.workspace.root();
        let before = self.tracker.snapshot()?;

        tracing::info!(argv = ?argv, cwd = %root.display(), "Running design tool");
        let output = self.executor.execute(argv, root)?;

        let after = self.tracker.snapshot()?;
        let new_dirs = OutputTracker::diff(&before, &after);
        tracing::debug!(new_dirs = ?new_dirs, "Working root changes");

        if output.success() {
            tracing::info!(new_dirs = new_dirs.len(), "Design tool finished");
        } else {
            tracing::warn!(
                returncode = output.returncode,
                stderr_bytes = output.stderr.len(),
                "Design tool exited with non-zero status"
            );
        }

        Ok((output, new_dirs))
    }

    fn resolve_output_folder(
        &self,
        output: &CommandOutput,
        output_name: &str,
    ) -> DesignResult<Option<PathBuf>> {
        if let OutputDetection::Reported { marker } = &self.settings.detection {
            if let Some(reported) = reported_output(&output.stdout, marker) {
                let path = self.workspace.resolve(reported);
                if self.workspace.is_output_dir(&path) {
                    return Ok(Some(path));
                }
                tracing::warn!(
                    reported = %path.display(),
                    "Reported output folder is not a directory under the working root, falling back to directory scan"
                );
            }
        }
        self.tracker.latest(output_name)
    }
}

/// Finds the path on the last stdout line that starts with `marker`.
#[must_use]
pub fn reported_output<'a>(stdout: &'a str, marker: &str) -> Option<&'a Path> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(marker))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(Path::new)
}

fn push_pairs(argv: &mut Vec<String>, pairs: &[(&str, &str)]) {
    for (flag, value) in pairs {
        argv.push((*flag).to_string());
        argv.push((*value).to_string());
    }
}

/// The tools parse booleans with Python's spelling.
const fn python_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn require_non_empty(field: &str, value: &str) -> DesignResult<()> {
    if value.trim().is_empty() {
        return Err(DesignError::invalid_arguments(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}
