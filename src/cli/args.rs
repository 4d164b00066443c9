use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct TaskArgs {
    /// Workflow definition (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub workflow: PathBuf,

    /// Recorded workflow state to resolve `.tasks` and `.workflow` against
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Id of the task to normalize
    #[arg(long, value_name = "ID")]
    pub task: String,

    /// Also normalize the task's agent, tool and transitions
    #[arg(long, help_heading = "Components")]
    pub components: bool,
}

#[derive(Args)]
pub struct ExpandArgs {
    /// Workflow definition (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub workflow: PathBuf,

    /// Recorded workflow state to resolve `.tasks` and `.workflow` against
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Id of the collection task to expand
    #[arg(long, value_name = "ID")]
    pub task: String,
}

#[derive(Args)]
pub struct OutputArgs {
    /// Workflow definition (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub workflow: PathBuf,

    /// Recorded workflow state holding task outputs
    #[arg(long, value_name = "FILE")]
    pub state: PathBuf,

    /// Transform this task's output instead of the workflow's
    #[arg(long, value_name = "ID")]
    pub task: Option<String>,
}

#[derive(Args)]
pub struct RenderArgs {
    /// JSON or YAML map exposed to the template as its context
    #[arg(long, value_name = "FILE")]
    pub context: Option<PathBuf>,

    /// Template text, e.g. "hello {{ .input.name }}"
    #[arg(value_name = "TEMPLATE")]
    pub template: String,
}
