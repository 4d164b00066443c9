pub mod args;
pub mod commands;

pub use args::{ExpandArgs, OutputArgs, RenderArgs, TaskArgs};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
NORMALIZATION COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "strata")]
#[command(version = crate::VERSION)]
#[command(about = "Hierarchical template normalization for workflow, agent and tool configs")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: normalize a task against recorded state, expand collections into children, then transform outputs."
)]
pub struct Args {
    /// Engine settings file (default: ./strata.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Normalize one task config",
        long_about = "Task merges workflow and task environment, evaluates every template in the task against the workflow, parent and sibling context, and prints the result as JSON.",
        after_help = "Example:\n    strata task --workflow wf.yaml --state state.json --task summarize --components"
    )]
    Task(TaskArgs),
    #[command(
        about = "Expand a collection task into children",
        long_about = "Expand resolves the items of a collection task, applies its filter, and prints one templated child config per surviving item.",
        after_help = "Example:\n    strata expand --workflow wf.yaml --task process_files"
    )]
    Expand(ExpandArgs),
    #[command(
        about = "Transform task or workflow outputs",
        long_about = "Output evaluates an outputs mapping against recorded runtime output. Without --task the workflow outputs are transformed.",
        after_help = "Example:\n    strata output --workflow wf.yaml --state state.json --task fetch"
    )]
    Output(OutputArgs),
    #[command(
        about = "Render a single template",
        long_about = "Render evaluates one template string against an optional context file and prints the result.",
        after_help = "Example:\n    strata render --context ctx.json \"hello {{ .input.name }}\""
    )]
    Render(RenderArgs),
}

pub fn run(args: Args) -> crate::Result<()> {
    let engine = commands::load_engine_config(args.config.as_deref())?;
    match args.command {
        Command::Task(task_args) => commands::task(task_args, &engine),
        Command::Expand(expand_args) => commands::expand(expand_args, &engine),
        Command::Output(output_args) => commands::output(output_args, &engine),
        Command::Render(render_args) => commands::render(render_args, &engine),
    }
}
