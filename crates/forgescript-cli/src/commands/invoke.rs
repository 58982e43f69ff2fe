//! Invoke command implementation.

use crate::cli::InvokeArgs;
use crate::output::OutputFormatter;
use anyhow::Result;

#[cfg(feature = "python")]
pub fn execute(args: &InvokeArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    use super::with_python;
    use crate::error::add_script_context;
    use anyhow::Context;
    use forgescript_core::AliasTask;

    let task = match &args.task {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read task '{}'", path.display()))?;
            AliasTask::from_json(&json)
                .with_context(|| format!("invalid task JSON in '{}'", path.display()))?
        }
        None => AliasTask::default(),
    };

    let command = with_python(args.timeout, |executor| {
        add_script_context(
            executor.run_alias_task(&args.script, args.task_id, &args.alias, &task),
            &args.script,
        )
    })?;

    formatter.format_command(&command)
}

#[cfg(not(feature = "python"))]
pub fn execute(_args: &InvokeArgs, _formatter: &dyn OutputFormatter) -> Result<()> {
    anyhow::bail!(super::NO_PYTHON)
}
