use anyhow::{Context, Result};
use clap::Args;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::Config;
use crate::sandbox::{
    ExecOptions, ExecutorConfig, IsolationPolicy, SandboxExecutor, detect,
};

#[derive(Args)]
pub struct ExecArgs {
    /// Command and arguments to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Timeout in milliseconds (default from config)
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// Allow outbound network access for this run
    #[arg(long)]
    pub allow_network: bool,

    /// Working directory override
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// KEY=VALUE environment entries for the command
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Print the structured result as JSON instead of raw output
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ExecArgs, config: &Config) -> Result<()> {
    let detection = detect();
    let backend = config.sandbox.backend.resolve(&detection);

    let mut policy = IsolationPolicy::from_config(&config.sandbox);
    if args.allow_network {
        policy.allow_network = true;
    }

    let working_dir = args
        .workdir
        .clone()
        .unwrap_or_else(|| config.workspace_path());

    let executor = SandboxExecutor::new(ExecutorConfig {
        working_dir,
        backend,
        policy,
        env: config.sandbox.env.clone(),
        default_timeout_ms: config.sandbox.timeout_ms,
        max_output_bytes: config.sandbox.max_output_bytes,
    })?;
    executor.start().await?;

    let (command, rest) = args
        .command
        .split_first()
        .context("missing command")?;

    let mut env = HashMap::new();
    for pair in &args.env {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid env entry '{pair}', expected KEY=VALUE"))?;
        env.insert(key.to_string(), value.to_string());
    }

    let options = if args.json {
        ExecOptions {
            timeout_ms: args.timeout_ms,
            env,
            ..Default::default()
        }
    } else {
        ExecOptions {
            timeout_ms: args.timeout_ms,
            env,
            on_stdout: Some(Box::new(|chunk| print!("{chunk}"))),
            on_stderr: Some(Box::new(|chunk| eprint!("{chunk}"))),
            ..Default::default()
        }
    };

    let outcome = executor.execute_command(command, rest, options).await;
    executor.destroy().await?;
    let result = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.timed_out {
        eprintln!(
            "workcell: command timed out after {}ms",
            args.timeout_ms.unwrap_or(config.sandbox.timeout_ms)
        );
    }

    if !result.success {
        std::process::exit(result.exit_code.clamp(1, 255));
    }
    Ok(())
}
