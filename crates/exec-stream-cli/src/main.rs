//! Run a command in a Docker container through the exec-stream coordinator
//!
//! Without `--live` the aggregated result is printed as JSON. With `--live`
//! output is forwarded to the terminal as it arrives. Either way the process
//! exits with the exec's exit code once the runtime committed one.

use anyhow::{Context, Result};
use clap::Parser;
use exec_stream::{
    Container, DockerRuntime, ExecConfig, ExecCoordinator, ExecRequest, ExitStatus, LiveSinks,
    RetryPolicy, StdinSource,
};
use futures::future;
use futures::io::AllowStdIo;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "exec-stream")]
#[command(about = "Run a command inside a running container")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Feed this text to stdin
    #[arg(long, value_name = "TEXT", conflicts_with = "stdin_file")]
    stdin: Option<String>,

    /// Feed the contents of a file to stdin
    #[arg(long, value_name = "PATH")]
    stdin_file: Option<PathBuf>,

    /// Capture stdout
    #[arg(long)]
    stdout: bool,

    /// Capture stderr
    #[arg(long)]
    stderr: bool,

    /// Stream output to the terminal instead of collecting it
    #[arg(long)]
    live: bool,

    /// Environment variable for the command
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    env: Vec<(String, String)>,

    /// Working directory inside the container
    #[arg(short = 'w', long, value_name = "DIR")]
    workdir: Option<String>,

    /// Extra exit status polls after the stream closed
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Delay between exit status polls
    #[arg(long, value_name = "MS")]
    retry_delay_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Container id or name
    container: String,

    /// Command to run
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

impl Cli {
    fn retry_policy(&self) -> Result<RetryPolicy> {
        let mut policy = match &self.config {
            Some(path) => ExecConfig::from_file(path)?.retry,
            None => RetryPolicy::default(),
        };
        if let Some(max_retries) = self.max_retries {
            policy.max_retries = max_retries;
        }
        if let Some(delay_ms) = self.retry_delay_ms {
            policy.delay_ms = delay_ms;
        }
        Ok(policy)
    }

    fn request(&self) -> Result<ExecRequest> {
        let mut builder = ExecRequest::builder(self.command.iter().cloned())
            .stdout(self.stdout)
            .stderr(self.stderr)
            .live(self.live);
        if let Some(text) = &self.stdin {
            builder = builder.stdin(text.as_str());
        } else if let Some(path) = &self.stdin_file {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open stdin file {}", path.display()))?;
            builder = builder.stdin(StdinSource::reader(AllowStdIo::new(file)));
        }
        for (key, value) in &self.env {
            builder = builder.env(key, value);
        }
        if let Some(dir) = &self.workdir {
            builder = builder.working_dir(dir.clone());
        }
        Ok(builder.build()?)
    }
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn exit_code(status: &ExitStatus) -> i32 {
    match status.exit_code {
        Some(code) => i32::try_from(code).unwrap_or(1),
        None => 1,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for the result
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.as_str())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let policy = cli.retry_policy()?;
    let request = cli.request()?;
    let runtime = DockerRuntime::connect_local().context("Failed to connect to Docker")?;
    let container = ExecCoordinator::new(Arc::new(runtime))
        .with_retry_policy(policy)
        .container(cli.container.clone());
    debug!("running {:?} in {}", cli.command, container.id());

    let code = if cli.live {
        run_live(&container, request, &cli).await?
    } else {
        let result = container
            .exec(request)
            .await?
            .into_result()
            .context("Expected a completed exec")?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        exit_code(&result.status)
    };

    std::process::exit(code);
}

async fn run_live(
    container: &Container<DockerRuntime>,
    mut request: ExecRequest,
    cli: &Cli,
) -> Result<i32> {
    // Live streams are driven here, including stdin
    let source = request.take_stdin_source();
    let handle = container
        .exec(request)
        .await?
        .into_live()
        .context("Expected a live exec")?;

    let mut sinks = LiveSinks::new();
    if cli.stdout {
        sinks = sinks.stdout(AllowStdIo::new(std::io::stdout()));
    }
    if cli.stderr {
        sinks = sinks.stderr(AllowStdIo::new(std::io::stderr()));
    }
    let mut stream = handle.attach(sinks);

    let stdin = stream.take_stdin();
    let feed = async move {
        match (stdin, source) {
            (Some(mut stdin), Some(source)) => stdin.feed(source).await.map(|_| ()),
            (Some(mut stdin), None) => stdin.close().await,
            (None, _) => Ok(()),
        }
    };
    let (fed, closed) = future::join(feed, stream.closed()).await;
    fed.context("Failed to write stdin")?;
    closed?;

    let status = stream.finish().await?;
    info!("exec finished with exit code {:?}", status.exit_code);
    eprintln!("{}", serde_json::to_string(&status)?);
    Ok(exit_code(&status))
}
