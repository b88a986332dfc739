use std::{
    io::Write as _,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use azure_graph_source::{
    azure::{self, ConnectionString},
    config::SourceOptions,
    host::local::{LocalFileNodes, MemorySink, NamespacedIds},
    ingest::Ingestor,
};
use clap::Parser;
use tracing::error;

#[derive(Parser)]
struct Opts {
    /// Source options (`tables`, `containers`, `containerLocalFolder`) as YAML or JSON.
    #[clap(short, long, env = "AZURE_GRAPH_SOURCE_OPTIONS")]
    options: PathBuf,
    #[clap(long, env = "AZURE_STORAGE_CONNECTION_STRING", hide_env_values = true)]
    connection_string: ConnectionString,
    /// Directory mirror folders are resolved against.
    #[clap(long)]
    cwd: Option<PathBuf>,
    #[clap(long, default_value = "azure-graph-source")]
    namespace: String,
}

fn parse_options(path: &Path, text: &str) -> anyhow::Result<SourceOptions> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(text).map_err(|e| anyhow!(e)),
        _ => serde_yaml::from_str(text).map_err(|e| anyhow!(e)),
    }
}

async fn run(opts: Opts) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(&opts.options)
        .await
        .with_context(|| format!("read options from {}", opts.options.display()))?;
    let options = parse_options(&opts.options, &text)
        .with_context(|| format!("parse options from {}", opts.options.display()))?;
    let cwd = match opts.cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().with_context(|| "resolve working directory")?,
    };

    let (tables, blobs) = azure::create_clients(&opts.connection_string);
    let ingestor = Ingestor {
        tables,
        blobs,
        sink: MemorySink::new(),
        ids: NamespacedIds::new(&opts.namespace),
        files: LocalFileNodes::new(&cwd),
        cwd,
    };
    let result = ingestor.source_nodes(options).await;

    let mut stdout = std::io::stdout().lock();
    for node in ingestor.sink.into_nodes() {
        serde_json::to_writer(&mut stdout, &node).with_context(|| "write node")?;
        writeln!(stdout).with_context(|| "write node")?;
    }
    result.with_context(|| "source pass")?;
    Ok(())
}

fn main() {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(?e, "failed to start runtime");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(opts)) {
        error!(?e, "critical error");
        std::process::exit(1);
    }
}
