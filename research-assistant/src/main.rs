use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use research_assistant::assistant::configuration::ResearchSettings;
use research_assistant::report::{combine_topic, HtmlSink};
use research_assistant::server::run_server;
use research_assistant::{init, Configuration, ReportInput, ReportPipeline};

#[derive(Parser)]
#[command(name = "research-assistant")]
#[command(about = "Research reports with diagrams and equations from a three-stage LLM pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the browser UI
    Serve {
        /// Address to listen on, overrides BIND_ADDR
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Run one research pipeline and write the report to disk
    Research {
        /// Topic to research; read from stdin when omitted
        #[arg(short, long)]
        topic: Option<String>,
        /// Additional context or aspects to focus on
        #[arg(short, long, default_value = "")]
        context: String,
        /// Directory the dated report is written to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Research depth from 1 to 5
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=5))]
        depth: u8,
        #[arg(long)]
        no_visualizations: bool,
        #[arg(long)]
        no_citations: bool,
        /// Also write a rendered HTML page next to the markdown
        #[arg(long)]
        html: bool,
    },
    /// Show the text, diagram and equation segments of a markdown file
    Segments {
        file: PathBuf,
        /// Print a rendered HTML page instead of the segment list
        #[arg(long)]
        html: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = Configuration::from_env()?;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            run_server(config).await
        }
        Commands::Research {
            topic,
            context,
            output,
            depth,
            no_visualizations,
            no_citations,
            html,
        } => {
            let topic = match topic {
                Some(topic) => topic,
                None => prompt_topic()?,
            };
            let settings = ResearchSettings {
                depth,
                include_visualizations: !no_visualizations,
                include_citations: !no_citations,
            };
            research(&topic, &context, output, settings, html).await
        }
        Commands::Segments { file, html } => segments(file, html).await,
    }
}

fn prompt_topic() -> Result<String> {
    print!("Enter research topic: ");
    io::stdout().flush()?;
    let mut topic = String::new();
    io::stdin().lock().read_line(&mut topic)?;
    Ok(topic.trim().to_string())
}

async fn research(
    topic: &str,
    context: &str,
    output: PathBuf,
    settings: ResearchSettings,
    html: bool,
) -> Result<()> {
    let config = Configuration::from_env()?;
    let missing = config.missing_inputs(topic);
    if !missing.is_empty() {
        bail!("missing required input: {}", missing.join(", "));
    }

    let (tx, rx) = broadcast::channel(16);
    let mut pipeline = ReportPipeline::new(&config);
    pipeline.set_status_sender(tx);
    let progress = tokio::spawn(async move {
        let mut updates = BroadcastStream::new(rx);
        while let Some(Ok(update)) = updates.next().await {
            println!("[{:?}] {}", update.phase, update.message);
        }
    });

    let input = ReportInput::new(combine_topic(topic, context)).with_settings(settings);
    let result = pipeline.run(input).await;
    drop(pipeline);
    if let Err(e) = progress.await {
        warn!(error = %e, "progress reporter stopped");
    }
    let report = result.context("An error occurred during the research process")?;

    tokio::fs::create_dir_all(&output)
        .await
        .with_context(|| format!("failed to create {}", output.display()))?;
    let path = report.save(&output).await?;
    info!(path = %path.display(), "report written");

    if html {
        let sink = HtmlSink::from_markdown(report.as_str());
        let html_path = path.with_extension("html");
        tokio::fs::write(&html_path, sink.to_document(topic)).await?;
        info!(path = %html_path.display(), "rendered report written");
    }
    println!("Research complete! Report saved to {}", path.display());
    Ok(())
}

async fn segments(file: PathBuf, html: bool) -> Result<()> {
    let markdown = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    if html {
        let sink = HtmlSink::from_markdown(&markdown);
        println!("{}", sink.to_document(&file.display().to_string()));
        return Ok(());
    }

    for (idx, segment) in research_assistant::report::extract_segments(&markdown)
        .iter()
        .enumerate()
    {
        println!("--- {idx} {:?} ({} bytes)", segment.kind(), segment.source().len());
        println!("{}", segment.body());
    }
    Ok(())
}
