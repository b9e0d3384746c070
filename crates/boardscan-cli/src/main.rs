//! BoardScan CLI
//!
//! Classifies PCB images into one of six defect classes with a model loaded
//! from a layers-model artifact (HTTP or local).

use anyhow::{Context, Result};
use boardscan_classifiers::{
    BatchItem, DefectClassifier, DefectInspector, InspectorConfig, ResizeFilter, SourceSpec,
};
use boardscan_core::MetricsSnapshot;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "boardscan")]
#[command(about = "PCB defect classification", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "boardscan.yaml", global = true)]
    config: PathBuf,

    /// Base URL serving the model (manifest path from config)
    #[arg(long, env = "BOARDSCAN_MODEL_URL", global = true, conflicts_with = "model_path")]
    model_url: Option<String>,

    /// Local path of model.json
    #[arg(long, env = "BOARDSCAN_MODEL_PATH", global = true)]
    model_path: Option<PathBuf>,

    /// Resize filter (nearest, triangle, catmull-rom, gaussian, lanczos3)
    #[arg(long, global = true)]
    filter: Option<ResizeFilter>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one or more board images
    Inspect {
        /// Image files, processed in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print one JSON object per file
        #[arg(long)]
        json: bool,

        /// Print run statistics when done
        #[arg(long)]
        stats: bool,
    },

    /// Load the model and print its shapes and layers
    ModelInfo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = load_config(&cli)?;
    let inspector = DefectInspector::from_config(&config).context("Failed to set up inspector")?;
    if let Some(location) = inspector.loader().location() {
        info!("Model: {}", location);
    }

    match cli.command {
        Command::Inspect { files, json, stats } => inspect(&inspector, &files, json, stats).await,
        Command::ModelInfo => model_info(&inspector).await,
    }
}

/// Load configuration from file and CLI overrides
fn load_config(cli: &Cli) -> Result<InspectorConfig> {
    let mut config = InspectorConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if let Some(url) = &cli.model_url {
        config.model.source = config.model.source.with_base_url(url.as_str());
    }

    if let Some(path) = &cli.model_path {
        config.model.source = SourceSpec::Local { path: path.clone() };
    }

    if let Some(filter) = cli.filter {
        config.preprocess.filter = filter;
    }

    Ok(config)
}

#[derive(Serialize)]
struct JsonLine<'a> {
    file: &'a str,
    #[serde(flatten)]
    result: JsonResult<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum JsonResult<'a> {
    Ok(&'a boardscan_core::Prediction),
    Err { error: String, kind: &'static str },
}

async fn inspect(inspector: &DefectInspector, files: &[PathBuf], json: bool, stats: bool) -> Result<()> {
    let results = inspector.inspect_paths(files).await;

    for item in &results {
        if json {
            println!("{}", serde_json::to_string(&json_line(item))?);
        } else {
            println!("{}", text_line(item));
        }
    }

    let snapshot = inspector.metrics().snapshot();
    if stats {
        print_stats(&snapshot);
    }

    let failed = results.iter().filter(|item| item.outcome.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} images could not be classified", failed, results.len());
    }
    Ok(())
}

fn json_line(item: &BatchItem) -> JsonLine<'_> {
    let result = match &item.outcome {
        Ok(prediction) => JsonResult::Ok(prediction),
        Err(e) => JsonResult::Err {
            error: e.to_string(),
            kind: e.kind(),
        },
    };
    JsonLine {
        file: &item.name,
        result,
    }
}

fn text_line(item: &BatchItem) -> String {
    match &item.outcome {
        Ok(prediction) => format!(
            "{}: {} ({:.1}%)",
            item.name,
            prediction.label.display_name(),
            prediction.confidence * 100.0
        ),
        Err(e) => format!("{}: error: {}", item.name, e),
    }
}

fn print_stats(snapshot: &MetricsSnapshot) {
    println!();
    println!("Predictions:       {}", snapshot.predictions);
    println!("Failures:          {}", snapshot.failures());
    println!("  model:           {}", snapshot.model_unavailable);
    println!("  image decode:    {}", snapshot.image_decode_failures);
    println!("  inference:       {}", snapshot.inference_failures);
    println!("Avg latency:       {} us", snapshot.avg_latency_us());
    println!("Model load:        {} ms", snapshot.model_load_latency_us / 1000);
}

async fn model_info(inspector: &DefectInspector) -> Result<()> {
    let classifier = inspector.load_model().await?;

    println!("Model:   {}", classifier.name());
    println!("Input:   {:?}", classifier.input_shape());
    println!("Output:  [{}]", classifier.output_len());
    println!("Filter:  {}", inspector.filter());
    println!("Layers:");
    for line in classifier.summary() {
        println!("  {}", line);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("boardscan=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("boardscan=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardscan_core::{DefectClass, Error, Prediction};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_model_url_override_keeps_manifest_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("boardscan.yaml");
        std::fs::write(
            &config_path,
            "model:\n  source:\n    type: http\n    manifest: nets/pcb.json\n",
        )
        .unwrap();

        let cli = parse(&[
            "boardscan",
            "--config",
            config_path.to_str().unwrap(),
            "--model-url",
            "http://inspector.local/",
            "--filter",
            "bilinear",
            "model-info",
        ]);
        let config = load_config(&cli).unwrap();

        assert_eq!(
            config.model.source,
            SourceSpec::Http {
                base_url: "http://inspector.local/".to_string(),
                manifest: "nets/pcb.json".to_string(),
            }
        );
        assert_eq!(config.preprocess.filter, ResizeFilter::Triangle);
    }

    #[test]
    fn test_model_path_override() {
        let cli = parse(&[
            "boardscan",
            "--config",
            "/nonexistent/boardscan.yaml",
            "inspect",
            "--model-path",
            "./public/model/model.json",
            "a.png",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(
            config.model.source,
            SourceSpec::Local {
                path: PathBuf::from("./public/model/model.json")
            }
        );
        match cli.command {
            Command::Inspect { files, json, stats } => {
                assert_eq!(files, vec![PathBuf::from("a.png")]);
                assert!(!json && !stats);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_inspect_requires_files() {
        assert!(Cli::try_parse_from(["boardscan", "inspect"]).is_err());
    }

    #[test]
    fn test_output_lines() {
        let ok = BatchItem {
            name: "board.png".to_string(),
            outcome: Ok(Prediction::new(DefectClass::MouseBite, 0.875)),
        };
        assert_eq!(text_line(&ok), "board.png: Mouse bite (87.5%)");
        let json = serde_json::to_value(json_line(&ok)).unwrap();
        assert_eq!(json["file"], "board.png");
        assert_eq!(json["prediction"], "Mouse_bite");

        let failed = BatchItem {
            name: "notes.txt".to_string(),
            outcome: Err(Error::image_decode("Failed to decode image: unsupported format")),
        };
        assert!(text_line(&failed).starts_with("notes.txt: error: image decode error"));
        let json = serde_json::to_value(json_line(&failed)).unwrap();
        assert_eq!(json["kind"], "image_decode");
    }
}
