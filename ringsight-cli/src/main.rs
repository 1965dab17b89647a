// Copyright 2026 Ringsight (https://github.com/ringsight)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Ringsight CLI
//!
//! Reference driver for the fraud-ring detection pipeline: generate a
//! synthetic graph, train the detector, then score and explain accounts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ringsight_core::{LabelMap, RingsightConfig, ScoreTable, TransactionGraph};
use ringsight_detect::{train, TrainConfig, TrainedDetector};
use ringsight_explain::OllamaClient;
use ringsight_service::FraudService;
use ringsight_synth::{Generator, GeneratorConfig, RingSpec};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

#[derive(Parser)]
#[command(name = "ringsight")]
#[command(about = "Ringsight - fraud-ring detection and explanation", long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic transaction graph with injected fraud rings
    Generate {
        /// Number of accounts
        #[arg(long, default_value = "100")]
        population: usize,

        /// Number of normal transactions
        #[arg(long, default_value = "300")]
        normal_tx: usize,

        /// Accounts per injected ring
        #[arg(long, default_value = "5")]
        ring_size: usize,

        /// Amount entering the first ring hop
        #[arg(long, default_value = "1200")]
        ring_amount: f64,

        /// Per-hop amount retention
        #[arg(long, default_value = "0.95")]
        ring_retention: f64,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Train the relational detector on the generated graph
    Train {
        /// Training epochs
        #[arg(long, default_value = "200")]
        epochs: usize,

        /// Hidden dimension
        #[arg(long, default_value = "16")]
        hidden: usize,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Score one account
    Score {
        /// Account id
        account: u64,
    },

    /// Explain why an account was flagged
    Explain {
        /// Account id
        account: u64,
    },

    /// List the most suspicious accounts
    Report {
        /// How many accounts to list
        #[arg(long, default_value = "10")]
        top: usize,
    },
}

struct Artifacts {
    graph: PathBuf,
    labels: PathBuf,
    detector: PathBuf,
    scores: PathBuf,
}

impl Artifacts {
    fn new(config: &RingsightConfig) -> Self {
        let dir = &config.data.data_dir;
        Self {
            graph: dir.join("graph.json"),
            labels: dir.join("labels.json"),
            detector: dir.join("detector.bin"),
            scores: dir.join("scores.json"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = RingsightConfig::load(cli.config).context("Failed to load configuration")?;
    let artifacts = Artifacts::new(&config);

    match cli.command {
        Commands::Generate {
            population,
            normal_tx,
            ring_size,
            ring_amount,
            ring_retention,
            seed,
        } => {
            let gen_config = GeneratorConfig {
                population,
                normal_tx_count: normal_tx,
                rings: vec![RingSpec {
                    size: ring_size,
                    base_amount: ring_amount,
                    retention: ring_retention,
                    ..Default::default()
                }],
                seed,
                ..Default::default()
            };
            let (graph, labels) = Generator::new(gen_config)
                .context("Invalid generator configuration")?
                .generate()
                .context("Graph generation failed")?;

            graph
                .save_to_file(&artifacts.graph)
                .context("Failed to save graph")?;
            labels
                .save_to_file(&artifacts.labels)
                .context("Failed to save labels")?;

            let stats = graph.stats();
            println!(
                "✓ Generated {} accounts, {} transactions ({} flagged as fraud)",
                stats.account_count,
                stats.transaction_count,
                labels.fraud_account_count()
            );
            println!("  graph:  {:?}", artifacts.graph);
            println!("  labels: {:?}", artifacts.labels);
        }

        Commands::Train {
            epochs,
            hidden,
            seed,
        } => {
            let graph = TransactionGraph::load_from_file(&artifacts.graph)
                .context("Failed to load graph (run `ringsight generate` first)")?;
            let labels = LabelMap::load_from_file(&artifacts.labels)
                .context("Failed to load labels")?;

            let train_config = TrainConfig {
                epochs,
                hidden_dim: hidden,
                seed,
                ..Default::default()
            };
            let detector = train(&graph, &labels, &train_config).context("Training failed")?;

            let tensors = ringsight_detect::GraphTensors::from_graph(&graph);
            let scores = detector.score_all(&tensors);
            detector
                .save_to_file(&artifacts.detector)
                .context("Failed to save detector checkpoint")?;
            scores
                .save_to_file(&artifacts.scores)
                .context("Failed to save score table")?;

            let m = &detector.metrics;
            println!("✓ Training complete");
            println!(
                "  test accuracy {:.4} | precision {:.4} | recall {:.4} | F1 {:.4}",
                m.accuracy, m.precision, m.recall, m.f1
            );
            println!("  detector: {:?}", artifacts.detector);
            println!("  scores:   {:?}", artifacts.scores);
        }

        Commands::Score { account } => {
            let service = open_service(&config, &artifacts)?;
            let outcome = service
                .score(account)
                .await
                .with_context(|| format!("Scoring account {account} failed"))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::Explain { account } => {
            let service = open_service(&config, &artifacts)?;
            let report = service
                .explain(account)
                .await
                .with_context(|| format!("Explaining account {account} failed"))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Report { top } => {
            let scores = ScoreTable::load_from_file(&artifacts.scores)
                .context("Failed to load scores (run `ringsight train` first)")?;
            let labels = LabelMap::load_from_file(&artifacts.labels).ok();

            println!("Top {top} most suspicious accounts:");
            for (rank, (id, p)) in scores.top_n(top).into_iter().enumerate() {
                let truth = labels
                    .as_ref()
                    .map(|l| {
                        if l.is_fraud_account(id) {
                            " (ground truth: FRAUD)"
                        } else {
                            ""
                        }
                    })
                    .unwrap_or("");
                println!("  {}. account {}: {:.4}{}", rank + 1, id, p, truth);
            }
        }
    }

    Ok(())
}

fn open_service(config: &RingsightConfig, artifacts: &Artifacts) -> Result<FraudService> {
    let graph = TransactionGraph::load_from_file(&artifacts.graph)
        .context("Failed to load graph (run `ringsight generate` first)")?;
    let llm = Arc::new(OllamaClient::new(
        config.llm.ollama_base_url.clone(),
        config.llm.model.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    ));

    let service = FraudService::new(graph, llm, config);
    let detector = TrainedDetector::load_from_file(&artifacts.detector)
        .context("Failed to load detector (run `ringsight train` first)")?;
    service.load_detector(detector);
    Ok(service)
}
