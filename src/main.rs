// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;

use ects_flow::adk::error::ModelError;
use ects_flow::adk::model::{Content, GenerationConfig, Model};
use ects_flow::ects::config::{Settings, SettingsArgs};
use ects_flow::ects::envelope::{ResponseEnvelope, RunRequest};
use ects_flow::ects::prompts::PromptTable;
use ects_flow::ects::server;
use ects_flow::ects::workflow::state::StateKey;
use ects_flow::ects::workflow::{pipeline, GraphExecutor, Workflow};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP service
    Serve {
        #[command(flatten)]
        settings: SettingsArgs,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a single request read from a JSON file
    Run {
        /// Path to a JSON body with the four input fields
        #[arg(short, long)]
        input: PathBuf,

        /// Print the whole final state instead of the envelope
        #[arg(long)]
        state: bool,

        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Validate the prompt table and print the step order
    Graph {
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

/// Stand-in used when only the graph shape is needed
struct Unconfigured;

#[async_trait]
impl Model for Unconfigured {
    async fn generate_content(
        &self,
        _history: &[Content],
        _config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        Err(ModelError::ApiKeyMissing("OpenAI".to_string()))
    }
}

fn load_workflow(settings: &Settings, model: Arc<dyn Model>) -> anyhow::Result<Workflow> {
    let prompts = PromptTable::load(&settings.prompts)?;
    let workflow = pipeline::build_workflow(model, &prompts)?;
    log::info!(
        "Loaded workflow {} ({} steps) with prompts from {}",
        workflow.name(),
        workflow.graph().len(),
        settings.prompts.display()
    );
    Ok(workflow)
}

fn configured_workflow(settings: &Settings) -> anyhow::Result<Workflow> {
    let model = settings.openai_model()?;
    log::info!("Using model: {}", model.model_name());
    load_workflow(settings, Arc::new(model))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Serve {
            settings,
            host,
            port,
        } => {
            let settings = Settings::from_env()?.apply(&settings);
            let workflow = configured_workflow(&settings)?;

            let host = host.unwrap_or_else(|| settings.host.clone());
            let port = port.unwrap_or(settings.port);
            server::serve(Arc::new(workflow), &host, port).await?;
        }
        Commands::Run {
            input,
            state,
            settings,
        } => {
            let settings = Settings::from_env()?.apply(&settings);
            let workflow = configured_workflow(&settings)?;

            let body = std::fs::read_to_string(&input)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", input.display(), e))?;
            let request: RunRequest = serde_json::from_str(&body)?;

            let executor = GraphExecutor::new(Arc::new(workflow));
            let result = executor.run(request.into_state()).await?;
            for record in &result.records {
                log::info!(
                    "{}: {:?} in {}ms",
                    record.step_id,
                    record.status,
                    record.elapsed_ms
                );
            }
            log::info!(
                "Invocation {} finished in {}ms",
                result.invocation_id,
                result.total_elapsed_ms
            );

            if state {
                println!("{}", serde_json::to_string_pretty(&result.state.to_json())?);
            } else {
                let envelope: ResponseEnvelope =
                    serde_json::from_value(result.state.value(StateKey::FinalResponse)?.to_json())?;
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            }
        }
        Commands::Graph { settings } => {
            let settings = Settings::from_env()?.apply(&settings);
            let workflow = load_workflow(&settings, Arc::new(Unconfigured))?;
            let graph = workflow.graph();

            for (i, id) in graph.topological_order().iter().enumerate() {
                let preds = graph.predecessors(id);
                if preds.is_empty() {
                    println!("{:>2}. {}", i + 1, id);
                } else {
                    println!("{:>2}. {} <- {}", i + 1, id, preds.join(", "));
                }
            }
            println!("join points: {}", graph.join_points().join(", "));
        }
    }

    Ok(())
}
