use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde::Deserialize;
use std::sync::Arc;

use approval_flow::approval::definition::{DefinitionLoader, DefinitionStore};
use approval_flow::approval::engine::{ApprovalEngine, DecisionRequest};
use approval_flow::approval::notify::{LogSink, NotificationSink};
use approval_flow::approval::recorder::Verdict;
use approval_flow::approval::registry::GroupRegistry;
use approval_flow::approval::resolver::resolve_effective_steps;
use approval_flow::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a catalog of groups and workflows
    Check {
        /// Path to the catalog file
        #[arg(short, long)]
        catalog: String,
    },
    /// Show which steps an event would go through
    Route {
        /// Path to the catalog file
        #[arg(short, long)]
        catalog: String,

        /// Path to the event attributes file
        #[arg(short, long)]
        event: String,
    },
    /// Submit an event and replay a list of decisions against it
    Simulate {
        /// Path to the catalog file
        #[arg(short, long)]
        catalog: String,

        /// Path to the event attributes file
        #[arg(short, long)]
        event: String,

        /// Path to the decision script
        #[arg(short, long)]
        decisions: String,
    },
}

/// One line of a decision script
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptEntry {
    Decide {
        step: u32,
        member: String,
        verdict: Verdict,
    },
    Cancel {
        cancel: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let loader = DefinitionLoader::new();

    match args.command {
        Commands::Check { catalog } => {
            let catalog = loader.load_catalog(&catalog)?;
            for group in &catalog.groups {
                println!(
                    "group {} ({}): {} members, {}",
                    group.id,
                    group.name,
                    group.members.len(),
                    group.quorum
                );
            }
            for workflow in &catalog.workflows {
                println!("workflow {} ({})", workflow.organization_id, workflow.name);
                for step in &workflow.steps {
                    match &step.condition {
                        Some(condition) => println!(
                            "  {}. {} when {} [reads: {}]",
                            step.ordinal,
                            step.label(),
                            condition,
                            condition.fields().join(", ")
                        ),
                        None => println!("  {}. {} always", step.ordinal, step.label()),
                    }
                }
            }
            println!("ok");
        }
        Commands::Route { catalog, event } => {
            let catalog = loader.load_catalog(&catalog)?;
            let mut attributes = loader.load_attributes(&event)?;
            let workflow = catalog
                .workflows
                .iter()
                .filter(|w| w.organization_id == attributes.organization_id)
                .last()
                .ok_or_else(|| {
                    format!("no workflow for '{}'", attributes.organization_id)
                })?;

            let mut workflow = workflow.clone();
            workflow.sort_steps();
            workflow.conform_attributes(&mut attributes)?;
            for step in resolve_effective_steps(&workflow, &attributes)? {
                let group = catalog.groups.iter().find(|g| g.id == step.group);
                let quorum = group.map(|g| step.effective_quorum(g).to_string());
                println!(
                    "{}. {} [{}]",
                    step.ordinal,
                    step.label(),
                    quorum.as_deref().unwrap_or("unknown group")
                );
            }
        }
        Commands::Simulate {
            catalog,
            event,
            decisions,
        } => {
            let config = EngineConfig::from_env()?;
            let catalog = loader.load_catalog(&catalog)?;
            let attributes = loader.load_attributes(&event)?;
            let script: Vec<ScriptEntry> =
                serde_yaml::from_str(&std::fs::read_to_string(&decisions)?)?;

            let groups = GroupRegistry::new();
            let definitions = DefinitionStore::new();
            catalog.install(&groups, &definitions).await?;

            let sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
            let (engine, dispatcher) =
                ApprovalEngine::with_sinks(config, definitions, groups, sinks);

            let run_id = engine.submit(attributes).await?.run_id;
            log::info!("Submitted run {}", run_id);

            for entry in script {
                match entry {
                    ScriptEntry::Decide {
                        step,
                        member,
                        verdict,
                    } => {
                        let request = DecisionRequest::new(run_id, step, member, verdict);
                        match engine.decide(request).await {
                            Ok(outcome) => log::info!("{:?}", outcome),
                            Err(e) => log::warn!("Decision refused: {}", e),
                        }
                    }
                    ScriptEntry::Cancel { cancel: true } => {
                        engine.cancel(run_id).await?;
                    }
                    ScriptEntry::Cancel { cancel: false } => {}
                }
            }

            let view = engine.status(run_id).await?;
            drop(engine);
            dispatcher.await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }

    Ok(())
}
