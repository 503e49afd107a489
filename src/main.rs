use clap::{Parser, Subcommand};
use dotenv::dotenv;
use gatekeeper_rs::flow::loader::DefinitionLoader;
use gatekeeper_rs::flow::{DenyStage, LoggingExecutor};
use gatekeeper_rs::policy::engine::PolicyEngine;
use gatekeeper_rs::policy::{Context, Limits, PolicyEvaluator};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a single expression
    Eval {
        /// Expression source
        #[arg(short, long)]
        expr: String,

        /// Context file (.json, otherwise YAML)
        #[arg(short, long)]
        context: Option<String>,
    },
    /// Run every policy in a definition file
    Check {
        /// Path to the definition file
        #[arg(short, long)]
        file: String,

        /// Context file (.json, otherwise YAML)
        #[arg(short, long)]
        context: Option<String>,
    },
    /// Dispatch the deny stage from a definition file
    Deny {
        /// Path to the definition file
        #[arg(short, long)]
        file: String,
    },
}

fn load_context(
    loader: &DefinitionLoader,
    path: Option<&str>,
) -> Result<Context, Box<dyn std::error::Error + Send + Sync>> {
    match path {
        Some(path) => Ok(loader.load_context(path)?),
        None => Ok(Context::new()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let loader = DefinitionLoader::new();

    match args.command {
        Commands::Eval { expr, context } => {
            let limits = Limits::default().with_env_overrides()?;
            let context = load_context(&loader, context.as_deref())?;
            let evaluator = PolicyEvaluator::new("cli").with_limits(limits);

            match evaluator.evaluate(&expr, &context) {
                Ok(evaluation) => {
                    let output = json!({
                        "value": evaluation.value.to_json(),
                        "messages": evaluation.messages,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                Err(e) => {
                    log::warn!("Failed to evaluate \"{}\": {}", expr, e);
                    let output = json!({
                        "error": format!("{:?}", e.kind()),
                        "message": e.to_string(),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                    std::process::exit(1);
                }
            }
        }
        Commands::Check { file, context } => {
            let def = loader.load_definition(&file)?;
            let limits = def.limits.to_limits()?.with_env_overrides()?;
            let context = load_context(&loader, context.as_deref())?;

            log::info!(
                "Checking {} policies from {} in '{:?}' mode",
                def.policies.len(),
                file,
                def.mode
            );
            let engine = PolicyEngine::new(def.policies, def.mode)
                .with_evaluator(PolicyEvaluator::new("check").with_limits(limits));
            let result = engine.run(&context).await?;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.passing {
                std::process::exit(1);
            }
        }
        Commands::Deny { file } => {
            let def = loader.load_definition(&file)?;
            let limits = def.limits.to_limits()?.with_env_overrides()?;
            let stage = def
                .stage
                .unwrap_or_else(|| DenyStage::new("default-deny", None));

            let mut executor = LoggingExecutor::new();
            let response = stage.dispatch_with_limits(&mut executor, limits);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
