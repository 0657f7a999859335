//! tfbroker - Entry Point
//!
//! Operator CLI over the stored IaC deployments.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use colored::Colorize;
use tracing::error;

use tfbroker::app::options::BrokerOptions;
use tfbroker::deploy::manager::DeploymentManager;
use tfbroker::errors::BrokerError;
use tfbroker::filesys::file::File;
use tfbroker::logs::init_logging;
use tfbroker::models::deployment::OperationState;
use tfbroker::storage::layout::StorageLayout;
use tfbroker::storage::settings::Settings;
use tfbroker::storage::FileStore;
use tfbroker::utils::{deployment_id, version_info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to print version: {e}"),
        }
        return;
    }

    let settings_file = match cli_args.get("settings") {
        Some(path) => File::new(path),
        None => StorageLayout::default().settings_file(),
    };
    let options = match load_options(&settings_file).await {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Unable to load settings from {}: {e}", settings_file.path().display());
            std::process::exit(1);
        }
    };

    let _guard = match init_logging(options.logging.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("File logging unavailable, using stdout only: {e}");
            let mut stdout_only = options.logging.clone();
            stdout_only.log_dir = None;
            init_logging(stdout_only).unwrap_or_else(|e| {
                eprintln!("Failed to initialize logging: {e}");
                None
            })
        }
    };

    let store = FileStore::new(options.layout.deployments_dir());
    let manager = DeploymentManager::new(Arc::new(store), options.flags);

    let result = if cli_args.contains_key("list") {
        list(&manager).await
    } else if let Some(id) = cli_args.get("status") {
        status(&manager, id).await
    } else if let Some(instance_id) = cli_args.get("outputs") {
        outputs(&manager, instance_id).await
    } else {
        print_usage();
        Ok(())
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn load_options(settings_file: &File) -> Result<BrokerOptions, BrokerError> {
    let mut settings = Settings::load(settings_file).await?;
    settings.apply_env_overrides()?;
    BrokerOptions::from_settings(&settings)
}

async fn list(manager: &DeploymentManager) -> Result<(), BrokerError> {
    let deployments = manager.list_terraform_deployments().await?;
    if deployments.is_empty() {
        println!("no deployments");
        return Ok(());
    }

    for deployment in deployments {
        let version = deployment
            .workspace
            .state_version()
            .map(|v| v.to_string())
            .unwrap_or_else(|_| "-".to_string());
        println!(
            "{}  {} {}  tofu {}",
            deployment.id.bold(),
            deployment.last_operation_type,
            paint(deployment.last_operation_state),
            version
        );
    }
    Ok(())
}

async fn status(manager: &DeploymentManager, id: &str) -> Result<(), BrokerError> {
    let status = manager.operation_status(id).await?;
    println!("finished: {}", status.finished);
    println!("message:  {}", status.message);
    if let Some(err) = status.error {
        println!("error:    {}", err.to_string().red());
    }
    Ok(())
}

async fn outputs(manager: &DeploymentManager, instance_id: &str) -> Result<(), BrokerError> {
    let deployment = manager
        .get_terraform_deployment(&deployment_id(instance_id, ""))
        .await?;
    let workspace = &deployment.workspace;
    let outputs = workspace.outputs(workspace.default_instance_name())?;
    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}

fn paint(state: OperationState) -> colored::ColoredString {
    let text = state.to_string();
    match state {
        OperationState::Succeeded => text.green(),
        OperationState::Failed => text.red(),
        OperationState::InProgress => text.yellow(),
    }
}

fn print_usage() {
    println!("usage: tfbroker [--settings=<path>] <command>");
    println!();
    println!("  --version               print version information");
    println!("  --list                  list stored deployments");
    println!("  --status=<id>           last operation of a deployment");
    println!("  --outputs=<instance>    outputs of an instance deployment");
}
