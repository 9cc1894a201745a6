//! # cbd
//!
//! Command line front end for the condition-based decryption client.
//!
//! ```text
//! cbd demo              grant, encrypt, retrieve and decrypt on an in-process network
//! cbd nodes             sample nodes from the configured Porter
//! cbd check-conditions  validate a condition set file and print its canonical JSON
//! cbd genkey            write a new keyring seed
//! cbd sample-config     print a sample cbd.toml
//! ```

mod demo;
mod keys;

use std::path::PathBuf;

use anyhow::{Context, Result};
use cbd_conditions::ConditionSet;
use cbd_config::CbdConfig;
use cbd_core::{NodeDirectory, NodeQuery, PorterClient, PorterClientConfig};
use clap::{Parser, Subcommand};
use tracing::info;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "cbd")]
#[command(about = "Condition-based decryption client", long_about = None)]
struct Args {
    /// Config file (default: CBD_CONFIG, ./cbd.toml, ~/.cbd/config.toml)
    #[arg(long, global = true, env = "CBD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the whole protocol against an in-process network
    Demo(demo::DemoArgs),

    /// Sample nodes from Porter
    Nodes {
        #[arg(long, default_value = "5")]
        quantity: usize,
    },

    /// Validate a condition set JSON file
    CheckConditions {
        file: PathBuf,
    },

    /// Generate a keyring seed file under ~/.cbd
    Genkey {
        /// File name inside ~/.cbd (default: keyring.json)
        filename: Option<String>,
    },

    /// Print a sample configuration file
    SampleConfig,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cbd=info,cbd_core=info".into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Demo(demo_args) => {
            let config = load_config(args.config.as_deref())?;
            demo::run(&config, demo_args).await
        }
        Command::Nodes { quantity } => {
            let config = load_config(args.config.as_deref())?;
            list_nodes(&config, quantity).await
        }
        Command::CheckConditions { file } => check_conditions(&file),
        Command::Genkey { filename } => keys::genkey(filename),
        Command::SampleConfig => {
            print!("{}", CbdConfig::generate_sample());
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<CbdConfig> {
    match path {
        Some(path) => CbdConfig::load_from(path),
        None => CbdConfig::load(),
    }
}

async fn list_nodes(config: &CbdConfig, quantity: usize) -> Result<()> {
    let porter = PorterClient::new(PorterClientConfig::from(&config.porter))?;
    info!("Sampling {} nodes from {}", quantity, porter.uri());

    let nodes = porter
        .get_nodes(&NodeQuery::sample(quantity))
        .await
        .with_context(|| format!("querying {}", porter.uri()))?;

    for node in nodes {
        println!(
            "{}  {}  encrypting={}",
            node.address,
            node.uri,
            hex::encode(cbd_core::cbd_pre::key_bytes(&node.encrypting_key))
        );
    }
    Ok(())
}

fn check_conditions(file: &std::path::Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let conditions = ConditionSet::from_json(&json)
        .with_context(|| format!("parsing {}", file.display()))?;

    println!(
        "{} condition(s), rule {:?}",
        conditions.len(),
        conditions.rule()
    );
    for condition in conditions.conditions() {
        println!(
            "  chain {}  {}  parameters {:?}",
            condition.chain(),
            condition.contract_address(),
            condition.parameters()
        );
    }
    println!("{}", conditions.to_json()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_parse() {
        let args =
            Args::try_parse_from(["cbd", "demo", "--threshold", "2", "--shares", "3"]).unwrap();
        let Command::Demo(demo) = args.command else {
            panic!("expected demo");
        };
        assert_eq!((demo.threshold, demo.shares), (Some(2), Some(3)));

        let args = Args::try_parse_from(["cbd", "nodes"]).unwrap();
        assert!(matches!(args.command, Command::Nodes { quantity: 5 }));
    }

    #[test]
    fn test_check_conditions_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"conditions":[{{"contractAddress":"0x1e988ba4692e52bc50b375bcc8585b95c48aad77","chain":5,"standardContractType":"ERC721","method":"ownerOf","parameters":[5954],"returnValueTest":{{"comparator":"==","value":":userAddress"}}}}]}}"#
        )
        .unwrap();
        assert!(check_conditions(file.path()).is_ok());
    }

    #[test]
    fn test_check_conditions_rejects_bad_address() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"conditions":[{{"contractAddress":"0x12","chain":5,"method":"ownerOf","parameters":[1],"returnValueTest":{{"comparator":"==","value":":userAddress"}}}}]}}"#
        )
        .unwrap();
        assert!(check_conditions(file.path()).is_err());
    }
}
