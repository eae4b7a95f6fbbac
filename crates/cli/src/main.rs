//! CLI entry point for forkbench
//!
//! Loads a dev-chain profile and drives the node or the front-run optimizer.

use clap::{Parser, Subcommand};
use forkbench::config::MiningInterval;
use forkbench::{
    bounded_analytic, max_frontrun_binary, run_quote_server, sweep, Address, Config, NodeClient,
    PairReader, SandwichParams, SearchBounds, ServerState, DEFAULT_MARGIN_WEI, DEFAULT_UPPER_WEI,
};
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

type CliResult = Result<(), Box<dyn Error>>;

/// forkbench - dev-chain profiles and sandwich sizing for Hardhat-style nodes
#[derive(Parser, Debug)]
#[command(name = "forkbench")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the profile (TOML)
    #[arg(short, long, default_value = "forkbench.toml", global = true)]
    config: PathBuf,

    /// Second profile merged on top of --config
    #[arg(long, global = true)]
    overlay: Option<PathBuf>,

    /// Node JSON-RPC URL (overrides the profile and RPC_URL)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the profile and print a summary
    Check,
    /// Print the compiler a source file would be built with
    Select {
        /// `pragma solidity` constraint, e.g. "^0.8.0"
        #[arg(long)]
        pragma: String,
        /// Source path, consulted for per-file overrides
        #[arg(long)]
        source: Option<String>,
    },
    /// Push forking and mining settings to the node
    Apply,
    /// Mine blocks now
    Mine {
        #[arg(long, default_value_t = 1)]
        blocks: u64,
    },
    /// Show block number, chain id and automine state
    Status,
    /// Size the largest front-run the victim's minimum output allows
    Quote {
        /// Victim's input amount in wei
        #[arg(long)]
        victim_in: f64,
        /// Victim's minimum output in wei
        #[arg(long)]
        min_out: f64,
        #[arg(long)]
        reserve_in: Option<f64>,
        #[arg(long)]
        reserve_out: Option<f64>,
        /// Read reserves from this pair contract instead
        #[arg(long, conflicts_with_all = ["reserve_in", "reserve_out"])]
        pair: Option<String>,
        /// The token paid in is the pair's token0
        #[arg(long)]
        base_is_token0: bool,
        #[arg(long, default_value_t = DEFAULT_UPPER_WEI)]
        upper: f64,
        #[arg(long, default_value_t = DEFAULT_MARGIN_WEI)]
        margin: f64,
    },
    /// Compare bisection and closed-form sizing over rising minimum outputs (CSV)
    Sweep {
        #[arg(long)]
        victim_in: f64,
        #[arg(long)]
        reserve_in: f64,
        #[arg(long)]
        reserve_out: f64,
        #[arg(long, default_value_t = 199)]
        steps: u32,
        /// Increment of the minimum output per step, in wei
        #[arg(long, default_value_t = 1e16)]
        step_wei: f64,
        #[arg(long, default_value_t = DEFAULT_UPPER_WEI)]
        upper: f64,
        #[arg(long, default_value_t = DEFAULT_MARGIN_WEI)]
        margin: f64,
    },
    /// Run the quote HTTP server
    Serve {
        #[arg(long, default_value = "127.0.0.1:7878")]
        bind: SocketAddr,
    },
}

/// Where the profile comes from; only read by commands that need it
struct ProfileSource {
    config: PathBuf,
    overlay: Option<PathBuf>,
    rpc_url: Option<String>,
}

impl ProfileSource {
    fn load(&self) -> Result<Config, Box<dyn Error>> {
        let mut config = Config::load_layered(&self.config, self.overlay.as_ref())?;
        if let Some(url) = &self.rpc_url {
            config.rpc.url = url.clone();
            config.validate()?;
        }
        log::debug!("Loaded profile from {}", self.config.display());
        Ok(config)
    }
}

fn describe_interval(interval: &MiningInterval) -> String {
    match interval {
        MiningInterval::Fixed(0) => "off".to_string(),
        MiningInterval::Fixed(ms) => format!("{} ms", ms),
        MiningInterval::Range([min, max]) => format!("{}-{} ms", min, max),
    }
}

fn check(config: &Config) -> CliResult {
    println!("Profile OK");
    println!("Compilers:");
    for compiler in config.solidity.compilers() {
        let optimizer = compiler.effective_optimizer();
        if optimizer.enabled {
            println!("  {} (optimizer, {} runs)", compiler.version, optimizer.runs);
        } else {
            println!("  {}", compiler.version);
        }
    }

    let hardhat = &config.networks.hardhat;
    match hardhat.active_fork() {
        Some(fork) => println!(
            "Forking: {} @ {}",
            forkbench::node::redact_url(&fork.url),
            fork.block_number
                .map(|b| b.to_string())
                .unwrap_or_else(|| "latest".to_string())
        ),
        None => println!("Forking: off"),
    }
    println!(
        "Mining: auto={} interval={}{}",
        hardhat.mining.auto,
        describe_interval(&hardhat.mining.interval),
        if hardhat.mining.is_manual() { " (manual)" } else { "" }
    );
    println!("Chain id: {}", hardhat.chain_id);
    println!("RPC: {}", config.rpc.url);
    Ok(())
}

fn select(config: &Config, pragma: &str, source: Option<&str>) -> CliResult {
    let chosen = match source {
        Some(path) => config.solidity.compiler_for_source(path, pragma)?,
        None => config.solidity.select_compiler(pragma)?,
    };
    match chosen {
        Some(compiler) => {
            println!("{}", compiler.version);
            Ok(())
        }
        None => Err(format!("no configured compiler satisfies '{}'", pragma).into()),
    }
}

async fn status(node: &NodeClient) -> CliResult {
    println!("Block: {}", node.block_number().await?);
    println!("Chain id: {}", node.chain_id().await?);
    println!("Automine: {}", node.get_automine().await?);
    Ok(())
}

async fn run(args: Args) -> CliResult {
    let Args {
        config,
        overlay,
        rpc_url,
        command,
    } = args;
    let profile = ProfileSource {
        config,
        overlay,
        rpc_url,
    };

    match command {
        Command::Check => check(&profile.load()?),
        Command::Select { pragma, source } => select(&profile.load()?, &pragma, source.as_deref()),
        Command::Apply => {
            let config = profile.load()?;
            let node = NodeClient::from_config(&config)?;
            let applied = node.apply_profile(&config).await?;
            println!(
                "Applied: block {} chain {} forked={} automine={} interval={}",
                applied.block_number,
                applied.chain_id,
                applied.forked,
                applied.automine,
                describe_interval(&applied.interval)
            );
            Ok(())
        }
        Command::Mine { blocks } => {
            let node = NodeClient::from_config(&profile.load()?)?;
            node.mine(blocks).await?;
            println!("Mined {} block(s); head is {}", blocks, node.block_number().await?);
            Ok(())
        }
        Command::Status => {
            let node = NodeClient::from_config(&profile.load()?)?;
            status(&node).await
        }
        Command::Quote {
            victim_in,
            min_out,
            reserve_in,
            reserve_out,
            pair,
            base_is_token0,
            upper,
            margin,
        } => {
            let (reserve_in, reserve_out) = match (pair, reserve_in, reserve_out) {
                (Some(pair), _, _) => {
                    let pair: Address = pair.parse()?;
                    let node = NodeClient::from_config(&profile.load()?)?;
                    let state = PairReader::new(&node, pair).state().await?;
                    log::info!("Pair {} tokens {} / {}", pair, state.token0, state.token1);
                    state.oriented(base_is_token0)
                }
                (None, Some(r_in), Some(r_out)) => (r_in, r_out),
                _ => return Err("either --pair or both --reserve-in and --reserve-out are required".into()),
            };

            let params = SandwichParams::new(victim_in, reserve_in, reserve_out);
            let quote = max_frontrun_binary(&params, min_out, 0.0, upper, margin)?;
            let analytic = bounded_analytic(&params, min_out)?;

            println!("attacker_in   {:.0}", quote.attacker_in);
            println!("attacker_out  {:.0}", quote.attacker_out);
            println!("victim_out    {:.0}", quote.victim_out);
            println!("profit        {:.0}", quote.profit);
            match analytic {
                Some(size) => println!("analytic_in   {:.0}", size),
                None => println!("analytic_in   unbounded"),
            }
            Ok(())
        }
        Command::Sweep {
            victim_in,
            reserve_in,
            reserve_out,
            steps,
            step_wei,
            upper,
            margin,
        } => {
            let params = SandwichParams::new(victim_in, reserve_in, reserve_out);
            let bounds = SearchBounds {
                lower: 0.0,
                upper,
                margin,
            };
            let rows = sweep(&params, (1..=steps).map(|i| i as f64 * step_wei), bounds)?;

            let cell = |v: Option<f64>| v.map(|x| format!("{:.0}", x)).unwrap_or_default();
            println!("min_out,binary,analytic");
            for row in rows {
                println!("{:.0},{},{}", row.min_out, cell(row.binary), cell(row.analytic));
            }
            Ok(())
        }
        Command::Serve { bind } => {
            run_quote_server(bind, ServerState::new(profile.load()?)).await?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_quote_with_scientific_amounts() {
        let args = Args::parse_from([
            "forkbench",
            "quote",
            "--victim-in",
            "1e18",
            "--min-out",
            "8e17",
            "--reserve-in",
            "1e19",
            "--reserve-out",
            "1e19",
        ]);
        match args.command {
            Command::Quote {
                victim_in,
                reserve_in,
                upper,
                ..
            } => {
                assert_eq!(victim_in, 1e18);
                assert_eq!(reserve_in, Some(1e19));
                assert_eq!(upper, 100e18);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(args.config, PathBuf::from("forkbench.toml"));
    }

    #[test]
    fn test_pair_conflicts_with_reserves() {
        let result = Args::try_parse_from([
            "forkbench",
            "quote",
            "--victim-in",
            "1",
            "--min-out",
            "1",
            "--pair",
            "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc",
            "--reserve-in",
            "5",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "forkbench",
            "check",
            "--config",
            "profiles/manual-mining.toml",
            "--overlay",
            "profiles/forked-mainnet.toml",
        ]);
        assert_eq!(args.config, PathBuf::from("profiles/manual-mining.toml"));
        assert!(args.overlay.is_some());
        assert!(matches!(args.command, Command::Check));
    }

    #[test]
    fn test_bisection_defaults_match_library() {
        for sub in [
            vec!["quote", "--victim-in", "1", "--min-out", "1", "--reserve-in", "5", "--reserve-out", "5"],
            vec!["sweep", "--victim-in", "1", "--reserve-in", "5", "--reserve-out", "5"],
        ] {
            let args = Args::parse_from(std::iter::once("forkbench").chain(sub));
            let (upper, margin) = match args.command {
                Command::Quote { upper, margin, .. } | Command::Sweep { upper, margin, .. } => {
                    (upper, margin)
                }
                other => panic!("unexpected command: {:?}", other),
            };
            assert_eq!(upper, DEFAULT_UPPER_WEI);
            assert_eq!(margin, DEFAULT_MARGIN_WEI);
        }
        assert_eq!(SearchBounds::default().upper, DEFAULT_UPPER_WEI);
    }

    #[tokio::test]
    async fn test_offline_commands_need_no_profile() {
        let sweep = Args::parse_from([
            "forkbench",
            "sweep",
            "--victim-in",
            "1e18",
            "--reserve-in",
            "1e19",
            "--reserve-out",
            "1e19",
            "--steps",
            "3",
            "--config",
            "/nonexistent/forkbench.toml",
        ]);
        assert!(run(sweep).await.is_ok());

        let quote = Args::parse_from([
            "forkbench",
            "quote",
            "--victim-in",
            "1e18",
            "--min-out",
            "0",
            "--reserve-in",
            "1e19",
            "--reserve-out",
            "1e19",
            "--config",
            "/nonexistent/forkbench.toml",
        ]);
        assert!(run(quote).await.is_ok());
    }

    #[tokio::test]
    async fn test_profile_commands_report_missing_profile() {
        let check = Args::parse_from(["forkbench", "check", "--config", "/nonexistent/forkbench.toml"]);
        assert!(run(check).await.is_err());

        let quote = Args::parse_from([
            "forkbench",
            "quote",
            "--victim-in",
            "1e18",
            "--min-out",
            "8e17",
            "--pair",
            "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc",
            "--config",
            "/nonexistent/forkbench.toml",
        ]);
        assert!(run(quote).await.is_err());
    }

    #[test]
    fn test_describe_interval() {
        assert_eq!(describe_interval(&MiningInterval::Fixed(0)), "off");
        assert_eq!(describe_interval(&MiningInterval::Fixed(250)), "250 ms");
        assert_eq!(describe_interval(&MiningInterval::Range([1, 2])), "1-2 ms");
    }
}
