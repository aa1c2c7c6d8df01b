//! HEXCHAIN Node
//!
//! Opens (or creates) a chain in a data directory and mines on it.

use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn, LevelFilter};

use hexchain_core::config::{ChainParams, COIN};
use hexchain_core::mining::{assemble_block, unix_timestamp, MiningResult, MiningWorker};
use hexchain_core::node::Node;
use hexchain_core::storage::SledLedger;
use hexchain_core::views::{self, BlockView};
use hexchain_core::wallet::Wallet;
use hexchain_core::AddResult;

#[derive(Debug, Parser)]
#[command(name = "hexchain-node", about = "HEXCHAIN proof-of-work node")]
struct Opt {
    /// Chain parameter file (TOML); defaults apply when absent
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory holding the ledger and the wallet
    #[arg(long, default_value = "hexchain-data")]
    data_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mine blocks paying the wallet's primary address
    Mine {
        #[arg(long, default_value_t = 10)]
        blocks: u64,
    },
    /// Print the chain summary as JSON
    Info,
    /// Print the block at a height as JSON
    Block { height: u64 },
    /// Print the wallet balance spendable at the next height
    Balance,
}

fn main() {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();
    if let Err(e) = run(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), Box<dyn Error>> {
    let params = match &opt.config {
        Some(path) => ChainParams::load(path)?,
        None => ChainParams::default(),
    };
    std::fs::create_dir_all(&opt.data_dir)?;
    let ledger = SledLedger::open(opt.data_dir.join("ledger"))?;
    let node = Node::open(ledger, params)?;
    info!("Chain open at height {}", node.height()?);

    match opt.command {
        Command::Mine { blocks } => {
            let wallet = load_wallet(&opt.data_dir)?;
            let address = wallet
                .primary_key()
                .map(|k| k.address.clone())
                .ok_or("wallet has no keys")?;
            info!("Mining {} blocks to {}", blocks, address);
            let mut mined = 0;
            while mined < blocks {
                if mine_one(&node, &address)? {
                    mined += 1;
                }
            }
        }
        Command::Info => println!("{}", views::to_json(&node.summary()?)?),
        Command::Block { height } => {
            let block = node
                .with_chain(|chain| chain.block_at(height))??
                .ok_or_else(|| format!("no block at height {height}"))?;
            println!("{}", views::to_json(&BlockView::from(&block))?);
        }
        Command::Balance => {
            let wallet = load_wallet(&opt.data_dir)?;
            let balance = node.with_chain(|chain| wallet.get_balance(chain.ledger(), chain.height() + 1))??;
            println!("{}.{:08} HEX", balance / COIN, balance % COIN);
        }
    }
    Ok(())
}

fn load_wallet(data_dir: &std::path::Path) -> Result<Wallet, Box<dyn Error>> {
    let path = data_dir.join("wallet.bin");
    if path.exists() {
        return Ok(Wallet::load(&path)?);
    }
    let mut wallet = Wallet::new();
    let address = wallet.generate_key().address.clone();
    wallet.save(&path)?;
    info!("Created wallet with address {}", address);
    Ok(wallet)
}

/// Mine one candidate; `Ok(false)` when the tip moved before it was solved
fn mine_one(node: &Node<SledLedger>, address: &str) -> Result<bool, Box<dyn Error>> {
    let candidate = node
        .with_chain(|chain| assemble_block(chain, address, unix_timestamp()))?
        .ok_or("chain has no tip")?;
    let height = candidate.height();
    let prev_id = *candidate.prev_id();
    let worker = MiningWorker::spawn(candidate);
    let result = worker.wait(Duration::from_millis(500), || match node.tip_id() {
        Ok(tip) => tip != Some(prev_id),
        Err(e) => {
            warn!("Cannot read tip, abandoning candidate: {}", e);
            true
        }
    });
    match result {
        MiningResult::Success(block) => {
            let id = block.id();
            match node.submit_block(block)? {
                AddResult::Accepted => info!("Mined block {} at height {}", id, height),
                other => return Err(format!("mined block {id} not accepted: {other:?}").into()),
            }
            Ok(true)
        }
        MiningResult::Interrupted => {
            info!("Tip moved, abandoning candidate at height {}", height);
            Ok(false)
        }
    }
}
