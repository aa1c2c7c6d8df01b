//! JSON views of chain data
//!
//! Explicit serde structs for external consumers. Hashes render as hex
//! strings and every view carries a `"kind"` field. These are independent
//! of the hex wire format.

use serde::Serialize;

use crate::chain::Blockchain;
use crate::consensus::{Block, BlockHeader};
use crate::storage::Ledger;
use crate::validation::{MiningTransaction, Transaction, TxInput, TxOutput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename = "output")]
pub struct OutputView {
    pub amount: u64,
    pub address: String,
    pub unlock_height: u64,
}

impl From<&TxOutput> for OutputView {
    fn from(output: &TxOutput) -> Self {
        Self {
            amount: output.amount,
            address: output.address.clone(),
            unlock_height: output.unlock_height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename = "input")]
pub struct InputView {
    pub referenced_tx_id: String,
    pub referenced_index: u32,
    /// Compressed public key carried by the signature
    pub public_key: String,
}

impl From<&TxInput> for InputView {
    fn from(input: &TxInput) -> Self {
        Self {
            referenced_tx_id: input.referenced_tx_id.to_hex(),
            referenced_index: input.referenced_index,
            public_key: hex::encode(input.signature.public_key.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename = "transaction")]
pub struct TransactionView {
    pub id: String,
    pub inputs: Vec<InputView>,
    pub outputs: Vec<OutputView>,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id().to_hex(),
            inputs: tx.inputs.iter().map(InputView::from).collect(),
            outputs: tx.outputs.iter().map(OutputView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename = "mining_transaction")]
pub struct MiningTransactionView {
    pub id: String,
    pub height: u64,
    pub reward: u64,
    pub block_fees: u64,
    pub output: OutputView,
}

impl From<&MiningTransaction> for MiningTransactionView {
    fn from(tx: &MiningTransaction) -> Self {
        Self {
            id: tx.id().to_hex(),
            height: tx.height,
            reward: tx.reward,
            block_fees: tx.block_fees,
            output: OutputView::from(&tx.mining_output),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename = "header")]
pub struct HeaderView {
    pub id: String,
    pub prev_id: String,
    pub merkle_root: String,
    /// Compact target as `cccccceXX`
    pub target: String,
    pub nonce: u64,
    pub timestamp: u64,
}

impl From<&BlockHeader> for HeaderView {
    fn from(header: &BlockHeader) -> Self {
        Self {
            id: header.id().to_hex(),
            prev_id: header.prev_id.to_hex(),
            merkle_root: header.merkle_root.to_hex(),
            target: header.target.to_string(),
            nonce: header.nonce,
            timestamp: header.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename = "block")]
pub struct BlockView {
    pub height: u64,
    pub header: HeaderView,
    pub mining_tx: MiningTransactionView,
    pub transactions: Vec<TransactionView>,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            height: block.height(),
            header: HeaderView::from(&block.header),
            mining_tx: MiningTransactionView::from(&block.mining_tx),
            transactions: block.transactions.iter().map(TransactionView::from).collect(),
        }
    }
}

/// Headline numbers for a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename = "chain_summary")]
pub struct ChainSummary {
    pub height: u64,
    pub tip: Option<String>,
    pub target: String,
    pub mining_reward: u64,
    pub total_mining_amount_remaining: u64,
    pub pending_transactions: usize,
    pub fork_blocks: usize,
}

impl ChainSummary {
    pub fn of<L: Ledger>(chain: &Blockchain<L>) -> Self {
        Self {
            height: chain.height(),
            tip: chain.tip_id().map(|id| id.to_hex()),
            target: chain.target().to_string(),
            mining_reward: chain.mining_reward(),
            total_mining_amount_remaining: chain.total_mining_amount_remaining(),
            pending_transactions: chain.pending_transactions().len(),
            fork_blocks: chain.fork_table().len(),
        }
    }
}

/// Render any view as pretty JSON
pub fn to_json<T: Serialize>(view: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainParams;
    use crate::node::create_genesis_block;
    use crate::storage::MemoryLedger;

    #[test]
    fn test_block_view_json() {
        let genesis = create_genesis_block(&ChainParams::for_testing());
        let value = serde_json::to_value(BlockView::from(&genesis)).unwrap();

        assert_eq!(value["kind"], "block");
        assert_eq!(value["height"], 0);
        assert_eq!(value["header"]["kind"], "header");
        assert_eq!(value["header"]["id"], genesis.id().to_hex());
        assert_eq!(value["header"]["target"], "7fffffe20");
        assert_eq!(value["mining_tx"]["output"]["kind"], "output");
        assert_eq!(value["transactions"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_chain_summary() {
        let chain = Blockchain::open(MemoryLedger::new(), ChainParams::for_testing()).unwrap();
        let summary = ChainSummary::of(&chain);
        assert_eq!(summary.height, 0);
        assert_eq!(summary.tip, chain.tip_id().map(|id| id.to_hex()));

        let json = to_json(&summary).unwrap();
        assert!(json.contains("\"kind\": \"chain_summary\""));
    }
}
