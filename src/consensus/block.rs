//! Block structure
//!
//! A block's identity is the hash of its header encoding only; transactions
//! are committed to through the merkle root, mining transaction first.

use crate::codec::{tags, widths, FormatError, Reader, WireFormat, Writer};
use crate::consensus::CompactTarget;
use crate::crypto::{build_merkle_proof, compute_merkle_root, hash_bytes, Hash, MerkleProof};
use crate::validation::{MiningTransaction, Transaction};

/// Block header containing all metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Id of the previous block
    pub prev_id: Hash,
    /// Merkle root over `[mining_tx.id] ++ [tx.id, ..]`
    pub merkle_root: Hash,
    /// Proof-of-work threshold in force for this block
    pub target: CompactTarget,
    /// Nonce used for PoW (24 bits on the wire)
    pub nonce: u64,
    /// Block timestamp (seconds since Unix epoch, 32 bits on the wire)
    pub timestamp: u64,
}

impl BlockHeader {
    /// Create a new block header
    pub fn new(prev_id: Hash, merkle_root: Hash, target: CompactTarget, nonce: u64, timestamp: u64) -> Self {
        Self {
            prev_id,
            merkle_root,
            target,
            nonce,
            timestamp,
        }
    }

    /// Calculate the id of this header
    pub fn id(&self) -> Hash {
        hash_bytes(self.encode().as_bytes())
    }

    /// Whether the header id satisfies its own target
    pub fn meets_target(&self) -> bool {
        self.target.is_met_by(&self.id())
    }
}

/// A complete block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub mining_tx: MiningTransaction,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a block, computing the merkle root from its transactions
    pub fn new(
        prev_id: Hash,
        target: CompactTarget,
        nonce: u64,
        timestamp: u64,
        mining_tx: MiningTransaction,
        transactions: Vec<Transaction>,
    ) -> Self {
        let merkle_root = merkle_root_of(&mining_tx, &transactions);
        Self {
            header: BlockHeader::new(prev_id, merkle_root, target, nonce, timestamp),
            mining_tx,
            transactions,
        }
    }

    /// Get the block id
    pub fn id(&self) -> Hash {
        self.header.id()
    }

    /// Height recorded by the mining transaction
    pub fn height(&self) -> u64 {
        self.mining_tx.height
    }

    pub fn prev_id(&self) -> &Hash {
        &self.header.prev_id
    }

    /// Ids in merkle order: mining transaction first
    pub fn tx_ids(&self) -> Vec<Hash> {
        std::iter::once(self.mining_tx.id())
            .chain(self.transactions.iter().map(Transaction::id))
            .collect()
    }

    /// Recompute the merkle root from the block's transactions
    pub fn compute_merkle_root(&self) -> Hash {
        compute_merkle_root(&self.tx_ids())
    }

    /// Whether the header commits to exactly these transactions
    pub fn has_valid_merkle_root(&self) -> bool {
        self.compute_merkle_root() == self.header.merkle_root
    }

    /// Inclusion proof for `tx_id` against this block's header
    pub fn merkle_proof(&self, tx_id: &Hash) -> Option<MerkleProof> {
        build_merkle_proof(tx_id, &self.tx_ids(), &self.header.merkle_root)
    }

    /// Whether `tx_id` is the mining transaction or one of the transactions
    pub fn contains_tx(&self, tx_id: &Hash) -> bool {
        self.mining_tx.id() == *tx_id || self.transactions.iter().any(|tx| tx.id() == *tx_id)
    }
}

fn merkle_root_of(mining_tx: &MiningTransaction, transactions: &[Transaction]) -> Hash {
    let ids: Vec<Hash> = std::iter::once(mining_tx.id())
        .chain(transactions.iter().map(Transaction::id))
        .collect();
    compute_merkle_root(&ids)
}

impl WireFormat for BlockHeader {
    const TAG: u8 = tags::HEADER;

    fn write_body(&self, w: &mut Writer) {
        w.put_hash(&self.prev_id);
        w.put_hash(&self.merkle_root);
        w.put_uint(self.target.coefficient as u64, widths::TARGET_COEFFICIENT);
        w.put_uint(self.target.exponent as u64, widths::TARGET_EXPONENT);
        w.put_uint(self.nonce, widths::NONCE);
        w.put_uint(self.timestamp, widths::TIMESTAMP);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, FormatError> {
        let prev_id = r.hash()?;
        let merkle_root = r.hash()?;
        let coefficient = r.u32(widths::TARGET_COEFFICIENT, "target coefficient")?;
        let exponent = r.u8()?;
        let nonce = r.uint(widths::NONCE)?;
        let timestamp = r.uint(widths::TIMESTAMP)?;
        Ok(Self {
            prev_id,
            merkle_root,
            target: CompactTarget::new(coefficient, exponent),
            nonce,
            timestamp,
        })
    }
}

impl WireFormat for Block {
    const TAG: u8 = tags::BLOCK;

    fn write_body(&self, w: &mut Writer) {
        self.header.write_to(w);
        self.mining_tx.write_to(w);
        w.put_count(self.transactions.len());
        for tx in &self.transactions {
            tx.write_to(w);
        }
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, FormatError> {
        let header = BlockHeader::read_from(r)?;
        let mining_tx = MiningTransaction::read_from(r)?;
        let count = r.count()?;
        let mut transactions = Vec::with_capacity(count.min(r.remaining()));
        for _ in 0..count {
            transactions.push(Transaction::read_from(r)?);
        }
        let block = Self {
            header,
            mining_tx,
            transactions,
        };
        if !block.has_valid_merkle_root() {
            return Err(FormatError::MerkleMismatch);
        }
        Ok(block)
    }
}
