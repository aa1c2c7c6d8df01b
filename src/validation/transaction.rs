//! Transaction structures
//!
//! UTXO-based transactions signed with ECDSA, plus the per-block mining
//! transaction. All of them encode to the fixed-width hex wire format.

use serde::{Deserialize, Serialize};

use crate::codec::{tags, widths, FormatError, Reader, WireFormat, Writer};
use crate::crypto::{hash_bytes, Hash, PublicKey, SignatureBlob, COMPRESSED_PUBKEY_LEN, SCALAR_LEN};

/// Key for UTXO lookup: (tx_id, output_index)
pub type UtxoKey = (Hash, u32);

/// A spendable output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in base units
    pub amount: u64,
    /// Base58 address of the owner
    pub address: String,
    /// First chain height at which this output may be spent
    pub unlock_height: u64,
}

/// A transaction input referencing a previous output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Id of the transaction containing the output
    pub referenced_tx_id: Hash,
    /// Index of the output in that transaction
    pub referenced_index: u32,
    /// Signature over `referenced_tx_id` with the owner's key embedded
    pub signature: SignatureBlob,
}

/// A value transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// The reward-claiming transaction, exactly one per block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningTransaction {
    /// Height of the block carrying this transaction
    pub height: u64,
    /// Block subsidy
    pub reward: u64,
    /// Sum of fees of the block's transactions
    pub block_fees: u64,
    /// Output paying `reward + block_fees` to the miner
    pub mining_output: TxOutput,
}

impl TxOutput {
    pub fn new(amount: u64, address: impl Into<String>, unlock_height: u64) -> Self {
        Self {
            amount,
            address: address.into(),
            unlock_height,
        }
    }
}

impl TxInput {
    pub fn new(referenced_tx_id: Hash, referenced_index: u32, signature: SignatureBlob) -> Self {
        Self {
            referenced_tx_id,
            referenced_index,
            signature,
        }
    }

    /// The UTXO this input consumes
    pub fn key(&self) -> UtxoKey {
        (self.referenced_tx_id, self.referenced_index)
    }
}

impl Transaction {
    /// Create a new transaction
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self { inputs, outputs }
    }

    /// Transaction id: hash of the canonical encoding
    pub fn id(&self) -> Hash {
        hash_bytes(self.encode().as_bytes())
    }

    /// Sum of output amounts, `None` on overflow
    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
    }
}

impl MiningTransaction {
    /// Build the mining transaction for a block at `height`
    pub fn new(height: u64, reward: u64, block_fees: u64, address: impl Into<String>, mining_delay: u64) -> Self {
        Self {
            height,
            reward,
            block_fees,
            mining_output: TxOutput::new(
                reward.saturating_add(block_fees),
                address,
                height.saturating_add(mining_delay),
            ),
        }
    }

    /// Mining transaction id: hash of the canonical encoding
    pub fn id(&self) -> Hash {
        hash_bytes(self.encode().as_bytes())
    }
}

impl WireFormat for TxOutput {
    const TAG: u8 = tags::OUTPUT;

    fn write_body(&self, w: &mut Writer) {
        w.put_uint(self.amount, widths::AMOUNT);
        w.put_uint(self.unlock_height, widths::HEIGHT);
        w.put_text(&self.address);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, FormatError> {
        let amount = r.uint(widths::AMOUNT)?;
        let unlock_height = r.uint(widths::HEIGHT)?;
        let address = r.text()?;
        Ok(Self {
            amount,
            address,
            unlock_height,
        })
    }
}

impl WireFormat for TxInput {
    const TAG: u8 = tags::INPUT;

    fn write_body(&self, w: &mut Writer) {
        w.put_hash(&self.referenced_tx_id);
        w.put_uint(self.referenced_index as u64, widths::OUTPUT_INDEX);
        w.put_bytes(&self.signature.public_key.0);
        w.put_bytes(&self.signature.r);
        w.put_bytes(&self.signature.s);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, FormatError> {
        let referenced_tx_id = r.hash()?;
        let referenced_index = r.u32(widths::OUTPUT_INDEX, "output index")?;
        let public_key = PublicKey(r.bytes::<COMPRESSED_PUBKEY_LEN>()?);
        let sig_r = r.bytes::<SCALAR_LEN>()?;
        let sig_s = r.bytes::<SCALAR_LEN>()?;
        Ok(Self {
            referenced_tx_id,
            referenced_index,
            signature: SignatureBlob {
                public_key,
                r: sig_r,
                s: sig_s,
            },
        })
    }
}

impl WireFormat for Transaction {
    const TAG: u8 = tags::TRANSACTION;

    fn write_body(&self, w: &mut Writer) {
        w.put_count(self.inputs.len());
        for input in &self.inputs {
            input.write_to(w);
        }
        w.put_count(self.outputs.len());
        for output in &self.outputs {
            output.write_to(w);
        }
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, FormatError> {
        let input_count = r.count()?;
        let mut inputs = Vec::with_capacity(input_count.min(r.remaining()));
        for _ in 0..input_count {
            inputs.push(TxInput::read_from(r)?);
        }
        let output_count = r.count()?;
        let mut outputs = Vec::with_capacity(output_count.min(r.remaining()));
        for _ in 0..output_count {
            outputs.push(TxOutput::read_from(r)?);
        }
        Ok(Self { inputs, outputs })
    }
}

impl WireFormat for MiningTransaction {
    const TAG: u8 = tags::MINING_TRANSACTION;

    fn write_body(&self, w: &mut Writer) {
        w.put_uint(self.height, widths::HEIGHT);
        w.put_uint(self.reward, widths::AMOUNT);
        w.put_uint(self.block_fees, widths::AMOUNT);
        self.mining_output.write_to(w);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, FormatError> {
        let height = r.uint(widths::HEIGHT)?;
        let reward = r.uint(widths::AMOUNT)?;
        let block_fees = r.uint(widths::AMOUNT)?;
        let mining_output = TxOutput::read_from(r)?;
        Ok(Self {
            height,
            reward,
            block_fees,
            mining_output,
        })
    }
}
