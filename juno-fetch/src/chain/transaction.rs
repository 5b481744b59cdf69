//! Transaction deserialization and compact projection.
//!
//! Juno Cash only has the Orchard shielded pool. Version 4 transactions are
//! accepted for transparent (coinbase) use, any Sapling or Sprout data in them
//! is rejected. Version 5 transactions may carry Orchard actions.

use crate::chain::{
    error::ParseError,
    utils::{
        advance_to, capped_capacity, read_bytes, read_bytes_32, read_compact_length_prefixed,
        read_i64, read_u32, read_u64, remaining_slice, skip_bytes, skip_compact_length_prefixed,
        CompactSize, ParseFromSlice,
    },
};
use juno_proto::proto::compact_formats::{CompactOrchardAction, CompactTx};
use std::io::Cursor;

/// Version group ID of v4 (Sapling era) transactions.
pub const V4_VERSION_GROUP_ID: u32 = 0x892F2085;

/// Version group ID of v5 (NU5) transactions.
pub const V5_VERSION_GROUP_ID: u32 = 0x26A7270A;

/// Number of ciphertext bytes kept in a compact Orchard action.
pub const COMPACT_CIPHERTEXT_LEN: usize = 52;

/// Encoded size of an Orchard action.
const ACTION_LEN: usize = 32 * 5 + 580 + 80;

/// Smallest possible encoded transparent input (empty script).
const MIN_TX_IN_LEN: usize = 32 + 4 + 1 + 4;

/// Smallest possible encoded transparent output (empty script).
const MIN_TX_OUT_LEN: usize = 8 + 1;

/// Txin format as described in <https://en.bitcoin.it/wiki/Transaction>
#[derive(Debug, Clone)]
pub struct TxIn {
    // PrevTxHash \[IGNORED\] - Size\[bytes\]: 32
    // PrevTxOutIndex \[IGNORED\] - Size\[bytes\]: 4
    /// CompactSize-prefixed, could be a pubkey or a script
    ///
    /// Size\[bytes\]: CompactSize
    script_sig: Vec<u8>,
    // SequenceNumber \[IGNORED\] - Size\[bytes\]: 4
}

impl TxIn {
    /// Returns the input's script sig.
    pub fn script_sig(&self) -> &[u8] {
        &self.script_sig
    }
}

impl ParseFromSlice for TxIn {
    fn parse_from_slice(
        data: &[u8],
        txid: Option<Vec<Vec<u8>>>,
        tx_version: Option<u32>,
    ) -> Result<(&[u8], Self), ParseError> {
        if txid.is_some() {
            return Err(ParseError::InvalidData(
                "txid must be None for TxIn::parse_from_slice".to_string(),
            ));
        }
        if tx_version.is_some() {
            return Err(ParseError::InvalidData(
                "tx_version must be None for TxIn::parse_from_slice".to_string(),
            ));
        }
        let mut cursor = Cursor::new(data);

        skip_bytes(&mut cursor, 32, "TxIn::PrevTxHash")?;
        skip_bytes(&mut cursor, 4, "TxIn::PrevTxOutIndex")?;
        let script_sig = read_compact_length_prefixed(&mut cursor, "TxIn::ScriptSig")?;
        skip_bytes(&mut cursor, 4, "TxIn::SequenceNumber")?;

        Ok((remaining_slice(&cursor), TxIn { script_sig }))
    }
}

/// Txout format as described in <https://en.bitcoin.it/wiki/Transaction>
#[derive(Debug, Clone)]
pub struct TxOut {
    /// Non-negative int giving the number of zatoshis to be transferred
    ///
    /// Size\[bytes\]: 8
    value: u64,
    // Script \[IGNORED\] - Size\[bytes\]: CompactSize
}

impl TxOut {
    /// Returns the output value in zatoshis.
    pub fn value(&self) -> u64 {
        self.value
    }
}

impl ParseFromSlice for TxOut {
    fn parse_from_slice(
        data: &[u8],
        txid: Option<Vec<Vec<u8>>>,
        tx_version: Option<u32>,
    ) -> Result<(&[u8], Self), ParseError> {
        if txid.is_some() {
            return Err(ParseError::InvalidData(
                "txid must be None for TxOut::parse_from_slice".to_string(),
            ));
        }
        if tx_version.is_some() {
            return Err(ParseError::InvalidData(
                "tx_version must be None for TxOut::parse_from_slice".to_string(),
            ));
        }
        let mut cursor = Cursor::new(data);

        let value = read_u64(&mut cursor, "TxOut::Value")?;
        skip_compact_length_prefixed(&mut cursor, "TxOut::Script")?;

        Ok((remaining_slice(&cursor), TxOut { value }))
    }
}

#[allow(clippy::type_complexity)]
fn parse_transparent(data: &[u8]) -> Result<(&[u8], Vec<TxIn>, Vec<TxOut>), ParseError> {
    let mut cursor = Cursor::new(data);

    let tx_in_count = CompactSize::read(&mut cursor, "TransactionData::tx_in_count")?;
    let mut tx_ins = Vec::with_capacity(capped_capacity(&cursor, tx_in_count, MIN_TX_IN_LEN)?);
    for _ in 0..tx_in_count {
        let (remaining_data, tx_in) =
            TxIn::parse_from_slice(remaining_slice(&cursor), None, None)?;
        tx_ins.push(tx_in);
        advance_to(&mut cursor, remaining_data);
    }

    let tx_out_count = CompactSize::read(&mut cursor, "TransactionData::tx_out_count")?;
    let mut tx_outs =
        Vec::with_capacity(capped_capacity(&cursor, tx_out_count, MIN_TX_OUT_LEN)?);
    for _ in 0..tx_out_count {
        let (remaining_data, tx_out) =
            TxOut::parse_from_slice(remaining_slice(&cursor), None, None)?;
        tx_outs.push(tx_out);
        advance_to(&mut cursor, remaining_data);
    }

    Ok((remaining_slice(&cursor), tx_ins, tx_outs))
}

/// An Orchard action.
#[derive(Debug, Clone)]
pub struct Action {
    // Cv \[IGNORED\] - Size\[bytes\]: 32
    /// A nullifier to a orchard note.
    ///
    /// Size\[bytes\]: 32
    nullifier: [u8; 32],
    // Rk \[IGNORED\] - Size\[bytes\]: 32
    /// X-coordinate of the commitment to the note.
    ///
    /// Size\[bytes\]: 32
    cmx: [u8; 32],
    /// Ephemeral public key.
    ///
    /// Size\[bytes\]: 32
    ephemeral_key: [u8; 32],
    /// Encrypted details of the new note, including its value and recipient's data.
    ///
    /// Size\[bytes\]: 580
    enc_ciphertext: Vec<u8>,
    // OutCiphertext \[IGNORED\] - Size\[bytes\]: 80
}

impl Action {
    /// Returns the nullifier of the spent note.
    pub fn nullifier(&self) -> &[u8; 32] {
        &self.nullifier
    }

    /// Returns the x-coordinate of the output note commitment.
    pub fn cmx(&self) -> &[u8; 32] {
        &self.cmx
    }

    /// Returns the ephemeral public key.
    pub fn ephemeral_key(&self) -> &[u8; 32] {
        &self.ephemeral_key
    }

    /// Returns the full 580 byte note ciphertext.
    pub fn enc_ciphertext(&self) -> &[u8] {
        &self.enc_ciphertext
    }

    fn to_compact(&self) -> CompactOrchardAction {
        CompactOrchardAction {
            nullifier: self.nullifier.to_vec(),
            cmx: self.cmx.to_vec(),
            ephemeral_key: self.ephemeral_key.to_vec(),
            ciphertext: self.enc_ciphertext[..COMPACT_CIPHERTEXT_LEN].to_vec(),
        }
    }
}

impl ParseFromSlice for Action {
    fn parse_from_slice(
        data: &[u8],
        txid: Option<Vec<Vec<u8>>>,
        tx_version: Option<u32>,
    ) -> Result<(&[u8], Self), ParseError> {
        if txid.is_some() {
            return Err(ParseError::InvalidData(
                "txid must be None for Action::parse_from_slice".to_string(),
            ));
        }
        if tx_version.is_some() {
            return Err(ParseError::InvalidData(
                "tx_version must be None for Action::parse_from_slice".to_string(),
            ));
        }
        let mut cursor = Cursor::new(data);

        skip_bytes(&mut cursor, 32, "Action::Cv")?;
        let nullifier = read_bytes_32(&mut cursor, "Action::nullifier")?;
        skip_bytes(&mut cursor, 32, "Action::Rk")?;
        let cmx = read_bytes_32(&mut cursor, "Action::cmx")?;
        let ephemeral_key = read_bytes_32(&mut cursor, "Action::ephemeral_key")?;
        let enc_ciphertext = read_bytes(&mut cursor, 580, "Action::enc_ciphertext")?;
        skip_bytes(&mut cursor, 80, "Action::OutCiphertext")?;

        Ok((
            remaining_slice(&cursor),
            Action {
                nullifier,
                cmx,
                ephemeral_key,
                enc_ciphertext,
            },
        ))
    }
}

/// Full Juno Cash transaction data.
#[derive(Debug, Clone)]
struct TransactionData {
    /// Indicates if the transaction is an Overwinter-enabled transaction.
    ///
    /// Size\[bytes\]: [in 4 byte header]
    f_overwintered: bool,
    /// The transaction format version.
    ///
    /// Size\[bytes\]: [in 4 byte header]
    version: u32,
    /// Version group ID, used to specify transaction type and validate its components.
    ///
    /// Size\[bytes\]: 4
    n_version_group_id: u32,
    /// Consensus branch ID (v5 only), identifies the network upgrade the transaction targets.
    ///
    /// Size\[bytes\]: 4
    consensus_branch_id: Option<u32>,
    /// List of transparent inputs in a transaction.
    ///
    /// Size\[bytes\]: Vec<40+CompactSize>
    transparent_inputs: Vec<TxIn>,
    /// List of transparent outputs in a transaction.
    ///
    /// Size\[bytes\]: Vec<8+CompactSize>
    transparent_outputs: Vec<TxOut>,
    // NLockTime \[IGNORED\] - Size\[bytes\]: 4
    // NExpiryHeight \[IGNORED\] - Size\[bytes\]: 4
    /// List of Orchard actions.
    ///
    /// Size\[bytes\]: Vec<820>
    orchard_actions: Vec<Action>,
    // FlagsOrchard \[IGNORED\] - Size\[bytes\]: 1
    /// Value balance for the Orchard pool. None if the transaction has no actions.
    ///
    /// Size\[bytes\]: 8
    value_balance_orchard: Option<i64>,
    /// Anchor of the Orchard note commitment tree. None if the transaction has no actions.
    ///
    /// Size\[bytes\]: 32
    anchor_orchard: Option<[u8; 32]>,
    // ProofsOrchard \[IGNORED\] - Size\[bytes\]: CompactSize
    // VSpendAuthSigsOrchard \[IGNORED\] - Size\[bytes\]: 64 * nActionsOrchard
    // BindingSigOrchard \[IGNORED\] - Size\[bytes\]: 64
}

impl TransactionData {
    /// Parses v4 transaction data following the version group ID.
    ///
    /// - tx_in_count / tx_in
    /// - tx_out_count / tx_out
    /// - lock_time: u32
    /// - nExpiryHeight: u32
    /// - valueBalanceSapling: i64
    /// - nShieldedSpend: compactSize, must be 0
    /// - nShieldedOutput: compactSize, must be 0
    /// - nJoinSplit: compactSize, must be 0
    fn parse_v4(
        data: &[u8],
        version: u32,
        n_version_group_id: u32,
    ) -> Result<(&[u8], Self), ParseError> {
        if n_version_group_id != V4_VERSION_GROUP_ID {
            return Err(ConsensusError::InvalidVersionGroupId {
                expected: V4_VERSION_GROUP_ID,
                actual: n_version_group_id,
            }
            .into());
        }
        let mut cursor = Cursor::new(data);

        let (remaining_data, transparent_inputs, transparent_outputs) =
            parse_transparent(remaining_slice(&cursor))?;
        advance_to(&mut cursor, remaining_data);

        skip_bytes(&mut cursor, 4, "TransactionData::nLockTime")?;
        skip_bytes(&mut cursor, 4, "TransactionData::nExpiryHeight")?;
        skip_bytes(&mut cursor, 8, "TransactionData::valueBalanceSapling")?;

        let spend_count = CompactSize::read(&mut cursor, "TransactionData::nShieldedSpend")?;
        reject_pool("Sapling spends", spend_count)?;
        let output_count = CompactSize::read(&mut cursor, "TransactionData::nShieldedOutput")?;
        reject_pool("Sapling outputs", output_count)?;
        let join_split_count = CompactSize::read(&mut cursor, "TransactionData::nJoinSplit")?;
        reject_pool("Sprout JoinSplits", join_split_count)?;

        Ok((
            remaining_slice(&cursor),
            TransactionData {
                f_overwintered: true,
                version,
                n_version_group_id,
                consensus_branch_id: None,
                transparent_inputs,
                transparent_outputs,
                orchard_actions: Vec::new(),
                value_balance_orchard: None,
                anchor_orchard: None,
            },
        ))
    }

    /// Parses v5 transaction data following the version group ID.
    ///
    /// The version group ID is checked before anything else is read.
    fn parse_v5(
        data: &[u8],
        version: u32,
        n_version_group_id: u32,
    ) -> Result<(&[u8], Self), ParseError> {
        if n_version_group_id != V5_VERSION_GROUP_ID {
            return Err(ConsensusError::InvalidVersionGroupId {
                expected: V5_VERSION_GROUP_ID,
                actual: n_version_group_id,
            }
            .into());
        }
        let mut cursor = Cursor::new(data);

        let consensus_branch_id = read_u32(&mut cursor, "TransactionData::ConsensusBranchId")?;
        skip_bytes(&mut cursor, 4, "TransactionData::nLockTime")?;
        skip_bytes(&mut cursor, 4, "TransactionData::nExpiryHeight")?;

        let (remaining_data, transparent_inputs, transparent_outputs) =
            parse_transparent(remaining_slice(&cursor))?;
        advance_to(&mut cursor, remaining_data);

        let spend_count = CompactSize::read(&mut cursor, "TransactionData::nSpendsSapling")?;
        reject_pool("Sapling spends", spend_count)?;
        let output_count = CompactSize::read(&mut cursor, "TransactionData::nOutputsSapling")?;
        reject_pool("Sapling outputs", output_count)?;

        let actions_count = CompactSize::read(&mut cursor, "TransactionData::nActionsOrchard")?;
        if actions_count >= (1 << 16) {
            return Err(ConsensusError::TooManyActions {
                count: actions_count,
            }
            .into());
        }
        let mut orchard_actions =
            Vec::with_capacity(capped_capacity(&cursor, actions_count, ACTION_LEN)?);
        for _ in 0..actions_count {
            let (remaining_data, action) =
                Action::parse_from_slice(remaining_slice(&cursor), None, None)?;
            orchard_actions.push(action);
            advance_to(&mut cursor, remaining_data);
        }

        let mut value_balance_orchard = None;
        let mut anchor_orchard = None;
        if actions_count > 0 {
            skip_bytes(&mut cursor, 1, "TransactionData::flagsOrchard")?;
            value_balance_orchard = Some(read_i64(
                &mut cursor,
                "TransactionData::valueBalanceOrchard",
            )?);
            anchor_orchard = Some(read_bytes_32(
                &mut cursor,
                "TransactionData::anchorOrchard",
            )?);
            skip_compact_length_prefixed(&mut cursor, "TransactionData::proofsOrchard")?;
            skip_bytes(
                &mut cursor,
                64 * orchard_actions.len(),
                "TransactionData::vSpendAuthSigsOrchard",
            )?;
            skip_bytes(&mut cursor, 64, "TransactionData::bindingSigOrchard")?;
        }

        Ok((
            remaining_slice(&cursor),
            TransactionData {
                f_overwintered: true,
                version,
                n_version_group_id,
                consensus_branch_id: Some(consensus_branch_id),
                transparent_inputs,
                transparent_outputs,
                orchard_actions,
                value_balance_orchard,
                anchor_orchard,
            },
        ))
    }
}

fn reject_pool(pool: &'static str, count: u64) -> Result<(), ConsensusError> {
    if count > 0 {
        return Err(ConsensusError::DisallowedShieldedPool { pool, count });
    }
    Ok(())
}

/// A fully parsed Juno Cash transaction.
#[derive(Debug, Clone)]
pub struct FullTransaction {
    /// Full transaction data.
    raw_transaction: TransactionData,

    /// Raw transaction bytes.
    raw_bytes: Vec<u8>,

    /// Transaction Id in wire (little-endian) order, supplied by the node.
    tx_id: Option<[u8; 32]>,
}

impl ParseFromSlice for FullTransaction {
    fn parse_from_slice(
        data: &[u8],
        txid: Option<Vec<Vec<u8>>>,
        tx_version: Option<u32>,
    ) -> Result<(&[u8], Self), ParseError> {
        if tx_version.is_some() {
            return Err(ParseError::InvalidData(
                "tx_version must be None for FullTransaction::parse_from_slice".to_string(),
            ));
        }
        let tx_id = match txid {
            Some(txids) => {
                let [txid] = <[Vec<u8>; 1]>::try_from(txids).map_err(|txids| {
                    ParseError::InvalidData(format!(
                        "expected exactly one txid for FullTransaction::parse_from_slice, got {}",
                        txids.len()
                    ))
                })?;
                Some(txid_from_slice(&txid)?)
            }
            None => None,
        };
        let mut cursor = Cursor::new(data);

        let header = read_u32(&mut cursor, "FullTransaction::header")?;
        let f_overwintered = (header >> 31) == 1;
        let version = header & 0x7FFFFFFF;

        if !f_overwintered {
            return Err(ConsensusError::OverwinteredFlagNotSet { version }.into());
        }
        if version < 4 {
            return Err(ConsensusError::InvalidVersion { version }.into());
        }

        let n_version_group_id = read_u32(&mut cursor, "FullTransaction::nVersionGroupId")?;

        let (remaining_data, transaction_data) = if version == 4 {
            TransactionData::parse_v4(remaining_slice(&cursor), version, n_version_group_id)?
        } else {
            TransactionData::parse_v5(remaining_slice(&cursor), version, n_version_group_id)?
        };

        let full_transaction = FullTransaction {
            raw_transaction: transaction_data,
            raw_bytes: data[..(data.len() - remaining_data.len())].to_vec(),
            tx_id,
        };

        Ok((remaining_data, full_transaction))
    }
}

fn txid_from_slice(txid: &[u8]) -> Result<[u8; 32], ParseError> {
    <[u8; 32]>::try_from(txid).map_err(|_| {
        ParseError::InvalidData(format!("txid must be 32 bytes, got {}", txid.len()))
    })
}

impl FullTransaction {
    /// Returns overwintered bool
    pub fn f_overwintered(&self) -> bool {
        self.raw_transaction.f_overwintered
    }

    /// Returns the transaction version.
    pub fn version(&self) -> u32 {
        self.raw_transaction.version
    }

    /// Returns the transaction version group id.
    pub fn n_version_group_id(&self) -> u32 {
        self.raw_transaction.n_version_group_id
    }

    /// Returns the consensus branch id of the transaction, v5 only.
    pub fn consensus_branch_id(&self) -> Option<u32> {
        self.raw_transaction.consensus_branch_id
    }

    /// Returns the script sigs of the transparent inputs.
    pub fn transparent_inputs(&self) -> Vec<Vec<u8>> {
        self.raw_transaction
            .transparent_inputs
            .iter()
            .map(|input| input.script_sig.clone())
            .collect()
    }

    /// Returns the values of the transparent outputs.
    pub fn transparent_outputs(&self) -> Vec<u64> {
        self.raw_transaction
            .transparent_outputs
            .iter()
            .map(TxOut::value)
            .collect()
    }

    /// Returns the Orchard actions of the transaction.
    pub fn orchard_actions(&self) -> &[Action] {
        &self.raw_transaction.orchard_actions
    }

    /// Returns the number of Orchard actions.
    pub fn orchard_actions_count(&self) -> usize {
        self.raw_transaction.orchard_actions.len()
    }

    /// Returns the number of Sapling outputs, always 0 on Juno Cash.
    pub fn sapling_outputs_count(&self) -> usize {
        0
    }

    /// Returns the Orchard value balance, if the transaction has actions.
    pub fn value_balance_orchard(&self) -> Option<i64> {
        self.raw_transaction.value_balance_orchard
    }

    /// Returns the orchard anchor of the transaction, if it has actions.
    pub fn anchor_orchard(&self) -> Option<[u8; 32]> {
        self.raw_transaction.anchor_orchard
    }

    /// Returns the transaction as raw bytes.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    /// Returns the TxId of the transaction in wire order, if it has been set.
    pub fn tx_id(&self) -> Option<[u8; 32]> {
        self.tx_id
    }

    /// Sets the TxId (wire order) as reported by the node.
    pub fn set_tx_id(&mut self, tx_id: [u8; 32]) {
        self.tx_id = Some(tx_id);
    }

    /// Returns the TxId as big-endian hex, as shown by block explorers.
    pub fn display_tx_id(&self) -> Option<String> {
        self.tx_id.map(|mut tx_id| {
            tx_id.reverse();
            hex::encode(tx_id)
        })
    }

    /// Returns true if the transaction carries Orchard actions.
    pub fn has_shielded_elements(&self) -> bool {
        self.raw_transaction.version >= 5 && !self.raw_transaction.orchard_actions.is_empty()
    }

    /// Converts a full transaction into a compact transaction.
    ///
    /// `index` is the position of the transaction within its block.
    pub fn to_compact(&self, index: u64) -> Result<CompactTx, ParseError> {
        let hash = self.tx_id.ok_or(ParseError::FieldNotParsed("txid"))?.to_vec();

        // Fees need the values of prior outputs, so they are never reported.
        let fee = 0;

        let actions = self
            .raw_transaction
            .orchard_actions
            .iter()
            .map(Action::to_compact)
            .collect();

        Ok(CompactTx {
            index,
            hash,
            fee,
            spends: Vec::new(),
            outputs: Vec::new(),
            actions,
        })
    }
}

/// Consensus validation error types
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum ConsensusError {
    #[error("Invalid version: {version}, must be >= 4")]
    InvalidVersion { version: u32 },

    #[error("Invalid version group ID: expected {expected:#x}, got {actual:#x}")]
    InvalidVersionGroupId { expected: u32, actual: u32 },

    #[error("Overwintered flag not set for version {version}")]
    OverwinteredFlagNotSet { version: u32 },

    #[error("{pool} are not supported, found {count}")]
    DisallowedShieldedPool { pool: &'static str, count: u64 },

    #[error("Orchard action count {count} must be less than 2^16")]
    TooManyActions { count: u64 },
}
