//! Builders for serialized test transactions and blocks.

use crate::chain::{
    transaction::{V4_VERSION_GROUP_ID, V5_VERSION_GROUP_ID},
    utils::CompactSize,
};

/// A v5 transaction with no transparent inputs, one P2PKH output and two
/// Orchard actions.
pub(crate) const TX_V5_ORCHARD_HEX: &str = include_str!("../../testdata/tx_v5_orchard.hex");

/// Consensus branch id written into built v5 transactions.
pub(crate) const BRANCH_ID: u32 = 0xC2D6D0B4;

/// Length of the Equihash solution in built headers.
pub(crate) const SOLUTION_LEN: usize = 1344;

fn compact(out: &mut Vec<u8>, size: usize) {
    CompactSize::write(out, size as u64);
}

/// Minimal script number push for a block height.
pub(crate) fn height_script(height: i64) -> Vec<u8> {
    match height {
        0 => return vec![0x00],
        -1 => return vec![0x4f],
        1..=16 => return vec![0x50 + height as u8],
        _ => {}
    }
    let mut magnitude = height.unsigned_abs();
    let mut bytes = Vec::new();
    while magnitude > 0 {
        bytes.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    let sign = if height < 0 { 0x80 } else { 0x00 };
    match bytes.last_mut() {
        Some(last) if *last & 0x80 != 0 => bytes.push(sign),
        Some(last) => *last |= sign,
        None => {}
    }
    let mut script = vec![bytes.len() as u8];
    script.extend(bytes);
    script
}

/// A transparent input spending the null outpoint, as coinbase inputs do.
pub(crate) fn coinbase_input(script_sig: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    out.extend_from_slice(&u32::MAX.to_le_bytes());
    compact(&mut out, script_sig.len());
    out.extend_from_slice(script_sig);
    out.extend_from_slice(&u32::MAX.to_le_bytes());
    out
}

/// A transparent output with a script of `script_len` filler bytes.
pub(crate) fn transparent_output(value: u64, script_len: usize) -> Vec<u8> {
    let mut out = value.to_le_bytes().to_vec();
    compact(&mut out, script_len);
    out.extend(std::iter::repeat(0xac).take(script_len));
    out
}

/// An Orchard action whose fields are filled with patterns derived from `i`.
pub(crate) fn action(i: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(820);
    out.extend_from_slice(&[0xC0 + i; 32]); // cv
    out.extend_from_slice(&[0xA0 + i; 32]); // nullifier
    out.extend_from_slice(&[0xB0 + i; 32]); // rk
    out.extend_from_slice(&[0xD0 + i; 32]); // cmx
    out.extend_from_slice(&[0xE0 + i; 32]); // ephemeral key
    out.extend((0..580usize).map(|k| ((usize::from(i) * 7 + k) % 251) as u8));
    out.extend_from_slice(&[0xF0 + i; 80]); // out ciphertext
    out
}

fn transparent(out: &mut Vec<u8>, inputs: &[Vec<u8>], outputs: &[Vec<u8>]) {
    compact(out, inputs.len());
    inputs.iter().for_each(|input| out.extend_from_slice(input));
    compact(out, outputs.len());
    outputs.iter().for_each(|output| out.extend_from_slice(output));
}

/// A v4 transaction. Nonzero Sapling or Sprout counts are written without
/// any following descriptions.
pub(crate) fn v4_transaction(
    inputs: &[Vec<u8>],
    outputs: &[Vec<u8>],
    sapling_spends: u64,
    sapling_outputs: u64,
    join_splits: u64,
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x8000_0004u32.to_le_bytes());
    out.extend_from_slice(&V4_VERSION_GROUP_ID.to_le_bytes());
    transparent(&mut out, inputs, outputs);
    out.extend_from_slice(&0u32.to_le_bytes()); // lock time
    out.extend_from_slice(&0u32.to_le_bytes()); // expiry height
    out.extend_from_slice(&0i64.to_le_bytes()); // value balance
    CompactSize::write(&mut out, sapling_spends);
    CompactSize::write(&mut out, sapling_outputs);
    CompactSize::write(&mut out, join_splits);
    out
}

/// A v5 transaction carrying `actions` Orchard actions.
pub(crate) fn v5_transaction(inputs: &[Vec<u8>], outputs: &[Vec<u8>], actions: u8) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x8000_0005u32.to_le_bytes());
    out.extend_from_slice(&V5_VERSION_GROUP_ID.to_le_bytes());
    out.extend_from_slice(&BRANCH_ID.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // lock time
    out.extend_from_slice(&0u32.to_le_bytes()); // expiry height
    transparent(&mut out, inputs, outputs);
    out.push(0x00); // sapling spends
    out.push(0x00); // sapling outputs
    compact(&mut out, actions.into());
    for i in 0..actions {
        out.extend(action(i));
    }
    if actions > 0 {
        out.push(0x03); // flags
        out.extend_from_slice(&(-5000i64).to_le_bytes());
        out.extend_from_slice(&[0x5a; 32]); // anchor
        compact(&mut out, 300);
        out.extend_from_slice(&[0x77; 300]);
        out.extend(std::iter::repeat(0x88).take(64 * usize::from(actions)));
        out.extend_from_slice(&[0x99; 64]);
    }
    out
}

/// A v5 coinbase transaction for `height`.
pub(crate) fn coinbase_transaction(height: i64) -> Vec<u8> {
    let mut script = height_script(height);
    script.extend_from_slice(b"juno");
    v5_transaction(
        &[coinbase_input(&script)],
        &[transparent_output(312_500_000, 25)],
        0,
    )
}

/// A serialized block header.
pub(crate) fn block_header(prev_hash: [u8; 32], time: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&4u32.to_le_bytes());
    out.extend_from_slice(&prev_hash);
    out.extend_from_slice(&[0x01; 32]); // merkle root
    out.extend_from_slice(&[0x02; 32]); // block commitments
    out.extend_from_slice(&time.to_le_bytes());
    out.extend_from_slice(&0x1f07ffffu32.to_le_bytes());
    out.extend_from_slice(&[0x03; 32]); // nonce
    compact(&mut out, SOLUTION_LEN);
    out.extend(std::iter::repeat(0x04).take(SOLUTION_LEN));
    out
}

/// A serialized block holding `txs`.
pub(crate) fn block(prev_hash: [u8; 32], time: u32, txs: &[Vec<u8>]) -> Vec<u8> {
    let mut out = block_header(prev_hash, time);
    compact(&mut out, txs.len());
    txs.iter().for_each(|tx| out.extend_from_slice(tx));
    out
}
