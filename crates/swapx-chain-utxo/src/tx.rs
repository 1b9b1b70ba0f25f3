//! Raw transaction construction for the UTXO chain.
//!
//! Legacy pay-to-pubkey-hash transactions: version, inputs with signature
//! scripts, outputs with value and script, lock time. Output values are
//! exact integer base units end to end; the 8-byte little-endian wire form
//! is written as two 32-bit words (low, then high) so values beyond 2⁵³
//! survive bit-for-bit.

use k256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
use swapx_core::SwapxError;
use swapx_keys::sha256d;

/// SIGHASH_ALL — every input commits to all outputs.
const SIGHASH_ALL: u32 = 1;

// ── Value wire encoding ──────────────────────────────────────────────────────

/// Encode an output value as 8 little-endian bytes, written bitwise as
/// (low 32 | high 32). Never round-trips through a float.
pub fn encode_value_le(value: u64) -> [u8; 8] {
    let low = (value & 0xffff_ffff) as u32;
    let high = (value >> 32) as u32;
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&low.to_le_bytes());
    out[4..].copy_from_slice(&high.to_le_bytes());
    out
}

/// Inverse of [`encode_value_le`].
pub fn decode_value_le(bytes: &[u8; 8]) -> u64 {
    let low = u32::from_le_bytes(bytes[..4].try_into().expect("4 bytes")) as u64;
    let high = u32::from_le_bytes(bytes[4..].try_into().expect("4 bytes")) as u64;
    (high << 32) | low
}

/// Bitcoin-style CompactSize.
pub fn encode_varint(n: u64, out: &mut Vec<u8>) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

// ── Script construction ──────────────────────────────────────────────────────

/// OP_DUP OP_HASH160 <20-byte pubkey hash> OP_EQUALVERIFY OP_CHECKSIG.
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(0x76); // OP_DUP
    script.push(0xa9); // OP_HASH160
    script.push(0x14); // push 20
    script.extend_from_slice(pubkey_hash);
    script.push(0x88); // OP_EQUALVERIFY
    script.push(0xac); // OP_CHECKSIG
    script
}

// ── Transaction model ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct TxIn {
    /// Previous txid in wire order (reversed from the display hex).
    pub prev_txid: [u8; 32],
    pub vout: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Clone, Debug)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct RawTransaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

/// Parse a display-order txid hex into wire order.
pub fn txid_to_wire(txid_hex: &str) -> Result<[u8; 32], SwapxError> {
    let bytes = hex::decode(txid_hex.trim_start_matches("0x"))
        .map_err(|e| SwapxError::Other(format!("txid {txid_hex}: {e}")))?;
    if bytes.len() != 32 {
        return Err(SwapxError::Other(format!("txid {txid_hex}: not 32 bytes")));
    }
    let mut out = [0u8; 32];
    for (i, b) in bytes.iter().rev().enumerate() {
        out[i] = *b;
    }
    Ok(out)
}

impl RawTransaction {
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self { version: 1, inputs, outputs, lock_time: 0 }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.weight_estimate());
        out.extend_from_slice(&self.version.to_le_bytes());
        encode_varint(self.inputs.len() as u64, &mut out);
        for input in &self.inputs {
            out.extend_from_slice(&input.prev_txid);
            out.extend_from_slice(&input.vout.to_le_bytes());
            encode_varint(input.script_sig.len() as u64, &mut out);
            out.extend_from_slice(&input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        encode_varint(self.outputs.len() as u64, &mut out);
        for output in &self.outputs {
            out.extend_from_slice(&encode_value_le(output.value));
            encode_varint(output.script_pubkey.len() as u64, &mut out);
            out.extend_from_slice(&output.script_pubkey);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    fn weight_estimate(&self) -> usize {
        10 + self.inputs.len() * 180 + self.outputs.len() * 34
    }

    /// Display-order txid of the serialized transaction.
    pub fn txid(&self) -> String {
        let mut hash = sha256d(&self.serialize());
        hash.reverse();
        hex::encode(hash)
    }

    /// SIGHASH_ALL digest for `input_index`, given the script of the output
    /// being spent.
    pub fn sighash(&self, input_index: usize, spent_script: &[u8]) -> [u8; 32] {
        let mut copy = self.clone();
        for (i, input) in copy.inputs.iter_mut().enumerate() {
            input.script_sig = if i == input_index { spent_script.to_vec() } else { Vec::new() };
        }
        let mut preimage = copy.serialize();
        preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
        sha256d(&preimage)
    }

    /// Sign every input with `key`, assuming all spent outputs pay the
    /// key's own P2PKH script (escrow inputs always do).
    pub fn sign_all_inputs(&mut self, key: &SigningKey) -> Result<(), SwapxError> {
        let pubkey = key.verifying_key().to_encoded_point(true);
        let pubkey_hash = swapx_keys::utxo_pubkey_hash(key.verifying_key());
        let spent_script = p2pkh_script(&pubkey_hash);

        for index in 0..self.inputs.len() {
            let digest = self.sighash(index, &spent_script);
            let signature: Signature = key
                .sign_prehash(&digest)
                .map_err(|e| SwapxError::Signing(e.to_string()))?;
            let signature = signature.normalize_s().unwrap_or(signature);
            let mut der = signature.to_der().as_bytes().to_vec();
            der.push(SIGHASH_ALL as u8);

            let mut script_sig = Vec::with_capacity(der.len() + 35);
            script_sig.push(der.len() as u8);
            script_sig.extend_from_slice(&der);
            script_sig.push(pubkey.as_bytes().len() as u8);
            script_sig.extend_from_slice(pubkey.as_bytes());
            self.inputs[index].script_sig = script_sig;
        }
        Ok(())
    }
}

// ── Fee model ────────────────────────────────────────────────────────────────

/// Integer fee estimate: `rate` base units per byte over the serialized
/// size of an n-in/m-out transaction. No floats anywhere.
pub fn estimate_fee(inputs: usize, outputs: usize, rate: u64) -> u64 {
    let size = 10 + inputs as u64 * 148 + outputs as u64 * 34;
    size * rate
}
