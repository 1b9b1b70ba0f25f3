//! Canonical broker-authorization pre-image.
//!
//! The operator authorizes an EVM atomic settlement by signing this byte
//! layout under the standard personal-message prefix. The contract rebuilds
//! the same bytes on-chain and recovers the operator address, so the layout
//! is consensus between this process and the deployed broker: any change is
//! a breaking contract upgrade.

use swapx_core::SwapxError;

use crate::types::BrokerRequest;

fn decode_addr(addr: &str) -> Result<[u8; 20], SwapxError> {
    let stripped = addr.strip_prefix("0x").unwrap_or(addr);
    let bytes = hex::decode(stripped)
        .map_err(|e| SwapxError::Other(format!("address {addr}: {e}")))?;
    if bytes.len() != 20 {
        return Err(SwapxError::Other(format!("address {addr}: not 20 bytes")));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Byte concatenation, in fixed order:
/// broker(20) ‖ dealId(32, left-padded) ‖ payback(20) ‖ recipient(20) ‖
/// feeRecipient(20) ‖ amount(32 BE) ‖ fee(32 BE) ‖ escrow(20) — 196 bytes.
pub fn broker_call_preimage(
    broker: &str,
    escrow_address: &str,
    req: &BrokerRequest,
) -> Result<Vec<u8>, SwapxError> {
    let mut out = Vec::with_capacity(196);
    out.extend_from_slice(&decode_addr(broker)?);

    let mut deal_id = [0u8; 32];
    deal_id[16..].copy_from_slice(req.deal_id.as_bytes());
    out.extend_from_slice(&deal_id);

    out.extend_from_slice(&decode_addr(&req.payback)?);
    out.extend_from_slice(&decode_addr(&req.recipient)?);
    out.extend_from_slice(&decode_addr(&req.fee_recipient)?);
    out.extend_from_slice(&req.amount.to_be_bytes::<32>());
    out.extend_from_slice(&req.fee.to_be_bytes::<32>());
    out.extend_from_slice(&decode_addr(escrow_address)?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use swapx_core::DealId;

    fn req() -> BrokerRequest {
        BrokerRequest {
            deal_id: DealId::from_bytes([0xab; 16]),
            escrow_index: 7,
            token: Some("0x00000000000000000000000000000000000000aa".into()),
            payback: format!("0x{}", "11".repeat(20)),
            recipient: format!("0x{}", "22".repeat(20)),
            fee_recipient: format!("0x{}", "33".repeat(20)),
            amount: U256::from(1_000u64),
            fee: U256::from(3u64),
        }
    }

    #[test]
    fn preimage_is_196_bytes_in_fixed_order() {
        let broker = format!("0x{}", "44".repeat(20));
        let escrow = format!("0x{}", "55".repeat(20));
        let pre = broker_call_preimage(&broker, &escrow, &req()).unwrap();
        assert_eq!(pre.len(), 196);
        assert_eq!(&pre[..20], &[0x44; 20]);
        // dealId left-padded to 32 bytes.
        assert_eq!(&pre[20..36], &[0u8; 16]);
        assert_eq!(&pre[36..52], &[0xab; 16]);
        assert_eq!(&pre[52..72], &[0x11; 20]);
        assert_eq!(&pre[72..92], &[0x22; 20]);
        assert_eq!(&pre[92..112], &[0x33; 20]);
        // amount 1000 = 0x03e8, big-endian in 32 bytes.
        assert_eq!(pre[142..144], [0x03, 0xe8]);
        assert_eq!(pre[175], 3);
        assert_eq!(&pre[176..], &[0x55; 20]);
    }

    #[test]
    fn rejects_malformed_addresses() {
        let broker = format!("0x{}", "44".repeat(20));
        let mut bad = req();
        bad.payback = "0x1234".into();
        assert!(broker_call_preimage(&broker, &format!("0x{}", "55".repeat(20)), &bad).is_err());
    }
}
