//! ABI surfaces the plugin talks to: a minimal ERC-20 and the on-chain
//! broker helper. Call encoding goes through `alloy-sol-types`; no JSON ABI
//! files are shipped.

use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use alloy_sol_types::{sol, SolCall};

use swapx_chain::BrokerRequest;
use swapx_core::SwapxError;
use swapx_keys::keccak256;

sol! {
    /// Minimal ERC-20 surface.
    interface IERC20 {
        function transfer(address to, uint256 value) external returns (bool);
        function approve(address spender, uint256 value) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function decimals() external view returns (uint8);
    }

    /// The broker helper contract. Each entry point verifies the operator
    /// signature over the canonical pre-image, pulls the escrow's funds
    /// (via allowance for tokens, attached value for native), and splits
    /// them to recipient, fee recipient, and payback in one transaction.
    interface ISwapBroker {
        function swapToken(bytes32 dealId, address token, address escrow, address payback, address recipient, address feeRecipient, uint256 amount, uint256 fee, bytes signature) external;
        function swapNative(bytes32 dealId, address escrow, address payback, address recipient, address feeRecipient, uint256 amount, uint256 fee, bytes signature) external payable;
        function revertDeal(bytes32 dealId, address token, address escrow, address payback, uint256 amount, bytes signature) external payable;
        function refundSurplus(bytes32 dealId, address token, address escrow, address payback, uint256 amount, bytes signature) external payable;
    }
}

/// topic0 of `Transfer(address,address,uint256)`.
pub fn transfer_event_topic() -> [u8; 32] {
    keccak256(b"Transfer(address,address,uint256)")
}

pub fn parse_address(s: &str) -> Result<Address, SwapxError> {
    s.parse::<Address>()
        .map_err(|e| SwapxError::Other(format!("address {s}: {e}")))
}

pub fn erc20_transfer_calldata(to: Address, value: U256) -> Vec<u8> {
    IERC20::transferCall { to, value }.abi_encode()
}

pub fn erc20_approve_calldata(spender: Address, value: U256) -> Vec<u8> {
    IERC20::approveCall { spender, value }.abi_encode()
}

pub fn erc20_balance_of_calldata(owner: Address) -> Vec<u8> {
    IERC20::balanceOfCall { owner }.abi_encode()
}

pub fn erc20_allowance_calldata(owner: Address, spender: Address) -> Vec<u8> {
    IERC20::allowanceCall { owner, spender }.abi_encode()
}

/// Decode a single `uint256` return value.
pub fn decode_uint_return(data: &[u8]) -> Result<U256, SwapxError> {
    if data.len() < 32 {
        return Err(SwapxError::Rpc(format!(
            "uint256 return too short: {} bytes",
            data.len()
        )));
    }
    Ok(U256::from_be_slice(&data[..32]))
}

fn deal_id_word(req: &BrokerRequest) -> FixedBytes<32> {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(req.deal_id.as_bytes());
    FixedBytes::from(word)
}

/// Which broker entry point a settlement item maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerOp {
    Swap,
    Revert,
    Refund,
}

/// Encode the broker call for `op`. `escrow` is the derived escrow address;
/// `signature` is the operator's 65-byte authorization.
pub fn broker_calldata(
    op: BrokerOp,
    req: &BrokerRequest,
    escrow: Address,
    signature: &[u8; 65],
) -> Result<Vec<u8>, SwapxError> {
    let deal_id = deal_id_word(req);
    let signature = Bytes::copy_from_slice(signature);
    let payback = parse_address(&req.payback)?;
    let token = match &req.token {
        Some(t) => Some(parse_address(t)?),
        None => None,
    };

    Ok(match op {
        BrokerOp::Swap => match token {
            Some(token) => ISwapBroker::swapTokenCall {
                dealId: deal_id,
                token,
                escrow,
                payback,
                recipient: parse_address(&req.recipient)?,
                feeRecipient: parse_address(&req.fee_recipient)?,
                amount: req.amount,
                fee: req.fee,
                signature,
            }
            .abi_encode(),
            None => ISwapBroker::swapNativeCall {
                dealId: deal_id,
                escrow,
                payback,
                recipient: parse_address(&req.recipient)?,
                feeRecipient: parse_address(&req.fee_recipient)?,
                amount: req.amount,
                fee: req.fee,
                signature,
            }
            .abi_encode(),
        },
        BrokerOp::Revert => ISwapBroker::revertDealCall {
            dealId: deal_id,
            token: token.unwrap_or(Address::ZERO),
            escrow,
            payback,
            amount: req.amount,
            signature,
        }
        .abi_encode(),
        BrokerOp::Refund => ISwapBroker::refundSurplusCall {
            dealId: deal_id,
            token: token.unwrap_or(Address::ZERO),
            escrow,
            payback,
            amount: req.amount,
            signature,
        }
        .abi_encode(),
    })
}
