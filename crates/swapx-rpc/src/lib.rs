//! swapx-rpc — the broker's JSON-RPC 2.0 surface.
//!
//! Deal creation, party-detail intake, and status inspection, plus
//! operational queries (deal listing, recovery log, health). Thin layer:
//! every write delegates to the deal service, every read to the store.

pub mod api;
pub mod server;
pub mod types;

pub use api::SwapxApiServer;
pub use server::{RpcServer, RpcServerState};
