pub mod address;
pub mod covenant;
pub mod difficulty;
pub mod name;
pub mod params;
pub mod pools;
pub mod types;

// Explicit re-exports to avoid ambiguous glob re-exports
pub use address::verify_address_syntax;
pub use covenant::Covenant;
pub use difficulty::{chainwork_to_u256, difficulty_from_bits};
pub use name::{hash_name, verify_string};
pub use params::{Network, NetworkParams};
pub use pools::{Pool, PoolTable};
pub use types::{
    ChainEntry, NameState, NodeInfo, PeerInfo, RpcBlock, RpcCoin, RpcCovenant, RpcInput,
    RpcOutput, RpcTx,
};
