mod node;
mod rpc;
mod supervisor;

pub use node::{LedgerNode, RawBlock, RawLog, ReceiptData};
pub use rpc::{RateLimitConfig, RetryConfig, RpcClientConfig, RpcError};
pub use supervisor::{Connector, HttpConnector, NodeSupervisor, SupervisorConfig};
