//! Read-only calls against the tracked token contract.

mod function;

pub use function::ContractFunction;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, U256};
use alloy::rpc::types::BlockId;
use thiserror::Error;

use crate::rpc::{LedgerNode, RpcError};

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Invalid function signature: {0}")]
    InvalidSignature(String),

    #[error("Failed to decode call output: {0}")]
    Decode(String),

    #[error("Unexpected call output for {function}: {value:?}")]
    UnexpectedOutput { function: String, value: DynSolValue },

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

/// A token contract exposing `balanceOf` and `totalSupply`.
#[derive(Debug, Clone)]
pub struct TokenContract {
    address: Address,
    balance_of: ContractFunction,
    total_supply: ContractFunction,
}

impl TokenContract {
    pub fn new(
        address: Address,
        balance_of_signature: &str,
        total_supply_signature: &str,
    ) -> Result<Self, ContractError> {
        Ok(Self {
            address,
            balance_of: ContractFunction::parse(balance_of_signature)?,
            total_supply: ContractFunction::parse(total_supply_signature)?,
        })
    }

    pub async fn balance_of(
        &self,
        node: &dyn LedgerNode,
        holder: Address,
        block: BlockId,
    ) -> Result<U256, ContractError> {
        let input = self.balance_of.encode_call(&[DynSolValue::Address(holder)]);
        let output = node.call(self.address, input, block).await?;
        single_uint(&self.balance_of, &output)
    }

    pub async fn total_supply(&self, node: &dyn LedgerNode) -> Result<U256, ContractError> {
        let input = self.total_supply.encode_call(&[]);
        let output = node.call(self.address, input, BlockId::latest()).await?;
        single_uint(&self.total_supply, &output)
    }
}

fn single_uint(function: &ContractFunction, output: &[u8]) -> Result<U256, ContractError> {
    match function.decode_output(output)? {
        DynSolValue::Tuple(values) => match values.as_slice() {
            [DynSolValue::Uint(value, _)] => Ok(*value),
            _ => Err(ContractError::UnexpectedOutput {
                function: function.signature.clone(),
                value: DynSolValue::Tuple(values),
            }),
        },
        value => Err(ContractError::UnexpectedOutput {
            function: function.signature.clone(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChain, FakeNode};
    use alloy::primitives::address;
    use std::sync::Arc;

    const TOKEN: Address = address!("baac2b4491727d78d2b78815144570b9f2fe8899");

    fn token() -> TokenContract {
        TokenContract::new(TOKEN, "balanceOf(address)(uint256)", "totalSupply()(uint256)").unwrap()
    }

    #[tokio::test]
    async fn test_balance_of_reads_holder_balance() {
        let chain = Arc::new(FakeChain::new(100));
        let holder = address!("00000000000000000000000000000000000000aa");
        chain.set_balance(holder, U256::from(5_000u64));
        let node = FakeNode::connect(chain.clone());

        let balance = token()
            .balance_of(&node, holder, BlockId::latest())
            .await
            .unwrap();

        assert_eq!(balance, U256::from(5_000u64));
    }

    #[tokio::test]
    async fn test_unknown_holder_has_zero_balance() {
        let chain = Arc::new(FakeChain::new(100));
        let node = FakeNode::connect(chain);

        let balance = token()
            .balance_of(&node, Address::repeat_byte(0x11), BlockId::latest())
            .await
            .unwrap();

        assert_eq!(balance, U256::ZERO);
    }

    #[tokio::test]
    async fn test_total_supply() {
        let chain = Arc::new(FakeChain::new(100));
        chain.set_total_supply(U256::from(10u64).pow(U256::from(27u64)));
        let node = FakeNode::connect(chain);

        let supply = token().total_supply(&node).await.unwrap();

        assert_eq!(supply, U256::from(10u64).pow(U256::from(27u64)));
    }

    #[tokio::test]
    async fn test_call_on_dead_node_is_rpc_error() {
        let chain = Arc::new(FakeChain::new(100));
        let node = FakeNode::connect(chain.clone());
        chain.sever_connections();

        let result = token().total_supply(&node).await;

        assert!(matches!(result, Err(ContractError::Rpc(_))));
    }
}
