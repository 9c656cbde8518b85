use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{keccak256, Bytes};

use super::ContractError;

/// A callable contract function described by a signature such as
/// `"balanceOf(address)(uint256)"`: inputs first, then the output tuple.
#[derive(Debug, Clone)]
pub struct ContractFunction {
    pub signature: String,
    pub selector: [u8; 4],
    pub output_type: DynSolType,
}

impl ContractFunction {
    pub fn parse(signature: &str) -> Result<Self, ContractError> {
        let signature = signature.trim();
        let split = signature
            .find(")(")
            .ok_or_else(|| ContractError::InvalidSignature(signature.to_string()))?;

        let input_sig = &signature[..=split];
        let output_sig = signature[split + 2..]
            .strip_suffix(')')
            .ok_or_else(|| ContractError::InvalidSignature(signature.to_string()))?;

        let selector_bytes = keccak256(input_sig.as_bytes());
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&selector_bytes[..4]);

        let output_type = DynSolType::parse(&format!("({})", output_sig)).map_err(|e| {
            ContractError::InvalidSignature(format!(
                "failed to parse output type '{}': {}",
                output_sig, e
            ))
        })?;

        Ok(Self {
            signature: signature.to_string(),
            selector,
            output_type,
        })
    }

    /// Selector followed by the ABI-encoded parameters.
    pub fn encode_call(&self, params: &[DynSolValue]) -> Bytes {
        let mut calldata = self.selector.to_vec();

        if !params.is_empty() {
            let tuple = DynSolValue::Tuple(params.to_vec());
            calldata.extend(tuple.abi_encode_params());
        }

        Bytes::from(calldata)
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<DynSolValue, ContractError> {
        self.output_type
            .abi_decode_params(data)
            .map_err(|e| ContractError::Decode(format!("{}: {}", self.signature, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, U256};

    #[test]
    fn test_parse_balance_of() {
        let function = ContractFunction::parse("balanceOf(address)(uint256)").unwrap();
        assert_eq!(hex::encode(function.selector), "70a08231");
        assert_eq!(
            function.output_type,
            DynSolType::Tuple(vec![DynSolType::Uint(256)])
        );
    }

    #[test]
    fn test_parse_total_supply() {
        let function = ContractFunction::parse("totalSupply()(uint256)").unwrap();
        assert_eq!(hex::encode(function.selector), "18160ddd");
        assert_eq!(function.encode_call(&[]).len(), 4);
    }

    #[test]
    fn test_missing_output_is_rejected() {
        assert!(matches!(
            ContractFunction::parse("balanceOf(address)"),
            Err(ContractError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_encode_and_decode() {
        let function = ContractFunction::parse("balanceOf(address)(uint256)").unwrap();
        let holder = address!("00000000000000000000000000000000000000aa");
        let calldata = function.encode_call(&[DynSolValue::Address(holder)]);

        assert_eq!(calldata.len(), 36);
        assert_eq!(&calldata[..4], &function.selector);
        assert_eq!(&calldata[16..36], holder.as_slice());

        let output = U256::from(1234u64).to_be_bytes::<32>();
        let decoded = function.decode_output(&output).unwrap();
        assert_eq!(
            decoded,
            DynSolValue::Tuple(vec![DynSolValue::Uint(U256::from(1234u64), 256)])
        );
    }

    #[test]
    fn test_short_output_fails_to_decode() {
        let function = ContractFunction::parse("balanceOf(address)(uint256)").unwrap();
        assert!(function.decode_output(&[0u8; 7]).is_err());
    }
}
