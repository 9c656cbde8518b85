use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use serde::Deserialize;

const DEFAULT_BALANCE_OF: &str = "balanceOf(address)(uint256)";
const DEFAULT_TOTAL_SUPPLY: &str = "totalSupply()(uint256)";

/// Configuration for an event to decode
/// Signature format: "Transfer(address indexed from, address indexed to, uint256 value)"
#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    /// Full ABI signature string
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfigRaw {
    pub address: Address,
    /// JSON ABI file, relative to the config file
    pub abi_path: Option<String>,
    /// Inline event signatures, used when no ABI file is given
    #[serde(default)]
    pub events: Option<Vec<EventConfig>>,
    pub balance_of: Option<String>,
    pub total_supply: Option<String>,
}

/// Where the contract's event definitions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceSource {
    AbiFile(PathBuf),
    Signatures(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ContractConfig {
    pub address: Address,
    pub interface: InterfaceSource,
    pub balance_of_signature: String,
    pub total_supply_signature: String,
}

pub fn resolve_contract_config(
    raw: ContractConfigRaw,
    base_dir: &Path,
) -> anyhow::Result<ContractConfig> {
    let interface = match (raw.abi_path, raw.events) {
        (Some(path), _) => InterfaceSource::AbiFile(base_dir.join(path)),
        (None, Some(events)) if !events.is_empty() => {
            InterfaceSource::Signatures(events.into_iter().map(|e| e.signature).collect())
        }
        _ => anyhow::bail!(
            "Contract {} needs either an abi_path or a non-empty events list",
            raw.address
        ),
    };

    Ok(ContractConfig {
        address: raw.address,
        interface,
        balance_of_signature: raw
            .balance_of
            .unwrap_or_else(|| DEFAULT_BALANCE_OF.to_string()),
        total_supply_signature: raw
            .total_supply
            .unwrap_or_else(|| DEFAULT_TOTAL_SUPPLY.to_string()),
    })
}
