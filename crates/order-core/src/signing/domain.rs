//! EIP-712 domain binding.
//!
//! A [`Domain`] ties every signature to one deployment: the engine's name and
//! version, the chain it lives on and its own address. The separator is
//! computed once at construction and the domain cannot be mutated afterwards.

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;
use serde::Serialize;

use crate::{Error, Result};

/// Canonical type string of the domain struct.
pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Chain ID of local hardhat/anvil devnets.
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Chain ID for Optimism mainnet.
pub const OPTIMISM_CHAIN_ID: u64 = 10;

/// EIP-712 domain bound to a single engine deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    name: String,
    version: String,
    chain_id: U256,
    verifying_contract: Address,
    #[serde(skip)]
    separator: B256,
}

impl Domain {
    /// Bind a domain.
    ///
    /// A zero verifying contract is rejected: a signature bound to the zero
    /// address would be valid for any deployment that forgot to set it.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        chain_id: u64,
        verifying_contract: Address,
    ) -> Result<Self> {
        if verifying_contract == Address::ZERO {
            return Err(Error::Domain {
                message: "verifying contract must not be the zero address".to_string(),
            });
        }

        let name = name.into();
        let version = version.into();
        let chain_id = U256::from(chain_id);
        let separator = compute_separator(&name, &version, chain_id, verifying_contract);

        Ok(Self {
            name,
            version,
            chain_id,
            verifying_contract,
            separator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn chain_id(&self) -> U256 {
        self.chain_id
    }

    pub fn verifying_contract(&self) -> Address {
        self.verifying_contract
    }

    /// The EIP-712 domain separator hash.
    pub fn separator(&self) -> B256 {
        self.separator
    }
}

/// keccak256(typeHash ++ keccak256(name) ++ keccak256(version) ++ chainId ++ verifyingContract)
fn compute_separator(name: &str, version: &str, chain_id: U256, verifying_contract: Address) -> B256 {
    let domain_type_hash = keccak256(DOMAIN_TYPE.as_bytes());
    let name_hash = keccak256(name.as_bytes());
    let version_hash = keccak256(version.as_bytes());

    // Addresses are left-padded to a full word.
    let contract_padded = B256::left_padding_from(verifying_contract.as_slice());

    let encoded = (
        domain_type_hash,
        name_hash,
        version_hash,
        chain_id,
        contract_padded,
    )
        .abi_encode_packed();

    keccak256(&encoded)
}
