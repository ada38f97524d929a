//! Print the typed-data schema off-chain signers need.
//!
//! With `ENGINE_CHAIN_ID` and `ENGINE_VERIFYING_CONTRACT` set (or in `.env`),
//! the bound domain and its separator are included.

use anyhow::Context;
use order_core::config::EngineConfig;
use order_core::signing::typed_data_schema;
use serde_json::json;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    conditional_orders::init_tracing("order_schema=info,order_core=info");

    let mut document = typed_data_schema();

    match EngineConfig::from_env() {
        Ok(config) => {
            let domain = config.domain.bind().context("Invalid engine domain")?;
            info!(
                chain_id = %domain.chain_id(),
                verifying_contract = %domain.verifying_contract(),
                "Bound engine domain"
            );
            document["domain"] = serde_json::to_value(&domain)?;
            document["domainSeparator"] = json!(domain.separator());
            document["maxConditions"] = json!(config.max_conditions);
        }
        Err(e) => warn!(error = %e, "No engine domain configured, printing types only"),
    }

    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
