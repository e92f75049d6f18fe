// ABI artifact lookup with an in-code minimal fallback.

use std::path::Path;

use alloy::json_abi::JsonAbi;
use tracing::{debug, warn};

pub const TOKEN_CONTRACT: &str = "EryzaToken";
pub const REGISTRY_CONTRACT: &str = "EryzaGPUSubnetManager";

/// Artifact locations relative to the search root, tried in order. `{name}` is
/// the contract name.
pub const ABI_SEARCH_PATHS: [&str; 3] = [
    "blockchain/artifacts/contracts/{name}.sol/{name}.json",
    "contract/{name}.json",
    "artifacts/{name}.json",
];

const MINIMAL_REGISTRY_ABI: &str = r#"[
  {"type":"function","name":"gpus","stateMutability":"view",
   "inputs":[{"name":"gpu_id","type":"string"}],
   "outputs":[
     {"name":"gpu_id","type":"string"},
     {"name":"owner","type":"address"},
     {"name":"current_renter","type":"address"},
     {"name":"compute_power","type":"uint256"},
     {"name":"memory_size","type":"uint256"},
     {"name":"gpu_model","type":"string"},
     {"name":"active","type":"bool"},
     {"name":"rental_start","type":"uint256"},
     {"name":"rental_end","type":"uint256"},
     {"name":"current_subnet","type":"bytes32"}]},
  {"type":"function","name":"getAllGPUIds","stateMutability":"view",
   "inputs":[],"outputs":[{"name":"","type":"string[]"}]},
  {"type":"function","name":"getAllSubnetIds","stateMutability":"view",
   "inputs":[],"outputs":[{"name":"","type":"bytes32[]"}]},
  {"type":"function","name":"subnets","stateMutability":"view",
   "inputs":[{"name":"subnet_id","type":"bytes32"}],
   "outputs":[
     {"name":"subnet_id","type":"bytes32"},
     {"name":"coordinator","type":"address"},
     {"name":"gpu_ids","type":"string[]"},
     {"name":"total_compute","type":"uint256"},
     {"name":"total_memory","type":"uint256"},
     {"name":"created_at","type":"uint256"},
     {"name":"active","type":"bool"},
     {"name":"purpose","type":"string"}]},
  {"type":"function","name":"getSystemStats","stateMutability":"view",
   "inputs":[],
   "outputs":[
     {"name":"total_gpus","type":"uint256"},
     {"name":"rented_gpus","type":"uint256"},
     {"name":"active_subnets","type":"uint256"},
     {"name":"total_compute_power","type":"uint256"}]},
  {"type":"event","name":"GPURegistered","anonymous":false,
   "inputs":[{"name":"gpuId","type":"string","indexed":false},
             {"name":"owner","type":"address","indexed":false}]},
  {"type":"event","name":"GPURented","anonymous":false,
   "inputs":[{"name":"gpuId","type":"string","indexed":false},
             {"name":"renter","type":"address","indexed":false},
             {"name":"rentalEnd","type":"uint256","indexed":false}]},
  {"type":"event","name":"SubnetCreated","anonymous":false,
   "inputs":[{"name":"subnetId","type":"bytes32","indexed":false},
             {"name":"coordinator","type":"address","indexed":false}]},
  {"type":"event","name":"GPUMetricsUpdated","anonymous":false,
   "inputs":[{"name":"gpuId","type":"string","indexed":false}]}
]"#;

const MINIMAL_TOKEN_ABI: &str = r#"[
  {"type":"function","name":"totalSupply","stateMutability":"view",
   "inputs":[],"outputs":[{"name":"","type":"uint256"}]}
]"#;

/// Hard-coded ABI for the known contracts; empty for anything else.
pub fn minimal_abi(contract_name: &str) -> JsonAbi {
    let src = match contract_name {
        REGISTRY_CONTRACT => MINIMAL_REGISTRY_ABI,
        TOKEN_CONTRACT => MINIMAL_TOKEN_ABI,
        _ => return JsonAbi::default(),
    };
    serde_json::from_str(src).unwrap_or_else(|e| {
        warn!(error = %e, contract = contract_name, "minimal ABI failed to parse");
        JsonAbi::default()
    })
}

/// Loads `{"abi": [...]}` from the first artifact path that exists under
/// `root`, falling back to [`minimal_abi`].
pub fn load_contract_abi(contract_name: &str, root: &Path) -> JsonAbi {
    for template in ABI_SEARCH_PATHS {
        let path = root.join(template.replace("{name}", contract_name));
        if !path.exists() {
            continue;
        }
        match read_artifact(&path) {
            Ok(abi) => {
                debug!(contract = contract_name, path = %path.display(), "loaded ABI artifact");
                return abi;
            }
            Err(e) => {
                debug!(error = %e, path = %path.display(), "could not load ABI artifact");
            }
        }
    }
    warn!(contract = contract_name, "using minimal ABI");
    minimal_abi(contract_name)
}

fn read_artifact(path: &Path) -> anyhow::Result<JsonAbi> {
    let s = std::fs::read_to_string(path)?;
    let mut artifact: serde_json::Value = serde_json::from_str(&s)?;
    let abi = artifact
        .get_mut("abi")
        .map(serde_json::Value::take)
        .unwrap_or_else(|| serde_json::Value::Array(vec![]));
    Ok(serde_json::from_value(abi)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_registry_abi_has_reads_and_events() {
        let abi = minimal_abi(REGISTRY_CONTRACT);
        for f in ["gpus", "getAllGPUIds", "getAllSubnetIds", "subnets", "getSystemStats"] {
            assert!(abi.function(f).is_some(), "missing function {f}");
        }
        assert!(abi.event("GPUMetricsUpdated").is_some());
        assert!(abi.event("GPURemovedFromSubnet").is_none());
    }

    #[test]
    fn unknown_contract_gets_empty_abi() {
        let abi = minimal_abi("Nope");
        assert!(abi.function("gpus").is_none());
    }

    #[test]
    fn artifact_on_search_path_wins_over_minimal() {
        let dir = tempfile::TempDir::new().unwrap();
        let artifact_dir = dir.path().join("contract");
        std::fs::create_dir_all(&artifact_dir).unwrap();
        std::fs::write(
            artifact_dir.join(format!("{TOKEN_CONTRACT}.json")),
            r#"{"contractName":"EryzaToken","abi":[
                {"type":"function","name":"decimals","stateMutability":"view",
                 "inputs":[],"outputs":[{"name":"","type":"uint8"}]}]}"#,
        )
        .unwrap();
        let abi = load_contract_abi(TOKEN_CONTRACT, dir.path());
        assert!(abi.function("decimals").is_some());
        assert!(abi.function("totalSupply").is_none());
    }

    #[test]
    fn malformed_artifact_falls_back_to_minimal() {
        let dir = tempfile::TempDir::new().unwrap();
        let artifact_dir = dir.path().join("artifacts");
        std::fs::create_dir_all(&artifact_dir).unwrap();
        std::fs::write(
            artifact_dir.join(format!("{REGISTRY_CONTRACT}.json")),
            "not json",
        )
        .unwrap();
        let abi = load_contract_abi(REGISTRY_CONTRACT, dir.path());
        assert!(abi.function("getAllGPUIds").is_some());
    }
}
