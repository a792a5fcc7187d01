//! Safetensors persistence of a model's variable map.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use tracing::info;

pub fn save_checkpoint(varmap: &VarMap, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating checkpoint directory {}", parent.display()))?;
    }
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("variable map lock poisoned"))?;
    let named: HashMap<String, Tensor> = data
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
        .collect();
    candle_core::safetensors::save(&named, path)
        .with_context(|| format!("writing checkpoint {}", path.display()))?;
    info!(path = %path.display(), params = named.len(), "saved checkpoint");
    Ok(())
}

/// Restore every variable of `varmap` from `path`. Missing variables are an
/// error so a checkpoint from a different model shape is never half-loaded.
pub fn load_checkpoint(varmap: &VarMap, path: &Path, device: &Device) -> Result<()> {
    let tensors = candle_core::safetensors::load(path, device)
        .with_context(|| format!("reading checkpoint {}", path.display()))?;
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("variable map lock poisoned"))?;

    for (name, var) in data.iter() {
        let saved = tensors
            .get(name)
            .ok_or_else(|| anyhow!("checkpoint {} has no tensor {name:?}", path.display()))?;
        var.set(saved)
            .with_context(|| format!("restoring {name:?} from {}", path.display()))?;
    }
    info!(path = %path.display(), params = data.len(), "loaded checkpoint");
    Ok(())
}
