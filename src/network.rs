use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder, VarMap, linear};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    state::{ACTION_SIZE, STATE_SIZE, State},
};

/// Layer sizes of the dueling network. Saved next to the weights so a
/// loaded model is rebuilt with the shape it was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkArch {
    pub state_size: usize,
    pub action_size: usize,
    pub trunk_units: usize,
    pub head_units: usize,
}

impl Default for NetworkArch {
    fn default() -> Self {
        Self {
            state_size: STATE_SIZE,
            action_size: ACTION_SIZE,
            trunk_units: 64,
            head_units: 32,
        }
    }
}

impl NetworkArch {
    pub fn new(state_size: usize, action_size: usize) -> Self {
        Self {
            state_size,
            action_size,
            ..Default::default()
        }
    }
}

/// Dueling Q-network: a shared two-layer trunk feeding a state-value head
/// and an advantage head, recombined as `Q = V + (A - mean(A))`.
pub struct DuelingQNetwork {
    trunk: [Linear; 2],
    value_hidden: Linear,
    value_out: Linear,
    advantage_hidden: Linear,
    advantage_out: Linear,
    pub var_map: VarMap,
    arch: NetworkArch,
    device: Device,
}

impl DuelingQNetwork {
    pub fn new(arch: NetworkArch, device: &Device) -> Result<Self> {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);

        let trunk = [
            linear(arch.state_size, arch.trunk_units, vb.pp("trunk0"))?,
            linear(arch.trunk_units, arch.trunk_units, vb.pp("trunk1"))?,
        ];
        let value_hidden = linear(arch.trunk_units, arch.head_units, vb.pp("value0"))?;
        let value_out = linear(arch.head_units, 1, vb.pp("value1"))?;
        let advantage_hidden = linear(arch.trunk_units, arch.head_units, vb.pp("advantage0"))?;
        let advantage_out = linear(arch.head_units, arch.action_size, vb.pp("advantage1"))?;

        Ok(Self {
            trunk,
            value_hidden,
            value_out,
            advantage_hidden,
            advantage_out,
            var_map,
            arch,
            device: device.clone(),
        })
    }

    pub fn arch(&self) -> NetworkArch {
        self.arch
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// `(batch, state_size)` in, `(batch, action_size)` Q-values out.
    pub fn forward(&self, states: &Tensor) -> Result<Tensor> {
        let mut x = states.clone();
        for layer in self.trunk.iter() {
            x = layer.forward(&x)?.relu()?;
        }

        let value = self
            .value_out
            .forward(&self.value_hidden.forward(&x)?.relu()?)?;
        let advantage = self
            .advantage_out
            .forward(&self.advantage_hidden.forward(&x)?.relu()?)?;

        let centered = advantage.broadcast_sub(&advantage.mean_keepdim(D::Minus1)?)?;
        Ok(value.broadcast_add(&centered)?)
    }

    pub fn predict(&self, state: &State) -> Result<Vec<f32>> {
        let q_values = self.forward(&state.to_tensor(&self.device)?)?;
        Ok(q_values.squeeze(0)?.to_vec1::<f32>()?)
    }

    pub fn predict_batch(&self, states: &[&State]) -> Result<Vec<Vec<f32>>> {
        let input = State::batch_tensor(states.iter().copied(), &self.device)?;
        Ok(self.forward(&input)?.to_vec2::<f32>()?)
    }

    /// Overwrites every variable of `self` with the matching variable of
    /// `source`.
    pub fn copy_weights_from(&self, source: &DuelingQNetwork) -> Result<()> {
        if std::ptr::eq(self, source) {
            return Ok(());
        }
        let source_vars = source.var_map.data().lock().map_err(poisoned)?;
        let target_vars = self.var_map.data().lock().map_err(poisoned)?;

        for (name, source_var) in source_vars.iter() {
            if let Some(target_var) = target_vars.get(name) {
                target_var.set(source_var.as_tensor())?;
            }
        }
        Ok(())
    }

    /// Flattened copy of every named variable.
    pub fn weights(&self) -> Result<HashMap<String, Vec<f32>>> {
        let vars = self.var_map.data().lock().map_err(poisoned)?;
        let mut weights = HashMap::with_capacity(vars.len());
        for (name, var) in vars.iter() {
            weights.insert(name.clone(), var.as_tensor().flatten_all()?.to_vec1::<f32>()?);
        }
        Ok(weights)
    }

    /// Writes the weights as safetensors at `path` and the architecture as
    /// JSON at `<path>.json`. On failure neither file is left behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let result = self.write_model_files(path);
        if result.is_err() {
            for partial in [path.to_path_buf(), arch_path(path)] {
                if partial.is_file() {
                    if let Err(err) = fs::remove_file(&partial) {
                        log::warn!("could not remove partial {}: {err}", partial.display());
                    }
                }
            }
        }
        result
    }

    fn write_model_files(&self, path: &Path) -> Result<()> {
        self.var_map.save(path)?;

        let mut writer = BufWriter::new(File::create(arch_path(path))?);
        serde_json::to_writer_pretty(&mut writer, &self.arch)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path, device: &Device) -> Result<Self> {
        let sidecar = arch_path(path);
        let arch = if sidecar.exists() {
            serde_json::from_reader(BufReader::new(File::open(&sidecar)?))?
        } else {
            log::warn!(
                "no architecture file at {}, assuming the default layout",
                sidecar.display()
            );
            NetworkArch::default()
        };

        let mut network = Self::new(arch, device)?;
        network.var_map.load(path)?;
        Ok(network)
    }

    /// Independent network with the same architecture and weights.
    pub fn try_clone(&self) -> Result<Self> {
        let copy = Self::new(self.arch, &self.device)?;
        copy.copy_weights_from(self)?;
        Ok(copy)
    }
}

pub fn arch_path(model_path: &Path) -> PathBuf {
    let mut path = model_path.as_os_str().to_owned();
    path.push(".json");
    PathBuf::from(path)
}

fn poisoned<T>(_: T) -> candle_core::Error {
    candle_core::Error::Msg("variable map lock poisoned".to_string())
}
