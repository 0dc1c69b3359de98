use std::str::FromStr;

use anyhow::{Result, anyhow};
use candle_core::Device;
use tracing::{debug, info};

/// Where model inference runs, from `embedding.device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    /// Best accelerator compiled in, else CPU.
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl FromStr for DevicePreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "metal" | "mps" => Ok(Self::Metal),
            other => Err(anyhow!("unknown embedding device '{other}' (expected auto, cpu, cuda or metal)")),
        }
    }
}

/// Resolve a preference to a device. An explicit accelerator that is not
/// compiled in or fails to initialize is an error; `Auto` falls back to CPU.
pub fn select_device(pref: DevicePreference) -> Result<Device> {
    let device = match pref {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => cuda()?,
        DevicePreference::Metal => metal()?,
        DevicePreference::Auto => cuda().or_else(|e| {
            debug!(error = %e, "cuda not usable");
            metal()
        }).unwrap_or_else(|e| {
            debug!(error = %e, "metal not usable");
            Device::Cpu
        }),
    };
    info!(?pref, device = describe(&device), "embedding device selected");
    Ok(device)
}

fn describe(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

#[cfg(feature = "cuda")]
fn cuda() -> Result<Device> { Ok(Device::new_cuda(0)?) }

#[cfg(not(feature = "cuda"))]
fn cuda() -> Result<Device> { anyhow::bail!("built without the `cuda` feature") }

#[cfg(feature = "metal")]
fn metal() -> Result<Device> { Ok(Device::new_metal(0)?) }

#[cfg(not(feature = "metal"))]
fn metal() -> Result<Device> { anyhow::bail!("built without the `metal` feature") }
