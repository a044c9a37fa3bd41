//! Audio device inventory for setup checks

use cpal::traits::{DeviceTrait, HostTrait};

use crate::{Error, Result};

/// Names of the devices visible to the default host
#[derive(Debug, Clone, Default)]
pub struct DeviceInventory {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub default_input: Option<String>,
    pub default_output: Option<String>,
}

impl DeviceInventory {
    /// Whether a conversation can run on this machine
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.default_input.is_some() && self.default_output.is_some()
    }
}

/// Enumerate input and output devices on the default host
///
/// # Errors
///
/// Returns `Error::Device` if the host cannot enumerate devices
pub fn list_devices() -> Result<DeviceInventory> {
    let host = cpal::default_host();

    let inputs = host
        .input_devices()
        .map_err(|e| Error::Device(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();
    let outputs = host
        .output_devices()
        .map_err(|e| Error::Device(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();

    let inventory = DeviceInventory {
        inputs,
        outputs,
        default_input: host.default_input_device().and_then(|d| d.name().ok()),
        default_output: host.default_output_device().and_then(|d| d.name().ok()),
    };

    tracing::debug!(
        inputs = inventory.inputs.len(),
        outputs = inventory.outputs.len(),
        "enumerated audio devices"
    );
    Ok(inventory)
}
