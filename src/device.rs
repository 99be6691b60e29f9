use candle_core::Device;
use once_cell::sync::Lazy;

/// Compute device shared by training and serving. CUDA is used when candle
/// was built with it and a card is present, otherwise the CPU.
pub static DEVICE: Lazy<Device> = Lazy::new(|| match Device::new_cuda(0) {
    Ok(device) => {
        log::info!("using CUDA device 0");
        device
    }
    Err(err) => {
        log::debug!("CUDA unavailable ({err}), falling back to CPU");
        Device::Cpu
    }
});
