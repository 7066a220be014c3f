//! Compile-time backend selection. `cuda` wins over `wgpu`; without either the demos run
//! on the CPU through ndarray.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        pub type SelectedBackend = burn::backend::Cuda;
        pub type SelectedDevice = burn::backend::cuda::CudaDevice;
        const BACKEND_NAME: &str = "CUDA (NVIDIA GPU)";
    } else if #[cfg(feature = "wgpu")] {
        pub type SelectedBackend = burn::backend::Wgpu;
        pub type SelectedDevice = burn::backend::wgpu::WgpuDevice;
        const BACKEND_NAME: &str = "WGPU (GPU)";
    } else {
        pub type SelectedBackend = burn::backend::NdArray;
        pub type SelectedDevice = burn::backend::ndarray::NdArrayDevice;
        const BACKEND_NAME: &str = "NdArray (CPU)";
    }
}

/// Default device of the selected backend.
pub fn create_device() -> SelectedDevice {
    SelectedDevice::default()
}

/// Human-readable backend name for logging.
pub const fn get_backend_name() -> &'static str {
    BACKEND_NAME
}
