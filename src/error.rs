use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Compute program `{program}` has no entry point named `{entry_point}`")]
    MissingKernel {
        program: &'static str,
        entry_point: &'static str,
    },
    #[error("Buffer `{label}` acquired again without being released")]
    BufferAlreadyAcquired { label: &'static str },
    #[error("Failed to parse compute program `{program}`: {message}")]
    ShaderParse {
        program: &'static str,
        message: String,
    },
    #[error("Failed to read settings file: {0}")]
    Settings(#[from] std::io::Error),
    #[error("Failed to parse settings: {0}")]
    SettingsFormat(#[from] serde_json::Error),
    #[error("No suitable GPU adapter found")]
    Adapter,
    #[error("Failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("Failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("Surface has no configuration for this adapter")]
    SurfaceConfig,
    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("Failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
}
