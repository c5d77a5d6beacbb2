use thiserror::Error;

/// Backend-internal failure conditions.
///
/// Public operations do not surface these to the caller: recoverable
/// conditions degrade locally (the operation is skipped and logged), matching
/// the permissive semantics of the emulated API. Only construction reports
/// errors to the caller.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no suitable GPU adapter found")]
    AdapterNotFound,
    #[error("request_device failed: {0}")]
    RequestDevice(String),
    #[error("native device is in an error state")]
    DeviceFault,
    #[error("memory region `{region}` exhausted ({requested} bytes requested)")]
    RegionExhausted { region: &'static str, requested: u64 },
    #[error("descriptor budget `{region}` exhausted")]
    DescriptorBudgetExhausted { region: &'static str },
    #[error("handle {handle} out of range for {table} table")]
    HandleOutOfRange { table: &'static str, handle: u32 },
    #[error("unknown {table} handle {handle}")]
    UnknownHandle { table: &'static str, handle: u32 },
    #[error("shader blob {path}: {source}")]
    ShaderBlobIo {
        path: String,
        source: std::io::Error,
    },
    #[error("shader blob {path} is empty")]
    ShaderBlobEmpty { path: String },
    #[error("cubemap {handle} is incomplete (face mask {mask:#08b})")]
    IncompleteCubemap { handle: u32, mask: u8 },
    #[error("vertex attribute {index} has an unsupported layout ({detail})")]
    UnsupportedAttribute { index: u32, detail: String },
    #[error("readback map failed: {0}")]
    ReadbackMap(String),
    #[error("draw skipped: {0}")]
    DrawSkipped(&'static str),
}
