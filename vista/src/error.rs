use thiserror::Error;

/// Reason why the worker pool failed to start.
#[derive(Error, Debug)]
pub enum ThreadPoolError {
    #[error("Failed to build the worker thread pool")]
    Build(#[source] rayon::ThreadPoolBuildError),
}

/// Reason why a culling manager failed to initialize.
#[derive(Error, Debug)]
pub enum CullingError {
    #[error("Failed to create the culling thread pool")]
    ThreadPool(#[from] ThreadPoolError),
}

/// Reason why a material buffer manager can not serve a blueprint.
#[derive(Error, Debug)]
pub enum MaterialBufferError {
    #[error("The material uniform buffer has a per element size of zero bytes")]
    EmptyElement,
    #[error("A material uniform buffer element needs {bytes_per_element} bytes but pool buffers only hold {buffer_size}")]
    ElementTooLarge { bytes_per_element: u32, buffer_size: u64 },
    #[error("Packed material properties need {packed_bytes} bytes but the declared element is {bytes_per_element} bytes")]
    LayoutOverflow { packed_bytes: u32, bytes_per_element: u32 },
}
