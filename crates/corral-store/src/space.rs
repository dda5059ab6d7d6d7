//! Memory-space tags carried in the container type.
//!
//! A container's space decides where its storage logically lives and
//! which execution policy its parallel loops use. Moving between spaces
//! is always an explicit deep copy through `mirror`.

mod sealed {
    pub trait Sealed {}
}

/// A memory domain a container can live in.
pub trait MemorySpace: sealed::Sealed + Send + Sync + 'static {
    /// Display name for logs.
    const NAME: &'static str;
    /// Whether parallel loops fan out across worker threads.
    const CONCURRENT: bool;
}

/// Host-resident storage. Parallel loops run on the calling thread,
/// which keeps diagnostics and checkpoint staging deterministic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostSpace;

/// Compute-resident storage. Parallel loops fan out across blocks on
/// the rayon pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceSpace;

impl sealed::Sealed for HostSpace {}
impl sealed::Sealed for DeviceSpace {}

impl MemorySpace for HostSpace {
    const NAME: &'static str = "host";
    const CONCURRENT: bool = false;
}

impl MemorySpace for DeviceSpace {
    const NAME: &'static str = "device";
    const CONCURRENT: bool = true;
}
