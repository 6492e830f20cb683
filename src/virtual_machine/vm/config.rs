use super::host::HostCallHandler;
use super::registers::NUM_REGISTERS;
use crate::virtual_machine::errors::VMError;

/// Construction-time options for a [`VM`](super::VM).
///
/// Both options are off by default: no magic header is required and
/// `HOST_CALL` fails with [`HostCallHandlerNotSet`](crate::virtual_machine::errors::VMError::HostCallHandlerNotSet).
#[derive(Default)]
pub struct VmConfig {
    /// Byte prefix every program must start with. Execution begins right after it.
    pub magic_header: Vec<u8>,
    /// Handler for `HOST_CALL`.
    pub host_call_handler: Option<Box<dyn HostCallHandler>>,
}

impl VmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires programs to start with `header`.
    pub fn with_magic_header(mut self, header: impl Into<Vec<u8>>) -> Self {
        self.magic_header = header.into();
        self
    }

    /// Installs the handler invoked by `HOST_CALL`.
    pub fn with_host_call_handler(mut self, handler: impl HostCallHandler + 'static) -> Self {
        self.host_call_handler = Some(Box::new(handler));
        self
    }

    /// Installs a closure as the `HOST_CALL` handler.
    ///
    /// Same as [`with_host_call_handler`](Self::with_host_call_handler), but the
    /// closure's argument types are inferred.
    pub fn with_host_fn<F>(self, handler: F) -> Self
    where
        F: FnMut(i64, u8, u8, &[i64; NUM_REGISTERS]) -> Result<i64, VMError> + 'static,
    {
        self.with_host_call_handler(handler)
    }
}

impl std::fmt::Debug for VmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmConfig")
            .field("magic_header", &self.magic_header)
            .field("host_call_handler", &self.host_call_handler.is_some())
            .finish()
    }
}
