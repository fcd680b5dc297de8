//! Common utilities for bindstream integration tests.
//!
//! Every test gets its own [`DummyBackend`] so call counts never leak
//! between tests, and a context that is already current on the test thread.

use std::sync::Arc;

use bindstream::{
    BufferDescriptor, BufferUsage, ContextConfig, DeviceContext, DeviceLimits, DummyBackend,
    ResourceHandle, TextureDescriptor,
};

/// Install the test logger once per process.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// A current context on a recording backend.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub context: DeviceContext,
}

impl TestContext {
    /// Default limits and configuration.
    pub fn new() -> Self {
        Self::with(DeviceLimits::default(), ContextConfig::default())
    }

    /// Custom limits and configuration.
    pub fn with(limits: DeviceLimits, config: ContextConfig) -> Self {
        init_logging();
        let backend = Arc::new(DummyBackend::with_limits(limits));
        let context =
            DeviceContext::new(backend.clone(), config).expect("Failed to create context");
        context.make_current().expect("Failed to make context current");
        Self { backend, context }
    }

    /// Create a live 2D texture.
    #[allow(dead_code)]
    pub fn texture(&self, label: &str) -> ResourceHandle {
        self.context
            .create_resource(TextureDescriptor::new_2d(8, 8).with_label(label))
            .expect("Failed to create texture")
    }

    /// Create a live buffer.
    #[allow(dead_code)]
    pub fn buffer(&self, usage: BufferUsage) -> ResourceHandle {
        self.context
            .create_resource(BufferDescriptor::new(256, usage))
            .expect("Failed to create buffer")
    }
}

/// Limits with `texture_units` texture slots.
#[allow(dead_code)]
pub fn texture_limits(texture_units: u32) -> DeviceLimits {
    DeviceLimits {
        max_texture_units: texture_units,
        ..DeviceLimits::default()
    }
}
