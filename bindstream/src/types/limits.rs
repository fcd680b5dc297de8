//! Device limits and context configuration.

use std::time::Duration;

use super::target::SlotKind;

/// Limits of a device, queried once when a context is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLimits {
    /// Maximum combined texture image units.
    pub max_texture_units: u32,
    /// Maximum indexed uniform buffer bindings.
    pub max_uniform_buffer_bindings: u32,
    /// Maximum indexed shader storage bindings. `0` if unsupported.
    pub max_storage_buffer_bindings: u32,
    /// Maximum buffer size in bytes.
    pub max_buffer_size: u64,
    /// Whether buffers can stay mapped while in use by draw calls.
    pub persistent_mapping: bool,
    /// Whether double precision vertex attributes are supported.
    pub double_vertex_attributes: bool,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_units: 32,
            max_uniform_buffer_bindings: 36,
            max_storage_buffer_bindings: 16,
            max_buffer_size: 1 << 30, // 1 GB
            persistent_mapping: true,
            double_vertex_attributes: true,
        }
    }
}

impl DeviceLimits {
    /// Number of slots available for the given slot kind.
    pub fn slot_count(&self, kind: SlotKind) -> u32 {
        match kind {
            SlotKind::TextureUnit => self.max_texture_units,
            SlotKind::UniformBuffer => self.max_uniform_buffer_bindings,
            SlotKind::ShaderStorage => self.max_storage_buffer_bindings,
        }
    }
}

/// How a full slot table picks the slot to reassign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvictionPolicy {
    /// Always take the slot after the cursor, evicting whatever is there.
    #[default]
    RoundRobin,
    /// Take the first vacant or stale slot after the cursor, falling back to
    /// round robin when every slot holds a live occupant.
    PreferVacant,
}

/// Per-context tuning that is not queried from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Streaming buffer growth step, in items.
    pub stream_increment: u64,
    /// Slot reassignment policy for every slot table.
    pub eviction_policy: EvictionPolicy,
    /// How long the creation worker sleeps between queue checks.
    pub worker_poll_interval: Duration,
    /// How long dropping a creation worker waits for it to exit.
    pub worker_shutdown_timeout: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            stream_increment: 1024,
            eviction_policy: EvictionPolicy::RoundRobin,
            worker_poll_interval: Duration::from_millis(50),
            worker_shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl ContextConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the streaming growth step.
    pub fn with_stream_increment(mut self, items: u64) -> Self {
        self.stream_increment = items;
        self
    }

    /// Set the slot eviction policy.
    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Set the creation worker poll interval.
    pub fn with_worker_poll_interval(mut self, interval: Duration) -> Self {
        self.worker_poll_interval = interval;
        self
    }

    /// Set the creation worker shutdown timeout used on drop.
    pub fn with_worker_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.worker_shutdown_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_count() {
        let limits = DeviceLimits {
            max_storage_buffer_bindings: 0,
            ..DeviceLimits::default()
        };
        assert_eq!(limits.slot_count(SlotKind::TextureUnit), 32);
        assert_eq!(limits.slot_count(SlotKind::ShaderStorage), 0);
    }

    #[test]
    fn test_config_builder() {
        let config = ContextConfig::new()
            .with_stream_increment(256)
            .with_eviction_policy(EvictionPolicy::PreferVacant);
        assert_eq!(config.stream_increment, 256);
        assert_eq!(config.eviction_policy, EvictionPolicy::PreferVacant);
        assert_eq!(config.worker_poll_interval, Duration::from_millis(50));
    }
}
