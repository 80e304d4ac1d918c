use tokio::time::Duration;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    // Stack size of the thread that runs the task, in MiB. Platform default when unset.
    pub stack_size_mb: Option<usize>,
}

impl ResourceLimits {
    pub fn stack_size_bytes(&self) -> Option<usize> {
        self.stack_size_mb.map(|mb| mb * 1024 * 1024)
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    // Number of workers the pool keeps alive for its whole lifetime.
    pub party_size: usize,
    // Limits applied uniformly to every worker.
    pub resource_limits: ResourceLimits,
    // How often the retry scheduler attempts to dispatch a queued task.
    pub retry_interval: Duration,
}

impl PoolConfig {
    pub fn new(party_size: usize) -> Self {
        Self {
            party_size,
            resource_limits: ResourceLimits::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_resource_limits(mut self, resource_limits: ResourceLimits) -> Self {
        self.resource_limits = resource_limits;
        self
    }
}
