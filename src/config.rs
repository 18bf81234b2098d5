/// Configuration for the server and its completion interface.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port for the listening-socket collaborator.
    pub port: u16,
    /// Listen backlog (pending, not-yet-accepted connections).
    pub backlog: i32,
    /// Submission queue depth. The request-context table is sized to
    /// match, bounding total simultaneous intents.
    pub queue_depth: u32,
    /// Fixed capacity of each read buffer in bytes.
    pub read_buffer_size: usize,
    /// Enable TCP_NODELAY on accepted connections.
    pub tcp_nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8889,
            backlog: 1000,
            queue_depth: 256,
            read_buffer_size: 8192,
            tcp_nodelay: true,
        }
    }
}

impl Config {
    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        if self.queue_depth == 0 || !self.queue_depth.is_power_of_two() {
            return Err(crate::error::Error::RingSetup(
                "queue_depth must be > 0 and a power of two".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(crate::error::Error::RingSetup(
                "read_buffer_size must be > 0".into(),
            ));
        }
        if self.backlog <= 0 {
            return Err(crate::error::Error::RingSetup("backlog must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for [`Config`] with discoverable methods and `build()` validation.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default config values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TCP port for the listening socket.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the listen backlog.
    pub fn backlog(mut self, n: i32) -> Self {
        self.config.backlog = n;
        self
    }

    /// Set the submission queue depth. Must be a power of two.
    pub fn queue_depth(mut self, n: u32) -> Self {
        self.config.queue_depth = n;
        self
    }

    /// Set the capacity of each read buffer in bytes.
    pub fn read_buffer_size(mut self, n: usize) -> Self {
        self.config.read_buffer_size = n;
        self
    }

    /// Enable or disable TCP_NODELAY on accepted connections.
    pub fn tcp_nodelay(mut self, enable: bool) -> Self {
        self.config.tcp_nodelay = enable;
        self
    }

    /// Validate and build the final [`Config`].
    pub fn build(self) -> Result<Config, crate::error::Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn queue_depth_must_be_power_of_two() {
        assert!(ConfigBuilder::new().queue_depth(100).build().is_err());
        assert!(ConfigBuilder::new().queue_depth(0).build().is_err());
        assert!(ConfigBuilder::new().queue_depth(128).build().is_ok());
    }

    #[test]
    fn zero_read_buffer_rejected() {
        assert!(ConfigBuilder::new().read_buffer_size(0).build().is_err());
    }

    #[test]
    fn builder_sets_fields() {
        let config = ConfigBuilder::new()
            .port(0)
            .backlog(64)
            .queue_depth(64)
            .tcp_nodelay(false)
            .build()
            .unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.backlog, 64);
        assert_eq!(config.queue_depth, 64);
        assert!(!config.tcp_nodelay);
    }
}
