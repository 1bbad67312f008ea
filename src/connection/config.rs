use std::time::Duration;

pub const DEFAULT_PORT: u16 = 6379;
const URL_SCHEME: &str = "redis://";

/// Store connection and pool configuration
///
/// Similar to the connection strings of Redis clients
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Store host
    pub host: String,

    /// Store port
    pub port: u16,

    /// Logical database number
    pub database: u32,

    /// Optional password
    pub password: Option<String>,

    /// Time allowed to acquire a connection from the pool
    pub connect_timeout: Duration,

    /// Maximum number of connections in pool
    pub max_connections: usize,

    /// Minimum number of connections in pool
    pub min_connections: usize,

    /// Connection idle timeout
    pub idle_timeout: Option<Duration>,

    /// Maximum connection lifetime
    pub max_lifetime: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            database: 0,
            password: None,
            connect_timeout: Duration::from_secs(30),
            max_connections: 10,
            min_connections: 1,
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
        }
    }

    /// Set the database number
    pub fn database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    /// Set the password
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set minimum connections
    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set maximum lifetime
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Parse from connection string
    ///
    /// Format: "redis://[:password@]host[:port][/database]"
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ConnectionConfig::from_url("redis://:secret@localhost:6379/2")?;
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| format!("URL must start with '{}'", URL_SCHEME))?;

        let (password, rest) = match rest.rsplit_once('@') {
            Some((auth, rest)) => {
                // Redis has no usernames; accept "user:pass" and ":pass" alike
                let password = auth.rsplit_once(':').map(|(_, p)| p).unwrap_or(auth);
                if password.is_empty() {
                    return Err("Invalid credentials format".to_string());
                }
                (Some(password), rest)
            }
            None => (None, rest),
        };

        let (host_port, database) = match rest.split_once('/') {
            Some((host_port, "")) => (host_port, 0),
            Some((host_port, db)) => (
                host_port,
                db.parse::<u32>()
                    .map_err(|_| "Invalid database number".to_string())?,
            ),
            None => (rest, 0),
        };

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| "Invalid port".to_string())?,
            ),
            None => (host_port, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }

        let mut config = Self::new(host, port).database(database);
        if let Some(password) = password {
            config = config.password(password);
        }
        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        let auth = if self.password.is_some() { ":***@" } else { "" };
        format!(
            "{}{}{}:{}/{}",
            URL_SCHEME, auth, self.host, self.port, self.database
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err("min_connections cannot exceed max_connections".to_string());
        }

        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}
