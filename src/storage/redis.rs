//! `RedisGraph` store.
//!
//! Graphs are driven through `GRAPH.QUERY` / `GRAPH.DELETE`; generations are
//! enumerated with `SCAN` and the metadata hash is a plain Redis hash.
//!
//! A single connection is reused per store. Commands use a response timeout
//! so an unresponsive server fails the run instead of hanging it.

use super::GraphStore;
use crate::config::TwinCacheConfig;
use crate::{Error, Result};
use redis::{Client, Commands, Connection};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Default timeout for Redis commands.
const REDIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Keys fetched per `SCAN` round trip.
const SCAN_COUNT: usize = 100;

/// Twin cache backed by a `RedisGraph` server.
pub struct RedisGraphStore {
    client: Client,
    connection: Mutex<Option<Connection>>,
}

impl RedisGraphStore {
    /// Creates a store from a `redis://` URL.
    ///
    /// The connection is opened lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(connection_url: &str) -> Result<Self> {
        let client = Client::open(connection_url).map_err(|e| Error::OperationFailed {
            operation: "redis_connect".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    /// Creates a store for the configured cache host.
    ///
    /// # Errors
    ///
    /// Returns an error if the host or password cannot form a valid URL.
    pub fn from_config(config: &TwinCacheConfig) -> Result<Self> {
        Self::new(connection_url(config)?.as_str())
    }

    /// Takes the cached connection or opens a new one.
    fn get_connection(&self) -> Result<Connection> {
        let mut guard = self.connection.lock().map_err(|e| Error::OperationFailed {
            operation: "redis_lock_connection".to_string(),
            cause: e.to_string(),
        })?;

        if let Some(conn) = guard.take() {
            return Ok(conn);
        }

        let conn = self
            .client
            .get_connection()
            .map_err(|e| Error::OperationFailed {
                operation: "redis_get_connection".to_string(),
                cause: e.to_string(),
            })?;
        conn.set_read_timeout(Some(REDIS_TIMEOUT))
            .map_err(|e| Error::operation("redis_set_read_timeout", e))?;
        conn.set_write_timeout(Some(REDIS_TIMEOUT))
            .map_err(|e| Error::operation("redis_set_write_timeout", e))?;

        Ok(conn)
    }

    fn return_connection(&self, conn: Connection) {
        if let Ok(mut guard) = self.connection.lock() {
            *guard = Some(conn);
        }
    }

    /// Runs `f` with a connection.
    ///
    /// The connection is only returned to the cache after a successful
    /// command, so a broken connection is replaced on the next call.
    fn with_connection<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
    ) -> Result<T> {
        let mut conn = self.get_connection()?;
        match f(&mut conn) {
            Ok(value) => {
                self.return_connection(conn);
                Ok(value)
            },
            Err(e) => Err(Error::operation(operation, e)),
        }
    }
}

impl GraphStore for RedisGraphStore {
    fn execute(&self, graph: &str, statement: &str) -> Result<()> {
        self.with_connection("graph_query", |conn| {
            redis::cmd("GRAPH.QUERY")
                .arg(graph)
                .arg(statement)
                .query::<redis::Value>(conn)
                .map(|_| ())
        })
    }

    fn delete_graph(&self, graph: &str) -> Result<bool> {
        self.with_connection("graph_delete", |conn| {
            let exists: bool = conn.exists(graph)?;
            if !exists {
                return Ok(false);
            }
            redis::cmd("GRAPH.DELETE")
                .arg(graph)
                .query::<redis::Value>(conn)?;
            Ok(true)
        })
    }

    fn rename_graph(&self, from: &str, to: &str) -> Result<()> {
        self.with_connection("graph_rename", |conn| conn.rename::<_, _, ()>(from, to))
    }

    fn list_graphs(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        self.with_connection("graph_list", |conn| {
            let mut names = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query(conn)?;
                names.extend(keys);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            names.sort();
            names.dedup();
            Ok(names)
        })
    }

    fn read_metadata(&self, key: &str) -> Result<HashMap<String, String>> {
        self.with_connection("metadata_read", |conn| conn.hgetall(key))
    }

    fn write_metadata(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        self.with_connection("metadata_write", |conn| {
            let mut cmd = redis::cmd("HSET");
            cmd.arg(key);
            for (field, value) in fields {
                cmd.arg(field).arg(value);
            }
            cmd.query::<redis::Value>(conn).map(|_| ())
        })
    }
}

/// Builds the `redis://` URL for a cache host.
///
/// # Errors
///
/// Returns [`Error::Config`] if the host is not a valid URL host.
pub fn connection_url(config: &TwinCacheConfig) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(&format!("redis://{}:{}", config.host, config.port))
        .map_err(|e| Error::Config(format!("invalid twin cache host '{}': {e}", config.host)))?;
    if let Some(password) = &config.password {
        url.set_password(Some(password.expose_secret()))
            .map_err(|()| Error::Config("twin cache password cannot be set on URL".to_string()))?;
    }
    Ok(url)
}

/// Escapes glob metacharacters for `SCAN MATCH`.
fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
