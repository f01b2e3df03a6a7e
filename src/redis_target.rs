//! Redis-backed command execution and memory measurement.

use std::time::Duration;

use tracing::trace;

use crate::command::{CommandExecutor, Reply, Row, TableCommand};
use crate::error::{ProfilerError, Result};
use crate::metrics::{MemoryStats, MetricSource};
use crate::service::ServiceConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A blocking connection to the table service
pub struct RedisTarget {
    connection: redis::Connection,
}

impl RedisTarget {
    /// Open a connection to the configured service
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnreachable` if the connection cannot be established.
    pub fn connect(config: &ServiceConfig) -> Result<Self> {
        let connection = redis::Client::open(config.url())
            .and_then(|client| client.get_connection_with_timeout(CONNECT_TIMEOUT))
            .map_err(|e| {
                ProfilerError::service_unreachable(format!("{}: {e}", config.url()))
            })?;
        Ok(Self { connection })
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Flatten one selected row; `None` marks a row that vanished mid-scan.
fn into_row(value: redis::Value) -> Option<Row> {
    match value {
        redis::Value::Array(fields) => Some(Row::from_flat(
            fields
                .into_iter()
                .filter_map(|field| match field {
                    redis::Value::BulkString(bytes) => Some(text(&bytes)),
                    redis::Value::SimpleString(s) => Some(s),
                    redis::Value::Int(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        )),
        _ => None,
    }
}

fn into_reply(command: &TableCommand, value: redis::Value) -> Result<Reply> {
    match value {
        redis::Value::Nil => Ok(Reply::Nil),
        redis::Value::Okay => Ok(Reply::Status("OK".to_string())),
        redis::Value::SimpleString(s) => Ok(Reply::Status(s)),
        redis::Value::BulkString(bytes) => Ok(Reply::Text(text(&bytes))),
        redis::Value::Int(n) => Ok(Reply::Integer(n)),
        redis::Value::Array(items) => Ok(Reply::Rows(items.into_iter().filter_map(into_row).collect())),
        other => Err(ProfilerError::command(
            command.name(),
            format!("unsupported reply type: {other:?}"),
        )),
    }
}

impl CommandExecutor for RedisTarget {
    fn execute(&mut self, command: &TableCommand) -> Result<Reply> {
        trace!(%command, "execute");
        let mut cmd = redis::cmd(command.name());
        for arg in command.args() {
            cmd.arg(arg);
        }
        let value: redis::Value = cmd
            .query(&mut self.connection)
            .map_err(|e| ProfilerError::command(command.name(), e.to_string()))?;
        into_reply(command, value)
    }
}

impl MetricSource for RedisTarget {
    fn memory_stats(&mut self) -> Result<MemoryStats> {
        let payload: String = redis::cmd("INFO")
            .arg("memory")
            .query(&mut self.connection)
            .map_err(|e| ProfilerError::unavailable_metric(format!("INFO memory failed: {e}")))?;
        MemoryStats::parse_info(&payload)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]

    use super::*;

    fn bulk(s: &str) -> redis::Value {
        redis::Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_select_reply_becomes_rows() {
        let value = redis::Value::Array(vec![
            redis::Value::Array(vec![bulk("ID"), bulk("1"), bulk("VALUE"), bulk("10")]),
            redis::Value::Nil,
            redis::Value::Array(vec![bulk("ID"), bulk("2")]),
        ]);
        let command = TableCommand::Select {
            table: "test.data".to_string(),
            predicate: None,
        };
        let Reply::Rows(rows) = into_reply(&command, value).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("VALUE"), Some("10"));
        assert_eq!(rows[1].get("ID"), Some("2"));
    }

    #[test]
    fn test_scalar_replies() {
        let command = TableCommand::FlushAll;
        assert_eq!(
            into_reply(&command, redis::Value::Okay).unwrap(),
            Reply::Status("OK".to_string())
        );
        assert_eq!(
            into_reply(&command, redis::Value::Int(4)).unwrap(),
            Reply::Integer(4)
        );
        assert_eq!(
            into_reply(&command, bulk("row:17")).unwrap(),
            Reply::Text("row:17".to_string())
        );
    }

    #[test]
    fn test_connect_to_closed_port_is_unreachable() {
        // Port 1 is privileged and never runs redis in test environments.
        let config = ServiceConfig::default().with_port(1);
        let err = RedisTarget::connect(&config).err().unwrap();
        assert!(matches!(err, ProfilerError::ServiceUnreachable { .. }));
    }
}
