use std::sync::Arc;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::mapper::{self, Mapper};
use crate::request::Request;

/// Cheaply clonable handle to a command connection.
///
/// Clones share the connection and may issue commands concurrently; replies are matched to
/// callers in the order the requests were written. The connection closes when the last clone is
/// dropped.
#[derive(Debug, Clone)]
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    pub async fn connect(config: &ClientConfig) -> Result<Client> {
        let conn = Connection::connect(config).await?;
        Ok(Client {
            conn: Arc::new(conn),
        })
    }

    /// Sends `request` and projects the reply through `mapper`.
    ///
    /// ```no_run
    /// # async fn demo(client: redis_driver::Client) -> redis_driver::Result<()> {
    /// use redis_driver::{mapper, Request};
    ///
    /// let len: i64 = client
    ///     .execute(Request::new("STRLEN").arg("greeting"), mapper::integer())
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute<M: Mapper>(&self, request: Request, mapper: M) -> Result<M::Output> {
        self.conn.execute(request, mapper).await
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn is_closed(&self) -> bool {
        !self.conn.is_open()
    }

    /// Closes the shared connection for every clone.
    pub fn close(&self) {
        self.conn.close();
    }

    /// Ref: <https://redis.io/docs/latest/commands/ping/>
    pub async fn ping(&self) -> Result<String> {
        self.execute(Request::new("PING"), mapper::status()).await
    }
}
