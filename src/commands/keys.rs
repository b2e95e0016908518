use crate::client::Client;
use crate::commands::non_empty;
use crate::error::Result;
use crate::mapper;
use crate::request::{Request, ToArg};

impl Client {
    /// Removes `key`. Returns the number of keys removed.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/del/>
    pub async fn del(&self, key: impl ToArg) -> Result<i64> {
        self.execute(Request::new("DEL").arg(key), mapper::integer())
            .await
    }

    /// Removes all `keys`. Returns the number of keys removed.
    pub async fn del_many<I>(&self, keys: I) -> Result<i64>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        let keys = non_empty("keys", keys)?;
        self.execute(Request::new("DEL").args(keys), mapper::integer())
            .await
    }

    /// Returns all keys matching `pattern`.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/keys/>
    pub async fn keys(&self, pattern: impl ToArg) -> Result<Vec<String>> {
        let keys = self
            .execute(
                Request::new("KEYS").arg(pattern),
                mapper::multi_bulk_with(mapper::utf8),
            )
            .await?;
        Ok(keys.unwrap_or_default().into_iter().flatten().collect())
    }

    /// Sets a timeout on `key`. Returns false when the key does not exist.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/expire/>
    pub async fn expire(&self, key: impl ToArg, seconds: u64) -> Result<bool> {
        self.execute(
            Request::new("EXPIRE").arg(key).arg(seconds),
            mapper::boolean(),
        )
        .await
    }
}
