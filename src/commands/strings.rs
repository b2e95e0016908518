use bytes::Bytes;

use crate::client::Client;
use crate::commands::{non_empty, non_empty_pairs};
use crate::error::{BoxError, Result};
use crate::mapper;
use crate::request::{Request, ToArg};

impl Client {
    /// Returns the value of `key`, or `None` when it does not exist.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/get/>
    pub async fn get(&self, key: impl ToArg) -> Result<Option<Bytes>> {
        self.execute(Request::new("GET").arg(key), mapper::bulk())
            .await
    }

    /// Like [`Client::get`], with the value converted by `f`.
    pub async fn get_with<F, T, E>(&self, key: impl ToArg, f: F) -> Result<Option<T>>
    where
        F: FnOnce(Bytes) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        self.execute(Request::new("GET").arg(key), mapper::bulk_with(f))
            .await
    }

    /// Returns the values of all `keys`, with `None` for keys that do not exist.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/mget/>
    pub async fn mget<I>(&self, keys: I) -> Result<Vec<Option<Bytes>>>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        let keys = non_empty("keys", keys)?;
        let values = self
            .execute(Request::new("MGET").args(keys), mapper::multi_bulk())
            .await?;
        Ok(values.unwrap_or_default())
    }

    /// Like [`Client::mget`], with every existing value converted by `f`.
    pub async fn mget_with<I, F, T, E>(&self, keys: I, f: F) -> Result<Vec<Option<T>>>
    where
        I: IntoIterator,
        I::Item: ToArg,
        F: FnMut(Bytes) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        let keys = non_empty("keys", keys)?;
        let values = self
            .execute(Request::new("MGET").args(keys), mapper::multi_bulk_with(f))
            .await?;
        Ok(values.unwrap_or_default())
    }

    /// Ref: <https://redis.io/docs/latest/commands/set/>
    pub async fn set(&self, key: impl ToArg, value: impl ToArg) -> Result<()> {
        self.execute(Request::new("SET").arg(key).arg(value), mapper::status())
            .await?;
        Ok(())
    }

    /// Sets every key to its value in one round trip.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/mset/>
    pub async fn mset<I, K, V>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: ToArg,
        V: ToArg,
    {
        let args = non_empty_pairs("values", pairs)?;
        self.execute(Request::new("MSET").args(args), mapper::status())
            .await?;
        Ok(())
    }

    /// Appends `value` and returns the length of the string after the append.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/append/>
    pub async fn append(&self, key: impl ToArg, value: impl ToArg) -> Result<i64> {
        self.execute(
            Request::new("APPEND").arg(key).arg(value),
            mapper::integer(),
        )
        .await
    }

    /// Ref: <https://redis.io/docs/latest/commands/getbit/>
    pub async fn getbit(&self, key: impl ToArg, offset: u32) -> Result<u8> {
        self.execute(
            Request::new("GETBIT").arg(key).arg(offset),
            mapper::integer(),
        )
        .await
    }
}
