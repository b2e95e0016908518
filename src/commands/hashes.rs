use std::collections::HashMap;

use bytes::Bytes;
use itertools::Itertools;

use crate::client::Client;
use crate::commands::{non_empty, non_empty_pairs};
use crate::error::{Error, Result};
use crate::mapper::{self, unexpected, Mapper};
use crate::reply::Reply;
use crate::request::{Request, ToArg};

impl Client {
    /// Removes `field` from the hash. Returns true when it existed.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/hdel/>
    pub async fn hdel(&self, key: impl ToArg, field: impl ToArg) -> Result<bool> {
        self.execute(Request::new("HDEL").arg(key).arg(field), mapper::boolean())
            .await
    }

    /// Removes all `fields` from the hash. Returns how many existed.
    pub async fn hdel_many<I>(&self, key: impl ToArg, fields: I) -> Result<i64>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        let fields = non_empty("fields", fields)?;
        self.execute(
            Request::new("HDEL").arg(key).args(fields),
            mapper::integer(),
        )
        .await
    }

    /// Ref: <https://redis.io/docs/latest/commands/hexists/>
    pub async fn hexists(&self, key: impl ToArg, field: impl ToArg) -> Result<bool> {
        self.execute(
            Request::new("HEXISTS").arg(key).arg(field),
            mapper::boolean(),
        )
        .await
    }

    /// Ref: <https://redis.io/docs/latest/commands/hget/>
    pub async fn hget(&self, key: impl ToArg, field: impl ToArg) -> Result<Option<Bytes>> {
        self.execute(Request::new("HGET").arg(key).arg(field), mapper::bulk())
            .await
    }

    /// Ref: <https://redis.io/docs/latest/commands/hmget/>
    pub async fn hmget<I>(&self, key: impl ToArg, fields: I) -> Result<Vec<Option<Bytes>>>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        let fields = non_empty("fields", fields)?;
        let values = self
            .execute(
                Request::new("HMGET").arg(key).args(fields),
                mapper::multi_bulk(),
            )
            .await?;
        Ok(values.unwrap_or_default())
    }

    /// Returns every field and value of the hash. A missing key is an empty map.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/hgetall/>
    pub async fn hgetall(&self, key: impl ToArg) -> Result<HashMap<String, Bytes>> {
        self.execute(Request::new("HGETALL").arg(key), FieldValues)
            .await
    }

    /// Sets `field` to `value`. Returns 1 when the field is new, 0 when it was updated.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/hset/>
    pub async fn hset(
        &self,
        key: impl ToArg,
        field: impl ToArg,
        value: impl ToArg,
    ) -> Result<i64> {
        self.execute(
            Request::new("HSET").arg(key).arg(field).arg(value),
            mapper::integer(),
        )
        .await
    }

    /// Ref: <https://redis.io/docs/latest/commands/hmset/>
    pub async fn hmset<I, F, V>(&self, key: impl ToArg, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (F, V)>,
        F: ToArg,
        V: ToArg,
    {
        let args = non_empty_pairs("values", values)?;
        self.execute(Request::new("HMSET").arg(key).args(args), mapper::status())
            .await?;
        Ok(())
    }

    /// Sets `field` only if it does not exist yet. Returns 1 when it was set.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/hsetnx/>
    pub async fn hsetnx(
        &self,
        key: impl ToArg,
        field: impl ToArg,
        value: impl ToArg,
    ) -> Result<i64> {
        self.execute(
            Request::new("HSETNX").arg(key).arg(field).arg(value),
            mapper::integer(),
        )
        .await
    }
}

/// Pairs up a flat field/value multi-bulk.
#[derive(Debug, Clone, Copy)]
struct FieldValues;

impl Mapper for FieldValues {
    type Output = HashMap<String, Bytes>;

    fn map(self, reply: Reply) -> Result<Self::Output> {
        let items = match reply {
            Reply::MultiBulk(Some(items)) => items,
            Reply::MultiBulk(None) => return Ok(HashMap::new()),
            reply => return Err(unexpected("multi-bulk", &reply)),
        };
        if items.len() % 2 != 0 {
            return Err(Error::Mapper(
                format!("odd number of elements ({}) in field/value reply", items.len()).into(),
            ));
        }

        items
            .into_iter()
            .tuples()
            .map(|(field, value)| match (field, value) {
                (Reply::Bulk(Some(field)), Reply::Bulk(Some(value))) => {
                    Ok((String::from_utf8_lossy(&field).into_owned(), value))
                }
                (Reply::Bulk(Some(_)), value) => Err(unexpected("bulk value", &value)),
                (field, _) => Err(unexpected("bulk field", &field)),
            })
            .collect()
    }
}
