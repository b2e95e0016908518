use crate::client::Client;
use crate::commands::non_empty;
use crate::error::Result;
use crate::mapper;
use crate::request::{Request, ToArg};

impl Client {
    /// Prepends `value` to the list. Returns the length of the list after the push.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/lpush/>
    pub async fn lpush(&self, key: impl ToArg, value: impl ToArg) -> Result<i64> {
        self.execute(Request::new("LPUSH").arg(key).arg(value), mapper::integer())
            .await
    }

    /// Prepends all `values`, leftmost first, so the last one ends up at the head.
    pub async fn lpush_many<I>(&self, key: impl ToArg, values: I) -> Result<i64>
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        let values = non_empty("values", values)?;
        self.execute(
            Request::new("LPUSH").arg(key).args(values),
            mapper::integer(),
        )
        .await
    }
}
