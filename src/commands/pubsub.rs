use crate::client::Client;
use crate::error::Result;
use crate::mapper;
use crate::request::{Request, ToArg};

impl Client {
    /// Posts `message` to `channel`. Returns the number of subscribers that received it.
    ///
    /// Receiving is done on a dedicated connection, see [`Subscriber`](crate::Subscriber).
    ///
    /// Ref: <https://redis.io/docs/latest/commands/publish/>
    pub async fn publish(&self, channel: impl ToArg, message: impl ToArg) -> Result<i64> {
        self.execute(
            Request::new("PUBLISH").arg(channel).arg(message),
            mapper::integer(),
        )
        .await
    }
}
