//! Typed wrappers over [`Client::execute`](crate::client::Client::execute), grouped by data type.
//!
//! Every wrapper validates its arguments before touching the connection: an empty key, field or
//! pair list is an [`Error::Argument`] and nothing is sent.

pub mod hashes;
pub mod keys;
pub mod lists;
pub mod pubsub;
pub mod strings;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::request::ToArg;

/// Converts `items` into arguments, rejecting an empty list.
pub(crate) fn non_empty<I>(what: &str, items: I) -> Result<Vec<Bytes>>
where
    I: IntoIterator,
    I::Item: ToArg,
{
    let args: Vec<Bytes> = items.into_iter().map(|item| item.to_arg()).collect();
    if args.is_empty() {
        return Err(Error::argument(format!("{} is empty", what)));
    }
    Ok(args)
}

/// Flattens `pairs` into alternating arguments, rejecting an empty list.
pub(crate) fn non_empty_pairs<I, K, V>(what: &str, pairs: I) -> Result<Vec<Bytes>>
where
    I: IntoIterator<Item = (K, V)>,
    K: ToArg,
    V: ToArg,
{
    let args: Vec<Bytes> = pairs
        .into_iter()
        .flat_map(|(key, value)| [key.to_arg(), value.to_arg()])
        .collect();
    if args.is_empty() {
        return Err(Error::argument(format!("{} is empty", what)));
    }
    Ok(args)
}
