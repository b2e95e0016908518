//! Projections from a decoded [`Reply`] into the typed result a command promises.
//!
//! Error replies never reach a mapper, the executor turns them into [`Error::Server`] first. Any
//! other shape a mapper does not expect is reported as [`Error::UnexpectedReply`].

use std::marker::PhantomData;

use bytes::Bytes;
use num_traits::NumCast;

use crate::error::{BoxError, Error, Result};
use crate::reply::Reply;

pub trait Mapper {
    type Output;

    fn map(self, reply: Reply) -> Result<Self::Output>;
}

pub(crate) fn unexpected(expected: &'static str, reply: &Reply) -> Error {
    Error::UnexpectedReply {
        expected,
        actual: reply.kind().to_string(),
    }
}

/// Integer reply converted to `T`. Values that do not fit `T` fail the conversion.
pub fn integer<T: NumCast>() -> Integer<T> {
    Integer(PhantomData)
}

/// Integer reply compared against 1.
pub fn boolean() -> Boolean {
    Boolean
}

/// Status reply text, e.g. `OK`.
pub fn status() -> Status {
    Status
}

/// Bulk reply payload; nil maps to `None`.
pub fn bulk() -> BulkWith<fn(Bytes) -> Result<Bytes, BoxError>> {
    BulkWith(Ok)
}

/// Bulk reply payload passed through `f`; nil maps to `None` without calling `f`.
pub fn bulk_with<F, T, E>(f: F) -> BulkWith<F>
where
    F: FnOnce(Bytes) -> Result<T, E>,
    E: Into<BoxError>,
{
    BulkWith(f)
}

/// Multi-bulk reply as a list of payloads, keeping nil elements in place.
pub fn multi_bulk() -> MultiBulkWith<fn(Bytes) -> Result<Bytes, BoxError>> {
    MultiBulkWith(Ok)
}

/// Multi-bulk reply with `f` applied to every non-nil element.
pub fn multi_bulk_with<F, T, E>(f: F) -> MultiBulkWith<F>
where
    F: FnMut(Bytes) -> Result<T, E>,
    E: Into<BoxError>,
{
    MultiBulkWith(f)
}

/// The reply itself, whatever its shape.
pub fn raw() -> Raw {
    Raw
}

#[derive(Debug, Clone, Copy)]
pub struct Integer<T>(PhantomData<T>);

impl<T: NumCast> Mapper for Integer<T> {
    type Output = T;

    fn map(self, reply: Reply) -> Result<T> {
        match reply {
            Reply::Integer(value) => <T as NumCast>::from(value).ok_or_else(|| {
                Error::Mapper(format!("integer {} out of range for the requested type", value).into())
            }),
            reply => Err(unexpected("integer", &reply)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Boolean;

impl Mapper for Boolean {
    type Output = bool;

    fn map(self, reply: Reply) -> Result<bool> {
        match reply {
            Reply::Integer(value) => Ok(value == 1),
            reply => Err(unexpected("integer", &reply)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Status;

impl Mapper for Status {
    type Output = String;

    fn map(self, reply: Reply) -> Result<String> {
        match reply {
            Reply::Status(status) => Ok(status),
            reply => Err(unexpected("status", &reply)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BulkWith<F>(F);

impl<F, T, E> Mapper for BulkWith<F>
where
    F: FnOnce(Bytes) -> Result<T, E>,
    E: Into<BoxError>,
{
    type Output = Option<T>;

    fn map(self, reply: Reply) -> Result<Option<T>> {
        match reply {
            Reply::Bulk(None) => Ok(None),
            Reply::Bulk(Some(data)) => (self.0)(data)
                .map(Some)
                .map_err(|err| Error::Mapper(err.into())),
            reply => Err(unexpected("bulk", &reply)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MultiBulkWith<F>(F);

impl<F, T, E> Mapper for MultiBulkWith<F>
where
    F: FnMut(Bytes) -> Result<T, E>,
    E: Into<BoxError>,
{
    type Output = Option<Vec<Option<T>>>;

    fn map(mut self, reply: Reply) -> Result<Self::Output> {
        let replies = match reply {
            Reply::MultiBulk(None) => return Ok(None),
            Reply::MultiBulk(Some(replies)) => replies,
            reply => return Err(unexpected("multi-bulk", &reply)),
        };

        replies
            .into_iter()
            .map(|element| match element {
                Reply::Bulk(None) => Ok(None),
                Reply::Bulk(Some(data)) => (self.0)(data)
                    .map(Some)
                    .map_err(|err| Error::Mapper(err.into())),
                Reply::Status(text) => (self.0)(Bytes::from(text))
                    .map(Some)
                    .map_err(|err| Error::Mapper(err.into())),
                element => Err(unexpected("bulk element", &element)),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Raw;

impl Mapper for Raw {
    type Output = Reply;

    fn map(self, reply: Reply) -> Result<Reply> {
        Ok(reply)
    }
}

/// UTF-8 transform for use with [`bulk_with`] and [`multi_bulk_with`].
pub fn utf8(data: Bytes) -> Result<String, std::string::FromUtf8Error> {
    String::from_utf8(data.to_vec())
}
