use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// A command and its arguments, encoded on the wire as a multi-bulk of bulk strings.
///
/// ```
/// use redis_driver::request::Request;
///
/// let req = Request::new("SET").arg("counter").arg(10);
/// assert_eq!(req.to_bytes(), &b"*3\r\n$3\r\nSET\r\n$7\r\ncounter\r\n$2\r\n10\r\n"[..]);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Request {
    // The command name is always the first element.
    parts: Vec<Bytes>,
}

impl Request {
    pub fn new(name: &str) -> Request {
        Request {
            parts: vec![Bytes::copy_from_slice(name.as_bytes())],
        }
    }

    pub fn arg(mut self, arg: impl ToArg) -> Request {
        self.parts.push(arg.to_arg());
        self
    }

    pub fn args<I>(mut self, args: I) -> Request
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.parts.extend(args.into_iter().map(|arg| arg.to_arg()));
        self
    }

    pub fn name(&self) -> &[u8] {
        &self.parts[0]
    }

    /// All wire arguments, command name included.
    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    pub fn encoded_len(&self) -> usize {
        let header = 1 + decimal_len(self.parts.len()) + 2;
        self.parts.iter().fold(header, |acc, part| {
            acc + 1 + decimal_len(part.len()) + 2 + part.len() + 2
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());

        dst.put_u8(b'*');
        dst.put_slice(self.parts.len().to_string().as_bytes());
        dst.put_slice(b"\r\n");

        for part in &self.parts {
            dst.put_u8(b'$');
            dst.put_slice(part.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
            dst.put_slice(part);
            dst.put_slice(b"\r\n");
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.parts.iter().map(|part| String::from_utf8_lossy(part)))
            .finish()
    }
}

fn decimal_len(mut value: usize) -> usize {
    let mut len = 1;
    while value >= 10 {
        value /= 10;
        len += 1;
    }
    len
}

/// Conversion into a single bulk-string argument.
///
/// Integers are sent as their decimal text, never as the protocol's integer type.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Bytes {
        (**self).to_arg()
    }
}

impl ToArg for str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> ToArg for [u8; N] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

macro_rules! integer_arg {
    ($($t:ty),*) => {
        $(
            impl ToArg for $t {
                fn to_arg(&self) -> Bytes {
                    Bytes::from(self.to_string())
                }
            }
        )*
    };
}

integer_arg!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
