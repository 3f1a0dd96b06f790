use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Not enough data for encoded value")]
    NotEnoughData,

    #[error("More items to be read")]
    MoreItems,

    #[error("Invalid minor-type value {0}")]
    InvalidMinorValue(u8),

    #[error("Incorrect type, expecting {0}, found {1}")]
    IncorrectType(String, String),

    #[error("Indefinite-length {0} is outside the deterministic subset")]
    IndefiniteLength(&'static str),

    #[error("{0} is outside the deterministic subset")]
    Unsupported(&'static str),

    #[error("Invalid UTF-8 in text string")]
    InvalidUtf8,
}

/// A value that can be read back from its canonical encoding.
///
/// `try_from_cbor` returns `Ok(None)` when `data` is a truncated prefix of a
/// valid encoding, and `(value, encoded_length)` otherwise.
pub trait FromCbor: Sized {
    type Error: From<Error>;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error>;
}

pub enum Value<'a, 'b: 'a> {
    UnsignedInteger(u64),
    Bytes(&'b [u8]),
    Text(&'b str),
    Array(&'a mut Array<'b>),
    False,
    True,
    Null,
}

impl<'a, 'b: 'a> Value<'a, 'b> {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::UnsignedInteger(_) => "Unsigned Integer",
            Value::Bytes(_) => "Byte String",
            Value::Text(_) => "Text String",
            Value::Array(_) => "Array",
            Value::False | Value::True => "Boolean",
            Value::Null => "Null",
        }
    }
}

fn major_name(major: u8) -> &'static str {
    match major {
        0 => "Unsigned Integer",
        1 => "Negative Integer",
        2 => "Byte String",
        3 => "Text String",
        4 => "Array",
        5 => "Map",
        6 => "Tag",
        _ => "Simple Value",
    }
}

/// Parse one initial byte plus any extended length bytes.
/// Returns `(major, minor, value, header_len)`, or `None` on truncation.
fn parse_header(data: &[u8]) -> Result<Option<(u8, u8, u64, usize)>, Error> {
    let Some(first) = data.first() else {
        return Ok(None);
    };
    let major = first >> 5;
    let minor = first & 0x1F;
    match minor {
        0..=23 => Ok(Some((major, minor, minor as u64, 1))),
        24 => match data.get(1) {
            Some(v) => Ok(Some((major, minor, *v as u64, 2))),
            None => Ok(None),
        },
        25 => match data.get(1..3) {
            Some(v) => Ok(Some((
                major,
                minor,
                u16::from_be_bytes(v.try_into().unwrap()) as u64,
                3,
            ))),
            None => Ok(None),
        },
        26 => match data.get(1..5) {
            Some(v) => Ok(Some((
                major,
                minor,
                u32::from_be_bytes(v.try_into().unwrap()) as u64,
                5,
            ))),
            None => Ok(None),
        },
        27 => match data.get(1..9) {
            Some(v) => Ok(Some((
                major,
                minor,
                u64::from_be_bytes(v.try_into().unwrap()),
                9,
            ))),
            None => Ok(None),
        },
        31 => Ok(Some((major, minor, 0, 1))),
        minor => Err(Error::InvalidMinorValue(minor)),
    }
}

fn try_parse_value_inner<T, F, E>(data: &[u8], offset: &mut usize, f: F) -> Result<Option<T>, E>
where
    F: FnOnce(Value, usize) -> Result<T, E>,
    E: From<Error>,
{
    let start = *offset;
    let Some((major, minor, val, hlen)) = parse_header(&data[start..])? else {
        return Ok(None);
    };
    match major {
        0 => {
            *offset = start + hlen;
            f(Value::UnsignedInteger(val), start).map(Some)
        }
        2 | 3 => {
            if minor == 31 {
                return Err(Error::IndefiniteLength(major_name(major)).into());
            }
            let end = start + hlen + val as usize;
            if data.len() < end {
                return Ok(None);
            }
            *offset = end;
            if major == 2 {
                f(Value::Bytes(&data[start + hlen..end]), start).map(Some)
            } else {
                let s = core::str::from_utf8(&data[start + hlen..end])
                    .map_err(|_| Error::InvalidUtf8)?;
                f(Value::Text(s), start).map(Some)
            }
        }
        4 => {
            *offset = start + hlen;
            let count = if minor == 31 { None } else { Some(val as usize) };
            let mut a = Array::new(data, count, offset);
            let r = f(Value::Array(&mut a), start)?;
            a.complete()?;
            Ok(Some(r))
        }
        7 => match minor {
            20 => {
                *offset = start + hlen;
                f(Value::False, start).map(Some)
            }
            21 => {
                *offset = start + hlen;
                f(Value::True, start).map(Some)
            }
            22 => {
                *offset = start + hlen;
                f(Value::Null, start).map(Some)
            }
            _ => Err(Error::Unsupported("simple value").into()),
        },
        major => Err(Error::Unsupported(major_name(major)).into()),
    }
}

pub struct Array<'a> {
    data: &'a [u8],
    count: Option<usize>,
    offset: &'a mut usize,
    idx: usize,
}

impl<'a> Array<'a> {
    fn new(data: &'a [u8], count: Option<usize>, offset: &'a mut usize) -> Self {
        Self {
            data,
            count,
            offset,
            idx: 0,
        }
    }

    pub fn count(&self) -> Option<usize> {
        self.count
    }

    pub fn is_definite(&self) -> bool {
        self.count.is_some()
    }

    /// The current absolute offset within the buffer being parsed.
    pub fn offset(&self) -> usize {
        *self.offset
    }

    fn check_for_end(&mut self) -> Result<bool, Error> {
        if let Some(count) = self.count {
            match self.idx.cmp(&count) {
                core::cmp::Ordering::Greater => Ok(true),
                core::cmp::Ordering::Equal => {
                    self.idx += 1;
                    Ok(true)
                }
                core::cmp::Ordering::Less => Ok(false),
            }
        } else if *self.offset >= self.data.len() {
            Err(Error::NotEnoughData)
        } else if self.data[*self.offset] == 0xFF {
            self.count = Some(self.idx);
            self.idx += 1;
            *self.offset += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Returns `Some(offset)` if the array has been fully consumed.
    pub fn end(&mut self) -> Result<Option<usize>, Error> {
        if self.check_for_end()? {
            Ok(Some(*self.offset))
        } else {
            Ok(None)
        }
    }

    fn complete(mut self) -> Result<(), Error> {
        if !self.check_for_end()? {
            return Err(Error::MoreItems);
        }
        Ok(())
    }

    pub fn try_parse_value<T, F, E>(&mut self, f: F) -> Result<Option<T>, E>
    where
        F: FnOnce(Value, usize) -> Result<T, E>,
        E: From<Error>,
    {
        if self.check_for_end()? {
            return Ok(None);
        }
        match try_parse_value_inner(self.data, self.offset, f)? {
            Some(v) => {
                self.idx += 1;
                Ok(Some(v))
            }
            None => Err(Error::NotEnoughData.into()),
        }
    }

    pub fn parse_value<T, F, E>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(Value, usize) -> Result<T, E>,
        E: From<Error>,
    {
        self.try_parse_value(f)?.ok_or(Error::NotEnoughData.into())
    }

    /// Parse the next item as `T`, where the item starts a fresh sub-slice so
    /// that `T`'s decoder sees offsets relative to its own first byte.
    pub fn try_parse<T>(&mut self) -> Result<Option<T>, T::Error>
    where
        T: FromCbor,
    {
        if self.check_for_end()? {
            return Ok(None);
        }
        match T::try_from_cbor(&self.data[*self.offset..])? {
            Some((value, len)) => {
                self.idx += 1;
                *self.offset += len;
                Ok(Some(value))
            }
            None => Err(Error::NotEnoughData.into()),
        }
    }

    pub fn parse<T>(&mut self) -> Result<T, T::Error>
    where
        T: FromCbor,
    {
        self.try_parse::<T>()?.ok_or(Error::NotEnoughData.into())
    }

    pub fn parse_array<T, F, E>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Array, usize) -> Result<T, E>,
        E: From<Error>,
    {
        self.parse_value(|value, start| match value {
            Value::Array(a) => f(a, start),
            value => Err(Error::IncorrectType(
                "Array".to_string(),
                value.type_name().to_string(),
            )
            .into()),
        })
    }
}

pub fn try_parse_value<T, F, E>(data: &[u8], f: F) -> Result<Option<(T, usize)>, E>
where
    F: FnOnce(Value, usize) -> Result<T, E>,
    E: From<Error>,
{
    let mut offset = 0;
    Ok(try_parse_value_inner(data, &mut offset, f)?.map(|v| (v, offset)))
}

pub fn parse_value<T, F, E>(data: &[u8], f: F) -> Result<(T, usize), E>
where
    F: FnOnce(Value, usize) -> Result<T, E>,
    E: From<Error>,
{
    try_parse_value(data, f)?.ok_or(Error::NotEnoughData.into())
}

pub fn try_parse_array<T, F, E>(data: &[u8], f: F) -> Result<Option<(T, usize)>, E>
where
    F: FnOnce(&mut Array, usize) -> Result<T, E>,
    E: From<Error>,
{
    try_parse_value(data, |value, start| match value {
        Value::Array(a) => f(a, start),
        value => Err(Error::IncorrectType(
            "Array".to_string(),
            value.type_name().to_string(),
        )
        .into()),
    })
}

pub fn parse_array<T, F, E>(data: &[u8], f: F) -> Result<(T, usize), E>
where
    F: FnOnce(&mut Array, usize) -> Result<T, E>,
    E: From<Error>,
{
    try_parse_array(data, f)?.ok_or(Error::NotEnoughData.into())
}

pub fn try_parse<T>(data: &[u8]) -> Result<Option<(T, usize)>, T::Error>
where
    T: FromCbor,
{
    T::try_from_cbor(data)
}

pub fn parse<T>(data: &[u8]) -> Result<T, T::Error>
where
    T: FromCbor,
{
    match try_parse::<T>(data) {
        Ok(v) => v
            .map(|(v, _)| v)
            .ok_or_else(|| T::Error::from(Error::NotEnoughData)),
        Err(e) => Err(e),
    }
}

/// Parse the header of a definite-length byte string, returning the content
/// length and header length. `Ok(None)` means more data is required, which
/// makes this directly usable from a stream framer.
pub fn parse_byte_string_header(data: &[u8]) -> Result<Option<(u64, usize)>, Error> {
    let Some((major, minor, val, hlen)) = parse_header(data)? else {
        return Ok(None);
    };
    if major != 2 {
        return Err(Error::IncorrectType(
            "Byte String".to_string(),
            major_name(major).to_string(),
        ));
    }
    if minor == 31 {
        return Err(Error::IndefiniteLength("Byte String"));
    }
    Ok(Some((val, hlen)))
}

impl FromCbor for u64 {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        try_parse_value(data, |value, _| match value {
            Value::UnsignedInteger(n) => Ok(n),
            value => Err(Error::IncorrectType(
                "Unsigned Integer".to_string(),
                value.type_name().to_string(),
            )),
        })
    }
}

impl FromCbor for bool {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        try_parse_value(data, |value, _| match value {
            Value::False => Ok(false),
            Value::True => Ok(true),
            value => Err(Error::IncorrectType(
                "Boolean".to_string(),
                value.type_name().to_string(),
            )),
        })
    }
}

impl FromCbor for String {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        try_parse_value(data, |value, _| match value {
            Value::Text(s) => Ok(s.to_string()),
            value => Err(Error::IncorrectType(
                "Text String".to_string(),
                value.type_name().to_string(),
            )),
        })
    }
}

impl FromCbor for Vec<u8> {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        try_parse_value(data, |value, _| match value {
            Value::Bytes(b) => Ok(b.to_vec()),
            value => Err(Error::IncorrectType(
                "Byte String".to_string(),
                value.type_name().to_string(),
            )),
        })
    }
}
