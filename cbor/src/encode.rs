/// A value that can be written to an [`Encoder`].
pub trait ToCbor {
    fn to_cbor(&self, encoder: &mut Encoder);
}

#[derive(Default)]
pub struct Encoder {
    data: Vec<u8>,
}

impl Encoder {
    fn emit_uint_minor(&mut self, major: u8, val: u64) {
        if val < 24 {
            self.data.push((major << 5) | (val as u8));
        } else if val <= u8::MAX as u64 {
            self.data.push((major << 5) | 24u8);
            self.data.push(val as u8);
        } else if val <= u16::MAX as u64 {
            self.data.push((major << 5) | 25u8);
            self.data.extend(&(val as u16).to_be_bytes());
        } else if val <= u32::MAX as u64 {
            self.data.push((major << 5) | 26u8);
            self.data.extend(&(val as u32).to_be_bytes());
        } else {
            self.data.push((major << 5) | 27u8);
            self.data.extend(&val.to_be_bytes());
        }
    }

    pub fn emit<T>(&mut self, value: &T)
    where
        T: ToCbor + ?Sized,
    {
        value.to_cbor(self)
    }

    /// Append pre-encoded bytes verbatim.
    pub fn emit_raw(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    pub fn offset(&self) -> usize {
        self.data.len()
    }

    /// Emit an array. `Some(count)` writes a definite-length header and the
    /// closure must emit exactly `count` items; `None` writes an
    /// indefinite-length header followed by a break byte.
    pub fn emit_array<F>(&mut self, count: Option<usize>, f: F)
    where
        F: FnOnce(&mut Array),
    {
        let mut a = Array::new(self, count);
        f(&mut a);
        a.end()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

pub struct Array<'a> {
    encoder: &'a mut Encoder,
    count: Option<usize>,
    idx: usize,
}

impl<'a> Array<'a> {
    fn new(encoder: &'a mut Encoder, count: Option<usize>) -> Self {
        match count {
            Some(count) => encoder.emit_uint_minor(4, count as u64),
            None => encoder.data.push((4 << 5) | 31),
        }
        Self {
            encoder,
            count,
            idx: 0,
        }
    }

    fn check_bounds(&mut self) {
        self.idx += 1;
        if let Some(count) = self.count {
            if self.idx > count {
                panic!("Too many items added to definite length array");
            }
        }
    }

    fn end(self) {
        match self.count {
            Some(count) => {
                if self.idx != count {
                    panic!(
                        "Definite length array is short of items: {}, expected {count}",
                        self.idx
                    );
                }
            }
            None => self.encoder.data.push(0xFF),
        }
    }

    /// Account for an item that will be appended out-of-band, such as a
    /// trailing CRC value patched in after digest computation.
    pub fn skip_value(&mut self) {
        self.check_bounds()
    }

    pub fn emit<T>(&mut self, value: &T)
    where
        T: ToCbor + ?Sized,
    {
        self.check_bounds();
        self.encoder.emit(value)
    }

    pub fn emit_raw(&mut self, data: &[u8]) {
        self.check_bounds();
        self.encoder.emit_raw(data)
    }

    pub fn emit_array<F>(&mut self, count: Option<usize>, f: F)
    where
        F: FnOnce(&mut Array),
    {
        self.check_bounds();
        self.encoder.emit_array(count, f)
    }
}

impl ToCbor for u64 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(0, *self)
    }
}

impl ToCbor for u32 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(0, *self as u64)
    }
}

impl ToCbor for u16 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(0, *self as u64)
    }
}

impl ToCbor for u8 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(0, *self as u64)
    }
}

impl ToCbor for usize {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(0, *self as u64)
    }
}

impl ToCbor for bool {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.data.push((7 << 5) | if *self { 21 } else { 20 });
    }
}

impl ToCbor for str {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(3, self.len() as u64);
        encoder.data.extend(self.as_bytes());
    }
}

impl ToCbor for String {
    fn to_cbor(&self, encoder: &mut Encoder) {
        self.as_str().to_cbor(encoder)
    }
}

impl ToCbor for [u8] {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(2, self.len() as u64);
        encoder.data.extend(self);
    }
}

impl ToCbor for Vec<u8> {
    fn to_cbor(&self, encoder: &mut Encoder) {
        self.as_slice().to_cbor(encoder)
    }
}

impl<T> ToCbor for &T
where
    T: ToCbor + ?Sized,
{
    fn to_cbor(&self, encoder: &mut Encoder) {
        (*self).to_cbor(encoder)
    }
}

pub fn emit<T>(value: &T) -> Vec<u8>
where
    T: ToCbor + ?Sized,
{
    let mut e = Encoder::default();
    e.emit(value);
    e.into_bytes()
}

pub fn emit_array<F>(count: Option<usize>, f: F) -> Vec<u8>
where
    F: FnOnce(&mut Array),
{
    let mut e = Encoder::default();
    e.emit_array(count, f);
    e.into_bytes()
}

/// The header of a definite-length byte string, without its content.
/// Stream framing writes this followed by the raw payload bytes.
pub fn byte_string_header(len: u64) -> Vec<u8> {
    let mut e = Encoder::default();
    e.emit_uint_minor(2, len);
    e.into_bytes()
}
