//! Bounds-checked big-endian cursor over class file bytes.

/// A read ran past the end of the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct UnexpectedEof {
    pub(crate) offset: usize,
    pub(crate) needed: usize,
}

pub(crate) type ReadResult<T> = std::result::Result<T, UnexpectedEof>;

#[derive(Clone, Debug)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Starts reading at `offset` rather than at the beginning of `data`.
    pub(crate) fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> ReadResult<&'a [u8]> {
        let start = self.offset;
        let end = start.checked_add(len).ok_or(UnexpectedEof {
            offset: start,
            needed: len,
        })?;
        let slice = self.data.get(start..end).ok_or(UnexpectedEof {
            offset: start,
            needed: end - self.data.len().min(end),
        })?;
        self.offset = end;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> ReadResult<()> {
        self.read_bytes(len)?;
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> ReadResult<u8> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub(crate) fn read_i8(&mut self) -> ReadResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub(crate) fn read_u16(&mut self) -> ReadResult<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_i16(&mut self) -> ReadResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub(crate) fn read_u32(&mut self) -> ReadResult<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i32(&mut self) -> ReadResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub(crate) fn read_u64(&mut self) -> ReadResult<u64> {
        let high = self.read_u32()? as u64;
        let low = self.read_u32()? as u64;
        Ok((high << 32) | low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_values() {
        let data = [0x12, 0x34, 0xff, 0xfe, 0x00, 0x00, 0x00, 0x2a];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_u16().expect("u16"), 0x1234);
        assert_eq!(reader.read_i16().expect("i16"), -2);
        assert_eq!(reader.read_i32().expect("i32"), 42);
        assert!(reader.is_empty());
    }

    #[test]
    fn reports_offset_and_shortfall_on_eof() {
        let data = [0x01, 0x02, 0x03];
        let mut reader = ByteReader::at(&data, 1);

        let err = reader.read_u32().expect_err("eof");

        assert_eq!(err, UnexpectedEof { offset: 1, needed: 2 });
        assert_eq!(reader.offset(), 1);
    }
}
