use crate::engine::EngineError;

/// Version written into fresh resume blobs.
pub const RESUME_VERSION: i32 = 2;

/// Byte buffer an interrupted calculation serializes its position into.
/// Layout is `[4-byte LE version][fields in write order]`; readers pull the
/// fields back in the same order and check the version before any
/// version-gated field.
pub struct ResumeBuffer {
    bytes: Vec<u8>,
    offset: usize,
}

impl ResumeBuffer {
    pub fn new(max_len: usize, version: i32) -> ResumeBuffer {
        let mut bytes = Vec::with_capacity(max_len + 4);
        bytes.extend_from_slice(&version.to_le_bytes());
        ResumeBuffer { bytes, offset: 4 }
    }

    pub fn put(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put(&v.to_le_bytes());
    }

    /// Rewind to the first field and return the blob's version.
    pub fn start(&mut self) -> i32 {
        self.offset = 4;
        i32::from_le_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]])
    }

    pub fn get(&mut self, len: usize) -> Result<&[u8], EngineError> {
        if self.offset + len > self.bytes.len() {
            return Err(EngineError::ResumeExhausted {
                offset: self.offset,
            });
        }
        let field = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(field)
    }

    pub fn get_i32(&mut self) -> Result<i32, EngineError> {
        let b = self.get(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.len() <= 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_read_back_in_write_order() {
        let mut buf = ResumeBuffer::new(64, RESUME_VERSION);
        buf.put_i32(7);
        buf.put(&[1, 2, 3]);
        buf.put_i32(-9);

        assert_eq!(buf.start(), RESUME_VERSION);
        assert_eq!(buf.get_i32().unwrap(), 7);
        assert_eq!(buf.get(3).unwrap(), &[1, 2, 3]);
        assert_eq!(buf.get_i32().unwrap(), -9);
    }

    #[test]
    fn version_gates_newer_fields() {
        let mut old = ResumeBuffer::new(16, 1);
        old.put_i32(42);
        let version = old.start();
        assert_eq!(old.get_i32().unwrap(), 42);
        if version >= 2 {
            panic!("version 1 blob must not expose version 2 fields");
        }
    }

    #[test]
    fn reading_past_the_end_errors() {
        let mut buf = ResumeBuffer::new(8, RESUME_VERSION);
        buf.put_i32(1);
        buf.start();
        buf.get_i32().unwrap();
        assert!(matches!(
            buf.get_i32(),
            Err(EngineError::ResumeExhausted { .. })
        ));
    }

    #[test]
    fn rewind_allows_rereading() {
        let mut buf = ResumeBuffer::new(8, RESUME_VERSION);
        buf.put_i32(5);
        buf.start();
        assert_eq!(buf.get_i32().unwrap(), 5);
        buf.start();
        assert_eq!(buf.get_i32().unwrap(), 5);
    }
}
