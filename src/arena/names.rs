//! Function name section
//!
//! The runtime never looks inside the blob; it is copied into the profile
//! byte for byte. [`NameBlob::from_names`] produces the uncompressed
//! encoding the LLVM toolchain emits: two ULEB128 lengths (uncompressed,
//! compressed = 0) followed by the names joined with `0x01`.

/// Separator between names in an uncompressed blob
pub const NAME_SEPARATOR: u8 = 0x01;

/// Opaque, immutable name section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameBlob(Box<[u8]>);

impl NameBlob {
    /// Wrap an existing section verbatim
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Encode names as an uncompressed name section
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = Vec::new();
        for (i, name) in names.into_iter().enumerate() {
            if i > 0 {
                joined.push(NAME_SEPARATOR);
            }
            joined.extend_from_slice(name.as_ref().as_bytes());
        }

        let mut blob = Vec::with_capacity(joined.len() + 10);
        write_uleb128(&mut blob, joined.len() as u64);
        write_uleb128(&mut blob, 0);
        blob.extend_from_slice(&joined);
        Self(blob.into_boxed_slice())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn write_uleb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}
