/// A byte buffer backing a packet view, either borrowed shared or borrowed unique.
#[derive(Debug)]
pub enum Buffer<'a> {
    Immutable(&'a [u8]),
    Mutable(&'a mut [u8]),
}

impl Buffer<'_> {
    /// The whole buffer as a byte slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Immutable(bytes) => bytes,
            Buffer::Mutable(bytes) => bytes,
        }
    }

    /// The whole buffer as a mutable byte slice.
    ///
    /// # Panics
    ///
    /// Panics if the buffer was created from a shared slice.
    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        match self {
            Buffer::Immutable(_) => panic!("mutable access to a read-only packet buffer"),
            Buffer::Mutable(bytes) => bytes,
        }
    }

    /// Read the byte at `offset`.
    #[must_use]
    pub fn read(&self, offset: usize) -> u8 {
        self.as_slice()[offset]
    }

    /// Overwrite the byte at `offset`.
    pub fn write(&mut self, offset: usize, value: u8) {
        self.as_slice_mut()[offset] = value;
    }

    /// Read a big-endian `u16` starting at `offset`.
    #[must_use]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes(self.read_array(offset))
    }

    /// Write `value` as a big-endian `u16` starting at `offset`.
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.write_array(offset, value.to_be_bytes());
    }

    /// Read `N` consecutive bytes starting at `offset`.
    #[must_use]
    pub fn read_array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0_u8; N];
        out.copy_from_slice(&self.as_slice()[offset..offset + N]);
        out
    }

    /// Write `N` consecutive bytes starting at `offset`.
    pub fn write_array<const N: usize>(&mut self, offset: usize, bytes: [u8; N]) {
        self.as_slice_mut()[offset..offset + N].copy_from_slice(&bytes);
    }
}
