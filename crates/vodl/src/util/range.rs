#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    pub fn to_http_range(&self) -> String {
        if let Some(length) = self.length {
            format!("bytes={}-{}", self.offset, self.offset + length - 1)
        } else {
            format!("bytes={}-", self.offset)
        }
    }

    /// Splits `[0, size)` into `parts` contiguous ranges.
    ///
    /// All ranges have the same length except the last one, which is open-ended
    /// and takes the remainder. An unknown size (`0`) yields a single `bytes=0-`.
    pub fn partition(size: u64, parts: usize) -> Vec<ByteRange> {
        if size == 0 {
            return vec![ByteRange::new(0, None)];
        }

        let parts = (parts.max(1) as u64).min(size);
        let part_size = size / parts;
        (0..parts)
            .map(|i| {
                let length = if i + 1 == parts { None } else { Some(part_size) };
                ByteRange::new(i * part_size, length)
            })
            .collect()
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_http_range())
    }
}
