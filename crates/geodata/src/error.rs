// Error taxonomy for geodata parsing
// Queries never use these for "no answer" - that is an Option/tagged result

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeodataError>;

/// Parse-level failures. Every variant is fatal to the parse unit that
/// raised it; multi-tile loads isolate them per tile.
#[derive(Debug, Clone, Error)]
pub enum GeodataError {
    /// A cursor read ran past the end of the buffer.
    #[error("{file}: read of {wanted} bytes at offset {offset} past buffer end ({available} available)")]
    OutOfBounds {
        file: String,
        offset: usize,
        wanted: usize,
        available: usize,
    },

    /// A magic or version marker did not match any supported value.
    #[error("{file}: bad magic/version {found} (expected {expected})")]
    InvalidMagic {
        file: String,
        found: String,
        expected: String,
    },

    /// Tile coordinates could not be derived from the file name.
    #[error("cannot derive tile coordinates from file name '{0}'")]
    InvalidFilename(String),

    /// An implausible count or size that would cascade into misreads.
    #[error("{file}: corrupt data: {detail}")]
    CorruptData { file: String, detail: String },
}

impl GeodataError {
    pub fn invalid_magic(
        file: impl Into<String>,
        found: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        GeodataError::InvalidMagic {
            file: file.into(),
            found: found.into(),
            expected: expected.into(),
        }
    }

    pub fn corrupt(file: impl Into<String>, detail: impl Into<String>) -> Self {
        GeodataError::CorruptData {
            file: file.into(),
            detail: detail.into(),
        }
    }
}

/// Raw cursor failure, before a parser has attached the file name.
#[derive(Debug, Clone, Copy, Error)]
#[error("read of {wanted} bytes at offset {offset} past buffer end ({available} available)")]
pub struct ReadError {
    pub offset: usize,
    pub wanted: usize,
    pub available: usize,
}

impl ReadError {
    /// Attach the source file name, producing the library error.
    pub fn in_file(self, file: impl Into<String>) -> GeodataError {
        GeodataError::OutOfBounds {
            file: file.into(),
            offset: self.offset,
            wanted: self.wanted,
            available: self.available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_tagging() {
        let err = ReadError {
            offset: 12,
            wanted: 4,
            available: 2,
        };
        let tagged = err.in_file("0000_31_31.map");
        match tagged {
            GeodataError::OutOfBounds {
                file,
                offset,
                wanted,
                available,
            } => {
                assert_eq!(file, "0000_31_31.map");
                assert_eq!(offset, 12);
                assert_eq!(wanted, 4);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_display_contains_offset() {
        let err = ReadError {
            offset: 40,
            wanted: 8,
            available: 0,
        }
        .in_file("0530.vmtree");
        let text = err.to_string();
        assert!(text.contains("0530.vmtree"));
        assert!(text.contains("offset 40"));
    }
}
