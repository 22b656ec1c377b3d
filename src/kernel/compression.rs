//! Compress/decompress strategies, one per container format.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::error::ModuleError;
use crate::models::ContainerFormat;

/// xz preset used when recompressing (matches `xz -6`).
const XZ_PRESET: u32 = 6;

/// zstd level used when recompressing (library default).
const ZSTD_LEVEL: i32 = 3;

impl ContainerFormat {
    /// Decompress a raw container into the module image.
    ///
    /// Identity for `None`. Nothing partial is ever returned on failure.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, ModuleError> {
        let result = match self {
            ContainerFormat::None => Ok(data.to_vec()),
            ContainerFormat::Zstd => zstd::stream::decode_all(data),
            ContainerFormat::Xz => read_all(XzDecoder::new(data)),
            ContainerFormat::Gzip => read_all(GzDecoder::new(data)),
        };
        result.map_err(|source| ModuleError::Decompress {
            format: *self,
            source,
        })
    }

    /// Compress a module image into this container format.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, ModuleError> {
        let result = match self {
            ContainerFormat::None => Ok(data.to_vec()),
            ContainerFormat::Zstd => zstd::stream::encode_all(data, ZSTD_LEVEL),
            ContainerFormat::Xz => {
                let mut encoder = XzEncoder::new(Vec::new(), XZ_PRESET);
                encoder.write_all(data).and_then(|_| encoder.finish())
            }
            ContainerFormat::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data).and_then(|_| encoder.finish())
            }
        };
        result.map_err(|source| ModuleError::Compress {
            format: *self,
            source,
        })
    }
}

fn read_all<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}
