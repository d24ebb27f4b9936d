//! Transparent compression for the text formats (JSON Lines, CSV).
//!
//! Reads pick the codec from the file extension first and fall back to magic bytes, so a
//! `*.json.gz` pattern and an extension-less gzip file both decode. Writes use the codec
//! named in the write configuration and append its suffix to the output name.
//!
//! Container formats (Avro, Parquet) compress internally and reject any setting here other
//! than [`Compression::Uncompressed`] / [`Compression::Auto`].
//!
//! | Codec | Extensions | Feature |
//! |---|---|---|
//! | gzip | `.gz`, `.gzip` | `compression-gzip` |
//! | zstd | `.zst`, `.zstd` | `compression-zstd` |
//! | bzip2 | `.bz2`, `.bzip2` | `compression-bzip2` |
//! | xz | `.xz` | `compression-xz` |

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

/// Compression applied to a file's byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compression {
    /// Detect from extension, then magic bytes. Writes treat this as uncompressed.
    #[default]
    Auto,
    Uncompressed,
    Gzip,
    Zstd,
    Bzip2,
    Xz,
}

const DETECTABLE: [Compression; 4] = [
    Compression::Gzip,
    Compression::Zstd,
    Compression::Bzip2,
    Compression::Xz,
];

impl Compression {
    /// File extensions for this codec, lowercase with the leading dot.
    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Compression::Gzip => &[".gz", ".gzip"],
            Compression::Zstd => &[".zst", ".zstd"],
            Compression::Bzip2 => &[".bz2", ".bzip2"],
            Compression::Xz => &[".xz"],
            Compression::Auto | Compression::Uncompressed => &[],
        }
    }

    /// Suffix appended to written file names (`""` when uncompressed).
    #[must_use]
    pub fn suffix(self) -> &'static str {
        self.extensions().first().copied().unwrap_or("")
    }

    fn magic_bytes(self) -> &'static [u8] {
        match self {
            Compression::Gzip => &[0x1f, 0x8b],
            Compression::Zstd => &[0x28, 0xb5, 0x2f, 0xfd],
            Compression::Bzip2 => &[0x42, 0x5a, 0x68],
            Compression::Xz => &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00],
            Compression::Auto | Compression::Uncompressed => &[],
        }
    }

    /// `true` for settings that leave bytes untouched on write.
    #[must_use]
    pub fn is_passthrough(self) -> bool {
        matches!(self, Compression::Auto | Compression::Uncompressed)
    }

    /// Codec implied by a path's extension, if any.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Compression> {
        let name = path.as_ref().to_string_lossy().to_lowercase();
        DETECTABLE
            .into_iter()
            .find(|c| c.extensions().iter().any(|ext| name.ends_with(ext)))
    }

    fn from_magic(head: &[u8]) -> Option<Compression> {
        DETECTABLE
            .into_iter()
            .find(|c| head.starts_with(c.magic_bytes()))
    }
}

/// Wrap `reader` with the decompressor selected by `compression`.
///
/// With [`Compression::Auto`] the path extension decides; if it names no codec, the first
/// bytes of the stream are peeked (without consuming them).
///
/// # Errors
/// Fails if the selected codec was not compiled in, or the magic-byte peek fails.
pub fn decompressing_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: &Path,
    compression: Compression,
) -> Result<Box<dyn Read + Send>> {
    let mut buffered = BufReader::new(reader);
    let codec = match compression {
        Compression::Auto => match Compression::from_path(path_hint) {
            Some(c) => c,
            None => {
                let head = buffered
                    .fill_buf()
                    .with_context(|| format!("peek header of {}", path_hint.display()))?;
                Compression::from_magic(head).unwrap_or(Compression::Uncompressed)
            }
        },
        explicit => explicit,
    };
    wrap_reader(buffered, codec)
        .with_context(|| format!("setup decompression for {}", path_hint.display()))
}

fn wrap_reader<R: BufRead + Send + 'static>(
    reader: R,
    codec: Compression,
) -> Result<Box<dyn Read + Send>> {
    Ok(match codec {
        Compression::Auto | Compression::Uncompressed => Box::new(reader),
        #[cfg(feature = "compression-gzip")]
        Compression::Gzip => Box::new(flate2::bufread::MultiGzDecoder::new(reader)),
        #[cfg(feature = "compression-zstd")]
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(reader)?),
        #[cfg(feature = "compression-bzip2")]
        Compression::Bzip2 => Box::new(bzip2::bufread::MultiBzDecoder::new(reader)),
        #[cfg(feature = "compression-xz")]
        Compression::Xz => Box::new(xz2::bufread::XzDecoder::new_multi_decoder(reader)),
        #[allow(unreachable_patterns)]
        other => bail!("{other:?} support is not compiled in"),
    })
}

/// Writer that compresses with the configured codec. Call [`Encoder::finish`] to flush
/// trailers; dropping it without finishing may leave a truncated stream.
pub enum Encoder<W: Write> {
    Plain(W),
    #[cfg(feature = "compression-gzip")]
    Gzip(flate2::write::GzEncoder<W>),
    #[cfg(feature = "compression-zstd")]
    Zstd(zstd::stream::write::Encoder<'static, W>),
    #[cfg(feature = "compression-bzip2")]
    Bzip2(bzip2::write::BzEncoder<W>),
    #[cfg(feature = "compression-xz")]
    Xz(xz2::write::XzEncoder<W>),
}

impl<W: Write> Encoder<W> {
    /// # Errors
    /// Fails if the codec was not compiled in or cannot be initialised.
    pub fn new(writer: W, compression: Compression) -> Result<Self> {
        Ok(match compression {
            Compression::Auto | Compression::Uncompressed => Encoder::Plain(writer),
            #[cfg(feature = "compression-gzip")]
            Compression::Gzip => Encoder::Gzip(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::default(),
            )),
            #[cfg(feature = "compression-zstd")]
            Compression::Zstd => Encoder::Zstd(zstd::stream::write::Encoder::new(writer, 3)?),
            #[cfg(feature = "compression-bzip2")]
            Compression::Bzip2 => Encoder::Bzip2(bzip2::write::BzEncoder::new(
                writer,
                bzip2::Compression::default(),
            )),
            #[cfg(feature = "compression-xz")]
            Compression::Xz => Encoder::Xz(xz2::write::XzEncoder::new(writer, 6)),
            #[allow(unreachable_patterns)]
            other => bail!("{other:?} support is not compiled in"),
        })
    }

    /// Write any codec trailer and return the inner writer, flushed.
    ///
    /// # Errors
    /// Propagates I/O errors from the codec or the inner writer.
    pub fn finish(self) -> io::Result<W> {
        let mut inner = match self {
            Encoder::Plain(w) => w,
            #[cfg(feature = "compression-gzip")]
            Encoder::Gzip(e) => e.finish()?,
            #[cfg(feature = "compression-zstd")]
            Encoder::Zstd(e) => e.finish()?,
            #[cfg(feature = "compression-bzip2")]
            Encoder::Bzip2(e) => e.finish()?,
            #[cfg(feature = "compression-xz")]
            Encoder::Xz(e) => e.finish()?,
        };
        inner.flush()?;
        Ok(inner)
    }

    fn inner_mut(&mut self) -> &mut dyn Write {
        match self {
            Encoder::Plain(w) => w,
            #[cfg(feature = "compression-gzip")]
            Encoder::Gzip(e) => e,
            #[cfg(feature = "compression-zstd")]
            Encoder::Zstd(e) => e,
            #[cfg(feature = "compression-bzip2")]
            Encoder::Bzip2(e) => e,
            #[cfg(feature = "compression-xz")]
            Encoder::Xz(e) => e,
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner_mut().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_detects_by_extension_case_insensitively() {
        assert_eq!(Compression::from_path("a/b.JSON.GZ"), Some(Compression::Gzip));
        assert_eq!(Compression::from_path("x.csv.zst"), Some(Compression::Zstd));
        assert_eq!(Compression::from_path("x.csv"), None);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip_roundtrip_detected_by_magic() -> Result<()> {
        let mut enc = Encoder::new(Vec::new(), Compression::Gzip)?;
        enc.write_all(b"hello\nworld\n")?;
        let bytes = enc.finish()?;

        let mut out = String::new();
        decompressing_reader(Cursor::new(bytes), Path::new("no-extension"), Compression::Auto)?
            .read_to_string(&mut out)?;
        assert_eq!(out, "hello\nworld\n");
        Ok(())
    }

    #[test]
    fn test_plain_bytes_pass_through() -> Result<()> {
        let mut out = String::new();
        decompressing_reader(Cursor::new(b"plain".to_vec()), Path::new("f.txt"), Compression::Auto)?
            .read_to_string(&mut out)?;
        assert_eq!(out, "plain");
        Ok(())
    }
}
