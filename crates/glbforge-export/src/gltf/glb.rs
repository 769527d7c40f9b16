//! GLB container writing and reading
//!
//! Layout: a 12-byte header (magic, version, total length) followed by a JSON
//! chunk padded with spaces and a BIN chunk padded with zeros, both to a
//! 4-byte boundary.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glbforge_core::{Error, Result};
use serde::Serialize;
use std::io::{Cursor, Read, Write};

use super::exporter::GltfResult;
use super::Gltf;

/// "glTF"
pub const GLB_MAGIC: u32 = 0x4654_6C67;
pub const GLB_VERSION: u32 = 2;
/// "JSON"
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
/// "BIN\0"
pub const CHUNK_BIN: u32 = 0x004E_4942;

const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// Serialize `gltf` and pack it with `binary` into a GLB file image
pub fn assemble(gltf: &Gltf, binary: &[u8]) -> GltfResult<Vec<u8>> {
    let mut json = serde_json::to_vec(gltf)?;
    json.resize(json.len().next_multiple_of(4), b' ');

    let bin_padded = binary.len().next_multiple_of(4);
    let mut total = HEADER_LEN + CHUNK_HEADER_LEN + json.len();
    if !binary.is_empty() {
        total += CHUNK_HEADER_LEN + bin_padded;
    }

    let mut out = Vec::with_capacity(total);
    out.write_u32::<LittleEndian>(GLB_MAGIC)?;
    out.write_u32::<LittleEndian>(GLB_VERSION)?;
    out.write_u32::<LittleEndian>(chunk_len(total)?)?;

    out.write_u32::<LittleEndian>(chunk_len(json.len())?)?;
    out.write_u32::<LittleEndian>(CHUNK_JSON)?;
    out.write_all(&json)?;

    if !binary.is_empty() {
        out.write_u32::<LittleEndian>(chunk_len(bin_padded)?)?;
        out.write_u32::<LittleEndian>(CHUNK_BIN)?;
        out.write_all(binary)?;
        out.resize(out.len() + bin_padded - binary.len(), 0);
    }

    debug_assert_eq!(out.len(), total);
    Ok(out)
}

fn chunk_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::invalid_data(format!("GLB section of {len} bytes exceeds 4 GiB")))
}

/// A parsed GLB file
#[derive(Debug, Clone)]
pub struct GlbFile {
    pub version: u32,
    pub total_length: u32,
    /// JSON chunk, padding included
    pub json_chunk: Vec<u8>,
    pub json: serde_json::Value,
    /// BIN chunk, padding included
    pub bin: Option<Vec<u8>>,
}

impl GlbFile {
    /// Parse and validate a GLB file image
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let mut magic = [0u8; 4];
        read_exact(&mut cursor, &mut magic)?;
        if u32::from_le_bytes(magic) != GLB_MAGIC {
            return Err(Error::InvalidMagic {
                expected: GLB_MAGIC.to_le_bytes().to_vec(),
                found: magic.to_vec(),
            });
        }

        let version = read_u32(&mut cursor)?;
        if version != GLB_VERSION {
            return Err(Error::UnsupportedVersion {
                version: version.to_string(),
                supported: GLB_VERSION.to_string(),
            });
        }

        let total_length = read_u32(&mut cursor)?;
        if total_length as usize != data.len() {
            return Err(Error::invalid_data(format!(
                "header declares {} bytes, file has {}",
                total_length,
                data.len()
            )));
        }

        let (json_type, json_chunk) = read_chunk(&mut cursor)?;
        if json_type != CHUNK_JSON {
            return Err(Error::invalid_data(format!("first chunk has type {json_type:#010x}, expected JSON")));
        }
        let json = serde_json::from_slice(&json_chunk)
            .map_err(|e| Error::invalid_data(format!("JSON chunk: {e}")))?;

        let mut bin = None;
        if (cursor.position() as usize) < data.len() {
            let (bin_type, bin_chunk) = read_chunk(&mut cursor)?;
            if bin_type != CHUNK_BIN {
                return Err(Error::invalid_data(format!("second chunk has type {bin_type:#010x}, expected BIN")));
            }
            bin = Some(bin_chunk);
        }

        Ok(Self {
            version,
            total_length,
            json_chunk,
            json,
            bin,
        })
    }

    /// Read and parse a GLB file from disk
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        Self::parse(&data)
    }

    /// The JSON chunk as typed glTF structures
    pub fn document(&self) -> Result<Gltf> {
        serde_json::from_value(self.json.clone())
            .map_err(|e| Error::invalid_data(format!("glTF document: {e}")))
    }

    /// Element counts of the main glTF arrays
    pub fn summary(&self) -> GlbSummary {
        let count = |key: &str| self.json.get(key).and_then(|v| v.as_array()).map_or(0, Vec::len);
        let channels = self
            .json
            .get("animations")
            .and_then(|v| v.as_array())
            .map_or(0, |animations| {
                animations
                    .iter()
                    .filter_map(|a| a.get("channels").and_then(|c| c.as_array()))
                    .map(Vec::len)
                    .sum()
            });

        GlbSummary {
            version: self.version,
            total_length: self.total_length,
            json_length: self.json_chunk.len(),
            bin_length: self.bin.as_ref().map_or(0, Vec::len),
            nodes: count("nodes"),
            meshes: count("meshes"),
            materials: count("materials"),
            textures: count("textures"),
            images: count("images"),
            accessors: count("accessors"),
            buffer_views: count("bufferViews"),
            skins: count("skins"),
            animations: count("animations"),
            channels,
        }
    }
}

/// Counts reported by `glbforge inspect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlbSummary {
    pub version: u32,
    pub total_length: u32,
    pub json_length: usize,
    pub bin_length: usize,
    pub nodes: usize,
    pub meshes: usize,
    pub materials: usize,
    pub textures: usize,
    pub images: usize,
    pub accessors: usize,
    pub buffer_views: usize,
    pub skins: usize,
    pub animations: usize,
    pub channels: usize,
}

fn read_exact(cursor: &mut Cursor<&[u8]>, buf: &mut [u8]) -> Result<()> {
    let offset = cursor.position();
    cursor
        .read_exact(buf)
        .map_err(|_| Error::UnexpectedEof { offset })
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    let offset = cursor.position();
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::UnexpectedEof { offset })
}

fn read_chunk(cursor: &mut Cursor<&[u8]>) -> Result<(u32, Vec<u8>)> {
    let length = read_u32(cursor)?;
    let chunk_type = read_u32(cursor)?;
    if length % 4 != 0 {
        return Err(Error::invalid_data(format!("chunk length {length} is not 4-byte aligned")));
    }
    let remaining = (cursor.get_ref().len() as u64).saturating_sub(cursor.position());
    if u64::from(length) > remaining {
        return Err(Error::UnexpectedEof { offset: cursor.position() });
    }
    let mut data = vec![0u8; length as usize];
    read_exact(cursor, &mut data)?;
    Ok((chunk_type, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Gltf {
        Gltf::default()
    }

    #[test]
    fn test_assemble_pads_chunks() {
        let glb = assemble(&tiny(), &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(glb.len() % 4, 0);

        let parsed = GlbFile::parse(&glb).unwrap();
        assert_eq!(parsed.version, 2);
        assert_eq!(parsed.total_length as usize, glb.len());
        assert_eq!(parsed.json_chunk.len() % 4, 0);
        assert_eq!(parsed.bin.as_deref(), Some(&[1, 2, 3, 4, 5, 0, 0, 0][..]));
        assert_eq!(parsed.json["asset"]["version"], "2.0");
    }

    #[test]
    fn test_json_padding_is_spaces() {
        let glb = assemble(&tiny(), &[]).unwrap();
        let parsed = GlbFile::parse(&glb).unwrap();
        let text = std::str::from_utf8(&parsed.json_chunk).unwrap();
        assert!(text.trim_end().ends_with('}'));
        assert!(text[text.trim_end().len()..].bytes().all(|b| b == b' '));
        assert!(parsed.bin.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let mut glb = assemble(&tiny(), &[]).unwrap();
        glb[0] = b'x';
        assert!(matches!(GlbFile::parse(&glb), Err(Error::InvalidMagic { .. })));
    }

    #[test]
    fn test_parse_rejects_version_one() {
        let mut glb = assemble(&tiny(), &[]).unwrap();
        glb[4] = 1;
        assert!(matches!(GlbFile::parse(&glb), Err(Error::UnsupportedVersion { .. })));
    }

    #[test]
    fn test_parse_truncated() {
        let glb = assemble(&tiny(), &[9; 16]).unwrap();
        let err = GlbFile::parse(&glb[..6]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof { offset: 4 }));
        assert!(GlbFile::parse(&glb[..glb.len() - 4]).unwrap_err().is_parse_error());
    }

    #[test]
    fn test_parse_oversized_chunk_length() {
        let mut glb = Vec::new();
        glb.extend_from_slice(&GLB_MAGIC.to_le_bytes());
        glb.extend_from_slice(&GLB_VERSION.to_le_bytes());
        glb.extend_from_slice(&20u32.to_le_bytes());
        glb.extend_from_slice(&0xFFFF_FFFCu32.to_le_bytes());
        glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());

        let err = GlbFile::parse(&glb).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof { offset: 20 }));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = GlbFile::from_path("/nonexistent/scene.glb").unwrap_err();
        assert!(err.is_not_found());
    }
}
