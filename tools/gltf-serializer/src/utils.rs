//! Alignment, buffer merging and GLB container assembly

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gltf_json as json;

use crate::error::Result;

/// GLB magic: ASCII "glTF"
pub const GLB_MAGIC: u32 = 0x46546C67;
/// GLB container version
pub const GLB_VERSION: u32 = 2;
/// Chunk type of the JSON chunk: ASCII "JSON"
pub const CHUNK_JSON: u32 = 0x4E4F534A;
/// Chunk type of the binary chunk: ASCII "BIN\0"
pub const CHUNK_BIN: u32 = 0x004E4942;

/// Round a byte length up to the next multiple of 4
pub fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Align buffer to 4-byte boundary
pub fn align_buffer(buffer: &mut Vec<u8>) {
    align_buffer_with(buffer, 0);
}

/// Align buffer to 4-byte boundary using `fill` as the padding byte
pub fn align_buffer_with(buffer: &mut Vec<u8>, fill: u8) {
    buffer.resize(padded_len(buffer.len()), fill);
}

/// Concatenate raw segments into one buffer.
///
/// Every segment starts on a 4-byte boundary. Returns the merged bytes and the
/// byte offset of each segment, in input order.
pub fn merge_segments<S: AsRef<[u8]>>(segments: &[S]) -> (Vec<u8>, Vec<usize>) {
    let total = segments
        .iter()
        .map(|s| padded_len(s.as_ref().len()))
        .sum();

    let mut merged = Vec::with_capacity(total);
    let mut offsets = Vec::with_capacity(segments.len());
    for segment in segments {
        offsets.push(merged.len());
        merged.extend_from_slice(segment.as_ref());
        align_buffer(&mut merged);
    }

    (merged, offsets)
}

/// Encode bytes as a base64 data URI
pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Assemble GLB binary from a glTF document and optional binary buffer.
///
/// The BIN chunk is only written when `buffer_data` is present.
pub fn assemble_glb(root: &json::Root, buffer_data: Option<&[u8]>) -> Result<Vec<u8>> {
    let json_string = json::serialize::to_string(root)?;
    Ok(assemble_glb_bytes(json_string.as_bytes(), buffer_data))
}

/// Assemble GLB binary from already serialized JSON
pub fn assemble_glb_bytes(json_bytes: &[u8], buffer_data: Option<&[u8]>) -> Vec<u8> {
    let json_chunk_length = padded_len(json_bytes.len());
    let buffer_chunk_length = buffer_data.map(|data| padded_len(data.len()));

    let total_length =
        12 + 8 + json_chunk_length + buffer_chunk_length.map_or(0, |len| 8 + len);

    let mut glb = Vec::with_capacity(total_length);

    // GLB header
    glb.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    glb.extend_from_slice(&GLB_VERSION.to_le_bytes());
    glb.extend_from_slice(&(total_length as u32).to_le_bytes());

    // JSON chunk, space padded
    glb.extend_from_slice(&(json_chunk_length as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    glb.extend_from_slice(json_bytes);
    align_buffer_with(&mut glb, 0x20);

    // Binary chunk, zero padded
    if let (Some(data), Some(length)) = (buffer_data, buffer_chunk_length) {
        glb.extend_from_slice(&(length as u32).to_le_bytes());
        glb.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        glb.extend_from_slice(data);
        align_buffer(&mut glb);
    }

    glb
}
