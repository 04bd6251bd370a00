//! Embedding blob codec.
//!
//! Embeddings are stored as little-endian float32 sequences. Search
//! needs exact cosine scores, so no quantization is applied on the way
//! in or out.

/// Encode a float32 embedding as little-endian bytes for BLOB storage.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float32 embedding.
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip() {
        let original = vec![0.1f32, -0.5, 0.8, 0.0, 1e-7];
        let bytes = encode_embedding(&original);
        assert_eq!(bytes.len(), original.len() * 4);
        assert_eq!(decode_embedding(&bytes), original);
    }

    #[test]
    fn test_decode_drops_trailing_partial_value() {
        let mut bytes = encode_embedding(&[1.0f32, 2.0]);
        bytes.push(0xFF);
        assert_eq!(decode_embedding(&bytes), vec![1.0, 2.0]);
    }
}
