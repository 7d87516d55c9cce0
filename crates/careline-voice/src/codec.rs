//! Frame codec: linear f32 samples ⇄ 16-bit LE PCM ⇄ base64 wire text.
//!
//! Pure and stateless. The only lossy step is the f32 → i16 quantization;
//! the byte/text round trip itself is exact.

use crate::error::{VoiceError, VoiceResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Quantize normalized f32 samples (-1.0..1.0) to signed 16-bit.
pub fn quantize(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Widen 16-bit PCM back to normalized f32 for playback.
pub fn to_f32(pcm: &[i16]) -> Vec<f32> {
    pcm.iter().map(|&s| f32::from(s) / i16::MAX as f32).collect()
}

/// Encode 16-bit PCM as base64 over little-endian bytes.
pub fn encode_pcm16(pcm: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(pcm.len() * 2);
    for s in pcm {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    BASE64.encode(&bytes)
}

/// Quantize and encode captured f32 samples for the wire.
pub fn encode_frame(samples: &[f32]) -> String {
    encode_pcm16(&quantize(samples))
}

/// Decode a base64 payload back to 16-bit PCM.
///
/// Malformed text or an odd byte count is a `Decode` error; callers drop the
/// single chunk and keep the session alive.
pub fn decode_frame(data: &str) -> VoiceResult<Vec<i16>> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| VoiceError::Decode(format!("invalid base64 payload: {}", e)))?;
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::Decode(format!(
            "odd PCM payload length: {} bytes",
            bytes.len()
        )));
    }
    let mut pcm = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks_exact(2) {
        pcm.push(i16::from_le_bytes([chunk[0], chunk[1]]));
    }
    Ok(pcm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_reproduces_quantized_form() {
        let samples: Vec<f32> = (0..4096).map(|i| ((i as f32) / 2048.0 - 1.0).sin()).collect();
        let decoded = decode_frame(&encode_frame(&samples)).unwrap();
        assert_eq!(decoded, quantize(&samples));
    }

    #[test]
    fn quantize_clamps_out_of_range() {
        let pcm = quantize(&[2.0, -2.0, 0.0]);
        assert_eq!(pcm, vec![i16::MAX, -i16::MAX, 0]);
    }

    #[test]
    fn payload_is_two_bytes_per_sample() {
        let samples = vec![0.25f32; 4096];
        let encoded = encode_frame(&samples);
        let bytes = base64::engine::general_purpose::STANDARD.decode(&encoded).unwrap();
        assert_eq!(bytes.len(), 8192);
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(matches!(decode_frame("not base64!!"), Err(VoiceError::Decode(_))));
    }

    #[test]
    fn rejects_odd_byte_count() {
        let encoded = BASE64.encode([1u8, 2, 3]);
        assert!(matches!(decode_frame(&encoded), Err(VoiceError::Decode(_))));
    }
}
