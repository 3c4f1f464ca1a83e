//! WAV container framing for raw PCM payloads.
//!
//! Upstream providers return headerless PCM. Browsers decode audio through the
//! Web Audio API, which needs a self-describing container, so every payload is
//! prefixed with a canonical 44-byte RIFF/WAVE header before fan-out.

/// Size of the canonical PCM WAV header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Bytes covered by the RIFF chunk size field beyond the data payload.
const RIFF_CHUNK_OVERHEAD: u32 = 36;

/// `fmt ` sub-chunk size for plain PCM.
const PCM_FMT_CHUNK_SIZE: u32 = 16;

/// WAVE format tag for uncompressed PCM.
const WAVE_FORMAT_PCM: u16 = 1;

/// Create a WAV header for PCM audio.
///
/// # Arguments
/// * `data_size` - Size of the PCM payload in bytes
/// * `sample_rate` - Sample rate in Hz (e.g., 24000)
/// * `channels` - Number of channels (1 for mono)
/// * `sample_width` - Bytes per sample (2 for 16-bit)
///
/// # Returns
/// A 44-byte header. All multi-byte fields are little-endian.
pub fn create_header(
    data_size: u32,
    sample_rate: u32,
    channels: u16,
    sample_width: u16,
) -> [u8; WAV_HEADER_SIZE] {
    // Out-of-range formats saturate instead of overflowing.
    let byte_rate = sample_rate
        .saturating_mul(u32::from(channels))
        .saturating_mul(u32::from(sample_width));
    let block_align = channels.saturating_mul(sample_width);
    let bits_per_sample = sample_width.saturating_mul(8);
    let chunk_size = data_size.wrapping_add(RIFF_CHUNK_OVERHEAD);

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&PCM_FMT_CHUNK_SIZE.to_le_bytes());
    header[20..22].copy_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Wrap raw PCM in a complete WAV container (`header ++ pcm`).
///
/// Payloads past the 4 GiB RIFF limit get a saturated size field.
pub fn create_wav(pcm: &[u8], sample_rate: u32, channels: u16, sample_width: u16) -> Vec<u8> {
    let data_size = u32::try_from(pcm.len()).unwrap_or(u32::MAX);
    let header = create_header(data_size, sample_rate, channels, sample_width);
    let mut wav = Vec::with_capacity(WAV_HEADER_SIZE + pcm.len());
    wav.extend_from_slice(&header);
    wav.extend_from_slice(pcm);
    wav
}
