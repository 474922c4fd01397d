use flate2::{Decompress, FlushDecompress, Status};

const MIN_GROWTH: usize = 4 * 1024;

/// Inflates a stored laudo. Raw deflate is tried first, then a zlib-wrapped
/// stream. `None` means the blob is unusable; callers drop the sample.
pub fn decompress(blob: &[u8]) -> Option<Vec<u8>> {
    if blob.is_empty() {
        return None;
    }

    inflate(blob, false).or_else(|| inflate(blob, true))
}

fn inflate(blob: &[u8], zlib_header: bool) -> Option<Vec<u8>> {
    let mut decoder = Decompress::new(zlib_header);
    let mut out: Vec<u8> = Vec::with_capacity(blob.len().saturating_mul(4).max(MIN_GROWTH));

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(MIN_GROWTH));
        }

        let consumed_before = decoder.total_in();
        let produced_before = decoder.total_out();
        let offset = usize::try_from(consumed_before).ok()?;

        // Streaming mode: a full output buffer is reported as progress, not
        // as an error, so the buffer can grow between calls.
        let status = decoder
            .decompress_vec(&blob[offset..], &mut out, FlushDecompress::None)
            .ok()?;

        if status == Status::StreamEnd {
            return if out.is_empty() { None } else { Some(out) };
        }

        // No progress with room left in the buffer: the input ended before
        // the final block.
        if decoder.total_in() == consumed_before && decoder.total_out() == produced_before {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::{DeflateEncoder, ZlibEncoder};
    use std::io::Write;

    fn raw_deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_empty_input_is_none() {
        assert_eq!(decompress(&[]), None);
    }

    #[test]
    fn test_raw_deflate_blob() {
        let blob = raw_deflate(b"%PDF-1.4 hello");
        assert_eq!(decompress(&blob).as_deref(), Some(&b"%PDF-1.4 hello"[..]));
    }

    #[test]
    fn test_zlib_blob_uses_fallback() {
        let blob = zlib(b"%PDF-1.7 zlib wrapped");
        assert_eq!(
            decompress(&blob).as_deref(),
            Some(&b"%PDF-1.7 zlib wrapped"[..])
        );
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(decompress(b"not compressed at all"), None);
        assert_eq!(decompress(&[0xff; 64]), None);
    }

    #[test]
    fn test_truncated_stream_is_none() {
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 251) as u8).collect();
        let blob = zlib(&payload);
        assert_eq!(decompress(&blob[..blob.len() / 2]), None);
    }

    #[test]
    fn test_large_output_grows_buffer() {
        let payload = vec![b'a'; 1_000_000];
        let blob = raw_deflate(&payload);
        assert!(blob.len() < 10_000);
        assert_eq!(decompress(&blob), Some(payload));
    }

    #[test]
    fn test_highly_compressible_pdf_is_not_dropped() {
        let mut body = b"%PDF-1.4\n".to_vec();
        body.extend(std::iter::repeat_n(b"0 0 0 rg BT /F1 12 Tf ET\n".as_slice(), 1_600).flatten());
        let blob = zlib(&body);
        assert!(blob.len() * 4 < body.len());

        assert_eq!(decompress(&blob), Some(body));
    }

    #[test]
    fn test_is_deterministic() {
        let blob = zlib(b"same bytes");
        assert_eq!(decompress(&blob), decompress(&blob));
    }
}
