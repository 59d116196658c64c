use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use super::{CustodyError, Result};

/// URL-safe alphabet, no padding on output, padding optional on input
const FRAGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn encode_for_url(bytes: &[u8]) -> String {
    FRAGMENT_ENGINE.encode(bytes)
}

pub fn decode_from_url(text: &str) -> Result<Vec<u8>> {
    FRAGMENT_ENGINE
        .decode(text.trim())
        .map_err(|e| CustodyError::InvalidEncoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all_lengths_up_to_64() {
        for len in 0..=64usize {
            let bytes: Vec<u8> = (0..len).map(|i| (255 - i * 7 % 256) as u8).collect();
            let encoded = encode_for_url(&bytes);
            assert!(
                !encoded.contains(['+', '/', '=']),
                "length {} produced {:?}",
                len,
                encoded
            );
            assert_eq!(decode_from_url(&encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn test_high_bytes_use_url_safe_alphabet() {
        // 0xfb 0xff 0xbf encodes to "+/+/" in the standard alphabet
        assert_eq!(encode_for_url(&[0xfb, 0xff, 0xbf]), "-_-_");
    }

    #[test]
    fn test_padded_input_is_accepted() {
        assert_eq!(decode_from_url("AQ==").unwrap(), vec![1]);
        assert_eq!(decode_from_url("AQ").unwrap(), vec![1]);
        assert_eq!(decode_from_url("AQI=").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_invalid_characters_are_rejected() {
        assert!(matches!(
            decode_from_url("ab+c"),
            Err(CustodyError::InvalidEncoding(_))
        ));
        assert!(decode_from_url("a").is_err());
    }
}
