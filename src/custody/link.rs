//! Share links of the form `<origin>/d/<id>#<key>`.
//!
//! User agents never transmit the fragment, so the key stays with whoever
//! holds the link. The server has no fragment handling and must not gain any.

use super::{
    decode_from_url, encode_for_url, export_key, import_key, CustodyError, CustodyKey, Result,
};

pub const DOWNLOAD_ROUTE: &str = "/d/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub origin: String,
    pub file_id: String,
    pub key: CustodyKey,
}

pub fn share_link(origin: &str, file_id: &str, key: &CustodyKey) -> String {
    format!(
        "{}{}{}#{}",
        origin.trim_end_matches('/'),
        DOWNLOAD_ROUTE,
        file_id,
        encode_for_url(&export_key(key))
    )
}

pub fn parse_share_link(link: &str) -> Result<ShareLink> {
    let (base, fragment) = link
        .trim()
        .split_once('#')
        .ok_or_else(|| CustodyError::InvalidLink("missing key fragment".to_string()))?;

    let (origin, file_id) = base
        .trim_end_matches('/')
        .rsplit_once(DOWNLOAD_ROUTE)
        .ok_or_else(|| CustodyError::InvalidLink("missing download route".to_string()))?;

    if file_id.is_empty() || file_id.contains(['/', '?']) {
        return Err(CustodyError::InvalidLink("malformed file id".to_string()));
    }

    let key = import_key(&decode_from_url(fragment)?)?;

    Ok(ShareLink {
        origin: origin.to_string(),
        file_id: file_id.to_string(),
        key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::generate_key;

    const ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

    #[test]
    fn test_link_roundtrip() {
        let key = generate_key();
        let link = share_link("https://drop.example.org/", ID, &key);
        assert!(link.starts_with("https://drop.example.org/d/0f8fad5b"));

        let parsed = parse_share_link(&link).unwrap();
        assert_eq!(parsed.origin, "https://drop.example.org");
        assert_eq!(parsed.file_id, ID);
        assert_eq!(parsed.key, key);
    }

    #[test]
    fn test_key_lives_only_in_fragment() {
        let key = generate_key();
        let link = share_link("https://drop.example.org", ID, &key);
        let (before, after) = link.split_once('#').unwrap();
        let encoded = encode_for_url(&export_key(&key));
        assert!(!before.contains(&encoded));
        assert_eq!(after, encoded);
    }

    #[test]
    fn test_link_without_fragment_is_rejected() {
        let err = parse_share_link(&format!("https://drop.example.org/d/{}", ID)).unwrap_err();
        assert!(matches!(err, CustodyError::InvalidLink(_)));
    }

    #[test]
    fn test_link_with_short_key_is_rejected() {
        let link = format!("https://drop.example.org/d/{}#{}", ID, encode_for_url(&[1u8; 16]));
        assert_eq!(
            parse_share_link(&link).unwrap_err(),
            CustodyError::InvalidKeyLength(16)
        );
    }
}
