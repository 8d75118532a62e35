use chargeguard_core_types::{PortalError, PortalResult};
use hmac::{Hmac, Mac};
use http::HeaderName;
use sha2::{Sha256, Sha512};

pub const DEFAULT_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HmacAlgorithm {
    Sha256,
    Sha512,
}

impl HmacAlgorithm {
    /// HMAC over the concatenation of `parts`.
    pub fn compute(&self, key: &[u8], parts: &[&[u8]]) -> PortalResult<Vec<u8>> {
        let rejected = |_| PortalError::Configuration("webhook secret rejected by hmac".into());
        Ok(match self {
            HmacAlgorithm::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(rejected)?;
                for part in parts {
                    mac.update(part);
                }
                mac.finalize().into_bytes().to_vec()
            }
            HmacAlgorithm::Sha512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(key).map_err(rejected)?;
                for part in parts {
                    mac.update(part);
                }
                mac.finalize().into_bytes().to_vec()
            }
        })
    }
}

/// How a portal signs the deliveries it pushes.
#[derive(Clone, Debug)]
pub enum SignatureScheme {
    /// Hex HMAC of the raw body. Hex case is ignored; `prefix` (e.g.
    /// `sha512=`) is stripped before decoding.
    RawHmacHex {
        header: HeaderName,
        algorithm: HmacAlgorithm,
        prefix: Option<String>,
    },
    /// `t=<unix>,v1=<hex>` header; HMAC-SHA256 over `"{t}.{body}"`.
    TimestampedHmac {
        header: HeaderName,
        tolerance_secs: i64,
    },
    /// Base64 HMAC over the callback URL followed by the raw body. The URL is
    /// read from `url_header` when the delivery carries it, else
    /// `notification_url`.
    UrlBodyHmacBase64 {
        header: HeaderName,
        algorithm: HmacAlgorithm,
        url_header: Option<HeaderName>,
        notification_url: Option<String>,
    },
}

impl SignatureScheme {
    pub fn raw_hex(header: &'static str, algorithm: HmacAlgorithm) -> Self {
        SignatureScheme::RawHmacHex {
            header: HeaderName::from_static(header),
            algorithm,
            prefix: None,
        }
    }

    pub fn timestamped(header: &'static str) -> Self {
        SignatureScheme::TimestampedHmac {
            header: HeaderName::from_static(header),
            tolerance_secs: DEFAULT_TIMESTAMP_TOLERANCE_SECS,
        }
    }

    pub fn header(&self) -> &HeaderName {
        match self {
            SignatureScheme::RawHmacHex { header, .. }
            | SignatureScheme::TimestampedHmac { header, .. }
            | SignatureScheme::UrlBodyHmacBase64 { header, .. } => header,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignatureScheme::RawHmacHex { .. } => "raw_hmac_hex",
            SignatureScheme::TimestampedHmac { .. } => "timestamped_hmac",
            SignatureScheme::UrlBodyHmacBase64 { .. } => "url_body_hmac_base64",
        }
    }
}

/// Parsed `t=..,v1=..` header. Unknown keys are ignored and several `v1`
/// entries may be present during secret rotation.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct TimestampedHeader<'a> {
    pub timestamp: Option<&'a str>,
    pub signatures: Vec<&'a str>,
}

pub(crate) fn parse_timestamped(value: &str) -> TimestampedHeader<'_> {
    let mut parsed = TimestampedHeader::default();
    for item in value.split(',') {
        let Some((key, val)) = item.trim().split_once('=') else {
            continue;
        };
        match key.trim() {
            "t" => parsed.timestamp = Some(val.trim()),
            "v1" => parsed.signatures.push(val.trim()),
            _ => {}
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamp_and_all_v1_entries() {
        let parsed = parse_timestamped("t=1700000000, v1=aa,v0=zz,v1=bb");
        assert_eq!(parsed.timestamp, Some("1700000000"));
        assert_eq!(parsed.signatures, vec!["aa", "bb"]);
    }

    #[test]
    fn garbage_items_are_skipped() {
        let parsed = parse_timestamped("nonsense,,v1=cc");
        assert_eq!(parsed.timestamp, None);
        assert_eq!(parsed.signatures, vec!["cc"]);
    }

    #[test]
    fn sha512_output_is_sixty_four_bytes() {
        assert_eq!(HmacAlgorithm::Sha512.compute(b"k", &[b"body"]).unwrap().len(), 64);
        assert_eq!(HmacAlgorithm::Sha256.compute(b"k", &[b"body"]).unwrap().len(), 32);
    }
}
