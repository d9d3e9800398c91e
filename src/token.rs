// Certificate numbers double as the public verification key, so they have to
// be unique without a ledger round-trip, sort by issuance time, and survive
// being pasted into a URL.

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use rand::Rng;

const PREFIX: &str = "CERT";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

/// Millisecond timestamp prefix keeps numbers greppable by issuance time;
/// 4 random bytes make collisions practically unreachable. The ledger's
/// unique constraint still backstops the improbable case and callers retry.
pub fn generate_number(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}-{}-{:08X}", PREFIX, now.timestamp_millis(), suffix)
}

pub fn verification_url(base_url: &str, number: &str) -> String {
    format!(
        "{}/certificates/verify/{}",
        base_url.trim_end_matches('/'),
        utf8_percent_encode(number, PATH_SEGMENT)
    )
}

/// Shape check used before touching the filesystem on artifact lookups.
pub fn is_well_formed(number: &str) -> bool {
    let mut parts = number.splitn(3, '-');
    let (Some(prefix), Some(millis), Some(suffix)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    prefix == PREFIX
        && !millis.is_empty()
        && millis.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == 8
        && suffix.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn number_shape_and_roundtrip() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let number = generate_number(now);
        assert!(number.starts_with("CERT-1700000000000-"));
        assert!(is_well_formed(&number));
    }

    #[test]
    fn numbers_sort_by_issuance_time() {
        let earlier = generate_number(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
        let later = generate_number(Utc.timestamp_millis_opt(1_700_000_000_001).unwrap());
        assert!(later > earlier);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("CERT-"));
        assert!(!is_well_formed("CERT-abc-0A1B2C3D"));
        assert!(!is_well_formed("CERT-1700000000000-0a1b2c3d"));
        assert!(!is_well_formed("CERT-1700000000000-0A1B"));
        assert!(!is_well_formed("../../etc/passwd"));
    }

    #[test]
    fn verification_url_joins_cleanly() {
        let url = verification_url("https://lms.example.com/", "CERT-1-0A1B2C3D");
        assert_eq!(url, "https://lms.example.com/certificates/verify/CERT-1-0A1B2C3D");
    }
}
