//! Checkout reference codes.
//!
//! A reference is generated once when checkout opens and shown to the donor
//! so manual Cash App / Zelle transfers can be matched to the cart. Format:
//! `GIF-<base36 unix millis, uppercase>-<4 digits>`.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Prefix shared by every reference.
pub const REFERENCE_PREFIX: &str = "GIF";

/// Generate a reference for a checkout opened at `now`.
pub fn generate_reference<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    let suffix: u16 = rng.random_range(1000..10_000);
    format!("{REFERENCE_PREFIX}-{}-{suffix}", to_base36(millis))
}

/// True if `value` has the shape of a generated reference.
#[must_use]
pub fn is_reference(value: &str) -> bool {
    let mut parts = value.split('-');
    let (Some(prefix), Some(stamp), Some(suffix), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    prefix == REFERENCE_PREFIX
        && !stamp.is_empty()
        && stamp
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        && suffix.len() == 4
        && suffix.chars().all(|c| c.is_ascii_digit())
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        let index = usize::try_from(value % 36).unwrap_or_default();
        out.push(DIGITS.get(index).copied().unwrap_or(b'0'));
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "LOYW3V28");
    }

    #[test]
    fn test_reference_format() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let reference = generate_reference(now, &mut rng);

        assert!(reference.starts_with("GIF-LOYW3V28-"));
        assert!(is_reference(&reference), "{reference}");
    }

    #[test]
    fn test_is_reference_rejects_other_shapes() {
        assert!(!is_reference("GIF-ABC-12"));
        assert!(!is_reference("XYZ-ABC-1234"));
        assert!(!is_reference("GIF-abc-1234"));
        assert!(!is_reference("GIF-ABC-1234-5"));
    }
}
