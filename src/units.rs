use chrono::{DateTime, Utc};
use ethers::{types::U256, utils};

use crate::error::ValidationError;

/// Smallest-unit decimals of the native currency.
pub const ETHER_DECIMALS: usize = 18;

/// Parses a decimal ether-denominated string ("0.1", "1.5", ".25") into wei.
pub fn parse_ether_amount(amount: &str) -> Result<U256, ValidationError> {
    let invalid = || ValidationError::InvalidAmount(amount.to_string());

    let trimmed = amount.trim();
    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if fraction.len() > ETHER_DECIMALS {
        return Err(invalid());
    }

    let whole = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|_| invalid())?
    };
    let fraction = if fraction.is_empty() {
        U256::zero()
    } else {
        let padded = format!("{:0<width$}", fraction, width = ETHER_DECIMALS);
        U256::from_dec_str(&padded).map_err(|_| invalid())?
    };
    whole
        .checked_mul(U256::exp10(ETHER_DECIMALS))
        .and_then(|wei| wei.checked_add(fraction))
        .ok_or_else(invalid)
}

/// Formats wei as a decimal ether string without trailing zeros ("1.5", "0", "10").
pub fn format_ether_amount(amount: U256) -> String {
    let formatted = utils::format_ether(amount);
    if !formatted.contains('.') {
        return formatted;
    }
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Converts an on-chain seconds-since-epoch value into a UTC datetime.
pub fn timestamp_from_epoch(secs: U256) -> Option<DateTime<Utc>> {
    if secs > U256::from(i64::MAX as u64) {
        return None;
    }
    DateTime::<Utc>::from_timestamp(secs.as_u64() as i64, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wei(s: &str) -> U256 {
        U256::from_dec_str(s).unwrap()
    }

    #[test]
    fn test_parse_ether_amount() {
        assert_eq!(parse_ether_amount("0.1").unwrap(), wei("100000000000000000"));
        assert_eq!(parse_ether_amount("1.5").unwrap(), wei("1500000000000000000"));
        assert_eq!(parse_ether_amount("2").unwrap(), wei("2000000000000000000"));
        assert_eq!(parse_ether_amount(".25").unwrap(), wei("250000000000000000"));
        assert_eq!(parse_ether_amount(" 3. ").unwrap(), wei("3000000000000000000"));
        assert_eq!(parse_ether_amount("0.000000000000000001").unwrap(), U256::one());
    }

    #[test]
    fn test_parse_ether_amount_rejects_garbage() {
        for bad in ["", " ", ".", "-1", "+1", "1e18", "abc", "1.2.3", "0.0000000000000000001"] {
            assert_eq!(
                parse_ether_amount(bad),
                Err(ValidationError::InvalidAmount(bad.to_string())),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_parse_ether_amount_overflow() {
        let max_ether = U256::MAX / U256::exp10(ETHER_DECIMALS);
        assert_eq!(
            parse_ether_amount(&max_ether.to_string()).unwrap(),
            max_ether * U256::exp10(ETHER_DECIMALS)
        );

        let too_big = (max_ether + U256::one()).to_string();
        let huge = format!("1{}", "0".repeat(66));
        let huge_fraction = format!("{}.5", huge);
        for bad in [too_big.as_str(), huge.as_str(), huge_fraction.as_str()] {
            assert_eq!(
                parse_ether_amount(bad),
                Err(ValidationError::InvalidAmount(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_format_ether_amount() {
        assert_eq!(format_ether_amount(wei("1500000000000000000")), "1.5");
        assert_eq!(format_ether_amount(wei("100000000000000000")), "0.1");
        assert_eq!(format_ether_amount(wei("10000000000000000000")), "10");
        assert_eq!(format_ether_amount(U256::zero()), "0");
        assert_eq!(format_ether_amount(U256::one()), "0.000000000000000001");
    }

    #[test]
    fn test_amount_survives_conversion() {
        for amount in ["1.5", "0.1", "42", "0.000000000000000001", "123.456"] {
            let back = format_ether_amount(parse_ether_amount(amount).unwrap());
            assert_eq!(back, amount);
        }
    }

    #[test]
    fn test_timestamp_from_epoch() {
        let ts = timestamp_from_epoch(U256::from(1_700_000_000u64)).unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert!(timestamp_from_epoch(U256::MAX).is_none());
    }
}
