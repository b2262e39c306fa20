//! National individual tax id (CPF) checksum.
//!
//! An id is 11 digits: 9 base digits followed by two modulo-11 check digits,
//! the first computed over the 9 base digits and the second over the first 10.

const LEN: usize = 11;

/// Returns the digits-only form of `raw` when it carries a valid checksum.
///
/// Punctuation is ignored, so `"529.982.247-25"` and `"52998224725"` are the
/// same id. Anything else, including ids made of a single repeated digit,
/// yields `None`.
pub fn normalize(raw: &str) -> Option<String> {
    let digits: Vec<u32> = raw.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != LEN || digits.iter().all(|d| *d == digits[0]) {
        return None;
    }
    if check_digit(&digits[..9]) != digits[9] || check_digit(&digits[..10]) != digits[10] {
        return None;
    }
    Some(digits.iter().map(|d| char::from(b'0' + *d as u8)).collect())
}

pub fn is_valid(raw: &str) -> bool {
    normalize(raw).is_some()
}

/// Weights run from `len + 1` down to 2; a remainder of 10 maps to 0.
fn check_digit(digits: &[u32]) -> u32 {
    let weight_start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    match (sum * 10) % 11 {
        10 => 0,
        r => r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_known_valid_ids() {
        assert_eq!(normalize("529.982.247-25").as_deref(), Some("52998224725"));
        assert!(is_valid("11144477735"));
    }

    #[test]
    fn test_wrong_check_digits() {
        assert!(!is_valid("52998224724"));
        assert!(!is_valid("52998224715"));
    }

    #[test]
    fn test_wrong_length_or_repeated() {
        assert!(!is_valid(""));
        assert!(!is_valid("5299822472"));
        assert!(!is_valid("529982247250"));
        assert!(!is_valid("111.111.111-11"));
        assert!(!is_valid("00000000000"));
    }

    #[test]
    fn test_generated_ids_validate_and_corruption_is_caught() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let mut digits: Vec<u32> = (0..9).map(|_| rng.gen_range(0..10)).collect();
            if digits.iter().all(|d| *d == digits[0]) {
                continue;
            }
            digits.push(check_digit(&digits));
            digits.push(check_digit(&digits));
            let id: String = digits.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
            assert!(is_valid(&id), "{id} should be valid");

            let mut corrupted = digits.clone();
            corrupted[10] = (corrupted[10] + 1) % 10;
            let bad: String = corrupted.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
            assert!(!is_valid(&bad), "{bad} should be invalid");
        }
    }
}
