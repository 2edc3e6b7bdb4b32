//! Luhn (mod-10) checksum validation for order numbers.
//!
//! Pure and allocation-free. Intake calls this before any persistence is
//! attempted; a number that fails here is rejected synchronously.

/// Validate `number` against the Luhn checksum.
///
/// The empty string and any string containing a non-ASCII-digit character
/// return `false` rather than an error; a malformed number is simply not a
/// valid number. The result depends only on the digit sequence, so leading
/// zeros participate like any other digit.
pub fn is_valid(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    let mut sum: u32 = 0;
    let mut double = false;

    for b in number.bytes().rev() {
        if !b.is_ascii_digit() {
            return false;
        }
        let mut digit = u32::from(b - b'0');
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
    }

    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference implementation from the algorithm description: reverse the
    // digits, double every second one, reduce, sum.
    fn reference(number: &str) -> bool {
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        let digits: Vec<u32> = number
            .bytes()
            .rev()
            .map(|b| u32::from(b - b'0'))
            .collect();
        let sum: u32 = digits
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                if i % 2 == 1 {
                    let d2 = d * 2;
                    if d2 > 9 { d2 - 9 } else { d2 }
                } else {
                    d
                }
            })
            .sum();
        sum % 10 == 0
    }

    #[test]
    fn known_vectors() {
        assert!(is_valid("79927398713"));
        assert!(!is_valid("79927398714"));
        assert!(is_valid("0"));
        assert!(is_valid("12345678903"));
        assert!(!is_valid(""));
    }

    #[test]
    fn non_digits_are_invalid_not_errors() {
        assert!(!is_valid("7992-7398-713"));
        assert!(!is_valid(" 79927398713"));
        assert!(!is_valid("79927398713 "));
        assert!(!is_valid("abc"));
    }

    #[test]
    fn leading_zeros_participate_normally() {
        // "018" -> 8 + 2*1 + 0 = 10 -> valid; "019" -> 9 + 2*1 + 0 = 11 -> invalid.
        assert!(is_valid("018"));
        assert!(!is_valid("019"));
        assert!(is_valid("00000"));
    }

    #[test]
    fn matches_reference_over_digit_strings() {
        for n in 0u32..10_000 {
            let s = format!("{n}");
            assert_eq!(is_valid(&s), reference(&s), "disagreement on {s}");
            let padded = format!("{n:07}");
            assert_eq!(is_valid(&padded), reference(&padded), "disagreement on {padded}");
        }
    }
}
