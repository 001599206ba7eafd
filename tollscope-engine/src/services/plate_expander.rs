//! Plate identity expansion
//!
//! Plate reads come from OCR on lane images and routinely swap visually
//! similar characters. Expanding a plate into every string reachable by
//! independently swapping each confusable character lets two reads of the same
//! vehicle meet even when one of them is misread.
//!
//! The confusion table maps each character to exactly one alternate and is not
//! symmetric: `D` reads as `O`, but `O` reads as `Q`. Expansion follows the
//! table as observed at the plazas and does not close it under reversal.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use tollscope_common::{Error, Result};

/// OCR confusion table: character → the one alternate it is misread as
static OCR_CONFUSIONS: Lazy<HashMap<char, char>> = Lazy::new(|| {
    [
        ('O', 'Q'),
        ('Q', 'O'),
        ('8', 'B'),
        ('B', '8'),
        ('1', 'I'),
        ('I', '1'),
        ('A', '4'),
        ('4', 'A'),
        ('D', 'O'),
        ('G', '6'),
        ('6', 'G'),
        ('S', '5'),
        ('5', 'S'),
    ]
    .into_iter()
    .collect()
});

/// Upper bound on confusable positions (2^k variants per plate)
pub const MAX_CONFUSABLE_POSITIONS: usize = 20;

/// Alternate reading of a character, if it is confusable
pub fn ocr_alternate(c: char) -> Option<char> {
    OCR_CONFUSIONS.get(&c).copied()
}

/// Number of confusable positions in a plate
pub fn confusable_count(plate: &str) -> usize {
    plate.chars().filter(|c| OCR_CONFUSIONS.contains_key(c)).count()
}

/// Expand a plate into all OCR-confusion variants
///
/// **Algorithm:**
/// Each of the `k` confusable positions independently takes either its
/// original or its alternate character. Bit `j` of a mask in `0..2^k` selects
/// the alternate for the `j`-th confusable position, so the result holds
/// exactly `2^k` distinct strings, mask `0` being the plate itself.
///
/// # Errors
///
/// - `InvalidInput` for a blank plate
/// - `InvalidInput` when the plate has more than
///   [`MAX_CONFUSABLE_POSITIONS`] confusable characters
pub fn expand(plate: &str) -> Result<BTreeSet<String>> {
    if plate.trim().is_empty() {
        return Err(Error::InvalidInput("plate value blank".to_string()));
    }

    let chars: Vec<char> = plate.chars().collect();
    let positions: Vec<(usize, char)> = chars
        .iter()
        .enumerate()
        .filter_map(|(i, &c)| ocr_alternate(c).map(|alt| (i, alt)))
        .collect();

    if positions.len() > MAX_CONFUSABLE_POSITIONS {
        return Err(Error::InvalidInput(format!(
            "plate {:?} has {} confusable characters (limit {})",
            plate,
            positions.len(),
            MAX_CONFUSABLE_POSITIONS
        )));
    }

    let variant_count = 1u64 << positions.len();
    let mut variants = BTreeSet::new();
    let mut buffer = chars.clone();

    for mask in 0..variant_count {
        buffer.copy_from_slice(&chars);
        for (bit, &(index, alternate)) in positions.iter().enumerate() {
            if mask & (1 << bit) != 0 {
                buffer[index] = alternate;
            }
        }
        variants.insert(buffer.iter().collect::<String>());
    }

    Ok(variants)
}

/// Variants in lookup order: the plate as read first, then the rest sorted
///
/// Plates too ambiguous to expand match on their exact value only.
pub fn lookup_order(plate: &str) -> Vec<String> {
    match expand(plate) {
        Ok(variants) => {
            let mut ordered = Vec::with_capacity(variants.len());
            ordered.push(plate.to_string());
            ordered.extend(variants.into_iter().filter(|v| v != plate));
            ordered
        }
        Err(e) => {
            tracing::warn!(plate, error = %e, "Plate not expanded, matching exact value only");
            vec![plate.to_string()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_two_confusable_chars() {
        assert_eq!(expand("BB").unwrap(), set(&["BB", "88", "B8", "8B"]));
    }

    #[test]
    fn test_three_confusable_chars() {
        assert_eq!(
            expand("BBB").unwrap(),
            set(&["BBB", "8BB", "88B", "888", "B8B", "BB8", "B88", "8B8"])
        );
    }

    #[test]
    fn test_no_confusable_chars() {
        assert_eq!(expand("XYZ").unwrap(), set(&["XYZ"]));
    }

    #[test]
    fn test_mixed_plate_variant_count() {
        // 'A', 'B', '1' confusable; 'C', '2', '3' fixed
        let variants = expand("ABC123").unwrap();
        assert_eq!(variants.len(), 8);
        assert!(variants.contains("ABC123"));
        assert!(variants.contains("48CI23"));
    }

    #[test]
    fn test_confusion_map_is_asymmetric() {
        assert_eq!(ocr_alternate('D'), Some('O'));
        assert_eq!(ocr_alternate('O'), Some('Q'));
        assert_eq!(expand("D").unwrap(), set(&["D", "O"]));
        assert_eq!(expand("O").unwrap(), set(&["O", "Q"]));
    }

    #[test]
    fn test_blank_plate_rejected() {
        assert!(matches!(expand(""), Err(Error::InvalidInput(_))));
        assert!(matches!(expand("   "), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_calls_do_not_share_state() {
        let first = expand("BB").unwrap();
        let second = expand("XO").unwrap();
        assert_eq!(second, set(&["XO", "XQ"]));
        assert_eq!(expand("BB").unwrap(), first);
    }

    #[test]
    fn test_too_many_confusable_positions() {
        let plate = "8".repeat(MAX_CONFUSABLE_POSITIONS + 1);
        assert!(expand(&plate).is_err());
        assert_eq!(lookup_order(&plate), vec![plate]);
    }

    #[test]
    fn test_lookup_order_starts_with_original() {
        let order = lookup_order("B8");
        assert_eq!(order[0], "B8");
        assert_eq!(order.len(), 4);
        assert_eq!(&order[1..], &["88".to_string(), "8B".to_string(), "BB".to_string()]);
    }
}
