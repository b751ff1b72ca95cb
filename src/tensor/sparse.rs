//! Merge kernels over sorted (key number, value) parallel arrays.
//!
//! All sparse tensors keep their key numbers strictly increasing, so
//! binary operations between equally-shaped operands reduce to linear
//! merges.

use super::shape::KeyNum;

/// Value stored at `key_num`, or 0.0 when absent.
pub(crate) fn get(keys: &[KeyNum], values: &[f64], key_num: KeyNum) -> f64 {
    match keys.binary_search(&key_num) {
        Ok(i) => values[i],
        Err(_) => 0.0,
    }
}

/// Intersection merge: output carries a key only when both sides do.
/// Suited to multiplication, where an absent key annihilates.
pub(crate) fn merge_product(
    left_keys: &[KeyNum],
    left_values: &[f64],
    right_keys: &[KeyNum],
    right_values: &[f64],
) -> (Vec<KeyNum>, Vec<f64>) {
    let cap = left_keys.len().min(right_keys.len());
    let mut keys = Vec::with_capacity(cap);
    let mut values = Vec::with_capacity(cap);
    let (mut i, mut j) = (0, 0);
    while i < left_keys.len() && j < right_keys.len() {
        if left_keys[i] < right_keys[j] {
            i += 1;
        } else if right_keys[j] < left_keys[i] {
            j += 1;
        } else {
            let v = left_values[i] * right_values[j];
            if v != 0.0 {
                keys.push(left_keys[i]);
                values.push(v);
            }
            i += 1;
            j += 1;
        }
    }
    (keys, values)
}

/// Union merge with a combiner applied where both sides carry a key; a key
/// present on one side only keeps that side's value combined with 0.0.
pub(crate) fn merge_combine(
    left_keys: &[KeyNum],
    left_values: &[f64],
    right_keys: &[KeyNum],
    right_values: &[f64],
    combine: impl Fn(f64, f64) -> f64,
) -> (Vec<KeyNum>, Vec<f64>) {
    let cap = left_keys.len() + right_keys.len();
    let mut keys = Vec::with_capacity(cap);
    let mut values = Vec::with_capacity(cap);
    let (mut i, mut j) = (0, 0);
    while i < left_keys.len() || j < right_keys.len() {
        let (k, v) = if j >= right_keys.len()
            || (i < left_keys.len() && left_keys[i] < right_keys[j])
        {
            let out = (left_keys[i], combine(left_values[i], 0.0));
            i += 1;
            out
        } else if i >= left_keys.len() || right_keys[j] < left_keys[i] {
            let out = (right_keys[j], combine(0.0, right_values[j]));
            j += 1;
            out
        } else {
            let out = (left_keys[i], combine(left_values[i], right_values[j]));
            i += 1;
            j += 1;
            out
        };
        if v != 0.0 {
            keys.push(k);
            values.push(v);
        }
    }
    (keys, values)
}

/// Product of a sparse operand against a prefix-aligned smaller operand:
/// the small shape's dimensions are exactly the leading dimensions of the
/// big shape, so `small_key = big_key / multiplier`. Both inputs sorted,
/// output sorted.
pub(crate) fn prefix_product(
    big_keys: &[KeyNum],
    big_values: &[f64],
    small_keys: &[KeyNum],
    small_values: &[f64],
    multiplier: KeyNum,
) -> (Vec<KeyNum>, Vec<f64>) {
    let mut keys = Vec::with_capacity(big_keys.len());
    let mut values = Vec::with_capacity(big_keys.len());
    let mut j = 0;
    for (k, v) in big_keys.iter().zip(big_values.iter()) {
        let prefix = k / multiplier;
        while j < small_keys.len() && small_keys[j] < prefix {
            j += 1;
        }
        if j < small_keys.len() && small_keys[j] == prefix {
            let prod = v * small_values[j];
            if prod != 0.0 {
                keys.push(*k);
                values.push(prod);
            }
        }
    }
    (keys, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_intersects() {
        let (k, v) = merge_product(&[1, 3, 5], &[2.0, 3.0, 4.0], &[3, 5, 7], &[10.0, 0.0, 1.0]);
        assert_eq!(k, vec![3]);
        assert_eq!(v, vec![30.0]);
    }

    #[test]
    fn combine_unions() {
        let (k, v) = merge_combine(
            &[1, 3],
            &[2.0, -1.0],
            &[3, 4],
            &[1.0, 5.0],
            |a, b| a + b,
        );
        assert_eq!(k, vec![1, 4]);
        assert_eq!(v, vec![2.0, 5.0]);
    }

    #[test]
    fn prefix_product_divides_keys() {
        // big over 2x3 (prefix dim size 2, multiplier 3), small over the prefix.
        let (k, v) = prefix_product(&[0, 2, 4, 5], &[1.0, 2.0, 3.0, 4.0], &[1], &[10.0], 3);
        assert_eq!(k, vec![4, 5]);
        assert_eq!(v, vec![30.0, 40.0]);
    }
}
