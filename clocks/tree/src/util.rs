// Licensed under the Apache-2.0 license

/// Spells a register word for the generated loader's `bits(..)` and
/// `modify` masks.
///
/// Words up to 9 stay decimal, as in `w.bits(1)`. Larger words are hex with
/// an underscore every four digits counted from the right, so the
/// write-enable half of a masked register sits apart from its data half.
///
/// ```
/// use clock_tree::util::hex_const;
/// assert_eq!(hex_const(5), "5");
/// assert_eq!(hex_const(0x1234), "0x1234");
/// assert_eq!(hex_const(0x037f_011f), "0x37f_011f");
/// ```
pub fn hex_const(word: u32) -> String {
    if word <= 9 {
        return word.to_string();
    }
    let digits = format!("{word:x}");
    let lead = digits.len() % 4;
    let mut out = String::from("0x");
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (i + 4 - lead) % 4 == 0 {
            out.push('_');
        }
        out.push(c);
    }
    out
}

/// Removes repeated entries, keeping the first occurrence of each.
pub fn dedup_stable(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
