// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! File name sequences for look-ahead hints.
//!
//! Datasets arrive with sequential names such as `N20240101S0001.fits`,
//! `N20240101S0002.fits`, ... Given the newest name in a batch we can tell
//! the destination watcher which names to expect next. The prediction is
//! advisory only; a wrong guess costs nothing but a wasted poll.

/// Produces the name that follows a given name in the naming convention.
pub trait NameSequence: Send + Sync + 'static {
    /// `None` if `name` does not follow the convention.
    fn next(&self, name: &str) -> Option<String>;
}

/// `<prefix><digits><rest>.<ext>`: the last run of ASCII digits in the stem is
/// the counter.
///
/// Incrementing preserves zero padding (`S0009` → `S0010`) and widens on
/// overflow (`S9999` → `S10000`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetNameSequence;

impl NameSequence for DatasetNameSequence {
    fn next(&self, name: &str) -> Option<String> {
        let (stem, ext) = match name.rfind('.') {
            Some(idx) if idx > 0 => name.split_at(idx),
            _ => (name, ""),
        };

        let bytes = stem.as_bytes();
        let end = bytes.iter().rposition(|b| b.is_ascii_digit())? + 1;
        let start = bytes[..end]
            .iter()
            .rposition(|b| !b.is_ascii_digit())
            .map_or(0, |i| i + 1);

        let counter = increment_digits(&stem[start..end]);
        Some(format!("{}{}{}{}", &stem[..start], counter, &stem[end..], ext))
    }
}

/// Decimal increment of a digit string, keeping its width unless it overflows.
fn increment_digits(digits: &str) -> String {
    let mut out: Vec<u8> = digits.as_bytes().to_vec();
    for b in out.iter_mut().rev() {
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            return String::from_utf8_lossy(&out).into_owned();
        }
    }
    let mut widened = String::with_capacity(out.len() + 1);
    widened.push('1');
    widened.push_str(&String::from_utf8_lossy(&out));
    widened
}

/// The `count` names expected after the greatest of `names`.
///
/// Names compare as plain strings, which matches sequence order for
/// zero-padded counters. Returns fewer than `count` names (possibly none) if
/// the sequence cannot continue.
pub fn lookahead<'a, S, I>(sequence: &S, names: I, count: usize) -> Vec<String>
where
    S: NameSequence + ?Sized,
    I: IntoIterator<Item = &'a str>,
{
    let Some(greatest) = names.into_iter().filter(|n| !n.is_empty()).max() else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(count);
    let mut current = greatest.to_string();
    for _ in 0..count {
        match sequence.next(&current) {
            Some(next) => {
                out.push(next.clone());
                current = next;
            }
            None => break,
        }
    }
    out
}
