// Natural ("human") ordering for page file names: page2 < page10

use std::cmp::Ordering;
use std::path::Path;

/// Compare two strings treating runs of ASCII digits as numbers.
///
/// Everything else compares character by character, case-sensitively, so
/// `B.png` sorts before `a.png`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_num = take_digits(&mut left);
                let r_num = take_digits(&mut right);
                let ord = compare_digit_runs(&l_num, &r_num);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                let ord = l.cmp(&r);
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

/// Natural ordering on file names, falling back to the full path
pub fn natural_path_cmp(a: &Path, b: &Path) -> Ordering {
    let name = |p: &Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    natural_cmp(&name(a), &name(b)).then_with(|| a.cmp(b))
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

// Arbitrary length: compare without parsing so "0000123" never overflows
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        .then_with(|| a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_numbers_compare_by_value() {
        let mut names = vec!["page10.png", "page2.png", "page1.png", "page3.png"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["page1.png", "page2.png", "page3.png", "page10.png"]);
    }

    #[test]
    fn test_letters_compare_case_sensitively() {
        let mut names = vec!["a.png", "B.png", "b.png", "A.png"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["A.png", "B.png", "a.png", "b.png"]);
        assert_eq!(natural_cmp("Page3.png", "page1.png"), Ordering::Less);
    }

    #[test]
    fn test_leading_zeros_and_long_runs() {
        assert_eq!(natural_cmp("001", "1"), Ordering::Greater);
        assert_eq!(natural_cmp("09", "10"), Ordering::Less);
        assert_eq!(
            natural_cmp("ch99999999999999999999999", "ch100000000000000000000000"),
            Ordering::Less
        );
    }

    #[test]
    fn test_path_ordering_uses_file_name() {
        let mut paths = vec![
            PathBuf::from("/in/12.jpg"),
            PathBuf::from("/in/1.jpg"),
            PathBuf::from("/in/3.png"),
        ];
        paths.sort_by(|a, b| natural_path_cmp(a, b));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/in/1.jpg"),
                PathBuf::from("/in/3.png"),
                PathBuf::from("/in/12.jpg"),
            ]
        );
    }
}
