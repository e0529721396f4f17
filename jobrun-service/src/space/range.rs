// Integer Range Expressions
// Parses task parameter ranges such as "1-10", "1-10:2", "1,3,5-7" and "10-1:-3"

/// One comma-separated component of a range expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RangeComponent {
    start: i64,
    step: i64,
    len: u64,
}

impl RangeComponent {
    /// Value at `index`; every in-bounds value lies between the component's bounds
    fn nth(&self, index: u64) -> Option<i64> {
        if index >= self.len {
            return None;
        }
        let value = i128::from(self.start) + i128::from(index) * i128::from(self.step);
        i64::try_from(value).ok()
    }
}

/// A parsed integer range expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntRangeExpr {
    components: Vec<RangeComponent>,
}

impl IntRangeExpr {
    /// Parse an expression; whitespace around numbers and separators is ignored
    pub fn parse(expr: &str) -> Result<Self, String> {
        if expr.trim().is_empty() {
            return Err("range expression is empty".to_string());
        }

        let components = expr
            .split(',')
            .map(|part| parse_component(part.trim(), expr))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { components })
    }

    /// Number of values, computed without expanding the range.
    /// `None` when the count does not fit in a `u64`.
    pub fn len(&self) -> Option<u64> {
        self.components
            .iter()
            .try_fold(0u64, |total, c| total.checked_add(c.len))
    }

    /// Value at `index` in expression order
    pub fn nth(&self, mut index: u64) -> Option<i64> {
        for component in &self.components {
            if index < component.len {
                return component.nth(index);
            }
            index -= component.len;
        }
        None
    }
}

fn parse_component(part: &str, expr: &str) -> Result<RangeComponent, String> {
    let invalid = || format!("'{}' is not a valid range expression", expr);
    if part.is_empty() {
        return Err(invalid());
    }

    let (bounds, step) = match part.split_once(':') {
        Some((bounds, step)) => (bounds.trim(), Some(parse_int(step).ok_or_else(invalid)?)),
        None => (part, None),
    };

    let (start_text, rest) = split_leading_int(bounds).ok_or_else(invalid)?;
    let start = parse_int(start_text).ok_or_else(invalid)?;

    let rest = rest.trim();
    let end = if rest.is_empty() {
        start
    } else {
        let end_text = rest.strip_prefix('-').ok_or_else(invalid)?;
        parse_int(end_text).ok_or_else(invalid)?
    };

    let step = match step {
        Some(0) => return Err(format!("range step in '{}' must not be zero", expr)),
        Some(step) => {
            if (end > start && step < 0) || (end < start && step > 0) {
                return Err(format!(
                    "range step {} in '{}' moves away from the range end",
                    step, expr
                ));
            }
            step
        }
        None if end < start => -1,
        None => 1,
    };

    let len = (end.abs_diff(start) / step.unsigned_abs())
        .checked_add(1)
        .ok_or_else(|| format!("range '{}' has too many values", part))?;

    Ok(RangeComponent { start, step, len })
}

/// Split an optionally signed integer off the front of `text`
fn split_leading_int(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    let sign_len = usize::from(text.starts_with('-') || text.starts_with('+'));
    let digits = text[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len() - sign_len);
    if digits == 0 {
        return None;
    }
    Some(text.split_at(sign_len + digits))
}

fn parse_int(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(range: &IntRangeExpr) -> Vec<i64> {
        (0..range.len().unwrap())
            .map(|i| range.nth(i).unwrap())
            .collect()
    }

    fn parsed(expr: &str) -> Vec<i64> {
        values(&IntRangeExpr::parse(expr).unwrap())
    }

    #[test]
    fn test_simple_range() {
        let range = IntRangeExpr::parse("1-5").unwrap();
        assert_eq!(values(&range), vec![1, 2, 3, 4, 5]);
        assert_eq!(range.len(), Some(5));
        assert_eq!(range.nth(5), None);
    }

    #[test]
    fn test_stepped_and_listed_components() {
        assert_eq!(parsed("1-10:3"), vec![1, 4, 7, 10]);
        assert_eq!(parsed("1, 3, 5-7"), vec![1, 3, 5, 6, 7]);
        assert_eq!(parsed("10-1:-3"), vec![10, 7, 4, 1]);
        assert_eq!(parsed("3-1"), vec![3, 2, 1]);
    }

    #[test]
    fn test_negative_bounds() {
        assert_eq!(parsed("-2-1"), vec![-2, -1, 0, 1]);
        assert_eq!(parsed("-3--1"), vec![-3, -2, -1]);
    }

    #[test]
    fn test_nth_indexes_across_components() {
        let range = IntRangeExpr::parse("1-100:7,200").unwrap();
        assert_eq!(range.len(), Some(16));
        assert_eq!(range.nth(0), Some(1));
        assert_eq!(range.nth(14), Some(99));
        assert_eq!(range.nth(15), Some(200));
        assert_eq!(range.nth(16), None);
    }

    #[test]
    fn test_huge_ranges_are_indexed_lazily() {
        let range = IntRangeExpr::parse("1-2000000000").unwrap();
        assert_eq!(range.len(), Some(2_000_000_000));
        assert_eq!(range.nth(1_999_999_999), Some(2_000_000_000));
    }

    #[test]
    fn test_extreme_bounds_do_not_overflow() {
        let range =
            IntRangeExpr::parse("-9223372036854775808-9223372036854775807:4611686018427387904")
                .unwrap();
        assert_eq!(range.len(), Some(4));
        assert_eq!(range.nth(3), Some(4611686018427387904));

        let err = IntRangeExpr::parse("-9223372036854775808-9223372036854775807").unwrap_err();
        assert!(err.contains("too many values"));

        let wide = IntRangeExpr::parse("0-9223372036854775807,0-9223372036854775807,1").unwrap();
        assert_eq!(wide.len(), None);
        assert_eq!(wide.nth(u64::MAX), Some(i64::MAX));
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(IntRangeExpr::parse("").is_err());
        assert!(IntRangeExpr::parse("a-b").is_err());
        assert!(IntRangeExpr::parse("1-").is_err());
        assert!(IntRangeExpr::parse("1,,2").is_err());
        assert!(IntRangeExpr::parse("1-5:0").unwrap_err().contains("must not be zero"));
        assert!(IntRangeExpr::parse("1-5:-1").is_err());
        assert!(IntRangeExpr::parse("5-1:2").is_err());
    }
}
