//! Year partitions and search query templates

use std::ops::RangeInclusive;

/// Split `[start, end]` into `n` contiguous, non-overlapping ranges.
///
/// `n` is clamped to `[1, span]`; the last range absorbs the remainder.
pub fn partition_years(start: i32, end: i32, n: usize) -> Vec<RangeInclusive<i32>> {
    if end < start {
        return Vec::new();
    }
    // i64 so the full i32 range does not overflow
    let span = i64::from(end) - i64::from(start) + 1;
    let n = i64::try_from(n).unwrap_or(i64::MAX).clamp(1, span);
    let width = span / n;
    (0..n)
        .map(|i| {
            let lo = i64::from(start) + i * width;
            let hi = if i + 1 == n { i64::from(end) } else { lo + width - 1 };
            // Both bounds lie within [start, end]
            lo as i32..=hi as i32
        })
        .collect()
}

/// Catalog query with `{start}` / `{end}` year placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate(String);

impl QueryTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, years: &RangeInclusive<i32>) -> String {
        self.0
            .replace("{start}", &years.start().to_string())
            .replace("{end}", &years.end().to_string())
    }
}

/// Rotation from narrow subject match to broad fiction/language match
pub fn default_templates() -> Vec<QueryTemplate> {
    [
        "subject:\"fiction\" first_publish_year:[{start} TO {end}] has_fulltext:true language:eng",
        "subject:\"novel\" first_publish_year:[{start} TO {end}] has_fulltext:true",
        "subject:\"short stories\" first_publish_year:[{start} TO {end}] has_fulltext:true",
        "fiction first_publish_year:[{start} TO {end}] has_fulltext:true",
        "language:eng first_publish_year:[{start} TO {end}] has_fulltext:true",
    ]
    .into_iter()
    .map(QueryTemplate::new)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split() {
        assert_eq!(
            partition_years(1800, 1899, 4),
            vec![1800..=1824, 1825..=1849, 1850..=1874, 1875..=1899]
        );
    }

    #[test]
    fn last_range_absorbs_remainder() {
        let parts = partition_years(1800, 1809, 3);
        assert_eq!(parts, vec![1800..=1802, 1803..=1805, 1806..=1809]);
    }

    #[test]
    fn partitions_cover_span_without_overlap() {
        for n in 1..=12 {
            let parts = partition_years(1850, 1930, n);
            assert_eq!(*parts[0].start(), 1850);
            assert_eq!(*parts.last().unwrap().end(), 1930);
            for pair in parts.windows(2) {
                assert_eq!(*pair[0].end() + 1, *pair[1].start());
            }
        }
    }

    #[test]
    fn worker_count_clamped() {
        assert_eq!(partition_years(1900, 1902, 10).len(), 3);
        assert_eq!(partition_years(1900, 1902, 0), vec![1900..=1902]);
        assert_eq!(partition_years(1900, 1900, 4), vec![1900..=1900]);
    }

    #[test]
    fn extreme_years_do_not_overflow() {
        let parts = partition_years(i32::MIN, i32::MAX, 4);
        assert_eq!(parts.len(), 4);
        assert_eq!(*parts[0].start(), i32::MIN);
        assert_eq!(*parts[3].end(), i32::MAX);
        for pair in parts.windows(2) {
            assert_eq!(*pair[0].end() + 1, *pair[1].start());
        }
        assert_eq!(partition_years(-5, 5, usize::MAX).len(), 11);
    }

    #[test]
    fn inverted_span_is_empty() {
        assert!(partition_years(1900, 1800, 2).is_empty());
    }

    #[test]
    fn template_renders_years() {
        let t = QueryTemplate::new("fiction first_publish_year:[{start} TO {end}]");
        assert_eq!(t.render(&(1850..=1875)), "fiction first_publish_year:[1850 TO 1875]");
    }

    #[test]
    fn default_templates_all_use_years() {
        for t in default_templates() {
            assert!(t.as_str().contains("{start}") && t.as_str().contains("{end}"));
        }
    }
}
