//! Filesystem-safe file names for saved texts

/// Longest author part kept in a file name (chars)
const MAX_AUTHOR_CHARS: usize = 40;
/// Longest title part kept in a file name (chars)
const MAX_TITLE_CHARS: usize = 60;

/// Replace anything outside `[alnum - _]` with `_`, collapsing runs and trimming the ends.
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            c if c.is_alphanumeric() || c == '-' => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches('_').to_string()
}

fn truncated(value: &str, max_chars: usize) -> String {
    let s: String = sanitize_component(value).chars().take(max_chars).collect();
    s.trim_matches('_').to_string()
}

/// `Author_Title_Year_Id.txt`. The id suffix keeps two editions with the
/// same author/title/year from overwriting each other.
pub fn book_file_name(author: &str, title: &str, year: Option<i32>, id: &str) -> String {
    let author = Some(truncated(author, MAX_AUTHOR_CHARS))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    let title = Some(truncated(title, MAX_TITLE_CHARS))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "untitled".to_string());
    let year = year.map_or_else(|| "nd".to_string(), |y| y.to_string());
    let id = sanitize_component(id);
    format!("{author}_{title}_{year}_{id}.txt")
}
