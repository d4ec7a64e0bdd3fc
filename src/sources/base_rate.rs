use scraper::Html;

/// All text nodes of the page, whitespace removed and lowercased.
fn compact_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    doc.root_element()
        .text()
        .flat_map(|t| t.chars())
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn compact(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Number directly after the first digit following `marker`, if it is
/// immediately followed by `%`. Whitespace is ignored throughout.
pub fn extract_rate(html: &str, marker: &str) -> Option<f64> {
    let text = compact_text(html);
    let marker = compact(marker);
    if marker.is_empty() {
        return None;
    }

    text.match_indices(&marker).find_map(|(pos, _)| {
        let tail = &text[pos + marker.len()..];
        let start = tail.find(|c: char| c.is_ascii_digit())?;
        let rest = &tail[start..];

        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let mut end = int_len;
        if let Some(frac) = rest[int_len..].strip_prefix('.') {
            let frac_len = frac.find(|c: char| !c.is_ascii_digit()).unwrap_or(frac.len());
            if frac_len > 0 {
                end = int_len + 1 + frac_len;
            }
        }

        if rest[end..].starts_with('%') {
            rest[..end].parse().ok()
        } else {
            None
        }
    })
}

pub fn display(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("기준금리 {}%", r),
        None => "기준금리 표시 없음".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_marker() {
        let html = r#"<html><body><div class="rate"><span>BOK Base Rate</span>
            <strong> 2.50 </strong><em>%</em></div></body></html>"#;
        assert_eq!(extract_rate(html, "BOK Base Rate"), Some(2.5));
    }

    #[test]
    fn korean_marker() {
        let html = "<p>한국은행 기준 금리 : 3.25%</p>";
        assert_eq!(extract_rate(html, "기준금리"), Some(3.25));
    }

    #[test]
    fn first_number_must_be_a_percentage() {
        let html = "<p>기준금리 2025.01.16 발표</p><p>기준금리 3%</p>";
        assert_eq!(extract_rate(html, "기준금리"), Some(3.0));
        assert_eq!(extract_rate("<p>기준금리 발표 예정</p>", "기준금리"), None);
        assert_eq!(extract_rate("<p>nothing</p>", "기준금리"), None);
    }

    #[test]
    fn display_text() {
        assert_eq!(display(Some(2.5)), "기준금리 2.5%");
        assert_eq!(display(None), "기준금리 표시 없음");
    }
}
