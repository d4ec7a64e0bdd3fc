//! Address → region matching over normalized vacancy rows.

use crate::models::RegionVacancyRow;
use std::cmp::Reverse;
use std::collections::HashMap;

const SUBSTRING_SCORE: u32 = 1000;
const TOKEN_SCORE: u32 = 10;
const MIN_TOKEN_CHARS: usize = 2;
const MAX_CANDIDATES: usize = 200;

/// Strip whitespace and common punctuation, lowercase. Hangul is kept.
pub fn normalize_text(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !"()[]-_,./·".contains(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whitespace tokens of at least two characters, normalized.
pub fn address_tokens(address: &str) -> Vec<String> {
    address
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .collect()
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Sortable key for a period label on a single month scale.
///
/// `YYYY` → `YYYY00`, `YYYYQn` / `YYYY-Qn` / `YYYY Qn` / `YYYYn` → the
/// quarter's closing month, `YYYYMM` / `YYYY-MM` / `YYYY/MM` → that month,
/// `YYYYMMDD` → its month. Other all-digit labels sort by their own value;
/// anything else is 0.
pub fn period_sort_key(period: &str) -> u32 {
    let p: String = period
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    match labelled_key(&p) {
        0 if all_digits(&p) => digit_key(&p),
        key => key,
    }
}

fn digit_key(p: &str) -> u32 {
    if p.len() == 8 {
        let month = labelled_key(&p[..6]);
        if month != 0 {
            return month;
        }
    }
    p.parse::<u32>().unwrap_or(0)
}

fn labelled_key(p: &str) -> u32 {
    if p.len() < 4 || !p.is_char_boundary(4) {
        return 0;
    }

    let (year, rest) = p.split_at(4);
    if !all_digits(year) {
        return 0;
    }
    let Ok(year) = year.parse::<u32>() else {
        return 0;
    };

    let (rest, separated) = match rest.strip_prefix(['-', '/']) {
        Some(r) => (r, true),
        None => (rest, false),
    };

    if let Some(q) = rest.strip_prefix('Q') {
        return quarter_key(year, q);
    }

    match rest.len() {
        0 if !separated => year * 100,
        // KOSIS quarterly PRD_DE, e.g. `20252`
        1 if !separated => quarter_key(year, rest),
        2 if all_digits(rest) => match rest.parse::<u32>() {
            Ok(m @ 1..=12) => year * 100 + m,
            _ => 0,
        },
        _ => 0,
    }
}

fn quarter_key(year: u32, q: &str) -> u32 {
    match q {
        "1" | "2" | "3" | "4" => q.parse::<u32>().map_or(0, |q| year * 100 + q * 3),
        _ => 0,
    }
}

/// One row per region, the one with the latest period. Ties keep the first
/// row seen; regions stay in first-seen order.
pub fn latest_by_region(rows: &[RegionVacancyRow]) -> Vec<RegionVacancyRow> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut best: Vec<RegionVacancyRow> = Vec::new();

    for row in rows {
        match index.get(row.region.as_str()) {
            Some(&i) => {
                if period_sort_key(&best[i].period) < period_sort_key(&row.period) {
                    best[i] = row.clone();
                }
            }
            None => {
                index.insert(row.region.as_str(), best.len());
                best.push(row.clone());
            }
        }
    }
    best
}

fn mutual_substring(region_norm: &str, address_norm: &str) -> bool {
    !region_norm.is_empty()
        && !address_norm.is_empty()
        && (address_norm.contains(region_norm) || region_norm.contains(address_norm))
}

fn token_hits(tokens: &[String], region_norm: &str) -> u32 {
    tokens.iter().filter(|t| region_norm.contains(t.as_str())).count() as u32
}

pub fn match_score(row: &RegionVacancyRow, address_norm: &str, tokens: &[String]) -> u32 {
    let region_norm = normalize_text(&row.region);
    let mut score = 0;
    if mutual_substring(&region_norm, address_norm) {
        score += SUBSTRING_SCORE;
    }
    score + token_hits(tokens, &region_norm) * TOKEN_SCORE
}

/// Rows ordered by (match score, period) descending. Stable on ties.
pub fn rank_for_address(rows: &[RegionVacancyRow], address: &str) -> Vec<RegionVacancyRow> {
    let address_norm = normalize_text(address);
    let tokens = address_tokens(address);

    let mut scored: Vec<(u32, u32, &RegionVacancyRow)> = rows
        .iter()
        .map(|r| (match_score(r, &address_norm, &tokens), period_sort_key(&r.period), r))
        .collect();
    scored.sort_by_key(|&(score, period, _)| Reverse((score, period)));
    scored.into_iter().map(|(_, _, r)| r.clone()).collect()
}

/// The best row for `address`, only if it matches with some confidence:
/// a mutual substring, or at least one address token inside the region.
pub fn auto_match(rows: &[RegionVacancyRow], address: &str) -> Option<RegionVacancyRow> {
    if address.trim().is_empty() {
        return None;
    }
    let latest = latest_by_region(rows);
    let top = rank_for_address(&latest, address).into_iter().next()?;

    let region_norm = normalize_text(&top.region);
    let confident = mutual_substring(&region_norm, &normalize_text(address))
        || token_hits(&address_tokens(address), &region_norm) > 0;
    confident.then_some(top)
}

/// Manual selection list: latest rows whose region contains `query`,
/// ordered by token matches then period.
pub fn select_candidates(rows: &[RegionVacancyRow], query: &str) -> Vec<RegionVacancyRow> {
    let query_norm = normalize_text(query);
    let tokens = address_tokens(query);

    let mut items: Vec<(u32, u32, RegionVacancyRow)> = latest_by_region(rows)
        .into_iter()
        .filter(|r| query_norm.is_empty() || normalize_text(&r.region).contains(&query_norm))
        .map(|r| {
            let hits = token_hits(&tokens, &normalize_text(&r.region));
            (hits, period_sort_key(&r.period), r)
        })
        .collect();
    items.sort_by_key(|&(hits, period, _)| Reverse((hits, period)));
    items.truncate(MAX_CANDIDATES);
    items.into_iter().map(|(_, _, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(region: &str, period: &str, vacancy: f64) -> RegionVacancyRow {
        RegionVacancyRow {
            region: region.to_string(),
            vacancy,
            period: period.to_string(),
            group: "상권별".to_string(),
        }
    }

    #[test]
    fn quarter_spellings_agree() {
        let k = period_sort_key("2025Q2");
        assert_eq!(k, period_sort_key("2025-Q2"));
        assert_eq!(k, period_sort_key("2025 Q2"));
        assert_eq!(k, period_sort_key("2025q2"));
        assert_eq!(k, period_sort_key("20252"));
        assert!(k > period_sort_key("2024Q4"));
        assert_eq!(period_sort_key("garbage"), 0);
        assert_eq!(period_sort_key(""), 0);
        assert_eq!(period_sort_key("2025Q5"), 0);
        assert_eq!(period_sort_key("2025Q"), 0);
    }

    #[test]
    fn months_and_years_share_the_scale() {
        assert_eq!(period_sort_key("2024-09"), 202409);
        assert_eq!(period_sort_key("202409"), 202409);
        assert_eq!(period_sort_key("2024/09"), 202409);
        assert_eq!(period_sort_key("2024"), 202400);
        assert_eq!(period_sort_key("2024-13"), 0);
        assert_eq!(period_sort_key("20240915"), 202409);

        let mut keys = ["2024", "202402", "2024Q1", "2024-Q2", "2024-07", "2025"]
            .map(period_sort_key)
            .to_vec();
        let sorted = keys.clone();
        keys.sort();
        assert_eq!(keys, sorted);
        assert_eq!(period_sort_key("2024Q1"), period_sort_key("2024-03"));
    }

    #[test]
    fn other_digit_labels_keep_numeric_order() {
        assert_eq!(period_sort_key("12345"), 12345);
        assert!(period_sort_key("12345") < period_sort_key("12346"));
        assert_eq!(period_sort_key("99999999999"), 0);
    }

    #[test]
    fn non_ascii_prefix_is_unparseable() {
        assert_eq!(period_sort_key("이천이십오년"), 0);
    }

    #[test]
    fn normalization_drops_spacing_and_punctuation() {
        assert_eq!(normalize_text(" 서울 (강남) - 역삼.동 "), "서울강남역삼동");
        assert_eq!(normalize_text("Gangnam·Station"), "gangnamstation");
    }

    #[test]
    fn latest_by_region_keeps_newest_in_first_seen_order() {
        let rows = vec![
            row("강남", "2024Q4", 1.0),
            row("서초", "2025Q1", 2.0),
            row("강남", "2025Q1", 3.0),
            row("강남", "2025-Q1", 4.0),
        ];
        let latest = latest_by_region(&rows);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].region, "강남");
        assert_eq!(latest[0].vacancy, 3.0);
        assert_eq!(latest[1].region, "서초");
    }

    #[test]
    fn substring_match_dominates_token_overlap() {
        let rows = vec![row("강남구", "2025Q1", 5.0), row("서초구", "2025Q2", 6.0)];
        let ranked = rank_for_address(&rows, "서울 강남구 테헤란로 1");
        assert_eq!(ranked[0].region, "강남구");
    }

    #[test]
    fn newer_period_breaks_ties() {
        let rows = vec![row("홍대", "2024Q4", 5.0), row("명동", "2025Q2", 6.0)];
        let ranked = rank_for_address(&rows, "부산 해운대");
        assert_eq!(ranked[0].region, "명동");
        assert_eq!(ranked[1].region, "홍대");
    }

    #[test]
    fn token_overlap_accumulates() {
        let rows = vec![row("테헤란로", "2025Q1", 5.0), row("강남대로 테헤란로", "2024Q1", 6.0)];
        let ranked = rank_for_address(&rows, "강남대로 테헤란로 부근");
        assert_eq!(ranked[0].region, "강남대로 테헤란로");
    }

    #[test]
    fn auto_match_requires_confidence() {
        let rows = vec![row("강남대로", "2025Q1", 5.0), row("명동", "2025Q1", 6.0)];

        let hit = auto_match(&rows, "서울 강남대로 123").unwrap();
        assert_eq!(hit.region, "강남대로");

        assert!(auto_match(&rows, "부산 해운대구 우동").is_none());
        assert!(auto_match(&rows, "   ").is_none());
        assert!(auto_match(&[], "서울 명동").is_none());
    }

    #[test]
    fn auto_match_uses_latest_row() {
        let rows = vec![row("명동", "2024Q4", 9.0), row("명동", "2025Q2", 7.5)];
        let hit = auto_match(&rows, "서울 중구 명동").unwrap();
        assert_eq!(hit.vacancy, 7.5);
    }

    #[test]
    fn candidates_filter_and_order() {
        let rows = vec![
            row("강남대로", "2024Q4", 1.0),
            row("강남역", "2025Q2", 2.0),
            row("명동", "2025Q2", 3.0),
        ];
        let all = select_candidates(&rows, "");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].period, "2025Q2");

        let gangnam = select_candidates(&rows, "강남");
        assert_eq!(gangnam.len(), 2);
        assert_eq!(gangnam[0].region, "강남역");
    }
}
