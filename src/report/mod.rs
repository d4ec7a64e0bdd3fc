//! Result summary and the exported report (A4 PDF, or plain text for a
//! `.txt` path).

pub mod pdf;

use crate::models::{GradeAxis, ValuationInput, ValuationResult};
use crate::utils::{fmt_amount, fmt_millions, fmt_percent};
use crate::valuation::grades;
use chrono::{Datelike, NaiveDate};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const FACILITY_CHECKLIST: [&str; 6] = [
    "실외 환경",
    "주차/접근로",
    "교통/유동/상권",
    "실내 환경",
    "전기/소방설비",
    "수도/배관설비",
];

const TITLE: &str = "상업용(Retail/office) 부동산 가치 평가 결과";
const SLOGAN: &str =
    "Tomorrow is here, 바로 지금 끊임없이 성장하는 씨엔에스 주식회사와 함께 하십시오.";
const DISCLAIMER: [&str; 2] = [
    "본 프로그램의 결과치는 당사의 축적된 경험과 다각적인 데이터를 종합하여 도출된 추정 가치입니다.",
    "다만, 이는 참고용 추정치로 실제 거래 결과는 시장 환경과 개별 사정에 따라 변동될 수 있음을 유의하여 주시기바랍니다.",
];
const FOOTER: &str = "광주광역시 서구 죽봉대로 37, 씨엔에스 주식회사 www.cnsinc.co.kr";

const RULE: &str = "────────────────────────────────────────────────────────────";
const THIN_RULE: &str = "- - - - - - - - - - - - - - - - - - - - - - - - - - - - - -";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unknown facility {0:?} (choose from the checklist or 1-6)")]
    UnknownFacility(String),

    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportPayload {
    pub property_name: String,
    pub property_address: String,
    pub grade_desc: String,
    pub stab_desc: String,
    pub acc_desc: String,
    pub fac_desc: String,
    pub final_value_text: String,
    pub investigator: String,
    pub date_month: String,
    pub date_day: String,
    pub confirm_facilities: Vec<String>,
    pub confirmer: String,
    pub opinion: String,
}

fn or_dash(s: &str) -> String {
    let s = s.trim();
    if s.is_empty() { "-".into() } else { s.into() }
}

impl ReportPayload {
    /// Payload for a fresh result. Survey fields start blank.
    pub fn from_result(input: &ValuationInput, result: &ValuationResult) -> Self {
        let g = &input.grades;
        Self {
            property_name: or_dash(&input.property_name),
            property_address: or_dash(&input.property_address),
            grade_desc: grades::description(GradeAxis::Location, g.location).into(),
            stab_desc: grades::description(GradeAxis::Stability, g.stability).into(),
            acc_desc: grades::description(GradeAxis::Accessibility, g.accessibility).into(),
            fac_desc: grades::description(GradeAxis::Facility, g.facility).into(),
            final_value_text: fmt_millions(result.market_value),
            ..Default::default()
        }
    }

    pub fn with_survey(mut self, notes: &SurveyNotes) -> Self {
        self.investigator = notes.investigator.clone();
        self.date_month = notes.date_month.clone();
        self.date_day = notes.date_day.clone();
        self.confirm_facilities = notes.confirm_facilities.clone();
        self.confirmer = notes.confirmer.clone();
        self.opinion = notes.opinion.clone();
        self
    }
}

/// Survey details entered alongside a result before export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveyNotes {
    pub investigator: String,
    pub date_month: String,
    pub date_day: String,
    pub confirm_facilities: Vec<String>,
    pub confirmer: String,
    pub opinion: String,
}

impl SurveyNotes {
    /// Blank survey date becomes `today`.
    pub fn fill_date(&mut self, today: NaiveDate) {
        if self.date_month.trim().is_empty() && self.date_day.trim().is_empty() {
            self.date_month = today.month().to_string();
            self.date_day = today.day().to_string();
        }
    }
}

/// Confirmed facilities from a comma-separated list of checklist names or
/// 1-based positions. Checklist order is kept.
pub fn parse_facilities(list: &str) -> Result<Vec<String>, ReportError> {
    let mut picked = [false; FACILITY_CHECKLIST.len()];
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let idx = match item.parse::<usize>() {
            Ok(n) if (1..=FACILITY_CHECKLIST.len()).contains(&n) => n - 1,
            _ => FACILITY_CHECKLIST
                .iter()
                .position(|name| *name == item)
                .ok_or_else(|| ReportError::UnknownFacility(item.to_string()))?,
        };
        picked[idx] = true;
    }
    Ok(FACILITY_CHECKLIST
        .iter()
        .zip(picked)
        .filter(|(_, on)| *on)
        .map(|(name, _)| name.to_string())
        .collect())
}

// ── On-screen summary ─────────────────────────────────────────────────────────

pub fn render_summary(input: &ValuationInput, result: &ValuationResult) -> String {
    let mut out = String::new();
    let f = &result.factors;
    let regional = if input.regional_vacancy_pct > 0.0 {
        let label = [input.regional_label.trim(), input.regional_period.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {}", fmt_percent(input.regional_vacancy_pct), label)
    } else {
        "N/A".to_string()
    };

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  {}", TITLE);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  물건명        : {}", or_dash(&input.property_name));
    let _ = writeln!(out, "  주소          : {}", or_dash(&input.property_address));
    let _ = writeln!(out, "  NOI           : {}", fmt_amount(result.noi));
    let _ = writeln!(out, "  CapRate       : {}", fmt_percent(input.cap_rate_pct));
    let _ = writeln!(out, "  기본가치      : {}", fmt_amount(result.base_value));
    let _ = writeln!(
        out,
        "  등급 계수     : 입지 {:+.4} / 임대안정성 {:+.4} / 접근성 {:+.4} / 시설 {:+.4} = {:+.4}",
        f.location, f.stability, f.accessibility, f.facility, result.total_factor
    );
    let _ = writeln!(
        out,
        "  공실률        : 현재 {} / 지역 {}",
        fmt_percent(input.current_vacancy_pct),
        regional
    );
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  Market Value        : {}", fmt_amount(result.market_value));
    let _ = writeln!(out, "  Value-Add Potential : {}", fmt_amount(result.potential_value));
    let _ = writeln!(out, "  HBU Value           : {}", fmt_amount(result.combined_value));
    let _ = writeln!(out, "  최종 가치           : {}", fmt_millions(result.market_value));
    let _ = writeln!(out, "{}", RULE);
    out
}

// ── Exported document ─────────────────────────────────────────────────────────

fn judgement_rows(payload: &ReportPayload) -> [(&'static str, &str); 5] {
    [
        ("입지", payload.grade_desc.as_str()),
        ("임대안정성", payload.stab_desc.as_str()),
        ("접근성", payload.acc_desc.as_str()),
        ("시설", payload.fac_desc.as_str()),
        ("Market-Value", payload.final_value_text.as_str()),
    ]
}

pub fn render_report(payload: &ReportPayload) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", SLOGAN);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", TITLE);
    let _ = writeln!(out);

    let _ = writeln!(out, "물건명: {}", or_dash(&payload.property_name));
    let _ = writeln!(out, "주소: {}", or_dash(&payload.property_address));
    let _ = writeln!(out);

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "{:<12} | 판단 근거", "판단 항목");
    let _ = writeln!(out, "{}", RULE);
    for (label, text) in judgement_rows(payload) {
        let _ = writeln!(out, "{:<12} | {}", label, text.trim());
    }
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out);

    let _ = writeln!(out, "조사 담당자 : {}", payload.investigator.trim());
    let _ = writeln!(
        out,
        "조사 일자   : {:>2} 월 {:>2} 일",
        payload.date_month.trim(),
        payload.date_day.trim()
    );
    let _ = writeln!(out, "확인한 시설 : {}", payload.confirm_facilities.join(", "));
    let _ = writeln!(out, "확인자      : {}", payload.confirmer.trim());
    let _ = writeln!(out, "{}", THIN_RULE);
    let _ = writeln!(out, "검토 의견:");
    for line in payload.opinion.trim().lines() {
        let _ = writeln!(out, "  {}", line);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "{}", RULE);
    for line in DISCLAIMER {
        let _ = writeln!(out, "{}", line);
    }
    let _ = writeln!(out, "{}", FOOTER);
    out
}

/// Writes a PDF unless `path` ends in `.txt`. `font` is the preferred TTF
/// to embed.
pub fn write_report(path: &Path, payload: &ReportPayload, font: Option<&Path>) -> Result<(), ReportError> {
    let is_text = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    let bytes = if is_text {
        render_report(payload).into_bytes()
    } else {
        pdf::render_pdf(payload, font)?
    };
    fs::write(path, bytes).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Report written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grade, GradeSet};
    use crate::valuation;
    use tempfile::tempdir;

    fn scenario() -> (ValuationInput, ValuationResult) {
        let input = ValuationInput {
            property_name: "A빌딩".into(),
            monthly_rent: 10_000_000.0,
            deposit: 100_000_000.0,
            cap_rate_pct: 4.3,
            grades: GradeSet {
                location: Grade::new(1).unwrap(),
                stability: Grade::new(2).unwrap(),
                accessibility: Grade::new(3).unwrap(),
                facility: Grade::new(3).unwrap(),
            },
            ..Default::default()
        };
        let result = valuation::evaluate(&input).unwrap();
        (input, result)
    }

    #[test]
    fn payload_from_result() {
        let (input, result) = scenario();
        let payload = ReportPayload::from_result(&input, &result);
        assert_eq!(payload.property_name, "A빌딩");
        assert_eq!(payload.property_address, "-");
        assert_eq!(payload.final_value_text, "2,518 백만원");
        assert_eq!(
            payload.stab_desc,
            grades::description(GradeAxis::Stability, Grade::new(2).unwrap())
        );
        assert!(payload.investigator.is_empty());
    }

    #[test]
    fn facilities_by_name_or_position_keep_checklist_order() {
        assert_eq!(
            parse_facilities("수도/배관설비, 1,3").unwrap(),
            vec!["실외 환경", "교통/유동/상권", "수도/배관설비"]
        );
        assert!(matches!(
            parse_facilities("엘리베이터"),
            Err(ReportError::UnknownFacility(_))
        ));
        assert!(parse_facilities("7").is_err());
        assert!(parse_facilities("").unwrap().is_empty());
    }

    #[test]
    fn survey_date_defaults_to_today() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
        let mut notes = SurveyNotes::default();
        notes.fill_date(today);
        assert_eq!((notes.date_month.as_str(), notes.date_day.as_str()), ("5", "2"));

        let mut set = SurveyNotes {
            date_month: "4".into(),
            ..Default::default()
        };
        set.fill_date(today);
        assert_eq!(set.date_month, "4");
        assert_eq!(set.date_day, "");
    }

    #[test]
    fn summary_shows_values_and_unknown_region() {
        let (input, result) = scenario();
        let text = render_summary(&input, &result);
        assert!(text.contains("2,517,797,674"));
        assert!(text.contains("124,300,000"));
        assert!(text.contains("4.30%"));
        assert!(text.contains("지역 N/A"));
    }

    #[test]
    fn report_has_every_section() {
        let (input, result) = scenario();
        let notes = SurveyNotes {
            investigator: "홍길동".into(),
            date_month: "5".into(),
            date_day: "2".into(),
            confirm_facilities: parse_facilities("1,2").unwrap(),
            confirmer: "김확인".into(),
            opinion: "양호\n추가 검토 불요".into(),
        };
        let payload = ReportPayload::from_result(&input, &result).with_survey(&notes);

        let dir = tempdir().unwrap();
        let path = dir.path().join("report.txt");
        write_report(&path, &payload, None).unwrap();
        let text = fs::read_to_string(&path).unwrap();

        assert!(text.starts_with(SLOGAN));
        for needle in [
            TITLE,
            "물건명: A빌딩",
            "주소: -",
            "Market-Value",
            "2,518 백만원",
            "조사 담당자 : 홍길동",
            " 5 월  2 일",
            "확인한 시설 : 실외 환경, 주차/접근로",
            "확인자      : 김확인",
            "  추가 검토 불요",
            DISCLAIMER[0],
            DISCLAIMER[1],
        ] {
            assert!(text.contains(needle), "missing {:?}", needle);
        }
        assert!(text.trim_end().ends_with(FOOTER));
    }

    #[test]
    fn pdf_export_carries_key_figures() {
        let (input, result) = scenario();
        let payload = ReportPayload::from_result(&input, &result);
        let rows = judgement_rows(&payload);
        assert_eq!(rows[4], ("Market-Value", "2,518 백만원"));
        assert_eq!(rows[0].1, payload.grade_desc);

        let dir = tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        write_report(&path, &payload, None).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 1_000);
    }

    #[test]
    fn unwritable_path_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = write_report(dir.path(), &ReportPayload::default(), None).unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
    }
}
