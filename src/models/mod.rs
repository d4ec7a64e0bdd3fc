use serde::{Deserialize, Serialize};
use std::fmt;

// ── Grades ────────────────────────────────────────────────────────────────────

/// A qualitative grade, 1 (best) to 5 (worst).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Grade(u8);

impl Grade {
    pub const ALL: [Grade; 5] = [Grade(1), Grade(2), Grade(3), Grade(4), Grade(5)];

    pub fn new(n: u8) -> Option<Self> {
        (1..=5).contains(&n).then_some(Self(n))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based position into the 5-entry grade tables.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// Parse a display label such as `3등급` or `2등급지` by its digits.
    pub fn from_label(label: &str) -> Option<Self> {
        let digits: String = label.chars().filter(|c| c.is_ascii_digit()).collect();
        digits.parse::<u8>().ok().and_then(Self::new)
    }

    /// Label used in the history table.
    pub fn label(self) -> String {
        format!("{}등급", self.0)
    }
}

impl TryFrom<u8> for Grade {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n).ok_or_else(|| format!("grade must be 1-5, got {}", n))
    }
}

impl From<Grade> for u8 {
    fn from(g: Grade) -> u8 {
        g.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GradeAxis {
    Location,
    Stability,
    Accessibility,
    Facility,
}

impl GradeAxis {
    pub const ALL: [GradeAxis; 4] = [
        GradeAxis::Location,
        GradeAxis::Stability,
        GradeAxis::Accessibility,
        GradeAxis::Facility,
    ];

    pub fn title(self) -> &'static str {
        match self {
            GradeAxis::Location => "입지",
            GradeAxis::Stability => "임대안정성",
            GradeAxis::Accessibility => "접근성",
            GradeAxis::Facility => "시설",
        }
    }

    /// Accepts English or Korean axis names, as typed at the prompt.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "location" | "loc" | "입지" => Some(GradeAxis::Location),
            "stability" | "stab" | "임대안정성" => Some(GradeAxis::Stability),
            "accessibility" | "acc" | "접근성" => Some(GradeAxis::Accessibility),
            "facility" | "fac" | "시설" => Some(GradeAxis::Facility),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeSet {
    pub location: Grade,
    pub stability: Grade,
    pub accessibility: Grade,
    pub facility: Grade,
}

impl GradeSet {
    pub fn get(&self, axis: GradeAxis) -> Grade {
        match axis {
            GradeAxis::Location => self.location,
            GradeAxis::Stability => self.stability,
            GradeAxis::Accessibility => self.accessibility,
            GradeAxis::Facility => self.facility,
        }
    }

    pub fn set(&mut self, axis: GradeAxis, grade: Grade) {
        match axis {
            GradeAxis::Location => self.location = grade,
            GradeAxis::Stability => self.stability = grade,
            GradeAxis::Accessibility => self.accessibility = grade,
            GradeAxis::Facility => self.facility = grade,
        }
    }
}

impl Default for GradeSet {
    fn default() -> Self {
        Self {
            location: Grade(1),
            stability: Grade(2),
            accessibility: Grade(3),
            facility: Grade(3),
        }
    }
}

// ── Valuation ─────────────────────────────────────────────────────────────────

/// Everything the engine needs for one computation. Rates are percentages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValuationInput {
    pub property_name: String,
    pub property_address: String,
    pub monthly_rent: f64,
    pub deposit: f64,
    pub ad_income: f64,
    pub parking_income: f64,
    pub other_income: f64,
    pub facility_costs: f64,
    pub management_return_rate_pct: f64,
    pub cap_rate_pct: f64,
    pub grades: GradeSet,
    pub current_vacancy_pct: f64,
    /// 0 means "unknown".
    pub regional_vacancy_pct: f64,
    pub regional_label: String,
    pub regional_period: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeFactors {
    pub location: f64,
    pub stability: f64,
    pub accessibility: f64,
    pub facility: f64,
}

impl GradeFactors {
    pub fn total(&self) -> f64 {
        self.location + self.stability + self.accessibility + self.facility
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValuationResult {
    pub noi: f64,
    pub base_value: f64,
    pub factors: GradeFactors,
    pub total_factor: f64,
    pub market_value: f64,
    pub potential_value: f64,
    /// Highest-and-best-use value: market + potential.
    pub combined_value: f64,
}

// ── Regional vacancy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionVacancyRow {
    pub region: String,
    pub vacancy: f64,
    pub period: String,
    pub group: String,
}

// ── History ───────────────────────────────────────────────────────────────────

/// One row of the history file. Column names are the on-disk header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct HistoryRecord {
    #[serde(rename = "UID")]
    pub uid: String,
    #[serde(rename = "시간")]
    pub timestamp: String,
    #[serde(rename = "물건명")]
    pub property_name: String,
    #[serde(rename = "등급")]
    pub location_grade: String,
    #[serde(rename = "임대안정성")]
    pub stability_grade: String,
    #[serde(rename = "임대안정성설명")]
    pub stability_desc: String,
    #[serde(rename = "접근성등급")]
    pub accessibility_grade: String,
    #[serde(rename = "접근성설명")]
    pub accessibility_desc: String,
    #[serde(rename = "시설등급")]
    pub facility_grade: String,
    #[serde(rename = "시설설명")]
    pub facility_desc: String,
    #[serde(rename = "Market Value")]
    pub market_value: String,
    #[serde(rename = "Value-Add Potential", alias = "Value-add Potential")]
    pub potential_value: String,
    #[serde(rename = "HBU Value")]
    pub hbu_value: String,
    #[serde(rename = "NOI")]
    pub noi: String,
    #[serde(rename = "CapRate(%)")]
    pub cap_rate: String,
    #[serde(skip)]
    pub inputs: Option<StoredInputs>,
}

/// Full raw inputs of a valuation, kept in the side map keyed by uid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StoredInputs {
    pub property_name: String,
    pub property_address: String,
    pub monthly_rent: f64,
    pub deposit: f64,
    pub ad_income: f64,
    pub parking_income: f64,
    pub other_income: f64,
    pub facility_costs: f64,
    pub management_return_rate_pct: f64,
    pub cap_rate_pct: f64,
    pub grade_num: Option<u8>,
    pub stab_num: Option<u8>,
    pub acc_num: Option<u8>,
    pub fac_num: Option<u8>,
    pub loc_factor: f64,
    pub stab_factor: f64,
    pub acc_factor: f64,
    pub fac_factor: f64,
    pub total_factor: f64,
    pub current_vacancy_pct: f64,
    pub regional_vacancy_pct: f64,
    pub kosis_region_label: String,
    pub kosis_period: String,
}

impl StoredInputs {
    pub fn capture(input: &ValuationInput, result: &ValuationResult) -> Self {
        Self {
            property_name: input.property_name.clone(),
            property_address: input.property_address.clone(),
            monthly_rent: input.monthly_rent,
            deposit: input.deposit,
            ad_income: input.ad_income,
            parking_income: input.parking_income,
            other_income: input.other_income,
            facility_costs: input.facility_costs,
            management_return_rate_pct: input.management_return_rate_pct,
            cap_rate_pct: input.cap_rate_pct,
            grade_num: Some(input.grades.location.get()),
            stab_num: Some(input.grades.stability.get()),
            acc_num: Some(input.grades.accessibility.get()),
            fac_num: Some(input.grades.facility.get()),
            loc_factor: result.factors.location,
            stab_factor: result.factors.stability,
            acc_factor: result.factors.accessibility,
            fac_factor: result.factors.facility,
            total_factor: result.total_factor,
            current_vacancy_pct: input.current_vacancy_pct,
            regional_vacancy_pct: input.regional_vacancy_pct,
            kosis_region_label: input.regional_label.clone(),
            kosis_period: input.regional_period.clone(),
        }
    }

    /// Rebuild an engine input. Missing grade codes fall back to the
    /// labels of `record`, then to the form defaults.
    pub fn to_input(&self, record: Option<&HistoryRecord>) -> ValuationInput {
        let defaults = GradeSet::default();
        let pick = |num: Option<u8>, label: Option<&str>, fallback: Grade| {
            num.and_then(Grade::new)
                .or_else(|| label.and_then(Grade::from_label))
                .unwrap_or(fallback)
        };

        ValuationInput {
            property_name: self.property_name.clone(),
            property_address: self.property_address.clone(),
            monthly_rent: self.monthly_rent,
            deposit: self.deposit,
            ad_income: self.ad_income,
            parking_income: self.parking_income,
            other_income: self.other_income,
            facility_costs: self.facility_costs,
            management_return_rate_pct: self.management_return_rate_pct,
            cap_rate_pct: self.cap_rate_pct,
            grades: GradeSet {
                location: pick(
                    self.grade_num,
                    record.map(|r| r.location_grade.as_str()),
                    defaults.location,
                ),
                stability: pick(
                    self.stab_num,
                    record.map(|r| r.stability_grade.as_str()),
                    defaults.stability,
                ),
                accessibility: pick(
                    self.acc_num,
                    record.map(|r| r.accessibility_grade.as_str()),
                    defaults.accessibility,
                ),
                facility: pick(
                    self.fac_num,
                    record.map(|r| r.facility_grade.as_str()),
                    defaults.facility,
                ),
            },
            current_vacancy_pct: self.current_vacancy_pct,
            regional_vacancy_pct: self.regional_vacancy_pct,
            regional_label: self.kosis_region_label.clone(),
            regional_period: self.kosis_period.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_bounds() {
        assert!(Grade::new(0).is_none());
        assert!(Grade::new(6).is_none());
        assert_eq!(Grade::new(5).map(Grade::index), Some(4));
    }

    #[test]
    fn grade_from_label_reads_digits() {
        assert_eq!(Grade::from_label("3등급"), Grade::new(3));
        assert_eq!(Grade::from_label("1등급지"), Grade::new(1));
        assert_eq!(Grade::from_label("등급"), None);
        assert_eq!(Grade::from_label("9등급"), None);
    }

    #[test]
    fn stored_inputs_tolerate_missing_keys() {
        let s: StoredInputs =
            serde_json::from_str(r#"{"property_name":"A","cap_rate_pct":4.3}"#).unwrap();
        assert_eq!(s.property_name, "A");
        assert_eq!(s.cap_rate_pct, 4.3);
        assert_eq!(s.grade_num, None);
    }

    #[test]
    fn to_input_falls_back_to_record_labels() {
        let stored = StoredInputs {
            cap_rate_pct: 5.0,
            ..Default::default()
        };
        let record = HistoryRecord {
            location_grade: "4등급".into(),
            facility_grade: "5등급".into(),
            ..Default::default()
        };
        let input = stored.to_input(Some(&record));
        assert_eq!(input.grades.location.get(), 4);
        assert_eq!(input.grades.stability.get(), 2);
        assert_eq!(input.grades.accessibility.get(), 3);
        assert_eq!(input.grades.facility.get(), 5);
    }
}
