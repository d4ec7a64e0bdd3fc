//! Raw form fields as typed at the prompt, and their conversion into an
//! engine input.

use crate::models::{Grade, GradeAxis, GradeSet, HistoryRecord, RegionVacancyRow, StoredInputs, ValuationInput};
use crate::utils::{fmt_percent, fmt_vacancy};
use crate::valuation::{grades, ValuationError};
use std::fmt::Write as _;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    PropertyName,
    PropertyAddress,
    MonthlyRent,
    Deposit,
    AdIncome,
    ParkingIncome,
    OtherIncome,
    FacilityCosts,
    ManagementRate,
    CapRate,
    CurrentVacancy,
}

impl FormField {
    pub const ALL: [FormField; 11] = [
        FormField::PropertyName,
        FormField::PropertyAddress,
        FormField::MonthlyRent,
        FormField::Deposit,
        FormField::AdIncome,
        FormField::ParkingIncome,
        FormField::OtherIncome,
        FormField::FacilityCosts,
        FormField::ManagementRate,
        FormField::CapRate,
        FormField::CurrentVacancy,
    ];

    pub fn key(self) -> &'static str {
        match self {
            FormField::PropertyName => "name",
            FormField::PropertyAddress => "address",
            FormField::MonthlyRent => "rent",
            FormField::Deposit => "deposit",
            FormField::AdIncome => "ad",
            FormField::ParkingIncome => "parking",
            FormField::OtherIncome => "other",
            FormField::FacilityCosts => "facility",
            FormField::ManagementRate => "mgmt",
            FormField::CapRate => "cap",
            FormField::CurrentVacancy => "vacancy",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FormField::PropertyName => "물건명",
            FormField::PropertyAddress => "주소",
            FormField::MonthlyRent => "월 임대료",
            FormField::Deposit => "보증금",
            FormField::AdIncome => "광고 수입",
            FormField::ParkingIncome => "주차 수입",
            FormField::OtherIncome => "기타 수입",
            FormField::FacilityCosts => "시설 관리비",
            FormField::ManagementRate => "관리 수익률(%)",
            FormField::CapRate => "매매기준 수익율(%)",
            FormField::CurrentVacancy => "현재 공실률(%)",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.key().eq_ignore_ascii_case(s) || f.label() == s)
    }
}

/// `1,234` → 1234, `4.3%` → 4.3. `None` for blank or junk.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().trim_end_matches('%').chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn lenient(field: FormField, raw: &str) -> f64 {
    if raw.trim().is_empty() {
        return 0.0;
    }
    parse_amount(raw).unwrap_or_else(|| {
        warn!("{} {:?} is not a number, using 0", field.label(), raw);
        0.0
    })
}

/// Amounts are non-negative; anything below zero counts as 0.
fn money(field: FormField, raw: &str) -> f64 {
    let value = lenient(field, raw);
    if value < 0.0 {
        warn!("{} {:?} is negative, using 0", field.label(), raw);
        return 0.0;
    }
    value
}

/// Plain rendering for a number put back into a field.
fn raw_number(v: f64) -> String {
    if v == 0.0 { String::new() } else { v.to_string() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub property_name: String,
    pub property_address: String,
    pub monthly_rent: String,
    pub deposit: String,
    pub ad_income: String,
    pub parking_income: String,
    pub other_income: String,
    pub facility_costs: String,
    pub management_rate: String,
    pub cap_rate: String,
    pub current_vacancy: String,
    pub grades: GradeSet,
    /// Applied regional observation. `None` shows as N/A.
    pub regional: Option<RegionVacancyRow>,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            property_name: String::new(),
            property_address: String::new(),
            monthly_rent: String::new(),
            deposit: String::new(),
            ad_income: String::new(),
            parking_income: String::new(),
            other_income: String::new(),
            facility_costs: String::new(),
            management_rate: String::new(),
            cap_rate: "4.3".into(),
            current_vacancy: "0".into(),
            grades: GradeSet::default(),
            regional: None,
        }
    }
}

impl FormState {
    pub fn field_mut(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::PropertyName => &mut self.property_name,
            FormField::PropertyAddress => &mut self.property_address,
            FormField::MonthlyRent => &mut self.monthly_rent,
            FormField::Deposit => &mut self.deposit,
            FormField::AdIncome => &mut self.ad_income,
            FormField::ParkingIncome => &mut self.parking_income,
            FormField::OtherIncome => &mut self.other_income,
            FormField::FacilityCosts => &mut self.facility_costs,
            FormField::ManagementRate => &mut self.management_rate,
            FormField::CapRate => &mut self.cap_rate,
            FormField::CurrentVacancy => &mut self.current_vacancy,
        }
    }

    pub fn field(&self, field: FormField) -> &str {
        match field {
            FormField::PropertyName => &self.property_name,
            FormField::PropertyAddress => &self.property_address,
            FormField::MonthlyRent => &self.monthly_rent,
            FormField::Deposit => &self.deposit,
            FormField::AdIncome => &self.ad_income,
            FormField::ParkingIncome => &self.parking_income,
            FormField::OtherIncome => &self.other_income,
            FormField::FacilityCosts => &self.facility_costs,
            FormField::ManagementRate => &self.management_rate,
            FormField::CapRate => &self.cap_rate,
            FormField::CurrentVacancy => &self.current_vacancy,
        }
    }

    pub fn set(&mut self, field: FormField, value: &str) {
        *self.field_mut(field) = value.trim().to_string();
    }

    /// Accepts `3`, `3등급` or `3등급지`.
    pub fn set_grade(&mut self, axis: GradeAxis, raw: &str) -> Result<Grade, ValuationError> {
        let grade = Grade::from_label(raw).ok_or_else(|| ValuationError::InvalidGrade {
            axis: axis.title(),
            value: raw.trim().to_string(),
        })?;
        self.grades.set(axis, grade);
        Ok(grade)
    }

    pub fn apply_region(&mut self, row: RegionVacancyRow) {
        self.regional = Some(row);
    }

    pub fn clear_region(&mut self) {
        self.regional = None;
    }

    pub fn to_input(&self) -> Result<ValuationInput, ValuationError> {
        let cap_rate_pct = parse_amount(&self.cap_rate).ok_or_else(|| ValuationError::InvalidNumber {
            field: FormField::CapRate.label(),
            value: self.cap_rate.clone(),
        })?;
        if cap_rate_pct <= 0.0 {
            return Err(ValuationError::CapRateNotPositive(cap_rate_pct));
        }

        let current_vacancy_pct = lenient(FormField::CurrentVacancy, &self.current_vacancy);
        if !(0.0..=100.0).contains(&current_vacancy_pct) {
            return Err(ValuationError::InvalidNumber {
                field: FormField::CurrentVacancy.label(),
                value: self.current_vacancy.clone(),
            });
        }

        let (regional_vacancy_pct, regional_label, regional_period) = match &self.regional {
            Some(row) => (row.vacancy, row.region.clone(), row.period.clone()),
            None => (0.0, String::new(), String::new()),
        };

        Ok(ValuationInput {
            property_name: self.property_name.trim().to_string(),
            property_address: self.property_address.trim().to_string(),
            monthly_rent: money(FormField::MonthlyRent, &self.monthly_rent),
            deposit: money(FormField::Deposit, &self.deposit),
            ad_income: money(FormField::AdIncome, &self.ad_income),
            parking_income: money(FormField::ParkingIncome, &self.parking_income),
            other_income: money(FormField::OtherIncome, &self.other_income),
            facility_costs: money(FormField::FacilityCosts, &self.facility_costs),
            management_return_rate_pct: money(FormField::ManagementRate, &self.management_rate),
            cap_rate_pct,
            grades: self.grades,
            current_vacancy_pct,
            regional_vacancy_pct,
            regional_label,
            regional_period,
        })
    }

    /// Form restored from a saved valuation.
    pub fn from_stored(stored: &StoredInputs, record: Option<&HistoryRecord>) -> Self {
        let input = stored.to_input(record);
        let regional = (input.regional_vacancy_pct > 0.0).then(|| RegionVacancyRow {
            region: input.regional_label.clone(),
            vacancy: input.regional_vacancy_pct,
            period: input.regional_period.clone(),
            group: String::new(),
        });

        Self {
            property_name: input.property_name,
            property_address: input.property_address,
            monthly_rent: raw_number(input.monthly_rent),
            deposit: raw_number(input.deposit),
            ad_income: raw_number(input.ad_income),
            parking_income: raw_number(input.parking_income),
            other_income: raw_number(input.other_income),
            facility_costs: raw_number(input.facility_costs),
            management_rate: raw_number(input.management_return_rate_pct),
            cap_rate: input.cap_rate_pct.to_string(),
            current_vacancy: input.current_vacancy_pct.to_string(),
            grades: input.grades,
            regional,
        }
    }

    pub fn regional_text(&self) -> String {
        match &self.regional {
            Some(row) if row.vacancy > 0.0 => {
                let mut text = format!("{} {}", fmt_vacancy(row.vacancy), row.region);
                if !row.period.is_empty() {
                    let _ = write!(text, " ({})", row.period);
                }
                text
            }
            _ => "N/A".to_string(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for field in FormField::ALL {
            let _ = writeln!(out, "  {:<8} {:<18}: {}", field.key(), field.label(), self.field(field));
        }
        for axis in GradeAxis::ALL {
            let grade = self.grades.get(axis);
            let _ = writeln!(
                out,
                "  {:<8} {:<18}: {} ({:+}) {}",
                "grade",
                axis.title(),
                grade.label(),
                grades::factor(axis, grade),
                grades::description(axis, grade)
            );
        }
        let _ = writeln!(out, "  {:<8} {:<18}: {}", "", "지역 공실률", self.regional_text());
        if let Some(cur) = parse_amount(&self.current_vacancy) {
            let _ = writeln!(out, "  {:<8} {:<18}: {}", "", "현재 공실률", fmt_percent(cur));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> FormState {
        let mut form = FormState::default();
        form.set(FormField::PropertyName, "A빌딩");
        form.set(FormField::MonthlyRent, "10,000,000");
        form.set(FormField::Deposit, "100,000,000");
        form
    }

    #[test]
    fn defaults() {
        let form = FormState::default();
        assert_eq!(form.cap_rate, "4.3");
        assert_eq!(form.grades, GradeSet::default());
        assert_eq!(form.regional_text(), "N/A");
    }

    #[test]
    fn amounts_accept_separators_and_percent() {
        assert_eq!(parse_amount("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_amount(" 4.3% "), Some(4.3));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("inf"), None);
    }

    #[test]
    fn blank_or_junk_money_reads_as_zero() {
        let mut form = filled();
        form.set(FormField::AdIncome, "많음");
        let input = form.to_input().unwrap();
        assert_eq!(input.monthly_rent, 10_000_000.0);
        assert_eq!(input.ad_income, 0.0);
        assert_eq!(input.parking_income, 0.0);
        assert_eq!(input.cap_rate_pct, 4.3);
    }

    #[test]
    fn negative_money_reads_as_zero_but_negative_vacancy_is_rejected() {
        let mut form = filled();
        form.set(FormField::ParkingIncome, "-500,000");
        form.set(FormField::FacilityCosts, "-1");
        let input = form.to_input().unwrap();
        assert_eq!(input.parking_income, 0.0);
        assert_eq!(input.facility_costs, 0.0);

        form.set(FormField::CurrentVacancy, "-5");
        assert!(form.to_input().is_err());
    }

    #[test]
    fn cap_rate_must_be_positive_number() {
        let mut form = filled();
        form.set(FormField::CapRate, "");
        assert!(matches!(form.to_input(), Err(ValuationError::InvalidNumber { .. })));
        form.set(FormField::CapRate, "0");
        assert_eq!(form.to_input(), Err(ValuationError::CapRateNotPositive(0.0)));
        form.set(FormField::CapRate, "-2");
        assert!(form.to_input().is_err());
    }

    #[test]
    fn vacancy_out_of_range_is_rejected() {
        let mut form = filled();
        form.set(FormField::CurrentVacancy, "120");
        assert!(form.to_input().is_err());
    }

    #[test]
    fn grades_parse_from_labels() {
        let mut form = FormState::default();
        assert_eq!(form.set_grade(GradeAxis::Facility, "5등급").unwrap().get(), 5);
        assert_eq!(form.set_grade(GradeAxis::Location, "2").unwrap().get(), 2);
        assert!(form.set_grade(GradeAxis::Stability, "7").is_err());
        assert!(form.set_grade(GradeAxis::Stability, "best").is_err());
        assert_eq!(form.grades.stability.get(), 2);
    }

    #[test]
    fn regional_row_flows_into_input() {
        let mut form = filled();
        form.apply_region(RegionVacancyRow {
            region: "강남대로".into(),
            vacancy: 8.5,
            period: "2025Q2".into(),
            group: "상권별".into(),
        });
        let input = form.to_input().unwrap();
        assert_eq!(input.regional_vacancy_pct, 8.5);
        assert_eq!(input.regional_label, "강남대로");
        assert_eq!(form.regional_text(), "8.5% 강남대로 (2025Q2)");

        form.clear_region();
        assert_eq!(form.to_input().unwrap().regional_vacancy_pct, 0.0);
    }

    #[test]
    fn restore_from_stored_inputs() {
        let mut form = filled();
        form.set(FormField::CurrentVacancy, "12.5");
        form.apply_region(RegionVacancyRow {
            region: "명동".into(),
            vacancy: 7.5,
            period: "2025Q1".into(),
            group: String::new(),
        });
        form.set_grade(GradeAxis::Accessibility, "4").unwrap();
        let input = form.to_input().unwrap();
        let result = crate::valuation::evaluate(&input).unwrap();

        let restored = FormState::from_stored(&StoredInputs::capture(&input, &result), None);
        assert_eq!(restored.to_input().unwrap(), input);
        assert_eq!(restored.regional.as_ref().map(|r| r.region.as_str()), Some("명동"));
    }

    #[test]
    fn field_names_resolve() {
        assert_eq!(FormField::parse("RENT"), Some(FormField::MonthlyRent));
        assert_eq!(FormField::parse("보증금"), Some(FormField::Deposit));
        assert_eq!(FormField::parse("price"), None);
    }
}
