//! Grade → adjustment factor and grade → description tables.
//!
//! Factors are fractions of base value; indexed by `Grade::index()`.

use crate::models::{Grade, GradeAxis, GradeFactors, GradeSet};

const LOCATION_FACTORS: [f64; 5] = [0.001, -0.02, -0.037, -0.06, -0.1];
const STABILITY_FACTORS: [f64; 5] = [-0.02, -0.05, -0.065, -0.0, -0.1];
const ACCESS_FACTORS: [f64; 5] = [0.0001, -0.035, -0.05, -0.10, -0.15];
const FACILITY_FACTORS: [f64; 5] = [0.0001, -0.015, -0.03, -0.045, -0.06];

const LOCATION_DESCRIPTIONS: [&str; 5] = [
    "핵심입지이며, 공실률이 낮고 빠르게 변화하고 있는 지역",
    "핵심입지이나, 공실률이 평균보다 높고 변화가 예정되어있는 지역",
    "비핵심지역이며, 주변상권이 잘 형성되어있으며, 거래가 활성화 되어있는 지역",
    "비핵심지역이고, 주변상권은 형성되어 있으나 공실상태가 눈에 띄이게 보이는 지역",
    "비핵심지역이면서, 주변 상권이 형성되어 있지 않은 곳이나 골목상권지역",
];

const STABILITY_DESCRIPTIONS: [&str; 5] = [
    "장기계약·우량임차인·신뢰도 높으며, 공실위험 매우 낮음",
    "공기업 및 신뢰할 수 있는 평균 이상 수준의 계약, 만기 분산도 잘 되어있음.",
    "신뢰도 높은 임차인과 소상공인의 혼재. 만기분산이 잘 안되어있음. 신용도 보통",
    "소상공인 위주의 임차인 구성, 경기영향 크게 받는 업종, 계약상 리스크가 있음.",
    "공실위험이 높으며, 임대료 변동성 높고 신뢰도 낮은 업종(유흥,혐오시설)",
];

const ACCESSIBILITY_DESCRIPTIONS: [&str; 5] = [
    "대중교통/주요도로 접근이 용이하고 주차시설 여유로움",
    "대중교통/도로 접근 양호하거나 양호한 주차시설",
    "보통 수준의 접근성을 가졌거나 평이한 주차시설.",
    "교통/도로 접근 불편하거나 열악한 주차시설",
    "접근성 매우 열악하거나 매우 부족한 주차시설",
];

const FACILITY_DESCRIPTIONS: [&str; 5] = [
    "우수(신축 5년이내 혹은 눈에 띄이는 익스테리어)",
    "양호(신축 12년 혹은 사소한 보수 필요없는 상태)",
    "보통(신축 20년 이내 혹은 사소한 보수가 눈에 띄임)",
    "미흡(신축 30년 이내 혹은 설비가 노후되어 교체나 대대적인 보수가 필요한 상태)",
    "열악(전면적 개보수 필요)",
];

pub fn factor(axis: GradeAxis, grade: Grade) -> f64 {
    let table = match axis {
        GradeAxis::Location => &LOCATION_FACTORS,
        GradeAxis::Stability => &STABILITY_FACTORS,
        GradeAxis::Accessibility => &ACCESS_FACTORS,
        GradeAxis::Facility => &FACILITY_FACTORS,
    };
    table[grade.index()]
}

pub fn description(axis: GradeAxis, grade: Grade) -> &'static str {
    let table = match axis {
        GradeAxis::Location => &LOCATION_DESCRIPTIONS,
        GradeAxis::Stability => &STABILITY_DESCRIPTIONS,
        GradeAxis::Accessibility => &ACCESSIBILITY_DESCRIPTIONS,
        GradeAxis::Facility => &FACILITY_DESCRIPTIONS,
    };
    table[grade.index()]
}

pub fn factors_for(grades: &GradeSet) -> GradeFactors {
    GradeFactors {
        location: factor(GradeAxis::Location, grades.location),
        stability: factor(GradeAxis::Stability, grades.stability),
        accessibility: factor(GradeAxis::Accessibility, grades.accessibility),
        facility: factor(GradeAxis::Facility, grades.facility),
    }
}
