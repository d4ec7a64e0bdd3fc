//! Interactive session: the valuation form, driven by one event loop.
//!
//! Every state change happens inside `App::handle_event`. Background work
//! (feed fetches, the base-rate scrape, the address debounce) runs on tokio
//! tasks that only send an `AppEvent` back through the channel.

pub mod debounce;
pub mod form;

use crate::config::AppConfig;
use crate::models::{
    Grade, GradeAxis, HistoryRecord, RegionVacancyRow, StoredInputs, ValuationInput, ValuationResult,
};
use crate::report::{self, ReportPayload, SurveyNotes};
use crate::sources::{base_rate, BaseRateSource, BokScraper, KosisClient, LookupError, VacancySource};
use crate::storage::{self, resolve_data_dir, HistoryStore};
use crate::utils::fmt_vacancy;
use crate::vacancy::{self, Begin, FetchTicket, VacancyLookup};
use crate::valuation;
use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use std::fmt::Write as _;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use self::debounce::Debouncer;
use self::form::{FormField, FormState};

const HELP: &str = "\
명령:
  name <물건명>                 물건명 입력
  address <주소>                주소 입력 (입력 후 지역 공실률 자동 조회)
  set <field> <value>           값 입력 (rent deposit ad parking other facility mgmt cap vacancy)
  grade <axis> [1-5]            등급 (location stability accessibility facility), 값 생략 시 등급표
  vacancy <pct>                 현재 공실률
  show                          입력값 보기
  refresh                       지역 공실률 강제 재조회
  regions [검색어]              상권 목록
  pick <n>                      목록에서 상권 선택 (0: 해제)
  calc                          계산 및 히스토리 저장
  history                       히스토리 목록
  load <uid>                    히스토리 항목 불러오기
  delete <uid...>               히스토리 삭제
  clear                         히스토리 전체 삭제
  export <path>                 히스토리 CSV 내보내기
  survey <field> <value>        조사 정보 (investigator month day facilities confirmer opinion)
  report <path> [조사 담당자]   보고서 저장 (PDF, .txt 경로는 텍스트)
  rate                          기준금리 조회
  help | quit";

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum FetchPurpose {
    /// Apply the best match for this address, if it is still current.
    AutoFill { address: String },
    /// Fill the manual selection list.
    Candidates { query: String },
}

#[derive(Debug)]
pub enum AppEvent {
    Line(String),
    InputClosed,
    AddressSettled(String),
    VacancyLoaded {
        ticket: FetchTicket,
        purpose: FetchPurpose,
        outcome: Result<Vec<RegionVacancyRow>, LookupError>,
    },
    BaseRateLoaded(Option<f64>),
}

#[derive(Debug, PartialEq)]
pub enum Reply {
    Text(String),
    Nothing,
    Quit,
}

impl Reply {
    fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

/// Run `task` on its own tokio task. A panic is logged and turned into
/// `on_panic`'s event instead of being lost.
fn spawn_supervised<F, P>(events: &mpsc::UnboundedSender<AppEvent>, task: F, on_panic: P)
where
    F: Future<Output = AppEvent> + Send + 'static,
    P: FnOnce(String) -> AppEvent + Send + 'static,
{
    let events = events.clone();
    tokio::spawn(async move {
        let event = match tokio::spawn(task).await {
            Ok(event) => event,
            Err(e) => {
                error!("Background task failed: {}", e);
                on_panic(e.to_string())
            }
        };
        // Receiver gone means the session already ended.
        let _ = events.send(event);
    });
}

// ── App ───────────────────────────────────────────────────────────────────────

pub struct App {
    form: FormState,
    history: HistoryStore,
    lookup: VacancyLookup,
    base_rate: Arc<dyn BaseRateSource>,
    base_rate_text: String,
    candidates: Vec<RegionVacancyRow>,
    /// Address whose autofill fetch is in flight.
    pending_autofill: Option<String>,
    last: Option<(ValuationInput, ValuationResult)>,
    survey: SurveyNotes,
    report_font: Option<PathBuf>,
    debouncer: Debouncer,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(config: &AppConfig, events: mpsc::UnboundedSender<AppEvent>) -> Result<Self> {
        let data_dir = resolve_data_dir(&config.storage);
        let mut history = HistoryStore::open(&data_dir)
            .with_context(|| format!("Failed to open history in {:?}", data_dir))?;
        if let Err(e) = history.reload() {
            warn!("History not loaded: {}", e);
        }

        let kosis: Arc<dyn VacancySource> = Arc::new(KosisClient::new(&config.kosis)?);
        let bok: Arc<dyn BaseRateSource> = Arc::new(BokScraper::new(&config.base_rate)?);
        Ok(Self::with_parts(config, history, kosis, bok, events))
    }

    pub fn with_parts(
        config: &AppConfig,
        history: HistoryStore,
        vacancy_source: Arc<dyn VacancySource>,
        base_rate: Arc<dyn BaseRateSource>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            form: FormState::default(),
            history,
            lookup: VacancyLookup::new(
                vacancy_source,
                Duration::from_secs(config.kosis.cache_ttl_secs),
            ),
            base_rate,
            base_rate_text: base_rate::display(None),
            candidates: Vec::new(),
            pending_autofill: None,
            last: None,
            survey: SurveyNotes::default(),
            report_font: config.report.font_path.clone(),
            debouncer: Debouncer::new(Duration::from_millis(config.session.address_debounce_ms)),
            events,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn handle_event(&mut self, event: AppEvent) -> Reply {
        match event {
            AppEvent::Line(line) => match self.execute(&line) {
                Ok(reply) => reply,
                Err(e) => {
                    error!("Command {:?} failed: {:#}", line.trim(), e);
                    Reply::Text(format!("오류: {:#}", e))
                }
            },
            AppEvent::InputClosed => Reply::Quit,
            AppEvent::AddressSettled(address) => self.on_address_settled(address),
            AppEvent::VacancyLoaded {
                ticket,
                purpose,
                outcome,
            } => match self.lookup.complete(ticket, outcome, Instant::now()) {
                Some(outcome) => self.on_vacancy(purpose, outcome),
                None => Reply::Nothing,
            },
            AppEvent::BaseRateLoaded(rate) => {
                self.base_rate_text = base_rate::display(rate);
                Reply::text(self.base_rate_text.clone())
            }
        }
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    fn execute(&mut self, line: &str) -> Result<Reply> {
        let line = line.trim();
        let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match cmd {
            "" => Ok(Reply::Nothing),
            "help" | "?" => Ok(Reply::text(HELP)),
            "quit" | "exit" => Ok(Reply::Quit),
            "name" => self.set_field(FormField::PropertyName, rest),
            "address" => self.set_field(FormField::PropertyAddress, rest),
            "vacancy" => self.set_field(FormField::CurrentVacancy, rest),
            "set" => {
                let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let field = FormField::parse(key).ok_or_else(|| anyhow!("알 수 없는 항목: {}", key))?;
                self.set_field(field, value)
            }
            "grade" => {
                let (axis, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let axis = GradeAxis::parse(axis).ok_or_else(|| anyhow!("알 수 없는 등급 항목: {:?}", axis))?;
                if value.trim().is_empty() {
                    return Ok(Reply::Text(grade_table(axis)));
                }
                let grade = self.form.set_grade(axis, value)?;
                Ok(Reply::text(format!(
                    "{} {}: {}",
                    axis.title(),
                    grade.label(),
                    valuation::grades::description(axis, grade)
                )))
            }
            "show" => Ok(Reply::text(format!(
                "{}  {}",
                self.form.render(),
                self.base_rate_text
            ))),
            "refresh" => Ok(self.refresh_vacancy()),
            "regions" => Ok(self.list_regions(rest)),
            "pick" => self.pick_region(rest),
            "calc" => self.calculate(),
            "history" => Ok(Reply::text(render_history(&self.history))),
            "load" => self.load_record(rest),
            "delete" => {
                let uids: Vec<String> = rest.split_whitespace().map(String::from).collect();
                if uids.is_empty() {
                    bail!("삭제할 항목을 선택하세요.");
                }
                let removed = self.history.remove(&uids)?;
                Ok(Reply::text(format!("{}건 삭제", removed)))
            }
            "clear" => {
                self.history.clear()?;
                Ok(Reply::text("히스토리를 모두 삭제했습니다."))
            }
            "export" => {
                if rest.is_empty() {
                    bail!("사용법: export <path>");
                }
                let n = self.history.export_to(Path::new(rest))?;
                Ok(Reply::text(format!("{}건을 {}로 내보냈습니다.", n, rest)))
            }
            "survey" => self.set_survey(rest),
            "report" => self.export_report(rest),
            "rate" => {
                self.spawn_base_rate();
                Ok(Reply::text("기준금리 조회 중..."))
            }
            other => bail!("알 수 없는 명령: {} (help 참고)", other),
        }
    }

    fn set_field(&mut self, field: FormField, value: &str) -> Result<Reply> {
        let address_changed =
            field == FormField::PropertyAddress && value.trim() != self.form.property_address;
        self.form.set(field, value);
        if address_changed {
            // N/A until the new address resolves.
            self.form.clear_region();
            self.pending_autofill = None;
        }
        if field == FormField::PropertyAddress {
            self.schedule_autofill();
        }
        Ok(Reply::text(format!("{} = {}", field.label(), self.form.field(field))))
    }

    fn calculate(&mut self) -> Result<Reply> {
        let input = self.form.to_input().context("모든 값을 올바르게 입력하세요.")?;
        let result = valuation::evaluate(&input)?;

        let record = storage::record_for(&input, &result);
        let appended = self
            .history
            .append(record, Some(StoredInputs::capture(&input, &result)));

        let mut text = report::render_summary(&input, &result);
        let _ = write!(text, "  저장: {}", appended.uid);
        if let Err(e) = &appended.autosave {
            let _ = write!(text, "\n  자동 저장 실패: {}", e);
        }
        info!("Valuation {} recorded", appended.uid);
        self.last = Some((input, result));
        Ok(Reply::Text(text))
    }

    fn load_record(&mut self, uid: &str) -> Result<Reply> {
        if uid.is_empty() {
            bail!("불러올 항목을 선택하세요.");
        }
        let record = self
            .history
            .get(uid)
            .ok_or_else(|| anyhow!("선택 항목 데이터를 찾을 수 없습니다: {}", uid))?;
        let Some(inputs) = self.history.inputs_for(uid) else {
            return Ok(Reply::text("이 항목에는 저장된 입력값 정보가 없습니다."));
        };

        self.form = FormState::from_stored(inputs, Some(record));
        // The restored regional value stays; no autofill for a loaded address.
        self.debouncer.cancel();
        Ok(Reply::text(format!("{} 불러옴\n{}", uid, self.form.render())))
    }

    fn set_survey(&mut self, rest: &str) -> Result<Reply> {
        let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let value = value.trim().to_string();
        match key {
            "investigator" => self.survey.investigator = value,
            "month" => self.survey.date_month = value,
            "day" => self.survey.date_day = value,
            "facilities" => self.survey.confirm_facilities = report::parse_facilities(&value)?,
            "confirmer" => self.survey.confirmer = value,
            // `\n` typed at the prompt becomes a line break.
            "opinion" => self.survey.opinion = value.replace("\\n", "\n"),
            other => bail!("알 수 없는 조사 항목: {} (체크리스트: {})", other, report::FACILITY_CHECKLIST.join(", ")),
        }
        Ok(Reply::Nothing)
    }

    fn export_report(&mut self, rest: &str) -> Result<Reply> {
        let (path, investigator) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if path.is_empty() {
            bail!("사용법: report <path> [조사 담당자]");
        }
        let (input, result) = self.last.as_ref().ok_or_else(|| anyhow!("먼저 calc로 계산하세요."))?;

        if !investigator.trim().is_empty() {
            self.survey.investigator = investigator.trim().to_string();
        }
        self.survey.fill_date(Local::now().date_naive());

        let payload = ReportPayload::from_result(input, result).with_survey(&self.survey);
        report::write_report(Path::new(path), &payload, self.report_font.as_deref())?;
        Ok(Reply::text(format!("보고서가 저장되었습니다: {}", path)))
    }

    // ── Regional vacancy ──────────────────────────────────────────────────────

    fn schedule_autofill(&mut self) {
        let address = self.form.property_address.clone();
        let events = self.events.clone();
        self.debouncer.trigger(async move {
            let _ = events.send(AppEvent::AddressSettled(address));
        });
    }

    fn on_address_settled(&mut self, address: String) -> Reply {
        if address != self.form.property_address {
            debug!("Address changed again, skipping autofill");
            return Reply::Nothing;
        }
        self.autofill(address, false)
    }

    fn refresh_vacancy(&mut self) -> Reply {
        let address = self.form.property_address.clone();
        self.autofill(address, true)
    }

    fn autofill(&mut self, address: String, force: bool) -> Reply {
        if address.trim().is_empty() {
            self.form.clear_region();
            return Reply::Nothing;
        }
        match self.lookup.begin(force, Instant::now()) {
            Begin::Cached(rows) => self.apply_autofill(&address, &rows),
            Begin::Fetch(ticket) => {
                self.pending_autofill = Some(address.clone());
                self.spawn_vacancy_fetch(ticket, FetchPurpose::AutoFill { address });
                Reply::Nothing
            }
        }
    }

    fn apply_autofill(&mut self, address: &str, rows: &[RegionVacancyRow]) -> Reply {
        self.pending_autofill = None;
        match vacancy::auto_match(rows, address) {
            Some(row) => {
                let text = format!(
                    "지역 공실률: {} {} ({})",
                    fmt_vacancy(row.vacancy),
                    row.region,
                    row.period
                );
                self.form.apply_region(row);
                Reply::Text(text)
            }
            None => {
                self.form.clear_region();
                Reply::text("지역 공실률: N/A (regions 명령으로 직접 선택)")
            }
        }
    }

    fn list_regions(&mut self, query: &str) -> Reply {
        match self.lookup.begin(false, Instant::now()) {
            Begin::Cached(rows) => self.show_candidates(&rows, query),
            Begin::Fetch(ticket) => {
                self.spawn_vacancy_fetch(
                    ticket,
                    FetchPurpose::Candidates {
                        query: query.to_string(),
                    },
                );
                Reply::text("상권 목록 조회 중...")
            }
        }
    }

    fn show_candidates(&mut self, rows: &[RegionVacancyRow], query: &str) -> Reply {
        self.candidates = vacancy::select_candidates(rows, query);
        if self.candidates.is_empty() {
            return Reply::text("일치하는 상권이 없습니다.");
        }
        let mut text = String::new();
        for (i, row) in self.candidates.iter().enumerate() {
            let _ = writeln!(
                text,
                "{:>3}. {} {} ({}) [{}]",
                i + 1,
                row.region,
                fmt_vacancy(row.vacancy),
                row.period,
                row.group
            );
        }
        Reply::Text(text)
    }

    fn pick_region(&mut self, arg: &str) -> Result<Reply> {
        let n: usize = arg.parse().with_context(|| format!("번호를 입력하세요: {:?}", arg))?;
        if n == 0 {
            self.form.clear_region();
            return Ok(Reply::text("지역 공실률: N/A"));
        }
        let row = self
            .candidates
            .get(n - 1)
            .cloned()
            .ok_or_else(|| anyhow!("목록에 없는 번호: {}", n))?;
        let text = format!("{} 선택: {}", row.region, fmt_vacancy(row.vacancy));
        self.form.apply_region(row);
        Ok(Reply::Text(text))
    }

    fn on_vacancy(
        &mut self,
        purpose: FetchPurpose,
        outcome: Result<Vec<RegionVacancyRow>, LookupError>,
    ) -> Reply {
        match (purpose, outcome) {
            (FetchPurpose::AutoFill { address }, Ok(rows)) => {
                if address != self.form.property_address {
                    return Reply::Nothing;
                }
                self.apply_autofill(&address, &rows)
            }
            (FetchPurpose::AutoFill { address }, Err(e)) => {
                if address == self.form.property_address {
                    self.pending_autofill = None;
                    self.form.clear_region();
                }
                Reply::Text(format!("지역 공실률 조회 실패 (N/A): {}", e))
            }
            (FetchPurpose::Candidates { query }, Ok(rows)) => {
                let list = self.show_candidates(&rows, &query);
                // This fetch superseded an autofill for the current address.
                let address = self.form.property_address.clone();
                if self.pending_autofill.as_deref() != Some(address.as_str()) {
                    return list;
                }
                match (list, self.apply_autofill(&address, &rows)) {
                    (Reply::Text(list), Reply::Text(fill)) => Reply::Text(format!("{}{}", list, fill)),
                    (list, _) => list,
                }
            }
            (FetchPurpose::Candidates { .. }, Err(e)) => {
                Reply::Text(format!("상권 목록을 불러오지 못했습니다: {}", e))
            }
        }
    }

    fn spawn_vacancy_fetch(&self, ticket: FetchTicket, purpose: FetchPurpose) {
        let source = self.lookup.source();
        let on_panic_purpose = purpose.clone();
        spawn_supervised(
            &self.events,
            async move {
                let outcome = source.fetch_rows().await;
                AppEvent::VacancyLoaded {
                    ticket,
                    purpose,
                    outcome,
                }
            },
            move |msg| AppEvent::VacancyLoaded {
                ticket,
                purpose: on_panic_purpose,
                outcome: Err(LookupError::Worker(msg)),
            },
        );
    }

    pub fn spawn_base_rate(&self) {
        let source = Arc::clone(&self.base_rate);
        spawn_supervised(
            &self.events,
            async move { AppEvent::BaseRateLoaded(source.fetch_rate().await) },
            |_| AppEvent::BaseRateLoaded(None),
        );
    }
}

fn grade_table(axis: GradeAxis) -> String {
    let mut text = String::new();
    for grade in Grade::ALL {
        let _ = writeln!(
            text,
            "  {} ({:+}) {}",
            grade.label(),
            valuation::grades::factor(axis, grade),
            valuation::grades::description(axis, grade)
        );
    }
    text
}

pub fn render_history_row(r: &HistoryRecord) -> String {
    format!(
        "{}  {}  {}  입지 {} / 임대 {} / 접근 {} / 시설 {}  MV {}  VA {}  HBU {}  NOI {}  {}",
        r.uid,
        r.timestamp,
        r.property_name,
        r.location_grade,
        r.stability_grade,
        r.accessibility_grade,
        r.facility_grade,
        r.market_value,
        r.potential_value,
        r.hbu_value,
        r.noi,
        r.cap_rate
    )
}

pub fn render_history(history: &HistoryStore) -> String {
    if history.is_empty() {
        return "히스토리가 없습니다.".to_string();
    }
    let mut text = String::new();
    for record in history.records() {
        let _ = writeln!(text, "{}", render_history_row(record));
    }
    text
}

// ── Loop ──────────────────────────────────────────────────────────────────────

fn spawn_stdin(events: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if events.send(AppEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = events.send(AppEvent::InputClosed);
                    break;
                }
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    let _ = events.send(AppEvent::InputClosed);
                    break;
                }
            }
        }
    });
}

pub async fn run(config: AppConfig) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut app = App::new(&config, tx.clone())?;

    println!("{}", HELP);
    println!("히스토리 {}건", app.history().len());
    if config.session.fetch_base_rate_on_start {
        app.spawn_base_rate();
    }
    spawn_stdin(tx);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match app.handle_event(event) {
                    Reply::Text(text) => println!("{}", text),
                    Reply::Nothing => {}
                    Reply::Quit => break,
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted, closing session");
                break;
            }
        }
    }

    info!("Session closed ({} history records)", app.history().len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vacancy::tests::{sample_rows, FakeSource};
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use tempfile::{tempdir, TempDir};

    struct FixedRate(Option<f64>);

    #[async_trait]
    impl BaseRateSource for FixedRate {
        async fn fetch_rate(&self) -> Option<f64> {
            self.0
        }
    }

    struct Harness {
        app: App,
        rx: mpsc::UnboundedReceiver<AppEvent>,
        source: Arc<FakeSource>,
        _dir: TempDir,
    }

    fn harness(source: FakeSource) -> Harness {
        harness_with_ttl(source, AppConfig::default().kosis.cache_ttl_secs)
    }

    fn harness_with_ttl(source: FakeSource, ttl_secs: u64) -> Harness {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.session.address_debounce_ms = 20;
        config.kosis.cache_ttl_secs = ttl_secs;
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(source);
        let history = HistoryStore::open(dir.path()).unwrap();
        let app = App::with_parts(
            &config,
            history,
            source.clone(),
            Arc::new(FixedRate(Some(2.5))),
            tx,
        );
        Harness {
            app,
            rx,
            source,
            _dir: dir,
        }
    }

    impl Harness {
        fn cmd(&mut self, line: &str) -> Reply {
            self.app.handle_event(AppEvent::Line(line.to_string()))
        }

        async fn pump(&mut self) -> Reply {
            let event = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .expect("event in time")
                .expect("channel open");
            self.app.handle_event(event)
        }
    }

    fn text(reply: Reply) -> String {
        match reply {
            Reply::Text(t) => t,
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn calc_records_history() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        h.cmd("name A빌딩");
        h.cmd("set rent 10,000,000");
        h.cmd("set deposit 100,000,000");

        let out = text(h.cmd("calc"));
        assert!(out.contains("2,517,797,674"));
        assert_eq!(h.app.history().len(), 1);

        let uid = h.app.history().records()[0].uid.clone();
        assert!(h.app.history().inputs_for(&uid).is_some());
    }

    #[tokio::test]
    async fn invalid_cap_rate_writes_nothing_and_keeps_running() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        h.cmd("set cap 0");
        let out = text(h.cmd("calc"));
        assert!(out.starts_with("오류"));
        assert!(h.app.history().is_empty());

        assert!(matches!(h.cmd("bogus"), Reply::Text(_)));
        assert_eq!(h.cmd("quit"), Reply::Quit);
    }

    #[tokio::test]
    async fn address_change_autofills_after_debounce() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        h.cmd("address 서울 강남대로 1");

        // AddressSettled, then the fetch completion.
        assert_eq!(h.pump().await, Reply::Nothing);
        let out = text(h.pump().await);
        assert!(out.contains("강남대로"));
        assert_eq!(h.app.form.regional.as_ref().map(|r| r.vacancy), Some(8.5));

        // Second address is served from cache without another fetch.
        h.cmd("address 서울 중구 명동길");
        let out = text(h.pump().await);
        assert!(out.contains("명동"));
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rapid_address_edits_fire_once() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        h.cmd("address 서울");
        h.cmd("address 서울 명");
        h.cmd("address 서울 명동");

        let settled = tokio::time::timeout(Duration::from_secs(2), h.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(&settled, AppEvent::AddressSettled(a) if a == "서울 명동"));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_na() {
        let mut h = harness(FakeSource::failing());
        h.cmd("address 서울 강남대로");
        h.app.debouncer.cancel();
        h.app.form.apply_region(sample_rows()[0].clone());
        assert_eq!(h.cmd("refresh"), Reply::Nothing);

        let out = text(h.pump().await);
        assert!(out.contains("N/A"));
        assert!(h.app.form.regional.is_none());
    }

    #[tokio::test]
    async fn stale_completion_is_ignored() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        h.cmd("address 서울 강남대로");
        h.app.debouncer.cancel();
        h.cmd("refresh");
        h.cmd("refresh");

        let first = h.pump().await;
        let second = h.pump().await;
        let replies = [first, second];
        assert_eq!(replies.iter().filter(|r| **r == Reply::Nothing).count(), 1);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn region_list_fetch_still_resolves_superseded_autofill() {
        let mut h = harness_with_ttl(FakeSource::with_rows(sample_rows()), 0);
        h.cmd("address 서울 중구 명동길");
        assert_eq!(h.pump().await, Reply::Nothing);
        assert!(text(h.pump().await).contains("명동"));
        assert_eq!(h.app.form.regional.as_ref().map(|r| r.vacancy), Some(12.1));

        // The old region is dropped as soon as the address changes.
        h.cmd("address 서울 강남대로 1");
        assert!(h.app.form.regional.is_none());
        assert_eq!(h.pump().await, Reply::Nothing);

        // Autofill fetch in flight; the list fetch supersedes it.
        assert!(text(h.cmd("regions")).contains("조회 중"));
        h.pump().await;
        h.pump().await;

        let input = h.app.form.to_input().unwrap();
        assert_eq!(input.regional_label, "강남대로");
        assert_eq!(input.regional_vacancy_pct, 8.5);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn manual_region_pick() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        assert!(text(h.cmd("regions")).contains("조회 중"));
        let list = text(h.pump().await);
        assert!(list.contains("명동"));

        let cached = text(h.cmd("regions 명동"));
        assert!(cached.starts_with("  1. 명동"));
        h.cmd("pick 1");
        assert_eq!(h.app.form.regional_text(), "12.1% 명동 (2025Q2)");
        assert!(text(h.cmd("pick 9")).starts_with("오류"));
        h.cmd("pick 0");
        assert!(h.app.form.regional.is_none());
    }

    #[tokio::test]
    async fn grade_command_sets_or_lists() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        let table = text(h.cmd("grade 접근성"));
        assert_eq!(table.lines().count(), 5);
        assert!(table.contains("5등급 (-0.15)"));

        assert!(text(h.cmd("grade acc 4")).starts_with("접근성 4등급"));
        assert_eq!(h.app.form.grades.accessibility.get(), 4);
        assert!(text(h.cmd("grade acc 9")).starts_with("오류"));
        assert!(text(h.cmd("grade height 1")).starts_with("오류"));
    }

    #[tokio::test]
    async fn load_restores_form() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        h.cmd("name B빌딩");
        h.cmd("set rent 5,000,000");
        h.cmd("grade facility 5");
        h.cmd("calc");
        let uid = h.app.history().records()[0].uid.clone();

        h.app.form = FormState::default();
        h.cmd(&format!("load {}", uid));
        assert_eq!(h.app.form.property_name, "B빌딩");
        assert_eq!(h.app.form.monthly_rent, "5000000");
        assert_eq!(h.app.form.grades.facility.get(), 5);

        assert!(text(h.cmd("load nope")).starts_with("오류"));
    }

    #[tokio::test]
    async fn report_requires_result_then_writes() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.txt");
        let cmd = format!("report {} 홍길동", path.display());

        assert!(text(h.cmd(&cmd)).starts_with("오류"));
        h.cmd("set rent 1,000,000");
        h.cmd("calc");
        h.cmd("survey facilities 1,6");
        h.cmd(&cmd);

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("조사 담당자 : 홍길동"));
        assert!(body.contains("실외 환경, 수도/배관설비"));

        let pdf = dir.path().join("r.pdf");
        assert!(text(h.cmd(&format!("report {}", pdf.display()))).contains("저장되었습니다"));
        assert!(std::fs::read(&pdf).unwrap().starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn base_rate_event_updates_display() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        h.cmd("rate");
        assert_eq!(text(h.pump().await), "기준금리 2.5%");
        assert!(text(h.cmd("show")).contains("기준금리 2.5%"));
    }

    #[tokio::test]
    async fn delete_clear_and_export() {
        let mut h = harness(FakeSource::with_rows(sample_rows()));
        let dir = tempdir().unwrap();
        let out = dir.path().join("h.csv");

        assert!(text(h.cmd(&format!("export {}", out.display()))).starts_with("오류"));
        h.cmd("calc");
        h.cmd("calc");
        let uid = h.app.history().records()[0].uid.clone();
        assert_eq!(text(h.cmd(&format!("delete {}", uid))), "1건 삭제");
        assert!(text(h.cmd(&format!("export {}", out.display()))).contains("1건"));
        h.cmd("clear");
        assert!(h.app.history().is_empty());
    }

    #[tokio::test]
    async fn panicking_source_becomes_worker_error() {
        struct Panics;

        #[async_trait]
        impl VacancySource for Panics {
            async fn fetch_rows(&self) -> Result<Vec<RegionVacancyRow>, LookupError> {
                panic!("feed exploded");
            }
        }

        let dir = tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::with_parts(
            &AppConfig::default(),
            HistoryStore::open(dir.path()).unwrap(),
            Arc::new(Panics),
            Arc::new(FixedRate(None)),
            tx,
        );
        app.handle_event(AppEvent::Line("regions".into()));
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            &event,
            AppEvent::VacancyLoaded { outcome: Err(LookupError::Worker(_)), .. }
        ));
        assert!(text(app.handle_event(event)).contains("불러오지 못했습니다"));
    }
}
