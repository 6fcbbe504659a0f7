//! Domain types for the LegalFlow workspace.
//!
//! Field names and enum labels follow the JSON layout the browser build keeps
//! in local storage, so persisted blobs round-trip between the two.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier of a sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(pub String);

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SheetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SheetId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque identifier of a task, unique within its owning sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque identifier of a team member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssigneeId(pub String);

impl fmt::Display for AssigneeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AssigneeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AssigneeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Shared workspace code; clients holding the same code sync against the
/// same remote state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamCode(pub String);

impl fmt::Display for TeamCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TeamCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TeamCode {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "In corso")]
    InCorso,
    #[serde(rename = "Completato")]
    Completato,
    #[serde(rename = "In attesa")]
    InAttesa,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::InCorso,
        TaskStatus::Completato,
        TaskStatus::InAttesa,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::InCorso => "In corso",
            TaskStatus::Completato => "Completato",
            TaskStatus::InAttesa => "In attesa",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of sheet. Only [`SheetType::Tasks`] carries task semantics; the
/// others are placeholder panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SheetType {
    #[serde(rename = "TASKS")]
    Tasks,
    #[serde(rename = "DUE DILIGENCE")]
    DueDiligence,
    #[serde(rename = "INSIGHT")]
    Insight,
    #[serde(rename = "LEXOLOGY")]
    Lexology,
    #[serde(rename = "ATTIVITA MKT")]
    AttivitaMkt,
    #[serde(rename = "BUSINESS DEVELOPMENT")]
    BusinessDevelopment,
    #[serde(rename = "PRICING TOOL")]
    PricingTool,
    #[serde(rename = "NORMATIVA")]
    Normativa,
    #[serde(rename = "CUSTOM")]
    Custom,
}

impl SheetType {
    pub fn label(self) -> &'static str {
        match self {
            SheetType::Tasks => "TASKS",
            SheetType::DueDiligence => "DUE DILIGENCE",
            SheetType::Insight => "INSIGHT",
            SheetType::Lexology => "LEXOLOGY",
            SheetType::AttivitaMkt => "ATTIVITA MKT",
            SheetType::BusinessDevelopment => "BUSINESS DEVELOPMENT",
            SheetType::PricingTool => "PRICING TOOL",
            SheetType::Normativa => "NORMATIVA",
            SheetType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for SheetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A team member that can be attached to tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub id: AssigneeId,
    pub name: String,
    /// Presentation hint picked from a fixed palette at creation.
    #[serde(rename = "color")]
    pub color_tag: String,
}

impl Assignee {
    /// First letter of each word of the name, e.g. "Aurora Agostini" → "AA".
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .collect()
    }

    /// First word of the name, as shown on assignee chips.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }
}

/// A single case record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub pratica: String,
    /// Member ids in toggle order. May reference ids no longer in the team.
    #[serde(default)]
    pub assegnatari: Vec<AssigneeId>,
    #[serde(default)]
    pub altri: String,
    /// Due date. The browser build stores a cleared date picker as `""`.
    #[serde(default, with = "blank_date")]
    pub scadenza: Option<NaiveDate>,
    #[serde(default)]
    pub stato: TaskStatus,
    #[serde(default)]
    pub note: String,
}

impl Task {
    /// Returns the assignee list with `member` removed if present, otherwise
    /// appended at the end.
    pub fn with_assignee_toggled(&self, member: &AssigneeId) -> Vec<AssigneeId> {
        if self.assegnatari.contains(member) {
            self.assegnatari
                .iter()
                .filter(|id| *id != member)
                .cloned()
                .collect()
        } else {
            let mut next = self.assegnatari.clone();
            next.push(member.clone());
            next
        }
    }
}

/// Merge-patch for a [`Task`]: only `Some` fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pratica: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assegnatari: Option<Vec<AssigneeId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altri: Option<String>,
    /// `Some(None)` clears the date.
    #[serde(skip_serializing_if = "Option::is_none", with = "blank_date_patch")]
    pub scadenza: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stato: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(pratica) = self.pratica {
            task.pratica = pratica;
        }
        if let Some(assegnatari) = self.assegnatari {
            task.assegnatari = assegnatari;
        }
        if let Some(altri) = self.altri {
            task.altri = altri;
        }
        if let Some(scadenza) = self.scadenza {
            task.scadenza = scadenza;
        }
        if let Some(stato) = self.stato {
            task.stato = stato;
        }
        if let Some(note) = self.note {
            task.note = note;
        }
    }
}

/// Rows of a sheet.
///
/// Rows that do not decode as tasks (panels other than TASKS, or blobs
/// written by a newer build) are carried verbatim so they survive a
/// load/save cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetData {
    Tasks(Vec<Task>),
    Opaque(serde_json::Value),
}

impl Default for SheetData {
    fn default() -> Self {
        SheetData::Tasks(Vec::new())
    }
}

impl SheetData {
    /// Number of rows, whatever their shape.
    pub fn len(&self) -> usize {
        match self {
            SheetData::Tasks(tasks) => tasks.len(),
            SheetData::Opaque(serde_json::Value::Array(rows)) => rows.len(),
            SheetData::Opaque(serde_json::Value::Null) => 0,
            SheetData::Opaque(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded tasks; empty for opaque rows.
    pub fn tasks(&self) -> &[Task] {
        match self {
            SheetData::Tasks(tasks) => tasks,
            SheetData::Opaque(_) => &[],
        }
    }

    /// `None` for opaque rows, which task operations leave untouched.
    pub fn tasks_mut(&mut self) -> Option<&mut Vec<Task>> {
        match self {
            SheetData::Tasks(tasks) => Some(tasks),
            SheetData::Opaque(_) => None,
        }
    }
}

impl From<Vec<Task>> for SheetData {
    fn from(tasks: Vec<Task>) -> Self {
        SheetData::Tasks(tasks)
    }
}

/// A named, typed tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub id: SheetId,
    pub name: String,
    #[serde(rename = "type")]
    pub sheet_type: SheetType,
    #[serde(default)]
    pub data: SheetData,
    /// Refreshed on every mutation of `data`; drives conflict resolution.
    pub last_updated: Timestamp,
}

impl Sheet {
    pub fn tasks(&self) -> &[Task] {
        self.data.tasks()
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks().iter().find(|t| &t.id == id)
    }
}

/// The unit exchanged with the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub sheets: Vec<Sheet>,
    pub team: Vec<Assignee>,
    pub version: Timestamp,
}

// ---------------------------------------------------------------------------
// Date codecs
// ---------------------------------------------------------------------------

/// `"2026-03-14"` or `""` (no date).
mod blank_date {
    use super::*;
    use serde::de::Error;

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => date.serialize(s),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(d)?.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Some)
                .map_err(D::Error::custom),
        }
    }
}

/// Patch field: absent leaves the date alone, `""` clears it.
mod blank_date_patch {
    use super::*;

    pub fn serialize<S: Serializer>(
        date: &Option<Option<NaiveDate>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(inner) => blank_date::serialize(inner, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Option<NaiveDate>>, D::Error> {
        blank_date::deserialize(d).map(Some)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Colour tags handed out to members added at runtime.
pub const MEMBER_PALETTE: [&str; 4] = ["indigo", "rose", "cyan", "fuchsia"];

const DEFAULT_SHEET_TYPES: [SheetType; 8] = [
    SheetType::Tasks,
    SheetType::DueDiligence,
    SheetType::Insight,
    SheetType::Lexology,
    SheetType::AttivitaMkt,
    SheetType::BusinessDevelopment,
    SheetType::PricingTool,
    SheetType::Normativa,
];

/// The eight built-in tabs, `sheet-1` (TASKS) through `sheet-8` (NORMATIVA).
pub fn default_sheets(now: Timestamp) -> Vec<Sheet> {
    DEFAULT_SHEET_TYPES
        .iter()
        .enumerate()
        .map(|(i, ty)| Sheet {
            id: SheetId(format!("sheet-{}", i + 1)),
            name: ty.label().to_owned(),
            sheet_type: *ty,
            data: SheetData::default(),
            last_updated: now,
        })
        .collect()
}

/// The initial five-member roster.
pub fn default_team() -> Vec<Assignee> {
    [
        ("1", "Aurora Agostini", "purple"),
        ("2", "Giulietta Minucci", "pink"),
        ("3", "Alessandro Carlini", "blue"),
        ("4", "Giovanni Lombardi", "emerald"),
        ("5", "Beatrice Pedroni", "orange"),
    ]
    .into_iter()
    .map(|(id, name, color)| Assignee {
        id: AssigneeId::from(id),
        name: name.to_owned(),
        color_tag: color.to_owned(),
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task {
            id: TaskId::from("t-1"),
            pratica: "Rossi vs Bianchi".into(),
            assegnatari: vec![AssigneeId::from("1")],
            altri: String::new(),
            scadenza: NaiveDate::from_ymd_opt(2026, 3, 14),
            stato: TaskStatus::InAttesa,
            note: String::new(),
        }
    }

    #[test]
    fn newtype_display() {
        assert_eq!(SheetId::from("sheet-1").to_string(), "sheet-1");
        assert_eq!(TeamCode::from("TEAM-ABC1234").to_string(), "TEAM-ABC1234");
    }

    #[test]
    fn task_json_matches_browser_layout() {
        let json = serde_json::to_value(task()).expect("serialize");
        assert_eq!(json["stato"], "In attesa");
        assert_eq!(json["scadenza"], "2026-03-14");
        assert_eq!(json["assegnatari"][0], "1");
    }

    #[test]
    fn sheet_json_uses_camel_case_and_type_label() {
        let sheet = &default_sheets(42)[4];
        let json = serde_json::to_value(sheet).expect("serialize");
        assert_eq!(json["type"], "ATTIVITA MKT");
        assert_eq!(json["lastUpdated"], 42);
        assert_eq!(json["id"], "sheet-5");
    }

    #[test]
    fn patch_only_touches_supplied_fields() {
        let mut t = task();
        TaskPatch {
            note: Some("udienza rinviata".into()),
            ..Default::default()
        }
        .apply(&mut t);
        assert_eq!(t.note, "udienza rinviata");
        assert_eq!(t.pratica, "Rossi vs Bianchi");
        assert_eq!(t.stato, TaskStatus::InAttesa);
    }

    #[test]
    fn patch_deserializes_from_partial_json() {
        let patch: TaskPatch = serde_json::from_str(r#"{"stato":"Completato"}"#).expect("parse");
        assert_eq!(patch.stato, Some(TaskStatus::Completato));
        assert!(patch.pratica.is_none());
        assert!(TaskPatch::default().is_empty());
    }

    #[test]
    fn blank_scadenza_round_trips_as_empty_string() {
        let raw = r#"{"id":"t-9","pratica":"Verdi","assegnatari":[],"altri":"","scadenza":"","stato":"In corso","note":""}"#;
        let t: Task = serde_json::from_str(raw).expect("parse");
        assert_eq!(t.scadenza, None);
        let json = serde_json::to_value(&t).expect("serialize");
        assert_eq!(json["scadenza"], "");
    }

    #[test]
    fn patch_with_blank_scadenza_clears_the_date() {
        let patch: TaskPatch = serde_json::from_str(r#"{"scadenza":""}"#).expect("parse");
        assert_eq!(patch.scadenza, Some(None));
        let mut t = task();
        patch.apply(&mut t);
        assert_eq!(t.scadenza, None);
        assert!(serde_json::from_str::<TaskPatch>("{}").expect("parse").scadenza.is_none());
    }

    #[test]
    fn non_task_rows_are_kept_verbatim() {
        let raw = r#"{"id":"sheet-2","name":"DUE DILIGENCE","type":"DUE DILIGENCE","data":[{"societa":"Acme","rischio":3}],"lastUpdated":5}"#;
        let sheet: Sheet = serde_json::from_str(raw).expect("parse");
        assert!(sheet.tasks().is_empty());
        assert_eq!(sheet.data.len(), 1);
        let back = serde_json::to_value(&sheet).expect("serialize");
        assert_eq!(back["data"][0]["societa"], "Acme");
        assert_eq!(back["data"][0]["rischio"], 3);
    }

    #[test]
    fn toggle_appends_then_removes() {
        let t = task();
        let added = t.with_assignee_toggled(&AssigneeId::from("3"));
        assert_eq!(added, vec![AssigneeId::from("1"), AssigneeId::from("3")]);
        let removed = t.with_assignee_toggled(&AssigneeId::from("1"));
        assert!(removed.is_empty());
    }

    #[test]
    fn assignee_initials() {
        let team = default_team();
        assert_eq!(team[0].initials(), "AA");
        assert_eq!(team[2].first_name(), "Alessandro");
    }

    #[test]
    fn defaults_have_expected_shape() {
        let sheets = default_sheets(0);
        assert_eq!(sheets.len(), 8);
        assert_eq!(sheets[0].name, "TASKS");
        assert_eq!(sheets[0].sheet_type, SheetType::Tasks);
        assert_eq!(sheets[7].id, SheetId::from("sheet-8"));
        assert_eq!(default_team().len(), 5);
    }
}
