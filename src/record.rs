use serde::{Deserialize, Serialize};

/// The two repeatable subsection lists of a PLAAFP record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Academic,
    Summary,
}

impl SectionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "academic" => Some(Self::Academic),
            "summary" => Some(Self::Summary),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Summary => "summary",
        }
    }
}

/// How a student's score compares with the grade-level expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Comparison {
    #[default]
    Below,
    At,
    Above,
}

impl Comparison {
    pub const ALLOWED: [&'static str; 3] = ["below", "at", "above"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "below" => Some(Self::Below),
            "at" => Some(Self::At),
            "above" => Some(Self::Above),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Below => "below",
            Self::At => "at",
            Self::Above => "above",
        }
    }
}

// Saved documents are read leniently: an unknown literal falls back to the
// template default instead of failing the whole document.
impl From<String> for Comparison {
    fn from(s: String) -> Self {
        Self::parse(&s).unwrap_or_default()
    }
}

impl From<Comparison> for String {
    fn from(c: Comparison) -> Self {
        c.as_str().to_string()
    }
}

/// Whether the annual goal behind a summary entry was met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GoalStatus {
    Met,
    #[default]
    NotMet,
}

impl GoalStatus {
    pub const ALLOWED: [&'static str; 2] = ["met", "not met"];

    pub fn parse(s: &str) -> Option<Self> {
        let folded = s
            .trim()
            .to_ascii_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match folded.as_str() {
            "met" => Some(Self::Met),
            "not met" => Some(Self::NotMet),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Met => "met",
            Self::NotMet => "not met",
        }
    }
}

impl From<String> for GoalStatus {
    fn from(s: String) -> Self {
        Self::parse(&s).unwrap_or_default()
    }
}

impl From<GoalStatus> for String {
    fn from(g: GoalStatus) -> Self {
        g.as_str().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcademicSection {
    pub id: String,
    pub subject: String,
    pub assessment: String,
    pub score: String,
    pub benchmark: String,
    pub comparison: Comparison,
    pub strengths: String,
    pub deficit: String,
    pub impact: String,
}

impl AcademicSection {
    pub fn template(id: String) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn get(&self, field: AcademicField) -> &str {
        match field {
            AcademicField::Subject => &self.subject,
            AcademicField::Assessment => &self.assessment,
            AcademicField::Score => &self.score,
            AcademicField::Benchmark => &self.benchmark,
            AcademicField::Comparison => self.comparison.as_str(),
            AcademicField::Strengths => &self.strengths,
            AcademicField::Deficit => &self.deficit,
            AcademicField::Impact => &self.impact,
        }
    }

    /// Returns false when `value` is not a literal of a choice field; the
    /// section is left as it was.
    fn set(&mut self, field: AcademicField, value: String) -> bool {
        let slot = match field {
            AcademicField::Subject => &mut self.subject,
            AcademicField::Assessment => &mut self.assessment,
            AcademicField::Score => &mut self.score,
            AcademicField::Benchmark => &mut self.benchmark,
            AcademicField::Strengths => &mut self.strengths,
            AcademicField::Deficit => &mut self.deficit,
            AcademicField::Impact => &mut self.impact,
            AcademicField::Comparison => {
                return match Comparison::parse(&value) {
                    Some(c) => {
                        self.comparison = c;
                        true
                    }
                    None => false,
                };
            }
        };
        *slot = value;
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceSummarySection {
    pub id: String,
    pub area: String,
    pub progress: String,
    pub status: GoalStatus,
    pub next_steps: String,
}

impl PerformanceSummarySection {
    pub fn template(id: String) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn get(&self, field: SummaryField) -> &str {
        match field {
            SummaryField::Area => &self.area,
            SummaryField::Progress => &self.progress,
            SummaryField::Status => self.status.as_str(),
            SummaryField::NextSteps => &self.next_steps,
        }
    }

    fn set(&mut self, field: SummaryField, value: String) -> bool {
        let slot = match field {
            SummaryField::Area => &mut self.area,
            SummaryField::Progress => &mut self.progress,
            SummaryField::NextSteps => &mut self.next_steps,
            SummaryField::Status => {
                return match GoalStatus::parse(&value) {
                    Some(s) => {
                        self.status = s;
                        true
                    }
                    None => false,
                };
            }
        };
        *slot = value;
        true
    }
}

/// Flat scalar fields of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    StudentName,
    Grade,
    Disabilities,
    Strengths,
    ParentConcerns,
    FunctionalStrengths,
    FunctionalNeeds,
    Communication,
    Behavior,
    PostsecondaryGoals,
    TransitionServices,
}

impl RecordField {
    pub const ALL: [RecordField; 11] = [
        Self::StudentName,
        Self::Grade,
        Self::Disabilities,
        Self::Strengths,
        Self::ParentConcerns,
        Self::FunctionalStrengths,
        Self::FunctionalNeeds,
        Self::Communication,
        Self::Behavior,
        Self::PostsecondaryGoals,
        Self::TransitionServices,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StudentName => "studentName",
            Self::Grade => "grade",
            Self::Disabilities => "disabilities",
            Self::Strengths => "strengths",
            Self::ParentConcerns => "parentConcerns",
            Self::FunctionalStrengths => "functionalStrengths",
            Self::FunctionalNeeds => "functionalNeeds",
            Self::Communication => "communication",
            Self::Behavior => "behavior",
            Self::PostsecondaryGoals => "postsecondaryGoals",
            Self::TransitionServices => "transitionServices",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    /// Human label used in prompts and notices.
    pub fn label(self) -> &'static str {
        match self {
            Self::StudentName => "student name",
            Self::Grade => "grade",
            Self::Disabilities => "disability category",
            Self::Strengths => "strengths and interests",
            Self::ParentConcerns => "parent/guardian concerns",
            Self::FunctionalStrengths => "functional strengths",
            Self::FunctionalNeeds => "functional needs",
            Self::Communication => "communication skills",
            Self::Behavior => "social, emotional, and behavioral skills",
            Self::PostsecondaryGoals => "postsecondary goals",
            Self::TransitionServices => "transition services and activities",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcademicField {
    Subject,
    Assessment,
    Score,
    Benchmark,
    Comparison,
    Strengths,
    Deficit,
    Impact,
}

impl AcademicField {
    pub const ALL: [AcademicField; 8] = [
        Self::Subject,
        Self::Assessment,
        Self::Score,
        Self::Benchmark,
        Self::Comparison,
        Self::Strengths,
        Self::Deficit,
        Self::Impact,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Assessment => "assessment",
            Self::Score => "score",
            Self::Benchmark => "benchmark",
            Self::Comparison => "comparison",
            Self::Strengths => "strengths",
            Self::Deficit => "deficit",
            Self::Impact => "impact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Assessment => "assessment or data source",
            Self::Score => "score",
            Self::Benchmark => "grade-level expectation",
            Self::Comparison => "comparison to grade level",
            Self::Strengths => "strengths in this subject",
            Self::Deficit => "area(s) of need",
            Self::Impact => "impact of disability on progress in the general curriculum",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryField {
    Area,
    Progress,
    Status,
    NextSteps,
}

impl SummaryField {
    pub const ALL: [SummaryField; 4] = [Self::Area, Self::Progress, Self::Status, Self::NextSteps];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Area => "area",
            Self::Progress => "progress",
            Self::Status => "status",
            Self::NextSteps => "nextSteps",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Area => "goal area",
            Self::Progress => "progress toward the annual goal",
            Self::Status => "goal status",
            Self::NextSteps => "recommended next steps",
        }
    }
}

/// A named field inside one subsection; the variant names the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionField {
    Academic(AcademicField),
    Summary(SummaryField),
}

impl SectionField {
    pub fn parse(kind: SectionKind, name: &str) -> Option<Self> {
        match kind {
            SectionKind::Academic => AcademicField::parse(name).map(Self::Academic),
            SectionKind::Summary => SummaryField::parse(name).map(Self::Summary),
        }
    }

    pub fn kind(self) -> SectionKind {
        match self {
            Self::Academic(_) => SectionKind::Academic,
            Self::Summary(_) => SectionKind::Summary,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Academic(f) => f.as_str(),
            Self::Summary(f) => f.as_str(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Academic(f) => f.label(),
            Self::Summary(f) => f.label(),
        }
    }

    /// Allowed literals for constrained-choice fields, `None` for free text.
    pub fn choices(self) -> Option<&'static [&'static str]> {
        match self {
            Self::Academic(AcademicField::Comparison) => Some(&Comparison::ALLOWED[..]),
            Self::Summary(SummaryField::Status) => Some(&GoalStatus::ALLOWED[..]),
            _ => None,
        }
    }
}

/// Where a value lives in the record and where it is tagged in the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locator {
    TopLevel(RecordField),
    Section { index: usize, field: SectionField },
}

impl Locator {
    pub fn academic(index: usize, field: AcademicField) -> Self {
        Self::Section {
            index,
            field: SectionField::Academic(field),
        }
    }

    pub fn summary(index: usize, field: SummaryField) -> Self {
        Self::Section {
            index,
            field: SectionField::Summary(field),
        }
    }

    /// Builds a locator from its wire parts (`data-field`, `data-section`,
    /// `data-index`). A section without an index, or an index without a
    /// section, does not resolve.
    pub fn from_parts(field: &str, section: Option<&str>, index: Option<&str>) -> Option<Self> {
        match (section, index) {
            (None, None) => RecordField::parse(field).map(Self::TopLevel),
            (Some(section), Some(index)) => {
                let kind = SectionKind::parse(section)?;
                let index = index.trim().parse::<usize>().ok()?;
                let field = SectionField::parse(kind, field)?;
                Some(Self::Section { index, field })
            }
            _ => None,
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            Self::TopLevel(f) => f.as_str(),
            Self::Section { field, .. } => field.as_str(),
        }
    }

    pub fn index(self) -> Option<usize> {
        match self {
            Self::TopLevel(_) => None,
            Self::Section { index, .. } => Some(index),
        }
    }

    pub fn choices(self) -> Option<&'static [&'static str]> {
        match self {
            Self::TopLevel(_) => None,
            Self::Section { field, .. } => field.choices(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::TopLevel(f) => f.label(),
            Self::Section { field, .. } => field.label(),
        }
    }

    pub fn to_json(self) -> serde_json::Value {
        let mut v = serde_json::json!({ "field": self.field_name() });
        if let Self::Section { index, field } = self {
            v["section"] = serde_json::Value::from(field.kind().as_str());
            v["index"] = serde_json::Value::from(index);
        }
        v
    }
}

/// Source of fresh subsection identifiers.
pub trait SectionIds {
    fn next_id(&mut self) -> String;
}

pub struct UuidIds;

impl SectionIds for UuidIds {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// One PLAAFP document. Mutations return a new value and leave `self` as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    pub student_name: String,
    pub grade: String,
    pub disabilities: String,
    pub strengths: String,
    pub parent_concerns: String,
    pub functional_strengths: String,
    pub functional_needs: String,
    pub communication: String,
    pub behavior: String,
    pub postsecondary_goals: String,
    pub transition_services: String,
    pub academic_sections: Vec<AcademicSection>,
    pub summary_sections: Vec<PerformanceSummarySection>,
}

impl Record {
    pub fn get(&self, field: RecordField) -> &str {
        match field {
            RecordField::StudentName => &self.student_name,
            RecordField::Grade => &self.grade,
            RecordField::Disabilities => &self.disabilities,
            RecordField::Strengths => &self.strengths,
            RecordField::ParentConcerns => &self.parent_concerns,
            RecordField::FunctionalStrengths => &self.functional_strengths,
            RecordField::FunctionalNeeds => &self.functional_needs,
            RecordField::Communication => &self.communication,
            RecordField::Behavior => &self.behavior,
            RecordField::PostsecondaryGoals => &self.postsecondary_goals,
            RecordField::TransitionServices => &self.transition_services,
        }
    }

    fn slot_mut(&mut self, field: RecordField) -> &mut String {
        match field {
            RecordField::StudentName => &mut self.student_name,
            RecordField::Grade => &mut self.grade,
            RecordField::Disabilities => &mut self.disabilities,
            RecordField::Strengths => &mut self.strengths,
            RecordField::ParentConcerns => &mut self.parent_concerns,
            RecordField::FunctionalStrengths => &mut self.functional_strengths,
            RecordField::FunctionalNeeds => &mut self.functional_needs,
            RecordField::Communication => &mut self.communication,
            RecordField::Behavior => &mut self.behavior,
            RecordField::PostsecondaryGoals => &mut self.postsecondary_goals,
            RecordField::TransitionServices => &mut self.transition_services,
        }
    }

    pub fn section_len(&self, kind: SectionKind) -> usize {
        match kind {
            SectionKind::Academic => self.academic_sections.len(),
            SectionKind::Summary => self.summary_sections.len(),
        }
    }

    /// Reads the value at `locator`; `None` when a section index does not
    /// resolve.
    pub fn value(&self, locator: Locator) -> Option<&str> {
        match locator {
            Locator::TopLevel(f) => Some(self.get(f)),
            Locator::Section {
                index,
                field: SectionField::Academic(f),
            } => self.academic_sections.get(index).map(|s| s.get(f)),
            Locator::Section {
                index,
                field: SectionField::Summary(f),
            } => self.summary_sections.get(index).map(|s| s.get(f)),
        }
    }

    pub fn set_field(&self, field: RecordField, value: impl Into<String>) -> Record {
        let mut next = self.clone();
        *next.slot_mut(field) = value.into();
        next
    }

    /// Replaces one field of the subsection at `index`. The index must be in
    /// range; callers check it before calling. A choice field given an
    /// unknown literal leaves the record unchanged.
    pub fn set_section_field(
        &self,
        index: usize,
        field: SectionField,
        value: impl Into<String>,
    ) -> Record {
        debug_assert!(
            index < self.section_len(field.kind()),
            "section index {index} out of range"
        );
        let mut next = self.clone();
        let value = value.into();
        let applied = match field {
            SectionField::Academic(f) => next
                .academic_sections
                .get_mut(index)
                .map(|s| s.set(f, value)),
            SectionField::Summary(f) => next
                .summary_sections
                .get_mut(index)
                .map(|s| s.set(f, value)),
        };
        if applied == Some(true) {
            next
        } else {
            self.clone()
        }
    }

    /// Writes `value` at `locator` through the same store operations a form
    /// edit uses.
    pub fn with_value(&self, locator: Locator, value: impl Into<String>) -> Record {
        match locator {
            Locator::TopLevel(f) => self.set_field(f, value),
            Locator::Section { index, field } => self.set_section_field(index, field, value),
        }
    }

    /// Appends a fresh subsection built from the list's template.
    pub fn append_section(&self, kind: SectionKind, ids: &mut dyn SectionIds) -> Record {
        let mut next = self.clone();
        let id = loop {
            let candidate = ids.next_id();
            let taken = match kind {
                SectionKind::Academic => next.academic_sections.iter().any(|s| s.id == candidate),
                SectionKind::Summary => next.summary_sections.iter().any(|s| s.id == candidate),
            };
            if !taken && !candidate.is_empty() {
                break candidate;
            }
        };
        match kind {
            SectionKind::Academic => next.academic_sections.push(AcademicSection::template(id)),
            SectionKind::Summary => next
                .summary_sections
                .push(PerformanceSummarySection::template(id)),
        }
        next
    }
}

#[cfg(test)]
pub(crate) struct CountingIds(pub u32);

#[cfg(test)]
impl SectionIds for CountingIds {
    fn next_id(&mut self) -> String {
        self.0 += 1;
        format!("sec-{}", self.0)
    }
}
