use crate::record::{AcademicField, Locator, Record, RecordField, SectionField, SummaryField};

/// Possessive stand-in when no student name has been entered.
pub const NAME_BLANK: &str = "______";
/// Pronouns are never inferred from the name.
pub const PRONOUN: &str = "he/she";

pub const FIELD_CLASS: &str = "plaafp-field";
pub const PLACEHOLDER_CLASS: &str = "plaafp-placeholder";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedValue {
    pub locator: Locator,
    pub text: String,
    pub placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Located(LocatedValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Heading,
    Subheading,
    Paragraph,
}

impl BlockKind {
    fn tag(self) -> &'static str {
        match self {
            BlockKind::Heading => "h2",
            BlockKind::Subheading => "h3",
            BlockKind::Paragraph => "p",
        }
    }
}

/// Which part of the report a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockGroup {
    Intro,
    Academic(usize),
    Functional,
    Transition,
    Summary(Option<usize>),
}

impl BlockGroup {
    fn name(self) -> &'static str {
        match self {
            BlockGroup::Intro => "intro",
            BlockGroup::Academic(_) => "academic",
            BlockGroup::Functional => "functional",
            BlockGroup::Transition => "transition",
            BlockGroup::Summary(_) => "summary",
        }
    }

    fn index(self) -> Option<usize> {
        match self {
            BlockGroup::Academic(i) => Some(i),
            BlockGroup::Summary(i) => i,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub group: BlockGroup,
    pub kind: BlockKind,
    pub inlines: Vec<Inline>,
}

impl Block {
    pub fn plain_text(&self) -> String {
        self.inlines
            .iter()
            .map(|i| match i {
                Inline::Text(t) => t.as_str(),
                Inline::Located(v) => v.text.as_str(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichDocument {
    pub blocks: Vec<Block>,
}

impl RichDocument {
    /// Every tagged value in document order.
    pub fn located(&self) -> impl Iterator<Item = &LocatedValue> {
        self.blocks.iter().flat_map(|b| {
            b.inlines.iter().filter_map(|i| match i {
                Inline::Located(v) => Some(v),
                Inline::Text(_) => None,
            })
        })
    }

    pub fn to_plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            let tag = block.kind.tag();
            out.push('<');
            out.push_str(tag);
            out.push_str(" data-block=\"");
            out.push_str(block.group.name());
            out.push('"');
            if let Some(i) = block.group.index() {
                out.push_str(&format!(" data-block-index=\"{i}\""));
            }
            out.push('>');
            for inline in &block.inlines {
                match inline {
                    Inline::Text(t) => out.push_str(&escape_text(t)),
                    Inline::Located(v) => push_span(&mut out, v),
                }
            }
            out.push_str("</");
            out.push_str(tag);
            out.push_str(">\n");
        }
        out
    }
}

fn push_span(out: &mut String, v: &LocatedValue) {
    out.push_str("<span class=\"");
    out.push_str(FIELD_CLASS);
    if v.placeholder {
        out.push(' ');
        out.push_str(PLACEHOLDER_CLASS);
    }
    out.push_str("\" data-field=\"");
    out.push_str(&escape_attr(v.locator.field_name()));
    out.push('"');
    if let Locator::Section { index, field } = v.locator {
        out.push_str(&format!(
            " data-section=\"{}\" data-index=\"{}\"",
            field.kind().as_str(),
            index
        ));
    }
    out.push('>');
    out.push_str(&escape_text(&v.text));
    out.push_str("</span>");
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// The "(explanatory text)" shown in place of an empty value.
pub fn placeholder(locator: Locator) -> String {
    match locator {
        Locator::TopLevel(f) => match f {
            RecordField::StudentName => "(student name)",
            RecordField::Grade => "(grade)",
            RecordField::Disabilities => "(disability(ies))",
            RecordField::Strengths => "(student strengths and interests)",
            RecordField::ParentConcerns => "(parent/guardian concerns)",
            RecordField::FunctionalStrengths => "(functional strengths)",
            RecordField::FunctionalNeeds => "(functional needs)",
            RecordField::Communication => "(communication skills)",
            RecordField::Behavior => "(social, emotional, and behavioral skills)",
            RecordField::PostsecondaryGoals => "(postsecondary goals)",
            RecordField::TransitionServices => "(transition services and activities)",
        }
        .to_string(),
        Locator::Section { index, field } => match field {
            SectionField::Academic(AcademicField::Subject) => format!("(Subject {})", index + 1),
            SectionField::Summary(SummaryField::Area) => format!("(Area {})", index + 1),
            SectionField::Academic(f) => match f {
                AcademicField::Assessment => "(assessment or data source)",
                AcademicField::Score => "(score)",
                AcademicField::Benchmark => "(grade-level expectation)",
                AcademicField::Comparison => "(below/at/above)",
                AcademicField::Strengths => "(strengths in this subject)",
                AcademicField::Deficit => "(area(s) of need)",
                AcademicField::Impact => {
                    "(impact of the disability on involvement and progress in the general curriculum)"
                }
                AcademicField::Subject => unreachable!("handled above"),
            }
            .to_string(),
            SectionField::Summary(f) => match f {
                SummaryField::Progress => "(progress toward the annual goal)",
                SummaryField::Status => "(met/not met)",
                SummaryField::NextSteps => "(recommended next steps)",
                SummaryField::Area => unreachable!("handled above"),
            }
            .to_string(),
        },
    }
}

/// True when `text` is one of the stand-ins rendered for an empty value at
/// `locator`.
pub fn is_placeholder_text(locator: Locator, text: &str) -> bool {
    if locator == Locator::TopLevel(RecordField::StudentName) && text == NAME_BLANK {
        return true;
    }
    text == placeholder(locator)
}

struct Line<'r> {
    record: &'r Record,
    inlines: Vec<Inline>,
}

impl<'r> Line<'r> {
    fn new(record: &'r Record) -> Self {
        Self {
            record,
            inlines: Vec::new(),
        }
    }

    fn text(mut self, s: &str) -> Self {
        if let Some(Inline::Text(last)) = self.inlines.last_mut() {
            last.push_str(s);
        } else {
            self.inlines.push(Inline::Text(s.to_string()));
        }
        self
    }

    fn field(mut self, locator: Locator) -> Self {
        let value = self.record.value(locator).unwrap_or("");
        let located = if value.trim().is_empty() {
            LocatedValue {
                locator,
                text: placeholder(locator),
                placeholder: true,
            }
        } else {
            LocatedValue {
                locator,
                text: value.to_string(),
                placeholder: false,
            }
        };
        self.inlines.push(Inline::Located(located));
        self
    }

    fn possessive(mut self) -> Self {
        let locator = Locator::TopLevel(RecordField::StudentName);
        let name = &self.record.student_name;
        let located = if name.trim().is_empty() {
            LocatedValue {
                locator,
                text: NAME_BLANK.to_string(),
                placeholder: true,
            }
        } else {
            LocatedValue {
                locator,
                text: name.clone(),
                placeholder: false,
            }
        };
        self.inlines.push(Inline::Located(located));
        self.text("'s")
    }

    fn pronoun(self) -> Self {
        self.text(PRONOUN)
    }

    fn block(self, group: BlockGroup, kind: BlockKind) -> Block {
        Block {
            group,
            kind,
            inlines: self.inlines,
        }
    }
}

/// Renders the report for `record`. Total: an empty record renders with
/// placeholders everywhere.
pub fn render(record: &Record) -> RichDocument {
    use RecordField as F;
    let top = Locator::TopLevel;
    let mut blocks = Vec::new();

    blocks.push(
        Line::new(record)
            .field(top(F::StudentName))
            .text(" is a ")
            .field(top(F::Grade))
            .text(" grade student diagnosed with a ")
            .field(top(F::Disabilities))
            .text(" disability(ies). ")
            .possessive()
            .text(" strengths and interests include ")
            .field(top(F::Strengths))
            .text(". ")
            .possessive()
            .text(" parent(s)/guardian(s) report the following concerns: ")
            .field(top(F::ParentConcerns))
            .text(".")
            .block(BlockGroup::Intro, BlockKind::Paragraph),
    );

    for index in 0..record.academic_sections.len() {
        let at = |f| Locator::academic(index, f);
        let group = BlockGroup::Academic(index);
        blocks.push(
            Line::new(record)
                .text("Academics: ")
                .field(at(AcademicField::Subject))
                .block(group, BlockKind::Heading),
        );
        blocks.push(
            Line::new(record)
                .text("On ")
                .field(at(AcademicField::Assessment))
                .text(", ")
                .field(top(F::StudentName))
                .text(" scored ")
                .field(at(AcademicField::Score))
                .text(", which is ")
                .field(at(AcademicField::Comparison))
                .text(" the grade-level expectation of ")
                .field(at(AcademicField::Benchmark))
                .text(". In ")
                .field(at(AcademicField::Subject))
                .text(", ")
                .pronoun()
                .text(" demonstrates strengths in ")
                .field(at(AcademicField::Strengths))
                .text(". ")
                .possessive()
                .text(" area(s) of need include ")
                .field(at(AcademicField::Deficit))
                .text(". ")
                .field(at(AcademicField::Impact))
                .block(group, BlockKind::Paragraph),
        );
    }

    blocks.push(
        Line::new(record)
            .text("Functional Performance")
            .block(BlockGroup::Functional, BlockKind::Heading),
    );
    blocks.push(
        Line::new(record)
            .field(top(F::StudentName))
            .text(" demonstrates functional strengths in ")
            .field(top(F::FunctionalStrengths))
            .text(". Functional needs include ")
            .field(top(F::FunctionalNeeds))
            .text(". In the area of communication, ")
            .pronoun()
            .text(" ")
            .field(top(F::Communication))
            .text(". Socially and behaviorally, ")
            .pronoun()
            .text(" ")
            .field(top(F::Behavior))
            .text(".")
            .block(BlockGroup::Functional, BlockKind::Paragraph),
    );

    blocks.push(
        Line::new(record)
            .text("Transition")
            .block(BlockGroup::Transition, BlockKind::Heading),
    );
    blocks.push(
        Line::new(record)
            .possessive()
            .text(" postsecondary goals include ")
            .field(top(F::PostsecondaryGoals))
            .text(". To support these goals, ")
            .pronoun()
            .text(" will participate in ")
            .field(top(F::TransitionServices))
            .text(".")
            .block(BlockGroup::Transition, BlockKind::Paragraph),
    );

    if !record.summary_sections.is_empty() {
        blocks.push(
            Line::new(record)
                .text("Summary of Performance")
                .block(BlockGroup::Summary(None), BlockKind::Heading),
        );
        for index in 0..record.summary_sections.len() {
            let at = |f| Locator::summary(index, f);
            let group = BlockGroup::Summary(Some(index));
            blocks.push(
                Line::new(record)
                    .field(at(SummaryField::Area))
                    .block(group, BlockKind::Subheading),
            );
            blocks.push(
                Line::new(record)
                    .field(at(SummaryField::Progress))
                    .text(" Goal status: ")
                    .field(at(SummaryField::Status))
                    .text(". Recommended next steps: ")
                    .field(at(SummaryField::NextSteps))
                    .text(".")
                    .block(group, BlockKind::Paragraph),
            );
        }
    }

    RichDocument { blocks }
}

/// Record → ordered (locator, displayed text) pairs. This is the contract
/// shared by the markup emitter and the reconciler.
pub fn project(record: &Record) -> Vec<(Locator, String)> {
    render(record)
        .located()
        .map(|v| (v.locator, v.text.clone()))
        .collect()
}
