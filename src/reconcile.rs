use crate::markup;
use crate::record::{Locator, Record};
use crate::render;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Unchanged,
    Changed(Record),
}

impl Reconciled {
    pub fn is_changed(&self) -> bool {
        matches!(self, Reconciled::Changed(_))
    }

    pub fn into_record(self, previous: &Record) -> Record {
        match self {
            Reconciled::Unchanged => previous.clone(),
            Reconciled::Changed(r) => r,
        }
    }
}

/// Merges text edited in the preview back into `previous`.
///
/// Only locators whose live text no longer matches what the previous record
/// displays are written. When several occurrences of one locator were
/// edited, the last one in document order wins. Section locators that no
/// longer resolve are skipped. Unreadable markup yields `Unchanged`.
pub fn reconcile(previous: &Record, edited_markup: &str) -> Reconciled {
    let displayed = render::project(previous);
    let mut staged: Vec<(Locator, String)> = Vec::new();

    for item in markup::scan_located(edited_markup) {
        let Some(current) = previous.value(item.locator) else {
            tracing::debug!(
                field = item.locator.field_name(),
                index = ?item.locator.index(),
                "preview locator no longer resolves; skipped"
            );
            continue;
        };
        let shown = displayed
            .iter()
            .any(|(l, text)| *l == item.locator && *text == item.text);
        if shown {
            continue;
        }
        let Some(value) = staged_value(item.locator, current, &item.text) else {
            continue;
        };
        match staged.iter_mut().find(|(l, _)| *l == item.locator) {
            Some(slot) => slot.1 = value,
            None => staged.push((item.locator, value)),
        }
    }

    if staged.is_empty() {
        return Reconciled::Unchanged;
    }

    let next = staged
        .into_iter()
        .fold(previous.clone(), |r, (locator, value)| r.with_value(locator, value));
    if next == *previous {
        Reconciled::Unchanged
    } else {
        tracing::debug!("preview edits merged into record");
        Reconciled::Changed(next)
    }
}

/// The value to write for edited text `live`, or `None` when it does not
/// change `current` (or is not a usable value for the field).
fn staged_value(locator: Locator, current: &str, live: &str) -> Option<String> {
    if locator.choices().is_some() {
        let parsed = parse_choice(locator, live)?;
        return (parsed != current).then(|| parsed.to_string());
    }

    if live == current {
        return None;
    }
    // A placeholder other than the one shown (e.g. the possessive blank
    // typed into a name span) still means "empty".
    if render::is_placeholder_text(locator, live) {
        return (!current.trim().is_empty()).then(String::new);
    }
    Some(live.to_string())
}

fn parse_choice(locator: Locator, live: &str) -> Option<&'static str> {
    use crate::record::{AcademicField, Comparison, GoalStatus, SectionField, SummaryField};
    match locator {
        Locator::Section {
            field: SectionField::Academic(AcademicField::Comparison),
            ..
        } => Comparison::parse(live).map(Comparison::as_str),
        Locator::Section {
            field: SectionField::Summary(SummaryField::Status),
            ..
        } => GoalStatus::parse(live).map(GoalStatus::as_str),
        _ => None,
    }
}
