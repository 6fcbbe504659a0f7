//! Search, filter and sort over a sheet's tasks, as the task table shows them.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{Assignee, AssigneeId, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Pratica,
    Scadenza,
    Assegnatario,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn toggle(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    /// Case-insensitive substring matched against `pratica` and `note`.
    pub search: String,
    /// Keep only tasks assigned to this member.
    pub assignee: Option<AssigneeId>,
    pub sort: SortField,
    pub order: SortOrder,
}

impl TaskQuery {
    /// Header-click behaviour: the same field flips the order, a new field
    /// sorts ascending.
    pub fn toggle_sort(&mut self, field: SortField) {
        if self.sort == field {
            self.order = self.order.toggle();
        } else {
            self.sort = field;
            self.order = SortOrder::Asc;
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        let needle = self.search.to_lowercase();
        let matches_search = task.pratica.to_lowercase().contains(&needle)
            || task.note.to_lowercase().contains(&needle);
        let matches_assignee = self
            .assignee
            .as_ref()
            .map_or(true, |id| task.assegnatari.contains(id));
        matches_search && matches_assignee
    }

    /// Filtered and sorted view. The sort is stable, so ties keep sheet order.
    pub fn apply<'a>(&self, tasks: &'a [Task], team: &[Assignee]) -> Vec<&'a Task> {
        let mut view: Vec<&Task> = tasks.iter().filter(|t| self.matches(t)).collect();
        view.sort_by(|a, b| {
            let ordering = self.compare(a, b, team);
            match self.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        view
    }

    fn compare(&self, a: &Task, b: &Task, team: &[Assignee]) -> Ordering {
        match self.sort {
            SortField::Pratica => compare_text(&a.pratica, &b.pratica),
            SortField::Scadenza => a.scadenza.cmp(&b.scadenza),
            SortField::Assegnatario => {
                compare_text(first_assignee_name(a, team), first_assignee_name(b, team))
            }
        }
    }
}

fn first_assignee_name<'a>(task: &Task, team: &'a [Assignee]) -> &'a str {
    task.assegnatari
        .first()
        .and_then(|id| team.iter().find(|m| &m.id == id))
        .map_or("", |m| m.name.as_str())
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_sort_flips_then_resets() {
        let mut q = TaskQuery::default();
        q.toggle_sort(SortField::Pratica);
        assert_eq!(q.order, SortOrder::Desc);
        q.toggle_sort(SortField::Scadenza);
        assert_eq!((q.sort, q.order), (SortField::Scadenza, SortOrder::Asc));
    }

    #[test]
    fn text_comparison_ignores_case_first() {
        assert_eq!(compare_text("alfa", "Beta"), Ordering::Less);
        assert_eq!(compare_text("Alfa", "alfa"), Ordering::Less);
    }
}
