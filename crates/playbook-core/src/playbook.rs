use serde_yaml::{Mapping, Value};

use crate::action::ModuleAction;
use crate::error::{PlaybookError, Result};

/// One step of a play: exactly one module action plus optional guard and
/// loop metadata.
#[derive(Debug)]
pub struct Task {
    pub name: Option<String>,
    pub action: Box<dyn ModuleAction>,
    /// Guard expression; the task is skipped when it evaluates false.
    pub when: Option<String>,
    pub with_items: Vec<Value>,
}

impl Task {
    pub fn new(action: impl ModuleAction + 'static) -> Self {
        Self::from_boxed(Box::new(action))
    }

    pub fn from_boxed(action: Box<dyn ModuleAction>) -> Self {
        Self {
            name: None,
            action,
            when: None,
            with_items: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn when(mut self, guard: impl Into<String>) -> Self {
        self.when = Some(guard.into());
        self
    }

    pub fn with_items(mut self, items: Vec<Value>) -> Self {
        self.with_items = items;
        self
    }
}

/// A unit targeting one host selector. Task order is execution order.
#[derive(Debug, Default)]
pub struct Play {
    pub name: String,
    pub hosts: String,
    pub tasks: Vec<Task>,
    pub vars: Mapping,
    pub any_errors_fatal: bool,
}

impl Play {
    pub fn new(hosts: impl Into<String>) -> Self {
        Self {
            hosts: hosts.into(),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(Value::String(key.into()), value.into());
    }

    /// Insert `task` before the task currently at `index`; later tasks shift
    /// right and the play grows by one. This is not replace-at-index, although
    /// it keeps the same `0..len` bound a replace would have.
    ///
    /// `index` must address an existing task (`0..len`); appending goes
    /// through [`Play::append_task`].
    pub fn insert_task(&mut self, index: usize, task: Task) -> Result<()> {
        self.check_index(index)?;
        self.tasks.insert(index, task);
        Ok(())
    }

    /// Remove and return the task at `index`.
    pub fn remove_task(&mut self, index: usize) -> Result<Task> {
        self.check_index(index)?;
        Ok(self.tasks.remove(index))
    }

    pub fn append_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Remove and return the first task.
    pub fn pop_task(&mut self) -> Result<Task> {
        if self.tasks.is_empty() {
            return Err(PlaybookError::EmptyPlay);
        }
        Ok(self.tasks.remove(0))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.tasks.len() {
            return Err(PlaybookError::IndexOutOfRange {
                index,
                len: self.tasks.len(),
            });
        }
        Ok(())
    }
}

/// An ordered collection of plays forming one automation run.
#[derive(Debug, Default)]
pub struct Playbook {
    /// Caller-assigned, unique. Doubles as the run ID for an execution.
    pub id: String,
    pub name: String,
    pub description: String,
    /// Privilege escalation for every play.
    pub r#become: bool,
    pub plays: Vec<Play>,
}

impl Playbook {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_play(mut self, play: Play) -> Self {
        self.plays.push(play);
        self
    }

    pub fn task_count(&self) -> usize {
        self.plays.iter().map(|p| p.tasks.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::CommandAction;

    fn play_with(names: &[&str]) -> Play {
        let mut play = Play::new("all");
        for n in names {
            play.append_task(Task::new(CommandAction::new(format!("echo {n}"))).named(*n));
        }
        play
    }

    fn names(play: &Play) -> Vec<&str> {
        play.tasks
            .iter()
            .map(|t| t.name.as_deref().unwrap_or(""))
            .collect()
    }

    #[test]
    fn insert_shifts_later_tasks() {
        let mut play = play_with(&["a", "b", "c"]);
        play.insert_task(1, Task::new(CommandAction::new("x")).named("x"))
            .unwrap();
        assert_eq!(names(&play), ["a", "x", "b", "c"]);
    }

    #[test]
    fn insert_out_of_range_fails() {
        let mut play = play_with(&["a", "b"]);
        let err = play
            .insert_task(2, Task::new(CommandAction::new("x")))
            .unwrap_err();
        assert!(matches!(err, PlaybookError::IndexOutOfRange { index: 2, len: 2 }));
        assert_eq!(play.tasks.len(), 2);
    }

    #[test]
    fn insert_into_empty_play_fails() {
        let mut play = Play::new("all");
        assert!(play.insert_task(0, Task::new(CommandAction::new("x"))).is_err());
    }

    #[test]
    fn remove_preserves_order() {
        let mut play = play_with(&["a", "b", "c", "d"]);
        let removed = play.remove_task(1).unwrap();
        assert_eq!(removed.name.as_deref(), Some("b"));
        assert_eq!(play.tasks.len(), 3);
        assert_eq!(names(&play), ["a", "c", "d"]);
    }

    #[test]
    fn remove_out_of_range_fails() {
        let mut play = play_with(&["a"]);
        assert!(play.remove_task(1).is_err());
        assert!(play.remove_task(usize::MAX).is_err());
        assert_eq!(play.tasks.len(), 1);
    }

    #[test]
    fn pop_removes_first() {
        let mut play = play_with(&["a", "b"]);
        assert_eq!(play.pop_task().unwrap().name.as_deref(), Some("a"));
        assert_eq!(names(&play), ["b"]);
        play.pop_task().unwrap();
        assert!(matches!(play.pop_task(), Err(PlaybookError::EmptyPlay)));
    }

    #[test]
    fn task_count_sums_plays() {
        let book = Playbook::new("p1")
            .with_play(play_with(&["a", "b"]))
            .with_play(play_with(&["c"]));
        assert_eq!(book.task_count(), 3);
    }
}
