type Step<'a> = Box<dyn FnOnce() -> Result<(), String> + 'a>;

/// Undo steps recorded as a saga moves forward.
///
/// `rollback` runs them newest first. A failing step is logged and the rest
/// still run.
#[derive(Default)]
pub struct Compensations<'a> {
    steps: Vec<(&'static str, Step<'a>)>,
}

impl<'a> Compensations<'a> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn push(&mut self, label: &'static str, step: impl FnOnce() -> Result<(), String> + 'a) {
        self.steps.push((label, Box::new(step)));
    }

    pub fn rollback(self) {
        for (label, step) in self.steps.into_iter().rev() {
            match step() {
                Ok(()) => tracing::debug!(step = label, "compensation applied"),
                Err(err) => tracing::warn!(step = label, error = %err, "compensation failed"),
            }
        }
    }

    /// The saga finished; forget every undo step.
    pub fn commit(self) {
        drop(self.steps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn rollback_runs_newest_first_and_survives_failures() {
        let log = RefCell::new(Vec::new());
        let mut compensations = Compensations::new();
        compensations.push("remove worktree", || {
            log.borrow_mut().push("worktree");
            Ok(())
        });
        compensations.push("remove container", || {
            log.borrow_mut().push("container");
            Err("daemon unreachable".to_owned())
        });
        compensations.push("untrack", || {
            log.borrow_mut().push("untrack");
            Ok(())
        });

        compensations.rollback();
        assert_eq!(*log.borrow(), vec!["untrack", "container", "worktree"]);
    }

    #[test]
    fn commit_discards_steps() {
        let ran = RefCell::new(false);
        let mut compensations = Compensations::new();
        compensations.push("remove worktree", || {
            *ran.borrow_mut() = true;
            Ok(())
        });
        compensations.commit();
        assert!(!*ran.borrow());
    }
}
