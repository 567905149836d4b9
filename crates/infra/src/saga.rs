//! In-process sagas: ordered steps with compensating actions.
//!
//! A reconciliation touches several aggregates, each committed on its own.
//! Every step that changed something registers how to undo it; when a later
//! step fails, the registered compensations run newest first and the
//! original error is returned. A compensation that fails is logged and the
//! remaining ones still run.

type Compensation<'a, E> = Box<dyn FnOnce() -> Result<(), E> + 'a>;

pub struct Saga<'a, E> {
    name: &'static str,
    reference: String,
    compensations: Vec<(&'static str, Compensation<'a, E>)>,
}

impl<E> core::fmt::Debug for Saga<'_, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Saga")
            .field("name", &self.name)
            .field("reference", &self.reference)
            .field("pending_compensations", &self.compensations.len())
            .finish()
    }
}

impl<'a, E> Saga<'a, E>
where
    E: core::fmt::Display,
{
    pub fn new(name: &'static str, reference: impl Into<String>) -> Self {
        Self {
            name,
            reference: reference.into(),
            compensations: Vec::new(),
        }
    }

    /// Run `body`; on error, unwind every registered compensation.
    pub fn run<T>(mut self, body: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        match body(&mut self) {
            Ok(value) => {
                tracing::debug!(saga = self.name, reference = %self.reference, "saga completed");
                Ok(value)
            }
            Err(err) => {
                self.unwind(&err);
                Err(err)
            }
        }
    }

    /// Register the undo of a step that has just succeeded.
    pub fn compensate_with(&mut self, label: &'static str, action: impl FnOnce() -> Result<(), E> + 'a) {
        self.compensations.push((label, Box::new(action)));
    }

    pub fn pending_compensations(&self) -> usize {
        self.compensations.len()
    }

    fn unwind(&mut self, cause: &E) {
        tracing::warn!(
            saga = self.name,
            reference = %self.reference,
            steps = self.compensations.len(),
            "saga failed, compensating: {cause}"
        );

        while let Some((label, action)) = self.compensations.pop() {
            if let Err(err) = action() {
                tracing::error!(
                    saga = self.name,
                    reference = %self.reference,
                    step = label,
                    "compensation failed, manual reconciliation required: {err}"
                );
            }
        }
    }
}
