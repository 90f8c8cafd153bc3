//! Submission state of a single form.
//!
//! `Idle -> Loading -> Success | Error`. A form that is `Loading` rejects a
//! second submission; a finished form can be submitted again, which clears
//! the previous error. Nothing is retried automatically.

use std::future::Future;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum FormState {
    #[default]
    Idle,
    Loading,
    Success,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("form is already submitting")]
    AlreadySubmitting,
    #[error("form is not submitting")]
    NotSubmitting,
}

#[derive(Debug, Clone, Default)]
pub struct FormMachine {
    state: FormState,
}

impl FormMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Controls are disabled while loading.
    pub fn is_loading(&self) -> bool {
        self.state == FormState::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            FormState::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn begin(&mut self) -> Result<(), TransitionError> {
        if self.is_loading() {
            return Err(TransitionError::AlreadySubmitting);
        }
        self.state = FormState::Loading;
        Ok(())
    }

    /// Settle a submission. Error values become the user-visible message.
    pub fn finish<T, E: ToString>(&mut self, outcome: &Result<T, E>) -> Result<(), TransitionError> {
        if !self.is_loading() {
            return Err(TransitionError::NotSubmitting);
        }
        self.state = match outcome {
            Ok(_) => FormState::Success,
            Err(e) => FormState::Error(e.to_string()),
        };
        Ok(())
    }

    /// `begin`, await the operation, `finish`. The operation's result is
    /// handed back unchanged.
    pub async fn run<T, E, Fut>(&mut self, operation: Fut) -> Result<Result<T, E>, TransitionError>
    where
        E: ToString,
        Fut: Future<Output = Result<T, E>>,
    {
        self.begin()?;
        let outcome = operation.await;
        self.finish(&outcome)?;
        Ok(outcome)
    }
}
