//! Form schemas.
//!
//! Each form declares its fields as a static list of [`FieldRule`]s, checked
//! in declaration order, followed by any cross-field checks. `validate` is
//! pure: it either returns the typed value the rest of the application
//! consumes, or every failing field in order.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::{EmailCredentials, NewAccount};
use crate::store::{AgentUpdate, MeetingUpdate, NewAgent, NewMeeting};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{} invalid field(s)", .errors.len())]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn first_message(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text { min_len: usize },
    Email,
}

/// Declarative rule for a single string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub message: &'static str,
}

impl FieldRule {
    const fn text(name: &'static str, message: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text { min_len: 1 },
            required: true,
            message,
        }
    }

    const fn email(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Email,
            required: true,
            message: "Invalid email",
        }
    }

    fn accepts(&self, value: &str) -> bool {
        if value.is_empty() && !self.required {
            return true;
        }
        match self.kind {
            FieldKind::Text { min_len } => value.chars().count() >= min_len,
            FieldKind::Email => is_valid_email(value),
        }
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_'+\-.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$")
            .expect("email pattern is valid")
    })
}

pub fn is_valid_email(value: &str) -> bool {
    !value.starts_with('.') && !value.contains("..") && email_regex().is_match(value)
}

/// A form that validates into a typed value.
pub trait Schema {
    type Valid;

    const FIELDS: &'static [FieldRule];

    /// Raw value of a declared field.
    fn field(&self, name: &str) -> &str;

    /// Checks spanning several fields, run after the per-field rules.
    fn cross_check(&self, _errors: &mut Vec<FieldError>) {}

    fn build(&self) -> Self::Valid;

    fn validate(&self) -> Result<Self::Valid, ValidationErrors> {
        let mut errors: Vec<FieldError> = Self::FIELDS
            .iter()
            .filter(|rule| !rule.accepts(self.field(rule.name)))
            .map(|rule| FieldError::new(rule.name, rule.message))
            .collect();
        self.cross_check(&mut errors);

        if errors.is_empty() {
            Ok(self.build())
        } else {
            Err(ValidationErrors { errors })
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

impl Schema for SignInForm {
    type Valid = EmailCredentials;

    const FIELDS: &'static [FieldRule] = &[
        FieldRule::email("email"),
        FieldRule::text("password", "Password is required"),
    ];

    fn field(&self, name: &str) -> &str {
        match name {
            "email" => &self.email,
            "password" => &self.password,
            _ => "",
        }
    }

    fn build(&self) -> EmailCredentials {
        EmailCredentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignUpForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl Schema for SignUpForm {
    type Valid = NewAccount;

    const FIELDS: &'static [FieldRule] = &[
        FieldRule::text("name", "Name is required"),
        FieldRule::email("email"),
        FieldRule::text("password", "Password is required"),
        FieldRule::text("confirmPassword", "Password is required"),
    ];

    fn field(&self, name: &str) -> &str {
        match name {
            "name" => &self.name,
            "email" => &self.email,
            "password" => &self.password,
            "confirmPassword" => &self.confirm_password,
            _ => "",
        }
    }

    fn cross_check(&self, errors: &mut Vec<FieldError>) {
        if self.password != self.confirm_password {
            errors.push(FieldError::new("confirmPassword", "Passwords don't match"));
        }
    }

    fn build(&self) -> NewAccount {
        NewAccount {
            name: self.name.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentForm {
    pub name: String,
    pub instructions: String,
}

impl Schema for AgentForm {
    type Valid = NewAgent;

    const FIELDS: &'static [FieldRule] = &[
        FieldRule::text("name", "name is required"),
        FieldRule::text("instructions", "instructions is required"),
    ];

    fn field(&self, name: &str) -> &str {
        match name {
            "name" => &self.name,
            "instructions" => &self.instructions,
            _ => "",
        }
    }

    fn build(&self) -> NewAgent {
        NewAgent {
            name: self.name.clone(),
            instructions: self.instructions.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentUpdateForm {
    pub id: String,
    pub name: String,
    pub instructions: String,
}

impl Schema for AgentUpdateForm {
    type Valid = AgentUpdate;

    const FIELDS: &'static [FieldRule] = &[
        FieldRule::text("name", "name is required"),
        FieldRule::text("instructions", "instructions is required"),
        FieldRule::text("id", "Id is required"),
    ];

    fn field(&self, name: &str) -> &str {
        match name {
            "id" => &self.id,
            "name" => &self.name,
            "instructions" => &self.instructions,
            _ => "",
        }
    }

    fn build(&self) -> AgentUpdate {
        AgentUpdate {
            id: self.id.clone(),
            name: self.name.clone(),
            instructions: self.instructions.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeetingForm {
    pub name: String,
    pub agent_id: String,
}

impl Schema for MeetingForm {
    type Valid = NewMeeting;

    const FIELDS: &'static [FieldRule] = &[
        FieldRule::text("name", "Name is required"),
        FieldRule::text("agentId", "Agent is required"),
    ];

    fn field(&self, name: &str) -> &str {
        match name {
            "name" => &self.name,
            "agentId" => &self.agent_id,
            _ => "",
        }
    }

    fn build(&self) -> NewMeeting {
        NewMeeting {
            name: self.name.clone(),
            agent_id: self.agent_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeetingUpdateForm {
    pub id: String,
    pub name: String,
    pub agent_id: String,
}

impl Schema for MeetingUpdateForm {
    type Valid = MeetingUpdate;

    const FIELDS: &'static [FieldRule] = &[
        FieldRule::text("name", "Name is required"),
        FieldRule::text("agentId", "Agent is required"),
        FieldRule::text("id", "Id is required"),
    ];

    fn field(&self, name: &str) -> &str {
        match name {
            "id" => &self.id,
            "name" => &self.name,
            "agentId" => &self.agent_id,
            _ => "",
        }
    }

    fn build(&self) -> MeetingUpdate {
        MeetingUpdate {
            id: self.id.clone(),
            name: self.name.clone(),
            agent_id: self.agent_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(err: &ValidationErrors) -> Vec<(&'static str, &str)> {
        err.errors
            .iter()
            .map(|e| (e.field, e.message.as_str()))
            .collect()
    }

    #[test]
    fn test_email_predicate() {
        assert!(is_valid_email("c@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.io"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email(".lead@example.com"));
        assert!(!is_valid_email("double..dot@example.com"));
        assert!(!is_valid_email("a@example"));
    }

    #[test]
    fn test_sign_in_valid() {
        let form = SignInForm {
            email: "c@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let creds = form.validate().expect("valid");
        assert_eq!(creds.email, "c@example.com");
    }

    #[test]
    fn test_sign_in_errors_are_ordered() {
        let err = SignInForm::default().validate().unwrap_err();
        assert_eq!(
            fields(&err),
            vec![("email", "Invalid email"), ("password", "Password is required")]
        );
        assert_eq!(err.first_message(), Some("Invalid email"));
    }

    #[test]
    fn test_sign_up_password_mismatch_after_field_errors() {
        let form = SignUpForm {
            name: String::new(),
            email: "ada@example.com".to_string(),
            password: "one".to_string(),
            confirm_password: "two".to_string(),
        };
        let err = form.validate().unwrap_err();
        assert_eq!(
            fields(&err),
            vec![
                ("name", "Name is required"),
                ("confirmPassword", "Passwords don't match"),
            ]
        );
    }

    #[test]
    fn test_sign_up_valid_drops_confirmation() {
        let form = SignUpForm {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "pw".to_string(),
            confirm_password: "pw".to_string(),
        };
        let account = form.validate().unwrap();
        assert_eq!(account.name, "Ada");
        assert_eq!(account.password, "pw");
    }

    #[test]
    fn test_sign_up_deserializes_camel_case() {
        let form: SignUpForm = serde_json::from_value(serde_json::json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password": "pw",
            "confirmPassword": "pw"
        }))
        .unwrap();
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_agent_messages() {
        let err = AgentForm::default().validate().unwrap_err();
        assert_eq!(
            fields(&err),
            vec![
                ("name", "name is required"),
                ("instructions", "instructions is required"),
            ]
        );
    }

    #[test]
    fn test_agent_update_requires_id() {
        let form = AgentUpdateForm {
            id: String::new(),
            name: "Tutor".to_string(),
            instructions: "Be kind".to_string(),
        };
        let err = form.validate().unwrap_err();
        assert_eq!(fields(&err), vec![("id", "Id is required")]);
    }

    #[test]
    fn test_meeting_form_missing_agent() {
        let form: MeetingForm = serde_json::from_value(serde_json::json!({"name": "Retro"})).unwrap();
        let err = form.validate().unwrap_err();
        assert_eq!(fields(&err), vec![("agentId", "Agent is required")]);
    }

    #[test]
    fn test_meeting_update_valid() {
        let form = MeetingUpdateForm {
            id: "m1".to_string(),
            name: "Retro".to_string(),
            agent_id: "a1".to_string(),
        };
        let update = form.validate().unwrap();
        assert_eq!(update.id, "m1");
        assert_eq!(update.agent_id, "a1");
    }
}
