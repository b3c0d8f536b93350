//! Command validation: rejected before a module record is ever written,
//! per spec.md §6 ("the validator rejects unknown or malformed arguments
//! before a module is created") and §7's `Validation` error kind.
//!
//! The package-specific argument schema itself is an external
//! collaborator (spec.md §1); what belongs in the core is the shape
//! check every command must pass regardless of package: non-empty
//! identifiers and argument names, since [`vizier_core::Argument`]'s
//! tagged-enum representation already rejects unknown argument kinds at
//! deserialization time (spec.md §9).

use vizier_core::{Argument, Command};

use crate::error::EngineError;

pub fn validate_command(command: &Command) -> Result<(), EngineError> {
    if command.package_id.trim().is_empty() {
        return Err(EngineError::Validation("command package_id must not be empty".into()));
    }
    if command.command_id.trim().is_empty() {
        return Err(EngineError::Validation("command command_id must not be empty".into()));
    }
    for argument in &command.arguments {
        validate_argument(argument)?;
    }
    Ok(())
}

fn validate_argument(argument: &Argument) -> Result<(), EngineError> {
    if argument.name().trim().is_empty() {
        return Err(EngineError::Validation("argument name must not be empty".into()));
    }
    if let Argument::List { items, .. } = argument {
        for item in items {
            validate_argument(item)?;
        }
    }
    if let Argument::Record { fields, .. } = argument {
        for field in fields.values() {
            validate_argument(field)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_package_id() {
        let command = Command { package_id: "".into(), command_id: "cmd".into(), arguments: vec![] };
        assert!(validate_command(&command).is_err());
    }

    #[test]
    fn rejects_unnamed_argument() {
        let command = Command {
            package_id: "pkg".into(),
            command_id: "cmd".into(),
            arguments: vec![Argument::Scalar { name: "".into(), value: serde_json::Value::Null }],
        };
        assert!(validate_command(&command).is_err());
    }

    #[test]
    fn accepts_well_formed_command() {
        let command = Command {
            package_id: "pycell".into(),
            command_id: "python_cell".into(),
            arguments: vec![Argument::Scalar { name: "code".into(), value: serde_json::json!("print(1)") }],
        };
        assert!(validate_command(&command).is_ok());
    }
}
