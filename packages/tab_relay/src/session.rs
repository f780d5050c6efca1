//! Per-connection role state.
//!
//! A session starts `Unset` and is bound to an account either as an input
//! (browser tab side) or as an output (controller side). There is no way back
//! to `Unset`; the session dies with its connection.

use crate::error::RelayError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionRole {
    #[default]
    Unset,
    Input {
        account: String,
    },
    Output {
        account: String,
    },
}

#[derive(Debug)]
pub struct Session {
    pub connection_id: String,
    role: SessionRole,
}

impl Session {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            role: SessionRole::Unset,
        }
    }

    pub fn role(&self) -> &SessionRole {
        &self.role
    }

    /// Account bound as input, if any.
    pub fn input_account(&self) -> Option<&str> {
        match &self.role {
            SessionRole::Input { account } => Some(account),
            _ => None,
        }
    }

    /// Account bound as output, if any.
    pub fn output_account(&self) -> Option<&str> {
        match &self.role {
            SessionRole::Output { account } => Some(account),
            _ => None,
        }
    }

    /// Bind as input. Returns the previous role.
    pub fn bind_input(&mut self, account: &str) -> Result<SessionRole, RelayError> {
        let account = validate_account(account)?;
        Ok(std::mem::replace(&mut self.role, SessionRole::Input { account }))
    }

    /// Bind (or re-bind) as output. Returns the previous role.
    pub fn bind_output(&mut self, account: &str) -> Result<SessionRole, RelayError> {
        let account = validate_account(account)?;
        Ok(std::mem::replace(&mut self.role, SessionRole::Output { account }))
    }
}

fn validate_account(account: &str) -> Result<String, RelayError> {
    if account.is_empty() {
        return Err(RelayError::InvalidAccount);
    }
    Ok(account.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_unset() {
        let session = Session::new("c1");
        assert_eq!(session.role(), &SessionRole::Unset);
        assert!(session.input_account().is_none());
        assert!(session.output_account().is_none());
    }

    #[test]
    fn test_bind_input() {
        let mut session = Session::new("c1");
        let prev = session.bind_input("u1").unwrap();
        assert_eq!(prev, SessionRole::Unset);
        assert_eq!(session.input_account(), Some("u1"));
        assert!(session.output_account().is_none());
    }

    #[test]
    fn test_rebind_output_replaces_account() {
        let mut session = Session::new("c1");
        session.bind_output("u1").unwrap();
        let prev = session.bind_output("u2").unwrap();
        assert_eq!(
            prev,
            SessionRole::Output {
                account: "u1".into()
            }
        );
        assert_eq!(session.output_account(), Some("u2"));
    }

    #[test]
    fn test_empty_account_rejected_and_role_kept() {
        let mut session = Session::new("c1");
        session.bind_input("u1").unwrap();
        assert_eq!(session.bind_output(""), Err(RelayError::InvalidAccount));
        assert_eq!(session.input_account(), Some("u1"));
    }
}
