//! Failure taxonomy for lifecycle handlers.
//!
//! [`ReconcileError`] is the primary failure of a handler invocation.
//! [`HandlerError`] pairs it with the optional outcome of a compensating call,
//! so a failed compensation is reported next to the failure that triggered it
//! without ever replacing it.

use crate::command::ValidationError;
use crate::gateway::GatewayError;
use crate::session::SessionStatus;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Gateway operation a failure refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    /// begin-session
    Begin,
    /// extend-session
    Extend,
    /// end-session
    End,
}

impl GatewayOperation {
    /// Lowercase name, used in messages and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Extend => "extend",
            Self::End => "end",
        }
    }
}

impl fmt::Display for GatewayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an end-session call did not leave the session stopped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StopFailure {
    /// The call returned, but with a status other than `STOPPED`
    #[error("end-session returned status {0}")]
    UnexpectedStatus(SessionStatus),

    /// The call itself failed
    #[error("end-session call failed: {0}")]
    Gateway(#[source] GatewayError),
}

/// Primary failure of a handler invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Event content or recorded state does not allow the transition
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The event references a session that was never started
    #[error("Parking with ID {0} does not exist")]
    NotFound(String),

    /// Reading the current record failed before any side effect happened
    #[error("Failed to look up parking {parking_id}: {source}")]
    Lookup {
        /// Parking the event refers to
        parking_id: String,
        /// Store failure
        #[source]
        source: StoreError,
    },

    /// The gateway call failed
    #[error("Failed to {operation} parking {parking_id}: {source}")]
    Gateway {
        /// Parking the event refers to
        parking_id: String,
        /// Operation that failed
        operation: GatewayOperation,
        /// Gateway failure
        #[source]
        source: GatewayError,
    },

    /// The gateway answered but refused the transition
    #[error(
        "Parking with ID {parking_id} and external ID {external_id} failed to {operation}. Actual status: {status}"
    )]
    Declined {
        /// Parking the event refers to
        parking_id: String,
        /// External id returned by the gateway
        external_id: String,
        /// Operation that was declined
        operation: GatewayOperation,
        /// Status returned by the gateway
        status: SessionStatus,
    },

    /// Writing the record failed after the gateway call succeeded
    #[error("Failed to persist parking {parking_id}: {source}")]
    Persist {
        /// Parking the event refers to
        parking_id: String,
        /// Store failure
        #[source]
        source: StoreError,
    },

    /// Ending the session failed; the record has been marked `FAILED`
    #[error("Parking with ID {parking_id} and external ID {external_id} failed to stop: {reason}")]
    StopFailed {
        /// Parking the event refers to
        parking_id: String,
        /// External id of the session
        external_id: String,
        /// What went wrong
        #[source]
        reason: StopFailure,
    },
}

impl ReconcileError {
    /// Whether redelivering the event might succeed.
    ///
    /// Only failures that happened before any state change and whose cause may be
    /// transient qualify: a gateway service fault, or a failed record lookup.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway { source, .. } => source.is_retryable(),
            Self::Lookup { .. } => true,
            Self::Invalid(_)
            | Self::NotFound(_)
            | Self::Declined { .. }
            | Self::Persist { .. }
            | Self::StopFailed { .. } => false,
        }
    }

    /// Short machine-readable class, used as a metric label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Lookup { .. } => "lookup",
            Self::Gateway {
                source: GatewayError::ClientFault { .. },
                ..
            } => "client_fault",
            Self::Gateway { .. } => "service_fault",
            Self::Declined { .. } => "declined",
            Self::Persist { .. } => "persist",
            Self::StopFailed { .. } => "stop_failed",
        }
    }
}

/// How a compensating end-session call went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationOutcome {
    /// External system reported the session `STOPPED`
    Confirmed,
    /// External system answered with another status
    Unconfirmed(SessionStatus),
    /// The compensating call failed
    Failed(GatewayError),
}

impl CompensationOutcome {
    /// Short label, used as a metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Unconfirmed(_) => "unconfirmed",
            Self::Failed(_) => "failed",
        }
    }
}

/// Record of a compensating call issued after a failed local write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compensation {
    /// External session the compensation tried to end
    pub external_id: String,
    /// What happened
    pub outcome: CompensationOutcome,
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            CompensationOutcome::Confirmed => {
                write!(f, "external session {} stopped", self.external_id)
            },
            CompensationOutcome::Unconfirmed(status) => write!(
                f,
                "external session {} reported {status} after stop",
                self.external_id
            ),
            CompensationOutcome::Failed(error) => write!(
                f,
                "failed to stop external session {}: {error}",
                self.external_id
            ),
        }
    }
}

/// Error returned by handlers and the router: a primary failure plus, when a
/// compensation was attempted, its outcome as secondary information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    primary: ReconcileError,
    compensation: Option<Compensation>,
}

impl HandlerError {
    /// Failure without compensation.
    #[must_use]
    pub const fn new(primary: ReconcileError) -> Self {
        Self {
            primary,
            compensation: None,
        }
    }

    /// Failure after which a compensating call was made.
    #[must_use]
    pub const fn with_compensation(primary: ReconcileError, compensation: Compensation) -> Self {
        Self {
            primary,
            compensation: Some(compensation),
        }
    }

    /// The failure that caused the handler to fail.
    #[must_use]
    pub const fn primary(&self) -> &ReconcileError {
        &self.primary
    }

    /// The compensation attempted because of the primary failure, if any.
    #[must_use]
    pub const fn compensation(&self) -> Option<&Compensation> {
        self.compensation.as_ref()
    }

    /// The compensating call's own failure, if it failed.
    #[must_use]
    pub const fn secondary(&self) -> Option<&GatewayError> {
        match &self.compensation {
            Some(Compensation {
                outcome: CompensationOutcome::Failed(error),
                ..
            }) => Some(error),
            _ => None,
        }
    }

    /// Whether redelivering the event might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.primary.is_retryable()
    }

    /// Drop the secondary information.
    #[must_use]
    pub fn into_primary(self) -> ReconcileError {
        self.primary
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if let Some(compensation) = &self.compensation {
            write!(f, " (compensation: {compensation})")?;
        }
        Ok(())
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.primary)
    }
}

impl From<ReconcileError> for HandlerError {
    fn from(primary: ReconcileError) -> Self {
        Self::new(primary)
    }
}

impl From<ValidationError> for HandlerError {
    fn from(error: ValidationError) -> Self {
        Self::new(ReconcileError::Invalid(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ServiceFault;
    use std::error::Error as _;

    fn persist_failure() -> ReconcileError {
        ReconcileError::Persist {
            parking_id: "P1".to_string(),
            source: StoreError::Conflict("P1".to_string()),
        }
    }

    #[test]
    fn display_leads_with_primary_failure() {
        let error = HandlerError::with_compensation(
            persist_failure(),
            Compensation {
                external_id: "E1".to_string(),
                outcome: CompensationOutcome::Failed(ServiceFault::Timeout.into()),
            },
        );

        let message = error.to_string();

        assert!(message.starts_with("Failed to persist parking P1"));
        assert!(message.contains("failed to stop external session E1"));
        assert_eq!(error.primary(), &persist_failure());
        assert_eq!(
            error.secondary(),
            Some(&GatewayError::ServiceFault(ServiceFault::Timeout))
        );
    }

    #[test]
    fn source_chain_reaches_store_error() {
        let error = HandlerError::new(persist_failure());

        let primary = error.source().map(ToString::to_string);
        let root = error
            .source()
            .and_then(|primary| primary.source())
            .map(ToString::to_string);

        assert_eq!(
            primary.as_deref(),
            Some("Failed to persist parking P1: Parking session P1 already exists")
        );
        assert_eq!(root.as_deref(), Some("Parking session P1 already exists"));
    }

    #[test]
    fn confirmed_compensation_has_no_secondary_error() {
        let error = HandlerError::with_compensation(
            persist_failure(),
            Compensation {
                external_id: "E1".to_string(),
                outcome: CompensationOutcome::Confirmed,
            },
        );

        assert!(error.secondary().is_none());
        assert!(error.compensation().is_some());
        assert!(!error.is_retryable());
    }

    #[test]
    fn retryability_follows_failure_class() {
        let service = ReconcileError::Gateway {
            parking_id: "P1".to_string(),
            operation: GatewayOperation::Begin,
            source: ServiceFault::Unreachable("refused".to_string()).into(),
        };
        let client = ReconcileError::Gateway {
            parking_id: "P1".to_string(),
            operation: GatewayOperation::Begin,
            source: GatewayError::ClientFault {
                status: 422,
                message: String::new(),
            },
        };

        assert!(service.is_retryable());
        assert_eq!(service.kind(), "service_fault");
        assert!(!client.is_retryable());
        assert_eq!(client.kind(), "client_fault");
        assert!(!ReconcileError::NotFound("P1".to_string()).is_retryable());
    }
}
