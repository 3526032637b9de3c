use chrono::{DateTime, Utc};
use parksync_core::{
    BeginSession, GatewayFuture, GatewayResponse, GatewayResult, LifecycleGateway, ServiceFault,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A call received by [`ScriptedGateway`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    /// begin-session
    Begin(BeginSession),
    /// extend-session
    Extend {
        /// Session extended
        external_id: String,
        /// Requested end
        new_end_time: DateTime<Utc>,
    },
    /// end-session
    End {
        /// Session ended
        external_id: String,
        /// Reported end
        actual_end_time: DateTime<Utc>,
    },
}

#[derive(Debug, Default)]
struct Script {
    begin: VecDeque<GatewayResult<GatewayResponse>>,
    extend: VecDeque<GatewayResult<GatewayResponse>>,
    end: VecDeque<GatewayResult<GatewayResponse>>,
    calls: Vec<GatewayCall>,
}

/// Gateway double with queued responses per operation.
///
/// Each call pops the next response queued for its operation and is recorded.
/// An operation with nothing queued fails with [`ServiceFault::Unexpected`], so
/// an unplanned call surfaces as a test failure rather than a silent success.
///
/// # Example
///
/// ```
/// use parksync_testing::ScriptedGateway;
/// use parksync_core::{GatewayResponse, SessionStatus};
///
/// let gateway = ScriptedGateway::new();
/// gateway.on_end(Ok(GatewayResponse::new("E1", SessionStatus::Stopped)));
/// assert!(gateway.calls().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGateway {
    /// Create a gateway with nothing queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the next begin-session response
    pub fn on_begin(&self, response: GatewayResult<GatewayResponse>) -> &Self {
        self.lock().begin.push_back(response);
        self
    }

    /// Queue the next extend-session response
    pub fn on_extend(&self, response: GatewayResult<GatewayResponse>) -> &Self {
        self.lock().extend.push_back(response);
        self
    }

    /// Queue the next end-session response
    pub fn on_end(&self, response: GatewayResult<GatewayResponse>) -> &Self {
        self.lock().end.push_back(response);
        self
    }

    /// Every call received so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Number of calls received so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Only the end-session calls received so far
    #[must_use]
    pub fn end_calls(&self) -> Vec<GatewayCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, GatewayCall::End { .. }))
            .cloned()
            .collect()
    }

    fn answer(
        &self,
        call: GatewayCall,
        pick: fn(&mut Script) -> &mut VecDeque<GatewayResult<GatewayResponse>>,
    ) -> GatewayFuture<'_> {
        let result = {
            let mut script = self.lock();
            let name = match &call {
                GatewayCall::Begin(_) => "begin",
                GatewayCall::Extend { .. } => "extend",
                GatewayCall::End { .. } => "end",
            };
            script.calls.push(call);
            pick(&mut script).pop_front().unwrap_or_else(|| {
                Err(ServiceFault::Unexpected(format!("no scripted {name} response")).into())
            })
        };
        Box::pin(async move { result })
    }
}

impl LifecycleGateway for ScriptedGateway {
    fn begin(&self, request: BeginSession) -> GatewayFuture<'_> {
        self.answer(GatewayCall::Begin(request), |script| &mut script.begin)
    }

    fn extend(&self, external_id: &str, new_end_time: DateTime<Utc>) -> GatewayFuture<'_> {
        self.answer(
            GatewayCall::Extend {
                external_id: external_id.to_string(),
                new_end_time,
            },
            |script| &mut script.extend,
        )
    }

    fn end(&self, external_id: &str, actual_end_time: DateTime<Utc>) -> GatewayFuture<'_> {
        self.answer(
            GatewayCall::End {
                external_id: external_id.to_string(),
                actual_end_time,
            },
            |script| &mut script.end,
        )
    }
}
