use crate::binding::build_transaction;
use crate::error::{CoordinationError, FailureReason};
use crate::scenario::{CoordinationResult, ScenarioSpec};
use coord_agents::{
    AgentRegistry, CoordinationSession, CritiqueDecision, LedgerReceipt, Message, MessageContent,
    MessageKind, NegotiationRound, Proposal, Recipients, ReasoningAgent, SessionState, Verdict,
};
use coord_ledger::Ledger;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Tuning knobs for the negotiation protocol. Mirrors
/// [`coord_ledger::LedgerConfig`] in spirit: one small `Copy` struct with a
/// sane `Default`.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Wall-clock budget for an entire `coordinate` call, INITIATE through
    /// EXECUTE.
    pub timeout: Duration,
    /// Upper bound on EVALUATE/REFINE rounds before a session fails with
    /// `NO_AGREEMENT`.
    pub max_rounds: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_rounds: 3,
        }
    }
}

/// Outcome of a single protocol step: either it produced a value, it failed
/// for a reason that belongs in `failure_reason`, or the session's overall
/// deadline was crossed while waiting on it.
enum StepError {
    Failure(FailureReason),
    Timeout,
}

impl From<FailureReason> for StepError {
    fn from(reason: FailureReason) -> Self {
        StepError::Failure(reason)
    }
}

/// Drives the eight-step coordination protocol (spec.md §4.5) over a pool of
/// [`ReasoningAgent`]s, and executes the agreed proposal against the ledger.
/// A single engine can run any number of sessions; each `coordinate` call
/// owns its session exclusively until it reaches a terminal state, at which
/// point it is filed for lookup by [`CoordinationEngine::get_session`].
pub struct CoordinationEngine {
    registry: Arc<AgentRegistry>,
    ledger: Arc<Ledger>,
    config: EngineConfig,
    sessions: RwLock<HashMap<String, CoordinationSession>>,
    next_session_id: AtomicU64,
}

impl CoordinationEngine {
    pub fn new(registry: Arc<AgentRegistry>, ledger: Arc<Ledger>, config: EngineConfig) -> Self {
        Self {
            registry,
            ledger,
            config,
            sessions: RwLock::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Run one coordination from `INITIATE` to a terminal state and return
    /// it. Never returns an `Err` — a failed or timed-out negotiation is a
    /// completed `CoordinationResult` whose session carries `Failed` or
    /// `Timeout` plus a `failure_reason`, not an exception (spec.md §7).
    #[instrument(skip(self, spec), fields(initiator = %spec.initiator))]
    pub async fn coordinate(&self, spec: ScenarioSpec) -> CoordinationResult {
        let session_id = format!("session-{}", self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let mut session = CoordinationSession::new(
            session_id,
            spec.initiator,
            spec.participants,
            spec.intent,
            spec.context,
        );

        let deadline = Instant::now() + self.config.timeout;
        self.run_session(&mut session, deadline).await;

        session.ended_at = Some(chrono::Utc::now());
        info!(session_id = %session.session_id, state = ?session.state, "coordination finished");

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.clone(), session.clone());
        drop(sessions);

        CoordinationResult { session }
    }

    /// Look up a finished session by id. Only ever populated once a
    /// coordination reaches a terminal state — see the module docs on
    /// `CoordinationSession`.
    pub async fn get_session(&self, session_id: &str) -> Result<CoordinationSession, CoordinationError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| CoordinationError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    pub async fn list_sessions(&self) -> Vec<CoordinationSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, CoordinationError> {
        self.get_session(session_id).await.map(|s| s.messages)
    }

    /// Walks the session through every step, stopping at the first
    /// `StepError` and converting it into the session's terminal state.
    /// Each step only ever moves `session.state` forward; nothing here
    /// rewinds it.
    async fn run_session(&self, session: &mut CoordinationSession, deadline: Instant) {
        if let Err(e) = self.initiate(session).await {
            self.land(session, e);
            return;
        }

        self.broadcast(session);

        if deadline_passed(deadline) {
            self.land(session, StepError::Timeout);
            return;
        }

        session.state = SessionState::CollectingConstraints;
        self.collect_constraints(session, deadline).await;

        if deadline_passed(deadline) {
            self.land(session, StepError::Timeout);
            return;
        }

        session.state = SessionState::GeneratingProposal;
        let proposal = match self.generate_initial_proposal(session, deadline).await {
            Ok(p) => p,
            Err(e) => {
                self.land(session, e);
                return;
            }
        };

        session.state = SessionState::Negotiating;
        let agreement = match self.negotiate(session, proposal, deadline).await {
            Ok(p) => p,
            Err(e) => {
                self.land(session, e);
                return;
            }
        };

        if deadline_passed(deadline) {
            self.land(session, StepError::Timeout);
            return;
        }

        session.state = SessionState::Validating;
        let tx = build_transaction(session, &agreement);
        let dry_run = self.ledger.dry_run_validate(&tx);
        if !dry_run.valid {
            let sub_reason = dry_run
                .first_sub_reason()
                .unwrap_or(coord_ledger::PolicySubReason::BudgetExceeded);
            self.land(
                session,
                StepError::Failure(FailureReason::PolicyViolation {
                    sub_reason,
                    detail: dry_run.overall_reason,
                }),
            );
            return;
        }

        if deadline_passed(deadline) {
            self.land(session, StepError::Timeout);
            return;
        }

        session.state = SessionState::Executing;
        if let Err(e) = self.execute(session, &agreement, tx).await {
            self.land(session, e);
            return;
        }

        session.state = SessionState::Completed;
    }

    /// Step 1: INITIATE. Validates the scenario shape and that the
    /// initiator is a registered agent.
    async fn initiate(&self, session: &CoordinationSession) -> Result<(), StepError> {
        if session.participants.is_empty() {
            return Err(FailureReason::InvalidScenario {
                detail: "participants list is empty".to_string(),
            }
            .into());
        }
        if !session.participants.contains(&session.initiator) {
            return Err(FailureReason::InvalidScenario {
                detail: format!("initiator {} is not among the participants", session.initiator),
            }
            .into());
        }
        self.registry
            .get(&session.initiator)
            .await
            .map_err(|_| FailureReason::UnknownAgent {
                id: session.initiator.clone(),
            })?;
        Ok(())
    }

    /// Step 2: BROADCAST. Announces the intent to every participant. This
    /// is a pure log-append; nothing here can fail or block.
    fn broadcast(&self, session: &mut CoordinationSession) {
        session.messages.push(Message::new(
            session.session_id.clone(),
            session.initiator.clone(),
            Recipients::AllExcept(session.initiator.clone()),
            MessageKind::Intent,
            MessageContent::Intent {
                intent: session.intent.clone(),
                context: session.context.clone(),
            },
        ));
        session.messages.push(Message::new(
            session.session_id.clone(),
            "engine",
            Recipients::Ids(session.participants.clone()),
            MessageKind::Inform,
            MessageContent::Inform {
                announcement: format!("negotiation '{}' has begun", session.intent),
                status: None,
                agreement: None,
            },
        ));
    }

    /// Step 3: COLLECT CONSTRAINTS. Queries every non-initiator participant
    /// in registration order, concurrently, each bounded by whichever is
    /// smaller of the time left to the session deadline and half the
    /// configured session timeout (spec.md §4.5 step 3's `timeout/2`
    /// carve-out — a participant that does not respond within that
    /// sub-budget contributes no constraint even if the overall session
    /// deadline has not yet passed). A participant that is unregistered,
    /// errors, or does not answer in time contributes no constraint and the
    /// session proceeds without it; constraint collection never fails the
    /// session by itself. Messages are appended `QUERY`, `CONSTRAINT`,
    /// `QUERY`, `CONSTRAINT`, … one pair per agent in registration order,
    /// even though the underlying calls race concurrently.
    async fn collect_constraints(&self, session: &mut CoordinationSession, deadline: Instant) {
        let agents = self.ordered_non_initiators(session).await;

        let context = session.context.clone();
        let per_call_budget = self.config.timeout / 2;
        let calls = agents.iter().map(|agent| {
            let agent = Arc::clone(agent);
            let context = context.clone();
            let budget = remaining_time(deadline).min(per_call_budget);
            async move { tokio::time::timeout(budget, agent.propose_constraint(&context)).await }
        });
        let results = futures::future::join_all(calls).await;

        for (agent, result) in agents.iter().zip(results) {
            session.messages.push(Message::new(
                session.session_id.clone(),
                "engine",
                Recipients::Ids(vec![agent.id().to_string()]),
                MessageKind::Query,
                MessageContent::Query {
                    query: "declare your constraints for this intent".to_string(),
                    about: session.intent.clone(),
                },
            ));

            match result {
                Ok(Ok(record)) => {
                    session.messages.push(Message::new(
                        session.session_id.clone(),
                        agent.id().to_string(),
                        Recipients::Ids(vec![session.initiator.clone()]),
                        MessageKind::Constraint,
                        MessageContent::Constraint {
                            r#type: "limits".to_string(),
                            constraints: record.limits.clone(),
                        },
                    ));
                    session.constraints.insert(agent.id().to_string(), record);
                }
                Ok(Err(e)) => {
                    warn!(agent = agent.id(), error = %e, "agent unavailable during constraint collection, proceeding without it");
                }
                Err(_) => {
                    warn!(agent = agent.id(), "agent did not respond to constraint query in time, proceeding without it");
                }
            }
        }
    }

    /// Step 4: GENERATE PROPOSAL. Only ever invoked on the initiator;
    /// unlike non-initiators in step 3, the initiator not responding is
    /// fatal to the session.
    async fn generate_initial_proposal(
        &self,
        session: &mut CoordinationSession,
        deadline: Instant,
    ) -> Result<Proposal, StepError> {
        let proposal = self
            .call_initiator_generate(session, &session.context.clone(), deadline)
            .await?;

        session.messages.push(Message::new(
            session.session_id.clone(),
            session.initiator.clone(),
            Recipients::AllExcept(session.initiator.clone()),
            MessageKind::Proposal,
            MessageContent::Proposal(proposal.clone()),
        ));

        Ok(proposal)
    }

    /// Steps 5/6: EVALUATE and REFINE, looped until every non-initiator
    /// accepts, `max_rounds` is exhausted (`NO_AGREEMENT`), or the deadline
    /// is crossed. At most `max_rounds` `NegotiationRound` entries are ever
    /// appended to the session.
    async fn negotiate(
        &self,
        session: &mut CoordinationSession,
        mut proposal: Proposal,
        deadline: Instant,
    ) -> Result<Proposal, StepError> {
        let agents = self.ordered_non_initiators(session).await;
        let mut round_number: u32 = 1;

        loop {
            if deadline_passed(deadline) {
                return Err(StepError::Timeout);
            }

            let round_started = Instant::now();

            if round_number > 1 {
                session.messages.push(Message::new(
                    session.session_id.clone(),
                    session.initiator.clone(),
                    Recipients::AllExcept(session.initiator.clone()),
                    MessageKind::Proposal,
                    MessageContent::Proposal(proposal.clone()),
                ));
            }

            let critiques = self.collect_critiques(session, &agents, &proposal, deadline).await;

            session.rounds.push(NegotiationRound {
                round_number,
                proposal: proposal.clone(),
                critiques: critiques.clone(),
                duration_ms: round_started.elapsed().as_millis() as u64,
            });

            if deadline_passed(deadline) {
                return Err(StepError::Timeout);
            }

            if critiques.iter().all(|c| c.verdict == Verdict::Accept) {
                return Ok(proposal);
            }

            if round_number >= self.config.max_rounds {
                return Err(FailureReason::NoAgreement {
                    rounds_attempted: round_number,
                }
                .into());
            }

            let negotiation_context = negotiation_context(&session.context, &proposal, &critiques);
            proposal = self
                .call_initiator_generate(session, &negotiation_context, deadline)
                .await?;
            round_number += 1;
        }
    }

    /// Queries every non-initiator for a verdict on `proposal`, concurrently
    /// and in registration order. A non-initiator that errors or times out
    /// contributes no critique — it neither blocks acceptance nor silently
    /// counts as one.
    async fn collect_critiques(
        &self,
        session: &mut CoordinationSession,
        agents: &[Arc<dyn ReasoningAgent>],
        proposal: &Proposal,
        deadline: Instant,
    ) -> Vec<CritiqueDecision> {
        let calls = agents.iter().map(|agent| {
            let agent = Arc::clone(agent);
            let proposal = proposal.clone();
            let context = session.context.clone();
            let remaining = remaining_time(deadline);
            async move { tokio::time::timeout(remaining, agent.critique(&proposal, &context)).await }
        });
        let results = futures::future::join_all(calls).await;

        let mut critiques = Vec::with_capacity(agents.len());
        for (agent, result) in agents.iter().zip(results) {
            match result {
                Ok(Ok(decision)) => {
                    let kind = match decision.verdict {
                        Verdict::Accept => MessageKind::Accept,
                        Verdict::Critique => MessageKind::Critique,
                    };
                    session.messages.push(Message::new(
                        session.session_id.clone(),
                        agent.id().to_string(),
                        Recipients::Ids(vec![session.initiator.clone()]),
                        kind,
                        MessageContent::from(&decision),
                    ));
                    critiques.push(decision);
                }
                Ok(Err(e)) => {
                    warn!(agent = agent.id(), error = %e, "agent unavailable during critique, excluded from this round");
                }
                Err(_) => {
                    warn!(agent = agent.id(), "agent did not critique in time, excluded from this round");
                }
            }
        }
        critiques
    }

    /// Step 7 (part): EXECUTE. Submits the transaction already validated
    /// dry-run in step 6, commits it immediately, and records the ledger
    /// receipt. A submit that is rejected at this point (e.g. a duplicate
    /// transaction id from a retried session) or a commit that fails its
    /// own mining invariant surfaces as `LEDGER_REJECTED`.
    async fn execute(
        &self,
        session: &mut CoordinationSession,
        agreement: &Proposal,
        tx: coord_ledger::Transaction,
    ) -> Result<(), StepError> {
        let transaction_id = tx.transaction_id.clone();
        let submitted = self.ledger.submit(tx).await;
        if !submitted.valid {
            return Err(FailureReason::LedgerRejected {
                detail: submitted.overall_reason,
            }
            .into());
        }

        let block = self.ledger.commit_auto().await.map_err(|e| FailureReason::LedgerRejected {
            detail: e.to_string(),
        })?;
        let block = block.ok_or_else(|| FailureReason::LedgerRejected {
            detail: "commit produced no block for a non-empty pending pool".to_string(),
        })?;

        session.final_proposal = Some(agreement.clone());
        session.agreement = Some(agreement.clone());
        session.ledger_receipt = Some(LedgerReceipt {
            block_index: block.index,
            block_hash: block.hash.clone(),
            transaction_id,
        });
        session.messages.push(Message::new(
            session.session_id.clone(),
            "engine",
            Recipients::Ids(session.participants.clone()),
            MessageKind::Inform,
            MessageContent::Inform {
                announcement: "agreement executed against the ledger".to_string(),
                status: Some("COMPLETED".to_string()),
                agreement: Some(agreement.clone()),
            },
        ));
        Ok(())
    }

    /// Looks up the initiator and calls `generate_proposal` with whatever
    /// time remains to the session deadline. Shared by the first-round call
    /// in step 4 and every REFINE call in step 6.
    async fn call_initiator_generate(
        &self,
        session: &CoordinationSession,
        context: &Value,
        deadline: Instant,
    ) -> Result<Proposal, StepError> {
        let agent = self
            .registry
            .get(&session.initiator)
            .await
            .map_err(|_| FailureReason::UnknownAgent {
                id: session.initiator.clone(),
            })?;
        let remaining = remaining_time(deadline);
        match tokio::time::timeout(remaining, agent.generate_proposal(context, &session.constraints)).await {
            Ok(Ok(proposal)) => Ok(proposal),
            Ok(Err(e)) => Err(FailureReason::AgentUnavailable {
                id: session.initiator.clone(),
                detail: e.to_string(),
            }
            .into()),
            Err(_) => Err(StepError::Timeout),
        }
    }

    /// Non-initiator participants present in the registry, in registration
    /// order, restricted to this session's participant list.
    async fn ordered_non_initiators(&self, session: &CoordinationSession) -> Vec<Arc<dyn ReasoningAgent>> {
        let non_initiators = session.non_initiators();
        self.registry
            .list()
            .await
            .into_iter()
            .filter(|a| non_initiators.iter().any(|id| id == a.id()))
            .collect()
    }

    fn land(&self, session: &mut CoordinationSession, error: StepError) {
        match error {
            StepError::Timeout => {
                session.state = SessionState::Timeout;
                session.failure_reason = Some(FailureReason::DeadlineExceeded.code().to_string());
            }
            StepError::Failure(reason) => {
                session.state = SessionState::Failed;
                session.failure_reason = Some(reason.code().to_string());
            }
        }
    }
}

fn remaining_time(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn deadline_passed(deadline: Instant) -> bool {
    Instant::now() >= deadline
}

/// Injects a `"negotiation"` key carrying the previous proposal and the
/// aggregated critiques into a copy of the scenario context, so a REFINE
/// call can see what changed without the `generate_proposal` trait method
/// itself needing a critique-history parameter.
fn negotiation_context(context: &Value, previous: &Proposal, critiques: &[CritiqueDecision]) -> Value {
    let mut out = context.clone();
    let critiques_json: Vec<Value> = critiques
        .iter()
        .map(|c| {
            json!({
                "agent": c.agent,
                "reasoning": c.reasoning,
                "confidence": c.confidence,
                "suggested_adjustments": c.suggested_adjustments,
            })
        })
        .collect();
    let negotiation = json!({
        "previous_proposal": previous,
        "critiques": critiques_json,
    });

    if let Some(obj) = out.as_object_mut() {
        obj.insert("negotiation".to_string(), negotiation);
    }
    out
}
