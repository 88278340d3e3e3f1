//! Trade proposal lifecycle and human approval gating
//!
//! Every risk-approved trade becomes a proposal that must be explicitly
//! approved by the single whitelisted human before it can reach the execution
//! connector. The state machine is strict:
//!
//! ```text
//! PENDING_APPROVAL -> EXECUTED
//! PENDING_APPROVAL -> REJECTED | EXPIRED | FAILED
//! ```
//!
//! No other transitions are legal. Executing a proposal in a terminal state
//! is a conflict, never a silent re-submit; the proposal id doubles as the
//! execution connector's idempotency key.

use crate::audit::{AuditEvent, AuditSeverity, AuditSink};
use crate::config::ApprovalConfig;
use crate::error::{GuardError, Result};
use crate::types::Side;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Proposal lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    #[serde(rename = "PENDING_APPROVAL")]
    PendingApproval,
    #[serde(rename = "EXECUTED")]
    Executed,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "EXPIRED")]
    Expired,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::PendingApproval)
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProposalStatus::PendingApproval => "PENDING_APPROVAL",
            ProposalStatus::Executed => "EXECUTED",
            ProposalStatus::Rejected => "REJECTED",
            ProposalStatus::Expired => "EXPIRED",
            ProposalStatus::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// A sized, risk-approved candidate trade awaiting explicit human approval
#[derive(Debug, Clone, Serialize)]
pub struct TradeProposal {
    pub proposal_id: String,
    pub ticker: String,
    pub side: Side,
    pub contracts: u32,
    pub max_risk: Decimal,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
}

/// Approval request handed to the notification collaborator
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub proposal_id: String,
    pub ticker: String,
    pub side: Side,
    pub contracts: u32,
    /// The single identity allowed to approve
    pub approver: String,
    /// The exact phrase the approver must send back
    pub approval_phrase: String,
    /// Full human-readable message body
    pub body: String,
}

/// Outbound notification collaborator boundary
#[async_trait]
pub trait ProposalNotifier: Send + Sync {
    async fn send_approval_request(&self, request: &ApprovalRequest) -> Result<()>;
}

/// Local development notifier that queues requests in memory
pub struct QueuedNotifier {
    outbox: RwLock<Vec<ApprovalRequest>>,
}

impl QueuedNotifier {
    pub fn new() -> Self {
        Self {
            outbox: RwLock::new(Vec::new()),
        }
    }

    pub async fn outbox(&self) -> Vec<ApprovalRequest> {
        self.outbox.read().await.clone()
    }
}

impl Default for QueuedNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProposalNotifier for QueuedNotifier {
    async fn send_approval_request(&self, request: &ApprovalRequest) -> Result<()> {
        info!(
            proposal_id = %request.proposal_id,
            approver = %request.approver,
            "Queued approval request"
        );
        self.outbox.write().await.push(request.clone());
        Ok(())
    }
}

/// Order side/type normalization for the execution collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// Validated order request; `client_order_id` is the proposal id, reused as
/// the connector's idempotency key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub ticker: String,
    pub side: Side,
    pub contracts: u32,
    pub order_type: OrderType,
    pub client_order_id: String,
}

/// Connector response for an order action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub status: String,
    pub order_id: Option<String>,
}

/// Exchange execution collaborator boundary
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionConnector: Send + Sync {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult>;
}

/// Inbound approval message envelope
#[derive(Debug, Clone)]
pub struct ApprovalMessage {
    pub from: String,
    pub body: String,
}

/// Parse an approval phrase of the form `APPROVE TRADE ID <id>`
/// (case-insensitive, whitespace-tolerant). Returns the referenced id.
fn parse_approval(body: &str) -> Option<String> {
    let mut tokens = body.split_whitespace();
    let keyword_ok = tokens.next()?.eq_ignore_ascii_case("approve")
        && tokens.next()?.eq_ignore_ascii_case("trade")
        && tokens.next()?.eq_ignore_ascii_case("id");
    if !keyword_ok {
        return None;
    }
    let id = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }
    Some(id.to_ascii_uppercase())
}

/// Shared inbox of inbound approval messages
///
/// Only messages from the single whitelisted sender can ever match; a
/// malformed body or mismatched id never approves anything.
pub struct ApprovalInbox {
    whitelisted_sender: String,
    messages: RwLock<Vec<ApprovalMessage>>,
}

impl ApprovalInbox {
    pub fn new(whitelisted_sender: impl Into<String>) -> Self {
        Self {
            whitelisted_sender: whitelisted_sender.into(),
            messages: RwLock::new(Vec::new()),
        }
    }

    /// Record an inbound message from the webhook/bridge process
    pub async fn record_incoming(&self, from: impl Into<String>, body: impl Into<String>) {
        let message = ApprovalMessage {
            from: from.into(),
            body: body.into(),
        };
        self.messages.write().await.push(message);
    }

    /// True once the whitelisted sender has approved the given proposal id
    pub async fn has_approval(&self, proposal_id: &str) -> bool {
        let expected = proposal_id.to_ascii_uppercase();
        let messages = self.messages.read().await;
        messages.iter().any(|m| {
            m.from == self.whitelisted_sender
                && parse_approval(&m.body).is_some_and(|id| id == expected)
        })
    }
}

/// Result of a bounded approval wait; timing out is not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalWait {
    Approved,
    TimedOut,
}

/// In-memory proposal registry with approval-gated execution
///
/// Proposals are keyed by id; each entry carries its own mutex so status
/// transitions are check-and-set atomic with respect to concurrent execute
/// attempts without serializing unrelated proposals.
pub struct ProposalRegistry {
    proposals: RwLock<HashMap<String, Arc<Mutex<TradeProposal>>>>,
    notifier: Arc<dyn ProposalNotifier>,
    inbox: Arc<ApprovalInbox>,
    config: ApprovalConfig,
    audit: Arc<dyn AuditSink>,
}

impl ProposalRegistry {
    pub fn new(
        config: ApprovalConfig,
        notifier: Arc<dyn ProposalNotifier>,
        inbox: Arc<ApprovalInbox>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            proposals: RwLock::new(HashMap::new()),
            notifier,
            inbox,
            config,
            audit,
        }
    }

    pub fn inbox(&self) -> Arc<ApprovalInbox> {
        self.inbox.clone()
    }

    /// Create a proposal for a risk-approved trade and dispatch the approval
    /// request to the configured approver. A notifier transport failure
    /// leaves the proposal registered and pending.
    pub async fn create(
        &self,
        ticker: &str,
        side: Side,
        contracts: u32,
        max_risk: Decimal,
    ) -> Result<TradeProposal> {
        if !side.is_directional() {
            return Err(GuardError::Internal(
                "proposal side must be directional".to_string(),
            ));
        }

        let suffix = Uuid::new_v4().simple().to_string();
        let proposal_id = format!("{}-{}", ticker, &suffix[..8]).to_ascii_uppercase();

        let proposal = TradeProposal {
            proposal_id: proposal_id.clone(),
            ticker: ticker.to_string(),
            side,
            contracts: contracts.max(1),
            max_risk,
            status: ProposalStatus::PendingApproval,
            created_at: Utc::now(),
        };

        self.proposals
            .write()
            .await
            .insert(proposal_id.clone(), Arc::new(Mutex::new(proposal.clone())));

        let approval_phrase = format!("APPROVE TRADE ID {}", proposal_id);
        let body = format!(
            "KalshiGuard proposal\n\
             Ticker: {}\n\
             Side: {}\n\
             Contracts: {}\n\
             Max risk: ${:.2}\n\
             {}",
            proposal.ticker, proposal.side, proposal.contracts, proposal.max_risk, approval_phrase
        );
        let request = ApprovalRequest {
            proposal_id: proposal_id.clone(),
            ticker: proposal.ticker.clone(),
            side,
            contracts: proposal.contracts,
            approver: self.config.approver.clone(),
            approval_phrase,
            body,
        };

        if let Err(e) = self.notifier.send_approval_request(&request).await {
            warn!(proposal_id = %proposal_id, "Approval notification failed: {}", e);
            self.audit
                .record(AuditEvent::new(
                    "proposal_registry",
                    "notification_failed",
                    AuditSeverity::Warning,
                    format!("Approval request for {} could not be delivered", proposal_id),
                    json!({"proposal_id": proposal_id, "error": e.to_string()}),
                ))
                .await;
        }

        self.audit
            .record(AuditEvent::new(
                "proposal_registry",
                "proposal_created",
                AuditSeverity::Info,
                format!("Proposal {} pending approval", proposal_id),
                json!({
                    "proposal_id": proposal_id,
                    "ticker": proposal.ticker,
                    "side": proposal.side,
                    "contracts": proposal.contracts,
                }),
            ))
            .await;

        Ok(proposal)
    }

    /// Snapshot of a proposal by id
    pub async fn get(&self, proposal_id: &str) -> Option<TradeProposal> {
        let entry = self.proposals.read().await.get(proposal_id).cloned()?;
        let proposal = entry.lock().await;
        Some(proposal.clone())
    }

    /// Block (bounded) until the whitelisted approver approves the proposal
    /// or the configured timeout elapses. The inbox is polled at the
    /// configured interval; a timeout yields `ApprovalWait::TimedOut`, not an
    /// error.
    pub async fn wait_for_approval(&self, proposal_id: &str) -> Result<ApprovalWait> {
        if self.proposals.read().await.get(proposal_id).is_none() {
            return Err(GuardError::ProposalNotFound(proposal_id.to_string()));
        }

        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(10));

        loop {
            if self.inbox.has_approval(proposal_id).await {
                info!(proposal_id, "Approval received");
                return Ok(ApprovalWait::Approved);
            }
            if Instant::now() >= deadline {
                info!(proposal_id, "Approval wait timed out");
                return Ok(ApprovalWait::TimedOut);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Execute an approved proposal via the execution collaborator
    ///
    /// The per-proposal lock is held across the connector call, so a
    /// concurrent duplicate execute observes a terminal status and gets a
    /// conflict instead of double-submitting. On connector failure the
    /// proposal is marked FAILED, never EXECUTED.
    pub async fn execute(
        &self,
        proposal_id: &str,
        connector: &dyn ExecutionConnector,
    ) -> Result<TradeProposal> {
        let entry = self
            .proposals
            .read()
            .await
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| GuardError::ProposalNotFound(proposal_id.to_string()))?;

        let mut proposal = entry.lock().await;
        if proposal.status != ProposalStatus::PendingApproval {
            return Err(GuardError::ProposalConflict(format!(
                "{} is {}, not PENDING_APPROVAL",
                proposal_id, proposal.status
            )));
        }

        let request = OrderRequest {
            ticker: proposal.ticker.clone(),
            side: proposal.side,
            contracts: proposal.contracts,
            order_type: OrderType::Market,
            client_order_id: proposal.proposal_id.clone(),
        };

        match connector.place_order(&request).await {
            Ok(result) => {
                proposal.status = ProposalStatus::Executed;
                info!(
                    proposal_id,
                    order_id = result.order_id.as_deref().unwrap_or("-"),
                    "Proposal executed"
                );
                self.audit
                    .record(AuditEvent::new(
                        "proposal_registry",
                        "proposal_executed",
                        AuditSeverity::Info,
                        format!("Proposal {} executed", proposal_id),
                        json!({
                            "proposal_id": proposal_id,
                            "order_id": result.order_id,
                            "status": result.status,
                        }),
                    ))
                    .await;
                Ok(proposal.clone())
            }
            Err(e) => {
                proposal.status = ProposalStatus::Failed;
                warn!(proposal_id, "Execution failed: {}", e);
                self.audit
                    .record(AuditEvent::new(
                        "proposal_registry",
                        "execution_failed",
                        AuditSeverity::Critical,
                        format!("Proposal {} failed at the execution boundary", proposal_id),
                        json!({"proposal_id": proposal_id, "error": e.to_string()}),
                    ))
                    .await;
                Err(e)
            }
        }
    }

    /// Reject a pending proposal
    pub async fn reject(&self, proposal_id: &str) -> Result<TradeProposal> {
        self.finalize(proposal_id, ProposalStatus::Rejected, "proposal_rejected")
            .await
    }

    /// Expire a pending proposal whose approval window lapsed
    pub async fn expire(&self, proposal_id: &str) -> Result<TradeProposal> {
        self.finalize(proposal_id, ProposalStatus::Expired, "proposal_expired")
            .await
    }

    async fn finalize(
        &self,
        proposal_id: &str,
        status: ProposalStatus,
        event_type: &str,
    ) -> Result<TradeProposal> {
        let entry = self
            .proposals
            .read()
            .await
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| GuardError::ProposalNotFound(proposal_id.to_string()))?;

        let mut proposal = entry.lock().await;
        if proposal.status != ProposalStatus::PendingApproval {
            return Err(GuardError::ProposalConflict(format!(
                "{} is {}, not PENDING_APPROVAL",
                proposal_id, proposal.status
            )));
        }
        proposal.status = status;

        self.audit
            .record(AuditEvent::new(
                "proposal_registry",
                event_type,
                AuditSeverity::Info,
                format!("Proposal {} marked {}", proposal_id, status),
                json!({"proposal_id": proposal_id, "status": status}),
            ))
            .await;

        Ok(proposal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::LogAuditSink;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const APPROVER: &str = "+15555550100";

    fn registry() -> (ProposalRegistry, Arc<QueuedNotifier>) {
        let notifier = Arc::new(QueuedNotifier::new());
        let config = ApprovalConfig {
            approver: APPROVER.to_string(),
            timeout_secs: 1,
            poll_interval_ms: 10,
        };
        let registry = ProposalRegistry::new(
            config,
            notifier.clone(),
            Arc::new(ApprovalInbox::new(APPROVER)),
            Arc::new(LogAuditSink),
        );
        (registry, notifier)
    }

    /// Connector that counts calls and always accepts
    struct CountingConnector {
        calls: AtomicUsize,
    }

    impl CountingConnector {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExecutionConnector for CountingConnector {
        async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OrderResult {
                status: "accepted".to_string(),
                order_id: Some(format!("ord-{}", request.client_order_id)),
            })
        }
    }

    struct FailingConnector;

    #[async_trait]
    impl ExecutionConnector for FailingConnector {
        async fn place_order(&self, _request: &OrderRequest) -> Result<OrderResult> {
            Err(GuardError::Execution("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_create_yields_pending_proposal_and_notification() {
        let (registry, notifier) = registry();
        let proposal = registry
            .create("FED-RATE-25MAR", Side::Yes, 1, dec!(0.50))
            .await
            .unwrap();

        assert_eq!(proposal.status, ProposalStatus::PendingApproval);
        assert!(proposal.proposal_id.starts_with("FED-RATE-25MAR-"));

        let outbox = notifier.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].approver, APPROVER);
        assert!(outbox[0]
            .body
            .contains(&format!("APPROVE TRADE ID {}", proposal.proposal_id)));
    }

    #[tokio::test]
    async fn test_create_rejects_hold_side() {
        let (registry, _) = registry();
        let result = registry.create("X", Side::Hold, 1, dec!(0.50)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_whitelisted_approval_is_observed() {
        let (registry, _) = registry();
        let proposal = registry.create("FED", Side::Yes, 1, dec!(0.50)).await.unwrap();

        registry
            .inbox()
            .record_incoming(APPROVER, format!("approve trade id {}", proposal.proposal_id))
            .await;

        let wait = registry.wait_for_approval(&proposal.proposal_id).await.unwrap();
        assert_eq!(wait, ApprovalWait::Approved);
    }

    #[tokio::test]
    async fn test_non_whitelisted_sender_never_approves() {
        let (registry, _) = registry();
        let proposal = registry.create("FED", Side::Yes, 1, dec!(0.50)).await.unwrap();

        registry
            .inbox()
            .record_incoming(
                "+19998887777",
                format!("APPROVE TRADE ID {}", proposal.proposal_id),
            )
            .await;

        let wait = registry.wait_for_approval(&proposal.proposal_id).await.unwrap();
        assert_eq!(wait, ApprovalWait::TimedOut);
    }

    #[tokio::test]
    async fn test_malformed_or_mismatched_body_never_approves() {
        let (registry, _) = registry();
        let proposal = registry.create("FED", Side::Yes, 1, dec!(0.50)).await.unwrap();

        let inbox = registry.inbox();
        inbox.record_incoming(APPROVER, "approve it please").await;
        inbox.record_incoming(APPROVER, "APPROVE TRADE ID WRONG-ID").await;
        inbox
            .record_incoming(APPROVER, format!("APPROVE TRADE ID {} now", proposal.proposal_id))
            .await;

        let wait = registry.wait_for_approval(&proposal.proposal_id).await.unwrap();
        assert_eq!(wait, ApprovalWait::TimedOut);
    }

    #[tokio::test]
    async fn test_wait_on_unknown_id_is_not_found() {
        let (registry, _) = registry();
        let err = registry.wait_for_approval("NOPE-1").await.unwrap_err();
        assert!(matches!(err, GuardError::ProposalNotFound(_)));
    }

    #[tokio::test]
    async fn test_execute_transitions_to_executed() {
        let (registry, _) = registry();
        let proposal = registry.create("FED", Side::Yes, 2, dec!(0.50)).await.unwrap();

        let connector = CountingConnector::new();
        let executed = registry
            .execute(&proposal.proposal_id, &connector)
            .await
            .unwrap();

        assert_eq!(executed.status, ProposalStatus::Executed);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_execute_conflicts_without_resubmitting() {
        let (registry, _) = registry();
        let proposal = registry.create("FED", Side::Yes, 1, dec!(0.50)).await.unwrap();

        let connector = CountingConnector::new();
        registry
            .execute(&proposal.proposal_id, &connector)
            .await
            .unwrap();

        let err = registry
            .execute(&proposal.proposal_id, &connector)
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::ProposalConflict(_)));
        // The connector must not have been invoked a second time.
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_executes_submit_exactly_once() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        let proposal = registry.create("FED", Side::Yes, 1, dec!(0.50)).await.unwrap();
        let connector = Arc::new(CountingConnector::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let connector = connector.clone();
            let id = proposal.proposal_id.clone();
            handles.push(tokio::spawn(async move {
                registry.execute(&id, connector.as_ref()).await
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(GuardError::ProposalConflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_marks_failed_not_executed() {
        let (registry, _) = registry();
        let proposal = registry.create("FED", Side::Yes, 1, dec!(0.50)).await.unwrap();

        let err = registry
            .execute(&proposal.proposal_id, &FailingConnector)
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Execution(_)));

        let stored = registry.get(&proposal.proposal_id).await.unwrap();
        assert_eq!(stored.status, ProposalStatus::Failed);
    }

    #[tokio::test]
    async fn test_execute_unknown_id_is_not_found() {
        let (registry, _) = registry();
        let err = registry
            .execute("GHOST-1", &CountingConnector::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::ProposalNotFound(_)));
    }

    #[tokio::test]
    async fn test_reject_then_execute_conflicts() {
        let (registry, _) = registry();
        let proposal = registry.create("FED", Side::No, 1, dec!(0.50)).await.unwrap();

        let rejected = registry.reject(&proposal.proposal_id).await.unwrap();
        assert_eq!(rejected.status, ProposalStatus::Rejected);

        let err = registry
            .execute(&proposal.proposal_id, &CountingConnector::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::ProposalConflict(_)));
    }

    #[tokio::test]
    async fn test_mock_connector_receives_idempotency_key() {
        let (registry, _) = registry();
        let proposal = registry.create("FED", Side::Yes, 3, dec!(0.50)).await.unwrap();
        let expected_id = proposal.proposal_id.clone();

        let mut mock = MockExecutionConnector::new();
        mock.expect_place_order()
            .withf(move |req| {
                req.client_order_id == expected_id
                    && req.contracts == 3
                    && req.order_type == OrderType::Market
            })
            .times(1)
            .returning(|_| {
                Ok(OrderResult {
                    status: "accepted".to_string(),
                    order_id: Some("ord-1".to_string()),
                })
            });

        registry.execute(&proposal.proposal_id, &mock).await.unwrap();
    }

    #[test]
    fn test_parse_approval_phrase() {
        assert_eq!(
            parse_approval("APPROVE TRADE ID FED-ABC123"),
            Some("FED-ABC123".to_string())
        );
        assert_eq!(
            parse_approval("approve   trade id fed-abc123"),
            Some("FED-ABC123".to_string())
        );
        assert_eq!(parse_approval("APPROVE TRADE FED-ABC123"), None);
        assert_eq!(parse_approval("APPROVE TRADE ID"), None);
        assert_eq!(parse_approval("APPROVE TRADE ID A B"), None);
        assert_eq!(parse_approval(""), None);
    }
}
