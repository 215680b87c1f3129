//! Runs one market transaction at a time and publishes its lifecycle.

use crate::{
    chain::{
        ChainError,
        IdentityKind,
        OperationKind,
        TxReceipt,
        TxRequest,
        TxSender,
        USER_REJECTED_REQUEST,
    },
    reconciler::RefreshHandle,
    types::View,
};
use ethers::types::TxHash;
use std::{
    future::Future,
    sync::Arc,
    time::Duration,
};
use tokio::sync::watch;
use tracing::{
    info,
    warn,
};

/// How long a success message stays up before returning to idle.
pub const SUCCESS_DISPLAY_DELAY: Duration = Duration::from_millis(2_000);

pub const REJECTED_IN_WALLET: &str = "Transaction rejected in wallet.";
pub const ALREADY_PREDICTED: &str = "You have already predicted this match.";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TxLifecycle {
    #[default]
    Idle,
    Pending {
        operation: OperationKind,
        message: String,
    },
    Success {
        operation: OperationKind,
        message: String,
        tx_hash: TxHash,
    },
    Error {
        operation: OperationKind,
        message: String,
    },
}

impl TxLifecycle {
    pub fn is_pending(&self) -> bool {
        matches!(self, TxLifecycle::Pending { .. })
    }

    /// Success and error may be dismissed; pending may not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxLifecycle::Success { .. } | TxLifecycle::Error { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            TxLifecycle::Idle => None,
            TxLifecycle::Pending { message, .. }
            | TxLifecycle::Success { message, .. }
            | TxLifecycle::Error { message, .. } => Some(message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Confirmed {
        receipt: TxReceipt,
        signed_by: IdentityKind,
        navigate: Option<View>,
    },
    Failed {
        message: String,
    },
    /// Blocked before anything was sent.
    Rejected {
        message: String,
    },
    /// Another transaction is still pending.
    Busy,
}

impl Outcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed { .. })
    }
}

#[derive(Clone)]
pub struct TxOrchestrator {
    state: Arc<watch::Sender<TxLifecycle>>,
    refresh: RefreshHandle,
    display_delay: Duration,
}

impl TxOrchestrator {
    pub fn new(refresh: RefreshHandle) -> Self {
        let (state, _) = watch::channel(TxLifecycle::Idle);
        Self {
            state: Arc::new(state),
            refresh,
            display_delay: SUCCESS_DISPLAY_DELAY,
        }
    }

    pub fn with_display_delay(mut self, delay: Duration) -> Self {
        self.display_delay = delay;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<TxLifecycle> {
        self.state.subscribe()
    }

    pub fn lifecycle(&self) -> TxLifecycle {
        self.state.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().is_pending()
    }

    /// Clears a finished status. Does nothing while a transaction is pending.
    pub fn dismiss(&self) {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                *state = TxLifecycle::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Surfaces a pre-flight rejection without touching the chain.
    pub fn reject(&self, operation: OperationKind, message: impl Into<String>) -> Outcome {
        let message = message.into();
        if self.is_busy() {
            return Outcome::Busy;
        }
        info!(operation = operation.label(), %message, "transaction blocked before submission");
        self.state.send_replace(TxLifecycle::Error {
            operation,
            message: message.clone(),
        });
        Outcome::Rejected { message }
    }

    /// Resolves the signer, submits `request`, and waits for one confirmation.
    ///
    /// Pending is entered before the signer resolves, so wallet prompts show
    /// as in-flight. Failures end in `Error` until dismissed.
    pub async fn execute<S, F>(&self, request: TxRequest, signer: F) -> Outcome
    where
        S: TxSender,
        F: Future<Output = S>,
    {
        let operation = request.kind();
        let claimed = self.state.send_if_modified(|state| {
            if state.is_pending() {
                return false;
            }
            *state = TxLifecycle::Pending {
                operation,
                message: format!("Waiting for {} signature...", operation.label()),
            };
            true
        });
        if !claimed {
            warn!(operation = operation.label(), "transaction already in flight");
            return Outcome::Busy;
        }

        let signer = signer.await;
        let signed_by = signer.kind();
        let tx_hash = match signer.submit(&request).await {
            Ok(tx_hash) => tx_hash,
            Err(err) => return self.fail(operation, &err),
        };
        info!(
            operation = operation.label(),
            identity = signed_by.label(),
            from = ?signer.address(),
            gas_limit = request.gas_limit,
            ?tx_hash,
            "transaction submitted"
        );
        self.state.send_modify(|state| {
            *state = TxLifecycle::Pending {
                operation,
                message: "Confirming on chain...".to_string(),
            }
        });

        let receipt = match signer.wait_for_confirmation(tx_hash).await {
            Ok(receipt) => receipt,
            Err(err) => return self.fail(operation, &err),
        };
        info!(
            operation = operation.label(),
            ?tx_hash,
            block = ?receipt.block_number,
            "transaction confirmed"
        );

        self.state.send_replace(TxLifecycle::Success {
            operation,
            message: success_message(operation),
            tx_hash,
        });
        self.refresh.request_refresh();

        tokio::time::sleep(self.display_delay).await;
        self.state.send_if_modified(|state| match state {
            TxLifecycle::Success { tx_hash: shown, .. } if *shown == tx_hash => {
                *state = TxLifecycle::Idle;
                true
            }
            _ => false,
        });

        Outcome::Confirmed {
            receipt,
            signed_by,
            navigate: operation.results_view(),
        }
    }

    fn fail(&self, operation: OperationKind, err: &ChainError) -> Outcome {
        let message = classify_failure(operation, err);
        warn!(operation = operation.label(), %err, %message, "transaction failed");
        self.state.send_replace(TxLifecycle::Error {
            operation,
            message: message.clone(),
        });
        Outcome::Failed { message }
    }
}

fn success_message(operation: OperationKind) -> String {
    match operation {
        OperationKind::Predict => "Prediction placed!",
        OperationKind::Claim => "Winnings claimed!",
        OperationKind::CreateMatch => "Match created!",
        OperationKind::SubmitResult => "Result submitted!",
        OperationKind::WithdrawFees => "Platform fees withdrawn!",
    }
    .to_string()
}

/// Only prediction and settlement reverts have a known likely cause; other
/// operations surface the decoded reason instead.
fn revert_message(operation: OperationKind) -> Option<&'static str> {
    match operation {
        OperationKind::Predict => {
            Some("Execution reverted: match likely closed or already predicted.")
        }
        OperationKind::SubmitResult => Some("Reverted: match might not be started yet."),
        OperationKind::Claim | OperationKind::CreateMatch | OperationKind::WithdrawFees => None,
    }
}

fn fallback_message(operation: OperationKind) -> &'static str {
    match operation {
        OperationKind::Predict => "Transaction failed",
        OperationKind::Claim => "Claim failed",
        OperationKind::CreateMatch => "Failed to create match. Are you the owner?",
        OperationKind::SubmitResult => "Settlement failed",
        OperationKind::WithdrawFees => "Fee withdrawal failed",
    }
}

/// Maps a chain failure to the message shown to the user.
pub fn classify_failure(operation: OperationKind, err: &ChainError) -> String {
    let reason = err.reason().map(str::to_string);
    let text = format!("{err} {}", reason.as_deref().unwrap_or_default()).to_lowercase();

    if err.code() == Some(USER_REJECTED_REQUEST)
        || text.contains("user rejected")
        || text.contains("user denied")
    {
        return REJECTED_IN_WALLET.to_string();
    }
    if operation == OperationKind::Predict && text.contains("already predicted") {
        return ALREADY_PREDICTED.to_string();
    }
    if text.contains("execution reverted") {
        if let Some(message) = revert_message(operation) {
            return message.to_string();
        }
    }
    match reason.filter(|reason| !reason.trim().is_empty()) {
        Some(reason) => reason,
        None => match err {
            ChainError::Rpc { message, .. } if !message.trim().is_empty() => {
                message.clone()
            }
            _ => fallback_message(operation).to_string(),
        },
    }
}
