//! Every orchestrator resolves to `Result<Outcome<T>, FuseVaultError>` — the
//! typed replacement for the `{ok | err | pending_signature}` tagged
//! dictionary in §9's redesign notes. `pending_signature` is folded into the
//! success channel (it is not an error, per §7), leaving `Result` to carry
//! only genuine failure.

#[derive(Debug, Clone)]
pub struct PendingTxHandle {
    pub pending_tx_id: String,
    pub transaction_hex: String,
    pub estimated_gas: u64,
    pub gas_price_wei: u128,
    pub function_name: &'static str,
}

#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Done(T),
    PendingSignature(PendingTxHandle),
}

impl<T> Outcome<T> {
    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(v) => Some(v),
            Outcome::PendingSignature(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::PendingSignature(_))
    }
}
