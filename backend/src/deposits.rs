//! Custody check for value attached to consumer calls.
//!
//! A call may only attach lamports it already paid into the treasury. The
//! payload names the deposit transaction; the chain must show that it
//! succeeded, was signed by the caller and credited the treasury with exactly
//! the attached amount. Each deposit backs one call.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status_client_types::UiTransactionEncoding;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DepositError {
    #[error("no treasury configured, attached value is not accepted")]
    NoCustody,
    #[error("attached value requires a deposit transaction")]
    Missing,
    #[error("invalid deposit signature {0}")]
    InvalidSignature(String),
    #[error("deposit {0} could not be confirmed")]
    Unconfirmed(String),
    #[error("deposit {0} failed on chain")]
    Failed(String),
    #[error("deposit {signature} was not signed by {depositor}")]
    WrongDepositor { signature: String, depositor: Pubkey },
    #[error("deposit {signature} credited {credited} lamports but {declared} were attached")]
    AmountMismatch {
        signature: String,
        credited: u64,
        declared: u64,
    },
    #[error("deposit {0} is too old")]
    Expired(String),
    #[error("deposit {0} was already spent")]
    AlreadySpent(String),
}

/// What the chain says about a deposit transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositTx {
    pub succeeded: bool,
    pub signers: Vec<Pubkey>,
    /// Lamports the treasury gained in this transaction.
    pub treasury_credit: u64,
    pub block_time: Option<i64>,
}

/// A deposit that may back one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDeposit {
    pub signature: String,
    pub lamports: u64,
    /// After this the deposit is refused as expired, so it can leave the spent set.
    pub expires_at: i64,
}

#[async_trait]
pub trait DepositLookup: Send + Sync {
    async fn fetch(
        &self,
        signature: &Signature,
        treasury: &Pubkey,
    ) -> Result<DepositTx, DepositError>;
}

/// Reads deposit transactions over JSON-RPC.
pub struct RpcDeposits {
    client: RpcClient,
}

impl RpcDeposits {
    pub fn new(rpc_url: String) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed()),
        }
    }
}

#[async_trait]
impl DepositLookup for RpcDeposits {
    async fn fetch(
        &self,
        signature: &Signature,
        treasury: &Pubkey,
    ) -> Result<DepositTx, DepositError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
            ..RpcTransactionConfig::default()
        };
        let confirmed = self
            .client
            .get_transaction_with_config(signature, config)
            .await
            .map_err(|e| DepositError::Unconfirmed(format!("{signature}: {e}")))?;

        let meta = confirmed
            .transaction
            .meta
            .ok_or_else(|| DepositError::Unconfirmed(format!("{signature}: no status")))?;
        let tx = confirmed
            .transaction
            .transaction
            .decode()
            .ok_or_else(|| DepositError::Unconfirmed(format!("{signature}: undecodable")))?;

        let keys = tx.message.static_account_keys();
        let num_signers = usize::from(tx.message.header().num_required_signatures);
        let treasury_credit = keys
            .iter()
            .position(|key| key == treasury)
            .and_then(|i| {
                let pre = *meta.pre_balances.get(i)?;
                let post = *meta.post_balances.get(i)?;
                Some(post.saturating_sub(pre))
            })
            .unwrap_or(0);

        Ok(DepositTx {
            succeeded: meta.err.is_none(),
            signers: keys.iter().take(num_signers).copied().collect(),
            treasury_credit,
            block_time: confirmed.block_time,
        })
    }
}

/// Treasury plus the means to check deposits into it.
#[derive(Clone)]
pub struct Custody {
    treasury: Pubkey,
    lookup: Arc<dyn DepositLookup>,
    max_age_secs: i64,
}

impl Custody {
    pub fn new(treasury: Pubkey, lookup: Arc<dyn DepositLookup>, max_age_secs: i64) -> Self {
        Self {
            treasury,
            lookup,
            max_age_secs,
        }
    }

    pub fn treasury(&self) -> Pubkey {
        self.treasury
    }

    pub async fn verify(
        &self,
        depositor: &Pubkey,
        deposit: &str,
        declared: u64,
        now: i64,
    ) -> Result<VerifiedDeposit, DepositError> {
        let signature = Signature::from_str(deposit)
            .map_err(|_| DepositError::InvalidSignature(deposit.to_string()))?;
        let tx = self.lookup.fetch(&signature, &self.treasury).await?;
        check_deposit(&tx, deposit, depositor, declared, now, self.max_age_secs)
    }
}

fn check_deposit(
    tx: &DepositTx,
    signature: &str,
    depositor: &Pubkey,
    declared: u64,
    now: i64,
    max_age_secs: i64,
) -> Result<VerifiedDeposit, DepositError> {
    if !tx.succeeded {
        return Err(DepositError::Failed(signature.to_string()));
    }
    if !tx.signers.contains(depositor) {
        return Err(DepositError::WrongDepositor {
            signature: signature.to_string(),
            depositor: *depositor,
        });
    }
    let Some(block_time) = tx.block_time else {
        return Err(DepositError::Unconfirmed(signature.to_string()));
    };
    let expires_at = block_time.saturating_add(max_age_secs);
    if now > expires_at {
        return Err(DepositError::Expired(signature.to_string()));
    }
    if tx.treasury_credit != declared {
        return Err(DepositError::AmountMismatch {
            signature: signature.to_string(),
            credited: tx.treasury_credit,
            declared,
        });
    }
    Ok(VerifiedDeposit {
        signature: signature.to_string(),
        lamports: declared,
        expires_at,
    })
}

/// Deposits known up front, keyed by signature.
#[cfg(test)]
#[derive(Default)]
pub struct FixedDeposits(pub std::collections::HashMap<String, DepositTx>);

#[cfg(test)]
#[async_trait]
impl DepositLookup for FixedDeposits {
    async fn fetch(
        &self,
        signature: &Signature,
        _treasury: &Pubkey,
    ) -> Result<DepositTx, DepositError> {
        self.0
            .get(&signature.to_string())
            .cloned()
            .ok_or_else(|| DepositError::Unconfirmed(signature.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paid(depositor: Pubkey, lamports: u64, block_time: i64) -> DepositTx {
        DepositTx {
            succeeded: true,
            signers: vec![depositor],
            treasury_credit: lamports,
            block_time: Some(block_time),
        }
    }

    #[test]
    fn matching_deposit_is_accepted() {
        let depositor = Pubkey::new_unique();
        let tx = paid(depositor, 500, 1_000);
        let verified = check_deposit(&tx, "sig", &depositor, 500, 1_100, 600).unwrap();
        assert_eq!(
            verified,
            VerifiedDeposit {
                signature: "sig".into(),
                lamports: 500,
                expires_at: 1_600,
            }
        );
    }

    #[test]
    fn deposit_by_someone_else_is_refused() {
        let depositor = Pubkey::new_unique();
        let stranger = Pubkey::new_unique();
        let err = check_deposit(&paid(depositor, 500, 1_000), "sig", &stranger, 500, 1_000, 600)
            .unwrap_err();
        assert!(matches!(err, DepositError::WrongDepositor { .. }));
    }

    #[test]
    fn declared_value_must_match_credit() {
        let depositor = Pubkey::new_unique();
        let tx = paid(depositor, 500, 1_000);
        let err = check_deposit(&tx, "sig", &depositor, 5_000, 1_000, 600).unwrap_err();
        assert_eq!(
            err,
            DepositError::AmountMismatch {
                signature: "sig".into(),
                credited: 500,
                declared: 5_000,
            }
        );
    }

    #[test]
    fn failed_or_old_deposits_are_refused() {
        let depositor = Pubkey::new_unique();
        let mut tx = paid(depositor, 500, 1_000);
        assert_eq!(
            check_deposit(&tx, "sig", &depositor, 500, 1_601, 600).unwrap_err(),
            DepositError::Expired("sig".into())
        );

        tx.succeeded = false;
        assert_eq!(
            check_deposit(&tx, "sig", &depositor, 500, 1_000, 600).unwrap_err(),
            DepositError::Failed("sig".into())
        );
    }

    #[tokio::test]
    async fn custody_rejects_unknown_and_malformed_signatures() {
        let depositor = Pubkey::new_unique();
        let custody = Custody::new(
            Pubkey::new_unique(),
            Arc::new(FixedDeposits::default()),
            600,
        );

        let err = custody.verify(&depositor, "not-a-signature", 10, 0).await.unwrap_err();
        assert_eq!(err, DepositError::InvalidSignature("not-a-signature".into()));

        let unknown = Signature::from([7u8; 64]).to_string();
        let err = custody.verify(&depositor, &unknown, 10, 0).await.unwrap_err();
        assert_eq!(err, DepositError::Unconfirmed(unknown));
    }
}
