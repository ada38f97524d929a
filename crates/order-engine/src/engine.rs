//! Conditional order authorization engine.
//!
//! One submission runs, in order: signature check, nonce reservation, account
//! gates, executor and fee gates, condition evaluation and finally the market
//! commitment. The nonce is reserved before any external effect and only
//! committed once the market accepts, so a rejected submission leaves no trace
//! in the registry. The reservation is held by the nonce store, which keeps
//! every other submission of the same pair waiting, across engines sharing
//! that store, until the outcome is known.

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use order_core::config::EngineConfig;
use order_core::signing::{Domain, SignatureAuthenticator, SignatureRecoverer};
use order_core::types::ConditionalOrder;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::collaborators::{
    AccountRegistry, EngineAddresses, ExecutorFeeOracle, MarketCommitment, PerpsMarket,
};
use crate::conditions::{
    BuiltinConditions, ConditionContext, ConditionRegistry, ConditionTarget, MarketSnapshot,
};
use crate::error::{EngineError, Rejection, Result};
use crate::nonce_store::{MemoryNonceStore, NonceStore};

/// Proof of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReceipt {
    /// EIP-712 digest the signer signed.
    pub order_hash: B256,
    pub signer: Address,
    pub nonce: U256,
    pub account_id: u128,
    pub market_id: u128,
    pub executor: Address,
    pub executor_fee: U256,
    pub commitment: MarketCommitment,
    pub executed_at: DateTime<Utc>,
}

/// Authorizes signed conditional orders and forwards them to the market.
pub struct Engine {
    authenticator: SignatureAuthenticator,
    addresses: EngineAddresses,
    max_conditions: usize,
    nonces: Arc<dyn NonceStore>,
    conditions: ConditionRegistry,
    market: Arc<dyn PerpsMarket>,
    accounts: Arc<dyn AccountRegistry>,
    fees: Arc<dyn ExecutorFeeOracle>,
}

impl Engine {
    pub fn builder(config: EngineConfig, addresses: EngineAddresses) -> EngineBuilder {
        EngineBuilder::new(config, addresses)
    }

    pub fn domain(&self) -> &Domain {
        self.authenticator.domain()
    }

    pub fn addresses(&self) -> &EngineAddresses {
        &self.addresses
    }

    pub fn max_conditions(&self) -> usize {
        self.max_conditions
    }

    /// Digest of `order` under this engine's domain.
    pub fn order_hash(&self, order: &ConditionalOrder) -> B256 {
        self.authenticator.signing_digest(order)
    }

    /// Whether `signature` is valid for exactly this order under this engine's
    /// domain. Touches no state.
    pub fn verify_signature(&self, order: &ConditionalOrder, signature: &[u8]) -> bool {
        self.authenticator.verify_signature(order, signature)
    }

    /// Run every check `submit_order` would, without consuming the nonce or
    /// calling the market.
    pub async fn check_order(
        &self,
        order: &ConditionalOrder,
        signature: &[u8],
        executor: Address,
    ) -> Result<U256> {
        self.authenticate(order, signature)?;

        if self
            .nonces
            .is_used(order.signer, order.nonce)
            .await
            .map_err(EngineError::Store)?
        {
            return Err(Rejection::NonceReused {
                signer: order.signer,
                nonce: order.nonce,
            }
            .into());
        }

        self.authorize(order, executor).await
    }

    /// Whether `executor` could submit the order right now.
    pub async fn can_execute(
        &self,
        order: &ConditionalOrder,
        signature: &[u8],
        executor: Address,
    ) -> bool {
        self.check_order(order, signature, executor).await.is_ok()
    }

    /// Authorize `order` on behalf of `executor` and commit it to the market.
    pub async fn submit_order(
        &self,
        order: &ConditionalOrder,
        signature: &[u8],
        executor: Address,
    ) -> Result<ExecutionReceipt> {
        let order_hash = self
            .authenticate(order, signature)
            .map_err(|e| self.rejected(order, e))?;

        let reservation = self
            .nonces
            .reserve(order.signer, order.nonce)
            .await
            .map_err(|e| {
                error!(signer = %order.signer, nonce = %order.nonce, error = %e, "Nonce store failed");
                EngineError::Store(e)
            })?;

        let Some(reservation) = reservation else {
            return Err(self.rejected(
                order,
                Rejection::NonceReused {
                    signer: order.signer,
                    nonce: order.nonce,
                }
                .into(),
            ));
        };

        let (executor_fee, commitment) = match self.authorize_and_commit(order, executor).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Err(e) = reservation.rollback().await {
                    // Nothing was recorded; the store drops the claim on its own.
                    warn!(signer = %order.signer, nonce = %order.nonce, error = %e, "Nonce rollback failed");
                }
                return Err(self.rejected(order, err));
            }
        };

        if let Err(e) = reservation.commit().await {
            error!(
                signer = %order.signer,
                nonce = %order.nonce,
                market_id = commitment.market_id,
                error = %e,
                "Market commitment placed but nonce was not recorded"
            );
            return Err(EngineError::Store(e));
        }

        let receipt = ExecutionReceipt {
            order_hash,
            signer: order.signer,
            nonce: order.nonce,
            account_id: order.order_details.account_id,
            market_id: order.order_details.market_id,
            executor,
            executor_fee,
            commitment,
            executed_at: Utc::now(),
        };

        info!(
            order_hash = %receipt.order_hash,
            signer = %receipt.signer,
            nonce = %receipt.nonce,
            market_id = receipt.market_id,
            account_id = receipt.account_id,
            executor = %executor,
            executor_fee = %executor_fee,
            "Conditional order executed"
        );

        Ok(receipt)
    }

    /// Burn a nonce so no order using it can ever execute.
    ///
    /// Returns `false` if it was already used. Callers are expected to have
    /// authenticated `signer` themselves.
    pub async fn invalidate_nonce(&self, signer: Address, nonce: U256) -> Result<bool> {
        let burned = self
            .nonces
            .consume(signer, nonce)
            .await
            .map_err(EngineError::Store)?;

        info!(signer = %signer, nonce = %nonce, burned, "Nonce invalidated");
        Ok(burned)
    }

    pub async fn is_nonce_used(&self, signer: Address, nonce: U256) -> Result<bool> {
        self.nonces
            .is_used(signer, nonce)
            .await
            .map_err(EngineError::Store)
    }

    fn authenticate(
        &self,
        order: &ConditionalOrder,
        signature: &[u8],
    ) -> std::result::Result<B256, EngineError> {
        self.authenticator
            .authenticate(order, signature)
            .map_err(Rejection::from)?;
        Ok(self.authenticator.signing_digest(order))
    }

    /// Steps after the nonce: account gates, executor gates, conditions.
    /// Returns the executor fee.
    async fn authorize(&self, order: &ConditionalOrder, executor: Address) -> Result<U256> {
        let details = &order.order_details;

        if order.require_verified
            && !self
                .accounts
                .is_verified(details.account_id)
                .await
                .map_err(EngineError::Collaborator)?
        {
            return Err(Rejection::UnverifiedAccount {
                account_id: details.account_id,
            }
            .into());
        }

        if !self
            .accounts
            .is_permitted(details.account_id, order.signer)
            .await
            .map_err(EngineError::Collaborator)?
        {
            return Err(Rejection::UnauthorizedSigner {
                signer: order.signer,
                account_id: details.account_id,
            }
            .into());
        }

        if !order.is_executor_unrestricted() && executor != order.trusted_executor {
            return Err(Rejection::UnauthorizedExecutor {
                executor,
                trusted: order.trusted_executor,
            }
            .into());
        }

        let fee = self
            .fees
            .executor_fee(order, executor)
            .await
            .map_err(EngineError::Collaborator)?;
        if fee > order.max_executor_fee {
            return Err(Rejection::FeeCapExceeded {
                fee,
                max: order.max_executor_fee,
            }
            .into());
        }

        if order.conditions.len() > self.max_conditions {
            return Err(Rejection::TooManyConditions {
                count: order.conditions.len(),
                max: self.max_conditions,
            }
            .into());
        }

        self.conditions.evaluate(&order.conditions)?;

        debug!(signer = %order.signer, nonce = %order.nonce, fee = %fee, "Order authorized");
        Ok(fee)
    }

    async fn authorize_and_commit(
        &self,
        order: &ConditionalOrder,
        executor: Address,
    ) -> Result<(U256, MarketCommitment)> {
        let fee = self.authorize(order, executor).await?;
        let commitment = self.market.commit_order(&order.order_details).await?;
        Ok((fee, commitment))
    }

    fn rejected(&self, order: &ConditionalOrder, err: EngineError) -> EngineError {
        match &err {
            EngineError::Rejected(rejection) => warn!(
                signer = %order.signer,
                nonce = %order.nonce,
                category = ?rejection.category(),
                reason = %rejection,
                "Conditional order rejected"
            ),
            other => error!(
                signer = %order.signer,
                nonce = %order.nonce,
                error = %other,
                "Conditional order failed"
            ),
        }
        err
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("authenticator", &self.authenticator)
            .field("addresses", &self.addresses)
            .field("max_conditions", &self.max_conditions)
            .field("conditions", &self.conditions)
            .finish()
    }
}

/// Builder wiring an [`Engine`] to its collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    addresses: EngineAddresses,
    recoverer: Option<Arc<dyn SignatureRecoverer>>,
    nonces: Option<Arc<dyn NonceStore>>,
    market: Option<Arc<dyn PerpsMarket>>,
    accounts: Option<Arc<dyn AccountRegistry>>,
    fees: Option<Arc<dyn ExecutorFeeOracle>>,
    context: Option<Arc<dyn ConditionContext>>,
    targets: Vec<(Address, Arc<dyn ConditionTarget>)>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig, addresses: EngineAddresses) -> Self {
        Self {
            config,
            addresses,
            recoverer: None,
            nonces: None,
            market: None,
            accounts: None,
            fees: None,
            context: None,
            targets: Vec::new(),
        }
    }

    /// Replace secp256k1 recovery.
    pub fn recoverer(mut self, recoverer: Arc<dyn SignatureRecoverer>) -> Self {
        self.recoverer = Some(recoverer);
        self
    }

    /// Nonce registry. Defaults to [`MemoryNonceStore`].
    pub fn nonce_store(mut self, nonces: Arc<dyn NonceStore>) -> Self {
        self.nonces = Some(nonces);
        self
    }

    pub fn market(mut self, market: Arc<dyn PerpsMarket>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn accounts(mut self, accounts: Arc<dyn AccountRegistry>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn fees(mut self, fees: Arc<dyn ExecutorFeeOracle>) -> Self {
        self.fees = Some(fees);
        self
    }

    /// Market view for the built-in predicates. Defaults to an empty
    /// [`MarketSnapshot`] on the wall clock.
    pub fn condition_context(mut self, context: Arc<dyn ConditionContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Register an external condition target.
    pub fn condition_target(mut self, address: Address, target: Arc<dyn ConditionTarget>) -> Self {
        self.targets.push((address, target));
        self
    }

    pub fn build(self) -> Result<Engine> {
        if self.config.max_conditions == 0 {
            return Err(order_core::Error::Config {
                message: "max_conditions must be at least 1".to_string(),
            }
            .into());
        }

        let domain = self.config.domain.bind()?;
        let authenticator = match self.recoverer {
            Some(recoverer) => SignatureAuthenticator::with_recoverer(domain, recoverer),
            None => SignatureAuthenticator::new(domain),
        };

        let market = self.market.ok_or_else(|| missing("market"))?;
        let accounts = self.accounts.ok_or_else(|| missing("account registry"))?;
        let fees = self.fees.ok_or_else(|| missing("executor fee oracle"))?;

        let context = self
            .context
            .unwrap_or_else(|| Arc::new(MarketSnapshot::default()));
        let mut conditions = ConditionRegistry::new();
        conditions.register(
            authenticator.domain().verifying_contract(),
            Arc::new(BuiltinConditions::new(context)),
        );
        for (address, target) in self.targets {
            conditions.register(address, target);
        }

        info!(
            name = authenticator.domain().name(),
            chain_id = %authenticator.domain().chain_id(),
            verifying_contract = %authenticator.domain().verifying_contract(),
            condition_targets = conditions.len(),
            "Conditional order engine ready"
        );

        Ok(Engine {
            authenticator,
            addresses: self.addresses,
            max_conditions: self.config.max_conditions,
            nonces: self
                .nonces
                .unwrap_or_else(|| Arc::new(MemoryNonceStore::new())),
            conditions,
            market,
            accounts,
            fees,
        })
    }
}

fn missing(collaborator: &str) -> EngineError {
    order_core::Error::Config {
        message: format!("engine requires a {}", collaborator),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        FlatExecutorFee, MarketError, MockAccountRegistry, MockExecutorFeeOracle, MockPerpsMarket,
    };
    use crate::conditions::{ManualClock, MockConditionTarget};
    use crate::error::{ConditionFailure, RejectionCategory};
    use crate::nonce_store::MockNonceStore;
    use alloy_primitives::address;
    use alloy_signer::SignerSync;
    use async_trait::async_trait;
    use order_core::types::OrderDetails;
    use std::time::Duration;
    use tokio::sync::Notify;
    use alloy_signer_local::PrivateKeySigner;
    use order_core::signing::SignatureError;
    use order_core::types::Condition;

    const ENGINE_ADDRESS: Address = address!("500A139459fA3628C416A6b19BFADd83B20e5D0b");
    const EXECUTOR: Address = address!("7FA9385bE102ac3EAc297483Dd6233D62b3e1496");
    const NOW: u64 = 1_700_000_000;

    fn config() -> EngineConfig {
        EngineConfig::local(31337, ENGINE_ADDRESS)
    }

    fn committing_market() -> MockPerpsMarket {
        let mut market = MockPerpsMarket::new();
        market
            .expect_commit_order()
            .returning(|details| Ok(MarketCommitment::for_order(details, NOW, U256::ZERO)));
        market
    }

    fn open_accounts() -> MockAccountRegistry {
        let mut accounts = MockAccountRegistry::new();
        accounts.expect_is_verified().returning(|_| Ok(true));
        accounts.expect_is_permitted().returning(|_, _| Ok(true));
        accounts
    }

    struct Harness {
        key: PrivateKeySigner,
        nonces: Arc<MemoryNonceStore>,
        snapshot: Arc<MarketSnapshot>,
    }

    impl Harness {
        fn new() -> Self {
            let snapshot = MarketSnapshot::new(Arc::new(ManualClock::new(NOW)));
            snapshot.set_market_open(200, true);
            Self {
                key: PrivateKeySigner::random(),
                nonces: Arc::new(MemoryNonceStore::new()),
                snapshot: Arc::new(snapshot),
            }
        }

        fn builder(&self) -> EngineBuilder {
            Engine::builder(config(), EngineAddresses::uniform(Address::with_last_byte(1)))
                .nonce_store(self.nonces.clone())
                .condition_context(self.snapshot.clone())
                .fees(Arc::new(FlatExecutorFee(U256::from(10u8))))
        }

        fn engine(&self) -> Engine {
            self.builder()
                .market(Arc::new(committing_market()))
                .accounts(Arc::new(open_accounts()))
                .build()
                .unwrap()
        }

        fn order(&self) -> ConditionalOrder {
            ConditionalOrder::builder()
                .market_id(200)
                .account_id(170141183460469231731687303715884105756)
                .size_delta(1_000_000_000_000_000_000)
                .signer(self.key.address())
                .build()
                .unwrap()
        }

        fn sign(&self, engine: &Engine, order: &ConditionalOrder) -> Vec<u8> {
            let digest = engine.order_hash(order);
            self.key.sign_hash_sync(&digest).unwrap().as_bytes().to_vec()
        }
    }

    fn rejection(err: EngineError) -> Rejection {
        match err {
            EngineError::Rejected(rejection) => rejection,
            other => panic!("expected rejection, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_submit_order_success() {
        let h = Harness::new();
        let engine = h.engine();
        let order = h.order();
        let signature = h.sign(&engine, &order);

        let receipt = engine.submit_order(&order, &signature, EXECUTOR).await.unwrap();

        assert_eq!(receipt.signer, h.key.address());
        assert_eq!(receipt.order_hash, engine.order_hash(&order));
        assert_eq!(receipt.executor_fee, U256::from(10u8));
        assert_eq!(receipt.commitment.market_id, 200);
        assert!(engine.is_nonce_used(order.signer, order.nonce).await.unwrap());
    }

    #[tokio::test]
    async fn test_double_submission_is_nonce_replay() {
        let h = Harness::new();
        let engine = h.engine();
        let order = h.order();
        let signature = h.sign(&engine, &order);

        engine.submit_order(&order, &signature, EXECUTOR).await.unwrap();
        let err = engine
            .submit_order(&order, &signature, EXECUTOR)
            .await
            .unwrap_err();

        assert_eq!(
            rejection(err),
            Rejection::NonceReused {
                signer: order.signer,
                nonce: order.nonce,
            }
        );
    }

    #[tokio::test]
    async fn test_bad_signatures_leave_nonce_untouched() {
        let h = Harness::new();
        let engine = h.engine();
        let order = h.order();
        let mut signature = h.sign(&engine, &order);

        signature[64] = 5;
        let err = engine
            .submit_order(&order, &signature, EXECUTOR)
            .await
            .unwrap_err();
        assert_eq!(
            rejection(err),
            Rejection::MalformedSignature(SignatureError::InvalidRecoveryId(5))
        );

        let other = PrivateKeySigner::random();
        let foreign = other
            .sign_hash_sync(&engine.order_hash(&order))
            .unwrap()
            .as_bytes();
        let err = engine
            .submit_order(&order, &foreign, EXECUTOR)
            .await
            .unwrap_err();
        assert_eq!(
            rejection(err).category(),
            RejectionCategory::SignerMismatch
        );

        assert!(h.nonces.is_empty());
    }

    #[tokio::test]
    async fn test_unverified_account_rejected_and_nonce_unused() {
        let h = Harness::new();
        let mut accounts = MockAccountRegistry::new();
        accounts.expect_is_verified().returning(|_| Ok(false));
        accounts.expect_is_permitted().returning(|_, _| Ok(true));
        let mut market = MockPerpsMarket::new();
        market.expect_commit_order().times(0);

        let engine = h
            .builder()
            .market(Arc::new(market))
            .accounts(Arc::new(accounts))
            .build()
            .unwrap();

        let mut order = h.order();
        order.require_verified = true;
        let signature = h.sign(&engine, &order);

        let err = engine
            .submit_order(&order, &signature, EXECUTOR)
            .await
            .unwrap_err();
        let rejection = rejection(err);
        assert!(matches!(rejection, Rejection::UnverifiedAccount { .. }));
        assert!(rejection.is_retryable());
        assert!(!engine.is_nonce_used(order.signer, order.nonce).await.unwrap());
    }

    #[tokio::test]
    async fn test_verification_skipped_when_not_required() {
        let h = Harness::new();
        let mut accounts = MockAccountRegistry::new();
        accounts.expect_is_verified().times(0);
        accounts.expect_is_permitted().returning(|_, _| Ok(true));

        let engine = h
            .builder()
            .market(Arc::new(committing_market()))
            .accounts(Arc::new(accounts))
            .build()
            .unwrap();

        let order = h.order();
        let signature = h.sign(&engine, &order);
        assert!(engine.submit_order(&order, &signature, EXECUTOR).await.is_ok());
    }

    #[tokio::test]
    async fn test_unauthorized_signer() {
        let h = Harness::new();
        let mut accounts = MockAccountRegistry::new();
        accounts.expect_is_permitted().returning(|_, _| Ok(false));

        let engine = h
            .builder()
            .market(Arc::new(committing_market()))
            .accounts(Arc::new(accounts))
            .build()
            .unwrap();

        let order = h.order();
        let signature = h.sign(&engine, &order);
        let err = engine
            .submit_order(&order, &signature, EXECUTOR)
            .await
            .unwrap_err();
        assert!(matches!(
            rejection(err),
            Rejection::UnauthorizedSigner { .. }
        ));
    }

    #[tokio::test]
    async fn test_trusted_executor_gate() {
        let h = Harness::new();
        let engine = h.engine();
        let mut order = h.order();
        order.trusted_executor = EXECUTOR;
        let signature = h.sign(&engine, &order);

        let stranger = Address::repeat_byte(0x99);
        let err = engine
            .submit_order(&order, &signature, stranger)
            .await
            .unwrap_err();
        assert_eq!(
            rejection(err),
            Rejection::UnauthorizedExecutor {
                executor: stranger,
                trusted: EXECUTOR,
            }
        );

        // Never recorded, so the trusted executor can still run it.
        assert!(engine.submit_order(&order, &signature, EXECUTOR).await.is_ok());
    }

    #[tokio::test]
    async fn test_fee_cap() {
        let h = Harness::new();
        let mut fees = MockExecutorFeeOracle::new();
        fees.expect_executor_fee()
            .returning(|_, _| Ok(U256::from(500u64)));

        let engine = h
            .builder()
            .fees(Arc::new(fees))
            .market(Arc::new(committing_market()))
            .accounts(Arc::new(open_accounts()))
            .build()
            .unwrap();

        let mut order = h.order();
        order.max_executor_fee = U256::from(499u64);
        let signature = h.sign(&engine, &order);
        let err = engine
            .submit_order(&order, &signature, EXECUTOR)
            .await
            .unwrap_err();
        assert_eq!(
            rejection(err),
            Rejection::FeeCapExceeded {
                fee: U256::from(500u64),
                max: U256::from(499u64),
            }
        );

        order.max_executor_fee = U256::from(500u64);
        let signature = h.sign(&engine, &order);
        let receipt = engine.submit_order(&order, &signature, EXECUTOR).await.unwrap();
        assert_eq!(receipt.executor_fee, U256::from(500u64));
    }

    #[tokio::test]
    async fn test_builtin_conditions() {
        let h = Harness::new();
        let engine = h.engine();
        let order = ConditionalOrder {
            conditions: vec![
                BuiltinConditions::timestamp_after(ENGINE_ADDRESS, NOW - 10).encode(),
                BuiltinConditions::market_open(ENGINE_ADDRESS, 200).encode(),
                BuiltinConditions::timestamp_before(ENGINE_ADDRESS, NOW - 5).encode(),
            ],
            ..h.order()
        };
        let signature = h.sign(&engine, &order);

        let err = engine
            .submit_order(&order, &signature, EXECUTOR)
            .await
            .unwrap_err();
        let rejection = rejection(err);
        assert_eq!(
            rejection,
            Rejection::ConditionFailed {
                index: 2,
                reason: ConditionFailure::NotSatisfied,
            }
        );
        assert!(rejection.is_retryable());
        assert!(!engine.is_nonce_used(order.signer, order.nonce).await.unwrap());
    }

    #[tokio::test]
    async fn test_external_condition_target() {
        let h = Harness::new();
        let target_address = Address::repeat_byte(0x55);
        let mut target = MockConditionTarget::new();
        target.expect_evaluate().times(1).return_const(true);

        let engine = h
            .builder()
            .market(Arc::new(committing_market()))
            .accounts(Arc::new(open_accounts()))
            .condition_target(target_address, Arc::new(target))
            .build()
            .unwrap();

        let order = ConditionalOrder {
            conditions: vec![Condition::new(target_address, vec![0x01, 0x02]).encode()],
            ..h.order()
        };
        let signature = h.sign(&engine, &order);
        assert!(engine.submit_order(&order, &signature, EXECUTOR).await.is_ok());
    }

    #[tokio::test]
    async fn test_too_many_conditions() {
        let h = Harness::new();
        let engine = h.engine();
        let condition = BuiltinConditions::market_open(ENGINE_ADDRESS, 200).encode();
        let order = ConditionalOrder {
            conditions: vec![condition; engine.max_conditions() + 1],
            ..h.order()
        };
        let signature = h.sign(&engine, &order);

        let err = engine
            .submit_order(&order, &signature, EXECUTOR)
            .await
            .unwrap_err();
        assert_eq!(
            rejection(err),
            Rejection::TooManyConditions { count: 9, max: 8 }
        );
    }

    #[tokio::test]
    async fn test_market_failure_leaves_nonce_unused() {
        let h = Harness::new();
        let mut market = MockPerpsMarket::new();
        market
            .expect_commit_order()
            .times(1)
            .returning(|details| Err(MarketError::InsufficientMargin(details.account_id)));

        let engine = h
            .builder()
            .market(Arc::new(market))
            .accounts(Arc::new(open_accounts()))
            .build()
            .unwrap();

        let order = h.order();
        let signature = h.sign(&engine, &order);
        let err = engine
            .submit_order(&order, &signature, EXECUTOR)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Market(MarketError::InsufficientMargin(_))
        ));
        assert!(!engine.is_nonce_used(order.signer, order.nonce).await.unwrap());
    }

    /// Fails every commitment, but only once the test lets it.
    struct StalledMarket {
        entered: Arc<Notify>,
        proceed: Arc<Notify>,
    }

    #[async_trait]
    impl PerpsMarket for StalledMarket {
        async fn commit_order(
            &self,
            details: &OrderDetails,
        ) -> std::result::Result<MarketCommitment, MarketError> {
            self.entered.notify_one();
            self.proceed.notified().await;
            Err(MarketError::InsufficientMargin(details.account_id))
        }
    }

    #[tokio::test]
    async fn test_shared_store_waits_for_in_flight_submission() {
        let h = Harness::new();
        let entered = Arc::new(Notify::new());
        let proceed = Arc::new(Notify::new());

        let first = Arc::new(
            h.builder()
                .market(Arc::new(StalledMarket {
                    entered: entered.clone(),
                    proceed: proceed.clone(),
                }))
                .accounts(Arc::new(open_accounts()))
                .build()
                .unwrap(),
        );
        let second = Arc::new(h.engine());

        let order = h.order();
        let signature = h.sign(&first, &order);

        let first_run = tokio::spawn({
            let (engine, order, signature) = (first.clone(), order.clone(), signature.clone());
            async move { engine.submit_order(&order, &signature, EXECUTOR).await }
        });
        entered.notified().await;

        let second_run = tokio::spawn({
            let (engine, order, signature) = (second.clone(), order.clone(), signature.clone());
            async move { engine.submit_order(&order, &signature, EXECUTOR).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second_run.is_finished());
        assert!(!second.is_nonce_used(order.signer, order.nonce).await.unwrap());

        proceed.notify_one();

        let err = first_run.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            EngineError::Market(MarketError::InsufficientMargin(_))
        ));

        let receipt = second_run.await.unwrap().unwrap();
        assert_eq!(receipt.signer, order.signer);
        assert!(second.is_nonce_used(order.signer, order.nonce).await.unwrap());
        assert_eq!(h.nonces.len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let h = Harness::new();
        let mut nonces = MockNonceStore::new();
        nonces
            .expect_reserve()
            .returning(|_, _| Err(anyhow::anyhow!("connection refused")));

        let engine = h
            .builder()
            .nonce_store(Arc::new(nonces))
            .market(Arc::new(committing_market()))
            .accounts(Arc::new(open_accounts()))
            .build()
            .unwrap();

        let order = h.order();
        let signature = h.sign(&engine, &order);
        let err = engine
            .submit_order(&order, &signature, EXECUTOR)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }

    #[tokio::test]
    async fn test_can_execute_is_read_only() {
        let h = Harness::new();
        let mut market = MockPerpsMarket::new();
        market.expect_commit_order().times(0);

        let engine = h
            .builder()
            .market(Arc::new(market))
            .accounts(Arc::new(open_accounts()))
            .build()
            .unwrap();

        let order = h.order();
        let signature = h.sign(&engine, &order);

        assert!(engine.can_execute(&order, &signature, EXECUTOR).await);
        assert!(engine.can_execute(&order, &signature, EXECUTOR).await);
        assert!(!engine.is_nonce_used(order.signer, order.nonce).await.unwrap());
        assert!(!engine.can_execute(&order, &signature[..64], EXECUTOR).await);
    }

    #[tokio::test]
    async fn test_invalidate_nonce() {
        let h = Harness::new();
        let engine = h.engine();
        let order = h.order();
        let signature = h.sign(&engine, &order);

        assert!(engine.invalidate_nonce(order.signer, order.nonce).await.unwrap());
        assert!(!engine.invalidate_nonce(order.signer, order.nonce).await.unwrap());
        assert!(!engine.can_execute(&order, &signature, EXECUTOR).await);

        let err = engine
            .submit_order(&order, &signature, EXECUTOR)
            .await
            .unwrap_err();
        assert!(matches!(rejection(err), Rejection::NonceReused { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_single_winner() {
        let h = Harness::new();
        let engine = Arc::new(h.engine());
        let order = h.order();
        let signature = h.sign(&engine, &order);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let order = order.clone();
            let signature = signature.clone();
            handles.push(tokio::spawn(async move {
                engine.submit_order(&order, &signature, EXECUTOR).await
            }));
        }

        let mut accepted = 0;
        let mut replays = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(EngineError::Rejected(Rejection::NonceReused { .. })) => replays += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(replays, 7);
    }

    #[tokio::test]
    async fn test_injected_recoverer() {
        struct Always(Address);

        impl SignatureRecoverer for Always {
            fn recover(
                &self,
                _digest: B256,
                _signature: &[u8],
            ) -> std::result::Result<Address, SignatureError> {
                Ok(self.0)
            }
        }

        let h = Harness::new();
        let engine = h
            .builder()
            .recoverer(Arc::new(Always(h.key.address())))
            .market(Arc::new(committing_market()))
            .accounts(Arc::new(open_accounts()))
            .build()
            .unwrap();

        assert!(engine.verify_signature(&h.order(), &[]));
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let result = Engine::builder(config(), EngineAddresses::uniform(Address::with_last_byte(1)))
            .fees(Arc::new(FlatExecutorFee::default()))
            .accounts(Arc::new(open_accounts()))
            .build();
        assert!(matches!(
            result,
            Err(EngineError::Core(order_core::Error::Config { .. }))
        ));
    }

    #[test]
    fn test_builder_rejects_zero_contract() {
        let result = Engine::builder(
            EngineConfig::local(31337, Address::ZERO),
            EngineAddresses::uniform(Address::with_last_byte(1)),
        )
        .market(Arc::new(committing_market()))
        .accounts(Arc::new(open_accounts()))
        .fees(Arc::new(FlatExecutorFee::default()))
        .build();
        assert!(matches!(
            result,
            Err(EngineError::Core(order_core::Error::Domain { .. }))
        ));
    }
}
